//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use loopback_api::api::{
    self, ModelCatalog, ModelState, ServiceError, Services, Transcript, TranscriptionInput,
    TranscriptionService,
};
use loopback_api::config::ApiConfig;
use loopback_api::http::server::ServerError;
use loopback_api::lifecycle::Shutdown;
use loopback_api::net::{ConnectionTracker, Listener};
use loopback_api::ApiServer;

/// A server running on an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub tracker: ConnectionTracker,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Trigger shutdown and wait for the drain to finish.
    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(15), self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

pub async fn spawn_server(services: Services) -> TestServer {
    spawn_server_with(services, |_| {}).await
}

pub async fn spawn_server_with(services: Services, tweak: impl FnOnce(&mut ApiConfig)) -> TestServer {
    let mut config = ApiConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.timeouts.read_secs = 5;
    config.timeouts.drain_secs = 5;
    tweak(&mut config);

    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ApiServer::new(&config, api::build_router(Arc::new(services)));
    let tracker = server.tracker();

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    TestServer {
        addr,
        tracker,
        shutdown,
        handle,
    }
}

/// A catalog where `whisper-base` is ready.
pub fn ready_catalog() -> Arc<ModelCatalog> {
    let catalog = ModelCatalog::new();
    catalog.set_state("whisper-base", ModelState::Ready).unwrap();
    Arc::new(catalog)
}

/// Transcriber that reports the audio size and remembers every input.
#[derive(Default)]
pub struct FakeTranscriber {
    pub seen: Mutex<Vec<TranscriptionInput>>,
    pub delay: Option<Duration>,
}

impl FakeTranscriber {
    pub fn slow(delay: Duration) -> Self {
        Self {
            seen: Mutex::default(),
            delay: Some(delay),
        }
    }
}

impl TranscriptionService for FakeTranscriber {
    fn transcribe(&self, input: TranscriptionInput) -> BoxFuture<'static, Result<Transcript, ServiceError>> {
        let transcript = Transcript {
            text: format!("heard {} bytes", input.audio.len()),
            language: input.language.clone().or_else(|| Some("en".into())),
            duration_secs: 1.25,
            model: input.model.clone().unwrap_or_else(|| "whisper-base".into()),
        };
        self.seen.lock().unwrap().push(input);
        let delay = self.delay;
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(transcript)
        }
        .boxed()
    }
}

/// A response read off a raw socket.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn parse(bytes: &[u8]) -> Self {
        let split = bytes
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("no header terminator in response");
        let head = std::str::from_utf8(&bytes[..split]).unwrap();
        let mut lines = head.split("\r\n");
        let status = lines
            .next()
            .and_then(|line| line.split(' ').nth(1))
            .and_then(|code| code.parse().ok())
            .expect("bad status line");
        let headers = lines
            .filter_map(|line| line.split_once(": "))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            status,
            headers,
            body: bytes[split + 4..].to_vec(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn error_code(&self) -> String {
        self.json()["error"]["code"].as_str().unwrap().to_string()
    }
}

/// Write `raw` and read until the server closes the connection.
pub async fn send_raw(addr: SocketAddr, raw: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    // the server may answer and close before a large body is fully sent
    let _ = stream.write_all(raw).await;
    let mut out = Vec::new();
    let _ = stream.read_to_end(&mut out).await;
    out
}

pub async fn request(addr: SocketAddr, raw: &[u8]) -> RawResponse {
    RawResponse::parse(&send_raw(addr, raw).await)
}

/// Build a multipart/form-data request for `/transcribe`.
pub fn multipart_request(path: &str, boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: audio/wav\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let mut raw = format!(
        "POST {path} HTTP/1.1\r\nHost: 127.0.0.1\r\nContent-Type: multipart/form-data; boundary={boundary}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(&body);
    raw
}
