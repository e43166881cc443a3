//! Endpoint implementations.

use std::sync::Arc;

use chrono::Utc;

use crate::api::schema::{
    self, ModelsResponse, SchemaError, SelectModelRequest, StatusResponse, TranscribeForm,
    TranscriptionResponse,
};
use crate::api::services::{ModelState, ServiceError, Services};
use crate::http::{multipart, Request, Response};
use crate::routing::HandlerError;

/// `GET /status`
pub async fn status(services: Arc<Services>, _request: Request) -> Result<Response, HandlerError> {
    let active = services.models.active_model();
    let uptime = Utc::now().signed_duration_since(services.started_at);

    Ok(Response::json(&StatusResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        model_ready: active.as_ref().is_some_and(|m| m.state == ModelState::Ready),
        active_model: active.map(|m| m.id),
        started_at: services.started_at,
        uptime_secs: uptime.num_seconds().max(0) as u64,
    }))
}

/// `GET /models`
pub async fn models(services: Arc<Services>, _request: Request) -> Result<Response, HandlerError> {
    Ok(Response::json(&ModelsResponse {
        models: services.models.models(),
        active_model: services.models.active_model().map(|m| m.id),
    }))
}

/// `POST /models/select` with `{"model": "<id>"}`.
pub async fn select_model(services: Arc<Services>, request: Request) -> Result<Response, HandlerError> {
    let body: SelectModelRequest = schema::decode_json(&request.body)?;
    let model = services.models.select_model(body.validate()?)?;
    Ok(Response::json(&model))
}

/// `POST /transcribe` with a `multipart/form-data` upload.
pub async fn transcribe(services: Arc<Services>, request: Request) -> Result<Response, HandlerError> {
    let boundary = request
        .multipart_boundary()
        .ok_or_else(|| SchemaError::UnsupportedMediaType {
            expected: "multipart/form-data",
            actual: request.content_type().unwrap_or("none").to_string(),
        })?;
    let parts = multipart::decode_with_mode(&request.body, boundary, services.multipart_mode)?;
    let form = TranscribeForm::from_parts(parts, &request.query_params)?;

    // the transcriber gets the name as sent; aliases only gate unknown models
    if let Some(model) = form.model.as_deref() {
        if services.models.resolve(model).is_none() {
            return Err(ServiceError::UnknownModel(model.to_string()).into());
        }
    }

    tracing::info!(
        bytes = form.file.data.len(),
        filename = form.file.filename.as_deref().unwrap_or("-"),
        model = form.model.as_deref().unwrap_or("active"),
        task = ?form.task,
        "Transcription requested"
    );

    let transcript = services.transcriber.transcribe(form.into_input()).await?;
    tracing::info!(
        model = %transcript.model,
        duration_secs = transcript.duration_secs,
        chars = transcript.text.len(),
        "Transcription finished"
    );
    Ok(Response::json(&TranscriptionResponse::from_transcript(
        transcript,
        Utc::now(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::catalog::{ModelCatalog, OfflineTranscriber};
    use crate::api::services::{Task, Transcript, TranscriptionInput, TranscriptionService};
    use crate::http::request;
    use crate::http::response::ErrorEnvelope;
    use crate::http::DecodeMode;
    use futures_util::future::{BoxFuture, FutureExt};
    use std::sync::Mutex;

    /// Echoes its input back as a transcript.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<TranscriptionInput>>,
    }

    impl TranscriptionService for Recorder {
        fn transcribe(&self, input: TranscriptionInput) -> BoxFuture<'static, Result<Transcript, ServiceError>> {
            let transcript = Transcript {
                text: format!("{} bytes", input.audio.len()),
                language: input.language.clone(),
                duration_secs: 2.0,
                model: input.model.clone().unwrap_or_else(|| "whisper-base".into()),
            };
            self.seen.lock().unwrap().push(input);
            async move { Ok(transcript) }.boxed()
        }
    }

    fn services(transcriber: Arc<dyn TranscriptionService>) -> Arc<Services> {
        let catalog = ModelCatalog::new();
        catalog.set_state("whisper-base", ModelState::Ready).unwrap();
        Arc::new(Services::new(Arc::new(catalog), transcriber))
    }

    fn req(raw: &[u8]) -> Request {
        request::parse(raw).unwrap()
    }

    fn multipart_request(query: &str, body: &str) -> Request {
        let raw = format!(
            "POST /transcribe{query} HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=B\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        req(raw.as_bytes())
    }

    fn json(response: &Response) -> serde_json::Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn status_reports_active_model() {
        let services = services(Arc::new(OfflineTranscriber));
        let response = status(services.clone(), req(b"GET /status HTTP/1.1\r\n\r\n")).await.unwrap();
        let body = json(&response);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_model"], serde_json::Value::Null);
        assert_eq!(body["model_ready"], false);

        services.models.select_model("whisper-base").unwrap();
        let body = json(&status(services, req(b"GET /status HTTP/1.1\r\n\r\n")).await.unwrap());
        assert_eq!(body["active_model"], "whisper-base");
        assert_eq!(body["model_ready"], true);
    }

    #[tokio::test]
    async fn models_lists_catalog() {
        let services = services(Arc::new(OfflineTranscriber));
        let body = json(&models(services, req(b"GET /models HTTP/1.1\r\n\r\n")).await.unwrap());
        assert_eq!(body["models"].as_array().unwrap().len(), 6);
        assert_eq!(body["models"][0]["state"], "not_downloaded");
    }

    #[tokio::test]
    async fn select_model_errors_map_to_statuses() {
        let services = services(Arc::new(OfflineTranscriber));
        let select = |body: &str| {
            let raw = format!(
                "POST /models/select HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            select_model(services.clone(), req(raw.as_bytes()))
        };

        let ok = select(r#"{"model":"whisper-base"}"#).await.unwrap();
        assert_eq!(json(&ok)["id"], "whisper-base");

        assert_eq!(select(r#"{"model":"nope"}"#).await.unwrap_err().status(), 404);
        assert_eq!(select(r#"{"model":"whisper-tiny"}"#).await.unwrap_err().status(), 503);
        assert_eq!(select(r#"{"model":"whisper-base","x":1}"#).await.unwrap_err().status(), 400);
        assert_eq!(select("not json").await.unwrap_err().status(), 400);
    }

    #[tokio::test]
    async fn transcribe_passes_form_to_service() {
        let recorder = Arc::new(Recorder::default());
        let services = services(recorder.clone());
        let body = "--B\r\nContent-Disposition: form-data; name=\"task\"\r\n\r\ntranslate\r\n\
--B\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.wav\"\r\nContent-Type: audio/wav\r\n\r\nRIFF1234\r\n--B--\r\n";

        let response = transcribe(services, multipart_request("?language=fr", body)).await.unwrap();
        let json = json(&response);
        assert_eq!(json["text"], "8 bytes");
        assert_eq!(json["language"], "fr");
        assert!(json["completed_at"].as_str().unwrap().ends_with('Z'));

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].task, Task::Translate);
        assert_eq!(seen[0].filename.as_deref(), Some("a.wav"));
        assert_eq!(seen[0].content_type.as_deref(), Some("audio/wav"));
    }

    #[tokio::test]
    async fn transcribe_accepts_model_aliases() {
        let recorder = Arc::new(Recorder::default());
        let services = services(recorder.clone());
        for model in ["small", "openai_whisper-large-v3_turbo"] {
            let body = format!(
                "--B\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.wav\"\r\n\r\nRIFFdata\r\n\
--B\r\nContent-Disposition: form-data; name=\"model\"\r\n\r\n{model}\r\n--B--\r\n"
            );
            let response = transcribe(services.clone(), multipart_request("", &body)).await.unwrap();
            assert_eq!(json(&response)["model"], model);
        }

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].audio, b"RIFFdata");
        assert_eq!(seen[0].model.as_deref(), Some("small"));
    }

    #[tokio::test]
    async fn transcribe_rejections() {
        let services = services(Arc::new(OfflineTranscriber));

        let not_multipart = req(b"POST /transcribe HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n{}");
        let err = transcribe(services.clone(), not_multipart).await.unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(err.to_string().contains("multipart/form-data"));

        let no_file = "--B\r\nContent-Disposition: form-data; name=\"model\"\r\n\r\nwhisper-base\r\n--B--\r\n";
        let err = transcribe(services.clone(), multipart_request("", no_file)).await.unwrap_err();
        assert_eq!(err.to_string(), "missing required field `file`");

        let unknown = "--B\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.wav\"\r\n\r\nRIFF\r\n--B--\r\n";
        let err = transcribe(services.clone(), multipart_request("?model=whisper-xxl", unknown))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);

        let err = transcribe(services, multipart_request("", unknown)).await.unwrap_err();
        let envelope: ErrorEnvelope = serde_json::from_slice(err.into_response().body()).unwrap();
        assert_eq!(envelope.error.code, "service_unavailable");
        assert!(envelope.error.message.starts_with("No model loaded"));
    }

    #[tokio::test]
    async fn strict_mode_rejects_nameless_parts() {
        let mut strict = Services::new(Arc::new(ModelCatalog::new()), Arc::new(Recorder::default()));
        strict = strict.with_multipart_mode(DecodeMode::Strict);
        let body = "--B\r\nContent-Disposition: form-data\r\n\r\nxyz\r\n\
--B\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.wav\"\r\n\r\nRIFF\r\n--B--\r\n";

        let err = transcribe(Arc::new(strict), multipart_request("", body)).await.unwrap_err();
        assert_eq!(err.status(), 400);

        let lenient = services(Arc::new(Recorder::default()));
        assert!(transcribe(lenient, multipart_request("", body)).await.is_ok());
    }
}
