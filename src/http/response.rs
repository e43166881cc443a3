//! Response construction and serialization.
//!
//! # Responsibilities
//! - Build responses from status, content type and body
//! - Encode JSON payloads and the JSON error envelope
//! - Serialize byte-exact HTTP/1.1 responses with the fixed CORS headers
//!
//! # Design Decisions
//! - A `Response` is immutable once built; fields are read through accessors
//! - JSON encoding failures degrade to an empty body with the requested status
//! - Every response closes the connection

use serde::{Deserialize, Serialize};

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const CORS_HEADERS: &str = "Access-Control-Allow-Origin: *\r\n\
Access-Control-Allow-Methods: GET, POST, PUT, DELETE, OPTIONS\r\n\
Access-Control-Allow-Headers: Content-Type\r\n";

/// An HTTP response ready to be written to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    content_type: String,
    body: Vec<u8>,
}

/// Body of every JSON error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Canonical code derived from the status, e.g. `not_found`.
    pub code: String,
    pub message: String,
}

impl Response {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// `200 OK` with `value` encoded as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        Self::json_with_status(value, 200)
    }

    pub fn json_with_status<T: Serialize + ?Sized>(value: &T, status: u16) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_else(|e| {
            tracing::warn!(status, error = %e, "JSON encoding failed, sending empty body");
            Vec::new()
        });
        Self::new(status, JSON_CONTENT_TYPE, body)
    }

    /// JSON error envelope whose code is derived from `status`.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        let envelope = ErrorEnvelope {
            error: ErrorDetail {
                code: error_code(status).to_string(),
                message: message.into(),
            },
        };
        Self::json_with_status(&envelope, status)
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, TEXT_CONTENT_TYPE, body.into().into_bytes())
    }

    /// Empty `200 OK` answering a CORS preflight.
    pub fn preflight() -> Self {
        Self::new(200, TEXT_CONTENT_TYPE, Vec::new())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Render the status line, headers, blank line and body.
    pub fn serialize(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
            self.status,
            reason_phrase(self.status),
            self.content_type,
            self.body.len(),
            CORS_HEADERS,
        );
        let mut out = Vec::with_capacity(head.len() + self.body.len());
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

pub fn error_code(status: u16) -> &'static str {
    match status {
        400 => "bad_request",
        404 => "not_found",
        405 => "method_not_allowed",
        413 => "payload_too_large",
        503 => "service_unavailable",
        _ => "error",
    }
}
