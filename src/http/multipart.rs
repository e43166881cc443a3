//! `multipart/form-data` decoding.
//!
//! A body is a run of parts, each introduced by `--{boundary}` and closed by the
//! next marker; `--{boundary}--` ends the body:
//!
//! ```text
//! --B\r\n
//! Content-Disposition: form-data; name="file"; filename="a.wav"\r\n
//! Content-Type: audio/wav\r\n
//! \r\n
//! <raw bytes>\r\n
//! --B\r\n
//! Content-Disposition: form-data; name="model"\r\n
//! \r\n
//! small\r\n
//! --B--\r\n
//! ```
//!
//! Part data is never transfer-decoded. Only `Content-Disposition` and
//! `Content-Type` part headers are understood.
//!
//! Two modes exist. [`DecodeMode::Lenient`] drops parts it cannot frame and keeps
//! going; [`DecodeMode::Strict`] reports the first such part as an error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::request::find;

const CRLF: &[u8] = b"\r\n";
const PART_HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// One decoded form part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    /// Raw part bytes, without the CRLF that precedes the next marker.
    pub data: Vec<u8>,
}

impl MultipartPart {
    /// Part data as text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }
}

/// How to treat parts that cannot be framed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeMode {
    /// Skip the part silently.
    #[default]
    Lenient,
    /// Fail the whole decode.
    Strict,
}

/// A part that could not be decoded. `index` counts markers from zero.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MultipartError {
    #[error("part {index} has no blank line between headers and data")]
    MissingHeaderTerminator { index: usize },

    #[error("part {index} ends before its data starts")]
    InvalidSpacing { index: usize },

    #[error("part {index} headers are not valid UTF-8")]
    InvalidHeaders { index: usize },

    #[error("part {index} has no form field name")]
    MissingName { index: usize },
}

/// Decode leniently: undecodable parts are dropped.
pub fn decode(body: &[u8], boundary: &str) -> Vec<MultipartPart> {
    let mut parts = Vec::new();
    walk(body, boundary, |outcome| {
        match outcome {
            Ok(part) => parts.push(part),
            Err(error) => tracing::debug!(%error, "Skipping multipart part"),
        }
        true
    });
    parts
}

/// Decode strictly: the first undecodable part fails the whole body.
pub fn decode_strict(body: &[u8], boundary: &str) -> Result<Vec<MultipartPart>, MultipartError> {
    let mut parts = Vec::new();
    let mut failure = None;
    walk(body, boundary, |outcome| match outcome {
        Ok(part) => {
            parts.push(part);
            true
        }
        Err(error) => {
            failure = Some(error);
            false
        }
    });
    match failure {
        Some(error) => Err(error),
        None => Ok(parts),
    }
}

pub fn decode_with_mode(
    body: &[u8],
    boundary: &str,
    mode: DecodeMode,
) -> Result<Vec<MultipartPart>, MultipartError> {
    match mode {
        DecodeMode::Lenient => Ok(decode(body, boundary)),
        DecodeMode::Strict => decode_strict(body, boundary),
    }
}

/// Extract the boundary from a `multipart/form-data` Content-Type value.
pub fn boundary_from_content_type(content_type: &str) -> Option<&str> {
    let mut params = split_params(content_type);
    let media_type = params.next()?;
    if !media_type.trim().eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|boundary| !boundary.is_empty())
}

/// Drive the marker scan. `visit` returns false to stop early.
fn walk<F>(body: &[u8], boundary: &str, mut visit: F)
where
    F: FnMut(Result<MultipartPart, MultipartError>) -> bool,
{
    let marker = format!("--{}", boundary).into_bytes();
    let mut cursor = 0;
    let mut index = 0;

    while let Some(start) = find(body, &marker, cursor) {
        let after_marker = start + marker.len();
        if after_marker + 2 > body.len() || body[after_marker..].starts_with(b"--") {
            break;
        }

        let part_start = after_marker + CRLF.len();
        let next_marker = find(body, &marker, part_start);
        let part_end = next_marker.unwrap_or(body.len());

        let keep_going = visit(decode_part(&body[part_start..part_end], index));
        if !keep_going {
            return;
        }

        match next_marker {
            Some(next) => cursor = next,
            None => break,
        }
        index += 1;
    }
}

/// Decode the bytes between a marker's CRLF and the next marker.
fn decode_part(segment: &[u8], index: usize) -> Result<MultipartPart, MultipartError> {
    let header_end = find(segment, PART_HEADER_TERMINATOR, 0)
        .ok_or(MultipartError::MissingHeaderTerminator { index })?;
    let data_start = header_end + PART_HEADER_TERMINATOR.len();

    let data_end = segment
        .len()
        .checked_sub(CRLF.len())
        .filter(|end| *end >= data_start)
        .ok_or(MultipartError::InvalidSpacing { index })?;

    let headers = std::str::from_utf8(&segment[..header_end])
        .map_err(|_| MultipartError::InvalidHeaders { index })?;

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;
    for line in headers.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("content-disposition") {
            name = disposition_param(value, "name");
            filename = disposition_param(value, "filename");
        } else if key.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        }
    }

    let name = name
        .filter(|name| !name.is_empty())
        .ok_or(MultipartError::MissingName { index })?;

    Ok(MultipartPart {
        name,
        filename,
        content_type,
        data: segment[data_start..data_end].to_vec(),
    })
}

fn disposition_param(value: &str, key: &str) -> Option<String> {
    split_params(value)
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
}

/// Split a header value on `;`, ignoring separators inside double quotes.
fn split_params(value: &str) -> impl Iterator<Item = &str> {
    let mut pieces = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                pieces.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&value[start..]);
    pieces.into_iter().map(str::trim)
}
