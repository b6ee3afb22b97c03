//! Body encoding: UTF-8 text for textual MIME types, base64 otherwise.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::model::Content;

const DEFAULT_BINARY_MIME: &str = "application/octet-stream";

/// Text-bearing MIME types worth storing verbatim.
pub(crate) fn is_textual(mime: &str) -> bool {
    let essence = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/")
        || essence.ends_with("json")
        || essence.ends_with("xml")
        || essence.contains("javascript")
        || essence == "application/x-www-form-urlencoded"
}

/// Encoded body: `(text, encoding)`; `encoding` is `Some("base64")` for binary.
pub(crate) fn encode_body(body: &[u8], mime: &str) -> (String, Option<String>) {
    if is_textual(mime) {
        if let Ok(text) = std::str::from_utf8(body) {
            return (text.to_string(), None);
        }
    }
    (STANDARD.encode(body), Some("base64".to_string()))
}

/// `content` block of a response.
pub(crate) fn response_content(
    body: Option<&[u8]>,
    content_type: Option<&str>,
    max_body_bytes: usize,
) -> Content {
    let Some(body) = body else {
        return Content {
            size: 0,
            mime_type: content_type.unwrap_or_default().to_string(),
            ..Content::default()
        };
    };
    let mime_type = content_type.unwrap_or(DEFAULT_BINARY_MIME).to_string();
    if body.len() > max_body_bytes {
        return Content {
            size: body.len() as i64,
            mime_type,
            comment: Some(omitted_comment(body.len(), max_body_bytes)),
            ..Content::default()
        };
    }
    let (text, encoding) = encode_body(body, &mime_type);
    Content {
        size: body.len() as i64,
        mime_type,
        text: Some(text),
        encoding,
        comment: None,
    }
}

pub(crate) fn omitted_comment(len: usize, limit: usize) -> String {
    format!("body omitted: {len} bytes exceeds limit of {limit} bytes")
}
