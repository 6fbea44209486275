//! Best-effort HTTP/1.1 byte accounting for `data_sent` / `data_received`.

use super::{Error, Result};

pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

pub(super) fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) if port != 80 => Some(format!("{host}:{port}")),
        _ => Some(host.to_string()),
    }
}

/// Request line + headers (with the implicit Host/Content-Length made explicit) + CRLF + body.
pub(super) fn request_bytes(
    method: &http::Method,
    parsed: &url::Url,
    headers: &[(String, String)],
    body_len: u64,
) -> Result<u64> {
    let uri: hyper::Uri = parsed
        .as_str()
        .parse()
        .map_err(|_| Error::InvalidUrl(parsed.to_string()))?;

    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

    // "METHOD SP path SP HTTP/1.1 CRLF"
    let mut bytes = (method.as_str().len() as u64)
        .saturating_add(1)
        .saturating_add(path.len() as u64)
        .saturating_add(1)
        .saturating_add("HTTP/1.1".len() as u64)
        .saturating_add(2);

    for (k, v) in headers {
        bytes = bytes.saturating_add(header_bytes(k.as_bytes(), v.as_bytes()));
    }

    if !has_header(headers, "host")
        && let Some(host) = host_header_value(parsed)
    {
        bytes = bytes.saturating_add(header_bytes(b"host", host.as_bytes()));
    }

    if body_len != 0 && !has_header(headers, "content-length") {
        let v = body_len.to_string();
        bytes = bytes.saturating_add(header_bytes(b"content-length", v.as_bytes()));
    }

    Ok(bytes.saturating_add(2).saturating_add(body_len))
}

/// Status line (reason phrase ignored) + headers + CRLF.
pub(super) fn response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let version = match version {
        http::Version::HTTP_10 => "HTTP/1.0",
        http::Version::HTTP_2 => "HTTP/2",
        http::Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/1.1",
    };

    let mut bytes = (version.len() as u64)
        .saturating_add(1)
        .saturating_add(status.as_str().len() as u64)
        .saturating_add(2);

    for (name, value) in headers.iter() {
        bytes = bytes.saturating_add(header_bytes(name.as_str().as_bytes(), value.as_bytes()));
    }
    bytes.saturating_add(2)
}

fn header_bytes(name: &[u8], value: &[u8]) -> u64 {
    // "name: value\r\n"
    (name.len() as u64)
        .saturating_add(2)
        .saturating_add(value.len() as u64)
        .saturating_add(2)
}
