//! Request header parsing shared by the handlers.

use axum::http::{header, HeaderMap};

use crate::DepotAxumError;

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// `Content-Type`, required on every request carrying a payload
pub fn content_type(headers: &HeaderMap) -> Result<String, DepotAxumError> {
    header_str(headers, header::CONTENT_TYPE)
        .map(str::to_owned)
        .ok_or_else(|| DepotAxumError::bad_request("Content-Type header is required"))
}

/// `Content-Length` if present; a present but unparsable value is a bad request
pub fn content_length(headers: &HeaderMap) -> Result<Option<u64>, DepotAxumError> {
    match header_str(headers, header::CONTENT_LENGTH) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| DepotAxumError::bad_request(format!("invalid Content-Length '{}'", raw))),
    }
}

/// `Content-Length` that must be present and non-zero
pub fn required_content_length(headers: &HeaderMap) -> Result<u64, DepotAxumError> {
    match content_length(headers)? {
        None => Err(DepotAxumError::length_required(
            "Content-Length header is required",
        )),
        Some(0) => Err(DepotAxumError::bad_request("request body must not be empty")),
        Some(length) => Ok(length),
    }
}

/// Raw `Range` header value
pub fn range(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, header::RANGE)
}

/// A segment position from `Content-Range: bytes <from>-<to>/<total>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub from: u64,
    pub to: u64,
    pub total: u64,
}

fn parse_number(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Parse a `Content-Range` value; only the `bytes` unit with a known total is accepted
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let (unit, rest) = value.trim().split_once(' ')?;
    if !unit.eq_ignore_ascii_case("bytes") {
        return None;
    }
    let (range, total) = rest.split_once('/')?;
    let (from, to) = range.split_once('-')?;
    Some(ContentRange {
        from: parse_number(from)?,
        to: parse_number(to)?,
        total: parse_number(total)?,
    })
}

pub fn content_range(headers: &HeaderMap) -> Result<ContentRange, DepotAxumError> {
    let raw = header_str(headers, header::CONTENT_RANGE)
        .ok_or_else(|| DepotAxumError::bad_request("Content-Range header is required"))?;
    parse_content_range(raw).ok_or_else(|| {
        DepotAxumError::bad_request(format!(
            "invalid Content-Range '{}', expected 'bytes <from>-<to>/<total>'",
            raw
        ))
    })
}
