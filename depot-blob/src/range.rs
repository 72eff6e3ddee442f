//! Range-aware content delivery.
//!
//! Interprets a single `Range: bytes=...` request against a stored payload.
//! Partial reads need a seekable payload; a forward-only payload can only be
//! delivered whole.

use std::io::SeekFrom;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::{BlobResult, ByteStream, Delivery, FileRecord, OpenedBlob, Payload, PayloadBody, ResolvedRange};

/// One byte-range-spec from a `Range` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `first-last`
    Bounded { first: u64, last: u64 },
    /// `first-`
    From { first: u64 },
    /// `-len`: the final `len` bytes
    Suffix { len: u64 },
}

/// A syntactically valid `Range` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeRequest {
    Single(RangeSpec),
    Multiple(Vec<RangeSpec>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed Range header: {0}")]
pub struct RangeParseError(String);

fn parse_position(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

fn parse_spec(raw: &str) -> Option<RangeSpec> {
    let (first, last) = raw.trim().split_once('-')?;
    match (first.trim(), last.trim()) {
        ("", len) => parse_position(len).map(|len| RangeSpec::Suffix { len }),
        (first, "") => parse_position(first).map(|first| RangeSpec::From { first }),
        (first, last) => {
            let first = parse_position(first)?;
            let last = parse_position(last)?;
            (first <= last).then_some(RangeSpec::Bounded { first, last })
        }
    }
}

/// Parse the value of a `Range` header. Only the `bytes` unit is understood.
pub fn parse_range_header(value: &str) -> Result<RangeRequest, RangeParseError> {
    let malformed = || RangeParseError(value.to_string());

    let (unit, set) = value.trim().split_once('=').ok_or_else(malformed)?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(malformed());
    }

    let mut specs = set
        .split(',')
        .map(parse_spec)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(malformed)?;

    match specs.len() {
        0 => Err(malformed()),
        1 => Ok(RangeRequest::Single(specs.remove(0))),
        _ => Ok(RangeRequest::Multiple(specs)),
    }
}

impl RangeSpec {
    /// Resolve against the payload length; `None` when unsatisfiable
    pub fn resolve(&self, total_size: u64) -> Option<ResolvedRange> {
        if total_size == 0 {
            return None;
        }
        let (start, end) = match *self {
            RangeSpec::Bounded { first, last } => (first, last.min(total_size - 1)),
            RangeSpec::From { first } => (first, total_size - 1),
            RangeSpec::Suffix { len } => {
                if len == 0 {
                    return None;
                }
                (total_size - len.min(total_size), total_size - 1)
            }
        };
        (start < total_size).then_some(ResolvedRange {
            start,
            end,
            total_size,
        })
    }
}

fn not_satisfiable(record: FileRecord, accepts_ranges: bool, total_size: u64) -> OpenedBlob {
    OpenedBlob {
        record,
        accepts_ranges,
        delivery: Delivery::NotSatisfiable { total_size },
    }
}

fn full(record: FileRecord, accepts_ranges: bool, stream: ByteStream, length: u64) -> OpenedBlob {
    OpenedBlob {
        record,
        accepts_ranges,
        delivery: Delivery::Full { stream, length },
    }
}

/// Serve a payload, honouring an optional raw `Range` header value
pub async fn serve(
    payload: Payload,
    record: FileRecord,
    range_header: Option<&str>,
) -> BlobResult<OpenedBlob> {
    let accepts_ranges = payload.is_seekable();
    let total_size = payload.length;

    let Some(raw) = range_header else {
        return Ok(full(record, accepts_ranges, payload.into_stream(), total_size));
    };

    let spec = match parse_range_header(raw) {
        Ok(RangeRequest::Single(spec)) => spec,
        Ok(RangeRequest::Multiple(specs)) => {
            tracing::debug!(file_id = %record.id, ranges = specs.len(), "multi-range request served in full");
            return Ok(full(record, accepts_ranges, payload.into_stream(), total_size));
        }
        Err(e) => {
            tracing::debug!(file_id = %record.id, error = %e, "rejecting range request");
            return Ok(not_satisfiable(record, accepts_ranges, total_size));
        }
    };

    let mut reader = match payload.body {
        PayloadBody::Seekable(reader) => reader,
        PayloadBody::Stream(_) => return Ok(not_satisfiable(record, accepts_ranges, total_size)),
    };

    let Some(resolved) = spec.resolve(total_size) else {
        return Ok(not_satisfiable(record, accepts_ranges, total_size));
    };

    if resolved.is_full_content() {
        return Ok(full(
            record,
            accepts_ranges,
            Box::pin(ReaderStream::new(reader)),
            total_size,
        ));
    }

    reader.seek(SeekFrom::Start(resolved.start)).await?;
    let stream: ByteStream = Box::pin(ReaderStream::new(reader.take(resolved.content_length())));

    Ok(OpenedBlob {
        record,
        accepts_ranges,
        delivery: Delivery::Partial {
            stream,
            range: resolved,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_three_single_forms() {
        assert_eq!(
            parse_range_header("bytes=500-999"),
            Ok(RangeRequest::Single(RangeSpec::Bounded { first: 500, last: 999 }))
        );
        assert_eq!(
            parse_range_header("bytes=9500-"),
            Ok(RangeRequest::Single(RangeSpec::From { first: 9500 }))
        );
        assert_eq!(
            parse_range_header("bytes=-500"),
            Ok(RangeRequest::Single(RangeSpec::Suffix { len: 500 }))
        );
    }

    #[test]
    fn unit_is_case_insensitive_and_spaces_are_tolerated() {
        assert_eq!(
            parse_range_header(" Bytes = 1 - 2 "),
            Ok(RangeRequest::Single(RangeSpec::Bounded { first: 1, last: 2 }))
        );
    }

    #[test]
    fn multiple_ranges_are_recognised() {
        match parse_range_header("bytes=0-1,5-6") {
            Ok(RangeRequest::Multiple(specs)) => assert_eq!(specs.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for raw in [
            "",
            "bytes",
            "bytes=",
            "bytes=-",
            "bytes=abc-1",
            "bytes=5-1",
            "bytes=+1-2",
            "items=0-5",
            "bytes=0-1,",
        ] {
            assert!(parse_range_header(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn resolution_clamps_and_rejects() {
        let bounded = RangeSpec::Bounded { first: 500, last: 5000 };
        assert_eq!(
            bounded.resolve(1000),
            Some(ResolvedRange { start: 500, end: 999, total_size: 1000 })
        );
        assert_eq!(RangeSpec::From { first: 1000 }.resolve(1000), None);
        assert_eq!(
            RangeSpec::Suffix { len: 5000 }.resolve(1000),
            Some(ResolvedRange { start: 0, end: 999, total_size: 1000 })
        );
        assert_eq!(RangeSpec::Suffix { len: 0 }.resolve(1000), None);
        assert_eq!(RangeSpec::From { first: 0 }.resolve(0), None);
    }

    #[test]
    fn content_range_value() {
        let range = ResolvedRange { start: 6, end: 10, total_size: 11 };
        assert_eq!(range.content_range(), "bytes 6-10/11");
        assert_eq!(range.content_length(), 5);
        assert!(!range.is_full_content());
    }
}
