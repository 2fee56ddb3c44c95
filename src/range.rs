// src/range.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// HTTP byte-range request values and Content-Range response parsing.

use std::fmt;

use crate::error::{Error, Result};

/// A byte range to request, following HTTP `Range` semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-`
    From(u64),
    /// `bytes=start-end`, end inclusive
    Bounded(u64, u64),
    /// `bytes=-len`, the last `len` bytes
    Suffix(u64),
}

impl ByteRange {
    /// Header value for this range, e.g. `bytes=0-499`.
    pub fn to_header(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteRange::From(start) => write!(f, "bytes={start}-"),
            ByteRange::Bounded(start, end) => write!(f, "bytes={start}-{end}"),
            ByteRange::Suffix(len) => write!(f, "bytes=-{len}"),
        }
    }
}

/// Parsed `Content-Range` response header: `unit start-end/total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRange {
    pub unit: String,
    pub start: u64,
    /// Inclusive.
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    pub fn new(start: u64, end: u64, total: u64) -> Self {
        Self { unit: "bytes".to_string(), start, end, total }
    }

    /// Parse `bytes 0-99/1000`. Unknown totals (`*`) and unsatisfied ranges
    /// are rejected: the reader cannot track position without a total.
    pub fn parse(header: &str) -> Result<Self> {
        let malformed = || Error::Protocol(format!("malformed Content-Range: {header:?}"));

        let (unit, rest) = header.trim().split_once(' ').ok_or_else(malformed)?;
        let (span, total) = rest.trim().split_once('/').ok_or_else(malformed)?;
        let (start, end) = span.split_once('-').ok_or_else(malformed)?;

        let start: u64 = start.trim().parse().map_err(|_| malformed())?;
        let end: u64 = end.trim().parse().map_err(|_| malformed())?;
        let total: u64 = total.trim().parse().map_err(|_| malformed())?;
        if start > end || end >= total {
            return Err(malformed());
        }

        Ok(Self { unit: unit.to_string(), start, end, total })
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{}/{}", self.unit, self.start, self.end, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_header_values() {
        assert_eq!(ByteRange::From(0).to_header(), "bytes=0-");
        assert_eq!(ByteRange::From(42).to_header(), "bytes=42-");
        assert_eq!(ByteRange::Bounded(0, 499).to_header(), "bytes=0-499");
        assert_eq!(ByteRange::Suffix(10).to_header(), "bytes=-10");
    }

    #[test]
    fn parse_content_range() {
        let cr = ContentRange::parse("bytes 90-99/100").expect("valid header");
        assert_eq!(cr, ContentRange::new(90, 99, 100));
        assert_eq!(cr.to_string(), "bytes 90-99/100");
    }

    #[test]
    fn parse_content_range_tolerates_whitespace() {
        let cr = ContentRange::parse("  bytes 0-0/1 ").expect("valid header");
        assert_eq!((cr.start, cr.end, cr.total), (0, 0, 1));
    }

    #[test]
    fn reject_malformed_content_range() {
        for bad in ["", "bytes", "bytes 0-9", "bytes 0-9/*", "bytes */100", "bytes 9-0/100", "bytes 0-100/100", "bytes a-b/c"] {
            let err = ContentRange::parse(bad).expect_err(bad);
            assert_eq!(err.kind(), crate::ErrorKind::Protocol, "{bad}");
        }
    }
}
