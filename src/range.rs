//! `Range` request header parsing.
//!
//! Only a single byte-range spec is honored; a multi-spec header is
//! served by its first spec alone. Failures surface to the handler,
//! which answers `416` with `Content-Range: bytes */<size>`.

use std::error::Error;
use std::fmt;

/// An inclusive byte range resolved against a known file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    InvalidUnit,
    Empty,
    Malformed,
    Unsatisfiable,
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let desc = match self {
            RangeError::InvalidUnit => "invalid range unit",
            RangeError::Empty => "empty range",
            RangeError::Malformed => "malformed range spec",
            RangeError::Unsatisfiable => "range start beyond size",
        };
        f.write_str(desc)
    }
}

impl Error for RangeError {}

impl ByteRange {
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Parse a `Range` header value against a known `size > 0`.
    pub fn parse(header: &str, size: u64) -> Result<ByteRange, RangeError> {
        let spec = header.strip_prefix("bytes=").ok_or(RangeError::InvalidUnit)?;
        let mut spec = spec.trim();
        if spec.is_empty() {
            return Err(RangeError::Empty);
        }

        // Only the first spec of a multi-range request is honored.
        if let Some(idx) = spec.find(',') {
            spec = spec[..idx].trim();
        }

        if let Some(suffix) = spec.strip_prefix('-') {
            // -N: the last min(N, size) bytes.
            let n: u64 = suffix.parse().map_err(|_| RangeError::Malformed)?;
            if n == 0 {
                return Err(RangeError::Malformed);
            }
            let n = n.min(size);
            return Ok(ByteRange {
                start: size - n,
                end: size - 1,
            });
        }

        if let Some(open) = spec.strip_suffix('-') {
            // N-: from N to the end.
            let start: u64 = open.trim().parse().map_err(|_| RangeError::Malformed)?;
            if start >= size {
                return Err(RangeError::Unsatisfiable);
            }
            return Ok(ByteRange {
                start,
                end: size - 1,
            });
        }

        // A-B: inclusive, with B clamped to the last byte.
        let (a, b) = spec.split_once('-').ok_or(RangeError::Malformed)?;
        let start: u64 = a.trim().parse().map_err(|_| RangeError::Malformed)?;
        let end: u64 = b.trim().parse().map_err(|_| RangeError::Malformed)?;
        if end < start {
            return Err(RangeError::Malformed);
        }
        if start >= size {
            return Err(RangeError::Unsatisfiable);
        }
        Ok(ByteRange {
            start,
            end: end.min(size - 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(h: &str, size: u64) -> Result<ByteRange, RangeError> {
        ByteRange::parse(h, size)
    }

    #[test]
    fn closed_range() {
        assert_eq!(
            parse("bytes=0-99", 1000).unwrap(),
            ByteRange { start: 0, end: 99 }
        );
        assert_eq!(parse("bytes=0-99", 1000).unwrap().length(), 100);
    }

    #[test]
    fn suffix_range() {
        assert_eq!(
            parse("bytes=-200", 1000).unwrap(),
            ByteRange {
                start: 800,
                end: 999
            }
        );
        // suffix longer than the file serves the whole file
        assert_eq!(
            parse("bytes=-2000", 1000).unwrap(),
            ByteRange { start: 0, end: 999 }
        );
        assert!(parse("bytes=-0", 1000).is_err());
    }

    #[test]
    fn open_range() {
        assert_eq!(
            parse("bytes=500-", 1000).unwrap(),
            ByteRange {
                start: 500,
                end: 999
            }
        );
        assert!(parse("bytes=1000-", 1000).is_err());
    }

    #[test]
    fn end_clamped_to_size() {
        assert_eq!(
            parse("bytes=500-10000", 1000).unwrap(),
            ByteRange {
                start: 500,
                end: 999
            }
        );
    }

    #[test]
    fn wrong_unit_rejected() {
        assert_eq!(parse("items=0-1", 1000), Err(RangeError::InvalidUnit));
    }

    #[test]
    fn first_spec_of_multi_range_wins() {
        assert_eq!(
            parse("bytes=0-4, 10-14", 1000).unwrap(),
            ByteRange { start: 0, end: 4 }
        );
    }

    #[test]
    fn garbage_rejected() {
        assert!(parse("bytes=", 1000).is_err());
        assert!(parse("bytes=a-b", 1000).is_err());
        assert!(parse("bytes=5-2", 1000).is_err());
        assert!(parse("bytes=10-20", 5).is_err());
    }
}
