//! `Range` header resolution (RFC 7233 section 2.1).

use crate::error::RangeError;

/// One satisfiable byte interval `[start, start + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(start: u64, length: u64) -> Self {
        ByteRange { start, length }
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// `Content-Range` value for this range of a `size`-byte representation.
    pub fn content_range(&self, size: u64) -> String {
        // inclusive end; a zero-length suffix range renders as start-1
        let last = i128::from(self.start) + i128::from(self.length) - 1;
        format!("bytes {}-{}/{}", self.start, last, size)
    }
}

fn trim(s: &str) -> &str {
    s.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

fn parse_pos(s: &str) -> Result<u64, RangeError> {
    s.parse::<u64>().map_err(|_| RangeError::InvalidRange)
}

/// Resolves a `Range` header against a representation of `size` bytes.
///
/// An empty header yields no ranges. Specs that start at or past `size` are
/// dropped; if that leaves nothing out of a non-empty set the result is
/// [`RangeError::NoOverlap`]. Ranges come back in header order, unmerged.
pub fn parse_range(header: &str, size: u64) -> Result<Vec<ByteRange>, RangeError> {
    if header.is_empty() {
        return Ok(Vec::new());
    }

    const UNIT: &str = "bytes=";
    let specs = header.strip_prefix(UNIT).ok_or(RangeError::InvalidRange)?;

    let mut ranges = Vec::new();
    let mut no_overlap = false;
    for spec in specs.split(',') {
        let spec = trim(spec);
        if spec.is_empty() {
            continue;
        }
        let (start, end) = spec.split_once('-').ok_or(RangeError::InvalidRange)?;
        let (start, end) = (trim(start), trim(end));

        if start.is_empty() {
            // suffix-byte-range-spec, a non-negative suffix-length
            if end.is_empty() || end.starts_with('-') {
                return Err(RangeError::InvalidRange);
            }
            let suffix = parse_pos(end)?.min(size);
            ranges.push(ByteRange::new(size - suffix, suffix));
            continue;
        }

        let start = parse_pos(start)?;
        if start >= size {
            no_overlap = true;
            continue;
        }
        let length = if end.is_empty() {
            size - start
        } else {
            let end = parse_pos(end)?;
            if start > end {
                return Err(RangeError::InvalidRange);
            }
            end.min(size - 1) - start + 1
        };
        ranges.push(ByteRange::new(start, length));
    }

    if no_overlap && ranges.is_empty() {
        return Err(RangeError::NoOverlap);
    }
    Ok(ranges)
}

/// Total bytes covered by `ranges`, overlaps counted twice.
pub fn sum_ranges_size(ranges: &[ByteRange]) -> u64 {
    ranges.iter().fold(0u64, |acc, r| acc.saturating_add(r.length))
}
