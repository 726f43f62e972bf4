//! `Range` header parsing and range-set normalization.
//!
//! ```text
//! Range            = "bytes=" byte-range-spec *( "," byte-range-spec )
//! byte-range-spec  = first-byte-pos "-" [ last-byte-pos ]
//!                  / "-" suffix-length
//! ```
//!
//! Specs are clamped to the resource length one by one. A spec that selects
//! nothing after clamping is dropped; if every spec is dropped the header
//! is unsatisfiable. Anything that does not match the grammar makes the
//! whole header malformed, which callers treat as "no range requested".
//!
//! Optional whitespace (RFC 9110 `OWS`: spaces and horizontal tabs) is
//! accepted around the whole header and around each spec, so
//! `bytes=1-2, 4-5` parses. Whitespace inside `bytes=` or within a spec
//! (`0 - 1`) is still malformed.

use std::cmp;

/// An inclusive byte interval `start..=end` within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericRange {
    pub start: u64,
    pub end: u64,
}

impl NumericRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        NumericRange { start, end }
    }

    /// Number of bytes covered. Never zero.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    fn intersects(&self, other: &NumericRange) -> bool {
        (self.start >= other.start && self.start <= other.end)
            || (self.end >= other.start && self.end <= other.end)
            || (self.start <= other.start && self.end >= other.end)
    }

    fn merge(&self, other: &NumericRange) -> NumericRange {
        NumericRange::new(cmp::min(self.start, other.start), cmp::max(self.end, other.end))
    }
}

/// Result of parsing a `Range` header against a known resource length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeSpecs {
    /// Surviving ranges, in the order they were requested.
    Satisfiable(Vec<NumericRange>),
    /// Well-formed, but no spec selects any byte of the resource.
    NotSatisfiable,
    /// Not a `bytes=` range header; serve the full representation.
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spec {
    /// `N-M`
    Bounded(u64, u64),
    /// `N-`
    From(u64),
    /// `-N`
    Suffix(u64),
}

/// Parses `header` and clamps every spec to `length`.
pub fn parse_ranges(header: &str, length: u64) -> RangeSpecs {
    let specs = match parse_specs(header) {
        Some(specs) => specs,
        None => {
            tracing::debug!(header, "malformed range header");
            return RangeSpecs::Malformed;
        }
    };

    let ranges: Vec<NumericRange> = specs
        .into_iter()
        .filter_map(|spec| {
            let clamped = clamp(spec, length);
            if clamped.is_none() {
                tracing::debug!(?spec, length, "dropping unsatisfiable range spec");
            }
            clamped
        })
        .collect();

    if ranges.is_empty() {
        RangeSpecs::NotSatisfiable
    } else {
        RangeSpecs::Satisfiable(ranges)
    }
}

const OWS: [char; 2] = [' ', '\t'];

fn parse_specs(header: &str) -> Option<Vec<Spec>> {
    let set = header.trim_matches(OWS).strip_prefix("bytes=")?;

    set.split(',')
        .map(|spec| {
            let (first, last) = spec.trim_matches(OWS).split_once('-')?;
            match (first.is_empty(), last.is_empty()) {
                (true, true) => None,
                (true, false) => Some(Spec::Suffix(parse_digits(last)?)),
                (false, true) => Some(Spec::From(parse_digits(first)?)),
                (false, false) => Some(Spec::Bounded(parse_digits(first)?, parse_digits(last)?)),
            }
        })
        .collect()
}

// Digits only; values past u64::MAX saturate and get clamped later.
fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(s.parse().unwrap_or(u64::MAX))
}

fn clamp(spec: Spec, length: u64) -> Option<NumericRange> {
    let last = length.checked_sub(1)?;
    let (start, end) = match spec {
        Spec::Suffix(0) => return None,
        Spec::Suffix(n) => (length.saturating_sub(n), last),
        Spec::From(start) => (start, last),
        Spec::Bounded(start, end) => (start, cmp::min(end, last)),
    };
    (start <= end).then(|| NumericRange::new(start, end))
}

/// Sorts a copy of `ranges` by start and folds overlapping neighbours.
///
/// Ranges that only touch (`0-9,10-19`) are kept apart.
pub fn coalesce(ranges: &[NumericRange]) -> Vec<NumericRange> {
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|r| r.start);

    let mut merged: Vec<NumericRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.intersects(last) => *last = range.merge(last),
            _ => merged.push(range),
        }
    }
    merged
}

/// Whether the response must be framed as `multipart/byteranges`.
pub fn classify(ranges: &[NumericRange]) -> bool {
    coalesce(ranges).len() > 1
}
