use serde::Deserialize;

use crate::error::{RangeError, Result};

/// Boundary used between `multipart/byteranges` parts unless configured otherwise.
pub const DEFAULT_BOUNDARY: &str = "21458390-ebd6-11e4-b80c-0800200c9a66";

/// Size of the buffer filled by each [`RangeProducer::read_chunk`](crate::RangeProducer::read_chunk).
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Tunables for ranged responses.
///
/// Deserializable so it can live in an application's config file; every
/// field falls back to its default when missing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    /// Upper bound on the bytes returned by one pull.
    pub buffer_size: usize,
    /// Multipart boundary token. Used verbatim in the `Content-Type` header
    /// and in every part preamble.
    pub boundary: String,
    /// Transmit the merged, sorted range set. On by default.
    ///
    /// When off, a multipart body sends the ranges as requested, so
    /// `bytes=0-10,5-20,50-59` repeats bytes 5-10 in two parts.
    pub coalesce_overlapping: bool,
}

impl Default for RangeConfig {
    fn default() -> Self {
        RangeConfig {
            buffer_size: DEFAULT_BUFFER_SIZE,
            boundary: DEFAULT_BOUNDARY.to_string(),
            coalesce_overlapping: true,
        }
    }
}

impl RangeConfig {
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = boundary.into();
        self
    }

    /// Replaces the fixed boundary with a fresh per-response token.
    pub fn with_generated_boundary(self) -> Self {
        self.with_boundary(generate_boundary())
    }

    pub fn coalesce_overlapping(mut self, coalesce: bool) -> Self {
        self.coalesce_overlapping = coalesce;
        self
    }

    /// Checks the boundary against RFC 2046 and rejects a zero buffer size.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(RangeError::InvalidBufferSize);
        }
        if !is_valid_boundary(&self.boundary) {
            return Err(RangeError::InvalidBoundary(self.boundary.clone()));
        }
        Ok(())
    }
}

/// Generates a unique boundary string for multipart responses.
pub fn generate_boundary() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("RANGE_BOUNDARY-{}----", timestamp)
}

// bchars := bcharsnospace / " "
fn is_valid_boundary(boundary: &str) -> bool {
    let len = boundary.len();
    if len == 0 || len > 70 || boundary.ends_with(' ') {
        return false;
    }
    boundary.bytes().all(|b| {
        b.is_ascii_alphanumeric() || b"'()+_,-./:=? ".contains(&b)
    })
}
