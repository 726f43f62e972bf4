use bytes::{Bytes, BytesMut};

use crate::error::{RangeError, Result};
use crate::parse::NumericRange;
use crate::source::ByteSource;

/// One transmitted part: an optional multipart preamble followed by the
/// bytes of a single range.
#[derive(Debug)]
pub(crate) struct RangeChunk {
    range: NumericRange,
    preamble: Bytes,
    preamble_pos: usize,
    range_pos: u64,
}

impl RangeChunk {
    pub(crate) fn new(range: NumericRange) -> Self {
        RangeChunk::with_preamble(range, Bytes::new())
    }

    pub(crate) fn with_preamble(range: NumericRange, preamble: Bytes) -> Self {
        RangeChunk { range, preamble, preamble_pos: 0, range_pos: 0 }
    }

    pub(crate) fn range(&self) -> NumericRange {
        self.range
    }

    /// Bytes this chunk contributes to the body, preamble included.
    pub(crate) fn calc_size(&self) -> u64 {
        self.range.len() + self.preamble.len() as u64
    }

    /// Bytes not yet packed.
    pub(crate) fn readable_bytes(&self) -> u64 {
        (self.preamble.len() - self.preamble_pos) as u64 + (self.range.len() - self.range_pos)
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.readable_bytes() == 0
    }

    /// Appends up to `limit - out.len()` bytes to `out`, preamble first.
    ///
    /// Returns the number of bytes appended. Fails if the source ends
    /// before the range is fully delivered.
    pub(crate) async fn pack(
        &mut self,
        out: &mut BytesMut,
        limit: usize,
        source: &mut ByteSource,
    ) -> Result<usize> {
        let mut count = 0;

        let room = limit.saturating_sub(out.len());
        let n = std::cmp::min(room, self.preamble.len() - self.preamble_pos);
        if n > 0 {
            out.extend_from_slice(&self.preamble[self.preamble_pos..self.preamble_pos + n]);
            self.preamble_pos += n;
            count += n;
        }

        let room = limit.saturating_sub(out.len());
        let remaining = self.range.len() - self.range_pos;
        let want = std::cmp::min(room, usize::try_from(remaining).unwrap_or(usize::MAX));
        if want > 0 {
            let offset = self.range.start + self.range_pos;
            let at = out.len();
            out.resize(at + want, 0);
            let got = source.read_at(offset, &mut out[at..]).await?;
            if got < want {
                out.truncate(at + got);
                return Err(RangeError::ShortRead { offset, expected: want, actual: got });
            }
            self.range_pos += want as u64;
            count += want;
        }

        Ok(count)
    }
}

/// MIME part header written ahead of each range in a multipart body.
pub fn preamble(boundary: &str, content_type: &str, range: NumericRange, length: u64) -> Bytes {
    Bytes::from(format!(
        "--{}\r\nContent-Type: {}\r\nContent-Range: bytes {}-{}/{}\r\n\r\n",
        boundary, content_type, range.start, range.end, length,
    ))
}
