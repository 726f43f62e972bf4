use std::io;

use axum::http::HeaderValue;
use bytes::{Bytes, BytesMut};
use futures::Stream;

use crate::chunk::{self, RangeChunk};
use crate::config::RangeConfig;
use crate::error::{RangeError, Result};
use crate::framing::OCTET_STREAM;
use crate::parse::{self, NumericRange, RangeSpecs};
use crate::source::ByteSource;
use crate::stream::RangedStream;

/// What to do with a request after looking at its `Range` header.
#[derive(Debug)]
pub enum ParseOutcome {
    /// Respond `206 Partial Content` from this producer.
    Partial(RangeProducer),
    /// Respond `416 Range Not Satisfiable` for a resource of `length` bytes.
    /// The source has been released.
    NotSatisfiable { length: u64 },
    /// No usable `Range` header. The source is handed back so the full
    /// representation can be served.
    Unranged(ByteSource),
}

/// Pull-based producer of a ranged response body.
///
/// Owns the [`ByteSource`] and an ordered list of parts. Each pull fills a
/// bounded buffer across part boundaries. The total length is fixed at
/// construction and the producer emits exactly that many bytes or fails.
///
/// Not meant to be shared: one consumer drives it through `&mut self`.
#[derive(Debug)]
pub struct RangeProducer {
    chunks: Vec<RangeChunk>,
    current: usize,
    total_bytes: u64,
    bytes_emitted: u64,
    source: Option<ByteSource>,
    resource_length: u64,
    content_type: String,
    boundary: String,
    multipart: bool,
    buffer_size: usize,
    poisoned: bool,
}

impl RangeProducer {
    /// Evaluates `header` against `source`.
    ///
    /// The only error is an invalid `config`; malformed and unsatisfiable
    /// headers are reported through [`ParseOutcome`].
    pub fn evaluate(
        header: Option<&str>,
        content_type: impl Into<String>,
        source: ByteSource,
        config: &RangeConfig,
    ) -> Result<ParseOutcome> {
        config.validate()?;

        let Some(header) = header else {
            return Ok(ParseOutcome::Unranged(source));
        };

        let length = source.len();
        match parse::parse_ranges(header, length) {
            RangeSpecs::Malformed => Ok(ParseOutcome::Unranged(source)),
            RangeSpecs::NotSatisfiable => {
                tracing::debug!(header, length, "range not satisfiable");
                Ok(ParseOutcome::NotSatisfiable { length })
            }
            RangeSpecs::Satisfiable(ranges) => {
                let multipart = parse::classify(&ranges);
                // a single-part body can only carry one contiguous span
                let ranges = if !multipart || config.coalesce_overlapping {
                    parse::coalesce(&ranges)
                } else {
                    ranges
                };
                let producer = RangeProducer::build(ranges, multipart, content_type.into(), source, config);
                Ok(ParseOutcome::Partial(producer))
            }
        }
    }

    /// Producer for the whole source, used for `200 OK` responses.
    pub fn full(source: ByteSource, content_type: impl Into<String>, config: &RangeConfig) -> Result<RangeProducer> {
        config.validate()?;
        let ranges = match source.len().checked_sub(1) {
            Some(last) => vec![NumericRange::new(0, last)],
            None => Vec::new(),
        };
        Ok(RangeProducer::build(ranges, false, content_type.into(), source, config))
    }

    fn build(
        ranges: Vec<NumericRange>,
        multipart: bool,
        content_type: String,
        source: ByteSource,
        config: &RangeConfig,
    ) -> RangeProducer {
        let resource_length = source.len();
        let content_type = checked_content_type(content_type);
        let chunks: Vec<RangeChunk> = ranges
            .into_iter()
            .map(|range| {
                if multipart {
                    let preamble = chunk::preamble(&config.boundary, &content_type, range, resource_length);
                    RangeChunk::with_preamble(range, preamble)
                } else {
                    RangeChunk::new(range)
                }
            })
            .collect();
        let total_bytes: u64 = chunks.iter().map(RangeChunk::calc_size).sum();

        tracing::debug!(parts = chunks.len(), multipart, total_bytes, resource_length, "built range producer");

        RangeProducer {
            chunks,
            current: 0,
            total_bytes,
            bytes_emitted: 0,
            source: Some(source),
            resource_length,
            content_type,
            boundary: config.boundary.clone(),
            multipart,
            buffer_size: config.buffer_size,
            poisoned: false,
        }
    }

    /// Fills a buffer of at most `max_bytes` (at least one) and returns it.
    ///
    /// Returns `Ok(None)` once every part has been delivered, and keeps
    /// returning it on later calls. A read failure poisons the producer.
    pub async fn pull(&mut self, max_bytes: usize) -> Result<Option<Bytes>> {
        if self.poisoned {
            return Err(RangeError::Poisoned);
        }
        if self.is_done() {
            return Ok(None);
        }

        let remaining = self.total_bytes - self.bytes_emitted;
        let Some(source) = self.source.as_mut() else {
            return Err(RangeError::Closed { remaining });
        };

        let limit = std::cmp::max(max_bytes, 1);
        let mut out = BytesMut::with_capacity(std::cmp::min(limit as u64, remaining) as usize);

        while out.len() < limit && self.current < self.chunks.len() {
            let chunk = &mut self.chunks[self.current];
            if chunk.is_exhausted() {
                self.current += 1;
                continue;
            }
            if let Err(e) = chunk.pack(&mut out, limit, source).await {
                tracing::warn!(error = %e, range = ?chunk.range(), "aborting ranged body");
                self.poisoned = true;
                return Err(e);
            }
        }

        if out.is_empty() {
            return Ok(None);
        }

        self.bytes_emitted += out.len() as u64;
        tracing::trace!(len = out.len(), progress = self.bytes_emitted, total = self.total_bytes, "pulled");
        Ok(Some(out.freeze()))
    }

    /// [`pull`](Self::pull) with the configured buffer size.
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        self.pull(self.buffer_size).await
    }

    /// Bytes emitted so far.
    pub fn progress(&self) -> u64 {
        self.bytes_emitted
    }

    /// Bytes the body will contain in total; the `Content-Length`.
    pub fn total_length(&self) -> u64 {
        self.total_bytes
    }

    pub fn is_done(&self) -> bool {
        self.chunks[self.current..].iter().all(RangeChunk::is_exhausted)
    }

    pub fn is_multipart(&self) -> bool {
        self.multipart
    }

    /// Length of the underlying resource, as used in `Content-Range`.
    pub fn resource_length(&self) -> u64 {
        self.resource_length
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// The transmitted ranges, in body order.
    pub fn ranges(&self) -> impl Iterator<Item = NumericRange> + '_ {
        self.chunks.iter().map(RangeChunk::range)
    }

    /// Releases the source. Dropping the producer does the same.
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            tracing::debug!(progress = self.bytes_emitted, total = self.total_bytes, "closed range producer");
        }
    }

    /// Turns the producer into a response body stream.
    pub fn into_stream(self) -> RangedStream<impl Stream<Item = io::Result<Bytes>> + Send + 'static> {
        // a producer already pulled from only owes the rest
        let length = self.total_bytes - self.bytes_emitted;
        let mut producer = self;
        let inner = async_stream::stream! {
            loop {
                match producer.read_chunk().await {
                    Ok(Some(chunk)) => {
                        yield Ok(chunk);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(io::Error::from(e));
                        break;
                    }
                }
            }
            producer.close();
        };
        RangedStream::new(inner, length)
    }
}

// The content type is echoed into part headers, so it must be a valid header value.
fn checked_content_type(content_type: String) -> String {
    if HeaderValue::from_str(&content_type).is_ok() {
        content_type
    } else {
        tracing::warn!(content_type = %content_type, "unusable content type, using {}", OCTET_STREAM);
        OCTET_STREAM.to_string()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use futures::{pin_mut, StreamExt};

    use super::*;
    use crate::config::DEFAULT_BOUNDARY;

    fn digits(len: usize) -> ByteSource {
        let bytes: Vec<u8> = (0..len).map(|i| b'0' + (i % 10) as u8).collect();
        ByteSource::memory(bytes)
    }

    fn evaluate(header: &str, source: ByteSource, config: &RangeConfig) -> ParseOutcome {
        RangeProducer::evaluate(Some(header), "text/plain", source, config).unwrap()
    }

    fn partial(header: &str, source: ByteSource) -> RangeProducer {
        assert_matches!(evaluate(header, source, &RangeConfig::default()), ParseOutcome::Partial(p) => p)
    }

    async fn drain(producer: &mut RangeProducer, max: usize) -> Vec<u8> {
        let mut body = Vec::new();
        while let Some(chunk) = producer.pull(max).await.unwrap() {
            assert!(!chunk.is_empty());
            assert!(chunk.len() <= max);
            body.extend_from_slice(&chunk);
        }
        body
    }

    #[tokio::test]
    async fn single_range() {
        let mut producer = partial("bytes=10-19", digits(100));
        assert!(!producer.is_multipart());
        assert_eq!(vec![NumericRange::new(10, 19)], producer.ranges().collect::<Vec<_>>());
        assert_eq!(10, producer.total_length());
        assert_eq!(b"0123456789".to_vec(), drain(&mut producer, 8192).await);
        assert_eq!(10, producer.progress());
        assert!(producer.is_done());
    }

    #[tokio::test]
    async fn single_range_end_clamped() {
        let producer = partial("bytes=95-400", digits(100));
        assert_eq!(vec![NumericRange::new(95, 99)], producer.ranges().collect::<Vec<_>>());
        assert_eq!(5, producer.total_length());
    }

    #[tokio::test]
    async fn suffix_range() {
        let mut producer = partial("bytes=-3", digits(100));
        assert_eq!(vec![NumericRange::new(97, 99)], producer.ranges().collect::<Vec<_>>());
        assert_eq!(b"789".to_vec(), drain(&mut producer, 1).await);
    }

    #[tokio::test]
    async fn open_end_past_length_is_not_satisfiable() {
        let outcome = evaluate("bytes=100-", digits(100), &RangeConfig::default());
        assert_matches!(outcome, ParseOutcome::NotSatisfiable { length: 100 });
    }

    #[tokio::test]
    async fn malformed_and_absent_hand_source_back() {
        let outcome = evaluate("bytes=abc", digits(10), &RangeConfig::default());
        assert_matches!(outcome, ParseOutcome::Unranged(source) => assert_eq!(10, source.len()));

        let outcome = RangeProducer::evaluate(None, "text/plain", digits(10), &RangeConfig::default()).unwrap();
        assert_matches!(outcome, ParseOutcome::Unranged(_));
    }

    #[tokio::test]
    async fn invalid_config_is_an_error() {
        let config = RangeConfig::default().with_boundary("bad\r\nboundary");
        let result = RangeProducer::evaluate(Some("bytes=0-1"), "text/plain", digits(10), &config);
        assert_matches!(result, Err(RangeError::InvalidBoundary(_)));
    }

    #[tokio::test]
    async fn multipart_two_ranges() {
        let mut producer = partial("bytes=0-99,200-299", digits(1000));
        assert!(producer.is_multipart());

        let first = format!("--{DEFAULT_BOUNDARY}\r\nContent-Type: text/plain\r\nContent-Range: bytes 0-99/1000\r\n\r\n");
        let second = format!("--{DEFAULT_BOUNDARY}\r\nContent-Type: text/plain\r\nContent-Range: bytes 200-299/1000\r\n\r\n");
        let expected_total = 100 + 100 + first.len() as u64 + second.len() as u64;
        assert_eq!(expected_total, producer.total_length());

        let body = drain(&mut producer, 64).await;
        assert_eq!(expected_total, body.len() as u64);
        assert_eq!(expected_total, producer.progress());

        let payload = "0123456789".repeat(10);
        let expected = format!("{first}{payload}{second}{payload}");
        assert_eq!(expected.as_bytes(), &body[..]);
    }

    #[tokio::test]
    async fn overlapping_ranges_collapse_to_single_part() {
        let mut producer = partial("bytes=5-20,0-10", digits(100));
        assert!(!producer.is_multipart());
        assert_eq!(vec![NumericRange::new(0, 20)], producer.ranges().collect::<Vec<_>>());
        assert_eq!(21, producer.total_length());
        assert_eq!(21, drain(&mut producer, 4).await.len());
    }

    #[tokio::test]
    async fn overlapping_multipart_sends_merged_parts() {
        let mut producer = partial("bytes=0-10,5-20,50-59", digits(100));
        assert!(producer.is_multipart());
        assert_eq!(
            vec![NumericRange::new(0, 20), NumericRange::new(50, 59)],
            producer.ranges().collect::<Vec<_>>()
        );

        let first = format!("--{DEFAULT_BOUNDARY}\r\nContent-Type: text/plain\r\nContent-Range: bytes 0-20/100\r\n\r\n");
        let second = format!("--{DEFAULT_BOUNDARY}\r\nContent-Type: text/plain\r\nContent-Range: bytes 50-59/100\r\n\r\n");
        let expected = format!("{first}012345678901234567890{second}0123456789");
        assert_eq!(expected.len() as u64, producer.total_length());
        assert_eq!(expected.as_bytes(), &drain(&mut producer, 16).await[..]);

        let outcome = evaluate("bytes=50-59,0-10,5-20", digits(100), &RangeConfig::default());
        let producer = assert_matches!(outcome, ParseOutcome::Partial(p) => p);
        assert_eq!(
            vec![NumericRange::new(0, 20), NumericRange::new(50, 59)],
            producer.ranges().collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn overlapping_multipart_kept_as_requested_when_not_coalescing() {
        let config = RangeConfig::default().coalesce_overlapping(false);
        let outcome = evaluate("bytes=0-10,5-20,50-59", digits(100), &config);
        let producer = assert_matches!(outcome, ParseOutcome::Partial(p) => p);
        assert!(producer.is_multipart());
        assert_eq!(
            vec![NumericRange::new(0, 10), NumericRange::new(5, 20), NumericRange::new(50, 59)],
            producer.ranges().collect::<Vec<_>>()
        );

        // one contiguous span stays a single part either way
        let outcome = evaluate("bytes=5-20,0-10", digits(100), &config);
        let producer = assert_matches!(outcome, ParseOutcome::Partial(p) => p);
        assert!(!producer.is_multipart());
        assert_eq!(vec![NumericRange::new(0, 20)], producer.ranges().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn sum_of_pulls_matches_total_for_any_buffer_size() {
        for max in [1, 2, 7, 64, 100, 8192] {
            let mut producer = partial("bytes=0-0,-1,10-49,90-", digits(100));
            let total = producer.total_length();
            let body = drain(&mut producer, max).await;
            assert_eq!(total, body.len() as u64, "buffer size {max}");
            assert_eq!(total, producer.progress());
            assert!(producer.is_done());
        }
    }

    #[tokio::test]
    async fn pull_after_done_is_idempotent() {
        let mut producer = partial("bytes=0-4", digits(10));
        assert_eq!(5, drain(&mut producer, 8192).await.len());
        for _ in 0..3 {
            assert_matches!(producer.pull(8192).await, Ok(None));
            assert_eq!(5, producer.progress());
            assert!(producer.is_done());
        }
    }

    #[tokio::test]
    async fn is_done_after_exact_fill() {
        let mut producer = partial("bytes=0-3", digits(10));
        let chunk = producer.pull(4).await.unwrap().unwrap();
        assert_eq!(4, chunk.len());
        assert!(producer.is_done());
        assert_matches!(producer.pull(4).await, Ok(None));
    }

    #[tokio::test]
    async fn zero_max_still_progresses() {
        let mut producer = partial("bytes=0-1", digits(10));
        assert_eq!(1, producer.pull(0).await.unwrap().unwrap().len());
    }

    #[tokio::test]
    async fn read_chunk_uses_configured_buffer() {
        let config = RangeConfig::default().with_buffer_size(3);
        let outcome = evaluate("bytes=0-9", digits(10), &config);
        let mut producer = assert_matches!(outcome, ParseOutcome::Partial(p) => p);
        assert_eq!(3, producer.read_chunk().await.unwrap().unwrap().len());
        assert_eq!(3, producer.progress());
    }

    #[tokio::test]
    async fn content_type_with_line_break_is_replaced() {
        let source = digits(100);
        let outcome = RangeProducer::evaluate(Some("bytes=0-1,5-6"), "text/plain\r\nx: y", source, &RangeConfig::default());
        let producer = assert_matches!(outcome, Ok(ParseOutcome::Partial(p)) => p);
        assert_eq!("application/octet-stream", producer.content_type());
    }

    #[tokio::test]
    async fn file_backed_multipart() {
        let source = ByteSource::open("test/fixture.txt").await.unwrap();
        let outcome = evaluate("bytes=0-4,-6", source, &RangeConfig::default().with_boundary("B"));
        let mut producer = assert_matches!(outcome, ParseOutcome::Partial(p) => p);
        let body = drain(&mut producer, 7).await;
        let expected = "--B\r\nContent-Type: text/plain\r\nContent-Range: bytes 0-4/54\r\n\r\nHello\
                        --B\r\nContent-Type: text/plain\r\nContent-Range: bytes 48-53/54\r\n\r\ns on!\n";
        assert_eq!(expected.as_bytes(), &body[..]);
    }

    #[tokio::test]
    async fn short_read_poisons() {
        // a declared length longer than the file forces EOF mid-range
        let file = tokio::fs::File::open("test/fixture.txt").await.unwrap();
        let source = ByteSource::File { file, len: 100 };
        let outcome = evaluate("bytes=40-", source, &RangeConfig::default());
        let mut producer = assert_matches!(outcome, ParseOutcome::Partial(p) => p);

        assert_matches!(producer.pull(8192).await, Err(RangeError::ShortRead { offset: 40, expected: 60, actual: 14 }));
        assert_eq!(0, producer.progress());
        assert_matches!(producer.pull(8192).await, Err(RangeError::Poisoned));
    }

    // reading a directory handle fails with EISDIR
    async fn unreadable(len: u64) -> ByteSource {
        let file = tokio::fs::File::open("test").await.unwrap();
        ByteSource::File { file, len }
    }

    #[tokio::test]
    async fn read_error_mid_range_poisons() {
        let outcome = evaluate("bytes=0-1,5-6", unreadable(10).await, &RangeConfig::default());
        let mut producer = assert_matches!(outcome, ParseOutcome::Partial(p) => p);

        // preamble bytes only, no read yet
        assert_eq!(3, producer.pull(3).await.unwrap().unwrap().len());
        assert_matches!(producer.pull(8192).await, Err(RangeError::Io(_)));
        assert_eq!(3, producer.progress());
        assert_matches!(producer.pull(8192).await, Err(RangeError::Poisoned));
        assert_matches!(producer.pull(8192).await, Err(RangeError::Poisoned));
    }

    #[tokio::test]
    async fn close_releases_source() {
        let mut producer = partial("bytes=0-9", digits(10));
        producer.pull(4).await.unwrap();
        producer.close();
        assert_matches!(producer.pull(4).await, Err(RangeError::Closed { remaining: 6 }));

        let mut producer = partial("bytes=0-9", digits(10));
        drain(&mut producer, 100).await;
        producer.close();
        assert_matches!(producer.pull(4).await, Ok(None));
    }

    #[tokio::test]
    async fn full_producer() {
        let mut producer = RangeProducer::full(digits(25), "text/plain", &RangeConfig::default()).unwrap();
        assert_eq!(25, producer.total_length());
        assert!(!producer.is_multipart());
        assert_eq!(25, drain(&mut producer, 10).await.len());

        let mut producer = RangeProducer::full(digits(0), "text/plain", &RangeConfig::default()).unwrap();
        assert_eq!(0, producer.total_length());
        assert!(producer.is_done());
        assert_matches!(producer.pull(10).await, Ok(None));
    }

    #[tokio::test]
    async fn into_stream_yields_whole_body() {
        let producer = partial("bytes=0-2,7-9", digits(10));
        let total = producer.total_length();
        let stream = producer.into_stream();
        pin_mut!(stream);
        let mut len = 0;
        while let Some(chunk) = stream.next().await {
            len += chunk.unwrap().len() as u64;
        }
        assert_eq!(total, len);
    }

    #[tokio::test]
    async fn into_stream_after_pulls_hints_remaining_length() {
        let mut producer = partial("bytes=0-9", digits(10));
        assert_eq!(b"0123".to_vec(), producer.pull(4).await.unwrap().unwrap().to_vec());

        let stream = producer.into_stream();
        assert_eq!(Some(6), http_body::Body::size_hint(&stream).exact());
        assert_eq!(6, stream.length());

        pin_mut!(stream);
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(b"456789".to_vec(), body);
    }

    #[tokio::test]
    async fn into_stream_ends_after_read_error() {
        let producer = partial("bytes=0-4", unreadable(10).await);
        let stream = producer.into_stream();
        pin_mut!(stream);
        assert_matches!(stream.next().await, Some(Err(_)));
        assert_matches!(stream.next().await, None);
        assert_matches!(stream.next().await, None);
    }
}
