use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;

/// Response body stream of known length. Implements [`Stream`], [`Body`],
/// and [`IntoResponse`].
///
/// Built by [`RangeProducer::into_stream`](crate::RangeProducer::into_stream).
#[pin_project]
pub struct RangedStream<S> {
    length: u64,
    #[pin]
    inner: S,
}

impl<S> RangedStream<S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    pub(crate) fn new(inner: S, length: u64) -> Self {
        RangedStream { length, inner }
    }

    /// Exact number of bytes the stream yields.
    pub fn length(&self) -> u64 {
        self.length
    }
}

impl<S> std::fmt::Debug for RangedStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangedStream")
            .field("length", &self.length)
            .finish()
    }
}

impl<S> IntoResponse for RangedStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<S> Body for RangedStream<S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.length)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<S> Stream for RangedStream<S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        self.project().inner.poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
