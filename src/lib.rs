//! # axum-byteranges
//!
//! HTTP byte-range responses for [`axum`][1]: single `206 Partial Content`
//! bodies, `multipart/byteranges` bodies and `416 Range Not Satisfiable`.
//!
//! A [`ByteSource`] is either a file or an in-memory buffer of known
//! length. The `Range` header is evaluated against it to produce a
//! [`RangeProducer`], a pull-based body that emits exactly
//! [`total_length`](RangeProducer::total_length) bytes in bounded buffers.
//! [`Ranged`] wires all of this into an axum responder.
//!
//! ```
//! use axum::Router;
//! use axum::http::HeaderMap;
//! use axum::routing::get;
//!
//! use axum_byteranges::{ByteSource, Ranged};
//!
//! async fn file(headers: HeaderMap) -> Ranged {
//!     let body = ByteSource::memory(&b"Hello world this is a file to test range requests on!\n"[..]);
//!     Ranged::from_headers(&headers, body, Some("text/plain".to_string()))
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     // build our application with a single route
//!     let _app = Router::<()>::new().route("/", get(file));
//!
//!     // run it with hyper on localhost:3000
//!     #[cfg(feature = "run_server_in_example")]
//!     {
//!         let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!         axum::serve(listener, _app).await.unwrap();
//!     }
//! }
//! ```
//!
//! [1]: https://docs.rs/axum

mod chunk;
mod config;
mod error;
mod framing;
mod parse;
mod producer;
mod source;
mod stream;

use std::path::Path;

use axum::http::header::RANGE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

pub use config::{generate_boundary, RangeConfig, DEFAULT_BOUNDARY, DEFAULT_BUFFER_SIZE};
pub use error::{RangeError, Result};
pub use framing::{format_full, format_not_satisfiable, format_partial, RangeHeaders};
pub use parse::{classify, coalesce, parse_ranges, NumericRange, RangeSpecs};
pub use producer::{ParseOutcome, RangeProducer};
pub use source::{content_type_for, ByteSource};
pub use stream::RangedStream;

#[derive(Debug)]
/// The main responder type. Implements [`IntoResponse`].
pub struct Ranged {
    range: Option<String>,
    source: ByteSource,
    content_type: Option<String>,
    config: RangeConfig,
}

impl Ranged {
    /// Construct a ranged response over `source` and the raw value of an
    /// optional `Range` header.
    pub fn new(range: Option<String>, source: ByteSource, content_type: Option<String>) -> Self {
        Ranged { range, source, content_type, config: RangeConfig::default() }
    }

    /// Like [`Ranged::new`], taking the `Range` header from a request's
    /// headers. A header that is not visible ASCII counts as absent.
    pub fn from_headers(headers: &HeaderMap, source: ByteSource, content_type: Option<String>) -> Self {
        let range = headers
            .get(RANGE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ranged::new(range, source, content_type)
    }

    /// Opens `path` and guesses its content type from the extension.
    pub async fn open(range: Option<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = ByteSource::open(path).await?;
        Ok(Ranged::new(range, source, Some(content_type_for(path))))
    }

    pub fn with_config(mut self, config: RangeConfig) -> Self {
        self.config = config;
        self
    }

    /// Responds to the request, returning headers and body as
    /// [`RangedResponse`]. Returns [`RangeRejection::NotSatisfiable`] if
    /// no requested range overlaps the source.
    pub fn try_respond(self) -> std::result::Result<RangedResponse, RangeRejection> {
        let content_type = self.content_type.unwrap_or_else(|| framing::OCTET_STREAM.to_string());

        let outcome = RangeProducer::evaluate(self.range.as_deref(), content_type.clone(), self.source, &self.config)
            .map_err(RangeRejection::Misconfigured)?;

        match outcome {
            ParseOutcome::Partial(producer) => {
                let headers = format_partial(&producer);
                Ok(RangedResponse::Partial { headers, producer })
            }
            ParseOutcome::NotSatisfiable { length } => {
                Err(RangeRejection::NotSatisfiable(RangeNotSatisfiable(length)))
            }
            ParseOutcome::Unranged(source) => {
                let producer = RangeProducer::full(source, content_type, &self.config)
                    .map_err(RangeRejection::Misconfigured)?;
                let headers = format_full(&producer);
                Ok(RangedResponse::Full { headers, producer })
            }
        }
    }
}

impl IntoResponse for Ranged {
    fn into_response(self) -> Response {
        self.try_respond().into_response()
    }
}

/// Error type indicating that the requested range was not satisfiable.
/// Holds the length of the resource. Implements [`IntoResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeNotSatisfiable(pub u64);

impl IntoResponse for RangeNotSatisfiable {
    fn into_response(self) -> Response {
        let RangeHeaders { status, headers } = format_not_satisfiable(self.0);
        (status, headers, ()).into_response()
    }
}

/// Why [`Ranged::try_respond`] produced no body. Implements [`IntoResponse`].
#[derive(Debug)]
pub enum RangeRejection {
    NotSatisfiable(RangeNotSatisfiable),
    /// The [`RangeConfig`] failed validation.
    Misconfigured(RangeError),
}

impl IntoResponse for RangeRejection {
    fn into_response(self) -> Response {
        match self {
            RangeRejection::NotSatisfiable(rejection) => rejection.into_response(),
            RangeRejection::Misconfigured(err) => {
                tracing::error!(error = %err, "invalid range configuration");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Computed headers and body producer for a range response. Implements
/// [`IntoResponse`].
#[derive(Debug)]
pub enum RangedResponse {
    /// Full content response, no usable range requested.
    Full {
        headers: RangeHeaders,
        producer: RangeProducer,
    },
    /// `206 Partial Content`, single part or `multipart/byteranges`.
    Partial {
        headers: RangeHeaders,
        producer: RangeProducer,
    },
}

impl RangedResponse {
    pub fn headers(&self) -> &RangeHeaders {
        match self {
            RangedResponse::Full { headers, .. } | RangedResponse::Partial { headers, .. } => headers,
        }
    }
}

impl IntoResponse for RangedResponse {
    fn into_response(self) -> Response {
        let (RangedResponse::Full { headers, producer } | RangedResponse::Partial { headers, producer }) = self;
        let RangeHeaders { status, headers } = headers;
        (status, headers, producer.into_stream()).into_response()
    }
}
