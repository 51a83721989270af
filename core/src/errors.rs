//! Typed error taxonomy.
//!
//! Parse and reassembly failures are values, not panics: components return them
//! directly and the [HttpSessionWatcher](crate::protocols::stream::http::HttpSessionWatcher)
//! treats every kind below as fatal for the session it is monitoring. Needing
//! more input is not an error and is reported separately via
//! [ParseStatus](crate::protocols::stream::ParseStatus).

use crate::conntrack::conn_id::EndpointPair;

use thiserror::Error;

/// Errors raised while reassembling a per-flow byte stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The segment's endpoint pair does not match the first segment appended to
    /// this stream.
    #[error("segment {got} is not part of stream {expected}")]
    PacketNotPartOfStream {
        /// Endpoint pair of the stream's first segment.
        expected: EndpointPair,
        /// Endpoint pair of the rejected segment.
        got: EndpointPair,
    },
    /// Appending would grow the buffered stream past its configured bound.
    #[error("stream buffer limit of {limit} bytes exceeded")]
    BufferLimitExceeded { limit: usize },
}

/// Errors raised while parsing an HTTP/1.x message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HttpError {
    /// The start line did not carry a recognizable `HTTP/1.0` or `HTTP/1.1`.
    #[error("malformed HTTP version: {0:?}")]
    VersionParse(String),
    /// The status line's code field did not parse as an integer.
    #[error("malformed status code: {0:?}")]
    StatusCodeParse(String),
    /// A chunk length line did not parse as hexadecimal.
    #[error("malformed chunk length: {0:?}")]
    ChunkLengthParse(String),
    /// The `Content-Length` header value did not parse as an integer.
    #[error("malformed Content-Length: {0:?}")]
    ContentLengthParse(String),
    /// A `Content-Encoding` the decoder does not support.
    #[error("unsupported content encoding: {0:?}")]
    UnknownContentEncoding(String),
    /// The compressed body failed to inflate.
    #[error("content decoding failed: {0}")]
    Decode(String),
    /// Any other malformed input (bad start line, bad header line, missing
    /// chunk separator, non-ASCII bytes where a line was expected, ...).
    #[error("malformed HTTP message: {0}")]
    Malformed(&'static str),
    /// The underlying stream failed while the session was being monitored.
    #[error(transparent)]
    Stream(#[from] StreamError),
}
