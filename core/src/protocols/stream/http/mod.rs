//! HTTP/1.x session reconstruction.
//!
//! The reconstructor parses requests and responses directly out of the two
//! reassembled streams of a connection, one streaming state machine per
//! direction. It handles pipelined requests, `Content-Length` and chunked
//! bodies, and transparent gzip/deflate body decompression, keeping at most
//! one bounded buffer per direction.
//!
//! ## Remarks
//! Only HTTP 1.0 and 1.1 are recognized; HTTP/2 and TLS-wrapped traffic are
//! out of scope. Bodies with an unsupported `Content-Encoding` (e.g. brotli)
//! are handed to the consumer exactly as captured.

pub(crate) mod decode;
pub(crate) mod line_reader;
mod message;
mod session;

pub use self::message::{HttpRequest, HttpStatus};
pub use self::session::{HttpSessionWatcher, HttpSink};
pub(crate) use self::message::{MessageKind, MessageParser};

use crate::errors::HttpError;

use indexmap::IndexMap;
use serde::Serialize;

use std::fmt;

/// Header map: literal keys, insertion-ordered, last write wins on duplicates.
pub type Headers = IndexMap<String, String>;

/// HTTP protocol version carried on a message's start line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl HttpVersion {
    pub(crate) fn from_token(token: &str) -> Result<Self, HttpError> {
        match token {
            "HTTP/1.0" => Ok(HttpVersion::Http10),
            "HTTP/1.1" => Ok(HttpVersion::Http11),
            _ => Err(HttpError::VersionParse(token.to_owned())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request method.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HttpMethod {
    Head,
    Get,
    Post,
    Put,
    Delete,
    Trace,
    Options,
    Connect,
    #[default]
    Unknown,
}

impl HttpMethod {
    /// Maps a request-line token to a method. Tokens are case-sensitive, as
    /// the protocol requires.
    pub(crate) fn from_token(token: &str) -> Option<Self> {
        match token {
            "HEAD" => Some(HttpMethod::Head),
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            "TRACE" => Some(HttpMethod::Trace),
            "OPTIONS" => Some(HttpMethod::Options),
            "CONNECT" => Some(HttpMethod::Connect),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Head => "HEAD",
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response status code.
///
/// Well-known codes are available as named constants; any other value is
/// retained as the raw integer seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const CONTINUE: StatusCode = StatusCode(100);
    pub const SWITCHING_PROTOCOLS: StatusCode = StatusCode(101);
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const ACCEPTED: StatusCode = StatusCode(202);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const PARTIAL_CONTENT: StatusCode = StatusCode(206);
    pub const MOVED_PERMANENTLY: StatusCode = StatusCode(301);
    pub const FOUND: StatusCode = StatusCode(302);
    pub const SEE_OTHER: StatusCode = StatusCode(303);
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);
    pub const TEMPORARY_REDIRECT: StatusCode = StatusCode(307);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const REQUEST_TIMEOUT: StatusCode = StatusCode(408);
    pub const LENGTH_REQUIRED: StatusCode = StatusCode(411);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const NOT_IMPLEMENTED: StatusCode = StatusCode(501);
    pub const BAD_GATEWAY: StatusCode = StatusCode(502);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);
    pub const GATEWAY_TIMEOUT: StatusCode = StatusCode(504);

    pub fn new(code: u16) -> Self {
        StatusCode(code)
    }

    #[inline]
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// The canonical reason phrase for well-known codes.
    pub fn canonical_reason(&self) -> Option<&'static str> {
        match self.0 {
            100 => Some("Continue"),
            101 => Some("Switching Protocols"),
            200 => Some("OK"),
            201 => Some("Created"),
            202 => Some("Accepted"),
            204 => Some("No Content"),
            206 => Some("Partial Content"),
            301 => Some("Moved Permanently"),
            302 => Some("Found"),
            303 => Some("See Other"),
            304 => Some("Not Modified"),
            307 => Some("Temporary Redirect"),
            400 => Some("Bad Request"),
            401 => Some("Unauthorized"),
            403 => Some("Forbidden"),
            404 => Some("Not Found"),
            405 => Some("Method Not Allowed"),
            408 => Some("Request Timeout"),
            411 => Some("Length Required"),
            500 => Some("Internal Server Error"),
            501 => Some("Not Implemented"),
            502 => Some("Bad Gateway"),
            503 => Some("Service Unavailable"),
            504 => Some("Gateway Timeout"),
            _ => None,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The parsing phase a direction's state machine is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for (or mid-way through) the request or status line.
    RequestResponse,
    /// Consuming header lines until the blank line.
    Headers,
    /// Consuming a `Content-Length`-delimited body.
    Body,
    /// Consuming a chunk length line.
    ChunkLength,
    /// Consuming a chunk's data bytes.
    ChunkData,
    /// Consuming the CRLF that terminates a chunk.
    ChunkSeparator,
}
