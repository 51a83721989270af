//! Streaming HTTP/1.x message parsing.
//!
//! One [`MessageParser`] runs per direction of a monitored connection. Each
//! call to [`MessageParser::process`] consumes as much of the reassembled
//! stream as it can and either completes a message, asks for more input (with
//! the stream cursor restored to the resume point), or fails with a typed
//! error (with the cursor restored to the start of the failing step).

use crate::conntrack::conn::reassembly::StreamReassembler;
use crate::errors::HttpError;
use crate::protocols::stream::http::line_reader::{read_line, LineOutcome};
use crate::protocols::stream::http::{decode, Headers, HttpMethod, HttpVersion, Phase, StatusCode};
use crate::protocols::stream::ParseStatus;

use serde::Serialize;

// Header keys are matched literally, as the original traffic spells them.
pub(crate) const CONTENT_LENGTH: &str = "Content-Length";
pub(crate) const CONTENT_ENCODING: &str = "Content-Encoding";
pub(crate) const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub(crate) const COOKIE: &str = "Cookie";

/// A completed HTTP request. Never mutated after being handed out.
#[derive(Debug, Serialize)]
pub struct HttpRequest {
    pub(crate) method: HttpMethod,
    pub(crate) url: String,
    pub(crate) version: HttpVersion,
    pub(crate) headers: Headers,
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) compressed_body: Option<Vec<u8>>,
}

impl HttpRequest {
    #[inline]
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[inline]
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    #[inline]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Looks up a header by its literal key.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|v| v.as_str())
    }

    /// The decoded body, if the request carried one.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// The original compressed bytes, when the body was decompressed.
    pub fn compressed_body(&self) -> Option<&[u8]> {
        self.compressed_body.as_deref()
    }

    /// The declared `Content-Length`, parsed on demand.
    pub fn content_length(&self) -> Result<Option<usize>, HttpError> {
        content_length_of(&self.headers)
    }

    /// Cookie pairs from the `Cookie` header: `"a=1; b=2"` becomes
    /// `[("a", "1"), ("b", "2")]`.
    pub fn cookies(&self) -> Vec<(&str, &str)> {
        match self.headers.get(COOKIE) {
            None => Vec::new(),
            Some(raw) => raw
                .split("; ")
                .filter_map(|pair| pair.split_once('='))
                .collect(),
        }
    }
}

/// A completed HTTP response. Never mutated after being handed out.
#[derive(Debug, Serialize)]
pub struct HttpStatus {
    pub(crate) status_code: StatusCode,
    pub(crate) reason_phrase: String,
    pub(crate) version: HttpVersion,
    pub(crate) headers: Headers,
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) compressed_body: Option<Vec<u8>>,
    /// The pipelined request this status answered, when one was pending.
    pub(crate) request: Option<HttpRequest>,
}

impl HttpStatus {
    #[inline]
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    #[inline]
    pub fn reason_phrase(&self) -> &str {
        &self.reason_phrase
    }

    #[inline]
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    #[inline]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|v| v.as_str())
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn compressed_body(&self) -> Option<&[u8]> {
        self.compressed_body.as_deref()
    }

    pub fn content_length(&self) -> Result<Option<usize>, HttpError> {
        content_length_of(&self.headers)
    }

    /// The request this status was paired with, if any.
    pub fn request(&self) -> Option<&HttpRequest> {
        self.request.as_ref()
    }
}

fn content_length_of(headers: &Headers) -> Result<Option<usize>, HttpError> {
    match headers.get(CONTENT_LENGTH) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| HttpError::ContentLengthParse(raw.clone())),
    }
}

/// Which start line a parser expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageKind {
    Request,
    Status,
}

/// Incremental parser for one direction of a monitored connection.
#[derive(Debug)]
pub(crate) struct MessageParser {
    kind: MessageKind,
    phase: Phase,
    version: HttpVersion,
    method: HttpMethod,
    url: String,
    status_code: StatusCode,
    reason_phrase: String,
    headers: Headers,
    body: Vec<u8>,
    /// Set once a body phase ran, so a zero-length body is distinguishable
    /// from no body at all.
    has_body: bool,
    compressed_body: Option<Vec<u8>>,
    /// Cached at the end of the header phase.
    content_length: Option<usize>,
    /// Length of the chunk currently being consumed.
    chunk_len: usize,
}

impl MessageParser {
    pub(crate) fn new(kind: MessageKind) -> Self {
        MessageParser {
            kind,
            phase: Phase::RequestResponse,
            version: HttpVersion::Http11,
            method: HttpMethod::Unknown,
            url: String::new(),
            status_code: StatusCode::new(0),
            reason_phrase: String::new(),
            headers: Headers::new(),
            body: Vec::new(),
            has_body: false,
            compressed_body: None,
            content_length: None,
            chunk_len: 0,
        }
    }

    #[inline]
    pub(crate) fn kind(&self) -> MessageKind {
        self.kind
    }

    #[inline]
    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    /// `true` if the parser has consumed any part of a message.
    pub(crate) fn mid_message(&self) -> bool {
        self.phase != Phase::RequestResponse
    }

    /// Runs the state machine until a message completes, input runs out, or
    /// the input turns out to be malformed.
    pub(crate) fn process(
        &mut self,
        stream: &mut StreamReassembler,
    ) -> Result<ParseStatus, HttpError> {
        loop {
            let step_start = stream.position();
            let step = match self.phase {
                Phase::RequestResponse => self.read_start_line(stream),
                Phase::Headers => self.read_header_line(stream),
                Phase::Body => self.read_sized_body(stream),
                Phase::ChunkLength => self.read_chunk_length(stream),
                Phase::ChunkData => self.read_chunk_data(stream),
                Phase::ChunkSeparator => self.read_chunk_separator(stream),
            };
            match step {
                Ok(Step::Continue) => {}
                Ok(Step::NeedMore) => return Ok(ParseStatus::NeedMoreData),
                Ok(Step::Done) => return Ok(ParseStatus::Complete),
                Err(err) => {
                    stream.seek_to(step_start);
                    return Err(err);
                }
            }
        }
    }

    fn read_start_line(&mut self, stream: &mut StreamReassembler) -> Result<Step, HttpError> {
        match read_line(stream) {
            LineOutcome::Line(line) => {
                self.parse_start_line(&line)?;
                self.phase = Phase::Headers;
                Ok(Step::Continue)
            }
            LineOutcome::NeedMoreBytes | LineOutcome::EndOfStream => Ok(Step::NeedMore),
            LineOutcome::NonAscii => Err(HttpError::Malformed("non-ascii byte in start line")),
        }
    }

    fn parse_start_line(&mut self, line: &str) -> Result<(), HttpError> {
        let mut parts = line.splitn(3, ' ');
        match self.kind {
            MessageKind::Request => {
                let (method, url, version) = match (parts.next(), parts.next(), parts.next()) {
                    (Some(m), Some(u), Some(v)) => (m, u, v),
                    _ => return Err(HttpError::Malformed("request line")),
                };
                self.method = HttpMethod::from_token(method)
                    .ok_or(HttpError::Malformed("unrecognized request method"))?;
                self.url = url.to_owned();
                self.version = HttpVersion::from_token(version)?;
            }
            MessageKind::Status => {
                let version = parts
                    .next()
                    .filter(|v| !v.is_empty())
                    .ok_or(HttpError::Malformed("status line"))?;
                let code = parts.next().ok_or(HttpError::Malformed("status line"))?;
                // The reason phrase may itself contain spaces; only the first
                // two spaces delimit fields.
                let reason = parts.next().unwrap_or("");
                self.version = HttpVersion::from_token(version)?;
                let code = code
                    .parse::<u16>()
                    .map_err(|_| HttpError::StatusCodeParse(code.to_owned()))?;
                self.status_code = StatusCode::new(code);
                self.reason_phrase = reason.to_owned();
            }
        }
        Ok(())
    }

    fn read_header_line(&mut self, stream: &mut StreamReassembler) -> Result<Step, HttpError> {
        match read_line(stream) {
            LineOutcome::Line(line) if line.is_empty() => self.exit_headers(),
            LineOutcome::Line(line) => {
                let (key, value) = line
                    .split_once(": ")
                    .ok_or(HttpError::Malformed("header line"))?;
                self.headers.insert(key.to_owned(), value.to_owned());
                Ok(Step::Continue)
            }
            LineOutcome::NeedMoreBytes | LineOutcome::EndOfStream => Ok(Step::NeedMore),
            LineOutcome::NonAscii => Err(HttpError::Malformed("non-ascii byte in header line")),
        }
    }

    /// Decides what follows the blank line. `Content-Length` is preferred
    /// over `Transfer-Encoding: chunked` when both are present, matching the
    /// captured traffic this tracker was built against rather than RFC 9112.
    fn exit_headers(&mut self) -> Result<Step, HttpError> {
        if let Some(raw) = self.headers.get(CONTENT_LENGTH) {
            let length = raw
                .trim()
                .parse::<usize>()
                .map_err(|_| HttpError::ContentLengthParse(raw.clone()))?;
            self.content_length = Some(length);
            self.phase = Phase::Body;
            return Ok(Step::Continue);
        }
        if self.headers.get(TRANSFER_ENCODING).map(String::as_str) == Some("chunked") {
            self.phase = Phase::ChunkLength;
            return Ok(Step::Continue);
        }
        // No body.
        self.finish()?;
        Ok(Step::Done)
    }

    fn read_sized_body(&mut self, stream: &mut StreamReassembler) -> Result<Step, HttpError> {
        let need = self.content_length.unwrap_or(0);
        if stream.remaining() < need {
            return Ok(Step::NeedMore);
        }
        self.body = stream.read_bytes(need);
        self.has_body = true;
        self.finish()?;
        Ok(Step::Done)
    }

    fn read_chunk_length(&mut self, stream: &mut StreamReassembler) -> Result<Step, HttpError> {
        match read_line(stream) {
            LineOutcome::Line(line) => {
                let token = line.trim();
                self.chunk_len = usize::from_str_radix(token, 16)
                    .map_err(|_| HttpError::ChunkLengthParse(line.clone()))?;
                self.phase = Phase::ChunkData;
                Ok(Step::Continue)
            }
            LineOutcome::NeedMoreBytes | LineOutcome::EndOfStream => Ok(Step::NeedMore),
            LineOutcome::NonAscii => Err(HttpError::Malformed("non-ascii byte in chunk length")),
        }
    }

    fn read_chunk_data(&mut self, stream: &mut StreamReassembler) -> Result<Step, HttpError> {
        if self.chunk_len == 0 {
            // The terminal chunk carries no data.
            self.phase = Phase::ChunkSeparator;
            return Ok(Step::Continue);
        }
        if stream.remaining() < self.chunk_len {
            return Ok(Step::NeedMore);
        }
        self.body.extend_from_slice(stream.peek(self.chunk_len));
        stream.consume(self.chunk_len);
        self.has_body = true;
        self.phase = Phase::ChunkSeparator;
        Ok(Step::Continue)
    }

    fn read_chunk_separator(&mut self, stream: &mut StreamReassembler) -> Result<Step, HttpError> {
        match read_line(stream) {
            LineOutcome::Line(line) if line.is_empty() => {
                if self.chunk_len == 0 {
                    self.finish()?;
                    Ok(Step::Done)
                } else {
                    self.phase = Phase::ChunkLength;
                    Ok(Step::Continue)
                }
            }
            LineOutcome::Line(_) => Err(HttpError::Malformed("chunk separator")),
            LineOutcome::NeedMoreBytes | LineOutcome::EndOfStream => Ok(Step::NeedMore),
            LineOutcome::NonAscii => Err(HttpError::Malformed("non-ascii byte in chunk separator")),
        }
    }

    /// Runs once per message, after the last body byte is consumed. Inflates
    /// gzip/deflate bodies; any other encoding leaves the body as captured.
    fn finish(&mut self) -> Result<(), HttpError> {
        if !self.has_body {
            return Ok(());
        }
        if let Some(encoding) = self.headers.get(CONTENT_ENCODING) {
            let token = encoding.trim();
            if decode::is_supported(token) {
                let decoded = decode::decompress(token, &self.body)?;
                self.compressed_body = Some(std::mem::replace(&mut self.body, decoded));
            } else {
                log::debug!("not decoding body with content encoding {:?}", token);
            }
        }
        Ok(())
    }

    /// Hands out the completed request and resets for the next message.
    pub(crate) fn take_request(&mut self) -> HttpRequest {
        debug_assert_eq!(self.kind, MessageKind::Request);
        let kind = self.kind;
        let parser = std::mem::replace(self, MessageParser::new(kind));
        HttpRequest {
            method: parser.method,
            url: parser.url,
            version: parser.version,
            headers: parser.headers,
            body: parser.has_body.then_some(parser.body),
            compressed_body: parser.compressed_body,
        }
    }

    /// Hands out the completed status and resets for the next message.
    pub(crate) fn take_status(&mut self) -> HttpStatus {
        debug_assert_eq!(self.kind, MessageKind::Status);
        let kind = self.kind;
        let parser = std::mem::replace(self, MessageParser::new(kind));
        HttpStatus {
            status_code: parser.status_code,
            reason_phrase: parser.reason_phrase,
            version: parser.version,
            headers: parser.headers,
            body: parser.has_body.then_some(parser.body),
            compressed_body: parser.compressed_body,
            request: None,
        }
    }
}

/// Control flow of a single state-machine step.
enum Step {
    Continue,
    NeedMore,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conntrack::pdu::{TcpSegment, ACK, PSH};
    use crate::protocols::stream::http::decode::tests::{deflate, gzip};

    use std::net::SocketAddr;
    use std::time::SystemTime;

    fn src() -> SocketAddr {
        "172.16.4.20:50320".parse().unwrap()
    }

    fn dst() -> SocketAddr {
        "93.184.216.34:80".parse().unwrap()
    }

    fn stream_of(chunks: &[&[u8]]) -> StreamReassembler {
        let mut stream = StreamReassembler::new();
        let mut seq = 1u32;
        for payload in chunks {
            stream
                .append(&TcpSegment::new(
                    SystemTime::UNIX_EPOCH,
                    src(),
                    dst(),
                    seq,
                    0,
                    PSH | ACK,
                    payload.to_vec(),
                ))
                .unwrap();
            seq = seq.wrapping_add(payload.len() as u32);
        }
        stream
    }

    #[test]
    fn core_parse_request_with_sized_body() {
        let mut stream = stream_of(&[
            b"POST /ajax/chat/send.php HTTP/1.1\r\n",
            b"Host: www.example.com\r\nContent-Length: 11\r\n\r\nhello=world",
        ]);
        let mut parser = MessageParser::new(MessageKind::Request);
        assert_eq!(parser.process(&mut stream).unwrap(), ParseStatus::Complete);
        let request = parser.take_request();
        assert_eq!(request.method(), HttpMethod::Post);
        assert_eq!(request.url(), "/ajax/chat/send.php");
        assert_eq!(request.version(), HttpVersion::Http11);
        assert_eq!(request.header("Host"), Some("www.example.com"));
        assert_eq!(request.body(), Some(&b"hello=world"[..]));
        assert_eq!(request.content_length().unwrap(), Some(11));
    }

    #[test]
    fn core_parse_incremental_feeding() {
        let raw = b"GET /index.html HTTP/1.0\r\nHost: a\r\n\r\n";
        let mut parser = MessageParser::new(MessageKind::Request);
        let mut stream = StreamReassembler::new();
        for (i, byte) in raw.iter().enumerate() {
            stream
                .append(&TcpSegment::new(
                    SystemTime::UNIX_EPOCH,
                    src(),
                    dst(),
                    i as u32,
                    0,
                    ACK,
                    vec![*byte],
                ))
                .unwrap();
            let status = parser.process(&mut stream).unwrap();
            if i + 1 < raw.len() {
                assert_eq!(status, ParseStatus::NeedMoreData);
            } else {
                assert_eq!(status, ParseStatus::Complete);
            }
        }
        let request = parser.take_request();
        assert_eq!(request.method(), HttpMethod::Get);
        assert_eq!(request.version(), HttpVersion::Http10);
        assert!(request.body().is_none());
    }

    #[test]
    fn core_parse_status_reason_with_spaces() {
        let mut stream = stream_of(&[b"HTTP/1.1 404 Not Found\r\nServer: nginx\r\n\r\n"]);
        let mut parser = MessageParser::new(MessageKind::Status);
        assert_eq!(parser.process(&mut stream).unwrap(), ParseStatus::Complete);
        let status = parser.take_status();
        assert_eq!(status.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(status.reason_phrase(), "Not Found");
        assert!(status.body().is_none());
    }

    #[test]
    fn core_parse_chunked_body() {
        let mut stream = stream_of(&[
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n",
            b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
        ]);
        let mut parser = MessageParser::new(MessageKind::Status);
        assert_eq!(parser.process(&mut stream).unwrap(), ParseStatus::Complete);
        let status = parser.take_status();
        assert_eq!(status.body(), Some(&b"Wikipedia"[..]));
        assert_eq!(status.status_code(), StatusCode::OK);
    }

    #[test]
    fn core_parse_chunked_body_incremental() {
        let mut parser = MessageParser::new(MessageKind::Status);
        let mut stream = stream_of(&[b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWi"]);
        assert_eq!(
            parser.process(&mut stream).unwrap(),
            ParseStatus::NeedMoreData
        );
        stream
            .append(&TcpSegment::new(
                SystemTime::UNIX_EPOCH,
                src(),
                dst(),
                100,
                0,
                ACK,
                b"ki\r\n0\r\n\r\n".to_vec(),
            ))
            .unwrap();
        assert_eq!(parser.process(&mut stream).unwrap(), ParseStatus::Complete);
        assert_eq!(parser.take_status().body(), Some(&b"Wiki"[..]));
    }

    #[test]
    fn core_parse_gzip_body_decoded() {
        let body = b"typing notification payload";
        let compressed = gzip(body);
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n",
            compressed.len()
        );
        let mut stream = stream_of(&[head.as_bytes(), &compressed]);
        let mut parser = MessageParser::new(MessageKind::Status);
        assert_eq!(parser.process(&mut stream).unwrap(), ParseStatus::Complete);
        let status = parser.take_status();
        assert_eq!(status.body(), Some(&body[..]));
        assert_eq!(status.compressed_body(), Some(&compressed[..]));
    }

    #[test]
    fn core_parse_deflate_body_decoded() {
        let body = b"form=data&sent=1";
        let compressed = deflate(body);
        let head = format!(
            "POST /submit HTTP/1.1\r\nContent-Encoding: deflate\r\nContent-Length: {}\r\n\r\n",
            compressed.len()
        );
        let mut stream = stream_of(&[head.as_bytes(), &compressed]);
        let mut parser = MessageParser::new(MessageKind::Request);
        assert_eq!(parser.process(&mut stream).unwrap(), ParseStatus::Complete);
        let request = parser.take_request();
        assert_eq!(request.body(), Some(&body[..]));
        assert_eq!(request.compressed_body(), Some(&compressed[..]));
    }

    #[test]
    fn core_parse_unsupported_encoding_body_kept_raw() {
        // Brotli is not decoded; the body is consumed by Content-Length and
        // handed over exactly as captured.
        let raw = b"\x0b\x02\x80brotli-ish";
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Encoding: br\r\nContent-Length: {}\r\n\r\n",
            raw.len()
        );
        let mut stream = stream_of(&[head.as_bytes(), raw]);
        let mut parser = MessageParser::new(MessageKind::Status);
        assert_eq!(parser.process(&mut stream).unwrap(), ParseStatus::Complete);
        let status = parser.take_status();
        assert_eq!(status.body(), Some(&raw[..]));
        assert!(status.compressed_body().is_none());
    }

    #[test]
    fn core_parse_content_length_preferred_over_chunked() {
        let mut stream = stream_of(&[
            b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nTransfer-Encoding: chunked\r\n\r\nabcd",
        ]);
        let mut parser = MessageParser::new(MessageKind::Status);
        assert_eq!(parser.process(&mut stream).unwrap(), ParseStatus::Complete);
        assert_eq!(parser.take_status().body(), Some(&b"abcd"[..]));
    }

    #[test]
    fn core_parse_zero_content_length() {
        let mut stream = stream_of(&[b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n"]);
        let mut parser = MessageParser::new(MessageKind::Status);
        assert_eq!(parser.process(&mut stream).unwrap(), ParseStatus::Complete);
        assert_eq!(parser.take_status().body(), Some(&b""[..]));
    }

    #[test]
    fn core_parse_duplicate_header_last_write_wins() {
        let mut stream = stream_of(&[
            b"GET / HTTP/1.1\r\nX-Trace: first\r\nX-Trace: second\r\n\r\n",
        ]);
        let mut parser = MessageParser::new(MessageKind::Request);
        assert_eq!(parser.process(&mut stream).unwrap(), ParseStatus::Complete);
        let request = parser.take_request();
        assert_eq!(request.header("X-Trace"), Some("second"));
        assert_eq!(request.headers().len(), 1);
    }

    #[test]
    fn core_parse_cookies() {
        let mut stream = stream_of(&[
            b"GET / HTTP/1.1\r\nCookie: session=abc123; theme=dark\r\n\r\n",
        ]);
        let mut parser = MessageParser::new(MessageKind::Request);
        assert_eq!(parser.process(&mut stream).unwrap(), ParseStatus::Complete);
        let request = parser.take_request();
        assert_eq!(
            request.cookies(),
            vec![("session", "abc123"), ("theme", "dark")]
        );
    }

    #[test]
    fn core_parse_unknown_method_is_error() {
        let mut stream = stream_of(&[b"BREW /pot HTTP/1.1\r\n\r\n"]);
        let mut parser = MessageParser::new(MessageKind::Request);
        let err = parser.process(&mut stream).unwrap_err();
        assert_eq!(err, HttpError::Malformed("unrecognized request method"));
        // Cursor restored to the start of the failing step.
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn core_parse_bad_version_is_error() {
        let mut stream = stream_of(&[b"GET / HTTP/2.0\r\n\r\n"]);
        let mut parser = MessageParser::new(MessageKind::Request);
        assert_eq!(
            parser.process(&mut stream).unwrap_err(),
            HttpError::VersionParse("HTTP/2.0".into())
        );
    }

    #[test]
    fn core_parse_bad_status_code_is_error() {
        let mut stream = stream_of(&[b"HTTP/1.1 abc OK\r\n\r\n"]);
        let mut parser = MessageParser::new(MessageKind::Status);
        assert_eq!(
            parser.process(&mut stream).unwrap_err(),
            HttpError::StatusCodeParse("abc".into())
        );
    }

    #[test]
    fn core_parse_bad_content_length_is_error() {
        let mut stream = stream_of(&[b"HTTP/1.1 200 OK\r\nContent-Length: twelve\r\n\r\n"]);
        let mut parser = MessageParser::new(MessageKind::Status);
        assert_eq!(
            parser.process(&mut stream).unwrap_err(),
            HttpError::ContentLengthParse("twelve".into())
        );
    }

    #[test]
    fn core_parse_bad_chunk_length_is_error() {
        let mut stream = stream_of(&[
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n",
        ]);
        let mut parser = MessageParser::new(MessageKind::Status);
        assert_eq!(
            parser.process(&mut stream).unwrap_err(),
            HttpError::ChunkLengthParse("zz".into())
        );
    }

    #[test]
    fn core_parse_bad_header_line_is_error() {
        let mut stream = stream_of(&[b"GET / HTTP/1.1\r\nNoColonHere\r\n\r\n"]);
        let mut parser = MessageParser::new(MessageKind::Request);
        let before_headers = 16;
        assert_eq!(
            parser.process(&mut stream).unwrap_err(),
            HttpError::Malformed("header line")
        );
        assert_eq!(stream.position(), before_headers);
    }

    #[test]
    fn core_parse_pipelined_requests() {
        let mut stream = stream_of(&[
            b"GET /one HTTP/1.1\r\nHost: a\r\n\r\nGET /two HTTP/1.1\r\nHost: a\r\n\r\n",
        ]);
        let mut parser = MessageParser::new(MessageKind::Request);
        assert_eq!(parser.process(&mut stream).unwrap(), ParseStatus::Complete);
        assert_eq!(parser.take_request().url(), "/one");
        assert_eq!(parser.process(&mut stream).unwrap(), ParseStatus::Complete);
        assert_eq!(parser.take_request().url(), "/two");
    }
}
