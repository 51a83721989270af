//! CRLF line reading over a reassembled stream.
//!
//! The reader bounds its scan by byte value: HTTP start lines and headers are
//! ASCII, so the first byte above `0x7F` short-circuits the scan instead of
//! walking an arbitrarily long binary body in search of a CRLF that will never
//! appear.

use crate::conntrack::conn::reassembly::StreamReassembler;

/// The result of one attempt to read a CRLF-terminated line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LineOutcome {
    /// No bytes are available past the cursor. Cursor untouched.
    NeedMoreBytes,
    /// Bytes are available but no CRLF appears before the end of the stream.
    /// Cursor restored to where the scan started.
    EndOfStream,
    /// A byte above `0x7F` was observed before any CRLF. Cursor restored.
    NonAscii,
    /// A full line, CRLF stripped. Cursor advanced past the CRLF.
    Line(String),
}

/// What the scan found, as indices into the peeked bytes.
enum Scan {
    NonAscii,
    Incomplete,
    /// Line content length (CRLF not included).
    Crlf(usize),
}

/// Reads up to and including the next CRLF pair from the stream cursor.
pub(crate) fn read_line(stream: &mut StreamReassembler) -> LineOutcome {
    let scan = {
        let bytes = stream.peek(stream.remaining());
        if bytes.is_empty() {
            return LineOutcome::NeedMoreBytes;
        }
        scan_for_crlf(bytes)
    };
    match scan {
        Scan::NonAscii => LineOutcome::NonAscii,
        Scan::Incomplete => LineOutcome::EndOfStream,
        Scan::Crlf(len) => {
            let line = String::from_utf8_lossy(stream.peek(len)).into_owned();
            stream.consume(len + 2);
            LineOutcome::Line(line)
        }
    }
}

fn scan_for_crlf(bytes: &[u8]) -> Scan {
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b > 0x7F {
            return Scan::NonAscii;
        }
        if b == b'\r' {
            match bytes.get(i + 1) {
                Some(b'\n') => return Scan::Crlf(i),
                // A CR not followed by LF is ordinary line content.
                Some(_) => {}
                // CR is the last byte seen so far; the LF may still arrive.
                None => return Scan::Incomplete,
            }
        }
        i += 1;
    }
    Scan::Incomplete
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conntrack::pdu::{TcpSegment, ACK};

    use std::time::SystemTime;

    fn stream_of(payload: &[u8]) -> StreamReassembler {
        let mut stream = StreamReassembler::new();
        stream
            .append(&TcpSegment::new(
                SystemTime::UNIX_EPOCH,
                "1.1.1.1:1000".parse().unwrap(),
                "2.2.2.2:80".parse().unwrap(),
                1,
                0,
                ACK,
                payload.to_vec(),
            ))
            .unwrap();
        stream
    }

    #[test]
    fn core_line_reader_terminated() {
        let mut stream = stream_of(b"GET / HTTP/1.1\r\nHost: x\r\n");
        assert_eq!(
            read_line(&mut stream),
            LineOutcome::Line("GET / HTTP/1.1".into())
        );
        assert_eq!(stream.position(), 16);
        assert_eq!(read_line(&mut stream), LineOutcome::Line("Host: x".into()));
    }

    #[test]
    fn core_line_reader_empty_stream() {
        let mut stream = StreamReassembler::new();
        assert_eq!(read_line(&mut stream), LineOutcome::NeedMoreBytes);
    }

    #[test]
    fn core_line_reader_no_crlf_yet() {
        let mut stream = stream_of(b"GET / HT");
        assert_eq!(read_line(&mut stream), LineOutcome::EndOfStream);
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn core_line_reader_trailing_cr() {
        let mut stream = stream_of(b"GET / HTTP/1.1\r");
        assert_eq!(read_line(&mut stream), LineOutcome::EndOfStream);
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn core_line_reader_lone_cr_in_content() {
        let mut stream = stream_of(b"a\rb\r\n");
        assert_eq!(read_line(&mut stream), LineOutcome::Line("a\rb".into()));
    }

    #[test]
    fn core_line_reader_non_ascii_short_circuit() {
        let mut stream = stream_of(&[0x1F, 0x8B, 0x08, b'\r', b'\n']);
        assert_eq!(read_line(&mut stream), LineOutcome::NonAscii);
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn core_line_reader_empty_line() {
        let mut stream = stream_of(b"\r\nrest");
        assert_eq!(read_line(&mut stream), LineOutcome::Line(String::new()));
        assert_eq!(stream.position(), 2);
    }
}
