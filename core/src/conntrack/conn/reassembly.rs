//! Per-flow byte-stream reassembly.
//!
//! A [`StreamReassembler`] accumulates the non-empty payloads observed on one
//! flow into a contiguous buffer, together with one [`PacketInfo`] record per
//! payload-carrying segment. Consumers read through a cursor and periodically
//! trim the consumed prefix so that at most one bounded buffer is held per
//! direction.
//!
//! Segments are assumed to arrive in transmission order (the capture loop's
//! natural order); the reassembler does not reorder by sequence number.
//! Duplicated or reordered captures therefore surface as corrupt data to the
//! protocol parsers above, which fail the session rather than the process.
//! `PacketInfo::seq` is retained for diagnostics.

use crate::conntrack::conn_id::EndpointPair;
use crate::conntrack::pdu::TcpSegment;
use crate::errors::StreamError;

use std::io;
use std::io::SeekFrom;

/// Bookkeeping for one payload-carrying segment in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo {
    /// Raw TCP sequence number of the segment.
    pub seq: u32,
    /// Payload length in bytes; never zero.
    pub length: usize,
    /// Offset of the payload within the stream buffer, equal to the sum of
    /// the lengths of all prior records.
    pub offset: usize,
}

/// Growable byte buffer with an explicit read cursor.
///
/// The cursor may be positioned past the end of the data; reads clamp to the
/// bytes available.
#[derive(Debug, Default, Clone)]
struct SeekableBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl SeekableBuffer {
    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Bytes at the cursor without advancing, clamped to availability.
    fn peek(&self, n: usize) -> &[u8] {
        let start = self.pos.min(self.data.len());
        let end = (start + n).min(self.data.len());
        &self.data[start..end]
    }

    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.data.len());
    }

    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        let target = match from {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
            SeekFrom::End(delta) => self.data.len() as i64 + delta,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ));
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }
}

/// Ordered concatenation of the non-empty TCP payloads observed on a flow.
#[derive(Debug, Default)]
pub struct StreamReassembler {
    /// Directional identity of the first appended segment; later appends must
    /// match it.
    endpoints: Option<EndpointPair>,
    packets: Vec<PacketInfo>,
    buf: SeekableBuffer,
    max_buffered: Option<usize>,
}

impl StreamReassembler {
    pub fn new() -> Self {
        StreamReassembler::default()
    }

    /// Creates a reassembler that refuses to buffer more than `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        StreamReassembler {
            max_buffered: Some(limit),
            ..StreamReassembler::default()
        }
    }

    /// Appends one segment's payload to the stream.
    ///
    /// The first segment pins the stream's directional endpoint pair; any
    /// later segment with a different pair is rejected. Empty payloads are
    /// dropped silently. The read cursor is never moved by an append.
    pub fn append(&mut self, segment: &TcpSegment) -> Result<(), StreamError> {
        let pair = segment.endpoints();
        match self.endpoints {
            None => self.endpoints = Some(pair),
            Some(expected) if expected == pair => {}
            Some(expected) => {
                return Err(StreamError::PacketNotPartOfStream {
                    expected,
                    got: pair,
                })
            }
        }
        if segment.payload.is_empty() {
            return Ok(());
        }
        if let Some(limit) = self.max_buffered {
            if self.buf.len() + segment.payload.len() > limit {
                return Err(StreamError::BufferLimitExceeded { limit });
            }
        }
        self.packets.push(PacketInfo {
            seq: segment.seq_no,
            length: segment.payload.len(),
            offset: self.buf.len(),
        });
        self.buf.data.extend_from_slice(&segment.payload);
        Ok(())
    }

    /// Total buffered bytes; equals the sum of all recorded packet lengths.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.len() == 0
    }

    /// Current read cursor.
    #[inline]
    pub fn position(&self) -> usize {
        self.buf.pos
    }

    /// Bytes available between the cursor and the end of the stream.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Per-packet records, in arrival order.
    pub fn packets(&self) -> &[PacketInfo] {
        &self.packets
    }

    /// The endpoint pair pinned by the first appended segment.
    pub fn endpoints(&self) -> Option<EndpointPair> {
        self.endpoints
    }

    /// Reads up to `n` bytes from the cursor, advancing it.
    pub fn read_bytes(&mut self, n: usize) -> Vec<u8> {
        let out = self.buf.peek(n).to_vec();
        self.buf.advance(out.len());
        out
    }

    pub(crate) fn peek(&self, n: usize) -> &[u8] {
        self.buf.peek(n)
    }

    pub(crate) fn consume(&mut self, n: usize) {
        self.buf.advance(n);
    }

    pub(crate) fn seek_to(&mut self, pos: usize) {
        self.buf.pos = pos;
    }

    /// Index of the packet record containing stream offset `pos`.
    fn packet_index_at(&self, pos: usize) -> Option<usize> {
        if pos >= self.buf.len() {
            return None;
        }
        Some(
            self.packets
                .partition_point(|p| p.offset + p.length <= pos),
        )
    }

    /// Moves the cursor to the start of the packet following the one that
    /// contains it.
    ///
    /// Returns `false`, leaving the cursor at the end of the stream, if no
    /// such packet exists.
    pub fn advance_to_next_packet(&mut self) -> bool {
        if let Some(idx) = self.packet_index_at(self.buf.pos) {
            if idx + 1 < self.packets.len() {
                self.buf.pos = self.packets[idx + 1].offset;
                return true;
            }
        }
        self.buf.pos = self.buf.len();
        false
    }

    /// Returns a fresh stream holding only the packet records at or after the
    /// cursor, with offsets and cursor rebased to zero.
    ///
    /// The first-segment endpoint identity and the buffering limit carry over,
    /// so future appends validate exactly as they would have on `self`. Reads
    /// from the returned stream yield the same bytes the original would have
    /// yielded from the same logical position.
    #[must_use]
    pub fn trim_unused_packets(&self) -> StreamReassembler {
        let base = match self.packet_index_at(self.buf.pos) {
            Some(idx) => self.packets[idx].offset,
            // Cursor at (or past) the end: nothing is retained.
            None => self.buf.len(),
        };
        let packets = self
            .packets
            .iter()
            .filter(|p| p.offset >= base)
            .map(|p| PacketInfo {
                seq: p.seq,
                length: p.length,
                offset: p.offset - base,
            })
            .collect();
        StreamReassembler {
            endpoints: self.endpoints,
            packets,
            buf: SeekableBuffer {
                data: self.buf.data[base..].to_vec(),
                pos: self.buf.pos - base,
            },
            max_buffered: self.max_buffered,
        }
    }
}

impl io::Read for StreamReassembler {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.buf.peek(out.len());
        let n = available.len();
        out[..n].copy_from_slice(available);
        self.buf.advance(n);
        Ok(n)
    }
}

impl io::Seek for StreamReassembler {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        self.buf.seek(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conntrack::pdu::{ACK, PSH, SYN};

    use std::io::Seek;
    use std::net::SocketAddr;
    use std::time::{Duration, SystemTime};

    const BANNER: &[u8] = b"SSH-2.0-OpenSSH_4.7p1 Debian-8ubuntu1\n";

    fn client() -> SocketAddr {
        "192.168.1.10:56780".parse().unwrap()
    }

    fn server() -> SocketAddr {
        "10.0.0.2:22".parse().unwrap()
    }

    fn seg(src: SocketAddr, dst: SocketAddr, seq: u32, flags: u8, payload: &[u8]) -> TcpSegment {
        TcpSegment::new(
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_200_000_000),
            src,
            dst,
            seq,
            0,
            flags,
            payload.to_vec(),
        )
    }

    /// Handshake segments (no payload) followed by the banner payload.
    fn handshake_then_banner() -> Vec<TcpSegment> {
        vec![
            seg(server(), client(), 1, SYN, b""),
            seg(server(), client(), 2, SYN | ACK, b""),
            seg(server(), client(), 3, ACK, b""),
            seg(server(), client(), 4, PSH | ACK, BANNER),
        ]
    }

    #[test]
    fn core_stream_append_read() {
        let mut stream = StreamReassembler::new();
        for s in handshake_then_banner() {
            stream.append(&s).unwrap();
        }
        assert_eq!(stream.len(), 38);
        assert_eq!(stream.packets().len(), 1);
        assert_eq!(stream.read_bytes(38), BANNER);
        assert_eq!(stream.position(), 38);
    }

    #[test]
    fn core_stream_seek_round_trip() {
        let mut stream = StreamReassembler::new();
        for s in handshake_then_banner() {
            stream.append(&s).unwrap();
        }
        stream.seek(SeekFrom::End(0)).unwrap();
        assert_eq!(stream.position(), stream.len());
        stream.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn core_stream_read_spanning_packets() {
        let mut stream = StreamReassembler::new();
        for s in handshake_then_banner() {
            stream.append(&s).unwrap();
        }
        stream
            .append(&seg(
                server(),
                client(),
                5,
                PSH | ACK,
                b"diffie-hellman-group-exchange-sha1,diffie-hellman-group14-sha1",
            ))
            .unwrap();
        // 26 bytes finish out the banner; the next 14 start the second packet.
        stream.seek(SeekFrom::Start(12)).unwrap();
        let first = stream.read_bytes(26);
        assert_eq!(first, &BANNER[12..38]);
        assert_eq!(stream.read_bytes(14), b"diffie-hellman");
    }

    #[test]
    fn core_stream_zero_length_payloads_dropped() {
        let mut stream = StreamReassembler::new();
        for s in handshake_then_banner() {
            stream.append(&s).unwrap();
        }
        assert_eq!(stream.packets().len(), 1);
        assert_eq!(
            stream.len(),
            stream.packets().iter().map(|p| p.length).sum::<usize>()
        );
    }

    #[test]
    fn core_stream_rejects_foreign_segment() {
        let mut stream = StreamReassembler::new();
        stream.append(&seg(client(), server(), 1, ACK, b"hello")).unwrap();
        // Same connection, opposite direction: not part of this stream.
        let err = stream
            .append(&seg(server(), client(), 2, ACK, b"world"))
            .unwrap_err();
        assert!(matches!(err, StreamError::PacketNotPartOfStream { .. }));
        assert_eq!(stream.len(), 5);
    }

    #[test]
    fn core_stream_buffer_limit() {
        let mut stream = StreamReassembler::with_limit(8);
        stream.append(&seg(client(), server(), 1, ACK, b"12345")).unwrap();
        let err = stream
            .append(&seg(client(), server(), 2, ACK, b"6789"))
            .unwrap_err();
        assert_eq!(err, StreamError::BufferLimitExceeded { limit: 8 });
        assert_eq!(stream.len(), 5);
    }

    #[test]
    fn core_stream_advance_to_next_packet() {
        let mut stream = StreamReassembler::new();
        stream.append(&seg(client(), server(), 1, ACK, b"aaaa")).unwrap();
        stream.append(&seg(client(), server(), 2, ACK, b"bb")).unwrap();
        stream.consume(1);
        assert!(stream.advance_to_next_packet());
        assert_eq!(stream.position(), 4);
        assert!(!stream.advance_to_next_packet());
        assert_eq!(stream.position(), stream.len());
    }

    #[test]
    fn core_stream_trim_preserves_reads() {
        let mut stream = StreamReassembler::new();
        stream.append(&seg(client(), server(), 1, ACK, b"consumed")).unwrap();
        stream.append(&seg(client(), server(), 2, ACK, b"retained")).unwrap();
        stream.append(&seg(client(), server(), 3, ACK, b"tail")).unwrap();
        stream.consume(8 + 3);

        let mut trimmed = stream.trim_unused_packets();
        assert_eq!(trimmed.len(), 12);
        assert_eq!(trimmed.position(), 3);
        assert_eq!(trimmed.packets()[0].offset, 0);
        assert_eq!(trimmed.read_bytes(9), b"ainedtail");

        // Identity survives the trim.
        let err = trimmed
            .append(&seg(server(), client(), 4, ACK, b"x"))
            .unwrap_err();
        assert!(matches!(err, StreamError::PacketNotPartOfStream { .. }));
        trimmed.append(&seg(client(), server(), 4, ACK, b"more")).unwrap();
        assert_eq!(trimmed.len(), 16);
    }

    #[test]
    fn core_stream_trim_at_end_empties() {
        let mut stream = StreamReassembler::new();
        stream.append(&seg(client(), server(), 1, ACK, b"data")).unwrap();
        stream.consume(4);
        let trimmed = stream.trim_unused_packets();
        assert_eq!(trimmed.len(), 0);
        assert_eq!(trimmed.position(), 0);
        assert!(trimmed.packets().is_empty());
    }
}
