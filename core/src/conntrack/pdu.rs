//! The transport-layer segment record consumed by the tracker.
//!
//! Link-layer capture and IP/TCP header parsing are owned by an external
//! collaborator; the tracker accepts segments already lifted into
//! [`TcpSegment`] values.

use crate::conntrack::conn_id::{ConnId, EndpointPair};

use std::net::SocketAddr;
use std::time::SystemTime;

// TCP flags.
pub const CWR: u8 = 0b1000_0000;
pub const ECE: u8 = 0b0100_0000;
pub const URG: u8 = 0b0010_0000;
pub const ACK: u8 = 0b0001_0000;
pub const PSH: u8 = 0b0000_1000;
pub const RST: u8 = 0b0000_0100;
pub const SYN: u8 = 0b0000_0010;
pub const FIN: u8 = 0b0000_0001;

/// A captured TCP segment with its capture timestamp.
///
/// `flags` is the raw TCP flag byte; combine the bit constants in this module
/// when constructing segments by hand.
#[derive(Debug, Clone)]
pub struct TcpSegment {
    /// Capture timestamp (seconds + microseconds since the epoch).
    pub ts: SystemTime,
    /// Source socket address.
    pub src: SocketAddr,
    /// Destination socket address.
    pub dst: SocketAddr,
    /// Raw sequence number.
    pub seq_no: u32,
    /// Raw acknowledgment number.
    pub ack_no: u32,
    /// TCP flags.
    pub flags: u8,
    /// Payload bytes; may be empty.
    pub payload: Vec<u8>,
}

impl TcpSegment {
    pub fn new(
        ts: SystemTime,
        src: SocketAddr,
        dst: SocketAddr,
        seq_no: u32,
        ack_no: u32,
        flags: u8,
        payload: Vec<u8>,
    ) -> Self {
        TcpSegment {
            ts,
            src,
            dst,
            seq_no,
            ack_no,
            flags,
            payload,
        }
    }

    /// Returns the payload length in bytes.
    #[inline]
    pub fn length(&self) -> usize {
        self.payload.len()
    }

    /// Returns the directional endpoint pair, source first.
    #[inline]
    pub fn endpoints(&self) -> EndpointPair {
        EndpointPair::new(self.src, self.dst)
    }

    /// Returns the non-directional connection identifier.
    #[inline]
    pub fn conn_id(&self) -> ConnId {
        ConnId::new(self.src, self.dst)
    }

    /// Returns `true` if all flag bits in `mask` are set.
    #[inline]
    pub fn flagged(&self, mask: u8) -> bool {
        self.flags & mask == mask
    }
}
