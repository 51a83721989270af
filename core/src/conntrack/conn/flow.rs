//! One direction of a tracked connection.

use crate::conntrack::conn::reassembly::StreamReassembler;
use crate::conntrack::pdu::{TcpSegment, FIN};
use crate::errors::StreamError;
use crate::events::{ListenerId, Listeners};

use std::net::SocketAddr;
use std::time::SystemTime;

/// Payload of flow-level events.
#[derive(Debug, Clone, Copy)]
pub struct FlowEvent {
    /// Capture timestamp of the triggering segment.
    pub ts: SystemTime,
    /// Payload length of the triggering segment; may be zero.
    pub payload_len: usize,
    /// Total bytes reassembled on this flow after the segment was applied.
    pub stream_len: usize,
}

/// One direction of a connection: the segments sent by `endpoint` to `peer`.
///
/// A flow owns the reassembled byte stream for its direction and exposes two
/// events: packet-received (every delivered segment, payload or not) and
/// flow-closed (once, on the first observed FIN in this direction).
pub struct Flow {
    endpoint: SocketAddr,
    peer: SocketAddr,
    is_open: bool,
    last_seq: Option<u32>,
    last_ack: Option<u32>,
    nb_pkts: u64,
    nb_bytes: u64,
    stream: StreamReassembler,
    packet_received: Listeners<Flow, FlowEvent>,
    flow_closed: Listeners<Flow, FlowEvent>,
}

impl Flow {
    pub(crate) fn new(endpoint: SocketAddr, peer: SocketAddr, max_buffered: Option<usize>) -> Self {
        Flow {
            endpoint,
            peer,
            is_open: true,
            last_seq: None,
            last_ack: None,
            nb_pkts: 0,
            nb_bytes: 0,
            stream: match max_buffered {
                Some(limit) => StreamReassembler::with_limit(limit),
                None => StreamReassembler::new(),
            },
            packet_received: Listeners::new(),
            flow_closed: Listeners::new(),
        }
    }

    /// The sending endpoint of this direction.
    #[inline]
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// The receiving endpoint of this direction.
    #[inline]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// `false` once a FIN has been observed in this direction.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Sequence number of the last delivered segment.
    #[inline]
    pub fn last_seq(&self) -> Option<u32> {
        self.last_seq
    }

    /// Acknowledgment number of the last delivered segment.
    #[inline]
    pub fn last_ack(&self) -> Option<u32> {
        self.last_ack
    }

    /// Number of segments delivered to this flow.
    #[inline]
    pub fn total_pkts(&self) -> u64 {
        self.nb_pkts
    }

    /// Total payload bytes observed on this flow.
    #[inline]
    pub fn total_bytes(&self) -> u64 {
        self.nb_bytes
    }

    /// The reassembled byte stream for this direction.
    pub fn stream(&self) -> &StreamReassembler {
        &self.stream
    }

    pub(crate) fn stream_mut(&mut self) -> &mut StreamReassembler {
        &mut self.stream
    }

    /// Registers a listener invoked for every segment delivered to this flow.
    pub fn on_packet_received(
        &self,
        callback: impl FnMut(&Flow, &FlowEvent) + 'static,
    ) -> ListenerId {
        self.packet_received.add(callback)
    }

    /// Unregisters a packet-received listener.
    pub fn remove_packet_listener(&self, id: ListenerId) -> bool {
        self.packet_received.remove(id)
    }

    /// Registers a listener invoked once, when this direction closes.
    pub fn on_flow_closed(&self, callback: impl FnMut(&Flow, &FlowEvent) + 'static) -> ListenerId {
        self.flow_closed.add(callback)
    }

    /// Applies one segment to this direction.
    ///
    /// Counters and events fire even when the payload cannot be buffered; the
    /// stream error is returned for the caller to act on.
    pub(crate) fn deliver(&mut self, segment: &TcpSegment) -> Result<(), StreamError> {
        self.nb_pkts += 1;
        self.nb_bytes += segment.length() as u64;
        self.last_seq = Some(segment.seq_no);
        self.last_ack = Some(segment.ack_no);
        let result = self.stream.append(segment);
        if let Err(err) = &result {
            log::warn!("flow {}: {}", self.endpoint, err);
        }
        let event = FlowEvent {
            ts: segment.ts,
            payload_len: segment.length(),
            stream_len: self.stream.len(),
        };
        Self::emit_packet(self, &event);
        if segment.flags & FIN != 0 && self.is_open {
            self.is_open = false;
            Self::emit_closed(self, &event);
        }
        result
    }

    fn emit_packet(&self, event: &FlowEvent) {
        self.packet_received.emit(self, event);
    }

    fn emit_closed(&self, event: &FlowEvent) {
        self.flow_closed.emit(self, event);
    }
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("endpoint", &self.endpoint)
            .field("peer", &self.peer)
            .field("is_open", &self.is_open)
            .field("pkts", &self.nb_pkts)
            .field("bytes", &self.nb_bytes)
            .finish()
    }
}
