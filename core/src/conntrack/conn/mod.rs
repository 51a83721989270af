//! State management for connections.
//!
//! Tracks one bidirectional TCP connection: its two flows, the observed close
//! handshake, idle expiry, and (optionally) an attached HTTP session watcher.

pub mod flow;
pub mod reassembly;

use self::flow::Flow;
use crate::conntrack::conn_id::EndpointPair;
use crate::conntrack::pdu::{TcpSegment, ACK, FIN};
use crate::errors::StreamError;
use crate::events::{ListenerId, Listeners};
use crate::protocols::stream::http::{HttpSessionWatcher, HttpSink};

use std::time::{Instant, SystemTime};

/// Close progress observed on a connection.
///
/// Driven by segments from either direction: the first FIN+ACK starts the
/// close handshake, the second arms it, and the final ACK completes it. A
/// closed connection never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Open,
    /// One side has sent FIN+ACK; waiting for the other side's FIN+ACK.
    AwaitingSecondFin,
    /// Both sides have sent FIN+ACK; waiting for the final ACK.
    AwaitingLastAck,
    Closed,
}

/// Why a connection stopped being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The FIN/ACK close handshake completed.
    FlowsClosed,
    /// No segment was delivered within the inactivity window.
    Inactivity,
    /// The tracker was drained at the end of the run.
    Drained,
}

/// Payload of connection-level packet events.
#[derive(Debug, Clone, Copy)]
pub struct ConnEvent {
    /// Capture timestamp of the triggering segment.
    pub ts: SystemTime,
}

/// Payload of the connection-closed event.
#[derive(Debug, Clone, Copy)]
pub struct ConnClosedEvent {
    pub reason: CloseReason,
}

/// A tracked bidirectional connection.
///
/// Owns exactly two flows for its whole lifetime: flow 0 belongs to the first
/// endpoint observed sending a segment (arbitrary but stable), flow 1 to the
/// other endpoint.
pub struct Conn {
    endpoints: EndpointPair,
    flows: [Flow; 2],
    state: ConnState,
    pub(crate) last_seen_ts: Instant,
    first_seen_ts: Instant,
    /// Time (in milliseconds) without segments before the connection is
    /// expired for inactivity.
    pub(crate) inactivity_window: usize,
    packet_received: Listeners<Conn, ConnEvent>,
    connection_closed: Listeners<Conn, ConnClosedEvent>,
    watcher: Option<HttpSessionWatcher>,
}

impl Conn {
    /// Default inactivity window for a standalone connection (10 minutes).
    /// The tracker overrides this with its own configured window.
    pub const DEFAULT_INACTIVITY_MS: usize = 600_000;

    /// Creates a connection from its first observed segment.
    pub fn new(segment: &TcpSegment) -> Self {
        Conn::with_limits(segment, Conn::DEFAULT_INACTIVITY_MS, None)
    }

    pub(crate) fn with_limits(
        segment: &TcpSegment,
        inactivity_window: usize,
        max_buffered: Option<usize>,
    ) -> Self {
        let endpoints = segment.endpoints();
        let now = Instant::now();
        Conn {
            endpoints,
            flows: [
                Flow::new(endpoints.orig, endpoints.resp, max_buffered),
                Flow::new(endpoints.resp, endpoints.orig, max_buffered),
            ],
            state: ConnState::Open,
            last_seen_ts: now,
            first_seen_ts: now,
            inactivity_window,
            packet_received: Listeners::new(),
            connection_closed: Listeners::new(),
            watcher: None,
        }
    }

    /// The connection endpoint pair, originator first.
    #[inline]
    pub fn endpoints(&self) -> EndpointPair {
        self.endpoints
    }

    #[inline]
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Both flows; index 0 is the originator's direction.
    pub fn flows(&self) -> &[Flow; 2] {
        &self.flows
    }

    /// One flow by direction index.
    pub fn flow(&self, dir: usize) -> &Flow {
        &self.flows[dir]
    }

    /// Total segments delivered across both directions.
    pub fn total_pkts(&self) -> u64 {
        self.flows[0].total_pkts() + self.flows[1].total_pkts()
    }

    /// Total payload bytes observed across both directions.
    pub fn total_bytes(&self) -> u64 {
        self.flows[0].total_bytes() + self.flows[1].total_bytes()
    }

    /// Time between the first and the most recent delivered segment.
    pub fn duration(&self) -> std::time::Duration {
        self.last_seen_ts - self.first_seen_ts
    }

    /// When the most recent segment was delivered. Monotone non-decreasing.
    pub fn last_seen(&self) -> Instant {
        self.last_seen_ts
    }

    /// Overrides the inactivity window (in milliseconds).
    pub fn set_inactivity_window(&mut self, window_ms: usize) {
        self.inactivity_window = window_ms;
    }

    /// Attaches an HTTP session watcher feeding `sink`.
    pub fn watch_http(&mut self, sink: Box<dyn HttpSink>) {
        self.watcher = Some(HttpSessionWatcher::new(sink));
    }

    /// The attached HTTP session watcher, if any.
    pub fn http_watcher(&self) -> Option<&HttpSessionWatcher> {
        self.watcher.as_ref()
    }

    /// Registers a listener invoked for every segment delivered to the
    /// connection, after the matched flow's own events.
    pub fn on_packet_received(
        &self,
        callback: impl FnMut(&Conn, &ConnEvent) + 'static,
    ) -> ListenerId {
        self.packet_received.add(callback)
    }

    /// Registers a listener invoked once, when the connection closes.
    pub fn on_connection_closed(
        &self,
        callback: impl FnMut(&Conn, &ConnClosedEvent) + 'static,
    ) -> ListenerId {
        self.connection_closed.add(callback)
    }

    /// Direction index for a segment, by its source endpoint.
    pub(crate) fn packet_dir(&self, segment: &TcpSegment) -> Option<usize> {
        if segment.src == self.endpoints.orig {
            Some(0)
        } else if segment.src == self.endpoints.resp {
            Some(1)
        } else {
            None
        }
    }

    /// Delivers one segment: flow update and events, HTTP monitoring, close
    /// tracking, and the idle-timer reset.
    ///
    /// Late segments after the close handshake still reach the flow and its
    /// listeners; the state machine simply no longer moves.
    pub fn deliver(&mut self, segment: &TcpSegment) -> Result<(), StreamError> {
        let dir = match self.packet_dir(segment) {
            Some(dir) => dir,
            None => {
                return Err(StreamError::PacketNotPartOfStream {
                    expected: self.endpoints,
                    got: segment.endpoints(),
                })
            }
        };
        self.last_seen_ts = Instant::now();
        let result = self.flows[dir].deliver(segment);
        if let Some(watcher) = self.watcher.as_mut() {
            match &result {
                Ok(()) => watcher.on_data(&mut self.flows, dir, segment.ts),
                Err(err) => watcher.on_stream_error(err.clone()),
            }
        }
        self.update_close_state(segment);
        Self::emit_packet(self, &ConnEvent { ts: segment.ts });
        result
    }

    /// Advances the close handshake. RST does not participate: only FIN/ACK
    /// sequencing closes a tracked connection.
    fn update_close_state(&mut self, segment: &TcpSegment) {
        if self.state == ConnState::Closed {
            return;
        }
        let fin_ack = segment.flagged(FIN | ACK);
        let next = match self.state {
            ConnState::Open if fin_ack => ConnState::AwaitingSecondFin,
            ConnState::AwaitingSecondFin if fin_ack => ConnState::AwaitingLastAck,
            ConnState::AwaitingLastAck if segment.flags & ACK != 0 => ConnState::Closed,
            state => state,
        };
        if next != self.state {
            log::debug!("{}: {:?} -> {:?}", self.endpoints, self.state, next);
            self.state = next;
            if next == ConnState::Closed {
                self.close(CloseReason::FlowsClosed);
            }
        }
    }

    /// Marks the connection closed and notifies listeners and the watcher.
    fn close(&mut self, reason: CloseReason) {
        self.state = ConnState::Closed;
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.shutdown();
        }
        Self::emit_closed(self, &ConnClosedEvent { reason });
    }

    /// Closes the connection for a non-handshake reason (inactivity expiry or
    /// tracker drain). Does nothing if already closed.
    pub(crate) fn expire(&mut self, reason: CloseReason) {
        if self.state != ConnState::Closed {
            self.close(reason);
        }
    }

    fn emit_packet(&self, event: &ConnEvent) {
        self.packet_received.emit(self, event);
    }

    fn emit_closed(&self, event: &ConnClosedEvent) {
        self.connection_closed.emit(self, event);
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("endpoints", &self.endpoints)
            .field("state", &self.state)
            .field("pkts", &self.total_pkts())
            .finish()
    }
}
