//! Connection state management.
//!
//! Demultiplexes captured TCP segments into bidirectional connections. Most of
//! this module's functionality is driven internally from
//! [`ConnTracker::process`]; the connection identifiers and the [`Conn`] /
//! [Flow](conn::flow::Flow) types are exposed for consumers inspecting events.

pub mod conn;
pub mod conn_id;
pub mod pdu;
mod timerwheel;

use self::conn::{CloseReason, Conn, ConnEvent, ConnState};
use self::conn_id::{ConnId, EndpointPair};
use self::pdu::{TcpSegment, RST};
use self::timerwheel::TimerWheel;
use crate::config::TrackerConfig;
use crate::events::{ListenerId, Listeners};
use crate::protocols::stream::http::HttpSink;

use hashlink::linked_hash_map::{LinkedHashMap, RawEntryMut};
use std::cmp;

/// Factory invoked once per new connection to build its HTTP sink.
type HttpSinkFactory = Box<dyn FnMut(&EndpointPair) -> Box<dyn HttpSink>>;

/// Manages state for all tracked connections.
///
/// Calls to [`process`](ConnTracker::process) must be serialized; the tracker
/// fully processes one segment, including all downstream parsing and consumer
/// callbacks, before returning. See
/// [TrackerConfig](crate::config::TrackerConfig) for the runtime options.
pub struct ConnTracker {
    /// Configuration.
    config: TrackerConfig,
    /// Manages `ConnId` to `Conn` mappings.
    table: LinkedHashMap<ConnId, Conn>,
    /// Manages connection inactivity timeouts.
    timerwheel: TimerWheel,
    /// Fires when a segment creates a new connection, before any packet or
    /// flow callback for it.
    connection_found: Listeners<Conn, ConnEvent>,
    /// Builds the HTTP sink attached to each new connection, when HTTP
    /// monitoring is enabled.
    http_factory: Option<HttpSinkFactory>,
}

impl ConnTracker {
    /// Creates a new tracker.
    pub fn new(config: TrackerConfig) -> Self {
        let table = LinkedHashMap::with_capacity(config.max_connections);
        let timerwheel = TimerWheel::new(
            cmp::max(config.inactivity_timeout, Conn::DEFAULT_INACTIVITY_MS),
            config.timeout_resolution,
        );
        ConnTracker {
            config,
            table,
            timerwheel,
            connection_found: Listeners::new(),
            http_factory: None,
        }
    }

    /// Number of connections currently tracked.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Snapshot iterator over the active connections, oldest first.
    pub fn connections(&self) -> impl Iterator<Item = &Conn> {
        self.table.values()
    }

    /// Looks up an active connection.
    pub fn get(&self, conn_id: &ConnId) -> Option<&Conn> {
        self.table.get(conn_id)
    }

    /// Registers a listener fired when a segment creates a new connection.
    pub fn on_connection_found(
        &self,
        callback: impl FnMut(&Conn, &ConnEvent) + 'static,
    ) -> ListenerId {
        self.connection_found.add(callback)
    }

    /// Enables HTTP session monitoring: `factory` runs once per new
    /// connection and returns the sink its watcher feeds.
    pub fn monitor_http(
        &mut self,
        factory: impl FnMut(&EndpointPair) -> Box<dyn HttpSink> + 'static,
    ) {
        self.http_factory = Some(Box::new(factory));
    }

    /// Processes a single incoming segment.
    ///
    /// A segment matches a connection iff its unordered endpoint pair equals
    /// the connection's; the matched flow is the one whose endpoint equals
    /// the segment's source. A segment matching nothing creates a new
    /// connection, even a bare RST (the tracker mirrors the capture source it
    /// was built against; disable with
    /// [`init_on_rst`](crate::config::TrackerConfig::init_on_rst)).
    pub fn process(&mut self, segment: &TcpSegment) {
        let conn_id = segment.conn_id();
        match self.table.raw_entry_mut().from_key(&conn_id) {
            RawEntryMut::Occupied(mut occupied) => {
                let conn = occupied.get_mut();
                if let Err(err) = conn.deliver(segment) {
                    log::warn!("{}: {}", conn.endpoints(), err);
                }
                if conn.state() == ConnState::Closed {
                    occupied.remove();
                }
            }
            RawEntryMut::Vacant(_) => {
                if self.table.len() >= self.config.max_connections {
                    log::error!("Connection table full. Dropping segment.");
                    return;
                }
                if segment.flags & RST != 0 && !self.config.init_on_rst {
                    log::debug!("not creating a connection from a RST segment");
                    return;
                }
                let mut conn = Conn::with_limits(
                    segment,
                    self.config.inactivity_timeout,
                    self.config.max_buffered_bytes,
                );
                if let Some(factory) = self.http_factory.as_mut() {
                    conn.watch_http(factory(&conn.endpoints()));
                }
                self.timerwheel
                    .insert(&conn_id, conn.last_seen_ts, conn.inactivity_window);
                self.table.insert(conn_id.clone(), conn);

                // Connection-found precedes every packet and flow callback
                // for the connection.
                if let Some(conn) = self.table.get(&conn_id) {
                    self.connection_found.emit(conn, &ConnEvent { ts: segment.ts });
                }
                if let Some(conn) = self.table.get_mut(&conn_id) {
                    if let Err(err) = conn.deliver(segment) {
                        log::warn!("{}: {}", conn.endpoints(), err);
                    }
                    if conn.state() == ConnState::Closed {
                        self.table.remove(&conn_id);
                    }
                }
            }
        }
        self.check_inactive();
    }

    /// Checks for and removes inactive connections. Called from `process`;
    /// also callable directly from a quiet capture loop.
    pub fn check_inactive(&mut self) {
        let nb_expired = self.timerwheel.check_inactive(&mut self.table);
        if nb_expired > 0 {
            log::debug!("expired {} connections", nb_expired);
        }
    }

    /// Closes and removes every remaining connection on shutdown.
    pub fn drain(&mut self) {
        log::info!("Draining connection table");
        for (_, mut conn) in self.table.drain() {
            conn.expire(CloseReason::Drained);
        }
    }
}

impl Default for ConnTracker {
    fn default() -> Self {
        ConnTracker::new(TrackerConfig::default())
    }
}
