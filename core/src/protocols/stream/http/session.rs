//! HTTP session watching.
//!
//! An [`HttpSessionWatcher`] monitors both flows of one connection. It first
//! discovers which flow carries requests by speculatively parsing the head of
//! each stream, then pairs completed requests with completed statuses across
//! the two directions, FIFO, so pipelined sessions resolve correctly.

use crate::conntrack::conn::flow::Flow;
use crate::errors::{HttpError, StreamError};
use crate::protocols::stream::http::{HttpRequest, HttpStatus, MessageKind, MessageParser};
use crate::protocols::stream::ParseStatus;

use std::collections::VecDeque;
use std::panic;
use std::time::SystemTime;

/// Consumer callbacks for reconstructed HTTP traffic.
///
/// One sink is attached per monitored connection. Panics escaping a sink
/// method are caught and suppressed; they are the consumer's concern, not the
/// pipeline's.
pub trait HttpSink {
    /// A request completed on the client flow.
    fn on_request_found(&mut self, ts: SystemTime, request: &HttpRequest);

    /// A status completed on the server flow. `status.request()` carries the
    /// pipelined request it answered, when one was pending.
    fn on_status_found(&mut self, ts: SystemTime, status: &HttpStatus);

    /// The session failed and monitoring stopped.
    fn on_session_error(&mut self, error: &HttpError) {
        let _ = error;
    }
}

/// The discovered role of one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Not yet discovered; the parser's kind is speculative.
    Unknown,
    /// The flow carries requests.
    Client,
    /// The flow carries statuses.
    Server,
}

impl Role {
    fn opposite(self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
            Role::Unknown => Role::Unknown,
        }
    }

    fn kind(self) -> MessageKind {
        match self {
            // Unknown flows speculate request-first.
            Role::Client | Role::Unknown => MessageKind::Request,
            Role::Server => MessageKind::Status,
        }
    }
}

/// Per-direction monitoring state: the discovered role and the in-progress
/// parse for that direction.
#[derive(Debug)]
struct FlowMonitor {
    role: Role,
    parser: MessageParser,
}

impl FlowMonitor {
    fn new() -> Self {
        FlowMonitor {
            role: Role::Unknown,
            parser: MessageParser::new(MessageKind::Request),
        }
    }
}

/// Reconstructs the HTTP conversation on one connection.
pub struct HttpSessionWatcher {
    monitors: [FlowMonitor; 2],
    /// Completed requests not yet answered by a status, oldest first.
    awaiting_status: VecDeque<HttpRequest>,
    sink: Box<dyn HttpSink>,
    stopped: bool,
}

impl HttpSessionWatcher {
    pub fn new(sink: Box<dyn HttpSink>) -> Self {
        HttpSessionWatcher {
            monitors: [FlowMonitor::new(), FlowMonitor::new()],
            awaiting_status: VecDeque::new(),
            sink,
            stopped: false,
        }
    }

    /// `true` once the watcher has torn down its monitors.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Number of completed requests still waiting for a status.
    pub fn pending_requests(&self) -> usize {
        self.awaiting_status.len()
    }

    /// Drives the direction `dir` after new bytes were appended to its flow.
    pub(crate) fn on_data(&mut self, flows: &mut [Flow; 2], dir: usize, ts: SystemTime) {
        if self.stopped {
            return;
        }
        loop {
            let result = self.monitors[dir].parser.process(flows[dir].stream_mut());
            match result {
                Ok(ParseStatus::Complete) => {
                    if self.monitors[dir].role == Role::Unknown {
                        let role = match self.monitors[dir].parser.kind() {
                            MessageKind::Request => Role::Client,
                            MessageKind::Status => Role::Server,
                        };
                        self.assign_roles(flows, dir, role);
                    }
                    self.complete_message(flows, dir, ts);
                }
                Ok(ParseStatus::NeedMoreData) => break,
                Err(err) => {
                    let monitor = &mut self.monitors[dir];
                    if monitor.role == Role::Unknown
                        && monitor.parser.kind() == MessageKind::Request
                    {
                        // Not a request flow after all; retry the head of the
                        // stream as a status line.
                        monitor.parser = MessageParser::new(MessageKind::Status);
                        flows[dir].stream_mut().seek_to(0);
                        continue;
                    }
                    self.fail(&err);
                    break;
                }
            }
        }
    }

    /// A stream-level failure on either flow tears the session down.
    pub(crate) fn on_stream_error(&mut self, error: StreamError) {
        if self.stopped {
            return;
        }
        self.fail(&HttpError::Stream(error));
    }

    /// Stops monitoring without reporting an error; used when the connection
    /// itself goes away (close or inactivity expiry).
    pub(crate) fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        for monitor in &self.monitors {
            if monitor.parser.mid_message() {
                log::debug!("session watcher shut down mid-message");
                break;
            }
        }
    }

    /// Pins the role of `dir` and of its opposite flow. A flow whose
    /// speculative parser kind does not match its pinned role restarts from
    /// the head of its stream with the right kind.
    fn assign_roles(&mut self, flows: &mut [Flow; 2], dir: usize, role: Role) {
        self.monitors[dir].role = role;
        log::debug!("flow {} assigned {:?}", flows[dir].endpoint(), role);
        let opp = dir ^ 1;
        if self.monitors[opp].role == Role::Unknown {
            let opp_role = role.opposite();
            self.monitors[opp].role = opp_role;
            if self.monitors[opp].parser.kind() != opp_role.kind() {
                self.monitors[opp].parser = MessageParser::new(opp_role.kind());
                flows[opp].stream_mut().seek_to(0);
            }
        }
    }

    /// Emits the message that just completed on `dir` and trims the consumed
    /// prefix of that flow's stream.
    fn complete_message(&mut self, flows: &mut [Flow; 2], dir: usize, ts: SystemTime) {
        match self.monitors[dir].role {
            Role::Client => {
                let request = self.monitors[dir].parser.take_request();
                self.emit_request(ts, &request);
                self.awaiting_status.push_back(request);
            }
            Role::Server => {
                let mut status = self.monitors[dir].parser.take_status();
                status.request = self.awaiting_status.pop_front();
                self.emit_status(ts, &status);
            }
            Role::Unknown => unreachable!("message completed before role discovery"),
        }
        let stream = flows[dir].stream_mut();
        *stream = stream.trim_unused_packets();
    }

    fn fail(&mut self, error: &HttpError) {
        log::debug!("session watcher tearing down: {}", error);
        self.stopped = true;
        let sink = &mut self.sink;
        if panic::catch_unwind(panic::AssertUnwindSafe(|| sink.on_session_error(error))).is_err() {
            log::warn!("http sink panicked in on_session_error");
        }
    }

    fn emit_request(&mut self, ts: SystemTime, request: &HttpRequest) {
        let sink = &mut self.sink;
        if panic::catch_unwind(panic::AssertUnwindSafe(|| sink.on_request_found(ts, request)))
            .is_err()
        {
            log::warn!("http sink panicked in on_request_found");
        }
    }

    fn emit_status(&mut self, ts: SystemTime, status: &HttpStatus) {
        let sink = &mut self.sink;
        if panic::catch_unwind(panic::AssertUnwindSafe(|| sink.on_status_found(ts, status)))
            .is_err()
        {
            log::warn!("http sink panicked in on_status_found");
        }
    }
}

impl std::fmt::Debug for HttpSessionWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSessionWatcher")
            .field("monitors", &self.monitors)
            .field("pending_requests", &self.awaiting_status.len())
            .field("stopped", &self.stopped)
            .finish()
    }
}
