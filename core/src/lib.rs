//! Passive TCP connection tracking and HTTP/1.x session reconstruction.
//!
//! flowscope ingests captured TCP segments (already lifted from raw frames by
//! an external capture collaborator), groups them into bidirectional
//! connections and per-direction flows, reassembles each flow into an ordered
//! byte stream, and drives a streaming HTTP/1.x parser that emits requests
//! and responses as they complete, decompressing gzip/deflate bodies
//! transparently.
//!
//! The pipeline is single-threaded and cooperative: one call to
//! [`ConnTracker::process`] fully processes one segment, including all
//! downstream parsing and consumer callbacks, before returning. Capture
//! threads feeding the tracker must serialize their calls.
//!
//! ```rust
//! use flowscope_core::config::default_config;
//! use flowscope_core::{ConnTracker, HttpRequest, HttpSink, HttpStatus};
//! use std::time::SystemTime;
//!
//! struct Printer;
//!
//! impl HttpSink for Printer {
//!     fn on_request_found(&mut self, _ts: SystemTime, request: &HttpRequest) {
//!         println!("{} {}", request.method(), request.url());
//!     }
//!     fn on_status_found(&mut self, _ts: SystemTime, status: &HttpStatus) {
//!         println!("{} {}", status.status_code(), status.reason_phrase());
//!     }
//! }
//!
//! let mut tracker = ConnTracker::new(default_config());
//! tracker.monitor_http(|_endpoints| Box::new(Printer));
//! // for each captured segment: tracker.process(&segment);
//! ```
//!
//! Out of scope: link-layer capture and IP/TCP header parsing (segments
//! arrive as [`TcpSegment`] records), TLS decryption, HTTP/2, and TCP
//! endpoint emulation. The reassembler trusts capture order and does not
//! reorder by sequence number; corrupted interleavings surface as session
//! errors rather than wrong data.

pub mod config;
pub mod conntrack;
pub mod errors;
pub mod events;
pub mod protocols;

pub use conntrack::conn::flow::Flow;
pub use conntrack::conn::reassembly::StreamReassembler;
pub use conntrack::conn::{CloseReason, Conn, ConnState};
pub use conntrack::conn_id::{ConnId, EndpointPair};
pub use conntrack::pdu::TcpSegment;
pub use conntrack::ConnTracker;
pub use errors::{HttpError, StreamError};
pub use protocols::stream::http::{
    HttpMethod, HttpRequest, HttpSessionWatcher, HttpSink, HttpStatus, HttpVersion, StatusCode,
};
