//! Bidirectional connection identifiers.
//!
//! Provides endpoint-order-preserving (distinguishes originator and responder)
//! and unordered identifiers for bi-directional connections.

use std::cmp;
use std::fmt;
use std::net::SocketAddr;

use serde::Serialize;

/// Connection endpoint pair.
///
/// The sender of the first observed segment in the connection becomes the
/// originator `orig`, and the recipient becomes the responder `resp`.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Serialize)]
pub struct EndpointPair {
    /// The originator connection endpoint.
    pub orig: SocketAddr,
    /// The responder connection endpoint.
    pub resp: SocketAddr,
}

impl EndpointPair {
    /// Creates a new endpoint pair.
    pub fn new(orig: SocketAddr, resp: SocketAddr) -> Self {
        EndpointPair { orig, resp }
    }

    /// Converts the pair to a non-directional connection identifier.
    pub fn conn_id(&self) -> ConnId {
        ConnId::new(self.orig, self.resp)
    }

    /// Returns the same pair seen from the opposite direction.
    pub fn reversed(&self) -> EndpointPair {
        EndpointPair {
            orig: self.resp,
            resp: self.orig,
        }
    }
}

impl fmt::Display for EndpointPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.orig, self.resp)
    }
}

/// A generic connection identifier.
///
/// Identifies a connection independent of the source and destination socket
/// address order. Two segments belong to the same connection iff their
/// unordered endpoint pairs are equal.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ConnId(SocketAddr, SocketAddr);

impl ConnId {
    /// Returns the connection ID of a segment with `src` and `dst` IP/port pairs.
    pub fn new(src: SocketAddr, dst: SocketAddr) -> Self {
        ConnId(cmp::max(src, dst), cmp::min(src, dst))
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <> {}", self.0, self.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn core_conn_id_order_independent() {
        let a = addr("10.0.0.1:443");
        let b = addr("192.168.1.5:51000");
        assert_eq!(ConnId::new(a, b), ConnId::new(b, a));
        assert_ne!(ConnId::new(a, b), ConnId::new(a, addr("192.168.1.5:51001")));
    }

    #[test]
    fn core_endpoint_pair_reversed() {
        let pair = EndpointPair::new(addr("10.0.0.1:80"), addr("10.0.0.2:9000"));
        assert_eq!(pair.reversed().orig, pair.resp);
        assert_eq!(pair.reversed().reversed(), pair);
        assert_eq!(pair.conn_id(), pair.reversed().conn_id());
    }
}
