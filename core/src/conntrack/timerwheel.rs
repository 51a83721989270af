//! Inactive-connection expiration.
//!
//! Idle timeouts are tracked in a timer wheel owned by the tracker and drained
//! from the processing loop, so no cross-thread synchronization is needed: a
//! connection's inactivity reset on each delivered segment is just the O(1)
//! update of its `last_seen_ts`, and the wheel lazily re-buckets connections
//! that turn out to still be active when their bucket comes up.

use crate::conntrack::conn::{CloseReason, Conn};
use crate::conntrack::conn_id::ConnId;

use crossbeam_channel::{tick, Receiver};
use hashlink::linked_hash_map::LinkedHashMap;
use hashlink::linked_hash_map::RawEntryMut;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub(super) struct TimerWheel {
    /// Period between expiry sweeps (in milliseconds).
    period: usize,
    /// Start time of the wheel; bucket indices are derived from it.
    start_ts: Instant,
    /// Sweep ticker, fires every `period` milliseconds.
    ticker: Receiver<Instant>,
    /// Index of the next bucket to sweep.
    next_bucket: usize,
    /// One deadline bucket per period within the maximum timeout.
    buckets: Vec<VecDeque<ConnId>>,
}

impl TimerWheel {
    /// Creates a wheel covering timeouts up to `max_timeout` milliseconds,
    /// swept every `resolution` milliseconds.
    pub(super) fn new(max_timeout: usize, resolution: usize) -> Self {
        if resolution > max_timeout {
            panic!("Sweep period must be smaller than the maximum inactivity timeout")
        }
        TimerWheel {
            period: resolution,
            start_ts: Instant::now(),
            ticker: tick(Duration::from_millis(resolution as u64)),
            next_bucket: 0,
            buckets: vec![VecDeque::new(); max_timeout / resolution],
        }
    }

    /// Registers a new connection for expiry tracking.
    #[inline]
    pub(super) fn insert(
        &mut self,
        conn_id: &ConnId,
        last_seen_ts: Instant,
        inactivity_window: usize,
    ) {
        let current_time = (last_seen_ts - self.start_ts).as_millis() as usize;
        let index = ((current_time + inactivity_window) / self.period) % self.buckets.len();
        log::debug!("{} -> bucket {}", conn_id, index);
        self.buckets[index].push_back(conn_id.to_owned());
    }

    /// Sweeps for inactive connections if the ticker has fired. Returns the
    /// number of connections expired.
    #[inline]
    pub(super) fn check_inactive(&mut self, table: &mut LinkedHashMap<ConnId, Conn>) -> usize {
        match self.ticker.try_recv() {
            Ok(now) => self.remove_inactive(now, table),
            Err(_) => 0,
        }
    }

    /// Expires connections that have been inactive for at least their
    /// inactivity window, closing them with the timeout reason and removing
    /// them from `table`. Still-active connections found in a swept bucket
    /// are re-registered at their new deadline.
    ///
    /// Returns the number of connections expired.
    pub(super) fn remove_inactive(
        &mut self,
        now: Instant,
        table: &mut LinkedHashMap<ConnId, Conn>,
    ) -> usize {
        let period = self.period;
        let nb_buckets = self.buckets.len();
        let check_time = (now - self.start_ts).as_millis() as usize / period * period;
        let last_sweep_bucket = check_time / period;
        let mut keep: Vec<(usize, ConnId)> = vec![];
        let mut nb_expired = 0;

        for sweep_bucket in self.next_bucket..last_sweep_bucket {
            let bucket = &mut self.buckets[sweep_bucket % nb_buckets];
            for conn_id in bucket.drain(..) {
                if let RawEntryMut::Occupied(mut occupied) =
                    table.raw_entry_mut().from_key(&conn_id)
                {
                    let conn = occupied.get_mut();
                    let last_seen_time = (conn.last_seen_ts - self.start_ts).as_millis() as usize;
                    let expire_time = last_seen_time + conn.inactivity_window;
                    if expire_time < check_time {
                        nb_expired += 1;
                        conn.expire(CloseReason::Inactivity);
                        occupied.remove();
                    } else {
                        keep.push(((expire_time / period) % nb_buckets, conn_id));
                    }
                }
            }
            for (index, conn_id) in keep.drain(..) {
                self.buckets[index].push_back(conn_id);
            }
        }
        self.next_bucket = last_sweep_bucket;
        nb_expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conntrack::pdu::{TcpSegment, SYN};

    use std::time::SystemTime;

    fn segment() -> TcpSegment {
        TcpSegment::new(
            SystemTime::UNIX_EPOCH,
            "10.1.1.1:40000".parse().unwrap(),
            "10.1.1.2:80".parse().unwrap(),
            7,
            0,
            SYN,
            vec![],
        )
    }

    #[test]
    fn core_timerwheel_expires_idle_connection() {
        let mut wheel = TimerWheel::new(1000, 100);
        let mut table: LinkedHashMap<ConnId, Conn> = LinkedHashMap::new();

        let seg = segment();
        let mut conn = Conn::with_limits(&seg, 300, None);
        // Pretend the connection was last seen at wheel start.
        conn.last_seen_ts = wheel.start_ts;
        let conn_id = seg.conn_id();
        wheel.insert(&conn_id, conn.last_seen_ts, conn.inactivity_window);
        table.insert(conn_id, conn);

        // Half the window elapsed: nothing to expire.
        let expired = wheel.remove_inactive(wheel.start_ts + Duration::from_millis(200), &mut table);
        assert_eq!(expired, 0);
        assert_eq!(table.len(), 1);

        // Past the window: the connection is expired and removed.
        let expired = wheel.remove_inactive(wheel.start_ts + Duration::from_millis(600), &mut table);
        assert_eq!(expired, 1);
        assert!(table.is_empty());
    }

    #[test]
    fn core_timerwheel_rebuckets_active_connection() {
        let mut wheel = TimerWheel::new(1000, 100);
        let mut table: LinkedHashMap<ConnId, Conn> = LinkedHashMap::new();

        let seg = segment();
        let mut conn = Conn::with_limits(&seg, 300, None);
        conn.last_seen_ts = wheel.start_ts;
        let conn_id = seg.conn_id();
        wheel.insert(&conn_id, conn.last_seen_ts, conn.inactivity_window);
        table.insert(conn_id.clone(), conn);

        // Fresh activity just before the sweep keeps the connection alive.
        if let Some(conn) = table.get_mut(&conn_id) {
            conn.last_seen_ts = wheel.start_ts + Duration::from_millis(400);
        }
        let expired = wheel.remove_inactive(wheel.start_ts + Duration::from_millis(600), &mut table);
        assert_eq!(expired, 0);
        assert_eq!(table.len(), 1);

        // Once the refreshed window lapses, the re-bucketed entry expires.
        let expired =
            wheel.remove_inactive(wheel.start_ts + Duration::from_millis(1000), &mut table);
        assert_eq!(expired, 1);
        assert!(table.is_empty());
    }
}
