use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::window::TrafficWindow;

/// Runtime accounting for one remote peer. Owned exclusively by the peer
/// table; never persisted.
#[derive(Debug)]
pub struct PeerRecord {
    pub remote: IpAddr,
    /// Local address the peer was last seen talking to/from.
    pub local: IpAddr,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Open TCP connection estimate; SYN-without-ACK opens, FIN/RST closes,
    /// floored at zero.
    pub connections: u64,
    pub sent_window: TrafficWindow,
    pub recv_window: TrafficWindow,
}

impl PeerRecord {
    pub fn new(remote: IpAddr, local: IpAddr, window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            remote,
            local,
            bytes_sent: 0,
            bytes_recv: 0,
            packets_sent: 0,
            packets_recv: 0,
            first_seen: now,
            last_seen: now,
            connections: 0,
            sent_window: TrafficWindow::new(window),
            recv_window: TrafficWindow::new(window),
        }
    }

    /// Copy into an immutable projection safe to hand to other threads.
    pub fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            remote_ip: self.remote,
            local_ip: self.local,
            bytes_sent: self.bytes_sent,
            bytes_recv: self.bytes_recv,
            packets_sent: self.packets_sent,
            packets_recv: self.packets_recv,
            bytes_sent_per_sec: self.sent_window.rate(),
            bytes_recv_per_sec: self.recv_window.rate(),
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            connections: self.connections,
        }
    }
}

/// Immutable per-peer statistics projection.
#[derive(Debug, Clone, Serialize)]
pub struct PeerSnapshot {
    pub remote_ip: IpAddr,
    pub local_ip: IpAddr,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub bytes_sent_per_sec: f64,
    pub bytes_recv_per_sec: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub connections: u64,
}

impl PeerSnapshot {
    pub fn total_bytes(&self) -> u64 {
        self.bytes_sent + self.bytes_recv
    }

    pub fn total_packets(&self) -> u64 {
        self.packets_sent + self.packets_recv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_copies_counters() {
        let now = Utc::now();
        let mut rec = PeerRecord::new(
            "203.0.113.5".parse().unwrap(),
            "192.0.2.1".parse().unwrap(),
            Duration::from_secs(30),
            now,
        );
        rec.bytes_sent = 100;
        rec.bytes_recv = 200;
        rec.packets_sent = 1;
        rec.packets_recv = 2;
        rec.connections = 3;

        let snap = rec.snapshot();
        assert_eq!(snap.total_bytes(), 300);
        assert_eq!(snap.total_packets(), 3);
        assert_eq!(snap.connections, 3);
        assert_eq!(snap.first_seen, now);
        // No traffic recorded into the windows yet.
        assert_eq!(snap.bytes_sent_per_sec, 0.0);
        assert_eq!(snap.bytes_recv_per_sec, 0.0);
    }
}
