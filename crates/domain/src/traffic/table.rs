use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;
use ipnetwork::IpNetwork;

use super::decode::PacketMeta;
use super::entity::{PeerRecord, PeerSnapshot};
use crate::net::any_contains;

/// Traffic direction relative to the local host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// Classify a packet against the local-address set.
///
/// Returns the direction plus (peer, local) addresses, or `None` for
/// local-to-local and external-to-external traffic.
pub fn classify(
    meta: &PacketMeta,
    locals: &HashSet<IpAddr>,
) -> Option<(Direction, IpAddr, IpAddr)> {
    let src_local = locals.contains(&meta.src);
    let dst_local = locals.contains(&meta.dst);
    match (src_local, dst_local) {
        (true, false) => Some((Direction::Sent, meta.dst, meta.src)),
        (false, true) => Some((Direction::Received, meta.src, meta.dst)),
        _ => None,
    }
}

/// Shared per-peer accounting table.
///
/// One writer (the capture loop) updates records under the write lock;
/// snapshot readers and the eviction task take their own locks. Counters
/// and windows inside a record are therefore internally consistent, while
/// updates across peers interleave freely.
pub struct PeerTable {
    window: Duration,
    peers: RwLock<HashMap<IpAddr, PeerRecord>>,
}

impl PeerTable {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Account one decoded packet. Returns `true` if it was attributed to
    /// a peer, `false` if the direction check dropped it.
    pub fn observe(&self, meta: &PacketMeta, locals: &HashSet<IpAddr>) -> bool {
        let Some((direction, peer, local)) = classify(meta, locals) else {
            return false;
        };

        let now = Utc::now();
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        let record = peers
            .entry(peer)
            .or_insert_with(|| PeerRecord::new(peer, local, self.window, now));

        if let Some(flags) = meta.tcp {
            if flags.syn && !flags.ack {
                record.connections += 1;
            }
            if flags.fin || flags.rst {
                record.connections = record.connections.saturating_sub(1);
            }
        }

        match direction {
            Direction::Sent => {
                record.bytes_sent += meta.frame_len;
                record.packets_sent += 1;
                record.sent_window.record(meta.frame_len);
            }
            Direction::Received => {
                record.bytes_recv += meta.frame_len;
                record.packets_recv += 1;
                record.recv_window.record(meta.frame_len);
            }
        }
        record.local = local;
        record.last_seen = now;
        true
    }

    /// Copy every record into an immutable projection.
    pub fn snapshot(&self) -> Vec<PeerSnapshot> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.values().map(PeerRecord::snapshot).collect()
    }

    /// Snapshot with peers inside any exclude network omitted. Exclusion
    /// is a view filter only; excluded peers keep being captured.
    pub fn snapshot_filtered(&self, exclude: &[IpNetwork]) -> Vec<PeerSnapshot> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers
            .values()
            .filter(|rec| !any_contains(exclude, rec.remote))
            .map(PeerRecord::snapshot)
            .collect()
    }

    /// Drop records idle for longer than `timeout`. Returns the number of
    /// evicted peers.
    pub fn evict_idle(&self, timeout: Duration) -> usize {
        let now = Utc::now();
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        let before = peers.len();
        peers.retain(|_, rec| {
            (now - rec.last_seen)
                .to_std()
                .map_or(true, |idle| idle <= timeout)
        });
        before - peers.len()
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.peers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn backdate(&self, peer: IpAddr, last_seen: chrono::DateTime<Utc>) {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(rec) = peers.get_mut(&peer) {
            rec.last_seen = last_seen;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::decode::TcpFlags;

    const WINDOW: Duration = Duration::from_secs(30);

    fn locals() -> HashSet<IpAddr> {
        ["192.0.2.1".parse().unwrap()].into_iter().collect()
    }

    fn meta(src: &str, dst: &str, len: u64, tcp: Option<TcpFlags>) -> PacketMeta {
        PacketMeta {
            src: src.parse().unwrap(),
            dst: dst.parse().unwrap(),
            frame_len: len,
            tcp,
        }
    }

    fn syn() -> Option<TcpFlags> {
        Some(TcpFlags {
            syn: true,
            ack: false,
            fin: false,
            rst: false,
        })
    }

    fn fin() -> Option<TcpFlags> {
        Some(TcpFlags {
            syn: false,
            ack: true,
            fin: true,
            rst: false,
        })
    }

    #[test]
    fn classify_directions() {
        let locals = locals();
        let sent = meta("192.0.2.1", "203.0.113.5", 100, None);
        let (dir, peer, local) = classify(&sent, &locals).unwrap();
        assert_eq!(dir, Direction::Sent);
        assert_eq!(peer, "203.0.113.5".parse::<IpAddr>().unwrap());
        assert_eq!(local, "192.0.2.1".parse::<IpAddr>().unwrap());

        let recv = meta("203.0.113.5", "192.0.2.1", 100, None);
        let (dir, peer, _) = classify(&recv, &locals).unwrap();
        assert_eq!(dir, Direction::Received);
        assert_eq!(peer, "203.0.113.5".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn classify_drops_local_to_local_and_external_to_external() {
        let locals = locals();
        assert!(classify(&meta("192.0.2.1", "192.0.2.1", 10, None), &locals).is_none());
        assert!(classify(&meta("203.0.113.5", "198.51.100.1", 10, None), &locals).is_none());
    }

    #[test]
    fn observe_accumulates_per_direction() {
        let table = PeerTable::new(WINDOW);
        let locals = locals();
        assert!(table.observe(&meta("192.0.2.1", "203.0.113.5", 100, None), &locals));
        assert!(table.observe(&meta("203.0.113.5", "192.0.2.1", 40, None), &locals));
        assert!(table.observe(&meta("192.0.2.1", "203.0.113.5", 60, None), &locals));

        let snaps = table.snapshot();
        assert_eq!(snaps.len(), 1);
        let snap = &snaps[0];
        assert_eq!(snap.bytes_sent, 160);
        assert_eq!(snap.packets_sent, 2);
        assert_eq!(snap.bytes_recv, 40);
        assert_eq!(snap.packets_recv, 1);
    }

    #[test]
    fn cumulative_counters_bound_window_sums() {
        let table = PeerTable::new(WINDOW);
        let locals = locals();
        for _ in 0..10 {
            table.observe(&meta("192.0.2.1", "203.0.113.5", 100, None), &locals);
            table.observe(&meta("203.0.113.5", "192.0.2.1", 50, None), &locals);
        }
        let peers = table.peers.read().unwrap();
        let rec = peers.values().next().unwrap();
        assert!(rec.bytes_sent >= rec.sent_window.retained_bytes());
        assert!(rec.bytes_recv >= rec.recv_window.retained_bytes());
    }

    #[test]
    fn tcp_connection_counting() {
        let table = PeerTable::new(WINDOW);
        let locals = locals();
        let peer = "203.0.113.5";
        table.observe(&meta(peer, "192.0.2.1", 60, syn()), &locals);
        table.observe(&meta(peer, "192.0.2.1", 60, syn()), &locals);
        assert_eq!(table.snapshot()[0].connections, 2);

        table.observe(&meta(peer, "192.0.2.1", 60, fin()), &locals);
        assert_eq!(table.snapshot()[0].connections, 1);
    }

    #[test]
    fn connections_never_go_below_zero() {
        let table = PeerTable::new(WINDOW);
        let locals = locals();
        for _ in 0..3 {
            table.observe(&meta("203.0.113.5", "192.0.2.1", 60, fin()), &locals);
        }
        assert_eq!(table.snapshot()[0].connections, 0);
    }

    #[test]
    fn syn_ack_does_not_open_a_connection() {
        let table = PeerTable::new(WINDOW);
        let locals = locals();
        let syn_ack = Some(TcpFlags {
            syn: true,
            ack: true,
            fin: false,
            rst: false,
        });
        table.observe(&meta("203.0.113.5", "192.0.2.1", 60, syn_ack), &locals);
        assert_eq!(table.snapshot()[0].connections, 0);
    }

    #[test]
    fn empty_table_snapshot_is_empty() {
        let table = PeerTable::new(WINDOW);
        assert!(table.snapshot().is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn filtered_snapshot_omits_excluded_peers() {
        let table = PeerTable::new(WINDOW);
        let locals = locals();
        table.observe(&meta("10.1.2.3", "192.0.2.1", 60, None), &locals);
        table.observe(&meta("203.0.113.5", "192.0.2.1", 60, None), &locals);

        let exclude = vec!["10.0.0.0/8".parse().unwrap()];
        let filtered = table.snapshot_filtered(&exclude);
        assert_eq!(filtered.len(), 1);
        assert_eq!(
            filtered[0].remote_ip,
            "203.0.113.5".parse::<IpAddr>().unwrap()
        );
        // The raw view still carries both peers.
        assert_eq!(table.snapshot().len(), 2);
    }

    #[test]
    fn evict_idle_removes_stale_peers() {
        let table = PeerTable::new(WINDOW);
        let locals = locals();
        table.observe(&meta("10.1.2.3", "192.0.2.1", 60, None), &locals);
        table.observe(&meta("203.0.113.5", "192.0.2.1", 60, None), &locals);

        let stale: IpAddr = "10.1.2.3".parse().unwrap();
        table.backdate(stale, Utc::now() - chrono::Duration::hours(25));

        let evicted = table.evict_idle(Duration::from_secs(86_400));
        assert_eq!(evicted, 1);
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.snapshot()[0].remote_ip,
            "203.0.113.5".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn local_address_tracks_last_seen_packet() {
        let table = PeerTable::new(WINDOW);
        let locals: HashSet<IpAddr> = ["192.0.2.1".parse().unwrap(), "192.0.2.2".parse().unwrap()]
            .into_iter()
            .collect();
        table.observe(&meta("203.0.113.5", "192.0.2.1", 60, None), &locals);
        table.observe(&meta("203.0.113.5", "192.0.2.2", 60, None), &locals);
        assert_eq!(
            table.snapshot()[0].local_ip,
            "192.0.2.2".parse::<IpAddr>().unwrap()
        );
    }
}
