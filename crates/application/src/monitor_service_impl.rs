use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use domain::traffic::decode::decode_frame;
use domain::traffic::entity::PeerSnapshot;
use domain::traffic::table::PeerTable;
use ipnetwork::IpNetwork;
use ports::secondary::metrics_port::MetricsPort;
use ports::secondary::packet_source::PacketSource;
use tokio_util::sync::CancellationToken;

/// How often the eviction task wakes to drop idle peers.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Traffic monitor: owns the peer table and the capture/eviction tasks.
///
/// The capture loop is one dedicated OS thread blocking on the packet
/// source; snapshot readers run from any number of other threads. The
/// exclude list filters the snapshot view only; excluded peers are still
/// captured.
pub struct MonitorService {
    table: Arc<PeerTable>,
    locals: HashSet<IpAddr>,
    exclude: Vec<IpNetwork>,
    idle_timeout: Duration,
    metrics: Arc<dyn MetricsPort>,
}

impl MonitorService {
    pub fn new(
        window: Duration,
        idle_timeout: Duration,
        locals: HashSet<IpAddr>,
        exclude: Vec<IpNetwork>,
        metrics: Arc<dyn MetricsPort>,
    ) -> Self {
        Self {
            table: Arc::new(PeerTable::new(window)),
            locals,
            exclude,
            idle_timeout,
            metrics,
        }
    }

    /// Spawn the capture loop on its own thread.
    ///
    /// The loop drains the source until it fails or the token is
    /// cancelled; timeout ticks (`Ok(None)`) only re-check the token.
    pub fn spawn_capture(
        self: Arc<Self>,
        mut source: Box<dyn PacketSource>,
        shutdown: CancellationToken,
    ) -> thread::JoinHandle<()> {
        let monitor = self;
        thread::Builder::new()
            .name("netwarden-capture".to_string())
            .spawn(move || {
                tracing::info!("capture loop started");
                loop {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    match source.next_frame() {
                        Ok(Some(frame)) => monitor.process_frame(&frame),
                        Ok(None) => continue,
                        Err(err) => {
                            tracing::warn!(error = %err, "packet source failed, capture stopping");
                            break;
                        }
                    }
                }
                tracing::info!("capture loop stopped");
            })
            .expect("capture thread must spawn")
    }

    /// Spawn the periodic idle-peer eviction task on the runtime.
    pub fn spawn_evictor(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let monitor = self;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(EVICTION_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            tick.tick().await;
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        let evicted = monitor.table.evict_idle(monitor.idle_timeout);
                        if evicted > 0 {
                            tracing::debug!(evicted, "dropped idle peers");
                        }
                        monitor.metrics.set_peers_tracked(monitor.table.len() as u64);
                    }
                }
            }
        })
    }

    /// Decode and account one captured frame.
    pub fn process_frame(&self, frame: &[u8]) {
        let Some(meta) = decode_frame(frame) else {
            self.metrics.observe_packet(false);
            return;
        };
        let counted = self.table.observe(&meta, &self.locals);
        self.metrics.observe_packet(counted);
        if counted {
            self.metrics.set_peers_tracked(self.table.len() as u64);
        }
    }

    /// Unfiltered per-peer projection.
    pub fn snapshot(&self) -> Vec<PeerSnapshot> {
        self.table.snapshot()
    }

    /// Projection with exclude-listed peers omitted.
    pub fn snapshot_filtered(&self) -> Vec<PeerSnapshot> {
        self.table.snapshot_filtered(&self.exclude)
    }

    pub fn peer_count(&self) -> usize {
        self.table.len()
    }

    /// Direct table access for composition and tests.
    pub fn table(&self) -> &Arc<PeerTable> {
        &self.table
    }

    pub fn local_addresses(&self) -> &HashSet<IpAddr> {
        &self.locals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};
    use pnet::packet::ip::IpNextHeaderProtocols;
    use pnet::packet::ipv4::MutableIpv4Packet;
    use pnet::packet::udp::MutableUdpPacket;
    use ports::test_utils::{NoopMetrics, ScriptedSource};
    use std::net::Ipv4Addr;

    fn udp_frame(src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
        let mut buf = vec![0u8; 14 + 20 + 8];
        {
            let mut eth = MutableEthernetPacket::new(&mut buf).unwrap();
            eth.set_ethertype(EtherTypes::Ipv4);
        }
        {
            let mut ip = MutableIpv4Packet::new(&mut buf[14..]).unwrap();
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length(28);
            ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
            ip.set_source(src);
            ip.set_destination(dst);
        }
        {
            let mut udp = MutableUdpPacket::new(&mut buf[34..]).unwrap();
            udp.set_source(53);
            udp.set_destination(40_000);
            udp.set_length(8);
        }
        buf
    }

    fn monitor() -> Arc<MonitorService> {
        let locals: HashSet<IpAddr> = ["192.0.2.1".parse().unwrap()].into_iter().collect();
        Arc::new(MonitorService::new(
            Duration::from_secs(30),
            Duration::from_secs(86_400),
            locals,
            vec!["10.0.0.0/8".parse().unwrap()],
            Arc::new(NoopMetrics),
        ))
    }

    #[test]
    fn process_frame_accounts_classified_traffic() {
        let monitor = monitor();
        monitor.process_frame(&udp_frame(
            Ipv4Addr::new(203, 0, 113, 5),
            Ipv4Addr::new(192, 0, 2, 1),
        ));

        let snaps = monitor.snapshot();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].bytes_recv, 42);
        assert_eq!(snaps[0].packets_recv, 1);
    }

    #[test]
    fn process_frame_ignores_undecodable_input() {
        let monitor = monitor();
        monitor.process_frame(&[0u8; 4]);
        assert!(monitor.snapshot().is_empty());
    }

    #[test]
    fn filtered_snapshot_respects_exclude_list() {
        let monitor = monitor();
        monitor.process_frame(&udp_frame(
            Ipv4Addr::new(10, 1, 2, 3),
            Ipv4Addr::new(192, 0, 2, 1),
        ));
        monitor.process_frame(&udp_frame(
            Ipv4Addr::new(203, 0, 113, 5),
            Ipv4Addr::new(192, 0, 2, 1),
        ));

        assert_eq!(monitor.snapshot().len(), 2);
        let filtered = monitor.snapshot_filtered();
        assert_eq!(filtered.len(), 1);
        assert_eq!(
            filtered[0].remote_ip,
            "203.0.113.5".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn capture_loop_drains_source_and_stops_on_error() {
        let monitor = monitor();
        let frames = vec![
            udp_frame(Ipv4Addr::new(203, 0, 113, 5), Ipv4Addr::new(192, 0, 2, 1)),
            udp_frame(Ipv4Addr::new(203, 0, 113, 6), Ipv4Addr::new(192, 0, 2, 1)),
        ];
        let source = ScriptedSource::failing_when_empty(frames);

        let token = CancellationToken::new();
        let handle = Arc::clone(&monitor).spawn_capture(Box::new(source), token);
        handle.join().unwrap();

        assert_eq!(monitor.peer_count(), 2);
    }

    #[test]
    fn capture_loop_exits_on_cancellation() {
        let monitor = monitor();
        let source = ScriptedSource::new(Vec::new());
        let token = CancellationToken::new();
        token.cancel();
        let handle = Arc::clone(&monitor).spawn_capture(Box::new(source), token);
        handle.join().unwrap();
        assert!(monitor.snapshot().is_empty());
    }
}
