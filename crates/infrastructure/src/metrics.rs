use ports::secondary::metrics_port::MetricsPort;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PacketLabels {
    /// "counted" or "dropped" (direction check or decode rejected it).
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct KernelOpLabels {
    pub op: String,
    pub result: String,
}

/// Prometheus metrics registry for the agent.
///
/// Metric families record through atomics, so `&self` is enough; wrap
/// the whole registry in `Arc` for sharing.
pub struct AgentMetrics {
    registry: Registry,
    pub packets_total: Family<PacketLabels, Counter>,
    pub peers_tracked: Gauge,
    pub rules_loaded: Gauge,
    pub kernel_ops_total: Family<KernelOpLabels, Counter>,
}

impl AgentMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("netwarden");

        let packets_total = Family::<PacketLabels, Counter>::default();
        registry.register(
            "packets",
            "Captured frames processed by the monitor",
            packets_total.clone(),
        );

        let peers_tracked = Gauge::default();
        registry.register(
            "peers_tracked",
            "Remote peers currently held in the traffic table",
            peers_tracked.clone(),
        );

        let rules_loaded = Gauge::default();
        registry.register(
            "rules_loaded",
            "Catalog rules currently installed in the kernel",
            rules_loaded.clone(),
        );

        let kernel_ops_total = Family::<KernelOpLabels, Counter>::default();
        registry.register(
            "kernel_ops",
            "Firewall backend operations by verb and result",
            kernel_ops_total.clone(),
        );

        Self {
            registry,
            packets_total,
            peers_tracked,
            rules_loaded,
            kernel_ops_total,
        }
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if encode(&mut out, &self.registry).is_err() {
            out.clear();
        }
        out
    }
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsPort for AgentMetrics {
    fn observe_packet(&self, counted: bool) {
        let outcome = if counted { "counted" } else { "dropped" };
        self.packets_total
            .get_or_create(&PacketLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    fn set_peers_tracked(&self, count: u64) {
        self.peers_tracked.set(count as i64);
    }

    fn set_rules_loaded(&self, count: u64) {
        self.rules_loaded.set(count as i64);
    }

    fn observe_kernel_op(&self, op: &'static str, ok: bool) {
        self.kernel_ops_total
            .get_or_create(&KernelOpLabels {
                op: op.to_string(),
                result: if ok { "ok" } else { "error" }.to_string(),
            })
            .inc();
    }
}
