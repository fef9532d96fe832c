// All methods take `&self`: the implementation records through atomics
// (interior mutability via `prometheus-client`).
//
// Default implementations are no-ops so components stay constructible
// without a registry in tests.

/// Operational metrics sink.
pub trait MetricsPort: Send + Sync {
    /// One captured frame processed; `counted` is false when the
    /// direction check dropped it.
    fn observe_packet(&self, _counted: bool) {}

    /// Current number of tracked peers.
    fn set_peers_tracked(&self, _count: u64) {}

    /// Number of catalog rules currently installed in the kernel.
    fn set_rules_loaded(&self, _count: u64) {}

    /// One kernel operation finished. `op` is the backend verb
    /// (ban, allow, revert_ban, ...).
    fn observe_kernel_op(&self, _op: &'static str, _ok: bool) {}
}
