use std::sync::{Arc, Mutex, MutexGuard};

use domain::common::error::DomainError;
use domain::rule::entity::{Action, IpNetRule};
use ports::secondary::firewall_backend::FirewallBackend;
use ports::secondary::metrics_port::MetricsPort;

/// Uniform facade over one kernel firewall backend (the controller).
///
/// The backend is not re-entrant, so every call is serialised through the
/// internal mutex; this service is the backend's single logical owner.
/// Mutations are best-effort-atomic at this boundary: a call never
/// reports success unless the backend did. Keeping persistent state in
/// step with the kernel is the policy service's job.
pub struct FirewallService {
    backend: Mutex<Box<dyn FirewallBackend>>,
    metrics: Arc<dyn MetricsPort>,
}

impl FirewallService {
    pub fn new(backend: Box<dyn FirewallBackend>, metrics: Arc<dyn MetricsPort>) -> Self {
        Self {
            backend: Mutex::new(backend),
            metrics,
        }
    }

    fn backend(&self) -> Result<MutexGuard<'_, Box<dyn FirewallBackend>>, DomainError> {
        self.backend
            .lock()
            .map_err(|_| DomainError::Transient("firewall backend lock poisoned".to_string()))
    }

    /// Initialise the backend and install every catalog rule.
    ///
    /// A failed installation tears the backend down again and returns the
    /// originating error, so a half-built chain never survives.
    pub fn init(&self, rules: &[IpNetRule]) -> Result<(), DomainError> {
        let mut backend = self.backend()?;
        backend.init()?;

        for rule in rules {
            let result = match rule.action {
                Action::Ban => backend.ban(&rule.ip_net),
                Action::Allow => backend.allow(&rule.ip_net),
            };
            if let Err(err) = result {
                tracing::error!(
                    ip_net = %rule.ip_net,
                    action = %rule.action,
                    error = %err,
                    "rule installation failed during init, tearing down"
                );
                if let Err(cleanup_err) = backend.cleanup() {
                    tracing::error!(error = %cleanup_err, "cleanup after failed init also failed");
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Install the kernel rule matching the action.
    pub fn apply(&self, ip_net: &str, action: Action) -> Result<(), DomainError> {
        let mut backend = self.backend()?;
        let (verb, result): (&'static str, _) = match action {
            Action::Ban => ("ban", backend.ban(ip_net)),
            Action::Allow => ("allow", backend.allow(ip_net)),
        };
        self.metrics.observe_kernel_op(verb, result.is_ok());
        result
    }

    /// Remove the kernel rule matching the action.
    pub fn revert(&self, ip_net: &str, action: Action) -> Result<(), DomainError> {
        let mut backend = self.backend()?;
        let (verb, result): (&'static str, _) = match action {
            Action::Ban => ("revert_ban", backend.revert_ban(ip_net)),
            Action::Allow => ("revert_allow", backend.revert_allow(ip_net)),
        };
        self.metrics.observe_kernel_op(verb, result.is_ok());
        result
    }

    /// Remove whichever rules exist for the expression, silently.
    pub fn cleanup_ip_net(&self, ip_net: &str) -> Result<(), DomainError> {
        let result = self.backend()?.cleanup_ip_net(ip_net);
        self.metrics
            .observe_kernel_op("cleanup_ip_net", result.is_ok());
        result
    }

    /// Tear down every kernel object this controller installed.
    pub fn cleanup(&self) -> Result<(), DomainError> {
        let result = self.backend()?.cleanup();
        self.metrics.observe_kernel_op("cleanup", result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::rule::entity::{GroupId, RuleId};
    use ports::test_utils::{NoopMetrics, RecordingBackend};

    fn rule(id: u64, ip_net: &str, action: Action) -> IpNetRule {
        IpNetRule {
            id: RuleId(id),
            ip_net: ip_net.to_string(),
            group_id: GroupId(1),
            action,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn init_installs_every_rule_by_action() {
        let (backend, state) = RecordingBackend::new();
        let svc = FirewallService::new(Box::new(backend), Arc::new(NoopMetrics));

        svc.init(&[
            rule(1, "10.0.0.0/8", Action::Ban),
            rule(2, "10.1.0.0/16", Action::Allow),
        ])
        .unwrap();

        let state = state.lock().unwrap();
        assert!(state.initialized);
        assert!(state.banned.contains("10.0.0.0/8"));
        assert!(state.allowed.contains("10.1.0.0/16"));
    }

    #[test]
    fn init_failure_tears_down_and_propagates() {
        let (backend, state) = RecordingBackend::failing_on(&["allow"]);
        let svc = FirewallService::new(Box::new(backend), Arc::new(NoopMetrics));

        let err = svc
            .init(&[
                rule(1, "10.0.0.0/8", Action::Ban),
                rule(2, "10.1.0.0/16", Action::Allow),
            ])
            .unwrap_err();

        assert!(matches!(err, DomainError::BackendUnavailable(_)));
        let state = state.lock().unwrap();
        assert_eq!(state.cleanups, 1);
        assert!(state.banned.is_empty());
    }

    #[test]
    fn apply_and_revert_dispatch_on_action() {
        let (backend, state) = RecordingBackend::new();
        let svc = FirewallService::new(Box::new(backend), Arc::new(NoopMetrics));

        svc.apply("203.0.113.5", Action::Ban).unwrap();
        svc.apply("198.51.100.0/24", Action::Allow).unwrap();
        {
            let state = state.lock().unwrap();
            assert!(state.banned.contains("203.0.113.5"));
            assert!(state.allowed.contains("198.51.100.0/24"));
        }

        svc.revert("203.0.113.5", Action::Ban).unwrap();
        svc.revert("198.51.100.0/24", Action::Allow).unwrap();
        let state = state.lock().unwrap();
        assert!(state.banned.is_empty());
        assert!(state.allowed.is_empty());
    }

    #[test]
    fn apply_round_trip_restores_prior_state() {
        let (backend, state) = RecordingBackend::new();
        let svc = FirewallService::new(Box::new(backend), Arc::new(NoopMetrics));

        svc.apply("10.0.0.0/8", Action::Ban).unwrap();
        let before = state.lock().unwrap().banned.clone();

        svc.apply("192.0.2.0/24", Action::Ban).unwrap();
        svc.revert("192.0.2.0/24", Action::Ban).unwrap();

        assert_eq!(state.lock().unwrap().banned, before);
    }

    #[test]
    fn cleanup_ip_net_clears_both_directions() {
        let (backend, state) = RecordingBackend::new();
        let svc = FirewallService::new(Box::new(backend), Arc::new(NoopMetrics));

        svc.apply("203.0.113.5", Action::Ban).unwrap();
        svc.apply("203.0.113.5", Action::Allow).unwrap();
        svc.cleanup_ip_net("203.0.113.5").unwrap();

        let state = state.lock().unwrap();
        assert!(state.banned.is_empty());
        assert!(state.allowed.is_empty());
    }

    #[test]
    fn backend_failure_propagates() {
        let (backend, _state) = RecordingBackend::failing_on(&["ban"]);
        let svc = FirewallService::new(Box::new(backend), Arc::new(NoopMetrics));
        assert!(svc.apply("203.0.113.5", Action::Ban).is_err());
    }
}
