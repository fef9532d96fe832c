use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use domain::common::error::DomainError;
use domain::net::extract::extract_ip_nets;
use domain::net::{is_banned, parse_ip_net};
use domain::rule::entity::{Action, GroupId, IpNetGroup, IpNetRule, RuleId};
use domain::traffic::entity::PeerSnapshot;
use ipnetwork::IpNetwork;
use ports::secondary::group_store::GroupStore;
use ports::secondary::metrics_port::MetricsPort;
use ports::secondary::rule_store::RuleStore;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::firewall_service_impl::FirewallService;
use crate::monitor_service_impl::MonitorService;

pub const DEFAULT_GROUP_NAME: &str = "default";
const DEFAULT_GROUP_DESCRIPTION: &str = "Adopts rules whose own group is deleted";

// ── Read models ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl GroupView {
    fn from_entity(group: &IpNetGroup) -> Self {
        Self {
            id: group.id,
            name: group.name.clone(),
            description: group.description.clone(),
            is_default: group.is_default,
            created_at: rfc3339(group.created_at),
            updated_at: rfc3339(group.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleView {
    pub id: RuleId,
    pub ip_net: String,
    pub action: Action,
    pub created_at: String,
    pub updated_at: String,
    pub group: Option<GroupView>,
}

impl RuleView {
    fn from_entity(rule: &IpNetRule, group: Option<&IpNetGroup>) -> Self {
        Self {
            id: rule.id,
            ip_net: rule.ip_net.clone(),
            action: rule.action,
            created_at: rfc3339(rule.created_at),
            updated_at: rfc3339(rule.updated_at),
            group: group.map(GroupView::from_entity),
        }
    }
}

/// One observed peer composed with the catalog's policy decision.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficData {
    pub remote_ip: String,
    pub local_ip: String,
    pub total_bytes_in: u64,
    pub total_bytes_out: u64,
    pub total_packets_in: u64,
    pub total_packets_out: u64,
    pub bytes_in_per_sec: f64,
    pub bytes_out_per_sec: f64,
    pub connections: u64,
    pub first_seen: String,
    pub last_seen: String,
    pub is_banned: bool,
}

impl TrafficData {
    fn compose(snap: &PeerSnapshot, banned: bool) -> Self {
        Self {
            remote_ip: snap.remote_ip.to_string(),
            local_ip: snap.local_ip.to_string(),
            total_bytes_in: snap.bytes_recv,
            total_bytes_out: snap.bytes_sent,
            total_packets_in: snap.packets_recv,
            total_packets_out: snap.packets_sent,
            bytes_in_per_sec: snap.bytes_recv_per_sec,
            bytes_out_per_sec: snap.bytes_sent_per_sec,
            connections: snap.connections,
            first_seen: rfc3339(snap.first_seen),
            last_seen: rfc3339(snap.last_seen),
            is_banned: banned,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ImportOutcome {
    pub success_count: usize,
    pub failed_count: usize,
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ── Service ─────────────────────────────────────────────────────────

/// Transactional glue between the rule catalog, the firewall controller
/// and the traffic monitor.
///
/// This service exclusively owns mutations of the catalog and of kernel
/// state; no other component issues rule changes. Operation ordering is
/// chosen so that a kernel-level failure never leaves a phantom record:
/// persistence happens last on transitions, and creates are reverted when
/// the kernel apply fails.
pub struct PolicyService {
    rules: Arc<dyn RuleStore>,
    groups: Arc<dyn GroupStore>,
    firewall: Arc<FirewallService>,
    monitor: Arc<MonitorService>,
    metrics: Arc<dyn MetricsPort>,
}

impl PolicyService {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        groups: Arc<dyn GroupStore>,
        firewall: Arc<FirewallService>,
        monitor: Arc<MonitorService>,
        metrics: Arc<dyn MetricsPort>,
    ) -> Self {
        Self {
            rules,
            groups,
            firewall,
            monitor,
            metrics,
        }
    }

    /// Bootstrap: make sure a default group exists, then replay the whole
    /// catalog into the firewall. Running this after an out-of-band
    /// cleanup restores kernel state exactly.
    pub fn init(&self) -> Result<(), DomainError> {
        self.ensure_default_group()?;
        let rules = self.rules.find_all()?;
        self.firewall.init(&rules)?;
        self.metrics.set_rules_loaded(rules.len() as u64);
        info!(rule_count = rules.len(), "catalog replayed into the firewall");
        Ok(())
    }

    // ── Rules ───────────────────────────────────────────────────────

    /// Create a rule, or transition the action of an existing one.
    ///
    /// `group_id` 0 selects the default group. When the expression
    /// already exists only its action changes; the group argument is
    /// ignored.
    pub fn create_or_update_rule(
        &self,
        ip_net: &str,
        group_id: GroupId,
        action: Action,
    ) -> Result<(), DomainError> {
        parse_ip_net(ip_net)?;
        let group = self.resolve_group(group_id)?;

        if let Some(existing) = self.rules.find_by_ip_net(ip_net)? {
            return self.update_rule_action(existing.id, action);
        }

        let rule = self.rules.create(ip_net, group.id, action)?;
        if let Err(err) = self.firewall.apply(&rule.ip_net, rule.action) {
            // Keep catalog and kernel consistent: take the record back out.
            if let Err(delete_err) = self.rules.delete(rule.id) {
                error!(
                    ip_net,
                    error = %delete_err,
                    "failed to revert catalog insert after kernel failure"
                );
            }
            return Err(err);
        }
        self.update_rules_metric();
        info!(ip_net, group = %group.name, action = %action, "rule created");
        Ok(())
    }

    /// Transition a rule's action: revert the old kernel rule, apply the
    /// new one, persist last. A kernel failure therefore leaves the old
    /// action persisted, to be reconciled by the next init.
    pub fn update_rule_action(&self, id: RuleId, action: Action) -> Result<(), DomainError> {
        let rule = self.rules.find_by_id(id)?;
        if rule.action == action {
            return Ok(());
        }

        self.firewall.revert(&rule.ip_net, rule.action)?;
        self.firewall.apply(&rule.ip_net, action)?;
        self.rules.update_action(id, action)?;
        info!(ip_net = %rule.ip_net, from = %rule.action, to = %action, "rule action changed");
        Ok(())
    }

    /// Remove a rule: kernel first, then the record, so a failed kernel
    /// cleanup never orphans catalog state.
    pub fn delete_rule(&self, id: RuleId) -> Result<(), DomainError> {
        let rule = self.rules.find_by_id(id)?;
        self.firewall.cleanup_ip_net(&rule.ip_net)?;
        self.rules.delete(id)?;
        self.update_rules_metric();
        info!(ip_net = %rule.ip_net, "rule deleted");
        Ok(())
    }

    /// Move a rule to another (existing) group. Kernel state is
    /// independent of group membership.
    pub fn update_rule_group(&self, id: RuleId, group_id: GroupId) -> Result<(), DomainError> {
        self.groups.find_by_id(group_id)?;
        self.rules.find_by_id(id)?;
        self.rules.update_group(id, group_id)?;
        Ok(())
    }

    pub fn list_rules(&self) -> Result<Vec<RuleView>, DomainError> {
        let groups: HashMap<GroupId, IpNetGroup> = self
            .groups
            .find_all()?
            .into_iter()
            .map(|g| (g.id, g))
            .collect();
        let mut rules = self.rules.find_all()?;
        rules.sort_by_key(|r| r.id);
        Ok(rules
            .iter()
            .map(|r| RuleView::from_entity(r, groups.get(&r.group_id)))
            .collect())
    }

    pub fn list_rules_by_group(&self, group_id: GroupId) -> Result<Vec<RuleView>, DomainError> {
        let group = self.groups.find_by_id(group_id)?;
        let mut rules = self.rules.find_by_group(group_id)?;
        rules.sort_by_key(|r| r.id);
        Ok(rules
            .iter()
            .map(|r| RuleView::from_entity(r, Some(&group)))
            .collect())
    }

    /// The action tags the API understands, in a stable order.
    pub fn actions(&self) -> Vec<&'static str> {
        Action::ALL.iter().map(|a| a.as_str()).collect()
    }

    // ── Bulk import ─────────────────────────────────────────────────

    /// Import every IPv4 address/CIDR found in free-form text.
    ///
    /// Expressions already present with the same action are skipped; with
    /// a different action they go through the normal transition; new ones
    /// are batch-inserted and then applied to the kernel. Kernel failures
    /// on fresh inserts are logged but do not roll the inserts back: the
    /// persisted intent is correct and the next init reconciles it.
    pub fn import_rules(
        &self,
        text: &str,
        group_id: GroupId,
        action: Action,
    ) -> Result<ImportOutcome, DomainError> {
        let mut seen = std::collections::HashSet::new();
        let extracted: Vec<String> = extract_ip_nets(text)
            .into_iter()
            .filter(|net| seen.insert(net.clone()))
            .collect();
        info!(count = extracted.len(), "import extracted expressions");
        if extracted.is_empty() {
            return Ok(ImportOutcome::default());
        }

        let group = self.resolve_group(group_id)?;

        let existing = self.rules.find_by_ip_nets(&extracted)?;
        let existing_by_net: HashMap<&str, &IpNetRule> = existing
            .iter()
            .map(|r| (r.ip_net.as_str(), r))
            .collect();

        let mut to_transition: Vec<&IpNetRule> = Vec::new();
        let mut to_create: Vec<String> = Vec::new();
        for net in &extracted {
            match existing_by_net.get(net.as_str()) {
                Some(rule) if rule.action != action => to_transition.push(rule),
                Some(_) => {} // same action already on file
                None => to_create.push(net.clone()),
            }
        }
        info!(
            transitions = to_transition.len(),
            inserts = to_create.len(),
            "import partitioned"
        );

        let mut outcome = ImportOutcome::default();

        for rule in to_transition {
            match self.update_rule_action(rule.id, action) {
                Ok(()) => outcome.success_count += 1,
                Err(err) => {
                    outcome.failed_count += 1;
                    error!(ip_net = %rule.ip_net, error = %err, "import transition failed");
                }
            }
        }

        if !to_create.is_empty() {
            match self.rules.batch_create(&to_create, group.id, action) {
                Ok(created) => {
                    outcome.success_count += created.len();
                    for rule in &created {
                        if let Err(err) = self.firewall.apply(&rule.ip_net, rule.action) {
                            warn!(
                                ip_net = %rule.ip_net,
                                error = %err,
                                "kernel apply failed during import; reconciled at next init"
                            );
                        }
                    }
                }
                Err(err) => {
                    outcome.failed_count += to_create.len();
                    error!(error = %err, "import batch insert failed");
                }
            }
        }

        self.update_rules_metric();
        info!(
            success = outcome.success_count,
            failed = outcome.failed_count,
            "import finished"
        );
        Ok(outcome)
    }

    // ── Groups ──────────────────────────────────────────────────────

    pub fn list_groups(&self) -> Result<Vec<GroupView>, DomainError> {
        let mut groups = self.groups.find_all()?;
        groups.sort_by_key(|g| g.id);
        Ok(groups.iter().map(GroupView::from_entity).collect())
    }

    pub fn create_group(&self, name: &str, description: &str) -> Result<GroupView, DomainError> {
        let group = self.groups.create(name, description)?;
        Ok(GroupView::from_entity(&group))
    }

    pub fn update_group(
        &self,
        id: GroupId,
        name: &str,
        description: &str,
    ) -> Result<GroupView, DomainError> {
        let group = self.groups.update(id, name, description)?;
        Ok(GroupView::from_entity(&group))
    }

    /// Delete a group. Its rules are reassigned to the default group
    /// first, so no rule is ever orphaned. The default group itself is
    /// undeletable; removing it would leave the catalog without one.
    pub fn delete_group(&self, id: GroupId) -> Result<(), DomainError> {
        let group = self.groups.find_by_id(id)?;
        if group.is_default {
            return Err(DomainError::Conflict(
                "the default group cannot be deleted".to_string(),
            ));
        }

        let default = self.ensure_default_group()?;
        let moved = self.rules.update_group_bulk(id, default.id)?;
        self.groups.delete(id)?;
        info!(group = %group.name, moved, "group deleted, rules reassigned to default");
        Ok(())
    }

    // ── Observation composition ─────────────────────────────────────

    /// Filtered per-peer statistics joined with the catalog's policy
    /// decision. A peer inside any allow network is never reported
    /// banned, matching the kernel chain's precedence.
    pub fn traffic_stats(&self) -> Result<Vec<TrafficData>, DomainError> {
        let snapshot = self.monitor.snapshot_filtered();

        let ban_nets = self.action_networks(Action::Ban)?;
        let allow_nets = self.action_networks(Action::Allow)?;

        let mut stats: Vec<TrafficData> = snapshot
            .iter()
            .map(|snap| {
                let banned = is_banned(&ban_nets, &allow_nets, snap.remote_ip);
                TrafficData::compose(snap, banned)
            })
            .collect();
        stats.sort_by(|a, b| a.remote_ip.cmp(&b.remote_ip));
        Ok(stats)
    }

    // ── Internals ───────────────────────────────────────────────────

    fn action_networks(&self, action: Action) -> Result<Vec<IpNetwork>, DomainError> {
        Ok(self
            .rules
            .find_by_action(action)?
            .iter()
            .filter_map(|rule| match parse_ip_net(&rule.ip_net) {
                Ok(net) => Some(net),
                Err(err) => {
                    // The catalog invariant makes this unreachable; guard anyway.
                    warn!(ip_net = %rule.ip_net, error = %err, "unparseable catalog entry skipped");
                    None
                }
            })
            .collect())
    }

    fn resolve_group(&self, group_id: GroupId) -> Result<IpNetGroup, DomainError> {
        if group_id.0 == 0 {
            self.ensure_default_group()
        } else {
            Ok(self.groups.find_by_id(group_id)?)
        }
    }

    fn ensure_default_group(&self) -> Result<IpNetGroup, DomainError> {
        if let Some(group) = self.groups.find_default()? {
            return Ok(group);
        }
        let group = match self.groups.find_by_name(DEFAULT_GROUP_NAME)? {
            Some(existing) => existing,
            None => self
                .groups
                .create(DEFAULT_GROUP_NAME, DEFAULT_GROUP_DESCRIPTION)?,
        };
        self.groups.set_default(group.id)?;
        Ok(self.groups.find_by_id(group.id)?)
    }

    fn update_rules_metric(&self) {
        if let Ok(rules) = self.rules.find_all() {
            self.metrics.set_rules_loaded(rules.len() as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::net::IpAddr;
    use std::sync::Mutex;
    use std::time::Duration;

    use domain::traffic::decode::PacketMeta;
    use ports::test_utils::{
        BackendState, MemoryGroupStore, MemoryRuleStore, NoopMetrics, RecordingBackend,
    };

    struct Fixture {
        svc: PolicyService,
        rules: Arc<MemoryRuleStore>,
        groups: Arc<MemoryGroupStore>,
        backend: Arc<Mutex<BackendState>>,
        monitor: Arc<MonitorService>,
    }

    fn fixture() -> Fixture {
        fixture_failing_on(&[])
    }

    fn fixture_failing_on(fail_ops: &[&'static str]) -> Fixture {
        let rules = Arc::new(MemoryRuleStore::new());
        let groups = Arc::new(MemoryGroupStore::new());
        let (backend, backend_state) = RecordingBackend::failing_on(fail_ops);
        let metrics: Arc<dyn MetricsPort> = Arc::new(NoopMetrics);
        let firewall = Arc::new(FirewallService::new(
            Box::new(backend),
            Arc::clone(&metrics),
        ));
        let locals: HashSet<IpAddr> = ["192.0.2.1".parse().unwrap()].into_iter().collect();
        let monitor = Arc::new(MonitorService::new(
            Duration::from_secs(30),
            Duration::from_secs(86_400),
            locals,
            Vec::new(),
            Arc::clone(&metrics),
        ));
        let svc = PolicyService::new(
            Arc::clone(&rules) as Arc<dyn RuleStore>,
            Arc::clone(&groups) as Arc<dyn GroupStore>,
            firewall,
            Arc::clone(&monitor),
            metrics,
        );
        Fixture {
            svc,
            rules,
            groups,
            backend: backend_state,
            monitor,
        }
    }

    fn observe(fx: &Fixture, remote: &str) {
        let meta = PacketMeta {
            src: remote.parse().unwrap(),
            dst: "192.0.2.1".parse().unwrap(),
            frame_len: 60,
            tcp: None,
        };
        let locals: HashSet<IpAddr> = ["192.0.2.1".parse().unwrap()].into_iter().collect();
        assert!(fx.monitor.table().observe(&meta, &locals));
    }

    // ── init ────────────────────────────────────────────────────────

    #[test]
    fn init_creates_exactly_one_default_group() {
        let fx = fixture();
        fx.svc.init().unwrap();

        let groups = fx.groups.find_all().unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_default);
        assert_eq!(groups[0].name, DEFAULT_GROUP_NAME);

        // Second init must not create another.
        fx.svc.init().unwrap();
        assert_eq!(fx.groups.find_all().unwrap().len(), 1);
    }

    #[test]
    fn init_adopts_existing_group_named_default() {
        let fx = fixture();
        fx.groups.create(DEFAULT_GROUP_NAME, "pre-existing").unwrap();
        fx.svc.init().unwrap();

        let groups = fx.groups.find_all().unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_default);
    }

    #[test]
    fn init_replays_catalog_into_backend() {
        let fx = fixture();
        fx.svc.init().unwrap();
        fx.svc
            .create_or_update_rule("10.0.0.0/8", GroupId(0), Action::Ban)
            .unwrap();
        fx.svc
            .create_or_update_rule("10.1.0.0/16", GroupId(0), Action::Allow)
            .unwrap();

        // Out-of-band wipe, then re-init: kernel state must match the
        // catalog exactly.
        fx.svc.firewall.cleanup().unwrap();
        assert!(fx.backend.lock().unwrap().banned.is_empty());

        fx.svc.init().unwrap();
        let state = fx.backend.lock().unwrap();
        assert_eq!(state.banned.iter().collect::<Vec<_>>(), ["10.0.0.0/8"]);
        assert_eq!(state.allowed.iter().collect::<Vec<_>>(), ["10.1.0.0/16"]);
    }

    // ── create-or-update ────────────────────────────────────────────

    #[test]
    fn create_persists_and_applies() {
        let fx = fixture();
        fx.svc.init().unwrap();
        fx.svc
            .create_or_update_rule("203.0.113.5", GroupId(0), Action::Ban)
            .unwrap();

        let rule = fx.rules.find_by_ip_net("203.0.113.5").unwrap().unwrap();
        assert_eq!(rule.action, Action::Ban);
        assert!(fx.backend.lock().unwrap().banned.contains("203.0.113.5"));
    }

    #[test]
    fn create_rejects_malformed_expression() {
        let fx = fixture();
        fx.svc.init().unwrap();
        let err = fx
            .svc
            .create_or_update_rule("not-a-net", GroupId(0), Action::Ban)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
        assert!(fx.rules.find_all().unwrap().is_empty());
    }

    #[test]
    fn create_rejects_unknown_group() {
        let fx = fixture();
        fx.svc.init().unwrap();
        let err = fx
            .svc
            .create_or_update_rule("203.0.113.5", GroupId(42), Action::Ban)
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn create_reverts_catalog_on_kernel_failure() {
        let fx = fixture_failing_on(&["ban"]);
        fx.svc.init().unwrap();
        let err = fx
            .svc
            .create_or_update_rule("203.0.113.5", GroupId(0), Action::Ban)
            .unwrap_err();
        assert!(matches!(err, DomainError::BackendUnavailable(_)));
        // The phantom record was taken back out.
        assert!(fx.rules.find_all().unwrap().is_empty());
    }

    #[test]
    fn create_on_existing_expression_transitions_and_keeps_group() {
        let fx = fixture();
        fx.svc.init().unwrap();
        let other = fx.groups.create("imports", "").unwrap();
        fx.svc
            .create_or_update_rule("203.0.113.5", other.id, Action::Ban)
            .unwrap();

        // Re-create under a different group: action moves, group stays.
        fx.svc
            .create_or_update_rule("203.0.113.5", GroupId(0), Action::Allow)
            .unwrap();

        let rule = fx.rules.find_by_ip_net("203.0.113.5").unwrap().unwrap();
        assert_eq!(rule.action, Action::Allow);
        assert_eq!(rule.group_id, other.id);
        assert_eq!(fx.rules.find_all().unwrap().len(), 1);
    }

    // ── action transitions ──────────────────────────────────────────

    #[test]
    fn transition_same_action_is_a_noop() {
        let fx = fixture();
        fx.svc.init().unwrap();
        fx.svc
            .create_or_update_rule("203.0.113.5", GroupId(0), Action::Ban)
            .unwrap();
        let ops_before = fx.backend.lock().unwrap().ops.len();

        let rule = fx.rules.find_by_ip_net("203.0.113.5").unwrap().unwrap();
        fx.svc.update_rule_action(rule.id, Action::Ban).unwrap();

        assert_eq!(fx.backend.lock().unwrap().ops.len(), ops_before);
    }

    #[test]
    fn transition_reverts_then_applies_then_persists() {
        let fx = fixture();
        fx.svc.init().unwrap();
        fx.svc
            .create_or_update_rule("198.51.100.0/24", GroupId(0), Action::Ban)
            .unwrap();
        let rule = fx.rules.find_by_ip_net("198.51.100.0/24").unwrap().unwrap();

        fx.svc.update_rule_action(rule.id, Action::Allow).unwrap();

        let state = fx.backend.lock().unwrap();
        // Exactly one of the two directions is installed.
        assert!(!state.banned.contains("198.51.100.0/24"));
        assert!(state.allowed.contains("198.51.100.0/24"));
        // Revert strictly precedes apply in the op log.
        let revert_idx = state
            .ops
            .iter()
            .position(|op| op == "revert_ban 198.51.100.0/24")
            .unwrap();
        let apply_idx = state
            .ops
            .iter()
            .position(|op| op == "allow 198.51.100.0/24")
            .unwrap();
        assert!(revert_idx < apply_idx);
        drop(state);

        let rule = fx.rules.find_by_id(rule.id).unwrap();
        assert_eq!(rule.action, Action::Allow);
    }

    #[test]
    fn transition_kernel_failure_keeps_old_action_persisted() {
        let fx = fixture_failing_on(&["allow"]);
        fx.svc.init().unwrap();
        fx.svc
            .create_or_update_rule("198.51.100.0/24", GroupId(0), Action::Ban)
            .unwrap();
        let rule = fx.rules.find_by_ip_net("198.51.100.0/24").unwrap().unwrap();

        assert!(fx.svc.update_rule_action(rule.id, Action::Allow).is_err());

        // Persistence never happened; the next init restores the ban.
        let rule = fx.rules.find_by_id(rule.id).unwrap();
        assert_eq!(rule.action, Action::Ban);
    }

    #[test]
    fn transition_unknown_rule_is_not_found() {
        let fx = fixture();
        fx.svc.init().unwrap();
        assert!(matches!(
            fx.svc.update_rule_action(RuleId(99), Action::Ban),
            Err(DomainError::NotFound(_))
        ));
    }

    // ── delete ──────────────────────────────────────────────────────

    #[test]
    fn delete_cleans_kernel_then_store() {
        let fx = fixture();
        fx.svc.init().unwrap();
        fx.svc
            .create_or_update_rule("203.0.113.5", GroupId(0), Action::Ban)
            .unwrap();
        let rule = fx.rules.find_by_ip_net("203.0.113.5").unwrap().unwrap();

        fx.svc.delete_rule(rule.id).unwrap();

        assert!(fx.rules.find_all().unwrap().is_empty());
        let state = fx.backend.lock().unwrap();
        assert!(state.banned.is_empty());
        assert!(state.allowed.is_empty());
    }

    #[test]
    fn delete_kernel_failure_keeps_the_record() {
        let fx = fixture_failing_on(&["cleanup_ip_net"]);
        fx.svc.init().unwrap();
        fx.svc
            .create_or_update_rule("203.0.113.5", GroupId(0), Action::Ban)
            .unwrap();
        let rule = fx.rules.find_by_ip_net("203.0.113.5").unwrap().unwrap();

        assert!(fx.svc.delete_rule(rule.id).is_err());
        assert!(fx.rules.find_by_id(rule.id).is_ok());
    }

    // ── groups ──────────────────────────────────────────────────────

    #[test]
    fn group_delete_reassigns_rules_to_default() {
        let fx = fixture();
        fx.svc.init().unwrap();
        let group = fx.svc.create_group("suspects", "watch these").unwrap();
        fx.svc
            .create_or_update_rule("203.0.113.5", group.id, Action::Ban)
            .unwrap();
        fx.svc
            .create_or_update_rule("203.0.113.6", group.id, Action::Ban)
            .unwrap();

        fx.svc.delete_group(group.id).unwrap();

        let default = fx.groups.find_default().unwrap().unwrap();
        for rule in fx.rules.find_all().unwrap() {
            assert_eq!(rule.group_id, default.id);
        }
        assert!(fx.groups.find_by_name("suspects").unwrap().is_none());
    }

    #[test]
    fn default_group_cannot_be_deleted() {
        let fx = fixture();
        fx.svc.init().unwrap();
        let default = fx.groups.find_default().unwrap().unwrap();
        assert!(matches!(
            fx.svc.delete_group(default.id),
            Err(DomainError::Conflict(_))
        ));
        assert!(fx.groups.find_default().unwrap().is_some());
    }

    #[test]
    fn rule_group_reassignment_requires_existing_target() {
        let fx = fixture();
        fx.svc.init().unwrap();
        fx.svc
            .create_or_update_rule("203.0.113.5", GroupId(0), Action::Ban)
            .unwrap();
        let rule = fx.rules.find_by_ip_net("203.0.113.5").unwrap().unwrap();

        assert!(matches!(
            fx.svc.update_rule_group(rule.id, GroupId(42)),
            Err(DomainError::NotFound(_))
        ));

        let target = fx.svc.create_group("quarantine", "").unwrap();
        let ops_before = fx.backend.lock().unwrap().ops.len();
        fx.svc.update_rule_group(rule.id, target.id).unwrap();
        // Catalog-only change: the kernel was not touched.
        assert_eq!(fx.backend.lock().unwrap().ops.len(), ops_before);
        assert_eq!(
            fx.rules.find_by_id(rule.id).unwrap().group_id,
            target.id
        );
    }

    // ── import ──────────────────────────────────────────────────────

    #[test]
    fn import_counts_fresh_inserts() {
        let fx = fixture();
        fx.svc.init().unwrap();
        let outcome = fx
            .svc
            .import_rules("1.2.3.4\n5.6.7.0/24;bogus;8.8.8.8/33", GroupId(0), Action::Ban)
            .unwrap();

        assert_eq!(outcome.success_count, 3);
        assert_eq!(outcome.failed_count, 0);
        let state = fx.backend.lock().unwrap();
        assert!(state.banned.contains("1.2.3.4"));
        assert!(state.banned.contains("5.6.7.0/24"));
        // The /33 suffix is rejected, leaving the bare address.
        assert!(state.banned.contains("8.8.8.8"));
    }

    #[test]
    fn import_skips_same_action_duplicates() {
        let fx = fixture();
        fx.svc.init().unwrap();
        fx.svc
            .create_or_update_rule("1.2.3.4", GroupId(0), Action::Ban)
            .unwrap();

        let outcome = fx
            .svc
            .import_rules("1.2.3.4 5.6.7.8", GroupId(0), Action::Ban)
            .unwrap();

        // Only the new address counts; the duplicate is skipped silently.
        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.failed_count, 0);
        assert_eq!(fx.rules.find_all().unwrap().len(), 2);
    }

    #[test]
    fn import_transitions_conflicting_action() {
        let fx = fixture();
        fx.svc.init().unwrap();
        fx.svc
            .create_or_update_rule("1.2.3.4", GroupId(0), Action::Allow)
            .unwrap();

        let outcome = fx
            .svc
            .import_rules("1.2.3.4", GroupId(0), Action::Ban)
            .unwrap();

        assert_eq!(outcome.success_count, 1);
        let rule = fx.rules.find_by_ip_net("1.2.3.4").unwrap().unwrap();
        assert_eq!(rule.action, Action::Ban);
        let state = fx.backend.lock().unwrap();
        assert!(state.banned.contains("1.2.3.4"));
        assert!(!state.allowed.contains("1.2.3.4"));
    }

    #[test]
    fn import_without_addresses_is_empty_outcome() {
        let fx = fixture();
        fx.svc.init().unwrap();
        let outcome = fx
            .svc
            .import_rules("no addresses here", GroupId(0), Action::Ban)
            .unwrap();
        assert_eq!(outcome.success_count, 0);
        assert_eq!(outcome.failed_count, 0);
    }

    #[test]
    fn import_kernel_failures_keep_persisted_intent() {
        let fx = fixture_failing_on(&["ban"]);
        fx.svc.init().unwrap();
        let outcome = fx
            .svc
            .import_rules("1.2.3.4", GroupId(0), Action::Ban)
            .unwrap();

        // The insert stays: reconciliation happens at the next init.
        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.failed_count, 0);
        assert_eq!(fx.rules.find_all().unwrap().len(), 1);
    }

    // ── stats composition ───────────────────────────────────────────

    #[test]
    fn stats_mark_banned_peers() {
        let fx = fixture();
        fx.svc.init().unwrap();
        fx.svc
            .create_or_update_rule("203.0.113.5", GroupId(0), Action::Ban)
            .unwrap();
        observe(&fx, "203.0.113.5");
        observe(&fx, "203.0.113.9");

        let stats = fx.svc.traffic_stats().unwrap();
        assert_eq!(stats.len(), 2);
        let banned = stats.iter().find(|s| s.remote_ip == "203.0.113.5").unwrap();
        assert!(banned.is_banned);
        let clean = stats.iter().find(|s| s.remote_ip == "203.0.113.9").unwrap();
        assert!(!clean.is_banned);
    }

    #[test]
    fn stats_allow_wins_over_ban() {
        let fx = fixture();
        fx.svc.init().unwrap();
        fx.svc
            .create_or_update_rule("10.0.0.0/8", GroupId(0), Action::Ban)
            .unwrap();
        fx.svc
            .create_or_update_rule("10.1.0.0/16", GroupId(0), Action::Allow)
            .unwrap();
        observe(&fx, "10.1.2.3");
        observe(&fx, "10.2.2.3");

        let stats = fx.svc.traffic_stats().unwrap();
        let inside_allow = stats.iter().find(|s| s.remote_ip == "10.1.2.3").unwrap();
        assert!(!inside_allow.is_banned);
        let outside_allow = stats.iter().find(|s| s.remote_ip == "10.2.2.3").unwrap();
        assert!(outside_allow.is_banned);
    }

    #[test]
    fn stats_on_empty_capture_are_empty() {
        let fx = fixture();
        fx.svc.init().unwrap();
        assert!(fx.svc.traffic_stats().unwrap().is_empty());
    }

    // ── full scenario ───────────────────────────────────────────────

    #[test]
    fn ban_then_unban_round_trip() {
        let fx = fixture();
        fx.svc.init().unwrap();

        fx.svc
            .create_or_update_rule("203.0.113.5", GroupId(0), Action::Ban)
            .unwrap();
        observe(&fx, "203.0.113.5");
        let stats = fx.svc.traffic_stats().unwrap();
        assert!(stats.iter().any(|s| s.remote_ip == "203.0.113.5" && s.is_banned));

        let rule = fx.rules.find_by_ip_net("203.0.113.5").unwrap().unwrap();
        fx.svc.delete_rule(rule.id).unwrap();

        let state = fx.backend.lock().unwrap();
        assert!(!state.banned.contains("203.0.113.5"));
        assert!(!state.allowed.contains("203.0.113.5"));
    }
}
