//! Shared test doubles for the secondary ports.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use domain::common::error::DomainError;

use crate::secondary::firewall_backend::FirewallBackend;
use crate::secondary::metrics_port::MetricsPort;
use crate::secondary::packet_source::PacketSource;

pub use crate::memory::{MemoryGroupStore, MemoryRuleStore};

/// No-op implementation of the metrics port.
pub struct NoopMetrics;

impl MetricsPort for NoopMetrics {}

// ── Recording firewall backend ─────────────────────────────────────

/// Observable kernel-state model behind [`RecordingBackend`].
#[derive(Debug, Default)]
pub struct BackendState {
    /// Every call in order, e.g. `"ban 1.2.3.4"`.
    pub ops: Vec<String>,
    pub banned: BTreeSet<String>,
    pub allowed: BTreeSet<String>,
    pub initialized: bool,
    pub cleanups: usize,
}

/// Firewall backend double that models kernel state as two sets and logs
/// every call. Mirrors the real backends' idempotence: double-installs
/// and absent-removals succeed.
pub struct RecordingBackend {
    state: Arc<Mutex<BackendState>>,
    fail_ops: HashSet<&'static str>,
}

impl RecordingBackend {
    pub fn new() -> (Self, Arc<Mutex<BackendState>>) {
        Self::failing_on(&[])
    }

    /// Backend that fails every call whose verb is listed.
    pub fn failing_on(ops: &[&'static str]) -> (Self, Arc<Mutex<BackendState>>) {
        let state = Arc::new(Mutex::new(BackendState::default()));
        (
            Self {
                state: Arc::clone(&state),
                fail_ops: ops.iter().copied().collect(),
            },
            state,
        )
    }

    fn record(&self, verb: &'static str, arg: Option<&str>) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        match arg {
            Some(arg) => state.ops.push(format!("{verb} {arg}")),
            None => state.ops.push(verb.to_string()),
        }
        if self.fail_ops.contains(verb) {
            return Err(DomainError::BackendUnavailable(format!(
                "scripted failure: {verb}"
            )));
        }
        Ok(())
    }
}

impl FirewallBackend for RecordingBackend {
    fn init(&mut self) -> Result<(), DomainError> {
        self.record("init", None)?;
        let mut state = self.state.lock().unwrap();
        state.initialized = true;
        state.banned.clear();
        state.allowed.clear();
        Ok(())
    }

    fn ban(&mut self, ip_net: &str) -> Result<(), DomainError> {
        self.record("ban", Some(ip_net))?;
        self.state.lock().unwrap().banned.insert(ip_net.to_string());
        Ok(())
    }

    fn revert_ban(&mut self, ip_net: &str) -> Result<(), DomainError> {
        self.record("revert_ban", Some(ip_net))?;
        self.state.lock().unwrap().banned.remove(ip_net);
        Ok(())
    }

    fn allow(&mut self, ip_net: &str) -> Result<(), DomainError> {
        self.record("allow", Some(ip_net))?;
        self.state
            .lock()
            .unwrap()
            .allowed
            .insert(ip_net.to_string());
        Ok(())
    }

    fn revert_allow(&mut self, ip_net: &str) -> Result<(), DomainError> {
        self.record("revert_allow", Some(ip_net))?;
        self.state.lock().unwrap().allowed.remove(ip_net);
        Ok(())
    }

    fn cleanup_ip_net(&mut self, ip_net: &str) -> Result<(), DomainError> {
        self.record("cleanup_ip_net", Some(ip_net))?;
        let mut state = self.state.lock().unwrap();
        state.banned.remove(ip_net);
        state.allowed.remove(ip_net);
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), DomainError> {
        self.record("cleanup", None)?;
        let mut state = self.state.lock().unwrap();
        state.banned.clear();
        state.allowed.clear();
        state.initialized = false;
        state.cleanups += 1;
        Ok(())
    }
}

// ── Scripted packet source ─────────────────────────────────────────

/// Packet source that replays a fixed set of frames, then yields timeout
/// ticks (or an error when `fail_when_empty` is set).
pub struct ScriptedSource {
    frames: VecDeque<Vec<u8>>,
    fail_when_empty: bool,
}

impl ScriptedSource {
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames: frames.into(),
            fail_when_empty: false,
        }
    }

    pub fn failing_when_empty(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames: frames.into(),
            fail_when_empty: true,
        }
    }
}

impl PacketSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, DomainError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None if self.fail_when_empty => Err(DomainError::BackendUnavailable(
                "scripted source exhausted".to_string(),
            )),
            None => Ok(None),
        }
    }
}
