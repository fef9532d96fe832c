//! Set-backed firewall backend: two `hash:net` ipsets matched by a pair
//! of rules inside a managed `iptables` chain.
//!
//! The allow-set match (`ACCEPT`) sits before the ban-set match (`DROP`)
//! inside the chain, so an address present in both sets is accepted.
//! `0.0.0.0/0` cannot be represented as a set entry on some kernels; it
//! is installed as a direct chain rule instead.

use domain::common::error::DomainError;
use domain::net::canonical;
use ports::secondary::firewall_backend::FirewallBackend;

use super::exec::{CmdOutput, CommandRunner, SystemRunner, args, render};

const IPTABLES: &str = "iptables";
const IPSET: &str = "ipset";

/// The full-wildcard expression needing the direct-rule special case.
const WILDCARD_V4: &str = "0.0.0.0/0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetKind {
    Ban,
    Allow,
}

impl SetKind {
    fn suffix(self) -> &'static str {
        match self {
            SetKind::Ban => "_ban",
            SetKind::Allow => "_allow",
        }
    }

    fn verdict(self) -> &'static str {
        match self {
            SetKind::Ban => "DROP",
            SetKind::Allow => "ACCEPT",
        }
    }
}

fn create_set_args(name: &str) -> Vec<String> {
    args(&[
        "create", name, "hash:net", "family", "inet", "hashsize", "1024", "maxelem", "65536",
    ])
}

fn match_rule_args(chain: &str, set: &str, verdict: &str) -> Vec<String> {
    args(&[
        "-A", chain, "-m", "set", "--match-set", set, "src", "-j", verdict,
    ])
}

fn match_check_args(chain: &str, set: &str, verdict: &str) -> Vec<String> {
    args(&[
        "-C", chain, "-m", "set", "--match-set", set, "src", "-j", verdict,
    ])
}

/// stderr classification for `ipset add`: the entry was already there.
fn is_already_present_error(stderr: &str) -> bool {
    stderr.contains("already added") || stderr.contains("already exists")
}

/// stderr classification for `ipset del`: the entry was not there.
///
/// The ipset binary reports this with localisable text and no structured
/// code survives the shell boundary, so known phrases are matched first
/// and the bare `exis` fragment is kept as a last resort.
fn is_absent_entry_error(stderr: &str) -> bool {
    stderr.contains("not added")
        || stderr.contains("does not exist")
        || stderr.contains("doesn't exist")
        || stderr.contains("exis")
}

fn is_absent_rule_error(stderr: &str) -> bool {
    stderr.contains("Bad rule")
        || stderr.contains("does not exist")
        || stderr.contains("No chain/target/match by that name")
}

pub struct IpsetBackend {
    chain: String,
    base: String,
    runner: Box<dyn CommandRunner>,
}

impl IpsetBackend {
    pub fn new(chain: &str, set_base: &str) -> Self {
        Self::with_runner(chain, set_base, Box::new(SystemRunner))
    }

    pub(crate) fn with_runner(chain: &str, set_base: &str, runner: Box<dyn CommandRunner>) -> Self {
        Self {
            chain: chain.to_string(),
            base: set_base.to_string(),
            runner,
        }
    }

    fn set_name(&self, kind: SetKind) -> String {
        format!("{}{}", self.base, kind.suffix())
    }

    fn run(&mut self, program: &str, argv: &[String]) -> Result<CmdOutput, DomainError> {
        tracing::debug!(cmd = %render(program, argv), "kernel command");
        self.runner.run(program, argv)
    }

    fn run_checked(&mut self, program: &str, argv: &[String]) -> Result<(), DomainError> {
        let out = self.run(program, argv)?;
        if out.ok {
            Ok(())
        } else {
            Err(DomainError::BackendUnavailable(format!(
                "{} failed: {}",
                render(program, argv),
                out.stderr.trim()
            )))
        }
    }

    /// Create the set, or flush it when a prior run left it behind.
    fn ensure_set(&mut self, kind: SetKind) -> Result<(), DomainError> {
        let name = self.set_name(kind);
        let exists = self.run(IPSET, &args(&["list", &name, "-name"]))?.ok;
        if exists {
            self.run_checked(IPSET, &args(&["flush", &name]))
        } else {
            self.run_checked(IPSET, &create_set_args(&name))
        }
    }

    fn ensure_chain_and_jump(&mut self) -> Result<(), DomainError> {
        let chain = self.chain.clone();

        let listing = self.run(IPTABLES, &args(&["-S"]))?;
        if !listing.ok {
            return Err(DomainError::BackendUnavailable(format!(
                "iptables -S failed: {}",
                listing.stderr.trim()
            )));
        }
        let declared = listing
            .stdout
            .lines()
            .any(|line| line.trim() == format!("-N {chain}"));
        if declared {
            self.run_checked(IPTABLES, &args(&["-F", &chain]))?;
        } else {
            self.run_checked(IPTABLES, &args(&["-N", &chain]))?;
        }

        let input = self.run(IPTABLES, &args(&["-S", "INPUT"]))?;
        if !input.ok {
            return Err(DomainError::BackendUnavailable(format!(
                "iptables -S INPUT failed: {}",
                input.stderr.trim()
            )));
        }
        let jump = input
            .stdout
            .lines()
            .any(|line| line.trim() == format!("-A INPUT -j {chain}"));
        if !jump {
            self.run_checked(IPTABLES, &args(&["-I", "INPUT", "1", "-j", &chain]))?;
        }
        Ok(())
    }

    /// Append one set-match rule unless it is already in place.
    fn ensure_match_rule(&mut self, kind: SetKind) -> Result<(), DomainError> {
        let chain = self.chain.clone();
        let set = self.set_name(kind);
        if self
            .run(IPTABLES, &match_check_args(&chain, &set, kind.verdict()))?
            .ok
        {
            return Ok(());
        }
        self.run_checked(IPTABLES, &match_rule_args(&chain, &set, kind.verdict()))
    }

    /// Install the direct chain rule used for the full wildcard.
    fn add_wildcard_rule(&mut self, kind: SetKind) -> Result<(), DomainError> {
        let chain = self.chain.clone();
        let check = args(&["-C", &chain, "-s", WILDCARD_V4, "-j", kind.verdict()]);
        if self.run(IPTABLES, &check)?.ok {
            return Ok(());
        }
        let install = match kind {
            SetKind::Ban => args(&["-A", &chain, "-s", WILDCARD_V4, "-j", "DROP"]),
            SetKind::Allow => args(&["-I", &chain, "1", "-s", WILDCARD_V4, "-j", "ACCEPT"]),
        };
        self.run_checked(IPTABLES, &install)
    }

    fn remove_wildcard_rule(&mut self, kind: SetKind) -> Result<(), DomainError> {
        let chain = self.chain.clone();
        let argv = args(&["-D", &chain, "-s", WILDCARD_V4, "-j", kind.verdict()]);
        let out = self.run(IPTABLES, &argv)?;
        if out.ok || is_absent_rule_error(&out.stderr) {
            Ok(())
        } else {
            Err(DomainError::BackendUnavailable(format!(
                "{} failed: {}",
                render(IPTABLES, &argv),
                out.stderr.trim()
            )))
        }
    }

    fn add_entry(&mut self, kind: SetKind, ip_net: &str) -> Result<(), DomainError> {
        if ip_net == WILDCARD_V4 {
            return self.add_wildcard_rule(kind);
        }
        let set = self.set_name(kind);
        let entry = canonical(ip_net)?;
        let argv = args(&["add", &set, &entry]);
        let out = self.run(IPSET, &argv)?;
        if out.ok || is_already_present_error(&out.stderr) {
            Ok(())
        } else {
            Err(DomainError::BackendUnavailable(format!(
                "{} failed: {}",
                render(IPSET, &argv),
                out.stderr.trim()
            )))
        }
    }

    fn remove_entry(&mut self, kind: SetKind, ip_net: &str) -> Result<(), DomainError> {
        if ip_net == WILDCARD_V4 {
            return self.remove_wildcard_rule(kind);
        }
        let set = self.set_name(kind);
        let entry = canonical(ip_net)?;
        let argv = args(&["del", &set, &entry]);
        let out = self.run(IPSET, &argv)?;
        if out.ok || is_absent_entry_error(&out.stderr) {
            Ok(())
        } else {
            Err(DomainError::BackendUnavailable(format!(
                "{} failed: {}",
                render(IPSET, &argv),
                out.stderr.trim()
            )))
        }
    }
}

impl FirewallBackend for IpsetBackend {
    fn init(&mut self) -> Result<(), DomainError> {
        self.ensure_set(SetKind::Ban)?;
        self.ensure_set(SetKind::Allow)?;
        self.ensure_chain_and_jump()?;
        // Into the freshly flushed chain: allow match first, ban second.
        self.ensure_match_rule(SetKind::Allow)?;
        self.ensure_match_rule(SetKind::Ban)?;
        tracing::info!(chain = %self.chain, base = %self.base, "ipset backend initialised");
        Ok(())
    }

    fn ban(&mut self, ip_net: &str) -> Result<(), DomainError> {
        self.add_entry(SetKind::Ban, ip_net)
    }

    fn revert_ban(&mut self, ip_net: &str) -> Result<(), DomainError> {
        self.remove_entry(SetKind::Ban, ip_net)
    }

    fn allow(&mut self, ip_net: &str) -> Result<(), DomainError> {
        self.add_entry(SetKind::Allow, ip_net)
    }

    fn revert_allow(&mut self, ip_net: &str) -> Result<(), DomainError> {
        self.remove_entry(SetKind::Allow, ip_net)
    }

    fn cleanup_ip_net(&mut self, ip_net: &str) -> Result<(), DomainError> {
        let mut errors = Vec::new();
        for kind in [SetKind::Ban, SetKind::Allow] {
            if let Err(err) = self.remove_entry(kind, ip_net) {
                errors.push(err.to_string());
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::BackendUnavailable(errors.join("; ")))
        }
    }

    fn cleanup(&mut self) -> Result<(), DomainError> {
        // iptables side first, so neither set is referenced when destroyed.
        loop {
            let chain = self.chain.clone();
            let out = self.run(IPTABLES, &args(&["-D", "INPUT", "-j", &chain]))?;
            if !out.ok {
                break;
            }
        }
        let chain = self.chain.clone();
        let flushed = self.run(IPTABLES, &args(&["-F", &chain]))?;
        if !flushed.ok {
            tracing::debug!(chain = %chain, stderr = %flushed.stderr.trim(), "chain flush skipped");
        }
        let deleted = self.run(IPTABLES, &args(&["-X", &chain]))?;
        if !deleted.ok {
            tracing::debug!(chain = %chain, stderr = %deleted.stderr.trim(), "chain delete skipped");
        }

        for kind in [SetKind::Ban, SetKind::Allow] {
            let name = self.set_name(kind);
            let flushed = self.run(IPSET, &args(&["flush", &name]))?;
            if !flushed.ok {
                tracing::warn!(set = %name, stderr = %flushed.stderr.trim(), "set flush failed");
            }
            let destroyed = self.run(IPSET, &args(&["destroy", &name]))?;
            if !destroyed.ok {
                tracing::warn!(set = %name, stderr = %destroyed.stderr.trim(), "set destroy failed");
            }
        }
        tracing::info!(chain = %self.chain, base = %self.base, "ipset backend cleaned up");
        Ok(())
    }
}
