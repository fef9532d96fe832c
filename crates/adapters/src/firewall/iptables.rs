//! Per-address firewall backend driving an `iptables` chain.
//!
//! One managed chain hangs off INPUT via a single jump rule. Ban rules
//! are appended (`-A <chain> -s <cidr> -j DROP`); allow rules are
//! inserted at position 1 (`-I <chain> 1 -s <cidr> -j ACCEPT`), which
//! gives allow precedence over ban for any address matching both.

use domain::common::error::DomainError;
use ports::secondary::firewall_backend::FirewallBackend;

use super::exec::{CmdOutput, CommandRunner, SystemRunner, args, render};

const IPTABLES: &str = "iptables";

struct RuleSpec<'a> {
    chain: &'a str,
    source: &'a str,
    target: &'a str,
}

fn check_args(spec: &RuleSpec) -> Vec<String> {
    args(&["-C", spec.chain, "-s", spec.source, "-j", spec.target])
}

fn append_args(spec: &RuleSpec) -> Vec<String> {
    args(&["-A", spec.chain, "-s", spec.source, "-j", spec.target])
}

fn insert_top_args(spec: &RuleSpec) -> Vec<String> {
    args(&["-I", spec.chain, "1", "-s", spec.source, "-j", spec.target])
}

fn delete_args(spec: &RuleSpec) -> Vec<String> {
    args(&["-D", spec.chain, "-s", spec.source, "-j", spec.target])
}

/// True if `iptables -S` output declares the chain (`-N <chain>`).
fn chain_declared(listing: &str, chain: &str) -> bool {
    let needle = format!("-N {chain}");
    listing.lines().any(|line| line.trim() == needle)
}

/// True if `iptables -S INPUT` output already jumps to the chain.
fn jump_present(listing: &str, chain: &str) -> bool {
    let needle = format!("-A INPUT -j {chain}");
    listing.lines().any(|line| line.trim() == needle)
}

/// Classify a failed `-D` as "rule was not there" (idempotent success).
fn is_absent_delete_error(stderr: &str) -> bool {
    stderr.contains("Bad rule")
        || stderr.contains("does not exist")
        || stderr.contains("No chain/target/match by that name")
}

pub struct IptablesBackend {
    chain: String,
    runner: Box<dyn CommandRunner>,
}

impl IptablesBackend {
    pub fn new(chain: &str) -> Self {
        Self::with_runner(chain, Box::new(SystemRunner))
    }

    pub(crate) fn with_runner(chain: &str, runner: Box<dyn CommandRunner>) -> Self {
        Self {
            chain: chain.to_string(),
            runner,
        }
    }

    fn run(&mut self, argv: &[String]) -> Result<CmdOutput, DomainError> {
        tracing::debug!(cmd = %render(IPTABLES, argv), "kernel command");
        self.runner.run(IPTABLES, argv)
    }

    fn run_checked(&mut self, argv: &[String]) -> Result<(), DomainError> {
        let out = self.run(argv)?;
        if out.ok {
            Ok(())
        } else {
            Err(DomainError::BackendUnavailable(format!(
                "{} failed: {}",
                render(IPTABLES, argv),
                out.stderr.trim()
            )))
        }
    }

    /// `iptables -C` exits zero when the rule is present.
    fn rule_present(&mut self, spec: &RuleSpec) -> Result<bool, DomainError> {
        Ok(self.run(&check_args(spec))?.ok)
    }

    fn install_unique(&mut self, spec: &RuleSpec, argv: Vec<String>) -> Result<(), DomainError> {
        if self.rule_present(spec)? {
            return Ok(());
        }
        self.run_checked(&argv)
    }

    fn delete_absorbing(&mut self, spec: &RuleSpec) -> Result<(), DomainError> {
        let argv = delete_args(spec);
        let out = self.run(&argv)?;
        if out.ok || is_absent_delete_error(&out.stderr) {
            Ok(())
        } else {
            Err(DomainError::BackendUnavailable(format!(
                "{} failed: {}",
                render(IPTABLES, &argv),
                out.stderr.trim()
            )))
        }
    }

}

impl FirewallBackend for IptablesBackend {
    fn init(&mut self) -> Result<(), DomainError> {
        let chain = self.chain.clone();

        // Existing chain (unclean prior exit) is flushed, not recreated.
        let listing = self.run(&args(&["-S"]))?;
        if !listing.ok {
            return Err(DomainError::BackendUnavailable(format!(
                "iptables -S failed: {}",
                listing.stderr.trim()
            )));
        }
        if chain_declared(&listing.stdout, &chain) {
            self.run_checked(&args(&["-F", &chain]))?;
        } else {
            self.run_checked(&args(&["-N", &chain]))?;
        }

        // Exactly one jump from INPUT, at the top.
        let input = self.run(&args(&["-S", "INPUT"]))?;
        if !input.ok {
            return Err(DomainError::BackendUnavailable(format!(
                "iptables -S INPUT failed: {}",
                input.stderr.trim()
            )));
        }
        if !jump_present(&input.stdout, &chain) {
            self.run_checked(&args(&["-I", "INPUT", "1", "-j", &chain]))?;
        }
        tracing::info!(chain = %chain, "iptables backend initialised");
        Ok(())
    }

    fn ban(&mut self, ip_net: &str) -> Result<(), DomainError> {
        let chain = self.chain.clone();
        let spec = RuleSpec {
            chain: &chain,
            source: ip_net,
            target: "DROP",
        };
        let argv = append_args(&spec);
        self.install_unique(&spec, argv)
    }

    fn revert_ban(&mut self, ip_net: &str) -> Result<(), DomainError> {
        let chain = self.chain.clone();
        self.delete_absorbing(&RuleSpec {
            chain: &chain,
            source: ip_net,
            target: "DROP",
        })
    }

    fn allow(&mut self, ip_net: &str) -> Result<(), DomainError> {
        let chain = self.chain.clone();
        let spec = RuleSpec {
            chain: &chain,
            source: ip_net,
            target: "ACCEPT",
        };
        let argv = insert_top_args(&spec);
        self.install_unique(&spec, argv)
    }

    fn revert_allow(&mut self, ip_net: &str) -> Result<(), DomainError> {
        let chain = self.chain.clone();
        self.delete_absorbing(&RuleSpec {
            chain: &chain,
            source: ip_net,
            target: "ACCEPT",
        })
    }

    fn cleanup_ip_net(&mut self, ip_net: &str) -> Result<(), DomainError> {
        let chain = self.chain.clone();
        let mut errors = Vec::new();
        for target in ["DROP", "ACCEPT"] {
            if let Err(err) = self.delete_absorbing(&RuleSpec {
                chain: &chain,
                source: ip_net,
                target,
            }) {
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
        // Delete every INPUT jump: loop until the delete stops matching.
        loop {
            let chain = self.chain.clone();
            let out = self.run(&args(&["-D", "INPUT", "-j", &chain]))?;
            if !out.ok {
                break;
            }
        }

        let chain = self.chain.clone();
        let flushed = self.run(&args(&["-F", &chain]))?;
        if !flushed.ok {
            tracing::debug!(chain = %self.chain, stderr = %flushed.stderr.trim(), "chain flush skipped");
        }
        let deleted = self.run(&args(&["-X", &chain]))?;
        if !deleted.ok {
            tracing::debug!(chain = %self.chain, stderr = %deleted.stderr.trim(), "chain delete skipped");
        }
        tracing::info!(chain = %self.chain, "iptables backend cleaned up");
        Ok(())
    }
}
