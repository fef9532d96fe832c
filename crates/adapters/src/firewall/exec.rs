//! Shell-out plumbing shared by the kernel firewall backends.

use std::process::Command;

use domain::common::error::DomainError;

/// Outcome of one finished kernel tool invocation.
#[derive(Debug, Clone)]
pub(crate) struct CmdOutput {
    pub ok: bool,
    pub stdout: String,
    pub stderr: String,
}

#[cfg(test)]
impl CmdOutput {
    pub fn success() -> Self {
        Self {
            ok: true,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn failure(stderr: &str) -> Self {
        Self {
            ok: false,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

/// Seam between the backends and the `iptables`/`ipset` binaries, so the
/// command sequences are testable without touching the kernel.
///
/// `Err` means the tool could not run at all (missing binary, no
/// permission to spawn); a tool that ran and reported failure comes back
/// as `Ok` with `ok == false` and its stderr.
pub(crate) trait CommandRunner: Send {
    fn run(&mut self, program: &str, args: &[String]) -> Result<CmdOutput, DomainError>;
}

/// Production runner: spawns the real binaries.
pub(crate) struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, program: &str, args: &[String]) -> Result<CmdOutput, DomainError> {
        let output = Command::new(program).args(args).output().map_err(|e| {
            DomainError::BackendUnavailable(format!("failed to run {program}: {e}"))
        })?;
        Ok(CmdOutput {
            ok: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Format a command line the way the operator would type it, for logs
/// and error messages.
pub(crate) fn render(program: &str, args: &[String]) -> String {
    let mut line = String::from(program);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

pub(crate) fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Test runner that records every command line and replays scripted
    /// responses; unscripted calls succeed with empty output.
    pub(crate) struct ScriptedRunner {
        pub calls: Arc<Mutex<Vec<String>>>,
        responses: VecDeque<(String, CmdOutput)>,
    }

    impl ScriptedRunner {
        pub fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    calls: Arc::clone(&calls),
                    responses: VecDeque::new(),
                },
                calls,
            )
        }

        /// Queue a response for the next command whose rendered line
        /// contains `needle`.
        pub fn respond(mut self, needle: &str, output: CmdOutput) -> Self {
            self.responses.push_back((needle.to_string(), output));
            self
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&mut self, program: &str, args: &[String]) -> Result<CmdOutput, DomainError> {
            let line = render(program, args);
            self.calls.lock().unwrap().push(line.clone());
            if let Some(pos) = self
                .responses
                .iter()
                .position(|(needle, _)| line.contains(needle.as_str()))
            {
                let (_, output) = self.responses.remove(pos).unwrap();
                return Ok(output);
            }
            Ok(CmdOutput::success())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_joins_program_and_args() {
        assert_eq!(
            render("iptables", &args(&["-A", "INPUT", "-j", "DROP"])),
            "iptables -A INPUT -j DROP"
        );
    }
}
