use domain::common::error::DomainError;
use ports::secondary::firewall_backend::FirewallBackend;

/// Backend that only logs. Used for tests and unprivileged runs.
#[derive(Debug, Default)]
pub struct NoopBackend;

impl NoopBackend {
    pub fn new() -> Self {
        Self
    }
}

impl FirewallBackend for NoopBackend {
    fn init(&mut self) -> Result<(), DomainError> {
        tracing::info!("noop firewall initialised");
        Ok(())
    }

    fn ban(&mut self, ip_net: &str) -> Result<(), DomainError> {
        tracing::info!(ip_net, "noop ban");
        Ok(())
    }

    fn revert_ban(&mut self, ip_net: &str) -> Result<(), DomainError> {
        tracing::info!(ip_net, "noop revert ban");
        Ok(())
    }

    fn allow(&mut self, ip_net: &str) -> Result<(), DomainError> {
        tracing::info!(ip_net, "noop allow");
        Ok(())
    }

    fn revert_allow(&mut self, ip_net: &str) -> Result<(), DomainError> {
        tracing::info!(ip_net, "noop revert allow");
        Ok(())
    }

    fn cleanup_ip_net(&mut self, ip_net: &str) -> Result<(), DomainError> {
        tracing::info!(ip_net, "noop cleanup");
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), DomainError> {
        tracing::info!("noop firewall cleaned up");
        Ok(())
    }
}
