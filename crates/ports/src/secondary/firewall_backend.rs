use domain::common::error::DomainError;

/// Kernel packet-filter driver behind the firewall controller.
///
/// Implementations are not required to be re-entrant; the controller is
/// the single logical owner and serialises calls. All mutators are
/// idempotent: installing a rule twice equals installing it once, and
/// removing an absent rule succeeds.
///
/// Within the managed chain, allow rules are evaluated before ban rules,
/// so an address matching both is accepted.
pub trait FirewallBackend: Send {
    /// Prepare the kernel objects (chain, sets, jump rule). Must be safe
    /// to call over leftovers from an unclean prior exit.
    fn init(&mut self) -> Result<(), DomainError>;

    /// Install a drop rule for the network expression.
    fn ban(&mut self, ip_net: &str) -> Result<(), DomainError>;

    /// Remove the drop rule; absence is not an error.
    fn revert_ban(&mut self, ip_net: &str) -> Result<(), DomainError>;

    /// Install an accept rule evaluated before every ban rule.
    fn allow(&mut self, ip_net: &str) -> Result<(), DomainError>;

    /// Remove the accept rule; absence is not an error.
    fn revert_allow(&mut self, ip_net: &str) -> Result<(), DomainError>;

    /// Remove whichever of the two rules is present, silently.
    fn cleanup_ip_net(&mut self, ip_net: &str) -> Result<(), DomainError>;

    /// Tear down everything `init` and the mutators installed.
    fn cleanup(&mut self) -> Result<(), DomainError>;
}
