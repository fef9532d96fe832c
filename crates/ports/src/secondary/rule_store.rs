use domain::rule::entity::{Action, GroupId, IpNetRule, RuleId};
use domain::rule::error::StoreError;

/// Persistent catalog of network-expression rules.
///
/// The store enforces only its own constraints (expression uniqueness);
/// business rules such as default-group preservation live in the policy
/// service. Implementations may use redb or in-memory storage.
pub trait RuleStore: Send + Sync {
    /// Insert a new rule. The expression must be unique across the catalog.
    fn create(
        &self,
        ip_net: &str,
        group_id: GroupId,
        action: Action,
    ) -> Result<IpNetRule, StoreError>;

    /// Insert many rules, chunked into bounded transactions. Fails as a
    /// whole if any expression already exists.
    fn batch_create(
        &self,
        ip_nets: &[String],
        group_id: GroupId,
        action: Action,
    ) -> Result<Vec<IpNetRule>, StoreError>;

    fn find_by_id(&self, id: RuleId) -> Result<IpNetRule, StoreError>;

    fn find_by_ip_net(&self, ip_net: &str) -> Result<Option<IpNetRule>, StoreError>;

    /// Single-pass lookup of every expression in the list that exists.
    fn find_by_ip_nets(&self, ip_nets: &[String]) -> Result<Vec<IpNetRule>, StoreError>;

    fn find_by_group(&self, group_id: GroupId) -> Result<Vec<IpNetRule>, StoreError>;

    fn find_by_action(&self, action: Action) -> Result<Vec<IpNetRule>, StoreError>;

    fn find_all(&self) -> Result<Vec<IpNetRule>, StoreError>;

    fn exists_by_ip_net(&self, ip_net: &str) -> Result<bool, StoreError>;

    fn update_action(&self, id: RuleId, action: Action) -> Result<(), StoreError>;

    fn update_group(&self, id: RuleId, group_id: GroupId) -> Result<(), StoreError>;

    /// Reassign every rule in `from` to `to`. Returns how many moved.
    fn update_group_bulk(&self, from: GroupId, to: GroupId) -> Result<usize, StoreError>;

    fn delete(&self, id: RuleId) -> Result<(), StoreError>;
}
