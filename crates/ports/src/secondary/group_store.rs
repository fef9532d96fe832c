use domain::rule::entity::{GroupId, IpNetGroup};
use domain::rule::error::StoreError;

/// Persistent catalog of rule groups.
///
/// Group names are unique. The default flag is data, not policy: keeping
/// exactly one default group is the policy service's job, the store only
/// offers the transactional primitive for it.
pub trait GroupStore: Send + Sync {
    fn create(&self, name: &str, description: &str) -> Result<IpNetGroup, StoreError>;

    fn find_by_id(&self, id: GroupId) -> Result<IpNetGroup, StoreError>;

    fn find_by_name(&self, name: &str) -> Result<Option<IpNetGroup>, StoreError>;

    fn find_default(&self) -> Result<Option<IpNetGroup>, StoreError>;

    fn find_all(&self) -> Result<Vec<IpNetGroup>, StoreError>;

    fn update(&self, id: GroupId, name: &str, description: &str)
    -> Result<IpNetGroup, StoreError>;

    fn delete(&self, id: GroupId) -> Result<(), StoreError>;

    /// Clear the default flag everywhere, then set it on `id`, as one
    /// transaction.
    fn set_default(&self, id: GroupId) -> Result<(), StoreError>;
}
