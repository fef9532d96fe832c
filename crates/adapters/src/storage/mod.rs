pub mod redb_group_store;
pub mod redb_rule_store;

pub use redb_group_store::RedbGroupStore;
pub use redb_rule_store::RedbRuleStore;

use redb::{ReadableTable, TableDefinition};

/// Shared id-counter table; each store uses its own key.
pub(crate) const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Allocate the next id for `key` within an open write transaction.
pub(crate) fn next_id(
    txn: &redb::WriteTransaction,
    key: &str,
) -> Result<u64, redb::Error> {
    let mut meta = txn.open_table(META_TABLE)?;
    let current = meta.get(key)?.map(|g| g.value()).unwrap_or(0);
    let next = current + 1;
    meta.insert(key, next)?;
    Ok(next)
}
