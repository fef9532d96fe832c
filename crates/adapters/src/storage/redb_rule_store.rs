use std::sync::{Arc, Mutex};

use chrono::Utc;
use domain::rule::entity::{Action, GroupId, IpNetRule, RuleId};
use domain::rule::error::StoreError;
use infrastructure::constants::BATCH_INSERT_CHUNK;
use ports::secondary::rule_store::RuleStore;
use redb::{Database, ReadableTable, TableDefinition};

use super::next_id;

/// redb table: key = rule id, value = JSON-serialized `IpNetRule`.
const RULES_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("rules");

/// Uniqueness index: key = network expression, value = rule id.
const RULES_BY_NET_TABLE: TableDefinition<&str, u64> = TableDefinition::new("rules_by_net");

const NEXT_RULE_ID: &str = "next_rule_id";

/// Persistent rule catalog backed by redb.
///
/// The expression index table enforces catalog-wide uniqueness; every
/// write goes through `write_lock` so the check-then-insert pairs are
/// atomic with respect to each other.
pub struct RedbRuleStore {
    db: Arc<Database>,
    write_lock: Mutex<()>,
}

impl RedbRuleStore {
    /// Open over a shared database handle, creating the tables.
    pub fn open(db: Arc<Database>) -> Result<Self, StoreError> {
        let txn = db
            .begin_write()
            .map_err(|e| storage("txn begin", &e))?;
        {
            txn.open_table(RULES_TABLE)
                .map_err(|e| storage("table create", &e))?;
            txn.open_table(RULES_BY_NET_TABLE)
                .map_err(|e| storage("index create", &e))?;
        }
        txn.commit().map_err(|e| storage("commit", &e))?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn decode(bytes: &[u8]) -> Result<IpNetRule, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| storage("deserialize", &e))
    }

    fn encode(rule: &IpNetRule) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(rule).map_err(|e| storage("serialize", &e))
    }

    fn load_all(&self) -> Result<Vec<IpNetRule>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| storage("read txn", &e))?;
        let table = txn
            .open_table(RULES_TABLE)
            .map_err(|e| storage("read table", &e))?;
        table
            .iter()
            .map_err(|e| storage("iter", &e))?
            .map(|entry| {
                let (_, value) = entry.map_err(|e| storage("iter entry", &e))?;
                Self::decode(value.value())
            })
            .collect()
    }

    /// Rewrite one rule under the write lock. The mutation keeps the
    /// expression unchanged, so the index needs no update.
    fn rewrite<F>(&self, id: RuleId, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut IpNetRule),
    {
        let _guard = lock(&self.write_lock)?;
        let txn = self
            .db
            .begin_write()
            .map_err(|e| storage("write txn", &e))?;
        {
            let mut table = txn
                .open_table(RULES_TABLE)
                .map_err(|e| storage("write table", &e))?;
            let mut rule = {
                let existing = table.get(id.0).map_err(|e| storage("get", &e))?;
                match existing {
                    Some(guard) => Self::decode(guard.value())?,
                    None => return Err(StoreError::NotFound(format!("rule {id}"))),
                }
            };
            mutate(&mut rule);
            rule.updated_at = Utc::now();
            let encoded = Self::encode(&rule)?;
            table
                .insert(id.0, encoded.as_slice())
                .map_err(|e| storage("insert", &e))?;
        }
        txn.commit().map_err(|e| storage("commit", &e))?;
        Ok(())
    }

    /// Insert a chunk of fresh rules in one transaction.
    fn insert_chunk(
        &self,
        chunk: &[String],
        group_id: GroupId,
        action: Action,
    ) -> Result<Vec<IpNetRule>, StoreError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| storage("write txn", &e))?;
        let mut created = Vec::with_capacity(chunk.len());
        {
            let mut rules = txn
                .open_table(RULES_TABLE)
                .map_err(|e| storage("write table", &e))?;
            let mut by_net = txn
                .open_table(RULES_BY_NET_TABLE)
                .map_err(|e| storage("write index", &e))?;

            for ip_net in chunk {
                let taken = by_net
                    .get(ip_net.as_str())
                    .map_err(|e| storage("index get", &e))?
                    .is_some();
                if taken {
                    return Err(StoreError::Conflict(format!(
                        "ip_net '{ip_net}' already exists"
                    )));
                }

                let id = next_id(&txn, NEXT_RULE_ID).map_err(|e| storage("next id", &e))?;
                let now = Utc::now();
                let rule = IpNetRule {
                    id: RuleId(id),
                    ip_net: ip_net.clone(),
                    group_id,
                    action,
                    created_at: now,
                    updated_at: now,
                };
                let encoded = Self::encode(&rule)?;
                rules
                    .insert(id, encoded.as_slice())
                    .map_err(|e| storage("insert", &e))?;
                by_net
                    .insert(ip_net.as_str(), id)
                    .map_err(|e| storage("index insert", &e))?;
                created.push(rule);
            }
        }
        txn.commit().map_err(|e| storage("commit", &e))?;
        Ok(created)
    }
}

impl RuleStore for RedbRuleStore {
    fn create(
        &self,
        ip_net: &str,
        group_id: GroupId,
        action: Action,
    ) -> Result<IpNetRule, StoreError> {
        let _guard = lock(&self.write_lock)?;
        let created = self.insert_chunk(std::slice::from_ref(&ip_net.to_string()), group_id, action)?;
        Ok(created.into_iter().next().expect("one row inserted"))
    }

    fn batch_create(
        &self,
        ip_nets: &[String],
        group_id: GroupId,
        action: Action,
    ) -> Result<Vec<IpNetRule>, StoreError> {
        let _guard = lock(&self.write_lock)?;

        // Whole-batch uniqueness pre-check; the per-chunk transactions
        // below re-check under the same held write lock.
        {
            let txn = self
                .db
                .begin_read()
                .map_err(|e| storage("read txn", &e))?;
            let by_net = txn
                .open_table(RULES_BY_NET_TABLE)
                .map_err(|e| storage("read index", &e))?;
            for ip_net in ip_nets {
                let taken = by_net
                    .get(ip_net.as_str())
                    .map_err(|e| storage("index get", &e))?
                    .is_some();
                if taken {
                    return Err(StoreError::Conflict(format!(
                        "ip_net '{ip_net}' already exists"
                    )));
                }
            }
        }

        let mut created = Vec::with_capacity(ip_nets.len());
        for chunk in ip_nets.chunks(BATCH_INSERT_CHUNK) {
            created.extend(self.insert_chunk(chunk, group_id, action)?);
        }
        Ok(created)
    }

    fn find_by_id(&self, id: RuleId) -> Result<IpNetRule, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| storage("read txn", &e))?;
        let table = txn
            .open_table(RULES_TABLE)
            .map_err(|e| storage("read table", &e))?;
        match table.get(id.0).map_err(|e| storage("get", &e))? {
            Some(guard) => Self::decode(guard.value()),
            None => Err(StoreError::NotFound(format!("rule {id}"))),
        }
    }

    fn find_by_ip_net(&self, ip_net: &str) -> Result<Option<IpNetRule>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| storage("read txn", &e))?;
        let by_net = txn
            .open_table(RULES_BY_NET_TABLE)
            .map_err(|e| storage("read index", &e))?;
        let Some(id) = by_net
            .get(ip_net)
            .map_err(|e| storage("index get", &e))?
            .map(|g| g.value())
        else {
            return Ok(None);
        };
        let table = txn
            .open_table(RULES_TABLE)
            .map_err(|e| storage("read table", &e))?;
        match table.get(id).map_err(|e| storage("get", &e))? {
            Some(guard) => Ok(Some(Self::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn find_by_ip_nets(&self, ip_nets: &[String]) -> Result<Vec<IpNetRule>, StoreError> {
        let mut found = Vec::new();
        for ip_net in ip_nets {
            if let Some(rule) = self.find_by_ip_net(ip_net)? {
                found.push(rule);
            }
        }
        Ok(found)
    }

    fn find_by_group(&self, group_id: GroupId) -> Result<Vec<IpNetRule>, StoreError> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|r| r.group_id == group_id)
            .collect())
    }

    fn find_by_action(&self, action: Action) -> Result<Vec<IpNetRule>, StoreError> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|r| r.action == action)
            .collect())
    }

    fn find_all(&self) -> Result<Vec<IpNetRule>, StoreError> {
        self.load_all()
    }

    fn exists_by_ip_net(&self, ip_net: &str) -> Result<bool, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| storage("read txn", &e))?;
        let by_net = txn
            .open_table(RULES_BY_NET_TABLE)
            .map_err(|e| storage("read index", &e))?;
        Ok(by_net
            .get(ip_net)
            .map_err(|e| storage("index get", &e))?
            .is_some())
    }

    fn update_action(&self, id: RuleId, action: Action) -> Result<(), StoreError> {
        self.rewrite(id, |rule| rule.action = action)
    }

    fn update_group(&self, id: RuleId, group_id: GroupId) -> Result<(), StoreError> {
        self.rewrite(id, |rule| rule.group_id = group_id)
    }

    fn update_group_bulk(&self, from: GroupId, to: GroupId) -> Result<usize, StoreError> {
        let members: Vec<RuleId> = self
            .find_by_group(from)?
            .into_iter()
            .map(|r| r.id)
            .collect();
        for id in &members {
            self.rewrite(*id, |rule| rule.group_id = to)?;
        }
        Ok(members.len())
    }

    fn delete(&self, id: RuleId) -> Result<(), StoreError> {
        let _guard = lock(&self.write_lock)?;
        let txn = self
            .db
            .begin_write()
            .map_err(|e| storage("write txn", &e))?;
        {
            let mut rules = txn
                .open_table(RULES_TABLE)
                .map_err(|e| storage("write table", &e))?;
            let removed = rules.remove(id.0).map_err(|e| storage("remove", &e))?;
            let rule = match removed {
                Some(guard) => Self::decode(guard.value())?,
                None => return Err(StoreError::NotFound(format!("rule {id}"))),
            };
            let mut by_net = txn
                .open_table(RULES_BY_NET_TABLE)
                .map_err(|e| storage("write index", &e))?;
            by_net
                .remove(rule.ip_net.as_str())
                .map_err(|e| storage("index remove", &e))?;
        }
        txn.commit().map_err(|e| storage("commit", &e))?;
        Ok(())
    }
}

fn storage(context: &str, err: &dyn std::fmt::Display) -> StoreError {
    StoreError::Storage(format!("redb {context}: {err}"))
}

fn lock(mutex: &Mutex<()>) -> Result<std::sync::MutexGuard<'_, ()>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Storage("write lock poisoned".to_string()))
}
