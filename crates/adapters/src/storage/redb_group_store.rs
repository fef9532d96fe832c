use std::sync::{Arc, Mutex};

use chrono::Utc;
use domain::rule::entity::{GroupId, IpNetGroup};
use domain::rule::error::StoreError;
use ports::secondary::group_store::GroupStore;
use redb::{Database, ReadableTable, TableDefinition};

use super::next_id;

/// redb table: key = group id, value = JSON-serialized `IpNetGroup`.
const GROUPS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("groups");

/// Uniqueness index: key = group name, value = group id.
const GROUPS_BY_NAME_TABLE: TableDefinition<&str, u64> = TableDefinition::new("groups_by_name");

const NEXT_GROUP_ID: &str = "next_group_id";

/// Persistent group catalog backed by redb.
pub struct RedbGroupStore {
    db: Arc<Database>,
    write_lock: Mutex<()>,
}

impl RedbGroupStore {
    /// Open over a shared database handle, creating the tables.
    pub fn open(db: Arc<Database>) -> Result<Self, StoreError> {
        let txn = db
            .begin_write()
            .map_err(|e| storage("txn begin", &e))?;
        {
            txn.open_table(GROUPS_TABLE)
                .map_err(|e| storage("table create", &e))?;
            txn.open_table(GROUPS_BY_NAME_TABLE)
                .map_err(|e| storage("index create", &e))?;
        }
        txn.commit().map_err(|e| storage("commit", &e))?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn decode(bytes: &[u8]) -> Result<IpNetGroup, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| storage("deserialize", &e))
    }

    fn encode(group: &IpNetGroup) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(group).map_err(|e| storage("serialize", &e))
    }

    fn load_all(&self) -> Result<Vec<IpNetGroup>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| storage("read txn", &e))?;
        let table = txn
            .open_table(GROUPS_TABLE)
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
}

impl GroupStore for RedbGroupStore {
    fn create(&self, name: &str, description: &str) -> Result<IpNetGroup, StoreError> {
        let _guard = lock(&self.write_lock)?;
        let txn = self
            .db
            .begin_write()
            .map_err(|e| storage("write txn", &e))?;
        let group = {
            let mut groups = txn
                .open_table(GROUPS_TABLE)
                .map_err(|e| storage("write table", &e))?;
            let mut by_name = txn
                .open_table(GROUPS_BY_NAME_TABLE)
                .map_err(|e| storage("write index", &e))?;

            let taken = by_name
                .get(name)
                .map_err(|e| storage("index get", &e))?
                .is_some();
            if taken {
                return Err(StoreError::Conflict(format!(
                    "group '{name}' already exists"
                )));
            }

            let id = next_id(&txn, NEXT_GROUP_ID).map_err(|e| storage("next id", &e))?;
            let now = Utc::now();
            let group = IpNetGroup {
                id: GroupId(id),
                name: name.to_string(),
                description: description.to_string(),
                is_default: false,
                created_at: now,
                updated_at: now,
            };
            let encoded = Self::encode(&group)?;
            groups
                .insert(id, encoded.as_slice())
                .map_err(|e| storage("insert", &e))?;
            by_name
                .insert(name, id)
                .map_err(|e| storage("index insert", &e))?;
            group
        };
        txn.commit().map_err(|e| storage("commit", &e))?;
        Ok(group)
    }

    fn find_by_id(&self, id: GroupId) -> Result<IpNetGroup, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| storage("read txn", &e))?;
        let table = txn
            .open_table(GROUPS_TABLE)
            .map_err(|e| storage("read table", &e))?;
        match table.get(id.0).map_err(|e| storage("get", &e))? {
            Some(guard) => Self::decode(guard.value()),
            None => Err(StoreError::NotFound(format!("group {id}"))),
        }
    }

    fn find_by_name(&self, name: &str) -> Result<Option<IpNetGroup>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| storage("read txn", &e))?;
        let by_name = txn
            .open_table(GROUPS_BY_NAME_TABLE)
            .map_err(|e| storage("read index", &e))?;
        let Some(id) = by_name
            .get(name)
            .map_err(|e| storage("index get", &e))?
            .map(|g| g.value())
        else {
            return Ok(None);
        };
        let table = txn
            .open_table(GROUPS_TABLE)
            .map_err(|e| storage("read table", &e))?;
        match table.get(id).map_err(|e| storage("get", &e))? {
            Some(guard) => Ok(Some(Self::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn find_default(&self) -> Result<Option<IpNetGroup>, StoreError> {
        Ok(self.load_all()?.into_iter().find(|g| g.is_default))
    }

    fn find_all(&self) -> Result<Vec<IpNetGroup>, StoreError> {
        self.load_all()
    }

    fn update(
        &self,
        id: GroupId,
        name: &str,
        description: &str,
    ) -> Result<IpNetGroup, StoreError> {
        let _guard = lock(&self.write_lock)?;
        let txn = self
            .db
            .begin_write()
            .map_err(|e| storage("write txn", &e))?;
        let group = {
            let mut groups = txn
                .open_table(GROUPS_TABLE)
                .map_err(|e| storage("write table", &e))?;
            let mut by_name = txn
                .open_table(GROUPS_BY_NAME_TABLE)
                .map_err(|e| storage("write index", &e))?;

            let mut group = {
                let existing = groups.get(id.0).map_err(|e| storage("get", &e))?;
                match existing {
                    Some(guard) => Self::decode(guard.value())?,
                    None => return Err(StoreError::NotFound(format!("group {id}"))),
                }
            };

            let name_taken = by_name
                .get(name)
                .map_err(|e| storage("index get", &e))?
                .map(|g| g.value())
                .is_some_and(|owner| owner != id.0);
            if name_taken {
                return Err(StoreError::Conflict(format!(
                    "group '{name}' already exists"
                )));
            }

            by_name
                .remove(group.name.as_str())
                .map_err(|e| storage("index remove", &e))?;
            group.name = name.to_string();
            group.description = description.to_string();
            group.updated_at = Utc::now();
            let encoded = Self::encode(&group)?;
            groups
                .insert(id.0, encoded.as_slice())
                .map_err(|e| storage("insert", &e))?;
            by_name
                .insert(name, id.0)
                .map_err(|e| storage("index insert", &e))?;
            group
        };
        txn.commit().map_err(|e| storage("commit", &e))?;
        Ok(group)
    }

    fn delete(&self, id: GroupId) -> Result<(), StoreError> {
        let _guard = lock(&self.write_lock)?;
        let txn = self
            .db
            .begin_write()
            .map_err(|e| storage("write txn", &e))?;
        {
            let mut groups = txn
                .open_table(GROUPS_TABLE)
                .map_err(|e| storage("write table", &e))?;
            let removed = groups.remove(id.0).map_err(|e| storage("remove", &e))?;
            let group = match removed {
                Some(guard) => Self::decode(guard.value())?,
                None => return Err(StoreError::NotFound(format!("group {id}"))),
            };
            let mut by_name = txn
                .open_table(GROUPS_BY_NAME_TABLE)
                .map_err(|e| storage("write index", &e))?;
            by_name
                .remove(group.name.as_str())
                .map_err(|e| storage("index remove", &e))?;
        }
        txn.commit().map_err(|e| storage("commit", &e))?;
        Ok(())
    }

    /// One transaction: clear the flag everywhere, set it on the target.
    fn set_default(&self, id: GroupId) -> Result<(), StoreError> {
        let _guard = lock(&self.write_lock)?;
        let txn = self
            .db
            .begin_write()
            .map_err(|e| storage("write txn", &e))?;
        {
            let mut groups = txn
                .open_table(GROUPS_TABLE)
                .map_err(|e| storage("write table", &e))?;

            let mut all: Vec<IpNetGroup> = groups
                .iter()
                .map_err(|e| storage("iter", &e))?
                .map(|entry| {
                    let (_, value) = entry.map_err(|e| storage("iter entry", &e))?;
                    Self::decode(value.value())
                })
                .collect::<Result<_, _>>()?;

            if !all.iter().any(|g| g.id == id) {
                return Err(StoreError::NotFound(format!("group {id}")));
            }

            let now = Utc::now();
            for group in &mut all {
                let should_be_default = group.id == id;
                if group.is_default != should_be_default {
                    group.is_default = should_be_default;
                    group.updated_at = now;
                    let encoded = Self::encode(group)?;
                    groups
                        .insert(group.id.0, encoded.as_slice())
                        .map_err(|e| storage("insert", &e))?;
                }
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn make_store() -> (RedbGroupStore, NamedTempFile) {
        let tmp = NamedTempFile::new().unwrap();
        let db = Arc::new(Database::create(tmp.path()).unwrap());
        (RedbGroupStore::open(db).unwrap(), tmp)
    }

    #[test]
    fn create_and_find_back() {
        let (store, _tmp) = make_store();
        let group = store.create("default", "the default group").unwrap();
        assert_eq!(group.id, GroupId(1));
        assert!(!group.is_default);

        assert_eq!(store.find_by_id(group.id).unwrap().name, "default");
        assert!(store.find_by_name("default").unwrap().is_some());
        assert!(store.find_by_name("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_name_conflicts() {
        let (store, _tmp) = make_store();
        store.create("default", "").unwrap();
        assert!(matches!(
            store.create("default", "again"),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn set_default_keeps_exactly_one() {
        let (store, _tmp) = make_store();
        let first = store.create("first", "").unwrap();
        let second = store.create("second", "").unwrap();

        store.set_default(first.id).unwrap();
        assert_eq!(store.find_default().unwrap().unwrap().id, first.id);

        store.set_default(second.id).unwrap();
        let all = store.find_all().unwrap();
        let defaults: Vec<_> = all.iter().filter(|g| g.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, second.id);
    }

    #[test]
    fn set_default_on_missing_group_fails() {
        let (store, _tmp) = make_store();
        assert!(matches!(
            store.set_default(GroupId(9)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn update_renames_and_frees_old_name() {
        let (store, _tmp) = make_store();
        let group = store.create("old", "desc").unwrap();
        let updated = store.update(group.id, "new", "fresh desc").unwrap();
        assert_eq!(updated.name, "new");
        assert_eq!(updated.description, "fresh desc");

        assert!(store.find_by_name("old").unwrap().is_none());
        assert!(store.find_by_name("new").unwrap().is_some());
        // The old name is reusable.
        store.create("old", "").unwrap();
    }

    #[test]
    fn update_rejects_name_held_by_another_group() {
        let (store, _tmp) = make_store();
        store.create("first", "").unwrap();
        let second = store.create("second", "").unwrap();
        assert!(matches!(
            store.update(second.id, "first", ""),
            Err(StoreError::Conflict(_))
        ));
        // Renaming to its own current name is fine.
        store.update(second.id, "second", "tweaked").unwrap();
    }

    #[test]
    fn delete_removes_group_and_name() {
        let (store, _tmp) = make_store();
        let group = store.create("gone", "").unwrap();
        store.delete(group.id).unwrap();
        assert!(matches!(
            store.find_by_id(group.id),
            Err(StoreError::NotFound(_))
        ));
        assert!(store.find_by_name("gone").unwrap().is_none());
        assert!(matches!(
            store.delete(group.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn default_flag_survives_reopen() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let db = Arc::new(Database::create(tmp.path()).unwrap());
            let store = RedbGroupStore::open(db).unwrap();
            let group = store.create("default", "").unwrap();
            store.set_default(group.id).unwrap();
        }
        let db = Arc::new(Database::create(tmp.path()).unwrap());
        let store = RedbGroupStore::open(db).unwrap();
        assert_eq!(store.find_default().unwrap().unwrap().name, "default");
    }

    #[test]
    fn rule_and_group_stores_share_one_database() {
        let tmp = NamedTempFile::new().unwrap();
        let db = Arc::new(Database::create(tmp.path()).unwrap());
        let groups = RedbGroupStore::open(Arc::clone(&db)).unwrap();
        let rules = super::super::RedbRuleStore::open(db).unwrap();

        let group = groups.create("default", "").unwrap();
        use domain::rule::entity::Action;
        use ports::secondary::rule_store::RuleStore;
        let rule = rules.create("10.0.0.0/8", group.id, Action::Ban).unwrap();
        assert_eq!(rule.group_id, group.id);
    }
}
