//! In-memory store implementations, used for ephemeral (non-persistent)
//! runs and as lightweight doubles in tests. Semantics mirror the redb
//! adapters, uniqueness constraints included.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;
use domain::rule::entity::{Action, GroupId, IpNetGroup, IpNetRule, RuleId};
use domain::rule::error::StoreError;

use crate::secondary::group_store::GroupStore;
use crate::secondary::rule_store::RuleStore;

#[derive(Default)]
struct RuleStoreInner {
    rules: BTreeMap<u64, IpNetRule>,
    next_id: u64,
}

/// In-memory rule catalog.
#[derive(Default)]
pub struct MemoryRuleStore {
    inner: Mutex<RuleStoreInner>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RuleStore for MemoryRuleStore {
    fn create(
        &self,
        ip_net: &str,
        group_id: GroupId,
        action: Action,
    ) -> Result<IpNetRule, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.rules.values().any(|r| r.ip_net == ip_net) {
            return Err(StoreError::Conflict(format!(
                "ip_net '{ip_net}' already exists"
            )));
        }
        inner.next_id += 1;
        let now = Utc::now();
        let rule = IpNetRule {
            id: RuleId(inner.next_id),
            ip_net: ip_net.to_string(),
            group_id,
            action,
            created_at: now,
            updated_at: now,
        };
        inner.rules.insert(rule.id.0, rule.clone());
        Ok(rule)
    }

    fn batch_create(
        &self,
        ip_nets: &[String],
        group_id: GroupId,
        action: Action,
    ) -> Result<Vec<IpNetRule>, StoreError> {
        {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            for net in ip_nets {
                if inner.rules.values().any(|r| &r.ip_net == net) {
                    return Err(StoreError::Conflict(format!(
                        "ip_net '{net}' already exists"
                    )));
                }
            }
        }
        ip_nets
            .iter()
            .map(|net| self.create(net, group_id, action))
            .collect()
    }

    fn find_by_id(&self, id: RuleId) -> Result<IpNetRule, StoreError> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rules
            .get(&id.0)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("rule {id}")))
    }

    fn find_by_ip_net(&self, ip_net: &str) -> Result<Option<IpNetRule>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rules
            .values()
            .find(|r| r.ip_net == ip_net)
            .cloned())
    }

    fn find_by_ip_nets(&self, ip_nets: &[String]) -> Result<Vec<IpNetRule>, StoreError> {
        let wanted: HashSet<&str> = ip_nets.iter().map(String::as_str).collect();
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rules
            .values()
            .filter(|r| wanted.contains(r.ip_net.as_str()))
            .cloned()
            .collect())
    }

    fn find_by_group(&self, group_id: GroupId) -> Result<Vec<IpNetRule>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rules
            .values()
            .filter(|r| r.group_id == group_id)
            .cloned()
            .collect())
    }

    fn find_by_action(&self, action: Action) -> Result<Vec<IpNetRule>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rules
            .values()
            .filter(|r| r.action == action)
            .cloned()
            .collect())
    }

    fn find_all(&self) -> Result<Vec<IpNetRule>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rules
            .values()
            .cloned()
            .collect())
    }

    fn exists_by_ip_net(&self, ip_net: &str) -> Result<bool, StoreError> {
        Ok(self.find_by_ip_net(ip_net)?.is_some())
    }

    fn update_action(&self, id: RuleId, action: Action) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let rule = inner
            .rules
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::NotFound(format!("rule {id}")))?;
        rule.action = action;
        rule.updated_at = Utc::now();
        Ok(())
    }

    fn update_group(&self, id: RuleId, group_id: GroupId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let rule = inner
            .rules
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::NotFound(format!("rule {id}")))?;
        rule.group_id = group_id;
        rule.updated_at = Utc::now();
        Ok(())
    }

    fn update_group_bulk(&self, from: GroupId, to: GroupId) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        let mut moved = 0;
        for rule in inner.rules.values_mut().filter(|r| r.group_id == from) {
            rule.group_id = to;
            rule.updated_at = now;
            moved += 1;
        }
        Ok(moved)
    }

    fn delete(&self, id: RuleId) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rules
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("rule {id}")))
    }
}

#[derive(Default)]
struct GroupStoreInner {
    groups: BTreeMap<u64, IpNetGroup>,
    next_id: u64,
}

/// In-memory group catalog.
#[derive(Default)]
pub struct MemoryGroupStore {
    inner: Mutex<GroupStoreInner>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GroupStore for MemoryGroupStore {
    fn create(&self, name: &str, description: &str) -> Result<IpNetGroup, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.groups.values().any(|g| g.name == name) {
            return Err(StoreError::Conflict(format!(
                "group '{name}' already exists"
            )));
        }
        inner.next_id += 1;
        let now = Utc::now();
        let group = IpNetGroup {
            id: GroupId(inner.next_id),
            name: name.to_string(),
            description: description.to_string(),
            is_default: false,
            created_at: now,
            updated_at: now,
        };
        inner.groups.insert(group.id.0, group.clone());
        Ok(group)
    }

    fn find_by_id(&self, id: GroupId) -> Result<IpNetGroup, StoreError> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .groups
            .get(&id.0)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("group {id}")))
    }

    fn find_by_name(&self, name: &str) -> Result<Option<IpNetGroup>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .groups
            .values()
            .find(|g| g.name == name)
            .cloned())
    }

    fn find_default(&self) -> Result<Option<IpNetGroup>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .groups
            .values()
            .find(|g| g.is_default)
            .cloned())
    }

    fn find_all(&self) -> Result<Vec<IpNetGroup>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .groups
            .values()
            .cloned()
            .collect())
    }

    fn update(
        &self,
        id: GroupId,
        name: &str,
        description: &str,
    ) -> Result<IpNetGroup, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.groups.values().any(|g| g.name == name && g.id != id) {
            return Err(StoreError::Conflict(format!(
                "group '{name}' already exists"
            )));
        }
        let group = inner
            .groups
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::NotFound(format!("group {id}")))?;
        group.name = name.to_string();
        group.description = description.to_string();
        group.updated_at = Utc::now();
        Ok(group.clone())
    }

    fn delete(&self, id: GroupId) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .groups
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("group {id}")))
    }

    fn set_default(&self, id: GroupId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !inner.groups.contains_key(&id.0) {
            return Err(StoreError::NotFound(format!("group {id}")));
        }
        for group in inner.groups.values_mut() {
            group.is_default = group.id == id;
        }
        Ok(())
    }
}
