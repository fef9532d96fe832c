use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::error::DomainError;
use crate::net::parse_ip_net;

// ── Actions ─────────────────────────────────────────────────────────

/// Policy verdict attached to a rule.
///
/// `Allow` takes precedence over `Ban` wherever both could match, both in
/// the kernel chain and in the snapshot composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Ban,
    Allow,
}

impl Action {
    /// Every supported action, in the order the API enumerates them.
    pub const ALL: [Action; 2] = [Action::Ban, Action::Allow];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Ban => "ban",
            Action::Allow => "allow",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s.to_ascii_lowercase().as_str() {
            "ban" => Ok(Action::Ban),
            "allow" => Ok(Action::Allow),
            _ => Err(DomainError::InvalidInput(format!(
                "unknown action '{s}': expected ban|allow"
            ))),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Identifiers ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ── Catalog entities ────────────────────────────────────────────────

/// One persisted policy rule: a network expression bound to a group and an
/// action. The expression is unique across the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpNetRule {
    pub id: RuleId,
    /// A bare IPv4/IPv6 address or a `prefix/length` CIDR, as entered.
    pub ip_net: String,
    pub group_id: GroupId,
    pub action: Action,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IpNetRule {
    /// Check the catalog invariant: the expression parses as an address or
    /// CIDR and the action is one of the known tags (by construction).
    pub fn validate(&self) -> Result<(), DomainError> {
        parse_ip_net(&self.ip_net)?;
        Ok(())
    }
}

/// A named collection of rules. Exactly one group carries the default flag
/// at any moment; orphaned rules are reassigned to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpNetGroup {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parse_roundtrip() {
        assert_eq!(Action::parse("ban").unwrap(), Action::Ban);
        assert_eq!(Action::parse("allow").unwrap(), Action::Allow);
        assert_eq!(Action::parse("BAN").unwrap(), Action::Ban);
        for action in Action::ALL {
            assert_eq!(Action::parse(action.as_str()).unwrap(), action);
        }
    }

    #[test]
    fn action_parse_rejects_unknown() {
        assert!(Action::parse("drop").is_err());
        assert!(Action::parse("").is_err());
    }

    #[test]
    fn action_serde_uses_lowercase() {
        assert_eq!(serde_json::to_string(&Action::Ban).unwrap(), "\"ban\"");
        assert_eq!(
            serde_json::from_str::<Action>("\"allow\"").unwrap(),
            Action::Allow
        );
    }

    fn make_rule(ip_net: &str) -> IpNetRule {
        IpNetRule {
            id: RuleId(1),
            ip_net: ip_net.to_string(),
            group_id: GroupId(1),
            action: Action::Ban,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rule_validate_accepts_address_and_cidr() {
        assert!(make_rule("203.0.113.5").validate().is_ok());
        assert!(make_rule("10.0.0.0/8").validate().is_ok());
        assert!(make_rule("2001:db8::1").validate().is_ok());
        assert!(make_rule("2001:db8::/32").validate().is_ok());
    }

    #[test]
    fn rule_validate_rejects_garbage() {
        assert!(make_rule("").validate().is_err());
        assert!(make_rule("not-a-net").validate().is_err());
        assert!(make_rule("10.0.0.0/33").validate().is_err());
    }
}
