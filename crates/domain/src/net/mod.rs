//! Network-expression helpers shared by the policy service, the monitor
//! and the firewall adapters.
//!
//! A network expression is a bare IPv4/IPv6 address or a `prefix/length`
//! CIDR; a bare address is equivalent to a host-length prefix.

pub mod extract;

use std::net::IpAddr;

use ipnetwork::IpNetwork;

use crate::common::error::DomainError;

/// Parse a network expression. Bare addresses come back with a host-length
/// prefix (/32 for IPv4, /128 for IPv6).
pub fn parse_ip_net(s: &str) -> Result<IpNetwork, DomainError> {
    s.parse::<IpNetwork>()
        .map_err(|e| DomainError::InvalidInput(format!("invalid address or CIDR '{s}': {e}")))
}

/// Canonical `address/prefix` form of an expression, host prefix included.
/// `"10.0.0.1"` becomes `"10.0.0.1/32"`.
pub fn canonical(s: &str) -> Result<String, DomainError> {
    Ok(parse_ip_net(s)?.to_string())
}

/// Parse a comma-separated CIDR list (e.g. the exclude-subnets option).
/// Empty entries are skipped; any malformed entry fails the whole list.
pub fn parse_ip_net_list(csv: &str) -> Result<Vec<IpNetwork>, DomainError> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_ip_net)
        .collect()
}

/// True if any of the networks contains the address.
pub fn any_contains(nets: &[IpNetwork], ip: IpAddr) -> bool {
    nets.iter().any(|net| net.contains(ip))
}

/// Policy decision for one observed peer, mirroring the kernel chain's
/// precedence: an allow match wins over any ban match.
pub fn is_banned(ban: &[IpNetwork], allow: &[IpNetwork], ip: IpAddr) -> bool {
    if any_contains(allow, ip) {
        return false;
    }
    any_contains(ban, ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nets(exprs: &[&str]) -> Vec<IpNetwork> {
        exprs.iter().map(|e| parse_ip_net(e).unwrap()).collect()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn parse_bare_address_gets_host_prefix() {
        assert_eq!(parse_ip_net("10.0.0.1").unwrap().prefix(), 32);
        assert_eq!(parse_ip_net("2001:db8::1").unwrap().prefix(), 128);
    }

    #[test]
    fn parse_rejects_out_of_range_prefix() {
        assert!(parse_ip_net("8.8.8.8/33").is_err());
        assert!(parse_ip_net("2001:db8::/129").is_err());
    }

    #[test]
    fn canonical_appends_host_prefix() {
        assert_eq!(canonical("10.0.0.1").unwrap(), "10.0.0.1/32");
        assert_eq!(canonical("10.1.0.0/16").unwrap(), "10.1.0.0/16");
        assert_eq!(canonical("2001:db8::1").unwrap(), "2001:db8::1/128");
    }

    #[test]
    fn parse_list_skips_blanks() {
        let list = parse_ip_net_list(" 127.0.0.0/8 , ,192.168.0.0/16,").unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn parse_list_fails_on_bad_entry() {
        assert!(parse_ip_net_list("127.0.0.0/8,bogus").is_err());
    }

    #[test]
    fn containment() {
        let set = nets(&["10.0.0.0/8", "203.0.113.5"]);
        assert!(any_contains(&set, ip("10.1.2.3")));
        assert!(any_contains(&set, ip("203.0.113.5")));
        assert!(!any_contains(&set, ip("203.0.113.6")));
    }

    #[test]
    fn allow_wins_over_ban() {
        let ban = nets(&["10.0.0.0/8"]);
        let allow = nets(&["10.1.0.0/16"]);
        assert!(!is_banned(&ban, &allow, ip("10.1.2.3")));
        assert!(is_banned(&ban, &allow, ip("10.2.2.3")));
        assert!(!is_banned(&ban, &allow, ip("192.0.2.1")));
    }

    #[test]
    fn banned_when_only_ban_matches() {
        let ban = nets(&["198.51.100.0/24"]);
        assert!(is_banned(&ban, &[], ip("198.51.100.7")));
        assert!(!is_banned(&ban, &[], ip("198.51.101.7")));
    }
}
