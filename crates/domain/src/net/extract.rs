//! Free-text address extraction for bulk import.

use std::sync::LazyLock;

use regex::Regex;

/// IPv4 address with an optional /0../32 suffix. Octets refuse leading
/// zeros; a suffix outside the prefix range is left unconsumed, so
/// `8.8.8.8/33` yields the bare `8.8.8.8`.
static IP_OR_CIDR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])(?:/(?:[0-9]|[12][0-9]|3[0-2]))?\b",
    )
    .expect("address extraction pattern must compile")
});

/// Pull every IPv4 address and CIDR out of free-form text. Separators are
/// irrelevant; anything the pattern does not cover is ignored.
pub fn extract_ip_nets(text: &str) -> Vec<String> {
    IP_OR_CIDR
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}
