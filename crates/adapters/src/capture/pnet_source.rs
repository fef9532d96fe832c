//! Live packet capture over a pnet datalink channel.

use std::collections::HashSet;
use std::net::IpAddr;

use domain::common::error::DomainError;
use infrastructure::constants::CAPTURE_READ_TIMEOUT;
use pnet::datalink::{self, Channel, DataLinkReceiver, NetworkInterface};
use ports::secondary::packet_source::PacketSource;

/// Pick the capture device: the named one, or, when the name is empty,
/// the first non-loopback interface carrying at least one address.
fn pick_interface<'a>(
    interfaces: &'a [NetworkInterface],
    requested: &str,
) -> Option<&'a NetworkInterface> {
    if requested.is_empty() {
        interfaces
            .iter()
            .find(|iface| iface.name != "lo" && !iface.ips.is_empty())
    } else {
        interfaces.iter().find(|iface| iface.name == requested)
    }
}

/// All non-loopback addresses of the host, used to classify direction.
fn local_addresses(interfaces: &[NetworkInterface]) -> HashSet<IpAddr> {
    interfaces
        .iter()
        .flat_map(|iface| iface.ips.iter())
        .map(|net| net.ip())
        .filter(|ip| !ip.is_loopback())
        .collect()
}

/// Enumerate the host's non-loopback interface addresses.
pub fn discover_local_addresses() -> HashSet<IpAddr> {
    local_addresses(&datalink::interfaces())
}

/// Blocking packet source over a live capture handle.
pub struct PnetSource {
    rx: Box<dyn DataLinkReceiver>,
}

impl PnetSource {
    /// Open a live capture on the configured interface (empty = auto).
    /// Returns the source plus the resolved device name.
    pub fn open(interface: &str) -> Result<(Self, String), DomainError> {
        let interfaces = datalink::interfaces();
        let iface = pick_interface(&interfaces, interface).ok_or_else(|| {
            if interface.is_empty() {
                DomainError::BackendUnavailable(
                    "no usable non-loopback capture device found".to_string(),
                )
            } else {
                DomainError::BackendUnavailable(format!("capture device '{interface}' not found"))
            }
        })?;

        let config = datalink::Config {
            read_timeout: Some(CAPTURE_READ_TIMEOUT),
            ..datalink::Config::default()
        };
        match datalink::channel(iface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => {
                tracing::info!(device = %iface.name, "capture opened");
                Ok((Self { rx }, iface.name.clone()))
            }
            Ok(_) => Err(DomainError::BackendUnavailable(format!(
                "device '{}' does not speak ethernet framing",
                iface.name
            ))),
            Err(err) => Err(DomainError::BackendUnavailable(format!(
                "failed to open device '{}': {err}",
                iface.name
            ))),
        }
    }
}

impl PacketSource for PnetSource {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, DomainError> {
        match self.rx.next() {
            Ok(frame) => Ok(Some(frame.to_vec())),
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(err) => Err(DomainError::BackendUnavailable(format!(
                "capture read failed: {err}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::ipnetwork::IpNetwork;

    fn iface(name: &str, ips: &[&str]) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            description: String::new(),
            index: 0,
            mac: None,
            ips: ips.iter().map(|s| s.parse::<IpNetwork>().unwrap()).collect(),
            flags: 0,
        }
    }

    #[test]
    fn auto_select_skips_loopback_and_addressless_devices() {
        let interfaces = vec![
            iface("lo", &["127.0.0.1/8"]),
            iface("dummy0", &[]),
            iface("eth0", &["192.0.2.1/24"]),
        ];
        let picked = pick_interface(&interfaces, "").unwrap();
        assert_eq!(picked.name, "eth0");
    }

    #[test]
    fn explicit_name_wins_even_without_addresses() {
        let interfaces = vec![iface("eth0", &["192.0.2.1/24"]), iface("tun0", &[])];
        assert_eq!(pick_interface(&interfaces, "tun0").unwrap().name, "tun0");
        assert!(pick_interface(&interfaces, "wlan1").is_none());
    }

    #[test]
    fn no_usable_device_yields_none() {
        let interfaces = vec![iface("lo", &["127.0.0.1/8"])];
        assert!(pick_interface(&interfaces, "").is_none());
    }

    #[test]
    fn local_addresses_exclude_loopback() {
        let interfaces = vec![
            iface("lo", &["127.0.0.1/8", "::1/128"]),
            iface("eth0", &["192.0.2.1/24", "2001:db8::1/64"]),
        ];
        let locals = local_addresses(&interfaces);
        assert_eq!(locals.len(), 2);
        assert!(locals.contains(&"192.0.2.1".parse::<IpAddr>().unwrap()));
        assert!(locals.contains(&"2001:db8::1".parse::<IpAddr>().unwrap()));
        assert!(!locals.contains(&"127.0.0.1".parse::<IpAddr>().unwrap()));
    }
}
