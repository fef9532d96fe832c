pub(crate) mod exec;
pub mod ipset;
pub mod iptables;
pub mod noop;

pub use ipset::IpsetBackend;
pub use iptables::IptablesBackend;
pub use noop::NoopBackend;
