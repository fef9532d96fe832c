pub mod firewall_backend;
pub mod group_store;
pub mod metrics_port;
pub mod packet_source;
pub mod rule_store;
