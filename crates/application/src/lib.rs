#![forbid(unsafe_code)]

pub mod firewall_service_impl;
pub mod monitor_service_impl;
pub mod policy_service_impl;
