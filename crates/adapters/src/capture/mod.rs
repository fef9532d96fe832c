pub mod pnet_source;

pub use pnet_source::{PnetSource, discover_local_addresses};
