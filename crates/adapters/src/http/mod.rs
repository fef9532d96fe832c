pub mod assets;
pub mod fetch;
pub mod group_handler;
pub mod metrics_handler;
pub mod proto;
pub mod router;
pub mod rule_handler;
pub mod server;
pub mod state;
pub mod traffic_handler;

pub use router::build_router;
pub use server::run_http_server;
pub use state::AppState;
