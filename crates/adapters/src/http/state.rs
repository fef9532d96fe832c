use std::path::PathBuf;
use std::sync::Arc;

use application::policy_service_impl::PolicyService;
use infrastructure::metrics::AgentMetrics;

/// Shared state for the HTTP handlers.
///
/// Passed to Axum via `State(Arc<AppState>)`.
pub struct AppState {
    pub policy: Arc<PolicyService>,
    pub metrics: Arc<AgentMetrics>,
    /// Root of the bundled UI assets.
    pub assets_dir: PathBuf,
    /// Client used to fetch import sources.
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(policy: Arc<PolicyService>, metrics: Arc<AgentMetrics>, assets_dir: PathBuf) -> Self {
        Self {
            policy,
            metrics,
            assets_dir,
            http_client: reqwest::Client::new(),
        }
    }
}
