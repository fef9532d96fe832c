use std::path::{Path, PathBuf};
use std::sync::Arc;

use adapters::capture::{PnetSource, discover_local_addresses};
use adapters::firewall::{IpsetBackend, IptablesBackend, NoopBackend};
use adapters::http::{AppState, run_http_server};
use adapters::storage::{RedbGroupStore, RedbRuleStore};
use application::firewall_service_impl::FirewallService;
use application::monitor_service_impl::MonitorService;
use application::policy_service_impl::PolicyService;
use domain::net::parse_ip_net_list;
use infrastructure::config::{
    AgentConfig, DatabaseDriver, FirewallKind, LogFormat, LogLevel,
};
use infrastructure::logging::init_logging;
use infrastructure::metrics::AgentMetrics;
use ports::secondary::firewall_backend::FirewallBackend;
use ports::secondary::group_store::GroupStore;
use ports::secondary::metrics_port::MetricsPort;
use ports::secondary::rule_store::RuleStore;
use tracing::{error, info};

use crate::cli::Cli;
use crate::shutdown::create_shutdown_token;

/// Merge flags and file into the effective config.
pub fn resolve_config(cli: &Cli) -> anyhow::Result<AgentConfig> {
    let mut config = cli.apply_to(AgentConfig::with_defaults());
    if let Some(ref path) = cli.config {
        let file = AgentConfig::load(Path::new(path))?;
        config.overlay(file);
        info!(path = %path, "config file overlaid");
    }
    config.validate()?;
    Ok(config)
}

fn build_backend(config: &AgentConfig) -> anyhow::Result<Box<dyn FirewallBackend>> {
    Ok(match config.firewall.firewall_kind()? {
        FirewallKind::Iptables => {
            info!(chain = %config.firewall.chain, "using the iptables backend");
            Box::new(IptablesBackend::new(&config.firewall.chain))
        }
        FirewallKind::Ipset => {
            info!(
                chain = %config.firewall.chain,
                base = %config.firewall.ipset,
                "using the ipset backend"
            );
            Box::new(IpsetBackend::new(
                &config.firewall.chain,
                &config.firewall.ipset,
            ))
        }
        FirewallKind::Mock => {
            info!("using the mock backend");
            Box::new(NoopBackend::new())
        }
    })
}

fn build_stores(
    config: &AgentConfig,
) -> anyhow::Result<(Arc<dyn RuleStore>, Arc<dyn GroupStore>)> {
    Ok(match config.database.driver_kind()? {
        DatabaseDriver::Redb => {
            let path = config.database.effective_path();
            info!(path, "opening rule catalog");
            let db = Arc::new(redb::Database::create(path)?);
            (
                Arc::new(RedbRuleStore::open(Arc::clone(&db))?) as Arc<dyn RuleStore>,
                Arc::new(RedbGroupStore::open(db)?) as Arc<dyn GroupStore>,
            )
        }
        DatabaseDriver::Memory => {
            info!("using the in-memory rule catalog");
            (
                Arc::new(ports::memory::MemoryRuleStore::new()) as Arc<dyn RuleStore>,
                Arc::new(ports::memory::MemoryGroupStore::new()) as Arc<dyn GroupStore>,
            )
        }
    })
}

/// Run the agent: wire everything, serve until a termination signal,
/// then tear the kernel state down exactly once.
pub async fn run(cli: &Cli) -> anyhow::Result<()> {
    // ── 1. Config and logging ───────────────────────────────────────
    let config = resolve_config(cli)?;
    let log_level = config.log.level.unwrap_or(LogLevel::Info);
    let log_format = config.log.format.unwrap_or(LogFormat::Text);
    init_logging(log_level, log_format);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = log_level.as_str(),
        log_format = log_format.as_str(),
        "netwarden agent starting"
    );

    // ── 2. Stores, firewall, monitor ────────────────────────────────
    let metrics = Arc::new(AgentMetrics::new());
    let (rules, groups) = build_stores(&config)?;
    let backend = build_backend(&config)?;
    let firewall = Arc::new(FirewallService::new(
        backend,
        Arc::clone(&metrics) as Arc<dyn MetricsPort>,
    ));

    let exclude = parse_ip_net_list(&config.monitor.exclude_subnets)?;
    let locals = discover_local_addresses();
    if locals.is_empty() {
        anyhow::bail!("no non-loopback local addresses found; cannot classify traffic");
    }
    let monitor = Arc::new(MonitorService::new(
        config.monitor.effective_window(),
        config.monitor.effective_timeout(),
        locals,
        exclude,
        Arc::clone(&metrics) as Arc<dyn MetricsPort>,
    ));

    let policy = Arc::new(PolicyService::new(
        rules,
        groups,
        Arc::clone(&firewall),
        Arc::clone(&monitor),
        Arc::clone(&metrics) as Arc<dyn MetricsPort>,
    ));

    // ── 3. Replay the catalog into the kernel ───────────────────────
    policy.init()?;

    // ── 4. Capture and eviction ─────────────────────────────────────
    let shutdown = create_shutdown_token();
    let (source, device) = PnetSource::open(&config.monitor.interface)?;
    info!(device = %device, "traffic monitor started");
    let capture_handle = Arc::clone(&monitor).spawn_capture(Box::new(source), shutdown.clone());
    Arc::clone(&monitor).spawn_evictor(shutdown.clone());

    // ── 5. Serve until the signal arrives ───────────────────────────
    let state = Arc::new(AppState::new(
        policy,
        Arc::clone(&metrics),
        PathBuf::from(&config.web.assets),
    ));
    let served =
        run_http_server(state, &config.web.listen, shutdown.clone().cancelled_owned()).await;

    // ── 6. Ordered teardown ─────────────────────────────────────────
    // The server only returns once the token fired (or it failed); make
    // sure the capture thread sees the cancellation either way.
    shutdown.cancel();
    if capture_handle.join().is_err() {
        error!("capture thread panicked during shutdown");
    }

    // Guaranteed release path: never leak kernel rules silently, but
    // exit regardless of the outcome.
    if let Err(err) = firewall.cleanup() {
        error!(error = %err, "firewall cleanup failed during shutdown");
    }
    served?;
    info!("netwarden agent stopped");
    Ok(())
}
