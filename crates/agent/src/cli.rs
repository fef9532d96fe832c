use clap::{Parser, Subcommand};
use infrastructure::config::{AgentConfig, LogFormat, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "netwarden-agent",
    about = "Host traffic observer and firewall policy agent",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to the YAML configuration file. File values override flags.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Capture device (empty = first usable non-loopback interface)
    #[arg(short = 'i', long)]
    pub monitor_interface: Option<String>,

    /// Comma-separated CIDRs hidden from the stats view
    #[arg(short = 'e', long)]
    pub monitor_exclude_subnets: Option<String>,

    /// Sliding-window horizon in seconds
    #[arg(short = 'w', long)]
    pub monitor_window: Option<u64>,

    /// Peer idle eviction horizon in seconds
    #[arg(short = 't', long)]
    pub monitor_timeout: Option<u64>,

    /// Firewall backend: iptables, ipset or mock
    #[arg(long)]
    pub firewall_type: Option<String>,

    /// Managed chain name
    #[arg(short = 'n', long)]
    pub firewall_chain: Option<String>,

    /// Set base name for the ipset backend
    #[arg(long)]
    pub firewall_ipset: Option<String>,

    /// HTTP listen address (host:port)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Storage driver: redb or memory
    #[arg(long)]
    pub db_driver: Option<String>,

    /// Database host (server-style engines; unused by redb)
    #[arg(long)]
    pub db_host: Option<String>,

    /// Database port (server-style engines; unused by redb)
    #[arg(long)]
    pub db_port: Option<u64>,

    /// Database username (server-style engines; unused by redb)
    #[arg(long)]
    pub db_username: Option<String>,

    /// Database password (server-style engines; unused by redb)
    #[arg(long)]
    pub db_password: Option<String>,

    /// Database file path
    #[arg(long)]
    pub db_name: Option<String>,

    /// Database path override (wins over --db-name)
    #[arg(long)]
    pub db_dsn: Option<String>,

    /// Log level
    #[arg(long)]
    pub log_level: Option<LogLevel>,

    /// Log format: json (production) or text (development)
    #[arg(long)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Display version information
    Version,

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the default configuration as YAML
    Generate,
}

impl Cli {
    /// Fold the flags into a config. The result is the overlay base;
    /// file values are applied on top of it by startup.
    pub fn apply_to(&self, mut config: AgentConfig) -> AgentConfig {
        if let Some(ref v) = self.monitor_interface {
            config.monitor.interface = v.clone();
        }
        if let Some(ref v) = self.monitor_exclude_subnets {
            config.monitor.exclude_subnets = v.clone();
        }
        if let Some(v) = self.monitor_window {
            config.monitor.window = v;
        }
        if let Some(v) = self.monitor_timeout {
            config.monitor.timeout = v;
        }
        if let Some(ref v) = self.firewall_type {
            config.firewall.kind = v.clone();
        }
        if let Some(ref v) = self.firewall_chain {
            config.firewall.chain = v.clone();
        }
        if let Some(ref v) = self.firewall_ipset {
            config.firewall.ipset = v.clone();
        }
        if let Some(ref v) = self.listen {
            config.web.listen = v.clone();
        }
        if let Some(ref v) = self.db_driver {
            config.database.driver = v.clone();
        }
        if let Some(ref v) = self.db_host {
            config.database.host = v.clone();
        }
        if let Some(v) = self.db_port {
            config.database.port = v;
        }
        if let Some(ref v) = self.db_username {
            config.database.username = v.clone();
        }
        if let Some(ref v) = self.db_password {
            config.database.password = v.clone();
        }
        if let Some(ref v) = self.db_name {
            config.database.database = v.clone();
        }
        if let Some(ref v) = self.db_dsn {
            config.database.dsn = v.clone();
        }
        if self.log_level.is_some() {
            config.log.level = self.log_level;
        }
        if self.log_format.is_some() {
            config.log.format = self.log_format;
        }
        config
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
