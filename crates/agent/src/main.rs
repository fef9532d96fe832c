#![forbid(unsafe_code)]

mod cli;
mod shutdown;
mod startup;

use cli::{Command, ConfigCommand};
use infrastructure::config::AgentConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::parse();

    match cli.command {
        Some(Command::Version) => {
            println!("netwarden-agent {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }

        Some(Command::Config {
            command: ConfigCommand::Generate,
        }) => {
            print!("{}", AgentConfig::with_defaults().to_yaml()?);
            Ok(())
        }

        // No subcommand = run the agent daemon.
        None => startup::run(&cli).await,
    }
}
