use std::path::PathBuf;

use clap::Args;
use colored::Colorize;

use crate::config::HostConfig;

/// Build every configured service without serving, reporting the first
/// configuration error.
#[derive(Args)]
pub struct CheckCommand {
    /// Host configuration file (YAML)
    #[arg(long, short, env = "DFMAIL_CONFIG")]
    pub config: PathBuf,
}

impl CheckCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let config = HostConfig::load(&self.config)?;
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let mut manager = config.plugin_manager();
            manager.initialize_plugins().await?;

            for service in &config.services {
                println!(
                    "{} {} ({})",
                    "✓".bright_green(),
                    service.name.bold(),
                    service.service_type
                );
            }
            Ok(())
        })
    }
}
