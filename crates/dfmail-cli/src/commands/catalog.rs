//! Service type catalogue and OpenAPI output

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use dfmail_email::ServiceType;

use crate::config::HostConfig;

/// List the email service types
#[derive(Args)]
pub struct TypesCommand {
    /// Print the full catalogue, config schemas included, as JSON
    #[arg(long)]
    pub json: bool,
}

impl TypesCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        if self.json {
            let infos: Vec<_> = ServiceType::ALL.iter().map(ServiceType::info).collect();
            println!("{}", serde_json::to_string_pretty(&infos)?);
            return Ok(());
        }

        for service_type in ServiceType::ALL {
            println!(
                "{:<18} {}",
                service_type.name().bright_cyan(),
                service_type.description()
            );
        }
        Ok(())
    }
}

/// Print the admin form schema of one service type
#[derive(Args)]
pub struct SchemaCommand {
    /// Service type, e.g. smtp_email or mailgun
    pub service_type: String,
}

impl SchemaCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let service_type: ServiceType = self.service_type.parse()?;
        println!(
            "{}",
            serde_json::to_string_pretty(&service_type.config_schema())?
        );
        Ok(())
    }
}

/// Print the OpenAPI document for the configured services
#[derive(Args)]
pub struct OpenApiCommand {
    /// Host configuration file (YAML)
    #[arg(long, short, env = "DFMAIL_CONFIG")]
    pub config: PathBuf,
}

impl OpenApiCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let config = HostConfig::load(&self.config)?;
        let doc = config.plugin_manager().get_unified_openapi();
        println!("{}", doc.to_pretty_json()?);
        Ok(())
    }
}
