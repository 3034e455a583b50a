use std::path::PathBuf;

use clap::Args;
use tokio::net::TcpListener;
use tracing::{info, warn};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::HostConfig;

#[derive(Args)]
pub struct ServeCommand {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1:8080", env = "DFMAIL_ADDRESS")]
    pub address: String,

    /// Host configuration file (YAML)
    #[arg(long, short, env = "DFMAIL_CONFIG")]
    pub config: PathBuf,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let config = HostConfig::load(&self.config)?;
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run(config))
    }

    async fn run(self, config: HostConfig) -> anyhow::Result<()> {
        let mut manager = config.plugin_manager();
        manager.initialize_plugins().await?;

        let api_doc = manager.get_unified_openapi();
        let app = manager
            .build_application()
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api_doc));

        let listener = TcpListener::bind(&self.address).await?;
        info!(
            "DFMail listening on {} with service(s): {}",
            self.address,
            manager.plugin_names().join(", ")
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("DFMail server exited");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
    }
}
