//! DFMail CLI - serves configured email services over HTTP

mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::{CheckCommand, OpenApiCommand, SchemaCommand, ServeCommand, TypesCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DFMAIL_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "DFMAIL_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve(ServeCommand),
    /// Validate a configuration file by building every service
    Check(CheckCommand),
    /// List the available email service types
    Types(TypesCommand),
    /// Print the configuration schema of a service type
    Schema(SchemaCommand),
    /// Print the OpenAPI document for a configuration file
    Openapi(OpenApiCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes full control when set
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::try_new(format!(
            "dfmail={level},\
             dfmail_cli={level},\
             dfmail_core={level},\
             dfmail_email={level},\
             tower_http={level},\
             h2=warn,\
             hyper=warn,\
             reqwest=warn,\
             rustls=warn,\
             lettre=warn",
            level = cli.log_level
        ))?
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve(cmd) => cmd.execute(),
        Commands::Check(cmd) => cmd.execute(),
        Commands::Types(cmd) => cmd.execute(),
        Commands::Schema(cmd) => cmd.execute(),
        Commands::Openapi(cmd) => cmd.execute(),
    }
}
