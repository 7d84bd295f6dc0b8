//! LDAP Upstream Watcher - Main binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use upstream_core::{
    CancellationToken, Config, Error, GenericLdapValidator, ProviderRegistry, SettingsCache,
};
use upstream_modules::{upstreams_from_config, Ldap3Connector, UpstreamWatcher};

/// Validates LDAP and Active Directory upstreams and keeps the usable ones published
#[derive(Parser)]
#[command(name = "ldap-upstream-watcher")]
#[command(about = "Validation and caching engine for LDAP identity-provider upstreams")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "upstreams.toml")]
    config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Test configuration and exit
    #[arg(long)]
    test_config: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a sample configuration file
    Config {
        /// Output file path
        #[arg(short, long, default_value = "upstreams.toml")]
        output: PathBuf,
    },
    /// Run one sync pass and print the resulting statuses
    Validate,
    /// Keep re-validating upstreams until interrupted
    Watch,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let command = cli.command.unwrap_or(Commands::Watch);
    match &command {
        Commands::Config { output } => return generate_config(output),
        Commands::Version => {
            show_version();
            return Ok(());
        }
        Commands::Validate | Commands::Watch => {}
    }

    info!("Loading configuration from {:?}", cli.config);
    let config = Config::from_file(&cli.config)?;
    config.validate()?;

    if cli.test_config {
        info!("Configuration is valid");
        return Ok(());
    }

    let watcher = build_watcher(&config);
    let upstreams = upstreams_from_config(&config);
    let token = CancellationToken::new();

    match command {
        Commands::Validate => {
            match watcher.sync(&token, upstreams).await {
                Ok(report) => info!("All {} upstreams are usable", report.published),
                Err(Error::Requeue) => warn!("Some upstreams are not fully usable"),
                Err(e) => error!("Validation failed: {}", e),
            }
            let statuses: Vec<_> = watcher
                .statuses()
                .into_iter()
                .map(|(name, status)| serde_json::json!({ "name": name, "status": status }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
        _ => {
            let shutdown = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received interrupt, shutting down");
                    shutdown.cancel();
                }
            });

            info!(
                "Watching {} upstreams every {:?}",
                upstreams.len(),
                config.resync_interval()
            );
            watcher
                .run(token, upstreams, config.resync_interval())
                .await;
        }
    }

    Ok(())
}

fn build_watcher(config: &Config) -> UpstreamWatcher {
    let validator = GenericLdapValidator::new(
        Arc::new(config.secret_store()),
        Arc::new(SettingsCache::new()),
        Arc::new(Ldap3Connector::new()),
    )
    .with_probe_timeout(config.probe_timeout());
    UpstreamWatcher::new(Arc::new(validator), Arc::new(ProviderRegistry::new()))
}

/// Initialize logging
fn init_logging(level: &str) -> anyhow::Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    Ok(())
}

/// Generate sample configuration file
fn generate_config(output: &PathBuf) -> anyhow::Result<()> {
    let config = Config::sample();
    config.to_file(output)?;
    println!("Generated sample configuration file: {:?}", output);
    Ok(())
}

fn show_version() {
    println!("ldap-upstream-watcher {}", env!("CARGO_PKG_VERSION"));
}
