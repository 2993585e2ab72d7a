use clap::{Parser, Subcommand};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod config;

use config::{Config, ConfigError, LoggingConfig, MetricsConfig};

/// Finds the comrades of a rating player.
#[derive(Parser)]
#[command(name = "comrades", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Logging verbosity level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the comrades HTTP API
    Serve,
    /// Compute the comrades of one player and print them as JSON
    Lookup { player_id: String },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid log level {level:?}: {source}")]
    LogLevel {
        level: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("statsd exporter: {0}")]
    Statsd(#[from] metrics_exporter_statsd::StatsdError),
    #[error("metrics recorder already installed")]
    RecorderInstalled,
    #[error("building runtime: {0}")]
    Runtime(std::io::Error),
    #[error(transparent)]
    Finder(#[from] finder::FinderError),
    #[error("encoding output: {0}")]
    Output(#[from] serde_json::Error),
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    let _sentry = init_logging(&cli.log_level, config.common.logging.as_ref())?;
    if let Some(metrics) = &config.common.metrics {
        init_statsd(metrics)?;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    match cli.command {
        CliCommand::Serve => {
            tracing::info!(
                host = %config.finder.listener.host,
                port = config.finder.listener.port,
                "starting comrades"
            );
            rt.block_on(finder::run(config.finder, shutdown_signal()))?;
        }
        CliCommand::Lookup { player_id } => {
            let comrades = rt.block_on(finder::lookup(config.finder, player_id))?;
            println!("{}", serde_json::to_string_pretty(&comrades)?);
        }
    }

    Ok(())
}

fn init_logging(
    level: &str,
    logging: Option<&LoggingConfig>,
) -> Result<Option<sentry::ClientInitGuard>, CliError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|source| CliError::LogLevel {
            level: level.to_string(),
            source,
        })?,
    };

    let guard = logging.map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(sentry_layer)
        .init();

    Ok(guard)
}

fn init_statsd(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some("comrades"))?;
    metrics::set_global_recorder(recorder).map_err(|_| CliError::RecorderInstalled)?;
    shared::metrics_defs::describe_all(finder::metrics_defs::ALL_METRICS);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received SIGINT"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                }
                return;
            }
            Err(e) => tracing::warn!(error = %e, "could not register SIGTERM handler"),
        }
    }

    if let Err(e) = ctrl_c.await {
        tracing::error!(error = %e, "could not listen for SIGINT");
        std::future::pending::<()>().await;
    }
    tracing::info!("received SIGINT");
}
