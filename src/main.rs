//! Binary entry point.
//!
//! Loads `.env` and the optional deployment config, initialises logging on
//! stderr, then runs the pipeline once. Exit code 0 on success, 1 on any
//! fatal error.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::info;

use venmo_sweep::config::{self, AppConfig, Credentials};
use venmo_sweep::engine::notifier::{Notifier, WebhookNotifier};
use venmo_sweep::engine::orchestrator::{self, RunOptions};
use venmo_sweep::venmo::VenmoClient;

#[derive(Debug, Parser)]
#[command(name = "venmo-sweep", version, about)]
struct Cli {
    /// Transfer balance to bank account if nonzero
    #[arg(short, long)]
    transfer: bool,

    /// Log the access token fingerprint and per-request detail
    #[arg(short, long)]
    verbose: bool,

    /// Deployment config file (endpoint paths and response-shape variant)
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging(cli.verbose);

    ExitCode::from(orchestrator::exit_code(&run(&cli).await))
}

async fn run(cli: &Cli) -> Result<()> {
    let cfg = AppConfig::load_or_default(&cli.config)?;
    let credentials = Credentials::from_env()?;
    let notifier = config::webhook_url_from_env()
        .map(|url| WebhookNotifier::new(&url))
        .transpose()?;
    if let Some(n) = &notifier {
        info!(host = n.host(), "Webhook configured");
    }

    let mut client = VenmoClient::new(&cfg)?;
    let options = RunOptions {
        transfer: cli.transfer,
        verbose: cli.verbose,
    };
    let report = orchestrator::run(
        &mut client,
        &credentials,
        options,
        notifier.as_ref().map(|n| n as &dyn Notifier),
    )
    .await
    .context("Run failed")?;

    match &report.transfer {
        Some(t) => info!(
            transferred = %t.amount,
            new_balance = %t.new_balance,
            "Done"
        ),
        None => info!(balance = %report.balance, "Done"),
    }
    Ok(())
}

/// Initialise the `tracing` subscriber on stderr.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "venmo_sweep=debug"
    } else {
        "venmo_sweep=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let json_logging = std::env::var("VENMO_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
