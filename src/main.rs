//! Serpent storefront operations.
//!
//! One binary for the purchase webhook, the upload intake, and the two
//! maintenance commands that talk to the payment provider and the key-value
//! store.

use std::{
    io::{BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serpent_api::{upload_router, webhook_router, Config, UploadState, WebhookState};
use serpent_core::RealClock;
use serpent_sync::{sync_catalog, CatalogClient, KvClient};
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about = "Serpent storefront services and maintenance tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the purchase webhook service
    Webhook,
    /// Run the file upload service
    Upload,
    /// Run both services in one process
    Serve,
    /// Regenerate the storefront catalog from the payment provider
    SyncCatalog {
        /// Output file; defaults to CATALOG_PATH
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Delete every key in the configured key-value namespace
    ClearKv {
        /// Skip the interactive confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { command } = Cli::parse();

    let config = Config::load()?;
    init_tracing(&config.rust_log)?;

    info!(
        ledger_path = %config.ledger_path.display(),
        upload_dir = %config.upload_dir.display(),
        webhook_secret = %config.masked_secret(),
        "Configuration loaded"
    );

    match command {
        Commands::Webhook => run_webhook(&config).await,
        Commands::Upload => run_upload(&config).await,
        Commands::Serve => {
            tokio::try_join!(run_webhook(&config), run_upload(&config))?;
            Ok(())
        },
        Commands::SyncCatalog { output } => run_sync_catalog(&config, output).await,
        Commands::ClearKv { yes } => run_clear_kv(&config, yes).await,
    }
}

/// Initializes tracing from the configured filter directive.
fn init_tracing(directive: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(directive)
        .with_context(|| format!("Invalid log filter '{directive}'"))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}

async fn run_webhook(config: &Config) -> Result<()> {
    let addr = config.webhook_addr()?;
    let state = WebhookState::from_config(config, Arc::new(RealClock::new()))?;
    let app = webhook_router(state, config.request_timeout());

    info!(%addr, path = "/webhook/stripe", "Webhook service is ready to receive events");
    serpent_api::start_server(app, addr, "webhook").await.context("Webhook server failed")
}

async fn run_upload(config: &Config) -> Result<()> {
    let addr = config.upload_addr()?;
    let state = UploadState::from_config(config, Arc::new(RealClock::new()));
    let app = upload_router(state, config.request_timeout());

    info!(%addr, "Upload service is ready");
    serpent_api::start_server(app, addr, "upload").await.context("Upload server failed")
}

async fn run_sync_catalog(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| config.catalog_path.clone());
    let client = CatalogClient::new(config.provider_config()?)?;

    let items = sync_catalog(&client, &output).await?;

    info!(count = items.len(), path = %output.display(), "Catalog written");
    for item in &items {
        info!(id = %item.id, name = %item.name, price = item.price, status = %item.status, "Synced");
    }
    Ok(())
}

async fn run_clear_kv(config: &Config, yes: bool) -> Result<()> {
    let client = KvClient::new(config.kv_config()?)?;

    if !yes {
        let preview = client.clear_namespace(false).await?;
        if preview.found == 0 {
            info!("Namespace is already empty");
            return Ok(());
        }
        let prompt = format!("Delete all {} keys? Type 'yes' to confirm: ", preview.found);
        if !confirm(prompt).await? {
            warn!("Cancelled; nothing was deleted");
            return Ok(());
        }
    }

    let report = client.clear_namespace(true).await?;
    for (key, error) in &report.failed {
        warn!(%key, %error, "Key could not be deleted");
    }
    info!(
        found = report.found,
        deleted = report.deleted,
        failed = report.failed.len(),
        remaining = ?report.remaining,
        "Namespace cleared"
    );

    if report.failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} keys could not be deleted", report.failed.len())
    }
}

/// Asks on stdin and returns whether the answer was `yes`.
async fn confirm(prompt: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || -> Result<bool> {
        let mut stdout = std::io::stdout();
        stdout.write_all(prompt.as_bytes())?;
        stdout.flush()?;

        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer).context("Failed to read confirmation")?;
        Ok(answer.trim().eq_ignore_ascii_case("yes"))
    })
    .await
    .context("Confirmation prompt panicked")?
}
