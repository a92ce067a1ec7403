use anyhow::{bail, Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use sheets_relay::app::{AddRowUseCase, SpreadsheetPort};
use sheets_relay::config::Config;
use sheets_relay::infra::{GoogleSheetsAdapter, UnconfiguredSpreadsheet};
use sheets_relay::observability;
use sheets_relay::server::{self, AppState};

#[derive(Parser)]
#[command(name = "sheets_relay")]
#[command(about = "Validates row submissions and appends them to Google Sheets")]
#[command(version)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Run without Google credentials; only the test sheet accepts rows
    #[arg(long)]
    dry_run_only: bool,

    /// Directory for the rotated JSON log files
    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,
}

async fn create_spreadsheet(config: &Config, dry_run_only: bool) -> Result<Arc<dyn SpreadsheetPort>> {
    match (&config.credentials, dry_run_only) {
        (_, true) => {
            warn!("Dry-run only: appends to real sheets will fail");
            Ok(Arc::new(UnconfiguredSpreadsheet))
        }
        (Some(credentials), false) => {
            let adapter = GoogleSheetsAdapter::connect(credentials, config.sheets_timeout)
                .await
                .context("Failed to authorize Google service account")?;
            Ok(Arc::new(adapter))
        }
        (None, false) => bail!(
            "Google credentials are not configured; set GOOGLE_PRIVATE_KEY_BASE64 and GOOGLE_CLIENT_EMAIL or pass --dry-run-only"
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = observability::init_logging(&cli.log_dir);

    let config = Config::from_env().context("Invalid configuration")?;

    for (columns, sheets) in config.registry.shapes() {
        info!(columns, sheets, "Registered row shape");
    }

    let spreadsheet = create_spreadsheet(&config, cli.dry_run_only).await?;
    let add_row = AddRowUseCase::new(config.registry.clone(), config.test_sheet_id.clone(), spreadsheet);

    let mut state = AppState::new(add_row)
        .with_api_secret(config.api_secret.clone())
        .with_rate_limit(config.rate_limit_per_minute)
        .with_allowed_origins(config.allowed_origins.clone());

    match observability::metrics::init() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => warn!("Failed to initialize metrics: {}", e),
    }

    server::start_server(state, SocketAddr::new(cli.host, cli.port)).await
}
