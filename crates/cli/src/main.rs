use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing::{info, warn};

use sheetops_core::Registry;
use sheetops_engine::{DriftPoller, ReconcilerLoop, Settings, WatchSession};
use sheetops_kubehub::{ClusterClient, KubeClusterClient};
use sheetops_mirror::{MirrorClient, SheetsMirror};

mod config;
use config::{default_config_path, MirrorConfig};

#[derive(Parser, Debug)]
#[command(name = "sheetopsctl", version, about = "Mirror Deployments into a spreadsheet and scale from it")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store the mirror identifiers locally
    Configure {
        /// Sheets API developer key
        #[arg(long = "api-key")]
        api_key: String,
        /// OAuth client identifier
        #[arg(long = "client-id")]
        client_id: String,
        /// Target spreadsheet id
        #[arg(long = "spreadsheet-id")]
        spreadsheet_id: String,
    },
    /// Print the stored configuration
    ShowConfig,
    /// Run the watch/reconcile/drift loops until Ctrl-C
    Run,
}

fn init_tracing() {
    let env = std::env::var("SHEETOPS_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("SHEETOPS_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid SHEETOPS_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let config_path = default_config_path();

    match cli.command {
        Commands::Configure { api_key, client_id, spreadsheet_id } => {
            let cfg = MirrorConfig { api_key, client_id, spreadsheet_id };
            cfg.save(&config_path)?;
            match cli.output {
                Output::Human => println!("saved {}", config_path.display()),
                Output::Json => println!("{}", serde_json::to_string_pretty(&cfg)?),
            }
        }
        Commands::ShowConfig => {
            let cfg = MirrorConfig::load(&config_path)?;
            match cli.output {
                Output::Human => {
                    println!("api-key:        {}", mask(&cfg.api_key));
                    println!("client-id:      {}", cfg.client_id);
                    println!("spreadsheet-id: {}", cfg.spreadsheet_id);
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&cfg)?),
            }
        }
        Commands::Run => run(&config_path).await?,
    }

    Ok(())
}

async fn run(config_path: &std::path::Path) -> Result<()> {
    let cfg = MirrorConfig::load(config_path)
        .context("no usable config; run `sheetopsctl configure` first")?;
    let token = std::env::var("SHEETOPS_ACCESS_TOKEN")
        .map_err(|_| anyhow!("SHEETOPS_ACCESS_TOKEN is not set"))?;
    let settings = Settings::from_env();

    let cluster: Arc<dyn ClusterClient> = Arc::new(KubeClusterClient::connect().await?);
    let mirror: Arc<dyn MirrorClient> =
        Arc::new(SheetsMirror::new(cfg.spreadsheet_id.clone(), cfg.api_key.clone(), token));
    let registry = Arc::new(Registry::new());

    let mut session =
        WatchSession::new(Arc::clone(&cluster), Arc::clone(&registry), settings.reconnect_delay);
    session.seed().await.context("seeding registry")?;

    let reconciler = ReconcilerLoop::new(Arc::clone(&registry), Arc::clone(&mirror), &settings);
    let poller = DriftPoller::new(Arc::clone(&mirror), Arc::clone(&cluster), &settings);

    info!(spreadsheet = %cfg.spreadsheet_id, "starting engine tasks");
    let watch_task = tokio::spawn(session.run());
    let reconcile_task = tokio::spawn(reconciler.run());
    let drift_task = tokio::spawn(poller.run());

    signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    warn!("Ctrl-C received; shutting down");
    watch_task.abort();
    reconcile_task.abort();
    drift_task.abort();
    Ok(())
}

fn mask(secret: &str) -> String {
    if secret.len() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", &secret[..4])
    }
}
