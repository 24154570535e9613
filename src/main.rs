#![warn(clippy::all, clippy::pedantic)]

//! CLI harness: runs one bootstrap pass against a real configuration
//! endpoint and prints the outcome. Platform collaborators (attribution SDK,
//! permission dialogs, network probing) are stubbed for a terminal run.

use anyhow::{Context, Result};
use clap::Parser;
use coldstart::attribution::{AttributionPayload, AttributionStore};
use coldstart::connectivity::ConnectivityMonitor;
use coldstart::device::DeviceProfile;
use coldstart::orchestrator::Orchestrator;
use coldstart::permission::{PermissionAuthority, PermissionGate, PermissionStatus};
use coldstart::resolver::ConfigResolver;
use coldstart::store::{SqliteStateStore, StateStore};
use directories::ProjectDirs;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "coldstart", about = "Run the session bootstrap decision once")]
struct Cli {
    /// Configuration endpoint URL.
    #[arg(long)]
    endpoint: String,

    /// State database path (defaults to the platform data dir).
    #[arg(long)]
    state_db: Option<PathBuf>,

    /// Bundle identifier sent to the endpoint.
    #[arg(long, default_value = "com.harvestledger.app")]
    bundle_id: String,

    /// App store identifier sent to the endpoint.
    #[arg(long, default_value = "id0000000000")]
    store_id: String,

    /// Firebase project identifier sent to the endpoint.
    #[arg(long, default_value = "")]
    firebase_project_id: String,

    /// Locale sent to the endpoint.
    #[arg(long, default_value = "en_US")]
    locale: String,

    /// Mark this run's conversion as organic.
    #[arg(long)]
    organic: bool,
}

/// Terminal runs have no notification dialogs; report granted so the gate
/// never prompts.
struct GrantedAuthority;

impl PermissionAuthority for GrantedAuthority {
    fn status(&self) -> Pin<Box<dyn Future<Output = Result<PermissionStatus>> + Send + '_>> {
        Box::pin(async { Ok(PermissionStatus::Granted) })
    }

    fn request(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(async { Ok(true) })
    }
}

fn state_db_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(path) = &cli.state_db {
        return Ok(path.clone());
    }
    let dirs = ProjectDirs::from("", "", "coldstart").context("no home directory for state db")?;
    std::fs::create_dir_all(dirs.data_dir())
        .with_context(|| format!("create data dir {}", dirs.data_dir().display()))?;
    Ok(dirs.data_dir().join("state.db"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    let state_path = state_db_path(&cli)?;

    let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::open(&state_path).await?);
    let connectivity = ConnectivityMonitor::new(true);
    let attribution = Arc::new(AttributionStore::new(store.clone()));
    let gate = Arc::new(PermissionGate::new(store.clone(), Arc::new(GrantedAuthority)));
    let device = DeviceProfile::new(
        &cli.bundle_id,
        &cli.store_id,
        &cli.firebase_project_id,
        &cli.locale,
    );
    let resolver = Arc::new(ConfigResolver::new(
        store,
        attribution.clone(),
        device,
        &cli.endpoint,
    ));
    let orchestrator = Orchestrator::new(&connectivity, attribution.clone(), gate, resolver);

    // Stand in for the attribution SDK: report one conversion for this run.
    let mut fields = BTreeMap::new();
    fields.insert(
        "af_status".to_string(),
        serde_json::json!(if cli.organic { "Organic" } else { "Non-organic" }),
    );
    attribution
        .record_conversion(&AttributionPayload::new(fields))
        .await?;

    let outcome = orchestrator.run().await;
    println!("{outcome:?}");
    Ok(())
}
