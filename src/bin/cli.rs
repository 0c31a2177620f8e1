//! Attendance Bridge CLI
//!
//! Runs a sync from the access-control database into the workforce service
//! and manages the XML settings file.

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attendance_bridge::config::DEFAULT_SOURCE_KEY;
use attendance_bridge::remote::MemoryService;
#[cfg(feature = "rpc")]
use attendance_bridge::remote::RpcService;
use attendance_bridge::store::SqliteStore;
use attendance_bridge::{BridgeError, BridgeSettings, Credentials, SyncConfig, SyncRun, SyncStep};

#[derive(Parser)]
#[command(name = "attendance-bridge")]
#[command(about = "Sync an access-control database into a workforce management service")]
#[command(version)]
struct Cli {
    /// Settings file
    #[arg(
        long,
        env = "BRIDGE_SETTINGS",
        default_value = "~/.config/attendance-bridge/settings.xml"
    )]
    settings: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sync
    Run {
        /// Access-control database (overrides the settings file)
        #[arg(long, env = "BRIDGE_SOURCE_DB")]
        source_db: Option<String>,
        /// Workforce service endpoint (overrides the settings file)
        #[arg(long, env = "BRIDGE_SERVICE_URL")]
        service_url: Option<String>,
        /// Service login (overrides the settings file)
        #[arg(long, env = "BRIDGE_LOGIN")]
        login: Option<String>,
        /// Service password (overrides the settings file)
        #[arg(long, env = "BRIDGE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Time-zone id the source timestamps are recorded in
        #[arg(long, env = "BRIDGE_TIME_ZONE", default_value = "UTC")]
        time_zone: String,
        /// Source key tagging imported events
        #[arg(long, default_value = DEFAULT_SOURCE_KEY)]
        source_key: String,
        /// Propagate employee photos
        #[arg(long)]
        photos: bool,
        /// Steps to run (repeatable); all steps when omitted
        #[arg(short, long = "step")]
        steps: Vec<SyncStep>,
        /// Reconcile against an empty in-memory service instead of the network
        #[arg(long)]
        dry_run: bool,
    },
    /// Manage the settings file
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings (password masked)
    Show,
    /// Write a new settings file
    Write {
        #[arg(long)]
        source_db: String,
        #[arg(long)]
        service_url: String,
        #[arg(long)]
        login: String,
        #[arg(long)]
        password: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        let code = e.downcast_ref::<BridgeError>().map_or(1, BridgeError::code);
        std::process::exit(code);
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Expand ~ in path
    let settings_path = shellexpand::tilde(&cli.settings).to_string();

    match cli.command {
        Commands::Run {
            source_db,
            service_url,
            login,
            password,
            time_zone,
            source_key,
            photos,
            steps,
            dry_run,
        } => {
            let stored = load_settings(&settings_path)?.unwrap_or_default();
            let settings = BridgeSettings {
                source_connection: source_db.unwrap_or(stored.source_connection),
                service_address: service_url.unwrap_or(stored.service_address),
                service_login: login.unwrap_or(stored.service_login),
                service_password: password.unwrap_or(stored.service_password),
            };
            if settings.source_connection.is_empty() {
                return Err(BridgeError::Config("no source database configured".to_string()).into());
            }

            let config = SyncConfig {
                source_key,
                include_photos: photos,
                time_zone_id: time_zone.clone(),
                steps: if steps.is_empty() {
                    SyncStep::ALL.to_vec()
                } else {
                    steps
                },
                ..Default::default()
            };
            let credentials = Credentials {
                login: settings.service_login.clone(),
                password: settings.service_password.clone(),
            };

            let source_path = shellexpand::tilde(&settings.source_connection).to_string();
            let store = SqliteStore::open(&source_path)?;

            let summary = if dry_run {
                tracing::info!("Dry run against an in-memory workforce service");
                let remote = MemoryService::new().with_time_zone(&time_zone);
                SyncRun::new(&store, &remote, config).execute(&credentials)?
            } else {
                execute_remote(&store, &settings, config, &credentials)?
            };

            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Settings { action } => match action {
            SettingsAction::Show => {
                let settings = load_settings(&settings_path)?.ok_or_else(|| {
                    BridgeError::Settings(format!("{} is empty", settings_path))
                })?;
                let masked = BridgeSettings {
                    service_password: "********".to_string(),
                    ..settings
                };
                println!("{}", serde_json::to_string_pretty(&masked)?);
            }
            SettingsAction::Write {
                source_db,
                service_url,
                login,
                password,
            } => {
                let settings = BridgeSettings {
                    source_connection: source_db,
                    service_login: login,
                    service_password: password,
                    service_address: service_url,
                };
                if let Some(parent) = Path::new(&settings_path).parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
                settings.save(&settings_path)?;
                println!("Wrote settings to {}", settings_path);
            }
        },
    }

    Ok(())
}

/// Load the settings file if it exists
fn load_settings(path: &str) -> anyhow::Result<Option<BridgeSettings>> {
    if !Path::new(path).exists() {
        return Ok(None);
    }
    BridgeSettings::load(path).with_context(|| format!("reading settings from {}", path))
}

#[cfg(feature = "rpc")]
fn execute_remote(
    store: &SqliteStore,
    settings: &BridgeSettings,
    config: SyncConfig,
    credentials: &Credentials,
) -> anyhow::Result<attendance_bridge::RunSummary> {
    let remote = RpcService::new(settings.service_address.clone())?;
    Ok(SyncRun::new(store, &remote, config).execute(credentials)?)
}

#[cfg(not(feature = "rpc"))]
fn execute_remote(
    _store: &SqliteStore,
    _settings: &BridgeSettings,
    _config: SyncConfig,
    _credentials: &Credentials,
) -> anyhow::Result<attendance_bridge::RunSummary> {
    Err(BridgeError::Config("built without the `rpc` feature; use --dry-run".to_string()).into())
}
