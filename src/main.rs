//! # Motorcare — vehicle maintenance tracker with WhatsApp reminders
//!
//! Records vehicle service visits and messages owners in two phases: an
//! opt-in confirmation shortly after a record is created, then a
//! service-due reminder once the configured delay has elapsed.
//!
//! Usage:
//!   motorcare run                 # Start the reminder scheduler loop
//!   motorcare run --once          # Single scheduler pass, then exit
//!   motorcare add --customer "Asha Verma" --registration KA01AB1234 \
//!       --phone +919876543210 --meter 42000 --cost 2500
//!   motorcare list                # Recent records and their reminder state

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use motorcare_channels::gateway_from_config;
use motorcare_core::config::MotorcareConfig;
use motorcare_core::traits::{Clock, RecordStore, SystemClock};
use motorcare_core::types::MaintenanceRecord;
use motorcare_scheduler::{spawn_reminder_loop, ReminderEngine};
use motorcare_store::SqliteStore;

#[derive(Parser)]
#[command(
    name = "motorcare",
    version,
    about = "Vehicle maintenance tracker with two-phase WhatsApp service reminders"
)]
struct Cli {
    /// Config file path (default: ~/.motorcare/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reminder scheduler (the default command)
    Run {
        /// Run a single scheduler pass and exit
        #[arg(long)]
        once: bool,
    },
    /// Add a maintenance record
    Add {
        /// Customer name
        #[arg(long)]
        customer: String,
        /// Vehicle registration number
        #[arg(long)]
        registration: String,
        /// Owner WhatsApp number with country code, e.g. +919876543210
        #[arg(long)]
        phone: String,
        /// Odometer reading at service
        #[arg(long)]
        meter: u64,
        /// Service cost
        #[arg(long)]
        cost: f64,
        /// Last service date (RFC 3339); defaults to now
        #[arg(long)]
        serviced_at: Option<String>,
    },
    /// List recent records and their reminder state
    List {
        /// Maximum number of records to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

fn load_config(path: Option<&str>) -> Result<MotorcareConfig> {
    match path {
        Some(p) => {
            let expanded = shellexpand::tilde(p).to_string();
            MotorcareConfig::load_from(Path::new(&expanded))
                .with_context(|| format!("loading config from {expanded}"))
        }
        None => MotorcareConfig::load().context("loading config"),
    }
}

fn open_store(config: &MotorcareConfig) -> Result<Arc<SqliteStore>> {
    let db_path = shellexpand::tilde(&config.store.db_path).to_string();
    Ok(Arc::new(SqliteStore::open(Path::new(&db_path))?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "motorcare=debug,motorcare_scheduler=debug,motorcare_store=debug,motorcare_channels=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let store = open_store(&config)?;
    let clock = Arc::new(SystemClock);

    match cli.command.unwrap_or(Command::Run { once: false }) {
        Command::Run { once } => {
            let gateway = gateway_from_config(&config.messaging)?;
            // Credential problems fail every send identically, so surface
            // them before the first pass instead of per record.
            gateway.verify().await.context("gateway verification")?;
            tracing::info!("Messaging via {}", gateway.name());

            let engine = Arc::new(ReminderEngine::new(
                store,
                gateway,
                clock,
                config.reminder.clone(),
            ));
            if once {
                let report = engine.run_once().await?;
                tracing::info!(
                    "Pass complete: {}/{} opt-ins, {}/{} reminders sent",
                    report.opt_ins_sent,
                    report.opt_in_candidates,
                    report.reminders_sent,
                    report.reminder_candidates
                );
            } else {
                spawn_reminder_loop(engine, config.reminder.check_interval_secs).await;
            }
        }
        Command::Add {
            customer,
            registration,
            phone,
            meter,
            cost,
            serviced_at,
        } => {
            let now = clock.now();
            let last_service_at = match serviced_at {
                Some(s) => s
                    .parse::<chrono::DateTime<chrono::Utc>>()
                    .with_context(|| format!("invalid --serviced-at value {s:?}"))?,
                None => now,
            };
            let record = MaintenanceRecord::new(
                &customer,
                &registration,
                &phone,
                last_service_at,
                meter,
                cost,
                config.reminder.service_interval(),
                now,
            )?;
            store.insert(&record).await?;
            println!(
                "Added {} for {} — next service {}",
                record.registration,
                record.customer_name,
                record.next_service_display()
            );
        }
        Command::List { limit } => {
            let records = store.list_recent(limit).await?;
            if records.is_empty() {
                println!("No records yet.");
            }
            for r in records {
                let state = if r.reminder_sent {
                    "reminded"
                } else if r.opt_in_sent {
                    "opted-in"
                } else {
                    "pending"
                };
                println!(
                    "{}  {:<12} {:<16} next {}  [{}]",
                    r.created_at.format("%Y-%m-%d %H:%M"),
                    r.registration,
                    r.owner_phone,
                    r.next_service_display(),
                    state
                );
            }
        }
    }

    Ok(())
}
