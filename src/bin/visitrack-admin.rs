use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use visitrack::analytics::{
    export_csv, load_all_visitors, load_visitors, models::format_timestamp, TimeRange,
};
use visitrack::config::Config;
use visitrack::storage;

#[derive(Parser)]
#[command(name = "visitrack-admin")]
#[command(about = "Visitrack admin management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show visit counters and the number of live visitors
    Stats,
    /// List visitors active within a time range, most recent first
    Visitors {
        /// One of 24h, 7d, 30d, all
        #[arg(long, default_value = "7d")]
        range: String,
    },
    /// Show the full visit history of one visitor
    History {
        /// Visitor identity as stored (possibly anonymized)
        ip: String,
    },
    /// Export every stored visit as CSV
    Export {
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("visitrack=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store = storage::connect(&config.store)
        .await
        .context("failed to connect to the visit store")?;

    match cli.command {
        Commands::Stats => {
            let counters = store.counters().await?;
            let unique = store.identities().await?.len();
            println!("Total visits:    {}", counters.total_visits);
            println!("Mobile visits:   {}", counters.mobile_visits);
            println!("Unique visitors: {}", unique);
        }
        Commands::Visitors { range } => {
            let range: TimeRange = range.parse()?;
            let visitors = load_visitors(store.as_ref(), range, Utc::now()).await?;
            if visitors.is_empty() {
                println!("No visitors in the last {}.", range);
            } else {
                println!("{:<40} {:>8} {}", "IP", "Visits", "Last visit");
                println!("{}", "-".repeat(80));
                for visitor in &visitors {
                    let last = visitor
                        .last_visit()
                        .map(|v| format_timestamp(&v.timestamp))
                        .unwrap_or_default();
                    println!("{:<40} {:>8} {}", visitor.ip, visitor.visits.len(), last);
                }
            }
        }
        Commands::History { ip } => {
            let visits = store.history(&ip).await?;
            if visits.is_empty() {
                println!("No visits recorded for '{}'.", ip);
            } else {
                println!("{:<26} {:<20} {:<30} {}", "Timestamp", "Device", "Path", "Location");
                println!("{}", "-".repeat(100));
                for visit in &visits {
                    println!(
                        "{:<26} {:<20} {:<30} {}",
                        format_timestamp(&visit.timestamp),
                        visit.device,
                        visit.path,
                        visit.location_label()
                    );
                }
            }
        }
        Commands::Export { output } => {
            let visitors = load_all_visitors(store.as_ref()).await?;
            let csv = export_csv(&visitors)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("✓ Exported {} visitors to {}", visitors.len(), path.display());
                }
                None => print!("{}", csv),
            }
        }
    }

    store.close().await?;
    Ok(())
}
