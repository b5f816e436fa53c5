mod collector;
mod config;
mod db;
mod extractor;
mod fetch;
mod handoff;
mod models;
mod page;
mod pipeline;
mod scheduler;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use config::{Destination, RetryPolicy, Settings};
use fetch::HttpSource;
use models::ProductRecord;

#[derive(Parser)]
#[command(name = "dns_mice", about = "Daily DNS shop mice catalog loader")]
struct Cli {
    /// Times a failed stage is re-run from scratch
    #[arg(long, global = true, default_value_t = config::DEFAULT_RETRIES)]
    retries: u32,
    /// Seconds to wait before re-running a failed stage
    #[arg(long, global = true, default_value_t = config::DEFAULT_RETRY_DELAY_SECS)]
    retry_delay: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect, extract and load once
    Run {
        /// Write to this SQLite file instead of Postgres
        #[arg(long)]
        sqlite: Option<PathBuf>,
    },
    /// Collect product links from every listing page
    Collect {
        #[arg(short, long, default_value = handoff::LINKS_PATH)]
        output: PathBuf,
    },
    /// Extract product records from collected links
    Extract {
        #[arg(short, long, default_value = handoff::LINKS_PATH)]
        input: PathBuf,
        #[arg(short, long, default_value = handoff::RECORDS_PATH)]
        output: PathBuf,
    },
    /// Replace the destination table with extracted records
    Load {
        #[arg(short, long, default_value = handoff::RECORDS_PATH)]
        input: PathBuf,
        /// Write to this SQLite file instead of Postgres
        #[arg(long)]
        sqlite: Option<PathBuf>,
    },
    /// Run now and then once a day until interrupted
    Schedule {
        /// Write to this SQLite file instead of Postgres
        #[arg(long)]
        sqlite: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let retry = RetryPolicy {
        retries: cli.retries,
        delay: Duration::from_secs(cli.retry_delay),
    };

    let result = match cli.command {
        Commands::Run { sqlite } => {
            let settings = Settings::new(Destination::from_args(sqlite), retry);
            let report = pipeline::run_once(&settings, HttpSource::new).await?;
            println!(
                "Loaded {} of {} products into {} ({} rows).",
                report.records, report.links, settings.table, report.rows
            );
            Ok(())
        }
        Commands::Collect { output } => {
            let settings = Settings::new(Destination::from_args(None), retry);
            let links = pipeline::collect(&settings, &HttpSource::new).await?;
            handoff::write_json(&output, &links)?;
            println!("Wrote {} links to {}", links.len(), output.display());
            Ok(())
        }
        Commands::Extract { input, output } => {
            let settings = Settings::new(Destination::from_args(None), retry);
            let count =
                pipeline::extract_file(&settings, &HttpSource::new, &input, &output).await?;
            println!("Wrote {} records to {}", count, output.display());
            Ok(())
        }
        Commands::Load { input, sqlite } => {
            let settings = Settings::new(Destination::from_args(sqlite), retry);
            let records: Vec<ProductRecord> = handoff::read_json(&input)?;
            let rows = pipeline::load(&settings, &records).await?;
            println!("Replaced {} with {} rows", settings.table, rows);
            Ok(())
        }
        Commands::Schedule { sqlite } => {
            let settings = Settings::new(Destination::from_args(sqlite), retry);
            println!(
                "Scheduling daily runs into {} (Ctrl-C to stop)",
                settings.destination.describe()
            );
            scheduler::run_every(
                &settings,
                HttpSource::new,
                config::SCHEDULE_INTERVAL,
                scheduler::shutdown_on(tokio::signal::ctrl_c()),
            )
            .await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
