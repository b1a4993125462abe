mod artifact;
mod collector;
mod download;
mod extract;
mod partition;
mod record;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::warn;

use crate::partition::Partition;

#[derive(Parser)]
#[command(
    name = "filings_scraper",
    about = "Daily corporate-disclosure ingestion and text extraction"
)]
struct Cli {
    /// Partition date, DD-MM-YYYY (default: today)
    #[arg(short, long, global = true)]
    date: Option<String>,
    /// Root directory holding the year/month/day partitions
    #[arg(short, long, global = true, default_value = "data")]
    output: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest captured announcement pages into the date's raw store
    Collect {
        /// JSON capture of page rows produced by the rendering layer
        #[arg(short, long)]
        pages: PathBuf,
    },
    /// Download referenced documents not yet on disk
    Download,
    /// Extract text from downloaded documents (OCR fallback for scans)
    Extract,
    /// Full pipeline: collect (when a capture is given) + download + extract
    Run {
        #[arg(short, long)]
        pages: Option<PathBuf>,
    },
    /// Show partition statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let date = parse_date(cli.date.as_deref())?;
    let partition = Partition::open(&cli.output, date)?;

    let result = match cli.command {
        Commands::Collect { pages } => {
            let mut source = collector::ReplayPageSource::from_path(&pages)?;
            let merged = collector::collect(&mut source, &partition)?;
            println!(
                "Merged {} new announcements for {}",
                merged,
                partition.date_str()
            );
            Ok(())
        }
        Commands::Download => {
            let client = download::client()?;
            let stats = download::download_all(&client, &partition).await?;
            println!(
                "Done: {} fetched, {} already present, {} failed.",
                stats.fetched, stats.skipped, stats.failed
            );
            Ok(())
        }
        Commands::Extract => {
            let stats = extract::extract_all(&partition)?;
            println!(
                "Done: {} extracted, {} failed terminally, {} already completed.",
                stats.extracted, stats.failures, stats.skipped
            );
            Ok(())
        }
        Commands::Run { pages } => {
            if let Some(pages) = pages {
                // A rendering timeout aborts collection for this date only;
                // documents already in the store still get processed.
                let collected = collector::ReplayPageSource::from_path(&pages)
                    .and_then(|mut source| collector::collect(&mut source, &partition));
                match collected {
                    Ok(n) => println!("Collected {n} new announcements"),
                    Err(e) => warn!("Collection failed for {}: {:#}", partition.date_str(), e),
                }
            }

            let client = download::client()?;
            let d = download::download_all(&client, &partition).await?;
            println!(
                "Downloads: {} fetched, {} already present, {} failed.",
                d.fetched, d.skipped, d.failed
            );

            let x = extract::extract_all(&partition)?;
            println!(
                "Extraction: {} extracted, {} failed terminally, {} already completed.",
                x.extracted, x.failures, x.skipped
            );
            Ok(())
        }
        Commands::Stats => {
            let s = partition.stats()?;
            println!("Partition:  {}", partition.date_str());
            println!("Raw rows:   {}", s.raw_rows);
            println!("With docs:  {}", s.with_docs);
            println!("Artifacts:  {}", s.artifacts);
            println!("Extracted:  {}", s.extracted_rows);
            println!("Completed:  {}", s.completed);
            println!("Errors:     {}", s.errors);
            println!(
                "Watermark:  {}",
                s.watermark.as_deref().unwrap_or("(not set)")
            );
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn parse_date(arg: Option<&str>) -> Result<NaiveDate> {
    match arg {
        Some(s) => NaiveDate::parse_from_str(s, partition::DATE_FORMAT)
            .with_context(|| format!("invalid date {s:?}, expected DD-MM-YYYY")),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
