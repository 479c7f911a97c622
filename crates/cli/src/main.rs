use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tierbay_catalog::{BucketRepository, CatalogService, InventoryImporter};
use tierbay_engine::create_scanner;
use tierbay_report::{write_reports, ReportDocument};
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::{AnalyzerConfig, ThresholdArgs};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "TierBay - Find S3 storage cost savings in a bucket inventory",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    database_url: Option<String>,

    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Inventory {
        #[command(subcommand)]
        command: InventoryCommands,
    },
    Bucket {
        #[command(subcommand)]
        command: BucketCommands,
    },
    /// Classify every object and write the cost report
    Analyze {
        /// Specific bucket names to analyze (default: all)
        #[arg(long, num_args = 1..)]
        buckets: Vec<String>,

        #[arg(long, default_value = "s3_cost_report.txt")]
        output: PathBuf,

        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
}

#[derive(Subcommand, Debug)]
enum InventoryCommands {
    /// Load JSON-lines snapshots into the catalog
    Import {
        #[arg(long)]
        objects: Option<PathBuf>,
        #[arg(long)]
        uploads: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum BucketCommands {
    List,
    /// Record that a bucket cannot be listed
    MarkUnavailable {
        name: String,
        reason: String,
    },
    /// Clear a recorded listing failure
    MarkAvailable {
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AnalyzerConfig::load(path).await?,
        None => AnalyzerConfig::default(),
    };
    if let Some(database_url) = &cli.database_url {
        config.database_url = database_url.clone();
    }
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone();
    }

    setup_tracing(&config.log_level);

    match &cli.command {
        Commands::Inventory { command } => {
            handle_inventory_command(command, &config).await?;
        }
        Commands::Bucket { command } => {
            handle_bucket_command(command, &config).await?;
        }
        Commands::Analyze {
            buckets,
            output,
            thresholds,
        } => {
            thresholds.apply(&mut config.thresholds);
            run_analysis(&config, buckets, output).await?;
        }
    }

    Ok(())
}

fn setup_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn open_reader(path: &Path) -> Result<BufReader<tokio::fs::File>> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

async fn handle_inventory_command(
    command: &InventoryCommands,
    config: &AnalyzerConfig,
) -> Result<()> {
    let catalog = CatalogService::open(&config.database_url).await?;
    let mut importer = InventoryImporter::new(catalog.pool().clone());

    match command {
        InventoryCommands::Import { objects, uploads } => {
            if objects.is_none() && uploads.is_none() {
                eprintln!("Nothing to import: pass --objects and/or --uploads");
                std::process::exit(1);
            }

            if let Some(path) = objects {
                match importer.import_objects(open_reader(path).await?).await {
                    Ok(stats) => {
                        println!(
                            "Imported {} objects from {} ({} new buckets)",
                            stats.records,
                            path.display(),
                            stats.buckets
                        );
                    }
                    Err(e) => {
                        eprintln!("Failed to import objects: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }

            if let Some(path) = uploads {
                match importer.import_uploads(open_reader(path).await?).await {
                    Ok(stats) => {
                        println!(
                            "Imported {} multipart uploads from {} ({} new buckets)",
                            stats.records,
                            path.display(),
                            stats.buckets
                        );
                    }
                    Err(e) => {
                        eprintln!("Failed to import multipart uploads: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
        }
    }

    Ok(())
}

async fn handle_bucket_command(command: &BucketCommands, config: &AnalyzerConfig) -> Result<()> {
    let catalog = CatalogService::open(&config.database_url).await?;
    let repo = BucketRepository::new(catalog.pool().clone());

    match command {
        BucketCommands::List => match repo.list().await {
            Ok(buckets) => {
                if buckets.is_empty() {
                    println!("No buckets found");
                } else {
                    println!("Buckets:");
                    for bucket in buckets {
                        println!(
                            "  {} ({})",
                            bucket.name,
                            bucket.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                        );
                        if let Some(error) = bucket.listing_error {
                            println!("    Unavailable: {}", error);
                        }
                    }
                }
            }
            Err(e) => {
                eprintln!("Failed to list buckets: {}", e);
                std::process::exit(1);
            }
        },
        BucketCommands::MarkUnavailable { name, reason } => {
            match repo.set_listing_error(name, Some(reason.as_str())).await {
                Ok(true) => println!("Marked bucket '{}' unavailable: {}", name, reason),
                Ok(false) => {
                    eprintln!("Bucket '{}' not found", name);
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Failed to update bucket: {}", e);
                    std::process::exit(1);
                }
            }
        }
        BucketCommands::MarkAvailable { name } => match repo.set_listing_error(name, None).await {
            Ok(true) => println!("Marked bucket '{}' available", name),
            Ok(false) => {
                eprintln!("Bucket '{}' not found", name);
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("Failed to update bucket: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

async fn run_analysis(config: &AnalyzerConfig, buckets: &[String], output: &Path) -> Result<()> {
    let catalog = CatalogService::open(&config.database_url).await?;
    let engine_config = config.engine_config();
    tracing::debug!("Engine configuration: {:?}", engine_config);

    // Reject bad thresholds and prices before touching any bucket.
    let scanner = match create_scanner(catalog.pool().clone(), &engine_config) {
        Ok(scanner) => scanner,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let buckets = if buckets.is_empty() {
        scanner.discover_buckets().await?
    } else {
        buckets.to_vec()
    };

    if buckets.is_empty() {
        println!("No buckets found or unable to list buckets");
        return Ok(());
    }

    println!("Analyzing {} bucket(s)...\n", buckets.len());
    let outcome = scanner.scan(&buckets, chrono::Utc::now()).await;

    let document = ReportDocument::new(outcome, *scanner.thresholds(), scanner.pricing().clone());
    for status in document.summary.buckets.iter() {
        if let Some(error) = status.error.as_ref().or(status.multipart_error.as_ref()) {
            eprintln!("  {}: {}", status.bucket_name, error);
        }
    }

    let (text_path, json_path) = write_reports(&document, output).await?;
    println!("\nReport written to: {}", text_path.display());
    println!("JSON data written to: {}", json_path.display());
    println!("\nAnalysis complete!");

    Ok(())
}
