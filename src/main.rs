//! Ledgerdesk CLI
//!
//! Headless driver for the document workflow:
//! - List and inspect documents
//! - Upload files and wait for analysis
//! - Tag documents with a reporting period
//! - Add documents to the monthly records

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledgerdesk::workflow::drain;
use ledgerdesk::{
    CommitSummary, Config, Document, DocumentId, DocumentWorkspace, HttpBackend, LoggingConfig,
    Notification, NotificationLevel, UploadFile, UploadOutcome,
};

#[derive(Parser)]
#[command(name = "ledgerdesk")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Upload, tag and file financial documents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend API URL (overrides config)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List recent documents
    List,

    /// Show one document
    Show {
        /// Document id
        id: String,
    },

    /// Upload files for analysis
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Wait until analysis finishes
        #[arg(short, long)]
        wait: bool,
        /// Add analysed documents to records (implies --wait)
        #[arg(long)]
        commit: bool,
    },

    /// Edit a document's tags
    Tag {
        /// Document id
        id: String,
        /// Period month ("March", "mar" or 3); replaces the current period
        #[arg(short, long)]
        month: Option<String>,
        /// Period year (default: current year)
        #[arg(short, long)]
        year: Option<i32>,
        /// Remove the period
        #[arg(long, conflicts_with = "month")]
        clear_period: bool,
        /// Add a custom tag
        #[arg(long)]
        custom: Vec<String>,
        /// Remove a custom tag
        #[arg(long)]
        remove_custom: Vec<String>,
    },

    /// Add documents to records (all ready documents if no id is given)
    Commit {
        /// Document id
        id: Option<String>,
    },

    /// Delete a document
    Delete {
        /// Document id
        id: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        return write_default_config(output.as_ref());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(url) = &cli.api_url {
        config.backend.url = url.clone();
    }

    init_logging(&config.logging);
    tracing::debug!(api_url = %config.backend.url, "Ledgerdesk v{}", env!("CARGO_PKG_VERSION"));

    let backend = Arc::new(HttpBackend::new(config.http_backend())?);
    let workspace = DocumentWorkspace::new(backend, config.workflow_settings());
    let mut notifications = workspace.subscribe();

    workspace.records().set_listener(|committed| {
        let periods: BTreeSet<_> = committed.iter().filter_map(|c| c.period()).collect();
        for period in periods {
            println!("Records updated for {}", period.label());
        }
    });

    let result = run(&cli, &workspace).await;

    workspace.shutdown().await;
    print_notifications(&mut notifications);
    result
}

fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("ledgerdesk={}", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: &Cli, workspace: &DocumentWorkspace) -> Result<()> {
    let json = cli.format == "json";

    match &cli.command {
        Commands::List => {
            workspace.load_recent().await?;
            print_documents(&workspace.store().all().await, json)?;
        }

        Commands::Show { id } => {
            let document = workspace.track(&DocumentId::new(id.as_str())).await?;
            print_documents(&[document], json)?;
        }

        Commands::Upload {
            files,
            wait,
            commit,
        } => {
            let mut batch = Vec::with_capacity(files.len());
            for path in files {
                let file = UploadFile::from_path(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                batch.push(file);
            }

            let outcomes = workspace.uploads().upload_batch(batch).await;
            print_upload_outcomes(&outcomes, json)?;

            if *wait || *commit {
                println!("Waiting for analysis...");
                for (id, outcome) in workspace.poller().wait_all().await {
                    tracing::debug!(document_id = %id, ?outcome, "Polling finished");
                }

                let uploaded: Vec<Document> = workspace
                    .store()
                    .filter(|d| !d.id.is_temporary())
                    .await;
                print_documents(&uploaded, json)?;
            }

            if *commit {
                let summary = workspace.records().commit_all().await;
                print_summary(&summary, json)?;
            }
        }

        Commands::Tag {
            id,
            month,
            year,
            clear_period,
            custom,
            remove_custom,
        } => {
            let id = DocumentId::new(id.as_str());
            workspace.track(&id).await?;

            let mut draft = workspace.tags().open(&id).await?;
            if *clear_period {
                draft.clear_periods();
            }
            if let Some(month) = month {
                let year = year.unwrap_or_else(|| Utc::now().year());
                draft.clear_periods();
                draft.toggle_period_tag(month, year)?;
            }
            for value in custom {
                draft.add_custom_tag(value);
            }
            for value in remove_custom {
                draft.remove_custom_tag(value);
            }

            let saved = workspace.tags().save(draft).await?;
            print_documents(&[saved], json)?;
        }

        Commands::Commit { id: Some(id) } => {
            let id = DocumentId::new(id.as_str());
            workspace.track(&id).await?;
            let committed = workspace.records().commit_one(&id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&committed)?);
            }
        }

        Commands::Commit { id: None } => {
            workspace.load_recent().await?;
            let summary = workspace.records().commit_all().await;
            print_summary(&summary, json)?;
        }

        Commands::Delete { id } => {
            let id = DocumentId::new(id.as_str());
            workspace.track(&id).await?;
            workspace.delete(&id).await?;
        }

        Commands::Config { output } => write_default_config(output.as_ref())?,
    }

    Ok(())
}

fn write_default_config(output: Option<&PathBuf>) -> Result<()> {
    let config = ledgerdesk::config::generate_default_config();

    match output {
        Some(path) => {
            // Create parent directory if needed
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &config)?;
            println!("Config written to {:?}", path);
        }
        None => {
            print!("{}", config);
        }
    }
    Ok(())
}

fn print_notifications(receiver: &mut broadcast::Receiver<Notification>) {
    for notification in drain(receiver) {
        match notification.level {
            NotificationLevel::Error => eprintln!("error: {}", notification.message),
            _ => println!("{}", notification.message),
        }
    }
}

fn print_documents(documents: &[Document], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(documents)?);
        return Ok(());
    }

    if documents.is_empty() {
        println!("No documents yet.");
        println!();
        println!("Upload your first document with:");
        println!("  ledgerdesk upload invoice.pdf --wait");
        return Ok(());
    }

    println!(
        "{:<14} {:<28} {:<10} {:<6} {:<15} {:<9} {}",
        "ID", "Filename", "Status", "Conf", "Period", "Records", "Tags"
    );
    println!("{}", "-".repeat(96));

    for doc in documents {
        let confidence = doc
            .ai_confidence
            .map(|c| format!("{:.0}%", c * 100.0))
            .unwrap_or_else(|| "-".to_string());
        let period = doc
            .period()
            .map(|p| p.label())
            .unwrap_or_else(|| "-".to_string());
        let records = if doc.added_to_records() { "yes" } else { "no" };

        println!(
            "{:<14} {:<28} {:<10} {:<6} {:<15} {:<9} {}",
            truncate(doc.id.as_str(), 14),
            truncate(&doc.filename, 28),
            doc.status.to_string(),
            confidence,
            period,
            records,
            doc.custom_tags().join(", ")
        );
    }
    Ok(())
}

fn print_upload_outcomes(outcomes: &[UploadOutcome], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcomes)?);
        return Ok(());
    }

    for outcome in outcomes {
        match outcome {
            UploadOutcome::Uploaded { id, status } => println!("  {} ({})", id, status),
            UploadOutcome::Failed { error, .. } => println!("  failed: {}", error),
            UploadOutcome::Rejected { filename, reason } => {
                println!("  {} rejected: {}", filename, reason)
            }
            UploadOutcome::Discarded { id } => println!("  {} discarded", id),
        }
    }
    Ok(())
}

fn print_summary(summary: &CommitSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    if summary.is_empty() {
        return Ok(());
    }

    println!("Committed: {}", summary.committed.len());
    if !summary.failed.is_empty() {
        println!("Failed: {}", summary.failed.len());
        for (id, error) in &summary.failed {
            println!("  {}: {}", id, error);
        }
    }
    Ok(())
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let head: String = value.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
