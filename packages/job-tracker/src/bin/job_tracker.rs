// Entry point for the job tracker CLI

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use job_tracker::{
    default_registry, Config, HttpTransport, JobPosting, Pipeline, PostingQuery, PostingStatus,
    PostingStore, RunSummary, SourceState, SqliteStore,
};

#[derive(Parser)]
#[command(name = "job-tracker")]
#[command(about = "Track job postings across company career pages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape sources and record new and closed postings
    Run {
        /// Only run these sources (default: all)
        #[arg(long, num_args = 1..)]
        sources: Vec<String>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored postings
    Report {
        /// Only postings first seen in the last N days
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..=36_500))]
        days: Option<i64>,

        /// Only postings from this source
        #[arg(long)]
        source: Option<String>,

        /// Only postings that are still open
        #[arg(long)]
        active: bool,
    },

    /// List registered sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,job_tracker=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Run { sources, json } => run(&config, sources, json).await,
        Commands::Report {
            days,
            source,
            active,
        } => report(&config, days, source, active).await,
        Commands::Sources => {
            let registry = default_registry(&config).context("Failed to register sources")?;
            for source_id in registry.list_sources() {
                let adapter = registry.get(&source_id)?;
                println!("{:<12} {}", source_id.bold(), adapter.name());
            }
            Ok(())
        }
    }
}

async fn run(config: &Config, sources: Vec<String>, json: bool) -> Result<()> {
    let registry = Arc::new(default_registry(config).context("Failed to register sources")?);
    let store = Arc::new(
        SqliteStore::new(&config.database_url)
            .await
            .context("Failed to open database")?,
    );
    let transport = HttpTransport::new().context("Failed to build HTTP client")?;
    let pipeline = Pipeline::new(registry, transport, store, config.pipeline_config())
        .context("Invalid pipeline configuration")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let summary = if sources.is_empty() {
        pipeline.run(&cancel).await
    } else {
        pipeline
            .run_sources(&sources, &cancel)
            .await
            .context("Unknown source")?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("{}", format!("Run {}", summary.run_id).bold());

    for report in summary.sources.values() {
        let state = match report.state {
            SourceState::Success => report.state.label().green(),
            SourceState::PartialFailure => report.state.label().yellow(),
            _ => report.state.label().red(),
        };
        println!(
            "  {:<12} {:<16} new {:>3}  updated {:>3}  unchanged {:>3}  closed {:>3}",
            report.source_id, state, report.new_count, report.updated_count,
            report.unchanged_count, report.closed_count
        );
        for issue in report.errors.iter().filter(|e| !e.is_warning()) {
            println!("    {}", format!("{:?}", issue).dimmed());
        }
    }

    let new: Vec<&JobPosting> = summary.new_postings().collect();
    if !new.is_empty() {
        println!();
        println!("{}", format!("{} new postings", new.len()).bright_green().bold());
        for posting in new {
            print_posting(posting);
        }
    }
}

async fn report(config: &Config, days: Option<i64>, source: Option<String>, active: bool) -> Result<()> {
    let store = SqliteStore::new(&config.database_url)
        .await
        .context("Failed to open database")?;

    let mut query = PostingQuery::new();
    if let Some(days) = days {
        query = query.seen_within_days(days, Utc::now());
    }
    if let Some(source) = source {
        query = query.for_source(source);
    }
    if active {
        query = query.with_status(PostingStatus::Active);
    }

    let postings = store.query(&query).await.context("Failed to query postings")?;
    if postings.is_empty() {
        println!("{}", "No postings found".dimmed());
        return Ok(());
    }

    println!("{}", format!("{} postings", postings.len()).bold());
    for posting in &postings {
        print_posting(posting);
    }
    Ok(())
}

fn print_posting(posting: &JobPosting) {
    let status = match posting.status {
        PostingStatus::Active => "active".green(),
        PostingStatus::Closed => "closed".red(),
    };
    println!(
        "  [{}] {} {} ({})",
        posting.source_id.bold(),
        posting.title,
        posting.location.as_deref().unwrap_or("-").dimmed(),
        status
    );
    println!("      {}  first seen {}", posting.url, posting.first_seen_at.format("%Y-%m-%d"));
}
