//! Librarian ingest - post-download organizer
//!
//! Entry point for the `librarian-ingest` binary. Clients and collaborators
//! are built once here and shared with the pipeline through `Arc`.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use librarian_ingest::cli::{Cli, Command, LedgerAction, MigrateAction};
use librarian_ingest::config::Config;
use librarian_ingest::db::Database;
use librarian_ingest::media::{FfmpegConverter, LoftyTagReader, ResourceContext, TargetClaims};
use librarian_ingest::services::{
    CommandExtractor, LogFormat, MetadataResolver, NameMatcher, ResourceClassifier, TmdbClient,
    TorrentOrchestrator, TvMazeClient, init_tracing,
};

/// Conventional exit status for SIGINT
const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env());

    let cli = Cli::parse();

    tokio::select! {
        result = run(cli) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %format!("{:#}", e), "librarian-ingest failed");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, exiting");
            ExitCode::from(INTERRUPTED)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Arc::new(Config::from_env().context("Invalid configuration")?);
    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to open ledger database")?;

    match cli.command {
        Command::Process { id, name, path } => {
            db.migrate().await?;
            let orchestrator = build_orchestrator(config, &db)?;
            let summary = orchestrator.process(&id, &name, &path).await?;
            println!("{}", serde_json::to_string(&summary)?);
        }
        Command::Migrate { action } => {
            let migrations = db.migrations();
            match action {
                MigrateAction::Install => {
                    for path in migrations.install().await? {
                        println!("installed {}", path);
                    }
                }
                MigrateAction::Uninstall => {
                    for path in migrations.uninstall().await? {
                        println!("uninstalled {}", path);
                    }
                }
                MigrateAction::Status => {
                    for path in migrations.installed().await? {
                        println!("{}", path);
                    }
                }
            }
        }
        Command::Ledger { action } => {
            db.migrate().await?;
            let ledger = db.ledger();
            match action {
                LedgerAction::List => {
                    for record in ledger.list_active().await? {
                        println!(
                            "{}\t{}\t{}",
                            record.inserted.to_rfc3339(),
                            record.from_name,
                            record.to_name
                        );
                    }
                }
                LedgerAction::Forget { from, to } => {
                    if !ledger.soft_delete(&from, &to).await? {
                        anyhow::bail!("No active ledger entry for '{}' -> '{}'", from, to);
                    }
                    info!(from = %from, to = %to, "Ledger entry forgotten");
                }
            }
        }
    }

    Ok(())
}

fn build_orchestrator(config: Arc<Config>, db: &Database) -> Result<TorrentOrchestrator> {
    let matcher = Arc::new(NameMatcher::from_config(&config).context("Invalid matcher rules")?);

    if config.tmdb_api_key.is_none() {
        warn!("TMDB_API_KEY not set, movie lookups will fail");
    }
    let movies = Arc::new(TmdbClient::new(
        config.tmdb_api_key.clone().unwrap_or_default(),
        config.tmdb_url.clone(),
    ));
    let series = Arc::new(TvMazeClient::new(config.tvmaze_url.clone()));

    let ctx = ResourceContext {
        config: config.clone(),
        matcher: matcher.clone(),
        resolver: MetadataResolver::new(movies, series),
        converter: Arc::new(FfmpegConverter::new(&config.conversion)),
        tags: Arc::new(LoftyTagReader),
        extractor: Arc::new(CommandExtractor),
        claims: TargetClaims::default(),
    };
    let classifier = Arc::new(ResourceClassifier::from_config(&config, matcher));

    Ok(TorrentOrchestrator::new(ctx, classifier, db.ledger()))
}
