//! picflow: ingest photos, run AI enrichment, and manage tags from the command line.
//!
//! Configuration comes from the environment (see `picflow_core::Config`). Without
//! DATABASE_URL everything runs against an in-memory store for this process only.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use picflow_cli::{format_asset_row, init_tracing, App};
use picflow_core::{Config, MediaAsset};
use picflow_db::AssetStore;
use picflow_services::EnrichmentOutcome;
use picflow_worker::{EnrichmentQueue, EnrichmentQueueConfig, EnrichmentRequest};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "picflow", about = "Photo ingestion and tagging")]
struct Cli {
    /// Owner of the assets being ingested or searched
    #[arg(long, global = true, default_value_t = Uuid::nil())]
    owner: Uuid,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one or more photos and queue them for AI enrichment
    Ingest {
        /// Paths to the photos
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Skip AI enrichment
        #[arg(long)]
        no_enrich: bool,
    },
    /// Run AI enrichment for an existing asset
    Enrich {
        /// Asset UUID
        id: Uuid,
    },
    /// Manual tag operations
    Tags {
        #[command(subcommand)]
        sub: TagCommands,
    },
    /// Keyword search over tags, AI summary, location and capture date
    Search {
        /// Space-separated keywords; all must match
        query: String,
        #[arg(long, default_value = "20")]
        limit: i64,
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Replace an asset's description
    Describe {
        /// Asset UUID
        id: Uuid,
        /// New description text
        text: String,
    },
    /// Delete one or more assets and their files
    Delete {
        /// Asset UUIDs
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },
    /// Apply database migrations
    Migrate,
}

#[derive(Subcommand)]
enum TagCommands {
    /// Replace the asset's manual tags
    Set {
        /// Asset UUID
        id: Uuid,
        /// New manual tags (none clears them)
        names: Vec<String>,
    },
    /// Remove one tag, whatever its origin
    Remove {
        /// Asset UUID
        id: Uuid,
        /// Tag name
        name: String,
    },
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

fn outcome_json(id: Uuid, outcome: &EnrichmentOutcome) -> serde_json::Value {
    match outcome {
        EnrichmentOutcome::Applied { added, summary } => serde_json::json!({
            "id": id,
            "status": "applied",
            "added_tags": added,
            "summary": summary,
        }),
        EnrichmentOutcome::Skipped(reason) => serde_json::json!({
            "id": id,
            "status": "skipped",
            "reason": reason.to_string(),
        }),
    }
}

async fn require_asset(app: &App, id: Uuid) -> Result<MediaAsset> {
    app.store
        .find_asset_by_id(id)
        .await?
        .with_context(|| format!("Asset {} not found", id))
}

async fn ingest(app: &App, owner: Uuid, files: Vec<PathBuf>, enrich: bool) -> Result<()> {
    let queue = (enrich && app.enrichment.is_enabled()).then(|| {
        EnrichmentQueue::new(
            app.enrichment.clone(),
            EnrichmentQueueConfig::from(&app.config),
        )
    });

    let mut ingested = Vec::new();
    for path in files {
        match app.ingest_file(&path, owner).await {
            Ok(asset) => {
                if let Some(queue) = &queue {
                    queue.submit(EnrichmentRequest {
                        asset_id: asset.id,
                        file_key: asset.file_key.clone(),
                    });
                }
                ingested.push(asset.id);
            }
            Err(e) => tracing::error!(path = %path.display(), error = %e, "Ingestion failed"),
        }
    }

    if let Some(queue) = queue {
        queue.shutdown().await;
    }

    let mut assets = Vec::with_capacity(ingested.len());
    for id in ingested {
        assets.push(require_asset(app, id).await?);
    }
    print_json(&assets)
}

async fn migrate(config: &Config) -> Result<()> {
    let pool = picflow_db::connect(config).await?;
    picflow_db::run_migrations(&pool).await?;
    println!("Migrations applied");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;

    // Needs only the database; building the app would fall back to memory.
    if let Commands::Migrate = cli.command {
        return migrate(&config).await;
    }

    let app = App::from_config(config).await?;

    match cli.command {
        Commands::Ingest { files, no_enrich } => {
            ingest(&app, cli.owner, files, !no_enrich).await?;
        }
        Commands::Enrich { id } => {
            let asset = require_asset(&app, id).await?;
            let outcome = app.enrichment.run(asset.id, &asset.file_key).await;
            print_json(&outcome_json(id, &outcome))?;
        }
        Commands::Tags { sub } => match sub {
            TagCommands::Set { id, names } => {
                if !app.store.replace_manual_tags(id, &names).await? {
                    anyhow::bail!("Asset {} not found", id);
                }
                print_json(&require_asset(&app, id).await?)?;
            }
            TagCommands::Remove { id, name } => {
                let removed = app.store.remove_tag(id, &name).await?;
                print_json(&serde_json::json!({ "id": id, "tag": name, "removed": removed }))?;
            }
        },
        Commands::Search {
            query,
            limit,
            format,
        } => {
            let assets = app.store.search(cli.owner, &query, limit).await?;
            match format {
                OutputFormat::Json => print_json(&assets)?,
                OutputFormat::Table => {
                    for asset in &assets {
                        println!("{}", format_asset_row(asset));
                    }
                    println!("{} result(s)", assets.len());
                }
            }
        }
        Commands::Describe { id, text } => {
            if !app.describe_asset(id, &text).await? {
                anyhow::bail!("Asset {} not found", id);
            }
            print_json(&require_asset(&app, id).await?)?;
        }
        Commands::Delete { ids } => {
            let report = app.delete_assets(&ids).await?;
            print_json(&serde_json::json!({
                "message": format!("Successfully deleted {} asset(s)", report.deleted.len()),
                "deleted": report.deleted,
                "not_found": report.not_found,
            }))?;
        }
        Commands::Migrate => migrate(&app.config).await?,
    }

    Ok(())
}
