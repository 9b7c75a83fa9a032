//! portal-admin - command line front end for the portal data engines
//!
//! Uploads, templates and downloads go through the CSV engine; recurrence
//! templates are synced through the recurrence engine. Both work against the
//! SQLite database under the resolved root folder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use portal_common::config::PortalConfig;
use portal_common::{HookList, PortalEvent, PostCommitHook, SystemClock};
use portal_events::{RecurrenceEngine, RecurrenceTemplate, SqliteOccurrenceStore};
use portal_querycsv::{
    run_job, FieldMapping, FieldPolicy, HttpMediaFetcher, QueryCsvService, SqliteStore, UploadJob, UploadStatus,
};
use sqlx::SqlitePool;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod models;

/// Command-line arguments for portal-admin
#[derive(Parser, Debug)]
#[command(name = "portal-admin")]
#[command(about = "Bulk CSV import/export and recurring event sync")]
#[command(version)]
struct Args {
    /// Root folder holding the database, media and reports
    #[arg(short, long)]
    root_folder: Option<String>,

    /// Configuration file (TOML)
    #[arg(short, long, env = "PORTAL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a header-only upload template
    Template {
        #[arg(short, long)]
        model: String,
        /// Columns to include: all, required or writable
        #[arg(short, long, default_value = "all")]
        fields: FieldPolicy,
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Upload a CSV, XLSX or JSON file
    Upload {
        #[arg(short, long)]
        model: String,
        #[arg(short, long)]
        file: PathBuf,
        /// Column override, "Column=field" or "Column=SKIP" (repeatable)
        #[arg(long = "map")]
        mappings: Vec<FieldMapping>,
    },

    /// Export every entity of a model as CSV
    Download {
        #[arg(short, long)]
        model: String,
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Sync the occurrences of a recurrence template
    Sync {
        /// Template file (TOML)
        #[arg(short, long)]
        template: PathBuf,
    },

    /// Print how many occurrences a template implies
    Count {
        #[arg(short, long)]
        template: PathBuf,
    },
}

/// Post-commit hook that traces every engine side effect
struct TraceHook;

impl PostCommitHook for TraceHook {
    fn on_commit(&self, event: &PortalEvent) {
        debug!(?event, "Committed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = PortalConfig::load_or_default(args.config.as_deref());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting portal-admin v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Build: {} ({}, {})",
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root = config.resolve_root(args.root_folder.as_deref());
    std::fs::create_dir_all(&root).with_context(|| format!("Failed to create root folder {}", root.display()))?;
    info!("Root folder: {}", root.display());

    let db_path = config.database_path(&root);
    let pool = portal_common::db::init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let hooks = HookList::new().with(Arc::new(TraceHook));

    match args.command {
        Command::Template { model, fields, out } => {
            let service = csv_service(&config, &root, &pool, &model, hooks)?;
            let headers = service
                .write_csv_template(&out, fields)
                .with_context(|| format!("Failed to write template {}", out.display()))?;
            info!(model = %model, policy = %fields, columns = headers.len(), "Template written to {}", out.display());
        }

        Command::Upload { model, file, mappings } => {
            let service = csv_service(&config, &root, &pool, &model, hooks)?;
            let mut job = UploadJob::new(&model, file, mappings);

            run_job(&mut job, &service, &SystemClock, &config.reports_path(&root))
                .await
                .context("Failed to write upload reports")?;

            println!("{}", serde_json::to_string_pretty(&job)?);

            if matches!(job.status, UploadStatus::Failed | UploadStatus::Invalid) {
                bail!("Upload {}: {}", job.status, job.error.unwrap_or_default());
            }
        }

        Command::Download { model, out } => {
            let service = csv_service(&config, &root, &pool, &model, hooks)?;
            let count = service
                .download(&out)
                .await
                .with_context(|| format!("Failed to download {}", model))?;
            info!(model = %model, rows = count, "Download written to {}", out.display());
        }

        Command::Sync { template: path } => {
            let mut template = load_template(&path)?;
            let engine = RecurrenceEngine::new(
                Arc::new(SqliteOccurrenceStore::new(pool.clone())),
                Arc::new(SystemClock),
                hooks,
            );

            let outcome = engine.sync(&template).await.context("Recurrence sync failed")?;

            // persist the template id so later runs own the same occurrences
            template.last_synced = Some(outcome.synced_at);
            save_template(&path, &template)?;

            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "template_id": template.id,
                    "name": template.name,
                    "expected": template.expected_occurrence_count(),
                    "occurrences": outcome.occurrences.len(),
                    "created": outcome.created,
                    "updated": outcome.updated,
                    "deleted": outcome.deleted,
                    "protected": outcome.protected,
                    "synced_at": outcome.synced_at,
                }))?
            );
        }

        Command::Count { template: path } => {
            let template = load_template(&path)?;
            println!("{}", template.expected_occurrence_count());
            info!(rrule = %template.rrule(), "Recurrence rule");
        }
    }

    Ok(())
}

fn csv_service(
    config: &PortalConfig,
    root: &Path,
    pool: &SqlitePool,
    model: &str,
    hooks: HookList,
) -> Result<QueryCsvService> {
    let Some(schema) = models::schema_for(model) else {
        bail!("Unknown model '{}' (expected one of: {})", model, models::MODELS.join(", "));
    };

    let fetcher = HttpMediaFetcher::new(config.media_path(root), config.media_fetch.clone())
        .context("Failed to build media fetcher")?;

    Ok(QueryCsvService::new(schema, Arc::new(SqliteStore::new(pool.clone())))
        .with_media(Arc::new(fetcher))
        .with_hooks(hooks))
}

fn load_template(path: &Path) -> Result<RecurrenceTemplate> {
    RecurrenceTemplate::load(path).with_context(|| format!("Invalid recurrence template {}", path.display()))
}

fn save_template(path: &Path, template: &RecurrenceTemplate) -> Result<()> {
    let text = toml::to_string_pretty(template).context("Failed to encode template")?;
    std::fs::write(path, text).with_context(|| format!("Failed to save template {}", path.display()))
}
