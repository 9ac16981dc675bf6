use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use tribute_sync::config::Config;
use tribute_sync::validation::format_field_errors;
use tribute_sync::{EntityId, EntityKind, RenderMode, SyncSession, Workflow};

const LOG_ENV: &str = "TRIBUTE_SYNC_LOG";

#[derive(Parser, Debug)]
#[command(name = "tribute-sync")]
#[command(about = "Inspect and manage tribute site entities through the sync layer")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tribute-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Answer locally as server rendering would, without touching the network
  #[arg(long)]
  server_render: bool,

  /// Mirror logs to stderr
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch one entity by id
  Get { kind: EntityKind, id: EntityId },
  /// Fetch an entity by slug
  Slug {
    slug: String,
    #[arg(short, long, default_value = "tribute")]
    kind: EntityKind,
  },
  /// Free-text search
  Search {
    query: String,
    #[arg(short, long, default_value = "tribute")]
    kind: EntityKind,
    #[arg(long, default_value_t = 1)]
    page: u64,
    #[arg(long, default_value_t = 10)]
    per_page: u64,
  },
  /// List one page of entities
  List {
    kind: EntityKind,
    #[arg(long, default_value_t = 1)]
    page: u64,
    #[arg(long, default_value_t = 10)]
    per_page: u64,
  },
  /// Delete an entity by id
  Delete { kind: EntityKind, id: EntityId },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.verbose)?;

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if args.server_render {
    config.render_mode = RenderMode::Server;
  }

  let session = SyncSession::new(&config)?;
  run(&session, args.command).await
}

async fn run(session: &SyncSession, command: Command) -> Result<()> {
  match command {
    Command::Get { kind, id } => {
      let workflow = session.workflow(kind);
      let entity = workflow.fetch_by_id(id).await.map_err(|_| failure(&workflow))?;
      print_json(&entity.to_json())
    }
    Command::Slug { slug, kind } => {
      let workflow = session.workflow(kind);
      let entity = workflow
        .fetch_by_slug(&slug)
        .await
        .map_err(|_| failure(&workflow))?;
      print_json(&entity.to_json())
    }
    Command::Search {
      query,
      kind,
      page,
      per_page,
    } => {
      let workflow = session.workflow(kind);
      let results = workflow.search(&query, page, per_page).await;
      if workflow.state().has_error() {
        return Err(failure(&workflow));
      }
      print_json(&results)
    }
    Command::List {
      kind,
      page,
      per_page,
    } => {
      let workflow = session.workflow(kind);
      let results = workflow.list(page, per_page).await;
      if workflow.state().has_error() {
        return Err(failure(&workflow));
      }
      print_json(&results)
    }
    Command::Delete { kind, id } => {
      let workflow = session.workflow(kind);
      workflow.delete(id.clone()).await.map_err(|_| failure(&workflow))?;
      println!("Deleted {} {}", kind, id);
      Ok(())
    }
  }
}

/// The workflow's error banner, plus field errors when validation failed.
fn failure(workflow: &Workflow) -> color_eyre::Report {
  let state = workflow.state();
  let banner = state.error.unwrap_or_else(|| "Request failed".to_string());
  match state.validation_errors {
    Some(fields) => eyre!("{}\n{}", banner, format_field_errors(&fields)),
    None => eyre!("{}", banner),
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Daily rolling log file under the user data dir; stderr too with `--verbose`.
fn init_logging(verbose: bool) -> Result<WorkerGuard> {
  let dir = dirs::data_dir()
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("tribute-sync")
    .join("logs");
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&dir, "tribute-sync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
  let file_layer = tracing_subscriber::fmt::layer()
    .with_writer(writer)
    .with_ansi(false)
    .with_target(true);
  let stderr_layer = verbose.then(|| {
    tracing_subscriber::fmt::layer()
      .compact()
      .with_writer(std::io::stderr)
  });

  tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(stderr_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
