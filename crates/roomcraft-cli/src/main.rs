mod server;

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roomcraft_contracts::events::EventWriter;
use roomcraft_engine::{EngineConfig, RoomPipeline, SqliteStore};

use crate::server::AppState;

#[derive(Debug, Parser)]
#[command(
    name = "roomcraft",
    version,
    about = "Room analysis and inspiration backend"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Upload an image file and print its URL.
    Upload(UploadArgs),
    /// Analyze a room image and store the record.
    Analyze(AnalyzeArgs),
    /// Generate an inspiration image from suggestions.
    Generate(GenerateArgs),
    /// Print a stored analysis record as JSON.
    Show(ShowArgs),
}

#[derive(Debug, Parser)]
struct EngineArgs {
    /// Directory holding the database and event log.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Use offline providers and a local upload directory.
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,
    #[arg(long, default_value_t = 5000)]
    port: u16,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct UploadArgs {
    path: PathBuf,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    image_url: String,
    #[arg(long)]
    user: Option<String>,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    image_url: String,
    #[arg(long)]
    suggestions: String,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct ShowArgs {
    record_id: String,
    #[command(flatten)]
    engine: EngineArgs,
}

struct Services {
    pipeline: Arc<RoomPipeline>,
    store: Arc<SqliteStore>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("roomcraft error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::Upload(args) => {
            let services = build_services(&args.engine)?;
            let bytes =
                fs::read(&args.path).with_context(|| format!("failed reading {}", args.path.display()))?;
            let url = services.pipeline.upload(&bytes, None)?;
            println!("{url}");
            Ok(0)
        }
        Command::Analyze(args) => {
            let services = build_services(&args.engine)?;
            let result = services
                .pipeline
                .analyze(Some(&args.image_url), args.user.as_deref())?;
            println!("record_id: {}", result.record_id());
            println!("outcome: {}", result.record.payload.kind());
            println!("{}", result.html);
            Ok(if result.record.payload.is_error() { 2 } else { 0 })
        }
        Command::Generate(args) => {
            let services = build_services(&args.engine)?;
            let generated = services
                .pipeline
                .generate_inspiration(Some(&args.image_url), Some(&args.suggestions))?;
            println!("{}", generated.generated_url);
            Ok(0)
        }
        Command::Show(args) => {
            let services = build_services(&args.engine)?;
            let record = services.pipeline.record(&args.record_id)?;
            println!("{}", serde_json::to_string_pretty(&record.to_json())?);
            Ok(0)
        }
    }
}

fn run_serve(args: ServeArgs) -> Result<i32> {
    // Blocking HTTP clients are built here, before the runtime exists, and
    // this frame keeps the last handle so they are also dropped outside it.
    let services = build_services(&args.engine)?;
    let state = Arc::new(AppState {
        pipeline: services.pipeline.clone(),
        bookings: services.store.clone(),
    });
    let addr = SocketAddr::new(args.bind, args.port);
    eprintln!(
        "roomcraft: database {} (image store: {})",
        services.store.path().display(),
        services.pipeline.image_store_name()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(server::serve(state, addr))?;
    drop(runtime);
    drop(services);
    Ok(0)
}

fn build_services(args: &EngineArgs) -> Result<Services> {
    let mut config = EngineConfig::from_env();
    if args.dryrun {
        let data_dir = args.data_dir.clone().unwrap_or(config.data_dir.clone());
        config = EngineConfig::dryrun(data_dir);
    } else if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }

    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
    let store = Arc::new(
        SqliteStore::open(config.database_path())
            .with_context(|| format!("failed to open {}", config.database_path().display()))?,
    );
    let events = EventWriter::new(config.events_path(), "roomcraft");
    let pipeline = RoomPipeline::from_config(&config, store.clone(), events)
        .context("failed to configure providers")?;
    Ok(Services {
        pipeline: Arc::new(pipeline),
        store,
    })
}
