use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use shapescan::detection::DebugDump;
use shapescan::{
    BuiltinBackend, DetectionResult, DetectionSession, DetectionSettings, Frame, GatePolicy,
    RuntimeGate, SettingsStore, SnapshotFileSource, TickOutcome,
};

#[derive(Parser)]
#[command(name = "shapescan")]
#[command(about = "Detect and classify shapes in images using contour analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run detection once on an image file
    Detect {
        #[command(flatten)]
        common: CommonArgs,

        /// Save intermediate images to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,
    },
    /// Re-run detection periodically on a snapshot file
    Watch {
        #[command(flatten)]
        common: CommonArgs,

        /// Tick interval; defaults to the configured fps
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,

        /// Stop after this many ticks (runs until Ctrl-C otherwise)
        #[arg(long)]
        ticks: Option<u64>,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// JSON settings file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("shapescan={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<DetectionSettings> {
    match path {
        Some(path) => DetectionSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(DetectionSettings::default()),
    }
}

fn print_result(result: &DetectionResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(result)?);
        return Ok(());
    }

    println!("\n=== Detection Results ===");
    println!(
        "Total objects: {} ({:.1} ms)",
        result.total_objects, result.processing_time_ms
    );
    if result.synthetic {
        println!("Contour extraction failed; showing demo objects.");
    }

    for object in &result.objects {
        let bbox = &object.bounding_box;
        let area = object
            .area
            .map(|a| format!(" - area: {}", a))
            .unwrap_or_default();
        println!(
            "  {} {} at ({}, {}) {}x{}{} - confidence: {}",
            object.id,
            object.label,
            bbox.x,
            bbox.y,
            bbox.width,
            bbox.height,
            area,
            object.confidence_percent(0)
        );
    }

    Ok(())
}

async fn open_session(common: &CommonArgs) -> anyhow::Result<DetectionSession> {
    let settings = load_settings(common.config.as_ref())?;
    let store = SettingsStore::new(settings)?;

    let (gate, _task) = RuntimeGate::start(BuiltinBackend, GatePolicy::default());
    let status = gate.wait_settled().await;
    if !status.ready {
        anyhow::bail!("Vision runtime unavailable: {:?}", status.error);
    }

    Ok(DetectionSession::new(gate, store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Detect { common, debug_out } => {
            init_logging(common.verbose);
            let mut session = open_session(&common).await?;
            if let Some(dir) = debug_out {
                session = session.with_debug(DebugDump::new(dir)?);
            }
            let session = Arc::new(session);

            tracing::debug!("Loading image: {:?}", common.image_path);
            let frame = Frame::open(&common.image_path)
                .with_context(|| format!("Failed to load {}", common.image_path.display()))?;
            tracing::debug!("Image loaded: {}x{}", frame.width(), frame.height());

            let result = session.detect_async(frame).await?;
            print_result(&result, common.json)?;
        }
        Command::Watch {
            common,
            interval_ms,
            ticks,
        } => {
            init_logging(common.verbose);
            let session = Arc::new(open_session(&common).await?);
            let source = Arc::new(SnapshotFileSource::new(&common.image_path));

            let (handle, mut reports) =
                session.start_periodic(source, interval_ms.map(Duration::from_millis))?;

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    report = reports.recv() => {
                        let Some(report) = report else { break };
                        match report.outcome {
                            TickOutcome::Completed(result) => print_result(&result, common.json)?,
                            TickOutcome::Skipped => {}
                            TickOutcome::Failed(err) => eprintln!("Tick {} failed: {}", report.tick, err),
                        }
                        if ticks.is_some_and(|limit| report.tick >= limit) {
                            break;
                        }
                    }
                }
            }

            handle.stop().await;
        }
    }

    Ok(())
}
