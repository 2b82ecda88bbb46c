//! # Keyframe Analyzer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Validazione degli input dell'utente
//! - Avvio del controller e rendering del progresso
//! - Export del log di analisi risultante
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (file, threads, scene-cut, etc.)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 3. Crea il controller e acquisisce l'engine
//! 4. Sottomette l'asset e rende il progresso dallo stream di stato
//! 5. Scrive il log risultante su `"<nome-file>.log"`
//!
//! ## Esempio di utilizzo:
//! ```bash
//! keyframe-analyzer clip.webm --threads 8 --scene-cut 60 --verbose
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use keyframe_analyzer::{
    AnalysisParameters, AnalysisProgress, Controller, Phase, SourceAsset, SubmitOutcome,
    ACCEPTED_MEDIA_TYPE,
};

#[derive(Parser)]
#[command(name = "keyframe-analyzer")]
#[command(about = "Analyze a video's keyframe/scene-change candidates with an external FFmpeg engine")]
struct Args {
    /// Video file to analyze (WebM)
    input: PathBuf,

    /// Engine thread count (1-16)
    #[arg(short, long, default_value = "4")]
    threads: u8,

    /// Scene-cut sensitivity (0-150, 0 disables scene-cut detection)
    #[arg(short, long, default_value = "40")]
    scene_cut: u16,

    /// Where to write the analysis log (default: "<input-name>.log")
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Abort a stuck analysis after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Validate arguments
    if !args.input.exists() {
        return Err(anyhow::anyhow!(
            "Input file does not exist: {}",
            args.input.display()
        ));
    }

    let params = AnalysisParameters {
        thread_count: args.threads,
        scene_cut_threshold: args.scene_cut,
    };
    params.validate()?;

    let timeout = args.timeout.map(Duration::from_secs);
    let mut controller = Controller::new(params, timeout)?;

    // Render the controller's state stream until it reaches a terminal
    // phase; the controller never blocks on the renderer.
    let mut updates = controller.subscribe();
    let renderer = tokio::spawn(async move {
        let progress = AnalysisProgress::new();
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if state.phase.is_terminal() {
                progress.finish(&state);
                break;
            }
            progress.render(&state);
        }
    });

    // Acquisition is triggered on start, not on demand.
    if !controller.acquire().await {
        let state = controller.run_state();
        let _ = renderer.await;
        return Err(anyhow::anyhow!("{}", state.status_message));
    }

    let asset = SourceAsset::from_path(&args.input).await?;
    let default_output = asset.log_file_name();

    match controller.submit(asset).await {
        SubmitOutcome::Ignored => {
            renderer.abort();
            Err(anyhow::anyhow!(
                "Input was not accepted: only {} files are supported",
                ACCEPTED_MEDIA_TYPE
            ))
        }
        SubmitOutcome::Finished => {
            let _ = renderer.await;
            let state = controller.run_state();
            match state.phase {
                Phase::Succeeded => {
                    let output_path = args.output.unwrap_or_else(|| PathBuf::from(default_output));
                    tokio::fs::write(&output_path, state.result_log.unwrap_or_default()).await?;
                    info!("💾 Analysis log written to: {}", output_path.display());
                    Ok(())
                }
                Phase::Failed(stage) => Err(anyhow::anyhow!(
                    "Analysis failed during {stage}: {}",
                    state.status_message
                )),
                other => Err(anyhow::anyhow!(
                    "Controller ended in unexpected phase: {other}"
                )),
            }
        }
    }
}
