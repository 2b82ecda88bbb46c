//! # Keyframe Analyzer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API
//! pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Parametri di analisi e validazione
//! - `error`: Tipi di errore custom per le diverse operazioni
//! - `asset`: Input utente e filtro di intake
//! - `resolver`: Localizzazione dei binari dell'engine
//! - `engine`: Lifecycle dell'engine esterno ed event emission
//! - `workspace`: Namespace addressable dell'engine (VFS bridge)
//! - `command`: Builder puro del vettore di argomenti di analisi
//! - `controller`: State machine di orchestrazione (il core)
//! - `progress`: Rendering del progresso (presentation layer)
//!
//! ## Utilizzo:
//! ```rust,no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use keyframe_analyzer::{AnalysisParameters, Controller, SourceAsset};
//!
//! let mut controller = Controller::new(AnalysisParameters::default(), None)?;
//! controller.acquire().await;
//! let asset = SourceAsset::from_path(std::path::Path::new("clip.webm")).await?;
//! controller.submit(asset).await;
//! # Ok(())
//! # }
//! ```

pub mod asset;
pub mod command;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod progress;
pub mod resolver;
pub mod workspace;

pub use asset::{SourceAsset, ACCEPTED_MEDIA_TYPE};
pub use command::{build_args, INPUT_NAME, STATS_NAME};
pub use config::AnalysisParameters;
pub use controller::{Controller, Phase, RunState, Stage, SubmitOutcome};
pub use engine::{EngineEvent, EngineHandle, MediaInfo};
pub use error::EngineError;
pub use progress::AnalysisProgress;
pub use workspace::EngineWorkspace;
