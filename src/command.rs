//! # Command Builder Module
//!
//! Questo modulo costruisce il vettore di argomenti per una singola
//! invocazione di analisi dell'engine.
//!
//! ## Responsabilità:
//! - Funzione pura: stessi input → stesso vettore, nessun side effect
//! - Seleziona l'input per nome dentro il workspace dell'engine
//! - Imposta thread count e sensibilità scene-cut dai parametri
//! - Disabilita l'audio e i keyframe periodici (`keyint=infinite`)
//! - Richiede un single analysis pass con statistiche per-frame scritte
//!   nell'artifact fisso `ffstats.log`
//! - Scarta l'output codificato verso il null sink (`-f null -`):
//!   contano solo le statistiche
//!
//! ## Esempio di vettore prodotto:
//! ```text
//! -i input.webm -threads 4 -an -c:v libx264 -preset ultrafast
//! -tune animation -x264-params keyint=infinite:scenecut=40:pass=1:stats=ffstats.log
//! -f null -
//! ```

use crate::config::AnalysisParameters;

/// Fixed name the asset is written under in the engine workspace.
pub const INPUT_NAME: &str = "input.webm";

/// Fixed name of the per-frame statistics artifact the analysis pass writes.
pub const STATS_NAME: &str = "ffstats.log";

/// Build the argument vector for one analysis invocation.
///
/// Pure and deterministic: safe to call any number of times with the same
/// inputs, always yields an identical vector.
pub fn build_args(input_name: &str, params: &AnalysisParameters) -> Vec<String> {
    vec![
        "-i".to_string(),
        input_name.to_string(),
        "-threads".to_string(),
        params.thread_count.to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "ultrafast".to_string(),
        "-tune".to_string(),
        "animation".to_string(),
        "-x264-params".to_string(),
        format!(
            "keyint=infinite:scenecut={}:pass=1:stats={}",
            params.scene_cut_threshold, STATS_NAME
        ),
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ]
}
