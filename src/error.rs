//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Categorie di errori:
//! - `Acquisition`: L'engine non può essere localizzato o istanziato
//! - `Io`: Errori di I/O sul workspace dell'engine (write/read artifact)
//! - `Execution`: L'invocazione dell'engine è terminata in modo anomalo
//! - `NotFound`: Artifact di output atteso ma mai prodotto (condizione soft)
//! - `Validation`: Parametri di analisi fuori range
//!
//! ## Vantaggi:
//! - Errori tipizzati per handling specifico nel controller
//! - Automatic conversion da errori standard
//! - Integration con `anyhow` per error propagation nel binario

/// Custom error types for engine orchestration
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("engine acquisition failed: {0}")]
    Acquisition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine execution failed: {0}")]
    Execution(String),

    #[error("output artifact not found: {0}")]
    NotFound(String),

    #[error("parameter validation error: {0}")]
    Validation(String),
}

impl EngineError {
    /// True when the error is the soft missing-artifact condition rather
    /// than a hard failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}
