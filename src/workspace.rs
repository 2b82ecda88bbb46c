//! # Engine Workspace Module
//!
//! Questo modulo gestisce il namespace addressable dell'engine: una
//! directory temporanea di sessione in cui l'input viene scritto prima
//! dell'esecuzione e da cui gli artifact di output vengono riletti.
//!
//! ## Responsabilità:
//! - `write_input()`: copia i bytes dell'asset sotto un nome fisso
//! - `read_output()`: rilegge un artifact per nome; `NotFound` se
//!   l'analisi non ha mai raggiunto lo stage che lo produce (condizione
//!   soft, non un crash)
//! - `clear()`: rimozione best-effort di artifact stale da run precedenti
//!
//! Nessun contratto di cleanup tra run: un nome riusato viene sovrascritto
//! liberamente. La directory vive quanto il controller e viene rimossa a
//! fine sessione dal `TempDir`.

use crate::error::EngineError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;
use tracing::debug;

/// The engine's addressable storage namespace for one session
pub struct EngineWorkspace {
    dir: TempDir,
}

impl EngineWorkspace {
    /// Create a fresh workspace directory.
    pub fn new() -> Result<Self, EngineError> {
        let dir = TempDir::new()?;
        debug!("Engine workspace created at: {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Root of the namespace; the engine runs with this as its working
    /// directory so artifact names stay relative.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of a named entry inside the namespace.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Copy bytes into the namespace under `name`, overwriting freely.
    /// Must complete before an `execute` referencing that name.
    pub async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        fs::write(self.path_of(name), bytes).await?;
        debug!("Wrote {} bytes to workspace entry: {}", bytes.len(), name);
        Ok(())
    }

    /// Read a named artifact back out, decoded as text.
    pub async fn read_output(&self, name: &str) -> Result<String, EngineError> {
        let path = self.path_of(name);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of a stale artifact from a prior run, so a later
    /// `read_output` can never observe old data.
    pub async fn clear(&self, name: &str) {
        let _ = fs::remove_file(self.path_of(name)).await;
    }
}
