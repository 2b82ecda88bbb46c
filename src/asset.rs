//! # Source Asset Module
//!
//! Questo modulo gestisce l'input fornito dall'utente e il filtro di intake.
//!
//! ## Responsabilità:
//! - Definisce `SourceAsset`: nome, dimensione, media type e bytes
//! - Determinazione media type dall'estensione del file
//! - Filtro di accettazione: solo il container supportato entra nel controller
//! - Nome del file di export per il log risultante
//!
//! ## Formati supportati:
//! - **Input**: WebM (`video/webm`)
//!
//! Un asset con media type diverso viene silenziosamente ignorato al
//! boundary di intake: nessun errore, nessuna transizione di fase.
//!
//! ## Esempio:
//! ```rust,no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use keyframe_analyzer::SourceAsset;
//!
//! let asset = SourceAsset::from_path(std::path::Path::new("clip.webm")).await?;
//! assert!(asset.is_accepted());
//! assert_eq!(asset.log_file_name(), "clip.webm.log");
//! # Ok(())
//! # }
//! ```

use crate::error::EngineError;
use std::path::Path;
use tokio::fs;

/// The media type accepted at the intake boundary.
pub const ACCEPTED_MEDIA_TYPE: &str = "video/webm";

/// A user-supplied input file, held until a new asset replaces it
#[derive(Debug, Clone)]
pub struct SourceAsset {
    /// Original file name, used for the export name
    pub name: String,
    /// Size of the payload in bytes
    pub size_bytes: u64,
    /// Declared media type, checked against the intake filter
    pub media_type: String,
    /// The raw payload handed to the engine workspace
    pub bytes: Vec<u8>,
}

impl SourceAsset {
    /// Build an asset from in-memory bytes with a declared media type.
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size_bytes: bytes.len() as u64,
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Load an asset from disk, deriving the media type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, EngineError> {
        let bytes = fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let media_type = media_type_for(path).to_string();

        Ok(Self::new(name, media_type, bytes))
    }

    /// Check the asset against the intake filter.
    pub fn is_accepted(&self) -> bool {
        self.media_type == ACCEPTED_MEDIA_TYPE
    }

    /// Name of the exported analysis log: `"<name>.log"`, with a default
    /// stem when the asset has no usable name.
    pub fn log_file_name(&self) -> String {
        if self.name.is_empty() {
            "analysis.log".to_string()
        } else {
            format!("{}.log", self.name)
        }
    }

    /// Fingerprint used by the controller to detect a resubmission of the
    /// same asset (prevents duplicate auto-runs).
    pub(crate) fn fingerprint(&self) -> (String, u64) {
        (self.name.clone(), self.size_bytes)
    }
}

/// Map a file extension to its declared media type
fn media_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("webm") => "video/webm",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}
