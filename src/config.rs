//! # Analysis Parameters Module
//!
//! Questo modulo gestisce i parametri di analisi esposti all'utente.
//!
//! ## Responsabilità:
//! - Definisce la struct `AnalysisParameters` consumata dal command builder
//! - Fornisce validazione robusta dei range di input
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri:
//! - `thread_count`: Thread dell'engine (1-16, default: 4)
//! - `scene_cut_threshold`: Sensibilità scene-cut (0-150, default: 40,
//!   0 = scene-cut detection disabilitata)
//!
//! ## Validazione:
//! - Controlla che thread_count sia 1-16
//! - Controlla che scene_cut_threshold sia 0-150
//!
//! ## Esempio:
//! ```rust
//! use keyframe_analyzer::AnalysisParameters;
//!
//! let params = AnalysisParameters {
//!     thread_count: 8,
//!     ..Default::default()
//! };
//! params.validate().unwrap();
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// User-tunable parameters for one analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisParameters {
    /// Engine thread count (1-16)
    pub thread_count: u8,
    /// Scene-cut sensitivity (0-150, 0 disables detection)
    pub scene_cut_threshold: u16,
}

impl Default for AnalysisParameters {
    fn default() -> Self {
        Self {
            thread_count: 4,
            scene_cut_threshold: 40,
        }
    }
}

impl AnalysisParameters {
    /// Validate parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 || self.thread_count > 16 {
            return Err(anyhow::anyhow!("Thread count must be between 1 and 16"));
        }

        if self.scene_cut_threshold > 150 {
            return Err(anyhow::anyhow!(
                "Scene-cut threshold must be between 0 and 150"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_validation() {
        let mut params = AnalysisParameters::default();
        assert!(params.validate().is_ok());

        params.thread_count = 0;
        assert!(params.validate().is_err());

        params.thread_count = 17;
        assert!(params.validate().is_err());

        params.thread_count = 4;
        params.scene_cut_threshold = 151;
        assert!(params.validate().is_err());

        // 0 is valid: scene-cut detection disabled
        params.scene_cut_threshold = 0;
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_parameters_default() {
        let params = AnalysisParameters::default();
        assert_eq!(params.thread_count, 4);
        assert_eq!(params.scene_cut_threshold, 40);
    }

    #[test]
    fn test_parameters_range_bounds() {
        let low = AnalysisParameters {
            thread_count: 1,
            scene_cut_threshold: 0,
        };
        assert!(low.validate().is_ok());

        let high = AnalysisParameters {
            thread_count: 16,
            scene_cut_threshold: 150,
        };
        assert!(high.validate().is_ok());
    }
}
