//! # Progress Rendering Module
//!
//! Questo modulo rende lo stato osservabile del controller come progress
//! bar sul terminale.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per feedback real-time
//! - Rendering dello stream di `RunState` pubblicato dal controller
//! - Messaggi di stato per fase (acquiring, intake, analyzing, terminale)
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [============>---------------------------]  31% frame= 412 fps=210 ...
//! ```
//!
//! Questo è presentation layer puro: legge snapshot di stato, non muta mai
//! il controller.

use crate::controller::{Phase, RunState};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Renders RunState snapshots as a terminal progress bar
pub struct AnalysisProgress {
    bar: ProgressBar,
}

impl AnalysisProgress {
    /// Create a bar spanning 0-100 percent.
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Render one state snapshot.
    pub fn render(&self, state: &RunState) {
        self.bar.set_position(state.progress_percent as u64);

        let message = match state.phase {
            Phase::Idle => "Waiting for input…".to_string(),
            Phase::Acquiring => "🎬 Acquiring engine…".to_string(),
            Phase::Ready => "Engine ready".to_string(),
            Phase::Intake | Phase::Analyzing => state.status_message.clone(),
            Phase::Succeeded => format!("✅ {}", state.status_message),
            Phase::Failed(_) => format!("❌ {}", state.status_message),
        };
        self.bar.set_message(message);
    }

    /// Finish the bar with the terminal state's message.
    pub fn finish(&self, state: &RunState) {
        match state.phase {
            Phase::Succeeded => self
                .bar
                .finish_with_message(format!("✅ {}", state.status_message)),
            Phase::Failed(_) => self
                .bar
                .abandon_with_message(format!("❌ {}", state.status_message)),
            _ => self.bar.finish_and_clear(),
        }
    }
}

impl Default for AnalysisProgress {
    fn default() -> Self {
        Self::new()
    }
}
