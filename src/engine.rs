//! # Engine Handle Module
//!
//! Questo modulo possiede il lifecycle di una singola istanza dell'engine
//! di encoding esterno (FFmpeg).
//!
//! ## Responsabilità:
//! - Acquisizione idempotente: risoluzione dei binari `ffmpeg`/`ffprobe`
//!   e verifica che l'engine sia istanziabile (`ffmpeg -version`)
//! - Readiness flag: l'acquisizione è retryable ma mai teardown in sessione
//! - Esecuzione di un comando di analisi nel workspace dell'engine
//! - Analisi proprietà video con ffprobe (durata, risoluzione, codec)
//! - Event emission: ogni riga stderr dell'engine è ripubblicata come
//!   evento `Log`, lo stream `-progress` su stdout è convertito in eventi
//!   `Progress` (frazione in [0,1])
//!
//! ## Event streams:
//! Gli eventi sono push-based, non ordinati tra loro, con cardinalità
//! zero-o-molti per run, e fluiscono sullo stesso canale per tutta la vita
//! dell'handle, anche attraverso più `execute`.
//!
//! ## Esempio:
//! ```rust,no_run
//! # async fn demo() -> Result<(), keyframe_analyzer::EngineError> {
//! use keyframe_analyzer::EngineHandle;
//!
//! let (mut engine, _events) = EngineHandle::new();
//! engine.acquire().await?;
//! assert!(engine.ready());
//! # Ok(())
//! # }
//! ```

use crate::error::EngineError;
use crate::resolver::EngineResolver;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

/// Push-based event republished by the engine while it runs
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// One line of engine output; latest line wins as live status
    Log(String),
    /// Fraction of the run completed, in [0, 1]
    Progress(f64),
}

/// Basic properties of a probed video file
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
}

/// Handle to the single engine instance shared across the session
pub struct EngineHandle {
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
    ready: bool,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineHandle {
    /// Create a not-ready handle; binaries are resolved at `acquire` time.
    /// Returns the handle together with the receiving end of its event
    /// stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                ffmpeg: None,
                ffprobe: None,
                ready: false,
                events: tx,
            },
            rx,
        )
    }

    /// Create a handle with explicit engine programs, bypassing resolution.
    /// Acquisition still verifies the programs run. Intended for embedders
    /// and tests that substitute the engine.
    pub fn with_programs(
        ffmpeg: PathBuf,
        ffprobe: PathBuf,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                ffmpeg: Some(ffmpeg),
                ffprobe: Some(ffprobe),
                ready: false,
                events: tx,
            },
            rx,
        )
    }

    /// Whether the engine has been acquired and is usable.
    pub fn ready(&self) -> bool {
        self.ready
    }

    /// Acquire the engine: idempotent, returns immediately when already
    /// ready. Failure leaves the handle not-ready so the caller may retry.
    pub async fn acquire(&mut self) -> Result<(), EngineError> {
        if self.ready {
            debug!("Engine already acquired, skipping");
            return Ok(());
        }

        if self.ffmpeg.is_none() || self.ffprobe.is_none() {
            let resolver = EngineResolver::new();
            self.ffmpeg = Some(resolver.resolve("ffmpeg").ok_or_else(|| {
                EngineError::Acquisition("ffmpeg binary not found".to_string())
            })?);
            self.ffprobe = Some(resolver.resolve("ffprobe").ok_or_else(|| {
                EngineError::Acquisition("ffprobe binary not found".to_string())
            })?);
        }

        // Instantiation check: the engine must actually run.
        let ffmpeg = self
            .ffmpeg
            .clone()
            .ok_or_else(|| EngineError::Acquisition("engine binary not resolved".to_string()))?;
        let output = Command::new(&ffmpeg)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::Acquisition(format!("failed to start engine: {e}")))?;

        if !output.status.success() {
            return Err(EngineError::Acquisition(format!(
                "engine version check exited with {}",
                output.status
            )));
        }

        self.ready = true;
        debug!("Engine acquired: {}", ffmpeg.display());
        Ok(())
    }

    /// Probe a video file with ffprobe, returning its basic properties.
    pub async fn probe(&self, video_path: &Path) -> Result<MediaInfo, EngineError> {
        if !self.ready {
            return Err(EngineError::Execution("engine is not ready".to_string()));
        }

        let ffprobe = self.program(&self.ffprobe)?;
        let output = Command::new(ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(video_path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::Execution(format!("failed to execute probe: {e}")))?;

        if !output.status.success() {
            return Err(EngineError::Execution(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        let info_str = String::from_utf8_lossy(&output.stdout);
        let info: serde_json::Value = serde_json::from_str(&info_str)
            .map_err(|e| EngineError::Execution(format!("probe output parse error: {e}")))?;

        let duration = info["format"]["duration"]
            .as_str()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let empty_vec = vec![];
        let streams = info["streams"].as_array().unwrap_or(&empty_vec);
        let video_stream = streams
            .iter()
            .find(|s| s["codec_type"] == "video")
            .unwrap_or(&serde_json::Value::Null);

        Ok(MediaInfo {
            duration,
            width: video_stream["width"].as_u64().unwrap_or(0) as u32,
            height: video_stream["height"].as_u64().unwrap_or(0) as u32,
            codec: video_stream["codec_name"]
                .as_str()
                .unwrap_or("unknown")
                .to_string(),
        })
    }

    /// Run a single analysis command rooted in `workdir` (the engine's
    /// addressable namespace). Must only be called when ready.
    ///
    /// While the command runs, stderr lines are republished as `Log` events
    /// and the `-progress` key/value stream on stdout becomes `Progress`
    /// events, scaled against `duration_hint` when one is known. Dropping
    /// the returned future kills the child (`kill_on_drop`), which is how
    /// the controller implements its analysis timeout.
    pub async fn execute(
        &mut self,
        workdir: &Path,
        args: &[String],
        duration_hint: Option<f64>,
    ) -> Result<(), EngineError> {
        if !self.ready {
            return Err(EngineError::Execution("engine is not ready".to_string()));
        }

        let ffmpeg = self.program(&self.ffmpeg)?;
        let mut child = Command::new(ffmpeg)
            .args(["-hide_banner", "-y", "-progress", "pipe:1"])
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Execution(format!("failed to spawn engine: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Execution("engine stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Execution("engine stderr unavailable".to_string()))?;

        // Log pump: every stderr line becomes a Log event; the last
        // non-empty line doubles as the failure detail on abnormal exit.
        let log_tx = self.events.clone();
        let log_pump = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut last = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    last = line.clone();
                    let _ = log_tx.send(EngineEvent::Log(line));
                }
            }
            last
        });

        // Progress pump: parse the -progress key/value stream.
        let progress_tx = self.events.clone();
        let progress_pump = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(fraction) = progress_fraction(&line, duration_hint) {
                    let _ = progress_tx.send(EngineEvent::Progress(fraction));
                }
            }
        });

        let status = child.wait().await?;
        let last_log = log_pump.await.unwrap_or_default();
        let _ = progress_pump.await;

        if status.success() {
            Ok(())
        } else {
            let detail = if last_log.is_empty() {
                status.to_string()
            } else {
                last_log
            };
            Err(EngineError::Execution(format!(
                "engine terminated abnormally ({status}): {detail}"
            )))
        }
    }

    fn program<'a>(&self, slot: &'a Option<PathBuf>) -> Result<&'a PathBuf, EngineError> {
        slot.as_ref()
            .ok_or_else(|| EngineError::Acquisition("engine binary not resolved".to_string()))
    }
}

/// Parse one `-progress` line into a completion fraction.
///
/// The stream is `key=value` pairs; `out_time_us`/`out_time_ms` carry the
/// output timestamp in microseconds (both keys, historical FFmpeg quirk),
/// and `progress=end` marks completion. Without a duration hint only the
/// end marker produces a fraction.
fn progress_fraction(line: &str, duration_hint: Option<f64>) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => {
            let micros: i64 = value.parse().ok()?;
            let duration = duration_hint.filter(|d| *d > 0.0)?;
            let seconds = micros.max(0) as f64 / 1_000_000.0;
            Some((seconds / duration).clamp(0.0, 1.0))
        }
        "progress" if value == "end" => Some(1.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction_parsing() {
        assert_eq!(
            progress_fraction("out_time_ms=5000000", Some(10.0)),
            Some(0.5)
        );
        assert_eq!(
            progress_fraction("out_time_us=20000000", Some(10.0)),
            Some(1.0) // clamped
        );
        assert_eq!(progress_fraction("progress=end", None), Some(1.0));
        assert_eq!(progress_fraction("progress=continue", Some(10.0)), None);
        assert_eq!(progress_fraction("out_time_ms=5000000", None), None);
        assert_eq!(progress_fraction("fps=25.0", Some(10.0)), None);
        assert_eq!(progress_fraction("not a progress line", Some(10.0)), None);
    }

    #[test]
    fn test_negative_out_time_clamps_to_zero() {
        assert_eq!(progress_fraction("out_time_ms=-1000", Some(10.0)), Some(0.0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_acquire_is_idempotent() {
        let (mut engine, _events) =
            EngineHandle::with_programs(PathBuf::from("true"), PathBuf::from("true"));
        assert!(!engine.ready());

        engine.acquire().await.unwrap();
        assert!(engine.ready());

        // Second acquisition is a no-op.
        engine.acquire().await.unwrap();
        assert!(engine.ready());
    }

    #[tokio::test]
    async fn test_acquire_failure_leaves_not_ready() {
        let missing = PathBuf::from("definitely-not-a-real-engine-xyz");
        let (mut engine, _events) = EngineHandle::with_programs(missing.clone(), missing);

        assert!(matches!(
            engine.acquire().await,
            Err(EngineError::Acquisition(_))
        ));
        assert!(!engine.ready());

        // Retrying is safe and fails the same way.
        assert!(engine.acquire().await.is_err());
        assert!(!engine.ready());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_requires_ready() {
        let (mut engine, _events) =
            EngineHandle::with_programs(PathBuf::from("true"), PathBuf::from("true"));
        let dir = tempfile::TempDir::new().unwrap();

        let err = engine.execute(dir.path(), &[], None).await.unwrap_err();
        assert!(matches!(err, EngineError::Execution(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_reports_abnormal_termination() {
        let (mut engine, _events) =
            EngineHandle::with_programs(PathBuf::from("false"), PathBuf::from("false"));
        // `false -version` exits 1, so skip acquisition and mark ready.
        engine.ready = true;

        let dir = tempfile::TempDir::new().unwrap();
        let err = engine.execute(dir.path(), &[], None).await.unwrap_err();
        assert!(matches!(err, EngineError::Execution(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_republishes_log_events() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake-engine.sh");
        std::fs::write(&script, "#!/bin/sh\necho 'frame=1' >&2\necho 'frame=2' >&2\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let (mut engine, mut events) = EngineHandle::with_programs(script.clone(), script);
        engine.ready = true;

        let workdir = tempfile::TempDir::new().unwrap();
        engine.execute(workdir.path(), &[], None).await.unwrap();

        let first = events.try_recv().unwrap();
        let second = events.try_recv().unwrap();
        assert_eq!(first, EngineEvent::Log("frame=1".to_string()));
        assert_eq!(second, EngineEvent::Log("frame=2".to_string()));
    }
}
