//! # Engine Binary Resolver
//!
//! This module handles finding the engine binaries in different
//! environments:
//! - Bundled in a `tools/` directory next to the executable
//! - System-installed binaries on PATH

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolver for the engine's runtime binaries
pub struct EngineResolver {
    /// Directory where bundled binaries live, when present
    tools_dir: Option<PathBuf>,
}

impl EngineResolver {
    /// Create a new resolver, detecting the bundled tools directory.
    pub fn new() -> Self {
        Self {
            tools_dir: Self::detect_bundled_tools_dir(),
        }
    }

    /// Look for a `tools/` directory next to the current executable.
    fn detect_bundled_tools_dir() -> Option<PathBuf> {
        let exe_path = env::current_exe().ok()?;
        let app_dir = exe_path.parent()?;

        let tools_path = app_dir.join("tools");
        debug!("Checking bundled tools path: {:?}", tools_path);
        if tools_path.exists() {
            debug!("Found bundled tools directory: {:?}", tools_path);
            return Some(tools_path);
        }

        None
    }

    /// Resolve the path to a specific engine binary.
    pub fn resolve(&self, tool_name: &str) -> Option<PathBuf> {
        debug!("Resolving engine binary: {}", tool_name);

        if let Some(ref tools_dir) = self.tools_dir {
            let bundled = Self::with_platform_extension(tools_dir, tool_name);
            if bundled.exists() {
                debug!("Using bundled binary: {} -> {:?}", tool_name, bundled);
                return Some(bundled);
            }
        }

        if let Some(system_path) = Self::find_in_system_path(tool_name) {
            debug!("Using system binary: {} -> {:?}", tool_name, system_path);
            return Some(system_path);
        }

        warn!("Engine binary not found: {}", tool_name);
        None
    }

    /// Expected bundled path with the platform executable suffix.
    fn with_platform_extension(tools_dir: &Path, tool_name: &str) -> PathBuf {
        let extension = if cfg!(windows) { ".exe" } else { "" };
        tools_dir.join(format!("{}{}", tool_name, extension))
    }

    /// Find a binary in the system PATH.
    fn find_in_system_path(tool_name: &str) -> Option<PathBuf> {
        let extension = if cfg!(windows) { ".exe" } else { "" };
        let tool_with_ext = format!("{}{}", tool_name, extension);

        env::var_os("PATH")?
            .to_str()?
            .split(if cfg!(windows) { ';' } else { ':' })
            .map(|dir| Path::new(dir).join(&tool_with_ext))
            .find(|path| path.exists())
    }
}

impl Default for EngineResolver {
    fn default() -> Self {
        Self::new()
    }
}
