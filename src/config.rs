//! Runtime configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{JitError, JitResult};
use crate::kernel_cache::kernel_cache_dir;
use crate::signature::ScratchSlots;

/// Generator scripts shipped with this crate.
pub const BUNDLED_SCRIPT_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/scripts");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitConfig {
    /// Interpreter that runs the code generator scripts.
    pub python: PathBuf,
    /// Directory holding `gen_ssig.py` and `standalone_compile.py`.
    pub script_dir: PathBuf,
    /// Root the code generator writes compiled artifacts under.
    pub cache_dir: PathBuf,
    /// Trailing scratch pointers appended to every launch.
    pub scratch: ScratchSlots,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            python: PathBuf::from("python3"),
            script_dir: PathBuf::from(BUNDLED_SCRIPT_DIR),
            cache_dir: kernel_cache_dir(),
            scratch: ScratchSlots::DEFAULT,
        }
    }
}

impl JitConfig {
    /// Defaults overlaid with `KERNEL_JIT_*` environment variables.
    pub fn from_env() -> JitResult<Self> {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> JitResult<Self> {
        if let Some(python) = var("KERNEL_JIT_PYTHON") {
            self.python = PathBuf::from(python);
        }
        if let Some(dir) = var("KERNEL_JIT_SCRIPT_DIR") {
            self.script_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("KERNEL_JIT_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(slots) = var("KERNEL_JIT_SCRATCH_SLOTS") {
            self.scratch = slots
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(ScratchSlots::from_count)
                .ok_or_else(|| {
                    JitError::Config(format!(
                        "KERNEL_JIT_SCRATCH_SLOTS must be 0, 1 or 2, got {slots:?}"
                    ))
                })?;
        }
        Ok(self)
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> JitResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| JitError::Config(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| JitError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}
