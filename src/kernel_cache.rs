//! Compiled artifact cache directory management.
//!
//! The code generator writes each compiled variant into its own
//! sub-directory under this root. The runtime only ever reads from it.

use std::path::{Path, PathBuf};

/// Default artifact cache root.
///
/// `$KERNEL_JIT_CACHE_DIR` if set, else the platform cache dir
/// (`~/.cache/kernel-jit` on Linux), else `$HOME/.kernel-jit`.
pub fn kernel_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("KERNEL_JIT_CACHE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Some(dir) = dirs::cache_dir() {
        return dir.join("kernel-jit");
    }
    let home_dir = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home_dir).join(".kernel-jit")
}

/// Binary of a compiled variant inside its artifact directory.
pub fn artifact_binary_path(dir: &Path, entry_point: &str) -> PathBuf {
    dir.join(format!("{entry_point}.cubin"))
}

/// Metadata sidecar of a compiled variant inside its artifact directory.
pub fn artifact_metadata_path(dir: &Path, entry_point: &str) -> PathBuf {
    dir.join(format!("{entry_point}.json"))
}
