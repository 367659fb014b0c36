//! Artifact metadata sidecar.
//!
//! Each compiled variant directory holds `<entry>.cubin` and `<entry>.json`.
//! Only a few metadata fields matter at launch time:
//!
//! ```json
//! { "name": "add_kernel", "shared": 0,
//!   "target": { "backend": "cuda", "arch": 80, "warp_size": 32 } }
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::compiler::CompiledArtifact;
use crate::error::{JitError, JitResult};
use crate::kernel_cache::artifact_metadata_path;

const DEFAULT_WARP_SIZE: u32 = 32;

#[derive(Debug, Deserialize)]
struct KernelMetadata {
    name: String,
    #[serde(default)]
    shared: u32,
    #[serde(default)]
    target: Option<TargetInfo>,
    #[serde(default)]
    warp_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TargetInfo {
    #[serde(default)]
    backend: Option<String>,
    arch: ArchValue,
    #[serde(default)]
    warp_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArchValue {
    Number(u32),
    Text(String),
}

impl ArchValue {
    /// `80`, `"sm_80"`, `"sm_90a"` → 80 / 80 / 90. `None` for anything else.
    fn compute_capability(&self) -> Option<u32> {
        match self {
            ArchValue::Number(n) => Some(*n),
            ArchValue::Text(s) => {
                let digits: String = s
                    .trim_start_matches("sm_")
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect();
                digits.parse().ok()
            }
        }
    }
}

/// Read the metadata of the variant `entry_point` compiled into `dir`.
pub fn read_artifact(dir: &Path, entry_point: &str) -> JitResult<CompiledArtifact> {
    let path = artifact_metadata_path(dir, entry_point);
    let invalid = |reason: String| JitError::InvalidArtifact {
        path: path.clone(),
        reason,
    };

    let content = std::fs::read_to_string(&path).map_err(|e| invalid(e.to_string()))?;
    let meta: KernelMetadata =
        serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;

    if meta.name != entry_point {
        return Err(invalid(format!(
            "metadata names kernel {:?}, expected {entry_point:?}",
            meta.name
        )));
    }
    if let Some(backend) = meta.target.as_ref().and_then(|t| t.backend.as_deref()) {
        if backend != "cuda" {
            return Err(invalid(format!("unsupported target backend {backend:?}")));
        }
    }

    let arch = match meta.target.as_ref() {
        Some(target) => match target.arch.compute_capability() {
            Some(sm) => sm,
            None => {
                let reason = format!("unrecognized target arch {:?}", target.arch);
                return Err(invalid(reason));
            }
        },
        None => 0,
    };
    let warp_size = meta
        .target
        .as_ref()
        .and_then(|t| t.warp_size)
        .or(meta.warp_size)
        .unwrap_or(DEFAULT_WARP_SIZE);

    Ok(CompiledArtifact {
        dir: dir.to_path_buf(),
        entry_point: meta.name,
        shared_mem_bytes: meta.shared,
        arch,
        warp_size,
    })
}
