//! Code generator seam.
//!
//! Kernels are compiled by an external code generator: given a kernel source
//! location and a function name it reports the static classification of the
//! parameters, and given a textual signature plus compile options it writes a
//! loadable artifact and says where.
//!
//! ```text
//! (source, name) ──derive_signature──▶ [0, 1, 2, ...]
//! (source, name, signature, warps, stages, device) ──compile──▶ CompiledArtifact
//! ```
//!
//! The generator is an embedded-interpreter style service that cannot be
//! entered from several threads at once, so every call goes through
//! [`with_codegen_lock`].

pub mod artifact;
pub mod cache;
pub mod process;

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::backend_trait::DeviceIndex;

pub use artifact::read_artifact;
pub use cache::CompileCache;
pub use process::ProcessCodeGenerator;

#[derive(Debug, Clone, Error)]
pub enum CodegenError {
    #[error("failed to run {command}: {reason}")]
    Spawn { command: String, reason: String },
    #[error("code generator exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("unexpected code generator output: {0}")]
    InvalidOutput(String),
}

/// Everything the code generator needs to produce one compiled variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest<'a> {
    pub source: &'a str,
    pub function: &'a str,
    pub signature: &'a str,
    pub num_warps: u32,
    pub num_stages: u32,
    pub device: DeviceIndex,
}

/// A compiled variant on disk, as reported by the code generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    /// Directory holding the binary and its metadata.
    pub dir: PathBuf,
    /// Symbol of the kernel inside the binary.
    pub entry_point: String,
    /// Static shared memory per block, in bytes.
    pub shared_mem_bytes: u32,
    /// Target compute capability, `major * 10 + minor`.
    pub arch: u32,
    pub warp_size: u32,
}

pub trait CodeGenerator: Send + Sync {
    /// Per-parameter classification codes: 0 non-constexpr, 1 specialized,
    /// 2 constexpr.
    fn derive_signature(&self, source: &str, function: &str) -> Result<Vec<i64>, CodegenError>;

    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompiledArtifact, CodegenError>;
}

static CODEGEN_LOCK: Mutex<()> = Mutex::new(());

/// Run `f` while holding the process-wide code generator lock.
pub fn with_codegen_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = CODEGEN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    f()
}
