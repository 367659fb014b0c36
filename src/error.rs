use std::path::PathBuf;

use thiserror::Error;

use crate::backend_trait::BackendError;
use crate::types::DType;

#[derive(Debug, Clone, Error)]
pub enum JitError {
    #[error("failed to extract static signature of {function}: {reason}")]
    SignatureExtractionFailed { function: String, reason: String },
    #[error("unsupported element type {0:?}")]
    UnsupportedElementType(DType),
    #[error("unsupported scalar kind: {0}")]
    UnsupportedScalarKind(&'static str),
    #[error("symbolic scalar {0} cannot be passed to a kernel")]
    SymbolicValueUnsupported(String),
    #[error("invalid classification of argument {index}: {reason}")]
    InvalidClassification { index: usize, reason: String },
    #[error("failed to compile {function} for signature \"{signature}\": {reason}")]
    CompilationFailed {
        function: String,
        signature: String,
        reason: String,
    },
    #[error("failed to load {entry_point} from {}: {source}", artifact.display())]
    ModuleLoadFailed {
        artifact: PathBuf,
        entry_point: String,
        source: BackendError,
    },
    #[error("failed to launch {entry_point} from {}: {source}", artifact.display())]
    LaunchFailed {
        artifact: PathBuf,
        entry_point: String,
        source: BackendError,
    },
    #[error("concurrent insertion detected for cache key {0}")]
    CacheInsertionRace(String),
    #[error("build of cache entry {0} panicked")]
    BuildPanicked(String),
    #[error("invalid artifact at {}: {reason}", path.display())]
    InvalidArtifact { path: PathBuf, reason: String },
    #[error("device error: {0}")]
    Device(#[from] BackendError),
    #[error("invalid config: {0}")]
    Config(String),
}

pub type JitResult<T> = Result<T, JitError>;
