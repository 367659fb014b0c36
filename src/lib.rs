//! kernel-jit: just-in-time kernel dispatch.
//!
//! Takes a named kernel function and a list of heterogeneous call arguments,
//! derives a textual signature from them, finds or compiles the matching
//! binary variant, packs the arguments into a launch-ready buffer and
//! launches the kernel on a device stream.
//!
//! - **Argument classification**: [`SignatureBuilder`] folds constexpr
//!   arguments into the signature, adds divisibility hints to specialized
//!   ones and packs the rest.
//! - **Packing**: [`ParameterBuffer`] lays values out at their natural
//!   alignment and hands out one pointer per value.
//! - **Compile once**: [`KernelRegistry`] and [`JitFunction`] cache functions
//!   and variants; concurrent misses on one key compile once.
//! - **Launch**: [`CompiledKernel`] loads its module lazily through a
//!   [`DeviceBackend`].
//!
//! # Quick Start
//!
//! ```ignore
//! use kernel_jit::{kernel_args, ArrayRef, JitConfig, KernelRegistry, LaunchParams};
//!
//! let registry = KernelRegistry::cuda(JitConfig::from_env()?)?;
//! let x = unsafe { ArrayRef::typed::<f32>(x_ptr, n) };
//! let y = unsafe { ArrayRef::typed::<f32>(y_ptr, n) };
//! let out = unsafe { ArrayRef::typed::<f32>(out_ptr, n) };
//! registry.call(
//!     "kernels/add.py",
//!     "add_kernel",
//!     &LaunchParams::elementwise(n as u64, 1024)?,
//!     &kernel_args![x, y, out, n as i64, 1024i64],
//! )?;
//! ```

pub mod backend_trait;
pub mod compiler;
pub mod config;
pub mod cuda_backend;
pub mod error;
pub mod jit_function;
pub mod kernel;
pub mod kernel_cache;
pub mod kernel_dispatcher;
pub mod param_buffer;
pub mod registry;
pub mod signature;
pub mod traits;
pub mod types;

pub use backend_trait::{
    BackendError, BackendResult, ContextBinding, DeviceBackend, DeviceIndex, FunctionHandle,
    ModuleHandle, ScopedDevice, StreamHandle,
};
pub use compiler::{
    with_codegen_lock, CodeGenerator, CodegenError, CompileCache, CompileRequest,
    CompiledArtifact, ProcessCodeGenerator,
};
pub use config::JitConfig;
pub use cuda_backend::CudaDriverBackend;
pub use error::{JitError, JitResult};
pub use jit_function::{JitFunction, VariantKey};
pub use kernel::CompiledKernel;
pub use kernel_cache::kernel_cache_dir;
pub use kernel_dispatcher::{grid_for, LaunchParams};
pub use param_buffer::{LaunchArgs, ParameterBuffer};
pub use registry::KernelRegistry;
pub use signature::{ScratchSlots, SignatureBuilder, NULLOPT};
pub use traits::Element;
pub use types::{ArgKind, ArrayRef, DType, KernelArg, Scalar, ScalarValue, StaticSignature};
