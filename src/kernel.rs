//! One compiled variant of a JIT function.

use std::ffi::c_void;
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend_trait::{
    BackendError, DeviceBackend, DeviceIndex, FunctionHandle, ModuleHandle, StreamHandle,
};
use crate::compiler::CompiledArtifact;
use crate::error::{JitError, JitResult};
use crate::kernel_cache::artifact_binary_path;

/// Static shared memory a block may use without opting in.
pub const DEFAULT_SHARED_MEM_LIMIT: u32 = 48 * 1024;

#[derive(Debug, Clone, Copy)]
struct LoadedFunction {
    module: ModuleHandle,
    function: FunctionHandle,
}

/// A compiled binary for one (signature, warps, stages, device) key.
///
/// Nothing touches the device until the first launch, which loads the module
/// into the current context and keeps the handle for later launches.
pub struct CompiledKernel {
    artifact: CompiledArtifact,
    device: DeviceIndex,
    backend: Arc<dyn DeviceBackend>,
    loaded: Mutex<Option<LoadedFunction>>,
}

impl std::fmt::Debug for CompiledKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledKernel")
            .field("artifact", &self.artifact)
            .field("device", &self.device)
            .field("backend", &self.backend.name())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl CompiledKernel {
    pub fn new(
        artifact: CompiledArtifact,
        device: DeviceIndex,
        backend: Arc<dyn DeviceBackend>,
    ) -> Self {
        Self {
            artifact,
            device,
            backend,
            loaded: Mutex::new(None),
        }
    }

    pub fn device(&self) -> DeviceIndex {
        self.device
    }

    pub fn shared_mem_bytes(&self) -> u32 {
        self.artifact.shared_mem_bytes
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Module handle, once the first launch has loaded it.
    pub fn module(&self) -> Option<ModuleHandle> {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|l| l.module)
    }

    fn module_error(&self, source: BackendError) -> JitError {
        JitError::ModuleLoadFailed {
            artifact: self.artifact.dir.clone(),
            entry_point: self.artifact.entry_point.clone(),
            source,
        }
    }

    fn launch_error(&self, source: BackendError) -> JitError {
        JitError::LaunchFailed {
            artifact: self.artifact.dir.clone(),
            entry_point: self.artifact.entry_point.clone(),
            source,
        }
    }

    /// Threads per block for `num_warps` warps.
    pub fn block_dim(&self, num_warps: u32) -> JitResult<u32> {
        let warp_size = self.artifact.warp_size;
        num_warps.checked_mul(warp_size).ok_or_else(|| {
            self.launch_error(BackendError::BlockTooLarge {
                num_warps,
                warp_size,
            })
        })
    }

    fn ensure_loaded(&self) -> JitResult<FunctionHandle> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(l) = loaded.as_ref() {
            return Ok(l.function);
        }

        let device_sm = self
            .backend
            .compute_capability(self.device)
            .map_err(|e| self.module_error(e))?;
        if self.artifact.arch > device_sm {
            log::warn!(
                "{} was compiled for sm_{} but device {} is sm_{}",
                self.artifact.entry_point,
                self.artifact.arch,
                self.device,
                device_sm
            );
            return Err(self.module_error(BackendError::IncompatibleArch {
                artifact: self.artifact.arch,
                device: self.device,
                device_sm,
            }));
        }

        let binary = artifact_binary_path(&self.artifact.dir, &self.artifact.entry_point);
        let image = std::fs::read(&binary).map_err(|e| JitError::InvalidArtifact {
            path: binary.clone(),
            reason: e.to_string(),
        })?;

        let module = self
            .backend
            .load_module(&image)
            .map_err(|e| self.module_error(e))?;
        let function = self
            .backend
            .get_function(module, &self.artifact.entry_point)
            .map_err(|e| self.module_error(e))?;

        if self.artifact.shared_mem_bytes > DEFAULT_SHARED_MEM_LIMIT {
            self.backend
                .set_max_dynamic_shared_memory(function, self.artifact.shared_mem_bytes)
                .map_err(|e| self.module_error(e))?;
        }

        log::debug!(
            "loaded {} from {:?} on device {} ({} bytes shared)",
            self.artifact.entry_point,
            binary,
            self.device,
            self.artifact.shared_mem_bytes
        );
        *loaded = Some(LoadedFunction { module, function });
        Ok(function)
    }

    /// Launch on `stream` with a block of `num_warps` warps.
    ///
    /// The context of this kernel's device must be current on the calling
    /// thread.
    ///
    /// # Safety
    /// `args` must hold one pointer per launch-visible kernel parameter, each
    /// pointing at a live value of that parameter's type.
    pub unsafe fn launch(
        &self,
        grid: (u32, u32, u32),
        num_warps: u32,
        stream: StreamHandle,
        args: &mut [*mut c_void],
    ) -> JitResult<()> {
        let block = (self.block_dim(num_warps)?, 1, 1);
        let function = self.ensure_loaded()?;
        log::trace!(
            "launching {} grid={:?} block={:?} args={}",
            self.artifact.entry_point,
            grid,
            block,
            args.len()
        );
        self.backend
            .launch(
                function,
                grid,
                block,
                self.artifact.shared_mem_bytes,
                stream,
                args,
            )
            .map_err(|e| self.launch_error(e))
    }
}
