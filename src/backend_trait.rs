//! Device backend seam: context binding, module loading and kernel launch.
//!
//! The JIT runtime never talks to a driver directly. Everything it needs from
//! the device side goes through [`DeviceBackend`], which keeps the dispatch
//! logic testable without a GPU and leaves room for other drivers.

use std::ffi::c_void;
use std::fmt;

use cudarc::driver::DriverError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("cuda driver error: {0}")]
    Cuda(String),
    #[error("no device context is bound to the calling thread")]
    NoContext,
    #[error("invalid device ordinal {0}")]
    InvalidDevice(i32),
    #[error("artifact targets sm_{artifact} but device {device} is sm_{device_sm}")]
    IncompatibleArch {
        artifact: u32,
        device: DeviceIndex,
        device_sm: u32,
    },
    #[error("{num_warps} warps of {warp_size} threads exceed the block size limit")]
    BlockTooLarge { num_warps: u32, warp_size: u32 },
    #[error("invalid kernel name: {0}")]
    InvalidKernelName(String),
    #[error("unimplemented backend feature: {0}")]
    Unimplemented(&'static str),
}

pub type BackendResult<T> = Result<T, BackendError>;

impl From<DriverError> for BackendError {
    fn from(err: DriverError) -> Self {
        BackendError::Cuda(format!("{err:?}"))
    }
}

/// Ordinal of a device as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIndex(pub i32);

impl fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(pub(crate) usize);

impl ModuleHandle {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionHandle(pub(crate) usize);

impl FunctionHandle {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }
}

/// A device queue. The zero handle is the legacy default stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamHandle(pub(crate) usize);

impl StreamHandle {
    pub const DEFAULT: StreamHandle = StreamHandle(0);

    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }
}

/// The context that was current on this thread before a bind, so it can be
/// put back afterwards. `None` means no context was current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextBinding(pub(crate) Option<usize>);

impl ContextBinding {
    pub fn from_raw(raw: Option<usize>) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> Option<usize> {
        self.0
    }
}

pub trait DeviceBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Make a context for `device` current on the calling thread. With
    /// `None`, keep whatever is current, or bind device 0 if nothing is.
    /// Returns the previous binding.
    fn bind_device(&self, device: Option<DeviceIndex>) -> BackendResult<ContextBinding>;

    /// Make the context that owns `stream` current on the calling thread.
    fn bind_stream(&self, stream: StreamHandle) -> BackendResult<ContextBinding>;

    fn restore_binding(&self, previous: ContextBinding) -> BackendResult<()>;

    /// Device of the context current on the calling thread.
    fn current_device(&self) -> BackendResult<DeviceIndex>;

    /// Compute capability as `major * 10 + minor`.
    fn compute_capability(&self, device: DeviceIndex) -> BackendResult<u32>;

    /// Load a binary image into the current context.
    fn load_module(&self, image: &[u8]) -> BackendResult<ModuleHandle>;

    fn get_function(&self, module: ModuleHandle, name: &str) -> BackendResult<FunctionHandle>;

    fn set_max_dynamic_shared_memory(
        &self,
        _function: FunctionHandle,
        _bytes: u32,
    ) -> BackendResult<()> {
        Err(BackendError::Unimplemented("set_max_dynamic_shared_memory"))
    }

    /// Enqueue a kernel.
    ///
    /// # Safety
    /// Every entry of `args` must point at a live value laid out as the
    /// kernel's corresponding parameter, and any device addresses among
    /// them must stay valid until the kernel completes.
    unsafe fn launch(
        &self,
        function: FunctionHandle,
        grid: (u32, u32, u32),
        block: (u32, u32, u32),
        shared_mem_bytes: u32,
        stream: StreamHandle,
        args: &mut [*mut c_void],
    ) -> BackendResult<()>;
}

/// Binds a device context for the lifetime of the guard and restores the
/// previous binding on drop.
pub struct ScopedDevice<'a> {
    backend: &'a dyn DeviceBackend,
    previous: Option<ContextBinding>,
}

impl<'a> ScopedDevice<'a> {
    pub fn bind(
        backend: &'a dyn DeviceBackend,
        device: Option<DeviceIndex>,
    ) -> BackendResult<Self> {
        let previous = backend.bind_device(device)?;
        Ok(Self {
            backend,
            previous: Some(previous),
        })
    }

    pub fn bind_stream(
        backend: &'a dyn DeviceBackend,
        stream: StreamHandle,
    ) -> BackendResult<Self> {
        let previous = backend.bind_stream(stream)?;
        Ok(Self {
            backend,
            previous: Some(previous),
        })
    }
}

impl Drop for ScopedDevice<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            if let Err(e) = self.backend.restore_binding(previous) {
                log::warn!(
                    "Failed to restore device context on {}: {}",
                    self.backend.name(),
                    e
                );
            }
        }
    }
}
