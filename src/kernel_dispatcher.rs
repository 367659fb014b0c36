//! Call path: classify arguments, pack them, find or compile the variant,
//! launch it.
//!
//! ```text
//! args ──SignatureBuilder──▶ (ParameterBuffer, "*fp32:16,*fp32:16,i64")
//!      ──bind device──▶ current device
//!      ──get_kernel(sig, warps, stages, device)──▶ CompiledKernel
//!      ──launch(grid, warps, stream, buffer pointers)
//! ```
//!
//! Classification errors surface before the device or the code generator is
//! touched.

use std::ffi::c_void;

use crate::backend_trait::{DeviceIndex, ScopedDevice, StreamHandle};
use crate::error::{JitError, JitResult};
use crate::jit_function::JitFunction;
use crate::registry::KernelRegistry;
use crate::signature::SignatureBuilder;
use crate::types::KernelArg;

pub const DEFAULT_NUM_WARPS: u32 = 4;
pub const DEFAULT_NUM_STAGES: u32 = 3;

/// Number of blocks covering `numel` elements with `tile` elements each.
///
/// Fails for a zero tile and for counts that do not fit a grid dimension.
pub fn grid_for(numel: u64, tile: u32) -> JitResult<u32> {
    if tile == 0 {
        return Err(JitError::Config("tile size must be non-zero".to_string()));
    }
    let blocks = numel.div_ceil(u64::from(tile));
    u32::try_from(blocks).map_err(|_| {
        JitError::Config(format!(
            "{numel} elements in tiles of {tile} need {blocks} blocks, more than a grid holds"
        ))
    })
}

/// Launch configuration chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchParams {
    pub stream: StreamHandle,
    pub grid: (u32, u32, u32),
    pub num_warps: u32,
    pub num_stages: u32,
    /// Target device. Falls back to the first array argument's device, then
    /// to the stream's context.
    pub device: Option<DeviceIndex>,
}

impl Default for LaunchParams {
    fn default() -> Self {
        Self {
            stream: StreamHandle::DEFAULT,
            grid: (1, 1, 1),
            num_warps: DEFAULT_NUM_WARPS,
            num_stages: DEFAULT_NUM_STAGES,
            device: None,
        }
    }
}

impl LaunchParams {
    pub fn new(grid: (u32, u32, u32)) -> Self {
        Self {
            grid,
            ..Self::default()
        }
    }

    /// One-dimensional grid of `ceil(numel / tile)` blocks.
    pub fn elementwise(numel: u64, tile: u32) -> JitResult<Self> {
        Ok(Self::new((grid_for(numel, tile)?, 1, 1)))
    }

    pub fn with_stream(mut self, stream: StreamHandle) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_num_warps(mut self, num_warps: u32) -> Self {
        self.num_warps = num_warps;
        self
    }

    pub fn with_num_stages(mut self, num_stages: u32) -> Self {
        self.num_stages = num_stages;
        self
    }

    pub fn on_device(mut self, device: DeviceIndex) -> Self {
        self.device = Some(device);
        self
    }
}

impl JitFunction {
    /// Launch this function with `args`, compiling a variant if needed.
    ///
    /// Returns once the launch is enqueued; completion is the caller's
    /// business.
    pub fn call(&self, params: &LaunchParams, args: &[KernelArg]) -> JitResult<()> {
        let mut builder = SignatureBuilder::new(self.static_sig());
        builder.handle_args(args)?;
        builder.append_scratch(self.scratch());
        let (mut buffer, signature) = builder.finish()?;

        let backend = self.backend.as_ref();
        let target = params
            .device
            .or_else(|| args.iter().find_map(KernelArg::device));
        let _scope = match target {
            Some(device) => ScopedDevice::bind(backend, Some(device))?,
            None if params.stream != StreamHandle::DEFAULT => {
                ScopedDevice::bind_stream(backend, params.stream)?
            }
            None => ScopedDevice::bind(backend, None)?,
        };
        let device = backend.current_device()?;

        let kernel =
            self.get_kernel(&signature, params.num_warps, params.num_stages, device)?;
        let mut ptrs = buffer.get_ptrs();
        // SAFETY: every pointer addresses a value packed for this signature,
        // and array addresses were vouched for when their ArrayRef was built.
        unsafe {
            kernel.launch(
                params.grid,
                params.num_warps,
                params.stream,
                ptrs.as_mut_slice(),
            )
        }
    }

    /// Launch with a precomputed signature and argument pointers, on the
    /// device owning `stream`.
    ///
    /// # Safety
    /// `args` must match `signature` and the scratch slots the variant
    /// expects, each pointing at a live value of the right type.
    pub unsafe fn launch_with_raw_args(
        &self,
        stream: StreamHandle,
        grid: (u32, u32, u32),
        num_warps: u32,
        num_stages: u32,
        signature: &str,
        args: &mut [*mut c_void],
    ) -> JitResult<()> {
        let backend = self.backend.as_ref();
        let _scope = ScopedDevice::bind_stream(backend, stream)?;
        let device = backend.current_device()?;
        let kernel = self.get_kernel(signature, num_warps, num_stages, device)?;
        kernel.launch(grid, num_warps, stream, args)
    }
}

impl KernelRegistry {
    /// Look up `source:name` and launch it.
    pub fn call(
        &self,
        source: &str,
        name: &str,
        params: &LaunchParams,
        args: &[KernelArg],
    ) -> JitResult<()> {
        self.get_instance(source, name)?.call(params, args)
    }
}
