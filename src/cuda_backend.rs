//! CUDA driver backend.
//!
//! Thin layer over the raw driver API exposed by `cudarc::driver::result`.
//! Contexts are the per-device primary contexts, retained on first use and
//! released when the backend is dropped.

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::ptr;
use std::sync::{Mutex, PoisonError};

use cudarc::driver::{result, sys};

use crate::backend_trait::{
    BackendError, BackendResult, ContextBinding, DeviceBackend, DeviceIndex, FunctionHandle,
    ModuleHandle, StreamHandle,
};

pub struct CudaDriverBackend {
    device_count: i32,
    /// ordinal → retained primary context
    primary: Mutex<HashMap<i32, usize>>,
}

impl CudaDriverBackend {
    pub fn new() -> BackendResult<Self> {
        result::init()?;
        let device_count = result::device::get_count()?;
        log::info!("CUDA driver initialized, {} device(s)", device_count);
        Ok(Self {
            device_count,
            primary: Mutex::new(HashMap::new()),
        })
    }

    fn device(&self, index: DeviceIndex) -> BackendResult<sys::CUdevice> {
        if index.0 < 0 || index.0 >= self.device_count {
            return Err(BackendError::InvalidDevice(index.0));
        }
        Ok(result::device::get(index.0)?)
    }

    fn primary_context(&self, index: DeviceIndex) -> BackendResult<sys::CUcontext> {
        let mut primary = self.primary.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(&ctx) = primary.get(&index.0) {
            return Ok(ctx as sys::CUcontext);
        }
        let device = self.device(index)?;
        let ctx = unsafe { result::primary_ctx::retain(device) }?;
        log::debug!("retained primary context for device {}", index);
        primary.insert(index.0, ctx as usize);
        Ok(ctx)
    }

    fn current_binding() -> BackendResult<ContextBinding> {
        let current = result::ctx::get_current()?;
        Ok(ContextBinding(current.map(|ctx| ctx as usize)))
    }

    fn set_current(ctx: sys::CUcontext) -> BackendResult<()> {
        unsafe { result::ctx::set_current(ctx) }?;
        Ok(())
    }
}

impl DeviceBackend for CudaDriverBackend {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn bind_device(&self, device: Option<DeviceIndex>) -> BackendResult<ContextBinding> {
        let previous = Self::current_binding()?;
        match device {
            Some(index) => Self::set_current(self.primary_context(index)?)?,
            None if previous.0.is_none() => {
                Self::set_current(self.primary_context(DeviceIndex(0))?)?
            }
            None => {}
        }
        Ok(previous)
    }

    fn bind_stream(&self, stream: StreamHandle) -> BackendResult<ContextBinding> {
        if stream == StreamHandle::DEFAULT {
            return self.bind_device(None);
        }
        let previous = Self::current_binding()?;
        let mut ctx: sys::CUcontext = ptr::null_mut();
        unsafe { sys::cuStreamGetCtx(stream.0 as sys::CUstream, &mut ctx).result() }?;
        Self::set_current(ctx)?;
        Ok(previous)
    }

    fn restore_binding(&self, previous: ContextBinding) -> BackendResult<()> {
        let ctx = previous
            .0
            .map_or(ptr::null_mut(), |raw| raw as sys::CUcontext);
        Self::set_current(ctx)
    }

    fn current_device(&self) -> BackendResult<DeviceIndex> {
        if result::ctx::get_current()?.is_none() {
            return Err(BackendError::NoContext);
        }
        let mut device: sys::CUdevice = 0;
        unsafe { sys::cuCtxGetDevice(&mut device).result() }?;
        Ok(DeviceIndex(device))
    }

    fn compute_capability(&self, index: DeviceIndex) -> BackendResult<u32> {
        let device = self.device(index)?;
        let (major, minor) = unsafe {
            (
                result::device::get_attribute(
                    device,
                    sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR,
                )?,
                result::device::get_attribute(
                    device,
                    sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR,
                )?,
            )
        };
        Ok((major * 10 + minor) as u32)
    }

    fn load_module(&self, image: &[u8]) -> BackendResult<ModuleHandle> {
        let module = unsafe { result::module::load_data(image.as_ptr() as *const c_void) }?;
        Ok(ModuleHandle(module as usize))
    }

    fn get_function(&self, module: ModuleHandle, name: &str) -> BackendResult<FunctionHandle> {
        let c_name =
            CString::new(name).map_err(|_| BackendError::InvalidKernelName(name.to_string()))?;
        let function =
            unsafe { result::module::get_function(module.0 as sys::CUmodule, c_name) }?;
        Ok(FunctionHandle(function as usize))
    }

    fn set_max_dynamic_shared_memory(
        &self,
        function: FunctionHandle,
        bytes: u32,
    ) -> BackendResult<()> {
        unsafe {
            result::function::set_function_attribute(
                function.0 as sys::CUfunction,
                sys::CUfunction_attribute::CU_FUNC_ATTRIBUTE_MAX_DYNAMIC_SHARED_SIZE_BYTES,
                bytes as i32,
            )
        }?;
        Ok(())
    }

    unsafe fn launch(
        &self,
        function: FunctionHandle,
        grid: (u32, u32, u32),
        block: (u32, u32, u32),
        shared_mem_bytes: u32,
        stream: StreamHandle,
        args: &mut [*mut c_void],
    ) -> BackendResult<()> {
        result::launch_kernel(
            function.0 as sys::CUfunction,
            grid,
            block,
            shared_mem_bytes,
            stream.0 as sys::CUstream,
            args,
        )?;
        Ok(())
    }
}

impl Drop for CudaDriverBackend {
    fn drop(&mut self) {
        let primary = self.primary.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (&ordinal, _) in primary.iter() {
            let released = result::device::get(ordinal)
                .and_then(|device| unsafe { result::primary_ctx::release(device) });
            if let Err(e) = released {
                log::warn!(
                    "Failed to release primary context of device {}: {:?}",
                    ordinal,
                    e
                );
            }
        }
    }
}
