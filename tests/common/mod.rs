//! In-process stand-ins for the code generator and the device driver.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kernel_jit::{
    BackendError, BackendResult, CodeGenerator, CodegenError, CompileRequest, CompiledArtifact,
    ContextBinding, DeviceBackend, DeviceIndex, FunctionHandle, JitConfig, KernelRegistry,
    ModuleHandle, ScratchSlots, StreamHandle,
};
use tempfile::TempDir;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ── Code generator ───────────────────────────────────────────────────

pub struct FakeCodegen {
    /// function name → classification codes
    signatures: HashMap<String, Vec<i64>>,
    root: TempDir,
    pub derive_calls: AtomicUsize,
    pub compile_calls: AtomicUsize,
    pub compiled: Mutex<Vec<(String, String, u32, u32, DeviceIndex)>>,
    pub fail_compile: AtomicBool,
    pub compile_delay: Mutex<Duration>,
    pub shared_mem_bytes: AtomicUsize,
    pub arch: AtomicUsize,
}

impl FakeCodegen {
    pub fn new(signatures: &[(&str, &[i64])]) -> Self {
        Self {
            signatures: signatures
                .iter()
                .map(|(name, codes)| (name.to_string(), codes.to_vec()))
                .collect(),
            root: tempfile::tempdir().unwrap(),
            derive_calls: AtomicUsize::new(0),
            compile_calls: AtomicUsize::new(0),
            compiled: Mutex::new(Vec::new()),
            fail_compile: AtomicBool::new(false),
            compile_delay: Mutex::new(Duration::ZERO),
            shared_mem_bytes: AtomicUsize::new(0),
            arch: AtomicUsize::new(80),
        }
    }

    pub fn compiles(&self) -> usize {
        self.compile_calls.load(Ordering::SeqCst)
    }

    pub fn last_signature(&self) -> Option<String> {
        self.compiled.lock().unwrap().last().map(|c| c.1.clone())
    }
}

impl CodeGenerator for FakeCodegen {
    fn derive_signature(&self, _source: &str, function: &str) -> Result<Vec<i64>, CodegenError> {
        self.derive_calls.fetch_add(1, Ordering::SeqCst);
        self.signatures
            .get(function)
            .cloned()
            .ok_or_else(|| CodegenError::Failed {
                status: "exit status: 1".to_string(),
                stderr: format!("no kernel named {function}"),
            })
    }

    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompiledArtifact, CodegenError> {
        let n = self.compile_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.compile_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.fail_compile.load(Ordering::SeqCst) {
            return Err(CodegenError::Failed {
                status: "exit status: 1".to_string(),
                stderr: format!("cannot compile {}", request.signature),
            });
        }
        self.compiled.lock().unwrap().push((
            request.function.to_string(),
            request.signature.to_string(),
            request.num_warps,
            request.num_stages,
            request.device,
        ));

        let dir: PathBuf = self.root.path().join(format!("variant-{n}"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(format!("{}.cubin", request.function)),
            b"\x7fELF fake",
        )
        .unwrap();
        Ok(CompiledArtifact {
            dir,
            entry_point: request.function.to_string(),
            shared_mem_bytes: self.shared_mem_bytes.load(Ordering::SeqCst) as u32,
            arch: self.arch.load(Ordering::SeqCst) as u32,
            warp_size: 32,
        })
    }
}

// ── Device backend ───────────────────────────────────────────────────

thread_local! {
    /// Device whose context is current on this thread, plus one; 0 = none.
    static CURRENT: Cell<usize> = const { Cell::new(0) };
}

#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub function: FunctionHandle,
    pub device: DeviceIndex,
    pub grid: (u32, u32, u32),
    pub block: (u32, u32, u32),
    pub shared_mem_bytes: u32,
    pub stream: StreamHandle,
    /// First 8 bytes behind each argument pointer.
    pub args: Vec<[u8; 8]>,
}

impl LaunchRecord {
    pub fn arg_u64(&self, i: usize) -> u64 {
        u64::from_ne_bytes(self.args[i])
    }

    pub fn arg_i64(&self, i: usize) -> i64 {
        i64::from_ne_bytes(self.args[i])
    }
}

/// Stream `n > 0` belongs to device `n - 1`.
pub struct FakeBackend {
    pub compute_capability: u32,
    pub loads: AtomicUsize,
    pub shared_attr: Mutex<Vec<u32>>,
    pub launches: Mutex<Vec<LaunchRecord>>,
    pub binds: AtomicUsize,
    pub fail_launch: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::with_compute_capability(80)
    }

    pub fn with_compute_capability(compute_capability: u32) -> Self {
        Self {
            compute_capability,
            loads: AtomicUsize::new(0),
            shared_attr: Mutex::new(Vec::new()),
            launches: Mutex::new(Vec::new()),
            binds: AtomicUsize::new(0),
            fail_launch: AtomicBool::new(false),
        }
    }

    pub fn last_launch(&self) -> LaunchRecord {
        self.launches.lock().unwrap().last().cloned().expect("no launch recorded")
    }

    pub fn num_launches(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    /// Device current on the calling thread, if any.
    pub fn current() -> Option<DeviceIndex> {
        match CURRENT.with(Cell::get) {
            0 => None,
            n => Some(DeviceIndex(n as i32 - 1)),
        }
    }

    fn swap_current(device: Option<DeviceIndex>) -> ContextBinding {
        let raw = device.map_or(0, |d| d.0 as usize + 1);
        let previous = CURRENT.with(|c| c.replace(raw));
        ContextBinding::from_raw((previous != 0).then_some(previous))
    }
}

impl DeviceBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn bind_device(&self, device: Option<DeviceIndex>) -> BackendResult<ContextBinding> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = device {
            if d.0 < 0 || d.0 > 7 {
                return Err(BackendError::InvalidDevice(d.0));
            }
        }
        let target = device.or(Self::current()).unwrap_or(DeviceIndex(0));
        Ok(Self::swap_current(Some(target)))
    }

    fn bind_stream(&self, stream: StreamHandle) -> BackendResult<ContextBinding> {
        if stream == StreamHandle::DEFAULT {
            return self.bind_device(None);
        }
        self.binds.fetch_add(1, Ordering::SeqCst);
        Ok(Self::swap_current(Some(DeviceIndex(stream.as_raw() as i32 - 1))))
    }

    fn restore_binding(&self, previous: ContextBinding) -> BackendResult<()> {
        let raw = previous.as_raw().unwrap_or(0);
        CURRENT.with(|c| c.set(raw));
        Ok(())
    }

    fn current_device(&self) -> BackendResult<DeviceIndex> {
        Self::current().ok_or(BackendError::NoContext)
    }

    fn compute_capability(&self, _device: DeviceIndex) -> BackendResult<u32> {
        Ok(self.compute_capability)
    }

    fn load_module(&self, image: &[u8]) -> BackendResult<ModuleHandle> {
        if !image.starts_with(b"\x7fELF") {
            return Err(BackendError::Cuda("CUDA_ERROR_INVALID_IMAGE".to_string()));
        }
        let n = self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(ModuleHandle::from_raw(0x1000 + n))
    }

    fn get_function(&self, module: ModuleHandle, _name: &str) -> BackendResult<FunctionHandle> {
        Ok(FunctionHandle::from_raw(module.as_raw() + 1))
    }

    fn set_max_dynamic_shared_memory(
        &self,
        _function: FunctionHandle,
        bytes: u32,
    ) -> BackendResult<()> {
        self.shared_attr.lock().unwrap().push(bytes);
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
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(BackendError::Cuda("CUDA_ERROR_LAUNCH_OUT_OF_RESOURCES".to_string()));
        }
        // Every value the tests pack is 8 bytes wide.
        let args = args
            .iter()
            .map(|&p| std::ptr::read_unaligned(p as *const [u8; 8]))
            .collect();
        self.launches.lock().unwrap().push(LaunchRecord {
            function,
            device: self.current_device()?,
            grid,
            block,
            shared_mem_bytes,
            stream,
            args,
        });
        Ok(())
    }
}

// ── Wiring ───────────────────────────────────────────────────────────

pub struct Harness {
    pub codegen: Arc<FakeCodegen>,
    pub backend: Arc<FakeBackend>,
    pub registry: KernelRegistry,
}

pub fn harness(signatures: &[(&str, &[i64])]) -> Harness {
    harness_with(signatures, ScratchSlots::Global, FakeBackend::new())
}

pub fn harness_with(
    signatures: &[(&str, &[i64])],
    scratch: ScratchSlots,
    backend: FakeBackend,
) -> Harness {
    init_logging();
    let codegen = Arc::new(FakeCodegen::new(signatures));
    let backend = Arc::new(backend);
    let config = JitConfig {
        scratch,
        ..JitConfig::default()
    };
    let registry = KernelRegistry::new(config, codegen.clone(), backend.clone());
    Harness {
        codegen,
        backend,
        registry,
    }
}

/// Fake device address: `base` picks a 1 MiB region, `offset` a byte in it.
/// Region starts are 16-byte aligned.
pub fn device_addr(base: u64, offset: u64) -> u64 {
    0x7f00_0000_0000 + base * 0x10_0000 + offset
}
