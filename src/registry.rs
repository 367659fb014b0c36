//! Registry of JIT functions.
//!
//! One [`JitFunction`] per `"{source}:{name}"`, created on first request and
//! kept for the registry's lifetime. The registry is an ordinary value: the
//! caller decides how widely to share it, usually behind an `Arc`.

use std::sync::Arc;

use crate::backend_trait::DeviceBackend;
use crate::compiler::{CodeGenerator, CompileCache, ProcessCodeGenerator};
use crate::config::JitConfig;
use crate::cuda_backend::CudaDriverBackend;
use crate::error::JitResult;
use crate::jit_function::JitFunction;

pub struct KernelRegistry {
    config: JitConfig,
    codegen: Arc<dyn CodeGenerator>,
    backend: Arc<dyn DeviceBackend>,
    functions: CompileCache<String, JitFunction>,
}

impl KernelRegistry {
    pub fn new(
        config: JitConfig,
        codegen: Arc<dyn CodeGenerator>,
        backend: Arc<dyn DeviceBackend>,
    ) -> Self {
        log::info!(
            "kernel registry on {} backend, {} scratch slot(s)",
            backend.name(),
            config.scratch.count()
        );
        Self {
            config,
            codegen,
            backend,
            functions: CompileCache::new(),
        }
    }

    /// Registry backed by the CUDA driver and the out-of-process generator
    /// described by `config`.
    pub fn cuda(config: JitConfig) -> JitResult<Self> {
        let backend = Arc::new(CudaDriverBackend::new()?);
        let codegen = Arc::new(ProcessCodeGenerator::from_config(&config));
        Ok(Self::new(config, codegen, backend))
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn DeviceBackend> {
        &self.backend
    }

    /// The function `name` defined at `source`, registering it on first use.
    ///
    /// The same `(source, name)` always yields the same instance.
    pub fn get_instance(&self, source: &str, name: &str) -> JitResult<Arc<JitFunction>> {
        let key = format!("{source}:{name}");
        self.functions.get_or_try_insert_with(&key, || {
            log::debug!("registering {}", key);
            JitFunction::new(
                source,
                name,
                self.codegen.clone(),
                self.backend.clone(),
                self.config.scratch,
            )
        })
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
