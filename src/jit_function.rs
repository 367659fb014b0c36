//! A JIT-compiled kernel function and its compiled variants.

use std::fmt;
use std::sync::Arc;

use crate::backend_trait::{DeviceBackend, DeviceIndex};
use crate::compiler::{with_codegen_lock, CodeGenerator, CompileCache, CompileRequest};
use crate::error::{JitError, JitResult};
use crate::kernel::CompiledKernel;
use crate::signature::ScratchSlots;
use crate::types::StaticSignature;

/// Cache key of a compiled variant.
///
/// Warp and stage counts change the generated code, so they are part of the
/// key alongside the signature and device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey {
    pub signature: String,
    pub device: DeviceIndex,
    pub num_warps: u32,
    pub num_stages: u32,
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{};{}",
            self.signature, self.device, self.num_warps, self.num_stages
        )
    }
}

/// One kernel function at a source location.
///
/// Holds the static classification of its parameters, derived once from the
/// code generator, and every variant compiled for it so far.
pub struct JitFunction {
    source: String,
    name: String,
    static_sig: StaticSignature,
    overloads: CompileCache<VariantKey, CompiledKernel>,
    codegen: Arc<dyn CodeGenerator>,
    pub(crate) backend: Arc<dyn DeviceBackend>,
    scratch: ScratchSlots,
}

impl fmt::Debug for JitFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JitFunction")
            .field("source", &self.source)
            .field("name", &self.name)
            .field("static_sig", &self.static_sig)
            .field("num_overloads", &self.num_overloads())
            .finish()
    }
}

impl JitFunction {
    /// Ask the code generator for the parameter classification of
    /// `source:name`.
    pub fn new(
        source: &str,
        name: &str,
        codegen: Arc<dyn CodeGenerator>,
        backend: Arc<dyn DeviceBackend>,
        scratch: ScratchSlots,
    ) -> JitResult<Self> {
        let codes = with_codegen_lock(|| codegen.derive_signature(source, name)).map_err(|e| {
            JitError::SignatureExtractionFailed {
                function: format!("{source}:{name}"),
                reason: e.to_string(),
            }
        })?;
        let static_sig = StaticSignature::from_codes(name, &codes)?;
        log::debug!(
            "static signature of {}:{} = {:?}",
            source,
            name,
            static_sig.kinds()
        );

        Ok(Self {
            source: source.to_string(),
            name: name.to_string(),
            static_sig,
            overloads: CompileCache::new(),
            codegen,
            backend,
            scratch,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn static_sig(&self) -> &StaticSignature {
        &self.static_sig
    }

    pub fn scratch(&self) -> ScratchSlots {
        self.scratch
    }

    /// Number of variants compiled so far.
    pub fn num_overloads(&self) -> usize {
        self.overloads.len()
    }

    /// The variant for `signature`, compiling it on first request.
    ///
    /// Concurrent requests for the same key compile once; the others wait for
    /// that result.
    pub fn get_kernel(
        &self,
        signature: &str,
        num_warps: u32,
        num_stages: u32,
        device: DeviceIndex,
    ) -> JitResult<Arc<CompiledKernel>> {
        let key = VariantKey {
            signature: signature.to_string(),
            device,
            num_warps,
            num_stages,
        };
        self.overloads.get_or_try_insert_with(&key, || {
            log::info!("compiling {} for {}", self.name, key);
            let request = CompileRequest {
                source: &self.source,
                function: &self.name,
                signature,
                num_warps,
                num_stages,
                device,
            };
            let artifact = with_codegen_lock(|| self.codegen.compile(&request)).map_err(|e| {
                JitError::CompilationFailed {
                    function: self.name.clone(),
                    signature: signature.to_string(),
                    reason: e.to_string(),
                }
            })?;
            Ok(CompiledKernel::new(artifact, device, self.backend.clone()))
        })
    }
}
