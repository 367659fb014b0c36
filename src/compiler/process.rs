//! Out-of-process code generator.
//!
//! Runs the generator scripts with an external interpreter:
//!
//! - `gen_ssig.py <source> <function>` prints a JSON list of classification
//!   codes.
//! - `standalone_compile.py <source> --kernel-name <function> --signature <sig>
//!   --num-warps <w> --num-stages <s> --device-id <d>` compiles one variant
//!   and prints its artifact directory on the last line of stdout.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use crate::compiler::{
    read_artifact, CodeGenerator, CodegenError, CompileRequest, CompiledArtifact,
};
use crate::config::JitConfig;

const SIGNATURE_SCRIPT: &str = "gen_ssig.py";
const COMPILE_SCRIPT: &str = "standalone_compile.py";

#[derive(Debug, Clone)]
pub struct ProcessCodeGenerator {
    python: PathBuf,
    script_dir: PathBuf,
    cache_dir: PathBuf,
}

impl ProcessCodeGenerator {
    pub fn new(
        python: impl Into<PathBuf>,
        script_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            python: python.into(),
            script_dir: script_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn from_config(config: &JitConfig) -> Self {
        Self::new(&config.python, &config.script_dir, &config.cache_dir)
    }

    fn run(&self, script: &str, args: Vec<OsString>) -> Result<String, CodegenError> {
        let script_path = self.script_dir.join(script);
        let mut cmd = Command::new(&self.python);
        cmd.arg(&script_path)
            .args(args)
            .env("TRITON_CACHE_DIR", &self.cache_dir);
        log::debug!("running code generator: {:?}", cmd);

        let output = cmd.output().map_err(|e| CodegenError::Spawn {
            command: format!("{} {}", self.python.display(), script_path.display()),
            reason: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(CodegenError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// The generator may print diagnostics first; the answer is the last line.
fn last_line(stdout: &str) -> Result<&str, CodegenError> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .ok_or_else(|| CodegenError::InvalidOutput("empty output".to_string()))
}

impl CodeGenerator for ProcessCodeGenerator {
    fn derive_signature(&self, source: &str, function: &str) -> Result<Vec<i64>, CodegenError> {
        let stdout = self.run(SIGNATURE_SCRIPT, vec![source.into(), function.into()])?;
        let line = last_line(&stdout)?;
        serde_json::from_str(line)
            .map_err(|e| CodegenError::InvalidOutput(format!("{line:?}: {e}")))
    }

    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompiledArtifact, CodegenError> {
        let args: Vec<OsString> = vec![
            request.source.into(),
            "--kernel-name".into(),
            request.function.into(),
            "--signature".into(),
            request.signature.into(),
            "--num-warps".into(),
            request.num_warps.to_string().into(),
            "--num-stages".into(),
            request.num_stages.to_string().into(),
            "--device-id".into(),
            request.device.to_string().into(),
        ];
        let stdout = self.run(COMPILE_SCRIPT, args)?;
        let dir = PathBuf::from(last_line(&stdout)?);
        log::info!(
            "compiled {} [{}] into {:?}",
            request.function,
            request.signature,
            dir
        );
        read_artifact(&dir, request.function)
            .map_err(|e| CodegenError::InvalidOutput(e.to_string()))
    }
}
