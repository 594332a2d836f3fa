//! # ASR to WebAssembly compiler
//!
//! Drives a typed ASR through the rewrite passes, the code generator and the
//! module verifier.
//!
//! ## Architecture
//!
//! ```text
//! ASR → passes (temporaries, implied-do, loop lowering) → codegen → bytes → verify
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use asrwasm::compiler::{CompileOptions, Compiler};
//!
//! let compiler = Compiler::new(CompileOptions::default());
//! let result = compiler.compile(&mut asr);
//! for d in result.diagnostics.iter() {
//!     eprintln!("{}", d);
//! }
//! std::fs::write("program.wasm", result.into_bytes()?)?;
//! ```

pub mod codegen;
pub mod debug;
pub mod runtime;
pub mod slots;
pub mod verifier;
pub mod wasm;

pub use codegen::{generate, CodegenOptions, CodegenOutput};
pub use debug::{debug_compile, debug_report, disassemble, hexdump};
pub use runtime::RuntimeHelper;
pub use verifier::{ModuleStats, Verifier, VerifyError, VerifyResult};

use crate::asr::Asr;
use crate::diagnostics::{Diagnostics, Stage};
use crate::passes::{PassManager, PassOptions, PassTiming};
use crate::{Error, Result};
use std::time::{Duration, Instant};

/// Compilation options
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Rewrite pass configuration
    pub passes: PassOptions,
    /// Collect a [`TimeReport`]
    pub time_report: bool,
    /// Re-decode and verify the emitted module
    pub verify_module: bool,
    /// Minimum linear memory size in 64 KiB pages
    pub memory_pages: u32,
    /// Export every procedure by name
    pub export_functions: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            passes: PassOptions::default(),
            time_report: false,
            verify_module: true,
            memory_pages: 1,
            export_functions: false,
        }
    }
}

/// Wall-clock time spent in each stage
#[derive(Debug, Clone, Default)]
pub struct TimeReport {
    pub passes: Vec<PassTiming>,
    pub codegen: Duration,
    pub verify: Duration,
    pub total: Duration,
}

impl TimeReport {
    /// Sum of the per-pass durations
    pub fn pass_total(&self) -> Duration {
        self.passes.iter().map(|p| p.elapsed).sum()
    }
}

/// Compilation result with metadata
#[derive(Debug)]
pub struct CompileResult {
    /// Module bytes; `None` when compilation failed
    pub bytes: Option<Vec<u8>>,
    /// Warnings, plus one error record when compilation failed
    pub diagnostics: Diagnostics,
    /// Error that stopped compilation, also recorded in `diagnostics`
    pub error: Option<Error>,
    /// Verification result of the emitted module
    pub verification: Option<VerifyResult>,
    /// Runtime helpers present in the module, in function-table order
    pub helpers: Vec<RuntimeHelper>,
    pub time_report: Option<TimeReport>,
}

impl CompileResult {
    pub fn is_success(&self) -> bool {
        self.bytes.is_some()
    }

    /// The module bytes, or the error that prevented them
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match (self.bytes, self.error) {
            (Some(bytes), _) => Ok(bytes),
            (None, Some(err)) => Err(err),
            (None, None) => Err(Error::internal("compilation produced neither bytes nor an error")),
        }
    }
}

/// ASR to WebAssembly compiler
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Rewrite `asr` in place and lower it to a module.
    ///
    /// Never fails outright: the first error any stage returns is recorded
    /// as an error diagnostic and kept in [`CompileResult::error`].
    pub fn compile(&self, asr: &mut Asr) -> CompileResult {
        let started = Instant::now();
        let mut diagnostics = Diagnostics::new();
        let mut report = TimeReport::default();
        let mut verification = None;
        let mut helpers = Vec::new();

        let outcome = self.run(asr, &mut diagnostics, &mut report, &mut verification, &mut helpers);
        report.total = started.elapsed();

        let (bytes, error) = match outcome {
            Ok(bytes) => (Some(bytes), None),
            Err((stage, err)) => {
                tracing::debug!(?stage, error = %err, "compilation failed");
                diagnostics.push_error(stage, &err);
                (None, Some(err))
            }
        };
        CompileResult {
            bytes,
            diagnostics,
            error,
            verification,
            helpers,
            time_report: self.options.time_report.then_some(report),
        }
    }

    fn run(
        &self,
        asr: &mut Asr,
        diagnostics: &mut Diagnostics,
        report: &mut TimeReport,
        verification: &mut Option<VerifyResult>,
        helpers: &mut Vec<RuntimeHelper>,
    ) -> std::result::Result<Vec<u8>, (Stage, Error)> {
        // Phase 1: Rewrite passes
        let mut passes = PassManager::new(self.options.passes.clone())
            .with_timing(self.options.time_report || self.options.passes.verbose);
        let pass_result = passes.run(asr, diagnostics);
        report.passes = passes.timings().to_vec();
        pass_result.map_err(|e| (Stage::Pass, e))?;

        // Phase 2: Code generation
        let started = Instant::now();
        let output = codegen::generate(
            asr,
            CodegenOptions {
                memory_pages: self.options.memory_pages,
                export_functions: self.options.export_functions,
            },
        )
        .map_err(|e| (Stage::CodeGen, e))?;
        report.codegen = started.elapsed();
        diagnostics.extend(output.diagnostics);
        *helpers = output.helpers;

        // Phase 3: Verify
        if self.options.verify_module {
            let started = Instant::now();
            let result = Verifier::new().verify(&output.bytes);
            report.verify = started.elapsed();
            for warning in &result.warnings {
                diagnostics.warning(Stage::Verify, warning.clone(), None);
            }
            if !result.valid {
                let messages: Vec<String> = result.errors.iter().map(|e| e.to_string()).collect();
                *verification = Some(result);
                return Err((Stage::Verify, Error::Verification(messages.join("; "))));
            }
            *verification = Some(result);
        }

        tracing::debug!(bytes = output.bytes.len(), "compilation finished");
        Ok(output.bytes)
    }
}

/// Compile with default options, returning the module bytes
pub fn compile(asr: &mut Asr) -> Result<Vec<u8>> {
    Compiler::new(CompileOptions::default()).compile(asr).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{AsrBuilder, Ttype};
    use crate::diagnostics::Level;

    #[test]
    fn test_compile_empty_program() {
        crate::test_utils::init_test_logging();
        let mut asr = Asr::new();
        AsrBuilder::new(&mut asr).program("main");
        let result = Compiler::new(CompileOptions::default()).compile(&mut asr);
        assert!(result.is_success(), "{:?}", result.error);
        let verification = result.verification.as_ref().unwrap();
        assert!(verification.valid);
        assert!(result.time_report.is_none());
    }

    #[test]
    fn test_failure_becomes_one_error_diagnostic() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, scope) = b.program("main");
        let alloc_ty = b.fixed_array_type(Ttype::real(8), &[4]).allocatable();
        let a = b.variable(scope, "a", alloc_ty);
        let a = b.var(a);
        let x = b.f64(1.0);
        let one = b.i32(1);
        let item = b.item(a, &[one]);
        let assign = b.assign(item, x);
        b.set_body(main, vec![assign]);

        let result = Compiler::new(CompileOptions::default()).compile(&mut asr);
        assert!(!result.is_success());
        let errors: Vec<_> = result
            .diagnostics
            .iter()
            .filter(|d| d.level == Level::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, Stage::CodeGen);
        assert!(matches!(result.into_bytes(), Err(Error::CodeGen { .. })));
    }

    #[test]
    fn test_time_report_is_collected_on_request() {
        let mut asr = Asr::new();
        AsrBuilder::new(&mut asr).program("main");
        let options = CompileOptions {
            time_report: true,
            ..Default::default()
        };
        let result = Compiler::new(options).compile(&mut asr);
        let report = result.time_report.unwrap();
        assert!(!report.passes.is_empty());
        assert!(report.total >= report.codegen);
    }
}
