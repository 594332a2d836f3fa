#![allow(clippy::only_used_in_recursion)] // Recursive tree helpers thread the arena through
#![allow(clippy::too_many_arguments)] // Emission helpers take the full lowering context
#![allow(clippy::needless_range_loop)] // Axis indices are needed for bound lookups
//! # asrwasm - typed ASR to WebAssembly
//!
//! Rewrite passes and a code generator that lower a fully typed,
//! shape-annotated array IR (ASR) to a WebAssembly module runnable by any
//! WASI-style host.
//!
//! ## Features
//!
//! - **Array rewrite passes**: implied-do loops, initializer hoisting,
//!   array temporaries with shape inference, constructor expansion,
//!   element loops and counted-loop lowering
//! - **Two-phase code generation**: every signature is registered before
//!   any body is emitted, so procedures may call each other in any order
//! - **Lazy runtime helpers**: complex arithmetic and print formatting are
//!   synthesized only when used, in first-use order
//! - **Deterministic output**: the same tree always yields the same bytes
//! - **Self-checking**: the emitted module is decoded again and verified
//!
//! ## Quick Start
//!
//! ```rust
//! use asrwasm::{compile, Asr, AsrBuilder};
//!
//! # fn main() -> asrwasm::Result<()> {
//! let mut asr = Asr::new();
//! let mut b = AsrBuilder::new(&mut asr);
//! let (main, _) = b.program("main");
//! let answer = b.i32(42);
//! let print = b.print(vec![answer]);
//! b.set_body(main, vec![print]);
//!
//! let bytes = compile(&mut asr)?;
//! assert_eq!(&bytes[..4], b"\0asm");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ASR → passes → codegen (prototypes, bodies, helpers) → bytes → verifier
//! ```
//!
//! ### Main Components
//!
//! - [`asr`] - the IR arenas, types, builder and traversal helpers
//! - [`passes`] - IR-to-IR rewrites run in a fixed order
//! - [`compiler`] - code generator, bytecode assembler, decoder and verifier
//! - [`Diagnostics`] - warnings and errors collected during compilation
//!
//! ## Error Handling
//!
//! Every stage returns [`Result`]. [`Compiler::compile`] never fails
//! outright: the first error is recorded as a diagnostic and the result
//! carries no bytes.
//!
//! ```rust
//! use asrwasm::{Asr, AsrBuilder, CompileOptions, Compiler, Ttype};
//!
//! let mut asr = Asr::new();
//! let mut b = AsrBuilder::new(&mut asr);
//! let (main, scope) = b.program("main");
//! let ty = b.fixed_array_type(Ttype::f64(), &[4]).allocatable();
//! let a = b.variable(scope, "a", ty);
//! let a = b.var(a);
//! let print = b.print(vec![a]);
//! b.set_body(main, vec![print]);
//!
//! let result = Compiler::new(CompileOptions::default()).compile(&mut asr);
//! assert!(!result.is_success());
//! assert!(result.diagnostics.has_errors());
//! ```

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod asr;
pub mod compiler;
pub mod diagnostics;
pub mod error;
pub mod passes;

// Re-export main types
pub use asr::{Asr, AsrBuilder, Ttype};
pub use compiler::{compile, CompileOptions, CompileResult, Compiler, TimeReport};
pub use diagnostics::{Diagnostic, Diagnostics, Level, Stage};
pub use error::{Error, Result};
pub use passes::{run_passes, PassManager, PassOptions};

#[cfg(test)]
pub(crate) mod test_utils {
    use std::sync::Once;

    static INIT: Once = Once::new();

    /// Route `tracing` output to the test harness; honours `RUST_LOG`
    pub fn init_test_logging() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}
