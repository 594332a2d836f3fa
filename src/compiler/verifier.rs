//! # Module Verifier
//!
//! Re-decodes an emitted module and checks the structural properties the
//! code generator is supposed to guarantee. This does not replace a full
//! validator (no operand-stack typing); it catches the mistakes a lowering
//! bug actually produces: misordered sections, a body missing for a
//! declared function, unbalanced `block`/`end`, branches past the
//! outermost label, and out-of-range function, global or local indices.

use super::codegen::{MEMORY_EXPORT, START_EXPORT};
use super::wasm::decoder::Operand;
use super::wasm::opcodes::section;
use super::wasm::{decode_instructions, decode_module, op, DecodedModule, PAGE_SIZE};

/// Verification result with warnings
#[derive(Debug)]
pub struct VerifyResult {
    /// Module is structurally sound
    pub valid: bool,
    /// Problems that make the module unusable
    pub errors: Vec<VerifyError>,
    /// Warnings (non-fatal)
    pub warnings: Vec<String>,
    pub stats: ModuleStats,
}

/// Module statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ModuleStats {
    /// Encoded module size in bytes
    pub module_size: usize,
    pub import_count: usize,
    /// Functions with a body
    pub defined_count: usize,
    pub global_count: usize,
    /// Instructions across all bodies, final `end`s included
    pub instruction_count: usize,
    pub call_count: usize,
    /// Deepest structured nesting in any body
    pub max_nesting: usize,
    /// Bytes initialized by data segments
    pub data_bytes: usize,
    pub memory_pages: u32,
}

/// Verification error types
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyError {
    /// The bytes do not decode at all.
    Malformed(String),

    /// A section id appears after one that must follow it.
    SectionOrder {
        /// Section seen first
        previous: u8,
        /// Section that appeared out of order
        found: u8,
    },

    /// Function and code sections disagree.
    BodyCountMismatch { declared: usize, bodies: usize },

    /// A body's structured control does not nest.
    UnbalancedControl {
        /// Function index
        function: u32,
        /// Module offset of the offending instruction, or of the body end
        offset: usize,
    },

    /// `br`/`br_if` names a label that is not open.
    BranchOutOfRange {
        function: u32,
        offset: usize,
        depth: u32,
        /// Labels open at the branch, the function frame included
        open: usize,
    },

    /// `call` to a function index that does not exist.
    CallOutOfRange {
        function: u32,
        offset: usize,
        index: u32,
        count: usize,
    },

    /// `global.get`/`global.set` of a missing global.
    GlobalOutOfRange {
        function: u32,
        offset: usize,
        index: u32,
        count: usize,
    },

    /// `local.*` of a missing local.
    LocalOutOfRange {
        function: u32,
        offset: usize,
        index: u32,
        count: usize,
    },

    /// A data segment extends past the declared memory.
    DataOutOfBounds { offset: u32, end: u64, memory: u64 },
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::Malformed(message) => write!(f, "Malformed module: {}", message),
            VerifyError::SectionOrder { previous, found } => write!(
                f,
                "Section '{}' after '{}'",
                section::name(*found),
                section::name(*previous)
            ),
            VerifyError::BodyCountMismatch { declared, bodies } => write!(
                f,
                "{} functions declared but {} bodies present",
                declared, bodies
            ),
            VerifyError::UnbalancedControl { function, offset } => write!(
                f,
                "Unbalanced control in function {} at offset {}",
                function, offset
            ),
            VerifyError::BranchOutOfRange {
                function,
                offset,
                depth,
                open,
            } => write!(
                f,
                "Branch depth {} with {} labels open in function {} at offset {}",
                depth, open, function, offset
            ),
            VerifyError::CallOutOfRange {
                function,
                offset,
                index,
                count,
            } => write!(
                f,
                "Call to function {} of {} in function {} at offset {}",
                index, count, function, offset
            ),
            VerifyError::GlobalOutOfRange {
                function,
                offset,
                index,
                count,
            } => write!(
                f,
                "Global {} of {} in function {} at offset {}",
                index, count, function, offset
            ),
            VerifyError::LocalOutOfRange {
                function,
                offset,
                index,
                count,
            } => write!(
                f,
                "Local {} of {} in function {} at offset {}",
                index, count, function, offset
            ),
            VerifyError::DataOutOfBounds {
                offset,
                end,
                memory,
            } => write!(
                f,
                "Data segment at {} ends at {} past memory of {} bytes",
                offset, end, memory
            ),
        }
    }
}

/// Open structured construct while scanning a body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Function,
    Block,
    Loop,
    If,
}

/// Structural module verifier
#[derive(Debug, Default)]
pub struct Verifier {
    /// Treat warnings as errors
    strict: bool,
}

impl Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable strict mode
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Verify encoded module bytes
    pub fn verify(&self, bytes: &[u8]) -> VerifyResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut stats = ModuleStats {
            module_size: bytes.len(),
            ..ModuleStats::default()
        };

        let module = match decode_module(bytes) {
            Ok(module) => module,
            Err(e) => {
                errors.push(VerifyError::Malformed(e.to_string()));
                return VerifyResult {
                    valid: false,
                    errors,
                    warnings,
                    stats,
                };
            }
        };
        stats.import_count = module.imports.len();
        stats.defined_count = module.functions.len();
        stats.global_count = module.globals.len();
        stats.data_bytes = module.data.iter().map(|d| d.bytes.len()).sum();
        stats.memory_pages = module.memory.map_or(0, |(min, _)| min);

        self.check_section_order(&module, &mut errors);
        if module.functions.len() != module.bodies.len() {
            errors.push(VerifyError::BodyCountMismatch {
                declared: module.functions.len(),
                bodies: module.bodies.len(),
            });
        }
        for defined in 0..module.functions.len().min(module.bodies.len()) {
            self.check_body(&module, defined, &mut errors, &mut stats);
        }
        self.check_data(&module, &mut errors);

        if module.exported_function(START_EXPORT).is_none() {
            warnings.push(format!("No '{}' export; module has no entry point", START_EXPORT));
        }
        if !module.exports.iter().any(|e| e.name == MEMORY_EXPORT) {
            warnings.push(format!(
                "Memory is not exported as '{}'; the host cannot read output buffers",
                MEMORY_EXPORT
            ));
        }

        let valid = errors.is_empty() && (!self.strict || warnings.is_empty());
        tracing::debug!(
            valid,
            errors = errors.len(),
            warnings = warnings.len(),
            instructions = stats.instruction_count,
            "module verified"
        );
        VerifyResult {
            valid,
            errors,
            warnings,
            stats,
        }
    }

    /// Non-custom sections appear at most once, in increasing id order
    fn check_section_order(&self, module: &DecodedModule, errors: &mut Vec<VerifyError>) {
        let mut previous: Option<u8> = None;
        for &id in &module.section_order {
            if id == section::CUSTOM {
                continue;
            }
            if let Some(prev) = previous {
                if id <= prev {
                    errors.push(VerifyError::SectionOrder {
                        previous: prev,
                        found: id,
                    });
                }
            }
            previous = Some(previous.map_or(id, |p| p.max(id)));
        }
    }

    fn check_body(
        &self,
        module: &DecodedModule,
        defined: usize,
        errors: &mut Vec<VerifyError>,
        stats: &mut ModuleStats,
    ) {
        let function = (module.imports.len() + defined) as u32;
        let body = &module.bodies[defined];
        let instrs = match decode_instructions(&body.code, body.offset) {
            Ok(instrs) => instrs,
            Err(e) => {
                errors.push(VerifyError::Malformed(format!(
                    "function {}: {}",
                    function, e
                )));
                return;
            }
        };
        stats.instruction_count += instrs.len();
        let locals = module.frame(defined).map_or(0, |f| f.len());
        let functions = module.function_count();
        let globals = module.globals.len();

        let mut labels = vec![Label::Function];
        let body_end = body.offset + body.code.len();
        for (i, instr) in instrs.iter().enumerate() {
            if labels.is_empty() {
                // Code after the closing `end`
                errors.push(VerifyError::UnbalancedControl {
                    function,
                    offset: instr.offset,
                });
                return;
            }
            let index = match instr.operand {
                Operand::Index(n) => n,
                _ => 0,
            };
            match instr.opcode {
                op::BLOCK => labels.push(Label::Block),
                op::LOOP => labels.push(Label::Loop),
                op::IF => labels.push(Label::If),
                op::ELSE => {
                    if labels.last() != Some(&Label::If) {
                        errors.push(VerifyError::UnbalancedControl {
                            function,
                            offset: instr.offset,
                        });
                        return;
                    }
                }
                op::END => {
                    labels.pop();
                }
                op::BR | op::BR_IF => {
                    if index as usize >= labels.len() {
                        errors.push(VerifyError::BranchOutOfRange {
                            function,
                            offset: instr.offset,
                            depth: index,
                            open: labels.len(),
                        });
                    }
                }
                op::CALL => {
                    stats.call_count += 1;
                    if index as usize >= functions {
                        errors.push(VerifyError::CallOutOfRange {
                            function,
                            offset: instr.offset,
                            index,
                            count: functions,
                        });
                    }
                }
                op::GLOBAL_GET | op::GLOBAL_SET => {
                    if index as usize >= globals {
                        errors.push(VerifyError::GlobalOutOfRange {
                            function,
                            offset: instr.offset,
                            index,
                            count: globals,
                        });
                    }
                }
                op::LOCAL_GET | op::LOCAL_SET | op::LOCAL_TEE => {
                    if index as usize >= locals {
                        errors.push(VerifyError::LocalOutOfRange {
                            function,
                            offset: instr.offset,
                            index,
                            count: locals,
                        });
                    }
                }
                _ => {}
            }
            stats.max_nesting = stats.max_nesting.max(labels.len().saturating_sub(1));
            if labels.is_empty() && i + 1 != instrs.len() {
                errors.push(VerifyError::UnbalancedControl {
                    function,
                    offset: instr.offset,
                });
                return;
            }
        }
        if !labels.is_empty() {
            errors.push(VerifyError::UnbalancedControl {
                function,
                offset: body_end,
            });
        }
    }

    fn check_data(&self, module: &DecodedModule, errors: &mut Vec<VerifyError>) {
        let memory = module
            .memory
            .map_or(0, |(min, _)| u64::from(min) * u64::from(PAGE_SIZE));
        for segment in &module.data {
            let end = u64::from(segment.offset) + segment.bytes.len() as u64;
            if end > memory {
                errors.push(VerifyError::DataOutOfBounds {
                    offset: segment.offset,
                    end,
                    memory,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::wasm::{opcodes, Assembler, ValType};

    /// One exported `_start` whose body is produced by `body`
    fn module_with(locals: &[ValType], body: impl FnOnce(&mut Assembler)) -> Vec<u8> {
        let mut asm = Assembler::new();
        let ty = asm.emit_function_type(&[], &[]);
        let f = asm.declare_function(ty, START_EXPORT);
        asm.export_function(START_EXPORT, f);
        asm.set_memory(1, Some(1));
        asm.export_memory(MEMORY_EXPORT);
        asm.begin_function(f, locals);
        body(&mut asm);
        asm.end_function().unwrap();
        asm.finish().unwrap()
    }

    #[test]
    fn test_minimal_module_is_valid() {
        let bytes = module_with(&[], |_| {});
        let result = Verifier::new().verify(&bytes);
        assert!(result.valid, "errors: {:?}", result.errors);
        assert!(result.warnings.is_empty());
        assert_eq!(result.stats.defined_count, 1);
        assert_eq!(result.stats.instruction_count, 1);
    }

    #[test]
    fn test_branch_past_function_frame() {
        let bytes = module_with(&[], |asm| {
            asm.block(crate::compiler::wasm::BlockType::Empty);
            asm.br(2);
            asm.end();
        });
        let result = Verifier::new().verify(&bytes);
        assert!(!result.valid);
        assert!(matches!(
            result.errors[0],
            VerifyError::BranchOutOfRange { depth: 2, open: 2, .. }
        ));
        assert_eq!(result.stats.max_nesting, 1);
    }

    #[test]
    fn test_out_of_range_indices() {
        let bytes = module_with(&[ValType::I32], |asm| {
            asm.local_get(0);
            asm.drop_();
            asm.local_get(1);
            asm.drop_();
            asm.global_get(0);
            asm.drop_();
            asm.call(7);
        });
        let result = Verifier::new().verify(&bytes);
        assert_eq!(result.errors.len(), 3, "{:?}", result.errors);
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, VerifyError::LocalOutOfRange { index: 1, count: 1, .. })));
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, VerifyError::GlobalOutOfRange { index: 0, .. })));
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, VerifyError::CallOutOfRange { index: 7, count: 1, .. })));
    }

    #[test]
    fn test_section_order_violation() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&opcodes::MAGIC);
        bytes.extend_from_slice(&opcodes::VERSION);
        // Empty function section, then an empty type section
        bytes.extend_from_slice(&[section::FUNCTION, 1, 0]);
        bytes.extend_from_slice(&[section::TYPE, 1, 0]);
        let result = Verifier::new().verify(&bytes);
        assert_eq!(
            result.errors,
            vec![VerifyError::SectionOrder {
                previous: section::FUNCTION,
                found: section::TYPE
            }]
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let result = Verifier::new().verify(b"not a module");
        assert!(!result.valid);
        assert!(matches!(result.errors[0], VerifyError::Malformed(_)));
    }

    #[test]
    fn test_strict_mode_fails_on_warnings() {
        let mut asm = Assembler::new();
        asm.set_memory(1, None);
        let bytes = asm.finish().unwrap();
        assert!(Verifier::new().verify(&bytes).valid);
        let strict = Verifier::new().strict().verify(&bytes);
        assert!(!strict.valid);
        assert_eq!(strict.warnings.len(), 2);
    }
}
