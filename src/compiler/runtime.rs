//! # Runtime helpers
//!
//! Small functions synthesized into the module on demand: decimal printing
//! and complex arithmetic. The host provides only process exit and a
//! vectored write, so everything else is generated here.
//!
//! ## Protocol
//!
//! ```text
//! prototype phase   user functions declared; helper base index fixed
//! body phase        request(h) -> index = base + first-use order
//! after bodies      emit_used(): types, declarations, bodies in that order
//! ```
//!
//! A helper's index is known the moment it is first requested, so calls can
//! be emitted before the helper exists. Helpers that call other helpers
//! request them together (`print_f64` pulls in `print_i64`).

use super::slots::{SlotAllocator, DIGIT_STRIDE};
use super::wasm::{op, Assembler, BlockType, ValType};
use crate::Result;

/// Host module every import comes from
pub const HOST_MODULE: &str = "wasi_snapshot_preview1";

/// Index of the `proc_exit(code: i32)` import
pub const PROC_EXIT: u32 = 0;

/// Index of the `fd_write(fd, iovs, iovs_len, nwritten) -> errno` import
pub const FD_WRITE: u32 = 1;

const STDOUT: i32 = 1;

/// Declare the two host imports. Must run before any function declaration.
pub fn declare_imports(asm: &mut Assembler) {
    let exit_ty = asm.emit_function_type(&[ValType::I32], &[]);
    asm.emit_import(HOST_MODULE, "proc_exit", exit_ty);
    let write_ty = asm.emit_function_type(
        &[ValType::I32, ValType::I32, ValType::I32, ValType::I32],
        &[ValType::I32],
    );
    asm.emit_import(HOST_MODULE, "fd_write", write_ty);
}

/// Write the string whose descriptor sits at `descriptor` to stdout.
/// The byte count lands in the reserved word at address 0.
pub fn write_descriptor(asm: &mut Assembler, descriptor: u32) {
    asm.i32_const(STDOUT);
    asm.i32_const(descriptor as i32);
    asm.i32_const(1);
    asm.i32_const(0);
    asm.call(FD_WRITE);
    asm.drop_();
}

/// Intern `text` and write it
pub fn write_literal(asm: &mut Assembler, slots: &mut SlotAllocator, text: &str) {
    let descriptor = slots.intern_string(text.as_bytes());
    write_descriptor(asm, descriptor);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuntimeHelper {
    PrintI64,
    PrintF64,
    AddC32,
    AddC64,
    SubC32,
    SubC64,
    MulC32,
    MulC64,
    AbsC32,
    AbsC64,
    EqC32,
    EqC64,
}

impl RuntimeHelper {
    pub const COUNT: usize = 12;

    pub const ALL: [RuntimeHelper; Self::COUNT] = [
        RuntimeHelper::PrintI64,
        RuntimeHelper::PrintF64,
        RuntimeHelper::AddC32,
        RuntimeHelper::AddC64,
        RuntimeHelper::SubC32,
        RuntimeHelper::SubC64,
        RuntimeHelper::MulC32,
        RuntimeHelper::MulC64,
        RuntimeHelper::AbsC32,
        RuntimeHelper::AbsC64,
        RuntimeHelper::EqC32,
        RuntimeHelper::EqC64,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RuntimeHelper::PrintI64 => "print_i64",
            RuntimeHelper::PrintF64 => "print_f64",
            RuntimeHelper::AddC32 => "add_c32",
            RuntimeHelper::AddC64 => "add_c64",
            RuntimeHelper::SubC32 => "sub_c32",
            RuntimeHelper::SubC64 => "sub_c64",
            RuntimeHelper::MulC32 => "mul_c32",
            RuntimeHelper::MulC64 => "mul_c64",
            RuntimeHelper::AbsC32 => "abs_c32",
            RuntimeHelper::AbsC64 => "abs_c64",
            RuntimeHelper::EqC32 => "eq_c32",
            RuntimeHelper::EqC64 => "eq_c64",
        }
    }

    fn position(self) -> usize {
        self as usize
    }

    /// Part type of a complex helper
    fn part(self) -> ValType {
        match self {
            RuntimeHelper::AddC32
            | RuntimeHelper::SubC32
            | RuntimeHelper::MulC32
            | RuntimeHelper::AbsC32
            | RuntimeHelper::EqC32 => ValType::F32,
            _ => ValType::F64,
        }
    }

    /// Parameter and result types
    pub fn signature(self) -> (Vec<ValType>, Vec<ValType>) {
        let t = self.part();
        match self {
            RuntimeHelper::PrintI64 => (vec![ValType::I64], vec![]),
            RuntimeHelper::PrintF64 => (vec![ValType::F64], vec![]),
            RuntimeHelper::AddC32
            | RuntimeHelper::AddC64
            | RuntimeHelper::SubC32
            | RuntimeHelper::SubC64
            | RuntimeHelper::MulC32
            | RuntimeHelper::MulC64 => (vec![t; 4], vec![t, t]),
            RuntimeHelper::AbsC32 | RuntimeHelper::AbsC64 => (vec![t, t], vec![t]),
            RuntimeHelper::EqC32 | RuntimeHelper::EqC64 => (vec![t; 4], vec![ValType::I32]),
        }
    }

    /// Scratch locals after the parameters
    fn locals(self) -> Vec<ValType> {
        match self {
            RuntimeHelper::PrintI64 => vec![ValType::I64],
            RuntimeHelper::PrintF64 => vec![ValType::I64; 3],
            _ => Vec::new(),
        }
    }

    /// Helpers this one calls
    fn dependencies(self) -> &'static [RuntimeHelper] {
        match self {
            RuntimeHelper::PrintF64 => &[RuntimeHelper::PrintI64],
            _ => &[],
        }
    }

    /// Complex helper for an arithmetic operator at part width `t`
    pub fn complex(op: ComplexOp, t: ValType) -> RuntimeHelper {
        let wide = t == ValType::F64;
        match (op, wide) {
            (ComplexOp::Add, false) => RuntimeHelper::AddC32,
            (ComplexOp::Add, true) => RuntimeHelper::AddC64,
            (ComplexOp::Sub, false) => RuntimeHelper::SubC32,
            (ComplexOp::Sub, true) => RuntimeHelper::SubC64,
            (ComplexOp::Mul, false) => RuntimeHelper::MulC32,
            (ComplexOp::Mul, true) => RuntimeHelper::MulC64,
            (ComplexOp::Abs, false) => RuntimeHelper::AbsC32,
            (ComplexOp::Abs, true) => RuntimeHelper::AbsC64,
            (ComplexOp::Eq, false) => RuntimeHelper::EqC32,
            (ComplexOp::Eq, true) => RuntimeHelper::EqC64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexOp {
    Add,
    Sub,
    Mul,
    Abs,
    Eq,
}

/// Used-with-order table
#[derive(Debug, Clone)]
pub struct RuntimeTable {
    order: [Option<u32>; RuntimeHelper::COUNT],
    used: Vec<RuntimeHelper>,
    base: u32,
}

impl RuntimeTable {
    pub fn new() -> Self {
        Self {
            order: [None; RuntimeHelper::COUNT],
            used: Vec::new(),
            base: 0,
        }
    }

    /// Function index of the first helper. Fixed once every user function
    /// has been declared.
    pub fn set_base(&mut self, base: u32) {
        debug_assert!(self.used.is_empty(), "helper base moved after first request");
        self.base = base;
    }

    /// Function index of `helper`, marking it used on first request
    pub fn request(&mut self, helper: RuntimeHelper) -> u32 {
        let index = match self.order[helper.position()] {
            Some(order) => order,
            None => {
                let order = self.used.len() as u32;
                self.order[helper.position()] = Some(order);
                self.used.push(helper);
                tracing::trace!(helper = helper.name(), order, "runtime helper requested");
                for dep in helper.dependencies() {
                    self.request(*dep);
                }
                order
            }
        };
        self.base + index
    }

    pub fn is_used(&self, helper: RuntimeHelper) -> bool {
        self.order[helper.position()].is_some()
    }

    /// Helpers in first-use order
    pub fn used(&self) -> &[RuntimeHelper] {
        &self.used
    }

    /// Declare and emit every used helper, in first-use order. User function
    /// bodies must all be finished.
    pub fn emit_used(&mut self, asm: &mut Assembler, slots: &mut SlotAllocator) -> Result<()> {
        let helpers = self.used.clone();
        for (order, helper) in helpers.iter().enumerate() {
            let (params, results) = helper.signature();
            let ty = asm.emit_function_type(&params, &results);
            let index = asm.declare_function(ty, helper.name());
            debug_assert_eq!(index, self.base + order as u32);
        }
        for helper in helpers {
            let index = self.request(helper);
            asm.begin_function(index, &helper.locals());
            self.emit_body(asm, slots, helper);
            asm.end_function()?;
        }
        tracing::debug!(count = self.used.len(), "runtime helpers emitted");
        Ok(())
    }

    fn emit_body(&mut self, asm: &mut Assembler, slots: &mut SlotAllocator, helper: RuntimeHelper) {
        match helper {
            RuntimeHelper::PrintI64 => emit_print_i64(asm, slots),
            RuntimeHelper::PrintF64 => {
                let print_i64 = self.request(RuntimeHelper::PrintI64);
                emit_print_f64(asm, slots, print_i64);
            }
            RuntimeHelper::AddC32 | RuntimeHelper::AddC64 => {
                emit_complex_add_sub(asm, helper.part(), false)
            }
            RuntimeHelper::SubC32 | RuntimeHelper::SubC64 => {
                emit_complex_add_sub(asm, helper.part(), true)
            }
            RuntimeHelper::MulC32 | RuntimeHelper::MulC64 => emit_complex_mul(asm, helper.part()),
            RuntimeHelper::AbsC32 | RuntimeHelper::AbsC64 => emit_complex_abs(asm, helper.part()),
            RuntimeHelper::EqC32 | RuntimeHelper::EqC64 => emit_complex_eq(asm, helper.part()),
        }
    }
}

impl Default for RuntimeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Opcode table for one float width
struct FloatOps {
    add: u8,
    sub: u8,
    mul: u8,
    sqrt: u8,
    eq: u8,
}

fn float_ops(t: ValType) -> FloatOps {
    if t == ValType::F32 {
        FloatOps {
            add: op::F32_ADD,
            sub: op::F32_SUB,
            mul: op::F32_MUL,
            sqrt: op::F32_SQRT,
            eq: op::F32_EQ,
        }
    } else {
        FloatOps {
            add: op::F64_ADD,
            sub: op::F64_SUB,
            mul: op::F64_MUL,
            sqrt: op::F64_SQRT,
            eq: op::F64_EQ,
        }
    }
}

// =============================================================================
// PRINTING
// =============================================================================

/// `print_i64(x)`; local 1 is the running power-of-ten divisor. Digits are
/// produced with unsigned division so `i64::MIN` prints correctly.
fn emit_print_i64(asm: &mut Assembler, slots: &mut SlotAllocator) {
    let digits = slots.digit_table();
    let (x, div) = (0, 1);

    asm.local_get(x);
    asm.i64_const(0);
    asm.emit(op::I64_LT_S);
    asm.if_(BlockType::Empty);
    write_literal(asm, slots, "-");
    asm.i64_const(0);
    asm.local_get(x);
    asm.emit(op::I64_SUB);
    asm.local_set(x);
    asm.end();

    // Largest power of ten not above x
    asm.i64_const(1);
    asm.local_set(div);
    asm.block(BlockType::Empty);
    asm.loop_(BlockType::Empty);
    asm.local_get(x);
    asm.local_get(div);
    asm.emit(op::I64_DIV_U);
    asm.i64_const(10);
    asm.emit(op::I64_LT_U);
    asm.br_if(1);
    asm.local_get(div);
    asm.i64_const(10);
    asm.emit(op::I64_MUL);
    asm.local_set(div);
    asm.br(0);
    asm.end();
    asm.end();

    // One digit record per power, most significant first
    asm.block(BlockType::Empty);
    asm.loop_(BlockType::Empty);
    asm.i32_const(STDOUT);
    asm.local_get(x);
    asm.local_get(div);
    asm.emit(op::I64_DIV_U);
    asm.i64_const(10);
    asm.emit(op::I64_REM_U);
    asm.emit(op::I32_WRAP_I64);
    asm.i32_const(DIGIT_STRIDE as i32);
    asm.emit(op::I32_MUL);
    asm.i32_const(digits as i32);
    asm.emit(op::I32_ADD);
    asm.i32_const(1);
    asm.i32_const(0);
    asm.call(FD_WRITE);
    asm.drop_();
    asm.local_get(div);
    asm.i64_const(10);
    asm.emit(op::I64_DIV_U);
    asm.local_tee(div);
    asm.emit(op::I64_EQZ);
    asm.br_if(1);
    asm.br(0);
    asm.end();
    asm.end();
}

/// Fractional digits printed after the decimal point
pub const FRACTION_DIGITS: u32 = 8;

/// Magnitudes from here on no longer fit the signed integer part
const EXPONENT_THRESHOLD: f64 = 9_223_372_036_854_775_808.0;

/// `print_f64(x)`: sign, integer part, `.`, then eight fractional digits
/// left-padded with zeros. NaN and infinities print as words. Magnitudes of
/// 2^63 and above are scaled into [1, 10) and print with an `e` exponent.
/// Locals: 1 = integer part, 2 = scaled fraction, 3 = decimal exponent.
fn emit_print_f64(asm: &mut Assembler, slots: &mut SlotAllocator, print_i64: u32) {
    let (x, whole, frac, exp) = (0, 1, 2, 3);

    asm.local_get(x);
    asm.local_get(x);
    asm.emit(op::F64_NE);
    asm.if_(BlockType::Empty);
    write_literal(asm, slots, "NaN");
    asm.return_();
    asm.end();

    asm.local_get(x);
    asm.f64_const(0.0);
    asm.emit(op::F64_LT);
    asm.if_(BlockType::Empty);
    write_literal(asm, slots, "-");
    asm.local_get(x);
    asm.emit(op::F64_NEG);
    asm.local_set(x);
    asm.end();

    asm.local_get(x);
    asm.f64_const(f64::INFINITY);
    asm.emit(op::F64_EQ);
    asm.if_(BlockType::Empty);
    write_literal(asm, slots, "Infinity");
    asm.return_();
    asm.end();

    asm.local_get(x);
    asm.f64_const(EXPONENT_THRESHOLD);
    asm.emit(op::F64_GE);
    asm.if_(BlockType::Empty);
    asm.block(BlockType::Empty);
    asm.loop_(BlockType::Empty);
    asm.local_get(x);
    asm.f64_const(10.0);
    asm.emit(op::F64_LT);
    asm.br_if(1);
    asm.local_get(x);
    asm.f64_const(10.0);
    asm.emit(op::F64_DIV);
    asm.local_set(x);
    asm.local_get(exp);
    asm.i64_const(1);
    asm.emit(op::I64_ADD);
    asm.local_set(exp);
    asm.br(0);
    asm.end();
    asm.end();
    asm.end();

    asm.local_get(x);
    asm.emit(op::I64_TRUNC_F64_S);
    asm.local_tee(whole);
    asm.call(print_i64);
    write_literal(asm, slots, ".");

    asm.local_get(x);
    asm.local_get(whole);
    asm.emit(op::F64_CONVERT_I64_S);
    asm.emit(op::F64_SUB);
    asm.f64_const(10f64.powi(FRACTION_DIGITS as i32));
    asm.emit(op::F64_MUL);
    asm.emit(op::I64_TRUNC_F64_S);
    asm.local_set(frac);

    let mut threshold = 10i64.pow(FRACTION_DIGITS - 1);
    while threshold > 1 {
        asm.local_get(frac);
        asm.i64_const(threshold);
        asm.emit(op::I64_LT_S);
        asm.if_(BlockType::Empty);
        write_literal(asm, slots, "0");
        asm.end();
        threshold /= 10;
    }
    asm.local_get(frac);
    asm.call(print_i64);

    asm.local_get(exp);
    asm.i64_const(0);
    asm.emit(op::I64_NE);
    asm.if_(BlockType::Empty);
    write_literal(asm, slots, "e");
    asm.local_get(exp);
    asm.call(print_i64);
    asm.end();
}

// =============================================================================
// COMPLEX ARITHMETIC
// =============================================================================

// Operands arrive as (a.re, a.im, b.re, b.im) in locals 0..4.

fn emit_complex_add_sub(asm: &mut Assembler, t: ValType, subtract: bool) {
    let ops = float_ops(t);
    let opcode = if subtract { ops.sub } else { ops.add };
    asm.local_get(0);
    asm.local_get(2);
    asm.emit(opcode);
    asm.local_get(1);
    asm.local_get(3);
    asm.emit(opcode);
}

fn emit_complex_mul(asm: &mut Assembler, t: ValType) {
    let ops = float_ops(t);
    // re = a.re*b.re - a.im*b.im
    asm.local_get(0);
    asm.local_get(2);
    asm.emit(ops.mul);
    asm.local_get(1);
    asm.local_get(3);
    asm.emit(ops.mul);
    asm.emit(ops.sub);
    // im = a.re*b.im + a.im*b.re
    asm.local_get(0);
    asm.local_get(3);
    asm.emit(ops.mul);
    asm.local_get(1);
    asm.local_get(2);
    asm.emit(ops.mul);
    asm.emit(ops.add);
}

fn emit_complex_abs(asm: &mut Assembler, t: ValType) {
    let ops = float_ops(t);
    asm.local_get(0);
    asm.local_get(0);
    asm.emit(ops.mul);
    asm.local_get(1);
    asm.local_get(1);
    asm.emit(ops.mul);
    asm.emit(ops.add);
    asm.emit(ops.sqrt);
}

fn emit_complex_eq(asm: &mut Assembler, t: ValType) {
    let ops = float_ops(t);
    asm.local_get(0);
    asm.local_get(2);
    asm.emit(ops.eq);
    asm.local_get(1);
    asm.local_get(3);
    asm.emit(ops.eq);
    asm.emit(op::I32_AND);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_order_is_first_use() {
        let mut table = RuntimeTable::new();
        table.set_base(5);
        assert_eq!(table.request(RuntimeHelper::MulC64), 5);
        assert_eq!(table.request(RuntimeHelper::AddC32), 6);
        assert_eq!(table.request(RuntimeHelper::MulC64), 5);
        assert_eq!(
            table.used(),
            &[RuntimeHelper::MulC64, RuntimeHelper::AddC32]
        );
        assert!(!table.is_used(RuntimeHelper::PrintI64));
    }

    #[test]
    fn test_print_f64_pulls_in_print_i64() {
        let mut table = RuntimeTable::new();
        table.set_base(2);
        assert_eq!(table.request(RuntimeHelper::PrintF64), 2);
        assert_eq!(table.request(RuntimeHelper::PrintI64), 3);
        assert_eq!(table.used().len(), 2);
    }

    #[test]
    fn test_emit_used_declares_in_order() {
        let mut asm = Assembler::new();
        declare_imports(&mut asm);
        let mut slots = SlotAllocator::new();
        let mut table = RuntimeTable::new();
        table.set_base(asm.function_count());
        table.request(RuntimeHelper::EqC32);
        table.request(RuntimeHelper::PrintI64);
        table.emit_used(&mut asm, &mut slots).unwrap();
        assert_eq!(asm.function_name(2), Some("eq_c32"));
        assert_eq!(asm.function_name(3), Some("print_i64"));
        // digit table plus "-"
        assert_eq!(slots.segments().len(), 11);
        assert!(asm.finish().is_ok());
    }

    #[test]
    fn test_print_f64_interns_special_words() {
        let mut asm = Assembler::new();
        declare_imports(&mut asm);
        let mut slots = SlotAllocator::new();
        let mut table = RuntimeTable::new();
        table.set_base(asm.function_count());
        table.request(RuntimeHelper::PrintF64);
        table.emit_used(&mut asm, &mut slots).unwrap();
        assert!(asm.finish().is_ok());

        let interned = |slots: &mut SlotAllocator, text: &str| {
            let before = slots.segments().len();
            slots.intern_string(text.as_bytes());
            slots.segments().len() == before
        };
        for word in ["NaN", "Infinity", "e", "."] {
            assert!(interned(&mut slots, word), "{word} not interned");
        }
    }

    #[test]
    fn test_complex_signatures() {
        let (params, results) = RuntimeHelper::MulC32.signature();
        assert_eq!(params, vec![ValType::F32; 4]);
        assert_eq!(results, vec![ValType::F32; 2]);
        let (_, results) = RuntimeHelper::EqC64.signature();
        assert_eq!(results, vec![ValType::I32]);
    }
}
