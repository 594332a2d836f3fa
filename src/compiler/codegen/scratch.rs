//! Scratch registers.
//!
//! The operand stack cannot hold one value aside while another is computed
//! in place, so a few mutable globals per value type shuttle values across
//! such sequences (complex negation, element stores, call write-backs).
//! They are allocated once, before any other global.
//!
//! Expression evaluation is strictly sequential, so a register is free again
//! as soon as its holder releases it. Holding one across the evaluation of
//! an arbitrary sub-expression is not allowed: the sub-expression may need
//! the same register.

use crate::compiler::wasm::{Assembler, ConstValue, ValType};
use crate::{Error, Result};

/// Registers per value type: `i32` holds addresses, so it gets more
const POOL: [(ValType, u32); 4] = [
    (ValType::I32, 4),
    (ValType::I64, 2),
    (ValType::F32, 2),
    (ValType::F64, 2),
];

#[derive(Debug, Clone)]
struct Register {
    ty: ValType,
    global: u32,
    busy: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScratchPool {
    registers: Vec<Register>,
}

impl ScratchPool {
    /// Declare every register as a zero-initialized mutable global
    pub fn declare(asm: &mut Assembler) -> Self {
        let mut registers = Vec::new();
        for (ty, count) in POOL {
            for _ in 0..count {
                let global = asm.declare_global(ConstValue::zero(ty), true);
                registers.push(Register {
                    ty,
                    global,
                    busy: false,
                });
            }
        }
        Self { registers }
    }

    /// Claim a free register of type `ty`; returns its global index
    pub fn acquire(&mut self, ty: ValType) -> Result<u32> {
        match self.registers.iter_mut().find(|r| r.ty == ty && !r.busy) {
            Some(r) => {
                r.busy = true;
                Ok(r.global)
            }
            None => Err(Error::codegen(format!(
                "too many values held in {} scratch registers at once",
                ty.name()
            ))),
        }
    }

    pub fn release(&mut self, global: u32) {
        if let Some(r) = self.registers.iter_mut().find(|r| r.global == global) {
            r.busy = false;
        }
    }

    /// Whether every register is free; holds between statements
    pub fn is_idle(&self) -> bool {
        self.registers.iter().all(|r| !r.busy)
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_come_first() {
        let mut asm = Assembler::new();
        let pool = ScratchPool::declare(&mut asm);
        assert_eq!(pool.len(), 10);
        assert_eq!(asm.global_count(), 10);
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let mut asm = Assembler::new();
        let mut pool = ScratchPool::declare(&mut asm);
        let a = pool.acquire(ValType::F64).unwrap();
        let b = pool.acquire(ValType::F64).unwrap();
        assert_ne!(a, b);
        assert!(matches!(
            pool.acquire(ValType::F64),
            Err(Error::CodeGen { .. })
        ));
        pool.release(a);
        assert_eq!(pool.acquire(ValType::F64).unwrap(), a);
        pool.release(a);
        pool.release(b);
        assert!(pool.is_idle());
    }
}
