//! `print` and `write` lowering.
//!
//! Values go out one after another through the printing helpers, with the
//! separator written before every value but the first and the terminator
//! written last. Only literal separators are honored.

use super::CodeGenerator;
use crate::asr::{ExprId, ExprKind, KindTag, Ttype};
use crate::compiler::runtime::{self, RuntimeHelper};
use crate::compiler::slots::scalar_val_type;
use crate::compiler::wasm::{op, ValType};
use crate::{Error, Result};

const DEFAULT_SEPARATOR: &str = " ";
const DEFAULT_END: &str = "\n";

impl CodeGenerator<'_> {
    pub(super) fn emit_print(
        &mut self,
        values: &[ExprId],
        separator: Option<ExprId>,
        end: Option<ExprId>,
    ) -> Result<()> {
        let separator = self.literal_or(separator, DEFAULT_SEPARATOR, "separator");
        let end = self.literal_or(end, DEFAULT_END, "end");

        for (i, &value) in values.iter().enumerate() {
            if i > 0 {
                self.write(&separator);
            }
            self.emit_print_value(value, &separator)?;
        }
        self.write(&end);
        Ok(())
    }

    fn literal_or(&mut self, expr: Option<ExprId>, default: &str, what: &str) -> String {
        let Some(expr) = expr else {
            return default.to_string();
        };
        match self.asr.kind(expr) {
            ExprKind::StringConstant(s) => s.clone(),
            _ => {
                self.warn(
                    format!("non-literal {} is not supported; using {:?}", what, default),
                    Some(self.asr.loc(expr)),
                );
                default.to_string()
            }
        }
    }

    fn write(&mut self, text: &str) {
        runtime::write_literal(&mut self.asm, &mut self.slots, text);
    }

    fn emit_print_value(&mut self, value: ExprId, separator: &str) -> Result<()> {
        let asr = self.asr;
        if let ExprKind::StringConstant(s) = asr.kind(value) {
            self.write(s);
            return Ok(());
        }
        let ty = asr.ty(value);
        if !ty.is_array() {
            self.emit_expr(value)?;
            return self.emit_print_top(ty);
        }

        // Element order is column-major whatever the storage order
        let layout = self.layout(ty)?;
        let offsets = layout.element_offsets(self.storage_order(value));
        let elem = ty.element().clone();
        for (e, offset) in offsets.into_iter().enumerate() {
            if e > 0 {
                self.write(separator);
            }
            self.emit_array_base(value)?;
            if offset != 0 {
                self.asm.i32_const(offset as i32);
                self.asm.emit(op::I32_ADD);
            }
            self.emit_element_load(&elem)?;
            self.emit_print_top(&elem)?;
        }
        Ok(())
    }

    /// Print the scalar of type `ty` on top of the stack
    fn emit_print_top(&mut self, ty: &Ttype) -> Result<()> {
        let t = scalar_val_type(ty)?;
        match ty.tag() {
            KindTag::Integer | KindTag::Logical => {
                if t == ValType::I32 {
                    self.asm.emit(op::I64_EXTEND_I32_S);
                }
                let helper = self.runtime.request(RuntimeHelper::PrintI64);
                self.asm.call(helper);
            }
            KindTag::Real => {
                if t == ValType::F32 {
                    self.asm.emit(op::F64_PROMOTE_F32);
                }
                let helper = self.runtime.request(RuntimeHelper::PrintF64);
                self.asm.call(helper);
            }
            KindTag::Complex => {
                let helper = self.runtime.request(RuntimeHelper::PrintF64);
                self.with_scratch(t, |g, im| {
                    g.asm.global_set(im);
                    g.write("(");
                    if t == ValType::F32 {
                        g.asm.emit(op::F64_PROMOTE_F32);
                    }
                    g.asm.call(helper);
                    g.write(",");
                    g.asm.global_get(im);
                    if t == ValType::F32 {
                        g.asm.emit(op::F64_PROMOTE_F32);
                    }
                    g.asm.call(helper);
                    g.write(")");
                    Ok(())
                })?;
            }
            KindTag::Character => {
                return Err(Error::codegen(
                    "character values other than literals cannot be printed",
                ))
            }
        }
        Ok(())
    }
}
