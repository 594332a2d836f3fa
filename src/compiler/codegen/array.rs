//! Element addressing in linear memory.
//!
//! For an item `a(i1, ..., in)` over axes with lower bounds `l_k` and
//! extents `n_k`, the byte address is
//!
//! ```text
//! base + size * Σ (i_k - l_k) * stride_k
//! ```
//!
//! where `stride_k` is the product of the extents of the axes that vary
//! faster than `k`: the earlier ones in column-major order, the later ones
//! in row-major order. Complex elements are twice their part size.

use super::{element_size, CodeGenerator};
use crate::asr::{walk, ArrayIndex, ExprId, ExprKind, StorageOrder, Ttype};
use crate::compiler::slots::scalar_val_type;
use crate::compiler::wasm::{op, ValType};
use crate::{Error, Result};

/// Constant layout of an array type
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Layout {
    pub starts: Vec<i64>,
    pub extents: Vec<i64>,
    pub elem_size: u32,
}

impl Layout {
    /// Element stride of each axis, in elements
    pub fn strides(&self, order: StorageOrder) -> Vec<i64> {
        let n = self.extents.len();
        let mut strides = vec![1i64; n];
        match order {
            StorageOrder::ColumnMajor => {
                for k in 1..n {
                    strides[k] = strides[k - 1] * self.extents[k - 1];
                }
            }
            StorageOrder::RowMajor => {
                for k in (0..n.saturating_sub(1)).rev() {
                    strides[k] = strides[k + 1] * self.extents[k + 1];
                }
            }
        }
        strides
    }

    pub fn len(&self) -> i64 {
        self.extents.iter().product()
    }

    /// Byte offset of a constant subscript tuple
    pub fn offset_of(&self, indices: &[i64], order: StorageOrder) -> i64 {
        let strides = self.strides(order);
        indices
            .iter()
            .zip(&self.starts)
            .zip(&strides)
            .map(|((i, lo), s)| (i - lo) * s)
            .sum::<i64>()
            * self.elem_size as i64
    }

    /// Byte offset of every element in element order, the first subscript
    /// varying fastest, for storage laid out in `order`
    pub fn element_offsets(&self, order: StorageOrder) -> Vec<i64> {
        let mut subscripts = self.starts.clone();
        let mut offsets = Vec::with_capacity(self.len().max(0) as usize);
        for _ in 0..self.len() {
            offsets.push(self.offset_of(&subscripts, order));
            for (axis, s) in subscripts.iter_mut().enumerate() {
                *s += 1;
                if *s < self.starts[axis] + self.extents[axis] {
                    break;
                }
                *s = self.starts[axis];
            }
        }
        offsets
    }
}

impl CodeGenerator<'_> {
    /// Layout of a fixed-shape array type
    pub(super) fn layout(&self, ty: &Ttype) -> Result<Layout> {
        let mut starts = Vec::with_capacity(ty.rank());
        let mut extents = Vec::with_capacity(ty.rank());
        for (axis, dim) in ty.dims().iter().enumerate() {
            match (self.asr.dim_start(dim), self.asr.dim_length(dim)) {
                (Some(start), Some(length)) => {
                    starts.push(start);
                    extents.push(length);
                }
                _ => {
                    return Err(Error::codegen(format!(
                        "axis {} of an array has no compile-time bounds",
                        axis + 1
                    )))
                }
            }
        }
        Ok(Layout {
            starts,
            extents,
            elem_size: element_size(ty.element())?,
        })
    }

    /// Storage order of an array variable. Row-major when an element
    /// reference to it in the current unit says so, column-major otherwise.
    pub(super) fn storage_order(&self, array: ExprId) -> StorageOrder {
        let asr = self.asr;
        let ExprKind::Var(sym) = *asr.kind(array) else {
            return StorageOrder::ColumnMajor;
        };
        let Some(body) = self.current.and_then(|unit| asr.symbol(unit).body()) else {
            return StorageOrder::ColumnMajor;
        };
        let row_major = walk::any_expr(asr, body, |kind| match kind {
            ExprKind::ArrayItem {
                array,
                order: StorageOrder::RowMajor,
                ..
            } => matches!(asr.kind(*array), ExprKind::Var(s) if *s == sym),
            _ => false,
        });
        if row_major {
            StorageOrder::RowMajor
        } else {
            StorageOrder::ColumnMajor
        }
    }

    /// Push the byte address of `array(indices)`
    pub(super) fn emit_element_address(
        &mut self,
        array: ExprId,
        indices: &[ArrayIndex],
        order: StorageOrder,
    ) -> Result<()> {
        let asr = self.asr;
        let ty = asr.ty(array);
        let layout = self.layout(ty)?;
        if indices.len() != layout.extents.len() {
            return Err(Error::internal(format!(
                "{} subscripts for an array of rank {}",
                indices.len(),
                layout.extents.len()
            )));
        }
        let strides = layout.strides(order);

        self.emit_array_base(array)?;
        for (axis, index) in indices.iter().enumerate() {
            let subscript = match (index.left, index.right, index.step) {
                (None, Some(i), None) => i,
                _ => {
                    return Err(Error::codegen_at(
                        "array sections must be materialized before code generation",
                        asr.loc(array),
                    ))
                }
            };
            let scale = strides[axis] * layout.elem_size as i64;
            match asr.const_int(subscript) {
                Some(i) => {
                    let offset = (i - layout.starts[axis]) * scale;
                    if offset != 0 {
                        self.asm.i32_const(offset as i32);
                        self.asm.emit(op::I32_ADD);
                    }
                }
                None => {
                    self.emit_expr(subscript)?;
                    if scalar_val_type(asr.ty(subscript))? == ValType::I64 {
                        self.asm.emit(op::I32_WRAP_I64);
                    }
                    if layout.starts[axis] != 0 {
                        self.asm.i32_const(layout.starts[axis] as i32);
                        self.asm.emit(op::I32_SUB);
                    }
                    if scale != 1 {
                        self.asm.i32_const(scale as i32);
                        self.asm.emit(op::I32_MUL);
                    }
                    self.asm.emit(op::I32_ADD);
                }
            }
        }
        Ok(())
    }

    /// Push the base address of an array-valued expression
    pub(super) fn emit_array_base(&mut self, array: ExprId) -> Result<()> {
        let asr = self.asr;
        match asr.kind(array) {
            ExprKind::Var(sym) => {
                let sym = *sym;
                let var_ty = asr.variable(sym).map(|v| &v.ty);
                if var_ty.is_some_and(|t| t.is_allocatable() || t.is_pointer()) {
                    return Err(Error::codegen_at(
                        format!(
                            "allocatable and pointer array '{}' is not supported by the WebAssembly backend",
                            self.name_of(sym)
                        ),
                        asr.loc(array),
                    ));
                }
                let binding = self.binding(sym)?;
                self.get_place(binding.place);
                Ok(())
            }
            other => Err(Error::codegen_at(
                format!(
                    "'{}' must be stored in an array variable before it is indexed",
                    other.name()
                ),
                asr.loc(array),
            )),
        }
    }

    /// Load the element whose address is on the stack. Complex elements
    /// push both parts.
    pub(super) fn emit_element_load(&mut self, elem: &Ttype) -> Result<()> {
        let part = scalar_val_type(elem)?;
        if !elem.is_complex() {
            self.asm.load(part, 0);
            return Ok(());
        }
        self.with_scratch(ValType::I32, |g, addr| {
            g.asm.global_set(addr);
            g.asm.global_get(addr);
            g.asm.load(part, 0);
            g.asm.global_get(addr);
            g.asm.load(part, part.size());
            Ok(())
        })
    }

    /// Store a value into the element at an address. The stack holds the
    /// address and then the value (both parts for complex).
    pub(super) fn emit_element_store(&mut self, elem: &Ttype) -> Result<()> {
        let part = scalar_val_type(elem)?;
        if !elem.is_complex() {
            self.asm.store(part, 0);
            return Ok(());
        }
        self.with_scratch(part, |g, im| {
            g.with_scratch(part, |g, re| {
                g.with_scratch(ValType::I32, |g, addr| {
                    g.asm.global_set(im);
                    g.asm.global_set(re);
                    g.asm.global_set(addr);
                    g.asm.global_get(addr);
                    g.asm.global_get(re);
                    g.asm.store(part, 0);
                    g.asm.global_get(addr);
                    g.asm.global_get(im);
                    g.asm.store(part, part.size());
                    Ok(())
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(starts: &[i64], extents: &[i64], size: u32) -> Layout {
        Layout {
            starts: starts.to_vec(),
            extents: extents.to_vec(),
            elem_size: size,
        }
    }

    #[test]
    fn test_row_major_address() {
        // a(2:4, 0:5), 8-byte elements
        let l = layout(&[2, 0], &[3, 6], 8);
        let (i, j) = (3, 4);
        let expected = 8 * ((j - 0) + (i - 2) * 6);
        assert_eq!(l.offset_of(&[i, j], StorageOrder::RowMajor), expected);
    }

    #[test]
    fn test_column_major_address() {
        let l = layout(&[2, 0], &[3, 6], 8);
        let (i, j) = (3, 4);
        let expected = 8 * ((i - 2) + (j - 0) * 3);
        assert_eq!(l.offset_of(&[i, j], StorageOrder::ColumnMajor), expected);
    }

    #[test]
    fn test_strides_of_rank_three() {
        let l = layout(&[1, 1, 1], &[2, 3, 4], 4);
        assert_eq!(l.strides(StorageOrder::ColumnMajor), vec![1, 2, 6]);
        assert_eq!(l.strides(StorageOrder::RowMajor), vec![12, 4, 1]);
        assert_eq!(l.len(), 24);
    }

    #[test]
    fn test_element_offsets_follow_storage_order() {
        // a(2, 3) of 4-byte elements, visited a(1,1), a(2,1), a(1,2), ...
        let l = layout(&[1, 1], &[2, 3], 4);
        assert_eq!(
            l.element_offsets(StorageOrder::ColumnMajor),
            vec![0, 4, 8, 12, 16, 20]
        );
        assert_eq!(
            l.element_offsets(StorageOrder::RowMajor),
            vec![0, 12, 4, 16, 8, 20]
        );
    }

    proptest::proptest! {
        #[test]
        fn prop_two_axis_address(
            lo1 in -5i64..5, n1 in 1i64..8,
            lo2 in -5i64..5, n2 in 1i64..8,
            di in 0i64..8, dj in 0i64..8,
            size in proptest::sample::select(vec![4u32, 8, 16]),
        ) {
            let l = layout(&[lo1, lo2], &[n1, n2], size);
            let (i, j) = (lo1 + di % n1, lo2 + dj % n2);
            let k = size as i64;
            proptest::prop_assert_eq!(
                l.offset_of(&[i, j], StorageOrder::RowMajor),
                k * ((j - lo2) + (i - lo1) * n2)
            );
            proptest::prop_assert_eq!(
                l.offset_of(&[i, j], StorageOrder::ColumnMajor),
                k * ((i - lo1) + (j - lo2) * n1)
            );
        }
    }
}
