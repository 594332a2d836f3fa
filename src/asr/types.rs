//! Static types carried by every IR expression and variable.

use super::ExprId;
use serde::Serialize;

/// Numeric category of a scalar type, used for first-level dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KindTag {
    Integer,
    Real,
    Complex,
    Logical,
    Character,
}

/// Physical layout of an array value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ArrayPhysical {
    /// Compile-time sized, stored inline in linear memory
    #[default]
    FixedSize,
    /// Raw data pointer with shape known elsewhere
    PointerToData,
    /// Runtime descriptor (pointer, bounds, strides)
    Descriptor,
}

/// Element order for multi-dimensional indexing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum StorageOrder {
    RowMajor,
    #[default]
    ColumnMajor,
}

/// One array axis: lower bound and extent, both optional expressions.
///
/// An empty dimension (`start == None && length == None`) is a deferred
/// shape, as used by allocatable and pointer temporaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Dimension {
    pub start: Option<ExprId>,
    pub length: Option<ExprId>,
}

impl Dimension {
    pub fn new(start: ExprId, length: ExprId) -> Self {
        Self {
            start: Some(start),
            length: Some(length),
        }
    }

    pub fn deferred() -> Self {
        Self::default()
    }

    pub fn is_deferred(&self) -> bool {
        self.length.is_none()
    }
}

/// Static type of an IR value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Ttype {
    Integer { kind: u8 },
    Real { kind: u8 },
    Complex { kind: u8 },
    Logical { kind: u8 },
    Character { len: Option<i64> },
    Array {
        elem: Box<Ttype>,
        dims: Vec<Dimension>,
        physical: ArrayPhysical,
    },
    Allocatable(Box<Ttype>),
    Pointer(Box<Ttype>),
}

impl Ttype {
    pub fn integer(kind: u8) -> Self {
        Ttype::Integer { kind }
    }

    pub fn i32() -> Self {
        Ttype::Integer { kind: 4 }
    }

    pub fn i64() -> Self {
        Ttype::Integer { kind: 8 }
    }

    pub fn real(kind: u8) -> Self {
        Ttype::Real { kind }
    }

    pub fn f32() -> Self {
        Ttype::Real { kind: 4 }
    }

    pub fn f64() -> Self {
        Ttype::Real { kind: 8 }
    }

    pub fn complex(kind: u8) -> Self {
        Ttype::Complex { kind }
    }

    pub fn logical() -> Self {
        Ttype::Logical { kind: 4 }
    }

    pub fn character(len: Option<i64>) -> Self {
        Ttype::Character { len }
    }

    /// Array of `elem` with the given axes
    pub fn array(elem: Ttype, dims: Vec<Dimension>, physical: ArrayPhysical) -> Self {
        Ttype::Array {
            elem: Box::new(elem.element().clone()),
            dims,
            physical,
        }
    }

    pub fn allocatable(self) -> Self {
        Ttype::Allocatable(Box::new(self))
    }

    pub fn pointer(self) -> Self {
        Ttype::Pointer(Box::new(self))
    }

    /// Strip `Allocatable` and `Pointer` wrappers
    pub fn past_wrappers(&self) -> &Ttype {
        match self {
            Ttype::Allocatable(inner) | Ttype::Pointer(inner) => inner.past_wrappers(),
            other => other,
        }
    }

    /// Scalar element type (the type itself for scalars)
    pub fn element(&self) -> &Ttype {
        match self.past_wrappers() {
            Ttype::Array { elem, .. } => elem,
            other => other,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self.past_wrappers(), Ttype::Array { .. })
    }

    pub fn is_allocatable(&self) -> bool {
        matches!(self, Ttype::Allocatable(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Ttype::Pointer(_))
    }

    pub fn dims(&self) -> &[Dimension] {
        match self.past_wrappers() {
            Ttype::Array { dims, .. } => dims,
            _ => &[],
        }
    }

    pub fn rank(&self) -> usize {
        self.dims().len()
    }

    pub fn physical(&self) -> Option<ArrayPhysical> {
        match self.past_wrappers() {
            Ttype::Array { physical, .. } => Some(*physical),
            _ => None,
        }
    }

    /// Kind tag of the element type
    pub fn tag(&self) -> KindTag {
        match self.element() {
            Ttype::Integer { .. } => KindTag::Integer,
            Ttype::Real { .. } => KindTag::Real,
            Ttype::Complex { .. } => KindTag::Complex,
            Ttype::Logical { .. } => KindTag::Logical,
            _ => KindTag::Character,
        }
    }

    /// Byte width selector of the element type (4 or 8; 0 for characters)
    pub fn kind(&self) -> u8 {
        match self.element() {
            Ttype::Integer { kind }
            | Ttype::Real { kind }
            | Ttype::Complex { kind }
            | Ttype::Logical { kind } => *kind,
            _ => 0,
        }
    }

    pub fn is_complex(&self) -> bool {
        self.tag() == KindTag::Complex
    }

    /// Same element and wrappers, new axes
    pub fn with_dims(&self, dims: Vec<Dimension>) -> Ttype {
        match self {
            Ttype::Allocatable(inner) => Ttype::Allocatable(Box::new(inner.with_dims(dims))),
            Ttype::Pointer(inner) => Ttype::Pointer(Box::new(inner.with_dims(dims))),
            Ttype::Array { elem, physical, .. } => Ttype::Array {
                elem: elem.clone(),
                dims,
                physical: *physical,
            },
            scalar => Ttype::Array {
                elem: Box::new(scalar.clone()),
                dims,
                physical: ArrayPhysical::FixedSize,
            },
        }
    }

    /// Unwrapped array of the same element and rank with every axis deferred
    pub fn with_deferred_dims(&self) -> Ttype {
        Ttype::Array {
            elem: Box::new(self.element().clone()),
            dims: vec![Dimension::deferred(); self.rank()],
            physical: ArrayPhysical::Descriptor,
        }
    }

    /// Same shape with a different element type
    pub fn with_element(&self, elem: Ttype) -> Ttype {
        if self.is_array() {
            let physical = self.physical().unwrap_or_default();
            Ttype::array(elem, self.dims().to_vec(), physical)
        } else {
            elem
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrappers_are_transparent_for_shape() {
        let arr = Ttype::array(
            Ttype::real(8),
            vec![Dimension::deferred(), Dimension::deferred()],
            ArrayPhysical::Descriptor,
        )
        .allocatable();
        assert!(arr.is_array());
        assert!(arr.is_allocatable());
        assert_eq!(arr.rank(), 2);
        assert_eq!(arr.tag(), KindTag::Real);
        assert_eq!(arr.kind(), 8);
    }

    #[test]
    fn test_array_of_array_flattens_element() {
        let inner = Ttype::array(Ttype::i32(), vec![], ArrayPhysical::FixedSize);
        let outer = Ttype::array(inner, vec![Dimension::deferred()], ArrayPhysical::FixedSize);
        assert_eq!(outer.element(), &Ttype::i32());
    }

    #[test]
    fn test_deferred_dims_keep_rank() {
        let arr = Ttype::array(
            Ttype::complex(4),
            vec![Dimension::deferred(); 3],
            ArrayPhysical::FixedSize,
        );
        let deferred = arr.with_deferred_dims();
        assert_eq!(deferred.rank(), 3);
        assert!(deferred.dims().iter().all(Dimension::is_deferred));
        assert!(deferred.is_complex());
    }
}
