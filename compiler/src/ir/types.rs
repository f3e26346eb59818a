//! IR Type System
//!
//! Defines the scalar type system for the intermediate representation and the
//! constant values that `Const` instructions materialize.

use serde::{Deserialize, Serialize};
use std::fmt;

/// IR type representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrType {
    /// Void type (no value)
    Void,

    /// Boolean type
    Bool,

    /// Integer types
    I8,
    I16,
    I32,
    I64,

    /// Unsigned integer types
    U8,
    U16,
    U32,
    U64,

    /// Floating point types
    F32,
    F64,

    /// Pointer type
    Ptr(Box<IrType>),
}

impl IrType {
    /// Pointer to `self`
    pub fn ptr_to(self) -> Self {
        IrType::Ptr(Box::new(self))
    }

    /// Get the size of the type in bytes
    pub fn size(&self) -> usize {
        match self {
            IrType::Void => 0,
            IrType::Bool | IrType::I8 | IrType::U8 => 1,
            IrType::I16 | IrType::U16 => 2,
            IrType::I32 | IrType::U32 | IrType::F32 => 4,
            IrType::I64 | IrType::U64 | IrType::F64 => 8,
            IrType::Ptr(_) => std::mem::size_of::<usize>(),
        }
    }

    /// Width in bits of an integer or bool type
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            IrType::Bool => Some(1),
            IrType::I8 | IrType::U8 => Some(8),
            IrType::I16 | IrType::U16 => Some(16),
            IrType::I32 | IrType::U32 => Some(32),
            IrType::I64 | IrType::U64 => Some(64),
            _ => None,
        }
    }

    /// Check if this is a pointer type
    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    /// Check if this is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            IrType::I8
                | IrType::I16
                | IrType::I32
                | IrType::I64
                | IrType::U8
                | IrType::U16
                | IrType::U32
                | IrType::U64
        )
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }

    /// Check if this is a signed integer type
    pub fn is_signed_integer(&self) -> bool {
        matches!(self, IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64)
    }

    /// Pointee type, if this is a pointer
    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    /// Get the default value for this type
    pub fn default_value(&self) -> IrValue {
        match self {
            IrType::Void => IrValue::Void,
            IrType::Bool => IrValue::Bool(false),
            IrType::F32 => IrValue::F32(0.0),
            IrType::F64 => IrValue::F64(0.0),
            IrType::Ptr(_) => IrValue::Null,
            int_ty => IrValue::from_int(0, int_ty).unwrap_or(IrValue::Undef),
        }
    }
}

/// IR constant value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrValue {
    /// No value
    Void,
    /// Undefined value
    Undef,
    /// Null pointer
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer values
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    /// Floating point values
    F32(f32),
    F64(f64),
}

impl IrValue {
    /// Build an integer constant of the given type, truncating `value` to its width.
    pub fn from_int(value: i64, ty: &IrType) -> Option<Self> {
        Some(match ty {
            IrType::I8 => IrValue::I8(value as i8),
            IrType::I16 => IrValue::I16(value as i16),
            IrType::I32 => IrValue::I32(value as i32),
            IrType::I64 => IrValue::I64(value),
            IrType::U8 => IrValue::U8(value as u8),
            IrType::U16 => IrValue::U16(value as u16),
            IrType::U32 => IrValue::U32(value as u32),
            IrType::U64 => IrValue::U64(value as u64),
            _ => return None,
        })
    }

    /// Integer payload, sign- or zero-extended to 64 bits
    pub fn as_int(&self) -> Option<i64> {
        match self {
            IrValue::I8(v) => Some(*v as i64),
            IrValue::I16(v) => Some(*v as i64),
            IrValue::I32(v) => Some(*v as i64),
            IrValue::I64(v) => Some(*v),
            IrValue::U8(v) => Some(*v as i64),
            IrValue::U16(v) => Some(*v as i64),
            IrValue::U32(v) => Some(*v as i64),
            IrValue::U64(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Whether this is the integer constant `expected`
    pub fn is_int(&self, expected: i64) -> bool {
        self.as_int() == Some(expected)
    }

    /// The type a `Const` of this value produces
    pub fn ty(&self) -> IrType {
        match self {
            IrValue::Void | IrValue::Undef => IrType::Void,
            IrValue::Null => IrType::Ptr(Box::new(IrType::Void)),
            IrValue::Bool(_) => IrType::Bool,
            IrValue::I8(_) => IrType::I8,
            IrValue::I16(_) => IrType::I16,
            IrValue::I32(_) => IrType::I32,
            IrValue::I64(_) => IrType::I64,
            IrValue::U8(_) => IrType::U8,
            IrValue::U16(_) => IrType::U16,
            IrValue::U32(_) => IrType::U32,
            IrValue::U64(_) => IrType::U64,
            IrValue::F32(_) => IrType::F32,
            IrValue::F64(_) => IrType::F64,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Bool => write!(f, "bool"),
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::U8 => write!(f, "u8"),
            IrType::U16 => write!(f, "u16"),
            IrType::U32 => write!(f, "u32"),
            IrType::U64 => write!(f, "u64"),
            IrType::F32 => write!(f, "f32"),
            IrType::F64 => write!(f, "f64"),
            IrType::Ptr(ty) => write!(f, "*{}", ty),
        }
    }
}
