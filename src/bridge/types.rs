//! Value types crossing the script/native boundary

use std::fmt;

/// Native type tag of a parameter, return value or property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    /// No value; only meaningful as a return type
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
}

impl ValueType {
    /// Get size of type in bytes
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::Void => 0,
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
            Self::Str => core::mem::size_of::<String>(),
        }
    }

    #[inline]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::U8 | Self::U16 | Self::U32 | Self::U64
        )
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Whether values of this type can cross the boundary
    #[inline]
    pub const fn is_numeric(self) -> bool {
        self.is_integral() || self.is_float()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Str => "string",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A native value tagged with exactly one [`ValueType`]
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Void,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
}

impl NativeValue {
    pub fn ty(&self) -> ValueType {
        match self {
            Self::Void => ValueType::Void,
            Self::Bool(_) => ValueType::Bool,
            Self::I8(_) => ValueType::I8,
            Self::I16(_) => ValueType::I16,
            Self::I32(_) => ValueType::I32,
            Self::I64(_) => ValueType::I64,
            Self::U8(_) => ValueType::U8,
            Self::U16(_) => ValueType::U16,
            Self::U32(_) => ValueType::U32,
            Self::U64(_) => ValueType::U64,
            Self::F32(_) => ValueType::F32,
            Self::F64(_) => ValueType::F64,
            Self::Str(_) => ValueType::Str,
        }
    }

    /// Narrow or widen a script integer to `ty`, as a C cast would
    ///
    /// `None` when `ty` is not numeric.
    pub fn from_integer(ty: ValueType, value: i64) -> Option<Self> {
        Some(match ty {
            ValueType::I8 => Self::I8(value as i8),
            ValueType::I16 => Self::I16(value as i16),
            ValueType::I32 => Self::I32(value as i32),
            ValueType::I64 => Self::I64(value),
            ValueType::U8 => Self::U8(value as u8),
            ValueType::U16 => Self::U16(value as u16),
            ValueType::U32 => Self::U32(value as u32),
            ValueType::U64 => Self::U64(value as u64),
            ValueType::F32 => Self::F32(value as f32),
            ValueType::F64 => Self::F64(value as f64),
            ValueType::Void | ValueType::Bool | ValueType::Str => return None,
        })
    }

    /// Convert a script float to `ty`; integer targets truncate toward zero
    pub fn from_number(ty: ValueType, value: f64) -> Option<Self> {
        Some(match ty {
            ValueType::I8 => Self::I8(value as i8),
            ValueType::I16 => Self::I16(value as i16),
            ValueType::I32 => Self::I32(value as i32),
            ValueType::I64 => Self::I64(value as i64),
            ValueType::U8 => Self::U8(value as u8),
            ValueType::U16 => Self::U16(value as u16),
            ValueType::U32 => Self::U32(value as u32),
            ValueType::U64 => Self::U64(value as u64),
            ValueType::F32 => Self::F32(value as f32),
            ValueType::F64 => Self::F64(value),
            ValueType::Void | ValueType::Bool | ValueType::Str => return None,
        })
    }
}

/// Snapshot of one script stack slot
///
/// Reference types (tables, functions, userdata) are recorded by kind only.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Nil,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Str(String),
    Table,
    Function,
    Userdata,
    Other,
}

impl ScriptValue {
    /// Script-side type name, as used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Integer(_) | Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Table => "table",
            Self::Function => "function",
            Self::Userdata => "userdata",
            Self::Other => "thread",
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Number(_))
    }

    /// Integer view; floats with an exact integer value also qualify
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Self::Integer(n) => Some(n),
            Self::Number(x) if x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64 => {
                Some(x as i64)
            }
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Self::Integer(n) => Some(n as f64),
            Self::Number(x) => Some(x),
            _ => None,
        }
    }
}

impl From<i64> for ScriptValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ScriptValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}
