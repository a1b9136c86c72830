//! Pure value conversion between script slots and native arguments
//!
//! Nothing here touches a runtime; dispatch reads the stack into
//! [`ScriptValue`]s first and pushes the result afterwards.

use super::types::{NativeValue, ScriptValue, ValueType};
use crate::error::BridgeError;
use smallvec::SmallVec;

/// Marshalled arguments; inline up to the largest supported arity
pub type NativeArgs = SmallVec<[NativeValue; 6]>;

/// Convert script arguments into typed native arguments
///
/// The argument count is checked before any slot is looked at. Argument
/// indices in errors are 1-based and exclude a method's receiver.
pub fn marshal_to_native(
    callable: &str,
    values: &[ScriptValue],
    params: &[ValueType],
) -> Result<NativeArgs, BridgeError> {
    if values.len() != params.len() {
        return Err(BridgeError::ArityMismatch {
            callable: callable.to_string(),
            expected: params.len(),
            found: values.len(),
        });
    }

    values
        .iter()
        .zip(params)
        .enumerate()
        .map(|(i, (value, &ty))| marshal_argument(i + 1, value, ty))
        .collect()
}

fn marshal_argument(index: usize, value: &ScriptValue, ty: ValueType) -> Result<NativeValue, BridgeError> {
    if !ty.is_numeric() {
        return Err(BridgeError::UnrecognizedParameterType { index, ty });
    }

    let converted = match *value {
        ScriptValue::Integer(n) => NativeValue::from_integer(ty, n),
        ScriptValue::Number(x) => NativeValue::from_number(ty, x),
        _ => None,
    };

    converted.ok_or_else(|| BridgeError::ArgumentType {
        index,
        expected: ty,
        found: value.type_name(),
    })
}

/// Convert a native result into at most one script value
///
/// `Void` produces nothing; integers become script integers and floats
/// script numbers. Unsigned 64-bit values wrap like a C cast.
pub fn marshal_to_script(value: &NativeValue) -> Result<Option<ScriptValue>, BridgeError> {
    let converted = match *value {
        NativeValue::Void => return Ok(None),
        NativeValue::I8(n) => ScriptValue::Integer(n.into()),
        NativeValue::I16(n) => ScriptValue::Integer(n.into()),
        NativeValue::I32(n) => ScriptValue::Integer(n.into()),
        NativeValue::I64(n) => ScriptValue::Integer(n),
        NativeValue::U8(n) => ScriptValue::Integer(n.into()),
        NativeValue::U16(n) => ScriptValue::Integer(n.into()),
        NativeValue::U32(n) => ScriptValue::Integer(n.into()),
        NativeValue::U64(n) => ScriptValue::Integer(n as i64),
        NativeValue::F32(x) => ScriptValue::Number(x.into()),
        NativeValue::F64(x) => ScriptValue::Number(x),
        NativeValue::Bool(_) | NativeValue::Str(_) => {
            return Err(BridgeError::UnhandledReturnType { ty: value.ty() })
        }
    };
    Ok(Some(converted))
}

/// Check and convert a value assigned to a declared property
pub fn marshal_property(property: &str, value: &ScriptValue, ty: ValueType) -> Result<NativeValue, BridgeError> {
    let converted = match *value {
        ScriptValue::Integer(n) => NativeValue::from_integer(ty, n),
        ScriptValue::Number(x) => NativeValue::from_number(ty, x),
        _ => None,
    };

    converted.ok_or_else(|| BridgeError::PropertyType {
        property: property.to_string(),
        expected: ty,
        found: value.type_name(),
    })
}
