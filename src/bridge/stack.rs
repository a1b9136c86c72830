//! Reading and writing runtime stack slots

use super::marshal::marshal_to_script;
use super::types::{NativeValue, ScriptValue};
use crate::error::BridgeError;
use core::ffi::{c_char, c_int};
use core::ptr;
use mlua_sys as ffi;

/// Snapshot the value at `index`
pub(crate) unsafe fn read(state: *mut ffi::lua_State, index: c_int) -> ScriptValue {
    match ffi::lua_type(state, index) {
        ffi::LUA_TBOOLEAN => ScriptValue::Bool(ffi::lua_toboolean(state, index) != 0),
        ffi::LUA_TNUMBER => {
            if ffi::lua_isinteger(state, index) != 0 {
                ScriptValue::Integer(ffi::lua_tointegerx(state, index, ptr::null_mut()))
            } else {
                ScriptValue::Number(ffi::lua_tonumberx(state, index, ptr::null_mut()))
            }
        }
        ffi::LUA_TSTRING => ScriptValue::Str(String::from_utf8_lossy(read_bytes(state, index)).into_owned()),
        ffi::LUA_TTABLE => ScriptValue::Table,
        ffi::LUA_TFUNCTION => ScriptValue::Function,
        ffi::LUA_TUSERDATA | ffi::LUA_TLIGHTUSERDATA => ScriptValue::Userdata,
        ffi::LUA_TNIL | ffi::LUA_TNONE => ScriptValue::Nil,
        _ => ScriptValue::Other,
    }
}

/// Borrow the bytes of the string at `index`
///
/// The slice is only valid while the string stays on the stack. Callers
/// must check the slot holds a string; numbers would be converted in place.
pub(crate) unsafe fn read_bytes<'a>(state: *mut ffi::lua_State, index: c_int) -> &'a [u8] {
    let mut len = 0usize;
    let data = ffi::lua_tolstring(state, index, &mut len);
    if data.is_null() {
        return &[];
    }
    core::slice::from_raw_parts(data.cast::<u8>(), len)
}

/// Push a snapshot back; reference kinds cannot be rebuilt and push nil
pub(crate) unsafe fn push(state: *mut ffi::lua_State, value: &ScriptValue) {
    match value {
        ScriptValue::Bool(b) => ffi::lua_pushboolean(state, c_int::from(*b)),
        ScriptValue::Integer(n) => ffi::lua_pushinteger(state, *n),
        ScriptValue::Number(x) => ffi::lua_pushnumber(state, *x),
        ScriptValue::Str(s) => push_str(state, s),
        ScriptValue::Nil | ScriptValue::Table | ScriptValue::Function | ScriptValue::Userdata | ScriptValue::Other => {
            ffi::lua_pushnil(state)
        }
    }
}

pub(crate) unsafe fn push_str(state: *mut ffi::lua_State, s: &str) {
    ffi::lua_pushlstring(state, s.as_ptr().cast::<c_char>(), s.len());
}

/// Push argument `index` (1-based) of a call into the runtime; `Void` is nil
pub(crate) unsafe fn push_native(state: *mut ffi::lua_State, index: usize, value: &NativeValue) -> Result<(), BridgeError> {
    let converted = marshal_to_script(value).map_err(|_| BridgeError::UnrecognizedParameterType { index, ty: value.ty() })?;
    match converted {
        Some(value) => push(state, &value),
        None => ffi::lua_pushnil(state),
    }
    Ok(())
}

/// Render the error object at `index` as a message
pub(crate) unsafe fn error_message(state: *mut ffi::lua_State, index: c_int) -> String {
    match ffi::lua_type(state, index) {
        ffi::LUA_TSTRING | ffi::LUA_TNUMBER => String::from_utf8_lossy(read_bytes(state, index)).into_owned(),
        other => {
            let name = std::ffi::CStr::from_ptr(ffi::lua_typename(state, other));
            format!("(error object is a {} value)", name.to_string_lossy())
        }
    }
}
