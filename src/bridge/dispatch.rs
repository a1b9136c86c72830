//! Runtime entry points: global functions, constructors and instance metamethods
//!
//! Every trampoline follows the same shape: recover the bridge and the
//! registry entry from light-userdata upvalues, run the body under
//! `catch_unwind`, and on error push the message and raise it with
//! `lua_error`. Nothing that needs dropping may be alive in a frame the
//! raise unwinds through, so the error is rendered and dropped first.

use super::callable::Receiver;
use super::registry::{NativeCallable, NativeClass};
use super::stack;
use super::types::ScriptValue;
use super::TypeBridge;
use crate::error::BridgeError;
use crate::logging;
use core::ffi::{c_int, c_void};
use mlua_sys as ffi;
use smallvec::SmallVec;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

type Outcome = Result<c_int, BridgeError>;

/// Install every registered function and class into the globals of `state`
///
/// # Safety
/// `bridge` must outlive `state`; its registry is read through raw
/// pointers by every trampoline.
pub(crate) unsafe fn install(state: *mut ffi::lua_State, bridge: *const TypeBridge) {
    let registry = (*bridge).registry();

    for function in registry.functions() {
        push_closure(state, call_function, bridge, (function as *const NativeCallable).cast());
        ffi::lua_setglobal(state, function.c_name().as_ptr());
    }

    for class in registry.classes() {
        let class_ptr = (class as *const NativeClass).cast::<c_void>();

        ffi::luaL_newmetatable(state, class.metatable().as_ptr());
        for (name, entry) in [
            (c"__index", get_member as ffi::lua_CFunction),
            (c"__newindex", set_member as ffi::lua_CFunction),
            (c"__gc", destroy_instance as ffi::lua_CFunction),
            (c"__tostring", render_instance as ffi::lua_CFunction),
        ] {
            push_closure(state, entry, bridge, class_ptr);
            ffi::lua_setfield(state, -2, name.as_ptr());
        }
        ffi::lua_pop(state, 1);

        ffi::lua_createtable(state, 0, 1);
        push_closure(state, create_instance, bridge, class_ptr);
        ffi::lua_setfield(state, -2, c"new".as_ptr());
        ffi::lua_setglobal(state, class.c_name().as_ptr());
    }

    logging::log_bridge_installed(registry.functions().len(), registry.classes().len());
}

unsafe fn push_closure(state: *mut ffi::lua_State, entry: ffi::lua_CFunction, bridge: *const TypeBridge, target: *const c_void) {
    ffi::lua_pushlightuserdata(state, bridge as *mut c_void);
    ffi::lua_pushlightuserdata(state, target as *mut c_void);
    ffi::lua_pushcclosure(state, entry, 2);
}

unsafe fn upvalue<'a, T>(state: *mut ffi::lua_State, n: c_int) -> &'a T {
    &*ffi::lua_touserdata(state, ffi::lua_upvalueindex(n)).cast::<T>()
}

/// Run `body`, turning a panic into a script-visible error
fn guarded(name: &str, body: impl FnOnce() -> Outcome) -> Outcome {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(BridgeError::NativePanic {
            callable: name.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Return the result count, or raise the error into the runtime
unsafe fn finish(state: *mut ffi::lua_State, name: &str, outcome: Outcome) -> c_int {
    match outcome {
        Ok(results) => results,
        Err(err) => {
            logging::log_bridge_error(name, &err);
            let message = err.to_string();
            stack::push_str(state, &message);
            drop(message);
            drop(err);
            raise(state)
        }
    }
}

#[inline(never)]
unsafe fn raise(state: *mut ffi::lua_State) -> c_int {
    ffi::lua_error(state)
}

/// Pointer to the instance of `class` at `index`, if it is one
unsafe fn instance_at(state: *mut ffi::lua_State, index: c_int, class: &NativeClass) -> Option<*mut u8> {
    let block = ffi::luaL_testudata(state, index, class.metatable().as_ptr());
    (!block.is_null()).then_some(block.cast::<u8>())
}

/// Live native value of the instance at `index`
unsafe fn receiver_at<'a>(state: *mut ffi::lua_State, index: c_int, class: &NativeClass, callable: &str) -> Result<Receiver<'a>, BridgeError> {
    instance_at(state, index, class)
        .and_then(|block| class.vtable().receiver(block))
        .ok_or_else(|| BridgeError::ExpectedObject {
            callable: callable.to_string(),
        })
}

unsafe fn read_args(state: *mut ffi::lua_State, first: c_int) -> SmallVec<[ScriptValue; 6]> {
    let top = ffi::lua_gettop(state);
    (first..=top).map(|index| stack::read(state, index)).collect()
}

unsafe fn push_result(state: *mut ffi::lua_State, result: Option<ScriptValue>) -> c_int {
    match result {
        Some(value) => {
            stack::push(state, &value);
            1
        }
        None => 0,
    }
}

// ============================================================================
// Calls
// ============================================================================

unsafe extern "C-unwind" fn call_function(state: *mut ffi::lua_State) -> c_int {
    let bridge = upvalue::<TypeBridge>(state, 1);
    let callable = upvalue::<NativeCallable>(state, 2);

    let outcome = guarded(callable.name(), || {
        let args = read_args(state, 1);
        bridge.record_call();
        logging::log_native_call(callable.name(), args.len());
        let result = callable.invoke(None, &args)?;
        Ok(push_result(state, result))
    });
    finish(state, callable.name(), outcome)
}

unsafe extern "C-unwind" fn call_method(state: *mut ffi::lua_State) -> c_int {
    let bridge = upvalue::<TypeBridge>(state, 1);
    let class = upvalue::<NativeClass>(state, 2);
    let callable = upvalue::<NativeCallable>(state, 3);

    let outcome = guarded(callable.name(), || {
        let receiver = receiver_at(state, 1, class, callable.name())?;
        let args = read_args(state, 2);
        bridge.record_call();
        logging::log_native_call(callable.name(), args.len());
        let result = callable.invoke(Some(receiver), &args)?;
        Ok(push_result(state, result))
    });
    finish(state, callable.name(), outcome)
}

// ============================================================================
// Instance lifecycle
// ============================================================================

/// `Class.new()`: default-construct an instance inside a runtime block
unsafe extern "C-unwind" fn create_instance(state: *mut ffi::lua_State) -> c_int {
    let bridge = upvalue::<TypeBridge>(state, 1);
    let class = upvalue::<NativeClass>(state, 2);

    let outcome = guarded(class.name(), || {
        let block = ffi::lua_newuserdatauv(state, class.vtable().layout.size(), 1).cast::<u8>();
        // No metatable yet: if construction panics the block is collected
        // without a finalizer
        class.vtable().construct(block);

        ffi::lua_createtable(state, 0, 0);
        ffi::lua_setiuservalue(state, -2, 1);
        ffi::lua_getfield(state, ffi::LUA_REGISTRYINDEX, class.metatable().as_ptr());
        ffi::lua_setmetatable(state, -2);

        bridge.instance_created();
        logging::log_instance_created(class.name(), block);
        Ok(1)
    });
    finish(state, class.name(), outcome)
}

/// `__gc`: drop the native value in place; the block is freed by the runtime
unsafe extern "C-unwind" fn destroy_instance(state: *mut ffi::lua_State) -> c_int {
    let bridge = upvalue::<TypeBridge>(state, 1);
    let class = upvalue::<NativeClass>(state, 2);

    let outcome = guarded(class.name(), || {
        if let Some(block) = instance_at(state, 1, class) {
            if class.vtable().destroy(block) {
                bridge.instance_destroyed();
                logging::log_instance_destroyed(class.name(), block);
            }
        }
        Ok(0)
    });
    finish(state, class.name(), outcome)
}

unsafe extern "C-unwind" fn render_instance(state: *mut ffi::lua_State) -> c_int {
    let class = upvalue::<NativeClass>(state, 2);

    let outcome = guarded(class.name(), || {
        let block = instance_at(state, 1, class).unwrap_or(core::ptr::null_mut());
        let text = format!("{}({:p})", class.name(), block);
        stack::push_str(state, &text);
        Ok(1)
    });
    finish(state, class.name(), outcome)
}

// ============================================================================
// Members
// ============================================================================

/// Key at `index` as a member name, when it is a UTF-8 string
unsafe fn member_name<'a>(state: *mut ffi::lua_State, index: c_int) -> Option<&'a str> {
    if ffi::lua_type(state, index) != ffi::LUA_TSTRING {
        return None;
    }
    core::str::from_utf8(stack::read_bytes(state, index)).ok()
}

/// `__index`: methods, then properties, then the side-table
unsafe extern "C-unwind" fn get_member(state: *mut ffi::lua_State) -> c_int {
    let bridge = upvalue::<TypeBridge>(state, 1);
    let class = upvalue::<NativeClass>(state, 2);

    let outcome = guarded(class.name(), || {
        let instance = receiver_at(state, 1, class, class.name())?;

        if let Some(name) = member_name(state, 2) {
            if let Some(method) = class.method(name) {
                ffi::lua_pushlightuserdata(state, bridge as *const TypeBridge as *mut c_void);
                ffi::lua_pushlightuserdata(state, class as *const NativeClass as *mut c_void);
                ffi::lua_pushlightuserdata(state, method as *const NativeCallable as *mut c_void);
                ffi::lua_pushcclosure(state, call_method, 3);
                return Ok(1);
            }
            if let Some(property) = class.property(name) {
                let value = property.read(instance)?;
                return Ok(push_result(state, Some(value.unwrap_or(ScriptValue::Nil))));
            }
        }

        ffi::lua_getiuservalue(state, 1, 1);
        ffi::lua_pushvalue(state, 2);
        ffi::lua_rawget(state, -2);
        Ok(1)
    });
    finish(state, class.name(), outcome)
}

/// `__newindex`: declared properties are type-checked, anything else goes
/// to the side-table
unsafe extern "C-unwind" fn set_member(state: *mut ffi::lua_State) -> c_int {
    let class = upvalue::<NativeClass>(state, 2);

    let outcome = guarded(class.name(), || {
        let instance = receiver_at(state, 1, class, class.name())?;

        if let Some(property) = member_name(state, 2).and_then(|name| class.property(name)) {
            property.write(instance, &stack::read(state, 3))?;
            return Ok(0);
        }

        match stack::read(state, 2) {
            ScriptValue::Nil => return Err(BridgeError::InvalidKey { found: "nil" }),
            ScriptValue::Number(x) if x.is_nan() => return Err(BridgeError::InvalidKey { found: "NaN" }),
            _ => {}
        }

        ffi::lua_getiuservalue(state, 1, 1);
        ffi::lua_pushvalue(state, 2);
        ffi::lua_pushvalue(state, 3);
        ffi::lua_rawset(state, -3);
        Ok(0)
    });
    finish(state, class.name(), outcome)
}
