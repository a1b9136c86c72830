//! Script host - one runtime bound to one memory source
//!
//! Design: the host takes the memory source by value and hands it back
//! only from [`ScriptHost::close`], after the runtime is gone. A source can
//! therefore only be reset between a close and the next create, which is
//! the one point where no block it served is still reachable.

mod callback;

use crate::allocator::MemorySource;
use crate::bridge::{dispatch, stack, BridgeStats, NativeValue, Registry, ScriptValue, TypeBridge};
use crate::config::{HostConfig, RuntimeConfig};
use crate::error::HostError;
use crate::logging;
use core::ffi::{c_char, c_int};
use core::mem::ManuallyDrop;
use core::ptr::{self, NonNull};
use mlua_sys as ffi;
use std::ffi::{CStr, CString};
use std::rc::Rc;

/// Registry key under which the loaded chunk is kept
const CHUNK_KEY: &CStr = c"scriptbridge.chunk";

/// An open script runtime
///
/// Not `Send`: the runtime, its allocator and the bridge are single-threaded.
pub struct ScriptHost<A: MemorySource> {
    state: NonNull<ffi::lua_State>,
    /// Owned; leaked from a `Box` so the runtime can hold a stable pointer
    allocator: NonNull<A>,
    bridge: Box<TypeBridge>,
    chunk_name: CString,
    chunk_loaded: bool,
}

impl<A: MemorySource> ScriptHost<A> {
    /// Open a runtime with the default configuration
    pub fn create(allocator: A, registry: Rc<Registry>) -> Result<Self, HostError> {
        Self::create_with_config(allocator, registry, &HostConfig::default())
    }

    /// Open a runtime whose every allocation is served by `allocator`
    ///
    /// The registry's functions and classes are installed as globals. On
    /// failure the allocator is dropped.
    pub fn create_with_config(allocator: A, registry: Rc<Registry>, config: &HostConfig) -> Result<Self, HostError> {
        let RuntimeConfig { open_libs, chunk_name } = &config.runtime;
        let chunk_name = CString::new(chunk_name.as_str()).map_err(|_| HostError::InvalidName(chunk_name.clone()))?;

        let allocator = NonNull::from(Box::leak(Box::new(allocator)));

        // SAFETY: the callback's `ud` is the leaked allocator, which lives
        // until `close_state` has run
        let raw = unsafe { ffi::lua_newstate(callback::lua_alloc::<A>, allocator.as_ptr().cast()) };
        let Some(state) = NonNull::new(raw) else {
            // SAFETY: no runtime holds the pointer
            drop(unsafe { Box::from_raw(allocator.as_ptr()) });
            return Err(HostError::StateCreation);
        };

        let host = Self {
            state,
            allocator,
            bridge: Box::new(TypeBridge::new(registry)),
            chunk_name,
            chunk_loaded: false,
        };

        // SAFETY: the bridge is boxed, so its address is stable, and it is
        // dropped only after the state is closed
        unsafe {
            if *open_libs {
                ffi::luaL_openlibs(host.state());
            }
            dispatch::install(host.state(), &*host.bridge);
        }

        logging::log_host_created(host.memory().stats().capacity, *open_libs);
        Ok(host)
    }

    #[inline]
    fn state(&self) -> *mut ffi::lua_State {
        self.state.as_ptr()
    }

    /// Compile `source` as the chunk to execute
    ///
    /// A previously loaded chunk is replaced only if compilation succeeds.
    pub fn load(&mut self, source: &str) -> Result<(), HostError> {
        let state = self.state();
        // SAFETY: valid state; the stack is restored before returning
        unsafe {
            let status = ffi::luaL_loadbufferx(
                state,
                source.as_ptr().cast::<c_char>(),
                source.len(),
                self.chunk_name.as_ptr(),
                c"t".as_ptr(),
            );
            if status != ffi::LUA_OK {
                let message = stack::error_message(state, -1);
                ffi::lua_pop(state, 1);
                logging::log_compile_error(&self.chunk_name.to_string_lossy(), &message);
                return Err(match status {
                    ffi::LUA_ERRMEM => HostError::Memory(message),
                    _ => HostError::Compile(message),
                });
            }
            ffi::lua_setfield(state, ffi::LUA_REGISTRYINDEX, CHUNK_KEY.as_ptr());
        }
        self.chunk_loaded = true;
        Ok(())
    }

    /// Run the loaded chunk and collect what it returns
    ///
    /// Globals assigned before a runtime error stay assigned.
    pub fn execute(&mut self) -> Result<Vec<ScriptValue>, HostError> {
        if !self.chunk_loaded {
            return Err(HostError::NoChunk);
        }

        let state = self.state();
        // SAFETY: valid state; `collect` restores the stack
        unsafe {
            let base = ffi::lua_gettop(state);
            ffi::lua_getfield(state, ffi::LUA_REGISTRYINDEX, CHUNK_KEY.as_ptr());
            let status = ffi::lua_pcall(state, 0, ffi::LUA_MULTRET, 0);
            self.collect(base, status, "execute")
        }
    }

    /// Load and execute in one step
    pub fn run(&mut self, source: &str) -> Result<Vec<ScriptValue>, HostError> {
        self.load(source)?;
        self.execute()
    }

    /// Call the script global `name` with native arguments
    pub fn call_function(&mut self, name: &str, args: &[NativeValue]) -> Result<Vec<ScriptValue>, HostError> {
        let c_name = CString::new(name).map_err(|_| HostError::InvalidName(name.to_string()))?;
        let state = self.state();

        // SAFETY: valid state; every path restores the stack to `base`
        unsafe {
            let base = ffi::lua_gettop(state);
            if ffi::lua_getglobal(state, c_name.as_ptr()) != ffi::LUA_TFUNCTION {
                ffi::lua_settop(state, base);
                return Err(HostError::UnknownFunction(name.to_string()));
            }

            // The base frame only guarantees LUA_MINSTACK free slots
            let count = match c_int::try_from(args.len()) {
                Ok(count) if count < c_int::MAX && ffi::lua_checkstack(state, count + 1) != 0 => count,
                _ => {
                    ffi::lua_settop(state, base);
                    return Err(HostError::TooManyArguments(args.len()));
                }
            };

            for (index, arg) in args.iter().enumerate() {
                if let Err(err) = stack::push_native(state, index + 1, arg) {
                    ffi::lua_settop(state, base);
                    return Err(err.into());
                }
            }

            let status = ffi::lua_pcall(state, count, ffi::LUA_MULTRET, 0);
            self.collect(base, status, name)
        }
    }

    /// Read a global variable
    pub fn global(&self, name: &str) -> Result<ScriptValue, HostError> {
        let c_name = CString::new(name).map_err(|_| HostError::InvalidName(name.to_string()))?;
        let state = self.state();

        // SAFETY: valid state; the pushed value is popped
        unsafe {
            ffi::lua_getglobal(state, c_name.as_ptr());
            let value = stack::read(state, -1);
            ffi::lua_pop(state, 1);
            Ok(value)
        }
    }

    /// Bridge counters for this runtime
    pub fn bridge_stats(&self) -> BridgeStats {
        self.bridge.stats()
    }

    /// The memory source serving this runtime
    pub fn memory(&self) -> &A {
        // SAFETY: the runtime only touches the allocator during API calls,
        // which need `&mut self` or run to completion before returning
        unsafe { self.allocator.as_ref() }
    }

    /// Close the runtime and return the memory source, unreset
    ///
    /// Every pending finalizer runs first, so all native instances are
    /// dropped by the time this returns.
    pub fn close(self) -> A {
        self.shutdown().0
    }

    /// Close the runtime, returning the memory source and the final counters
    fn shutdown(self) -> (A, BridgeStats) {
        let mut host = ManuallyDrop::new(self);
        // SAFETY: `host` is never dropped; each owned field is moved out once
        unsafe {
            let stats = host.close_state();
            drop(ptr::read(&host.bridge));
            drop(ptr::read(&host.chunk_name));
            (*Box::from_raw(host.allocator.as_ptr()), stats)
        }
    }

    /// Gather results above `base` after a protected call
    unsafe fn collect(&self, base: c_int, status: c_int, context: &str) -> Result<Vec<ScriptValue>, HostError> {
        let state = self.state();

        if status != ffi::LUA_OK {
            let message = stack::error_message(state, -1);
            ffi::lua_settop(state, base);
            logging::log_runtime_error(context, &message);
            return Err(match status {
                ffi::LUA_ERRMEM => HostError::Memory(message),
                _ => HostError::Runtime(message),
            });
        }

        let top = ffi::lua_gettop(state);
        let values = (base + 1..=top).map(|index| stack::read(state, index)).collect();
        ffi::lua_settop(state, base);
        Ok(values)
    }

    unsafe fn close_state(&mut self) -> BridgeStats {
        // Finalizers run inside lua_close, so the counters are read afterwards
        ffi::lua_close(self.state());
        let stats = self.bridge.stats();
        logging::log_host_closed(stats.live_instances, stats.calls_made);
        stats
    }
}

impl<A: MemorySource> Drop for ScriptHost<A> {
    fn drop(&mut self) {
        // SAFETY: the state is closed before the allocator it uses is freed;
        // the bridge is dropped afterwards with the remaining fields
        unsafe {
            self.close_state();
            drop(Box::from_raw(self.allocator.as_ptr()));
        }
    }
}

impl<A: MemorySource> std::fmt::Debug for ScriptHost<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHost")
            .field("state", &self.state)
            .field("chunk_loaded", &self.chunk_loaded)
            .field("bridge", &self.bridge.stats())
            .finish()
    }
}
