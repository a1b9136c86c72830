//! Type bridge between the script runtime and registered native code
//!
//! Design: a [`Registry`] describes native functions and classes as data.
//! A [`TypeBridge`] owns a shared registry plus per-runtime counters, and
//! [`dispatch`] installs one trampoline per entry point. Conversions are
//! pure ([`marshal`]) so they can be tested without a runtime.
//!
//! Only the numeric family crosses the boundary. Booleans and strings can
//! be declared but fail when marshalled.

mod callable;
pub(crate) mod dispatch;
mod instance;
pub mod marshal;
mod registry;
pub(crate) mod stack;
mod types;


pub use callable::{Invoker, NativeArg, NativeFn, NativeMethod, NativeReturn, Receiver};
pub use marshal::{marshal_property, marshal_to_native, marshal_to_script, NativeArgs};
pub use registry::{ClassBuilder, NativeCallable, NativeClass, NativeProperty, Registry};
pub use types::{NativeValue, ScriptValue, ValueType};

use std::cell::Cell;
use std::rc::Rc;

/// Counters for one runtime's use of the bridge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Instances constructed and not yet finalized
    pub live_instances: usize,
    /// Instances constructed since the runtime was created
    pub instances_created: usize,
    /// Native functions and methods dispatched from script
    pub calls_made: usize,
}

/// Per-runtime bridge state
///
/// Trampolines reach it through a raw pointer, so it must stay at a fixed
/// address for as long as its runtime is open.
#[derive(Debug)]
pub struct TypeBridge {
    registry: Rc<Registry>,
    live_instances: Cell<usize>,
    instances_created: Cell<usize>,
    calls_made: Cell<usize>,
}

impl TypeBridge {
    pub fn new(registry: Rc<Registry>) -> Self {
        Self {
            registry,
            live_instances: Cell::new(0),
            instances_created: Cell::new(0),
            calls_made: Cell::new(0),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            live_instances: self.live_instances.get(),
            instances_created: self.instances_created.get(),
            calls_made: self.calls_made.get(),
        }
    }

    pub(crate) fn record_call(&self) {
        self.calls_made.set(self.calls_made.get() + 1);
    }

    pub(crate) fn instance_created(&self) {
        self.live_instances.set(self.live_instances.get() + 1);
        self.instances_created.set(self.instances_created.get() + 1);
    }

    pub(crate) fn instance_destroyed(&self) {
        self.live_instances.set(self.live_instances.get().saturating_sub(1));
    }
}
