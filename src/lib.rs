//! scriptbridge - embed a Lua 5.4 runtime on a fixed memory budget
//!
//! Two halves:
//! - [`allocator`]: arena, fallback and heap memory sources serving the
//!   runtime's single allocator callback
//! - [`bridge`]: a registry of native functions and classes, marshalled to
//!   and from script values without per-function glue
//!
//! [`ScriptHost`] ties them together: it opens a runtime on a memory
//! source, installs a registry, and loads, executes and calls scripts.

pub mod allocator;
pub mod bridge;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;

// Re-export core types
pub use allocator::{
    AllocRequest, AllocatorStats, ArenaBuffer, BlockAllocator, FallbackAllocator, Memory, MemorySource,
    SystemAllocator,
};
pub use bridge::{BridgeStats, ClassBuilder, NativeValue, Registry, ScriptValue, ValueType};
pub use config::HostConfig;
pub use error::{BridgeError, ConfigError, HostError, RegistryError};
pub use host::ScriptHost;
