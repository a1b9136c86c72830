//! Error types for each layer
//!
//! Allocator failures are not here: exhausting an arena without a fallback
//! and freeing null are contract violations and panic.

use crate::bridge::ValueType;
use std::path::PathBuf;
use thiserror::Error;

/// Marshalling and dispatch failures raised back into script code
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("{callable}: arity mismatch, expected {expected} arguments but got {found}")]
    ArityMismatch {
        callable: String,
        expected: usize,
        found: usize,
    },

    #[error("unrecognized parameter type {ty} at argument {index}")]
    UnrecognizedParameterType { index: usize, ty: ValueType },

    #[error("bad argument {index}: expected {expected}, got {found}")]
    ArgumentType {
        index: usize,
        expected: ValueType,
        found: &'static str,
    },

    #[error("unhandled return type {ty}")]
    UnhandledReturnType { ty: ValueType },

    #[error("unrecognized type for this property '{property}': expected {expected}, got {found}")]
    PropertyType {
        property: String,
        expected: ValueType,
        found: &'static str,
    },

    #[error("{callable}: expected an object reference")]
    ExpectedObject { callable: String },

    #[error("invalid side-table key: {found}")]
    InvalidKey { found: &'static str },

    #[error("{callable}: native code panicked: {message}")]
    NativePanic { callable: String, message: String },
}

/// Problems found while building a [`crate::bridge::Registry`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("function '{0}' is already registered")]
    DuplicateFunction(String),

    #[error("class '{0}' is already registered")]
    DuplicateClass(String),

    #[error("class '{class}' already declares a member named '{member}'")]
    DuplicateMember { class: String, member: String },

    #[error("class '{class}' needs {align}-byte alignment, at most 8 is supported")]
    UnsupportedAlignment { class: String, align: usize },

    #[error("invalid name '{0}': names must be non-empty and free of NUL bytes")]
    InvalidName(String),
}

/// Results of driving a script runtime
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to create script runtime")]
    StateCreation,

    #[error("compile error: {0}")]
    Compile(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("no chunk loaded")]
    NoChunk,

    #[error("unknown script function '{0}'")]
    UnknownFunction(String),

    #[error("cannot pass {0} arguments: the script stack cannot grow that far")]
    TooManyArguments(usize),

    #[error("script runtime ran out of memory: {0}")]
    Memory(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("invalid name '{0}'")]
    InvalidName(String),
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
