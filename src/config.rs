//! Host configuration loaded from TOML
//!
//! ```toml
//! [arena]
//! size_bytes = 20480
//! fallback = true
//!
//! [runtime]
//! open_libs = true
//! chunk_name = "=script"
//! ```

use crate::allocator::{ArenaBuffer, BlockAllocator, FallbackAllocator, Memory};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub arena: ArenaConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Backing buffer size
    #[serde(default = "default_arena_size")]
    pub size_bytes: usize,

    /// Spill to the system heap instead of aborting when the arena is full
    #[serde(default = "default_true")]
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Open the standard script libraries (`print`, `string`, `collectgarbage`, ...)
    #[serde(default = "default_true")]
    pub open_libs: bool,

    /// Name reported in compile and runtime diagnostics
    #[serde(default = "default_chunk_name")]
    pub chunk_name: String,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            size_bytes: default_arena_size(),
            fallback: true,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            open_libs: true,
            chunk_name: default_chunk_name(),
        }
    }
}

impl HostConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arena.size_bytes == 0 {
            return Err(ConfigError::Invalid("arena.size_bytes must be non-zero".into()));
        }
        if self.runtime.chunk_name.contains('\0') {
            return Err(ConfigError::Invalid(
                "runtime.chunk_name must not contain NUL bytes".into(),
            ));
        }
        Ok(())
    }

    /// Acquire a backing buffer of the configured size
    pub fn allocate_buffer(&self) -> Result<ArenaBuffer, ConfigError> {
        ArenaBuffer::new(self.arena.size_bytes).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "cannot allocate an arena of {} bytes",
                self.arena.size_bytes
            ))
        })
    }

    /// Build the configured memory source over `buffer`
    pub fn build_memory<'buf>(&self, buffer: &'buf mut ArenaBuffer) -> Memory<'buf> {
        let arena = BlockAllocator::new(buffer.as_mut_slice());
        if self.arena.fallback {
            Memory::Fallback(FallbackAllocator::new(arena))
        } else {
            Memory::Arena(arena)
        }
    }
}

fn default_arena_size() -> usize {
    20 * 1024
}

fn default_true() -> bool {
    true
}

fn default_chunk_name() -> String {
    "=script".to_string()
}
