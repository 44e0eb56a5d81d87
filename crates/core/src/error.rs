//! Error types for the wave solver core
//!
//! All fallible operations return [`CelerisResult`]. Configuration problems are
//! detected while fields are allocated and passes are prepared, so a run that
//! starts stepping has already validated every pass and binding.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type CelerisResult<T> = Result<T, CelerisError>;

/// Errors produced by the wave solver core
#[derive(Error, Debug)]
pub enum CelerisError {
    /// A configuration value is out of range or inconsistent
    #[error("invalid configuration: {field}: {reason}")]
    Config {
        /// Name of the offending setting
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// A pass binding does not match the kernel contract
    #[error("pass '{pass}' binding {binding} ('{name}'): {reason}")]
    Binding {
        /// Kernel name
        pass: &'static str,
        /// Binding slot (uniform block is slot 0)
        binding: usize,
        /// Declared binding name
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Two fields that must share dimensions do not
    #[error("dimension mismatch for {context}: {expected:?} vs {actual:?}")]
    DimensionMismatch {
        /// Operation that detected the mismatch
        context: &'static str,
        /// Expected (width, height, depth)
        expected: (u32, u32, u32),
        /// Actual (width, height, depth)
        actual: (u32, u32, u32),
    },

    /// A field handle outlived the registry that issued it
    #[error("stale field handle {index} (generation {generation})")]
    StaleHandle {
        /// Slot index in the registry
        index: u32,
        /// Generation the handle was issued in
        generation: u32,
    },

    /// A prepared pass id is unknown to the backend
    #[error("unknown prepared pass {0}")]
    UnknownPass(usize),

    /// No shader source was supplied for a kernel
    #[error("no kernel source for '{kernel}' (expected {file})")]
    MissingKernel {
        /// Kernel name
        kernel: &'static str,
        /// File the source was looked up in
        file: PathBuf,
    },

    /// The compute device was lost; the run cannot continue
    #[error("compute device lost: {0}")]
    DeviceLost(String),

    /// Reading a field back to the host failed
    #[error("readback of '{field}' failed: {reason}")]
    Readback {
        /// Field name
        field: String,
        /// Failure description
        reason: String,
    },

    /// Filesystem error while loading configuration or kernels
    #[error("io error at {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Configuration JSON could not be parsed
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl CelerisError {
    /// Shorthand for [`CelerisError::Config`]
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            field,
            reason: reason.into(),
        }
    }

    /// Shorthand for [`CelerisError::Io`]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error ends the run
    ///
    /// Readback failures are reported to the caller but stepping may continue.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Readback { .. })
    }
}
