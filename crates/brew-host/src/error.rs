//! Host errors.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};

use smol_str::SmolStr;
use thiserror::Error;

/// Errors raised while loading, resolving, or inspecting a debuggee.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The engine rejected the target program.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The target path has no extension to select an engine with.
    #[error("'{}' has no file extension", path.display())]
    MissingExtension { path: PathBuf },

    /// No engine is registered for the target extension.
    #[error("no execution engine registered for extension '{extension}'")]
    UnregisteredExtension { extension: SmolStr },

    /// No engine is registered for an instruction reference prefix.
    #[error("no execution engine registered for instruction reference type '{kind}'")]
    UnregisteredInstructionReferenceType { kind: SmolStr },

    /// An instruction reference did not use the `0x<hex>` form.
    #[error("instruction reference '{reference}' is not a 0x-prefixed hexadecimal address")]
    MalformedInstructionReference { reference: String },

    /// The requested entry point does not exist in the loaded program.
    #[error("unknown entry point '{name}'")]
    UnknownEntryPoint { name: SmolStr },

    /// The operation needs a launched debuggee.
    #[error("no debuggee has been launched")]
    NotLaunched,

    /// The debuggee failed while executing.
    #[error(transparent)]
    Fault(#[from] DebuggeeFault),
}

/// Program rejected by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
}

impl CompileError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error anchored at a 1-based source line.
    #[must_use]
    pub fn at(path: &Path, line: u32, message: impl fmt::Display) -> Self {
        Self::new(format!("{}:{line}: {message}", path.display()))
    }
}

/// Failure raised by a running debuggee.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DebuggeeFault {
    pub message: String,
}

impl DebuggeeFault {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
