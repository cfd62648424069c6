//! Execution engine capability.
//!
//! An engine compiles a program written in one language, resolves source
//! positions to functions, and starts a debuggee thread for it.

#![allow(missing_docs)]

mod registry;
pub mod trace;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::debug::Breakpoint;
use crate::debuggee::Debuggee;
use crate::error::{CompileError, HostError};

pub use registry::{EngineRegistry, DEFAULT_DIRECTORY_EXTENSION};

/// Receives program output, one line per call.
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// A language implementation the host can debug.
pub trait Engine: Send + Sync {
    /// Compile the target file or directory, replacing any earlier build of it.
    fn compile(&self, target: &Path) -> Result<(), CompileError>;

    /// Resolve the function spanning a 0-based line of `file` in the build
    /// of `target`. Builds of other targets are never consulted.
    fn resolve_function(&self, target: &Path, file: &Path, line: u32)
        -> Option<Arc<dyn Function>>;

    /// Resolve a `<type>:0x<hex>` reference plus a byte offset to an address
    /// of the build of `target`.
    fn resolve_instruction_reference(
        &self,
        target: &Path,
        reference: &str,
        offset: i64,
    ) -> Option<u64>;

    /// Start a debuggee positioned at the first instruction of `entry_point`.
    fn start_thread(
        &self,
        target: &Path,
        entry_point: &str,
        output: OutputSink,
    ) -> Result<Box<dyn Debuggee>, HostError>;

    /// Files whose code is never stopped in.
    fn is_internal_file(&self, _file: &Path) -> bool {
        false
    }
}

/// A compiled function, as seen by the supervisor and breakpoint store.
pub trait Function: Send + Sync + fmt::Debug {
    /// Canonical path of the defining source file.
    fn file(&self) -> &Path;

    fn display_name(&self) -> &str;

    /// 1-based source line of the instruction at `pc`.
    fn source_line(&self, pc: u32) -> u32;

    /// Verify a line breakpoint against this function, possibly moving it
    /// to the nearest executable line. Returns true if anything changed.
    fn update_breakpoint(&self, breakpoint: &mut Breakpoint) -> bool;
}
