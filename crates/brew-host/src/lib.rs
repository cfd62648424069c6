//! `brew-host` - debug host core for brew execution engines.
//!
//! The [`Supervisor`] owns one [`Debuggee`] and drives it from a background
//! thread, stopping on line breakpoints, instruction breakpoints and step
//! requests. Engines plug in through the [`Engine`] trait and are selected
//! by file extension in an [`EngineRegistry`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Run control, breakpoints and host events.
pub mod debug;
/// Debuggee capability and inspection types.
pub mod debuggee;
/// Engine capability, registry and the bundled trace engine.
pub mod engine;
/// Host errors.
pub mod error;
/// Instruction reference and path helpers.
pub mod reference;

pub use debug::{
    Breakpoint, BreakpointKind, BreakpointStore, ExecutionState, HostEvent,
    InstructionBreakpointRequest, LaunchTarget, OutputCategory, SteppingGranularity, StopReason,
    Supervisor, MAX_DISASSEMBLY_COUNT,
};
pub use debuggee::{Debuggee, DisassembledInstruction, MemoryRead, Scope, StackFrame, Variable};
pub use engine::trace::TraceEngine;
pub use engine::{Engine, EngineRegistry, Function, OutputSink, DEFAULT_DIRECTORY_EXTENSION};
pub use error::{CompileError, DebuggeeFault, HostError};
