//! Run control and breakpoints for a single debuggee.

#![allow(missing_docs)]

mod breakpoints;
mod supervisor;
mod types;

pub use breakpoints::{
    Breakpoint, BreakpointKind, BreakpointStore, InstructionBreakpointRequest, LaunchTarget,
};
pub use supervisor::{Supervisor, MAX_DISASSEMBLY_COUNT};
pub use types::{ExecutionState, HostEvent, OutputCategory, SteppingGranularity, StopReason};
