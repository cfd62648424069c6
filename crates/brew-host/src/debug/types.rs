//! Debug state and event types.

#![allow(missing_docs)]

/// Supervisor execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Execute until a breakpoint or exit.
    Running,
    /// Execute until the step request is satisfied.
    Stepping,
    /// Wait for a run-control request.
    Suspended,
    /// The debuggee is gone; terminal.
    Terminated,
}

/// How far a step request advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SteppingGranularity {
    /// Stop only at the first instruction of a source line.
    #[default]
    Line,
    /// Stop at any instruction.
    Instruction,
}

/// Reason reported with a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Entry,
    Breakpoint,
    InstructionBreakpoint,
    Step,
}

impl StopReason {
    /// Protocol spelling of the reason.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Breakpoint => "breakpoint",
            Self::InstructionBreakpoint => "instruction breakpoint",
            Self::Step => "step",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCategory {
    Stdout,
    Stderr,
}

impl OutputCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Asynchronous notifications raised by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// Execution suspended.
    Stopped { reason: StopReason },
    /// Program text written by the debuggee or host.
    Output {
        category: OutputCategory,
        text: String,
    },
    /// The debuggee finished or faulted.
    Exited { exit_code: i32 },
}
