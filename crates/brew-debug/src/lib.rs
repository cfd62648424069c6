//! Debug Adapter Protocol (DAP) server for brew execution engines.

mod adapter;
mod protocol;
mod server;

pub use adapter::DebugAdapter;
pub use protocol::{
    Breakpoint, BreakpointEventBody, Capabilities, ContinueArguments, ContinueResponseBody,
    DisassembleArguments, DisassembleResponseBody, DisassembledInstruction, DisconnectArguments,
    ErrorResponseBody, Event, ExitedEventBody, InitializeArguments, InitializeResponseBody,
    InstructionBreakpoint, LaunchArguments, Message, MessageType, NextArguments, OutputEventBody,
    ReadMemoryArguments, ReadMemoryResponseBody, Request, Response, Scope, ScopesArguments,
    ScopesResponseBody, SetBreakpointsArguments, SetBreakpointsResponseBody,
    SetInstructionBreakpointsArguments, SetInstructionBreakpointsResponseBody, Source,
    SourceBreakpoint, StackFrame, StackTraceArguments, StackTraceResponseBody, StepInArguments,
    StepOutArguments, StoppedEventBody, TerminatedEventBody, Thread, ThreadsResponseBody,
    Variable, VariablesArguments, VariablesResponseBody, WriteMemoryArguments,
    WriteMemoryResponseBody,
};
pub use server::{run_session, DebugServer, DEFAULT_PORT};
