//! Request handlers grouped by DAP area.
//! - initialize: initialize/launch/configurationDone
//! - breakpoints: line + instruction breakpoint replacement
//! - lifecycle: disconnect
//! - threads: thread list
//! - stack_trace: stackTrace request
//! - scopes: scope + variable enumeration
//! - memory: disassemble/readMemory/writeMemory
//! - run_control: continue/next/stepIn/stepOut

mod breakpoints;
mod initialize;
mod lifecycle;
mod memory;
mod run_control;
mod scopes;
mod stack_trace;
mod threads;
