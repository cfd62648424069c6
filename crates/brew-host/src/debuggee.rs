//! Debuggee capability: one running program thread.

#![allow(missing_docs)]

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::Function;
use crate::error::DebuggeeFault;

/// A single call frame.
#[derive(Clone)]
pub struct StackFrame {
    pub function: Arc<dyn Function>,
    /// Instruction index within `function`.
    pub pc: u32,
    pub pc_address: u64,
    /// Wire form of `pc_address`, expected to be `0x<hex>`.
    pub pc_reference: String,
}

impl StackFrame {
    #[must_use]
    pub fn line(&self) -> u32 {
        self.function.source_line(self.pc)
    }
}

impl fmt::Debug for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackFrame")
            .field("function", &self.function.display_name())
            .field("pc", &self.pc)
            .field("pc_reference", &self.pc_reference)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub name: String,
    pub variables_reference: u32,
    pub expensive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub type_name: Option<String>,
    pub variables_reference: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassembledInstruction {
    pub address: u64,
    pub instruction: String,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
}

/// Bytes read from debuggee memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRead {
    pub address: u64,
    pub data: Vec<u8>,
    /// Requested bytes past `data` that could not be read.
    pub unreadable_bytes: usize,
}

/// A program thread driven one instruction at a time.
pub trait Debuggee: Send {
    /// Execute one instruction. `Ok(false)` means the program has exited.
    fn step(&mut self) -> Result<bool, DebuggeeFault>;

    fn at_first_instruction_on_line(&self) -> bool;

    /// Frames, innermost first.
    fn call_stack(&self) -> Vec<StackFrame>;

    fn call_depth(&self) -> usize {
        self.call_stack().len()
    }

    /// Scopes of the frame with the given 1-based depth from the outermost frame.
    fn scopes(&self, frame_id: u32) -> Vec<Scope>;

    fn variables(&self, variables_reference: u32) -> Vec<Variable>;

    /// Disassemble `count` instructions starting `instruction_offset`
    /// instructions away from `address`.
    fn disassemble(
        &self,
        address: u64,
        instruction_offset: i64,
        count: usize,
    ) -> Vec<DisassembledInstruction>;

    fn read_memory(&self, address: u64, count: usize) -> MemoryRead;

    /// Write `data` at `address`, returning the number of bytes written.
    fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<usize, DebuggeeFault>;
}
