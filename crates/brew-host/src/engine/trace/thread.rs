use std::collections::BTreeMap;
use std::sync::Arc;

use smol_str::SmolStr;

use super::parse::Op;
use super::program::Program;
use super::{DATA_BASE, DATA_SIZE, INSTRUCTION_SIZE, MAX_CALL_DEPTH};
use crate::debuggee::{
    Debuggee, DisassembledInstruction, MemoryRead, Scope, StackFrame, Variable,
};
use crate::engine::{Function, OutputSink};
use crate::error::DebuggeeFault;
use crate::reference::format_address;

#[derive(Debug)]
struct Frame {
    function: usize,
    pc: u32,
    locals: BTreeMap<SmolStr, i64>,
}

impl Frame {
    fn new(function: usize) -> Self {
        Self {
            function,
            pc: 0,
            locals: BTreeMap::new(),
        }
    }
}

pub(super) struct TraceThread {
    program: Arc<Program>,
    /// Outermost first.
    frames: Vec<Frame>,
    memory: Vec<u8>,
    output: OutputSink,
}

impl TraceThread {
    pub(super) fn new(program: Arc<Program>, entry: usize, output: OutputSink) -> Self {
        Self {
            program,
            frames: vec![Frame::new(entry)],
            memory: vec![0; DATA_SIZE],
            output,
        }
    }

    fn current_index(&self) -> Option<usize> {
        let frame = self.frames.last()?;
        Some(self.program.functions[frame.function].entry + frame.pc as usize)
    }

    fn frame(&self, frame_id: u32) -> Option<&Frame> {
        let index = usize::try_from(frame_id).ok()?.checked_sub(1)?;
        self.frames.get(index)
    }
}

fn data_offset(address: u64) -> Option<usize> {
    let offset = usize::try_from(address.checked_sub(DATA_BASE)?).ok()?;
    (offset < DATA_SIZE).then_some(offset)
}

impl Debuggee for TraceThread {
    fn step(&mut self) -> Result<bool, DebuggeeFault> {
        let Some(index) = self.current_index() else {
            return Ok(false);
        };
        let op = self.program.instructions[index].op.clone();
        let depth = self.frames.len();
        let Some(frame) = self.frames.last_mut() else {
            return Ok(false);
        };
        match op {
            Op::Call(name) => {
                frame.pc += 1;
                if depth >= MAX_CALL_DEPTH {
                    return Err(DebuggeeFault::new(format!(
                        "stack overflow calling '{name}'"
                    )));
                }
                let Some(&callee) = self.program.by_name.get(&name) else {
                    return Err(DebuggeeFault::new(format!("unknown function '{name}'")));
                };
                self.frames.push(Frame::new(callee));
            }
            Op::Ret => {
                self.frames.pop();
            }
            Op::Print(text) => {
                frame.pc += 1;
                (self.output)(&text);
            }
            Op::Set(name, value) => {
                frame.locals.insert(name, value);
                frame.pc += 1;
            }
            Op::Store(address, byte) => {
                let Some(slot) = data_offset(address).and_then(|o| self.memory.get_mut(o)) else {
                    return Err(DebuggeeFault::new(format!(
                        "store to {} is outside data memory",
                        format_address(address)
                    )));
                };
                *slot = byte;
                frame.pc += 1;
            }
            Op::Goto(target) => frame.pc = target,
            Op::Fault(message) => return Err(DebuggeeFault::new(message)),
            Op::Nop => frame.pc += 1,
        }
        Ok(!self.frames.is_empty())
    }

    fn at_first_instruction_on_line(&self) -> bool {
        self.current_index()
            .is_some_and(|index| self.program.instructions[index].first_on_line)
    }

    fn call_stack(&self) -> Vec<StackFrame> {
        self.frames
            .iter()
            .rev()
            .map(|frame| {
                let function = &self.program.functions[frame.function];
                let address = Program::address_of(function.entry + frame.pc as usize);
                StackFrame {
                    function: Arc::clone(function) as Arc<dyn Function>,
                    pc: frame.pc,
                    pc_address: address,
                    pc_reference: format_address(address),
                }
            })
            .collect()
    }

    fn call_depth(&self) -> usize {
        self.frames.len()
    }

    fn scopes(&self, frame_id: u32) -> Vec<Scope> {
        if self.frame(frame_id).is_none() {
            return Vec::new();
        }
        vec![Scope {
            name: "Locals".to_string(),
            variables_reference: frame_id,
            expensive: false,
        }]
    }

    fn variables(&self, variables_reference: u32) -> Vec<Variable> {
        let Some(frame) = self.frame(variables_reference) else {
            return Vec::new();
        };
        frame
            .locals
            .iter()
            .map(|(name, value)| Variable {
                name: name.to_string(),
                value: value.to_string(),
                type_name: Some("int".to_string()),
                variables_reference: 0,
            })
            .collect()
    }

    fn disassemble(
        &self,
        address: u64,
        instruction_offset: i64,
        count: usize,
    ) -> Vec<DisassembledInstruction> {
        let step = i128::from(INSTRUCTION_SIZE);
        let start = i128::from(address) + i128::from(instruction_offset) * step;
        (0..count)
            .map(|n| {
                let address = u64::try_from(start + n as i128 * step).unwrap_or(0);
                match self.program.instruction_at(address) {
                    Some(index) => {
                        let instruction = &self.program.instructions[index];
                        let function = &self.program.functions[instruction.function];
                        DisassembledInstruction {
                            address,
                            instruction: instruction.text.clone(),
                            file: Some(function.file().to_path_buf()),
                            line: Some(instruction.line),
                        }
                    }
                    None => DisassembledInstruction {
                        address,
                        instruction: "(bad)".to_string(),
                        file: None,
                        line: None,
                    },
                }
            })
            .collect()
    }

    fn read_memory(&self, address: u64, count: usize) -> MemoryRead {
        let data = match data_offset(address) {
            Some(start) => {
                let end = start.saturating_add(count).min(DATA_SIZE);
                self.memory[start..end].to_vec()
            }
            None => Vec::new(),
        };
        MemoryRead {
            address,
            unreadable_bytes: count - data.len(),
            data,
        }
    }

    fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<usize, DebuggeeFault> {
        let range = data_offset(address)
            .map(|start| start..start + data.len())
            .filter(|range| range.end <= DATA_SIZE)
            .ok_or_else(|| {
                DebuggeeFault::new(format!(
                    "write of {} bytes at {} is outside data memory",
                    data.len(),
                    format_address(address)
                ))
            })?;
        self.memory[range].copy_from_slice(data);
        Ok(data.len())
    }
}
