//! Assembled trace programs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use smol_str::SmolStr;

use super::parse::{Op, ParsedFunction};
use super::{CODE_BASE, INSTRUCTION_SIZE};
use crate::debug::{Breakpoint, BreakpointKind};
use crate::engine::Function;
use crate::error::CompileError;

#[derive(Debug, Clone)]
pub(super) struct Instruction {
    /// `Goto` operands hold the target pc once assembled.
    pub op: Op,
    /// 1-based.
    pub line: u32,
    pub text: String,
    pub first_on_line: bool,
    pub function: usize,
}

/// Instructions of every function in a target, laid out contiguously from
/// [`CODE_BASE`].
#[derive(Debug)]
pub(super) struct Program {
    pub instructions: Vec<Instruction>,
    pub functions: Vec<Arc<TraceFunction>>,
    pub by_name: HashMap<SmolStr, usize>,
}

#[derive(Debug)]
pub struct TraceFunction {
    name: SmolStr,
    file: PathBuf,
    /// 0-based span from the `fn` header to `end`, inclusive.
    decl_line: u32,
    end_line: u32,
    /// Index of the first instruction in the program.
    pub(super) entry: usize,
    /// 1-based line of each instruction.
    lines: Vec<u32>,
}

impl TraceFunction {
    pub(super) fn spans(&self, file: &Path, line: u32) -> bool {
        self.file == file && (self.decl_line..=self.end_line).contains(&line)
    }
}

impl Function for TraceFunction {
    fn file(&self) -> &Path {
        &self.file
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn source_line(&self, pc: u32) -> u32 {
        self.lines
            .get(pc as usize)
            .copied()
            .unwrap_or(self.end_line + 1)
    }

    fn update_breakpoint(&self, breakpoint: &mut Breakpoint) -> bool {
        let BreakpointKind::Line { line, .. } = &mut breakpoint.kind else {
            return false;
        };
        match self.lines.iter().copied().find(|candidate| *candidate >= *line) {
            Some(executable) => {
                let changed = !breakpoint.verified || *line != executable;
                *line = executable;
                breakpoint.verified = true;
                breakpoint.message = None;
                changed
            }
            None => {
                let changed = breakpoint.verified;
                breakpoint.verified = false;
                breakpoint.message = Some(format!("no code after line {line} in '{}'", self.name));
                changed
            }
        }
    }
}

impl Program {
    pub(super) fn assemble(units: Vec<(PathBuf, Vec<ParsedFunction>)>) -> Result<Self, CompileError> {
        let mut by_name = HashMap::new();
        let mut parsed = Vec::new();
        for (file, functions) in units {
            for function in functions {
                if by_name.contains_key(&function.name) {
                    return Err(CompileError::at(
                        &file,
                        function.decl_line + 1,
                        format!("duplicate function '{}'", function.name),
                    ));
                }
                by_name.insert(function.name.clone(), parsed.len());
                parsed.push((file.clone(), function));
            }
        }

        let mut instructions = Vec::new();
        let mut functions = Vec::with_capacity(parsed.len());
        for (index, (file, function)) in parsed.into_iter().enumerate() {
            let entry = instructions.len();
            let lines: Vec<u32> = function.body.iter().map(|ins| ins.line).collect();
            for (pc, ins) in function.body.into_iter().enumerate() {
                let op = match ins.op {
                    Op::Call(ref callee) if !by_name.contains_key(callee) => {
                        return Err(CompileError::at(
                            &file,
                            ins.line,
                            format!("unknown function '{callee}'"),
                        ));
                    }
                    Op::Goto(target) => {
                        let target_pc = lines.iter().position(|line| *line == target).ok_or_else(|| {
                            CompileError::at(
                                &file,
                                ins.line,
                                format!("line {target} has no code in '{}'", function.name),
                            )
                        })?;
                        Op::Goto(target_pc as u32)
                    }
                    op => op,
                };
                instructions.push(Instruction {
                    op,
                    line: ins.line,
                    text: ins.text,
                    first_on_line: pc == 0 || lines[pc - 1] != ins.line,
                    function: index,
                });
            }
            functions.push(Arc::new(TraceFunction {
                name: function.name,
                file,
                decl_line: function.decl_line,
                end_line: function.end_line,
                entry,
                lines,
            }));
        }

        Ok(Self {
            instructions,
            functions,
            by_name,
        })
    }

    pub(super) fn address_of(index: usize) -> u64 {
        CODE_BASE + INSTRUCTION_SIZE * index as u64
    }

    /// Index of the instruction at `address`, if one starts there.
    pub(super) fn instruction_at(&self, address: u64) -> Option<usize> {
        let offset = address.checked_sub(CODE_BASE)?;
        if offset % INSTRUCTION_SIZE != 0 {
            return None;
        }
        let index = usize::try_from(offset / INSTRUCTION_SIZE).ok()?;
        (index < self.instructions.len()).then_some(index)
    }
}
