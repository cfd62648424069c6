//! Trace source parser.

use std::path::Path;

use smol_str::SmolStr;

use super::{DATA_BASE, DATA_SIZE};
use crate::error::CompileError;
use crate::reference::parse_address;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Op {
    Call(SmolStr),
    Ret,
    Print(String),
    Set(SmolStr, i64),
    Store(u64, u8),
    /// Jump to the first instruction of a 1-based line in the same function.
    Goto(u32),
    Fault(String),
    Nop,
}

#[derive(Debug, Clone)]
pub(super) struct ParsedInstruction {
    /// 1-based.
    pub line: u32,
    pub op: Op,
    pub text: String,
}

#[derive(Debug, Clone)]
pub(super) struct ParsedFunction {
    pub name: SmolStr,
    /// 0-based line of the `fn` header.
    pub decl_line: u32,
    /// 0-based line of the closing `end`.
    pub end_line: u32,
    pub body: Vec<ParsedInstruction>,
}

pub(super) fn parse_file(path: &Path, text: &str) -> Result<Vec<ParsedFunction>, CompileError> {
    let mut functions = Vec::new();
    let mut current: Option<ParsedFunction> = None;

    for (index, raw) in text.lines().enumerate() {
        let line0 = u32::try_from(index)
            .map_err(|_| CompileError::new(format!("{}: file too long", path.display())))?;
        let line = line0 + 1;
        let code = raw.split('#').next().unwrap_or_default();
        for statement in code.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (word, rest) = statement
                .split_once(char::is_whitespace)
                .map_or((statement, ""), |(word, rest)| (word, rest.trim()));
            match word {
                "fn" => {
                    if let Some(open) = &current {
                        return Err(CompileError::at(
                            path,
                            line,
                            format!("function '{}' is missing 'end'", open.name),
                        ));
                    }
                    current = Some(ParsedFunction {
                        name: parse_name(path, line, rest)?,
                        decl_line: line0,
                        end_line: line0,
                        body: Vec::new(),
                    });
                }
                "end" => {
                    let Some(mut function) = current.take() else {
                        return Err(CompileError::at(path, line, "'end' outside of a function"));
                    };
                    function.body.push(ParsedInstruction {
                        line,
                        op: Op::Ret,
                        text: "end".to_string(),
                    });
                    function.end_line = line0;
                    functions.push(function);
                }
                _ => {
                    let Some(function) = current.as_mut() else {
                        return Err(CompileError::at(
                            path,
                            line,
                            format!("'{statement}' outside of a function"),
                        ));
                    };
                    let op = parse_op(path, line, word, rest)?;
                    function.body.push(ParsedInstruction {
                        line,
                        op,
                        text: statement.to_string(),
                    });
                }
            }
        }
    }

    if let Some(open) = current {
        return Err(CompileError::at(
            path,
            open.decl_line + 1,
            format!("function '{}' is missing 'end'", open.name),
        ));
    }
    Ok(functions)
}

fn parse_name(path: &Path, line: u32, text: &str) -> Result<SmolStr, CompileError> {
    let valid = !text.is_empty()
        && text
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.');
    if valid {
        Ok(SmolStr::new(text))
    } else {
        Err(CompileError::at(path, line, format!("invalid name '{text}'")))
    }
}

fn parse_op(path: &Path, line: u32, word: &str, rest: &str) -> Result<Op, CompileError> {
    let no_operands = |op: Op| {
        if rest.is_empty() {
            Ok(op)
        } else {
            Err(CompileError::at(
                path,
                line,
                format!("'{word}' takes no operands"),
            ))
        }
    };
    match word {
        "call" => Ok(Op::Call(parse_name(path, line, rest)?)),
        "ret" => no_operands(Op::Ret),
        "nop" => no_operands(Op::Nop),
        "print" => Ok(Op::Print(rest.to_string())),
        "fault" => Ok(Op::Fault(rest.to_string())),
        "set" => {
            let mut parts = rest.split_whitespace();
            let (Some(name), Some(value), None) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(CompileError::at(path, line, "expected 'set NAME INT'"));
            };
            let value = value
                .parse::<i64>()
                .map_err(|_| CompileError::at(path, line, format!("invalid integer '{value}'")))?;
            Ok(Op::Set(parse_name(path, line, name)?, value))
        }
        "store" => {
            let mut parts = rest.split_whitespace();
            let (Some(address), Some(byte), None) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(CompileError::at(path, line, "expected 'store ADDR BYTE'"));
            };
            let address = parse_address(address)
                .map_err(|_| CompileError::at(path, line, format!("invalid address '{address}'")))?;
            if !(DATA_BASE..DATA_BASE + DATA_SIZE as u64).contains(&address) {
                return Err(CompileError::at(
                    path,
                    line,
                    format!("address 0x{address:x} is outside data memory"),
                ));
            }
            let byte = byte
                .parse::<u8>()
                .map_err(|_| CompileError::at(path, line, format!("invalid byte '{byte}'")))?;
            Ok(Op::Store(address, byte))
        }
        "goto" => rest
            .parse::<u32>()
            .ok()
            .filter(|target| *target > 0)
            .map(Op::Goto)
            .ok_or_else(|| CompileError::at(path, line, format!("invalid line '{rest}'"))),
        other => Err(CompileError::at(
            path,
            line,
            format!("unknown statement '{other}'"),
        )),
    }
}
