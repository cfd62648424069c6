//! Memory and disassembly requests.
//! - handle_disassemble: instructions around a memory reference
//! - handle_read_memory: base64 encoded bytes
//! - handle_write_memory: base64 decoded bytes

use base64::{engine::general_purpose, Engine as _};
use brew_host::reference::{format_address, offset_address, parse_address};
use serde_json::Value;

use crate::protocol::{
    DisassembleArguments, DisassembleResponseBody, DisassembledInstruction, ReadMemoryArguments,
    ReadMemoryResponseBody, Request, WriteMemoryArguments, WriteMemoryResponseBody,
};

use super::super::util::{arguments, source_for_path};
use super::super::{DebugAdapter, DispatchOutcome, ErrorCode};

impl DebugAdapter {
    pub(in crate::adapter) fn handle_disassemble(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = arguments::<DisassembleArguments>(&request) else {
            return self.invalid_arguments(&request);
        };
        if let Some(rejected) = self.require_suspended(&request) {
            return rejected;
        }
        let address = match self.memory_address(&request, &args.memory_reference, args.offset) {
            Ok(address) => address,
            Err(rejected) => return rejected,
        };
        let instructions = match self.supervisor.disassemble(
            address,
            args.instruction_offset.unwrap_or(0),
            args.instruction_count as usize,
        ) {
            Ok(instructions) => instructions,
            Err(err) => {
                return self.failure(&request, ErrorCode::for_host_error(&err), &err.to_string());
            }
        };
        let body = DisassembleResponseBody {
            instructions: instructions
                .into_iter()
                .map(|instruction| DisassembledInstruction {
                    address: format_address(instruction.address),
                    instruction: instruction.instruction,
                    location: instruction.file.as_deref().map(source_for_path),
                    line: instruction.line,
                })
                .collect(),
        };
        DispatchOutcome {
            responses: vec![self.ok_response(&request, Some(body))],
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_read_memory(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = arguments::<ReadMemoryArguments>(&request) else {
            return self.invalid_arguments(&request);
        };
        if let Some(rejected) = self.require_suspended(&request) {
            return rejected;
        }
        let address = match self.memory_address(&request, &args.memory_reference, args.offset) {
            Ok(address) => address,
            Err(rejected) => return rejected,
        };
        let read = match self.supervisor.read_memory(address, args.count as usize) {
            Ok(read) => read,
            Err(err) => {
                return self.failure(&request, ErrorCode::for_host_error(&err), &err.to_string());
            }
        };
        let unreadable = u32::try_from(read.unreadable_bytes).unwrap_or(u32::MAX);
        let body = ReadMemoryResponseBody {
            address: format_address(read.address),
            unreadable_bytes: (unreadable > 0).then_some(unreadable),
            data: Some(general_purpose::STANDARD.encode(&read.data)),
        };
        DispatchOutcome {
            responses: vec![self.ok_response(&request, Some(body))],
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_write_memory(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = arguments::<WriteMemoryArguments>(&request) else {
            return self.invalid_arguments(&request);
        };
        if let Some(rejected) = self.require_suspended(&request) {
            return rejected;
        }
        let address = match self.memory_address(&request, &args.memory_reference, args.offset) {
            Ok(address) => address,
            Err(rejected) => return rejected,
        };
        let Ok(data) = general_purpose::STANDARD.decode(args.data.as_bytes()) else {
            return self.failure(
                &request,
                ErrorCode::InvalidArguments,
                "writeMemory data is not valid base64",
            );
        };
        let written = match self.supervisor.write_memory(address, &data) {
            Ok(written) => written,
            Err(err) => {
                return self.failure(&request, ErrorCode::for_host_error(&err), &err.to_string());
            }
        };
        let body = WriteMemoryResponseBody {
            offset: None,
            bytes_written: Some(u32::try_from(written).unwrap_or(u32::MAX)),
        };
        DispatchOutcome {
            responses: vec![self.ok_response(&request, Some(body))],
            ..DispatchOutcome::default()
        }
    }

    fn memory_address(
        &self,
        request: &Request<Value>,
        reference: &str,
        offset: Option<i64>,
    ) -> Result<u64, DispatchOutcome> {
        let base = parse_address(reference).map_err(|err| {
            self.failure(
                request,
                ErrorCode::MalformedInstructionReference,
                &err.to_string(),
            )
        })?;
        offset_address(base, offset.unwrap_or(0)).ok_or_else(|| {
            self.failure(
                request,
                ErrorCode::InvalidArguments,
                "memory offset is out of range",
            )
        })
    }
}
