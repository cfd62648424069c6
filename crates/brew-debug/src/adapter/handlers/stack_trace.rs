//! Stack trace requests.
//! - handle_stack_trace: paginated call stack, innermost first

use brew_host::reference::{format_address, parse_address};
use serde_json::Value;

use crate::protocol::{Request, StackFrame, StackTraceArguments, StackTraceResponseBody};

use super::super::util::{arguments, source_for_path};
use super::super::{DebugAdapter, DispatchOutcome, ErrorCode};

impl DebugAdapter {
    /// Frame ids count from the outermost frame, so the innermost frame of a
    /// stack of depth `n` has id `n`. `levels` of 0 means all frames.
    pub(in crate::adapter) fn handle_stack_trace(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = arguments::<StackTraceArguments>(&request) else {
            return self.invalid_arguments(&request);
        };
        if let Some(rejected) = self.require_suspended(&request) {
            return rejected;
        }
        let frames = match self.supervisor.call_stack() {
            Ok(frames) => frames,
            Err(err) => {
                return self.failure(&request, ErrorCode::for_host_error(&err), &err.to_string());
            }
        };

        let total = frames.len();
        let start = args.start_frame.unwrap_or(0) as usize;
        let levels = match args.levels {
            None | Some(0) => total,
            Some(levels) => levels as usize,
        };

        let mut stack_frames = Vec::new();
        for (index, frame) in frames.iter().enumerate().skip(start).take(levels) {
            let address = match parse_address(&frame.pc_reference) {
                Ok(address) => address,
                Err(err) => {
                    return self.failure(
                        &request,
                        ErrorCode::MalformedInstructionReference,
                        &err.to_string(),
                    );
                }
            };
            stack_frames.push(StackFrame {
                id: frame_id(total - index),
                name: frame.function.display_name().to_string(),
                source: Some(source_for_path(frame.function.file())),
                line: frame.line(),
                column: 1,
                instruction_pointer_reference: Some(format_address(address)),
            });
        }

        let body = StackTraceResponseBody {
            stack_frames,
            total_frames: Some(frame_id(total)),
        };
        DispatchOutcome {
            responses: vec![self.ok_response(&request, Some(body))],
            ..DispatchOutcome::default()
        }
    }
}

fn frame_id(depth: usize) -> u32 {
    u32::try_from(depth).unwrap_or(u32::MAX)
}
