//! Breakpoint handlers.
//! - handle_set_breakpoints: replace line breakpoints of one source
//! - handle_set_instruction_breakpoints: replace all instruction breakpoints
//!
//! Once launched, both run a verification pass. Changes to breakpoints of
//! this request are folded into the response; other changes become
//! `breakpoint` events.

use brew_host::{Breakpoint as HostBreakpoint, InstructionBreakpointRequest};
use serde_json::Value;

use crate::protocol::{
    Request, SetBreakpointsArguments, SetBreakpointsResponseBody,
    SetInstructionBreakpointsArguments, SetInstructionBreakpointsResponseBody,
};

use super::super::core::protocol_breakpoint;
use super::super::util::arguments;
use super::super::{DebugAdapter, DispatchOutcome, ErrorCode};

impl DebugAdapter {
    pub(in crate::adapter) fn handle_set_breakpoints(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = arguments::<SetBreakpointsArguments>(&request) else {
            return self.invalid_arguments(&request);
        };
        let Some(path) = args.source.path.as_deref() else {
            return self.invalid_arguments(&request);
        };
        let path = self.resolve_path(path);
        let lines = match (&args.breakpoints, &args.lines) {
            (Some(breakpoints), _) => breakpoints.iter().map(|bp| bp.line).collect(),
            (None, Some(lines)) => lines.clone(),
            (None, None) => Vec::new(),
        };

        let mut created = self.supervisor.set_breakpoints(&path, &lines);
        let others = self.verify_into(&mut created);

        let body = SetBreakpointsResponseBody {
            breakpoints: created.iter().map(protocol_breakpoint).collect(),
        };
        let response = self.ok_response(&request, Some(body));
        let events = others
            .iter()
            .map(|breakpoint| self.breakpoint_event("changed", breakpoint))
            .collect();
        DispatchOutcome {
            responses: vec![response],
            events,
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_set_instruction_breakpoints(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = arguments::<SetInstructionBreakpointsArguments>(&request) else {
            return self.invalid_arguments(&request);
        };
        let requests: Vec<InstructionBreakpointRequest> = args
            .breakpoints
            .iter()
            .map(|breakpoint| InstructionBreakpointRequest {
                reference: breakpoint.instruction_reference.clone(),
                offset: breakpoint.offset.unwrap_or(0),
            })
            .collect();

        let mut created = match self.supervisor.set_instruction_breakpoints(&requests) {
            Ok(created) => created,
            Err(err) => {
                return self.failure(&request, ErrorCode::for_host_error(&err), &err.to_string());
            }
        };
        let others = self.verify_into(&mut created);

        let body = SetInstructionBreakpointsResponseBody {
            breakpoints: created.iter().map(protocol_breakpoint).collect(),
        };
        let response = self.ok_response(&request, Some(body));
        let events = others
            .iter()
            .map(|breakpoint| self.breakpoint_event("changed", breakpoint))
            .collect();
        DispatchOutcome {
            responses: vec![response],
            events,
            ..DispatchOutcome::default()
        }
    }

    /// Verify when launched, updating `created` in place and returning the
    /// changed breakpoints that belong to earlier requests.
    fn verify_into(&self, created: &mut [HostBreakpoint]) -> Vec<HostBreakpoint> {
        if !self.launched {
            return Vec::new();
        }
        let mut others = Vec::new();
        for changed in self.supervisor.verify_breakpoints() {
            match created.iter_mut().find(|breakpoint| breakpoint.id == changed.id) {
                Some(slot) => *slot = changed,
                None => others.push(changed),
            }
        }
        others
    }
}
