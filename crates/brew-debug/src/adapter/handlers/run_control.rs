//! Continue/step handlers.
//! - handle_continue: resume execution
//! - handle_next/step_in/step_out: stepping commands
//!
//! Each handler enters the stop gate before touching the supervisor, so the
//! stop a step produces is written after the response.

use brew_host::{HostError, SteppingGranularity};
use serde_json::Value;

use crate::protocol::{
    ContinueArguments, ContinueResponseBody, NextArguments, Request, StepInArguments,
    StepOutArguments,
};

use super::super::util::{arguments, stepping_granularity};
use super::super::{DebugAdapter, DispatchOutcome, ErrorCode};

#[derive(Debug, Clone, Copy)]
enum StepKind {
    Over,
    In,
    Out,
}

impl DebugAdapter {
    pub(in crate::adapter) fn handle_continue(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(_args) = arguments::<ContinueArguments>(&request) else {
            return self.invalid_arguments(&request);
        };

        let stop_gate = self.stop_gate.enter();
        if let Err(err) = self.supervisor.continue_execution() {
            return self.failure(&request, ErrorCode::for_host_error(&err), &err.to_string());
        }

        DispatchOutcome {
            responses: vec![self.ok_response(
                &request,
                Some(ContinueResponseBody {
                    all_threads_continued: Some(true),
                }),
            )],
            stop_gate: Some(stop_gate),
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_next(&mut self, request: Request<Value>) -> DispatchOutcome {
        let Some(args) = arguments::<NextArguments>(&request) else {
            return self.invalid_arguments(&request);
        };
        let granularity = stepping_granularity(args.granularity.as_deref());
        self.step(&request, StepKind::Over, granularity)
    }

    pub(in crate::adapter) fn handle_step_in(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = arguments::<StepInArguments>(&request) else {
            return self.invalid_arguments(&request);
        };
        let granularity = stepping_granularity(args.granularity.as_deref());
        self.step(&request, StepKind::In, granularity)
    }

    pub(in crate::adapter) fn handle_step_out(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = arguments::<StepOutArguments>(&request) else {
            return self.invalid_arguments(&request);
        };
        let granularity = stepping_granularity(args.granularity.as_deref());
        self.step(&request, StepKind::Out, granularity)
    }

    fn step(
        &mut self,
        request: &Request<Value>,
        kind: StepKind,
        granularity: SteppingGranularity,
    ) -> DispatchOutcome {
        let stop_gate = self.stop_gate.enter();
        let result: Result<(), HostError> = match kind {
            StepKind::Over => self.supervisor.next(granularity),
            StepKind::In => self.supervisor.step_in(granularity),
            StepKind::Out => self.supervisor.step_out(granularity),
        };
        if let Err(err) = result {
            return self.failure(request, ErrorCode::for_host_error(&err), &err.to_string());
        }
        DispatchOutcome {
            responses: vec![self.ok_response::<Value>(request, None)],
            stop_gate: Some(stop_gate),
            ..DispatchOutcome::default()
        }
    }
}
