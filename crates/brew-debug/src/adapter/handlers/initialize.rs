//! Initialize/launch/configuration handlers.
//! - handle_initialize: capabilities + initialized event
//! - handle_launch: compile, verify breakpoints, start execution
//! - handle_configuration_done: acknowledgement only

use brew_host::HostError;
use serde_json::Value;
use tracing::{info, warn};

use crate::protocol::{
    Capabilities, InitializeArguments, InitializeResponseBody, LaunchArguments, Request,
    TerminatedEventBody,
};

use super::super::launch::{
    launch_entry_point, launch_program_path, launch_stop_on_entry, launch_workspace_root,
};
use super::super::util::arguments;
use super::super::{DebugAdapter, DispatchOutcome, ErrorCode, StopGateToken};

impl DebugAdapter {
    pub(in crate::adapter) fn handle_initialize(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let args = arguments::<InitializeArguments>(&request).unwrap_or_default();
        info!(
            client = args.client_id.as_deref().unwrap_or("<unknown>"),
            "initialize"
        );

        let capabilities = Capabilities {
            supports_configuration_done_request: Some(true),
            supports_delayed_stack_trace_loading: Some(true),
            support_terminate_debuggee: Some(true),
            supports_evaluate_for_hovers: Some(true),
            supports_read_memory_request: Some(true),
            supports_write_memory_request: Some(true),
            supports_disassemble_request: Some(true),
            supports_stepping_granularity: Some(true),
            supports_instruction_breakpoints: Some(true),
        };

        let response = self.ok_response(&request, Some(InitializeResponseBody { capabilities }));
        let initialized_event = self.event("initialized", Option::<Value>::None);

        DispatchOutcome {
            responses: vec![response],
            events: vec![initialized_event],
            should_exit: false,
            stop_gate: None,
        }
    }

    pub(in crate::adapter) fn handle_configuration_done(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        DispatchOutcome {
            responses: vec![self.ok_response::<Value>(&request, None)],
            ..DispatchOutcome::default()
        }
    }

    /// Start the debuggee before answering.
    ///
    /// Compile and start failures still answer with success; they are
    /// reported as stderr output followed by `terminated`.
    pub(in crate::adapter) fn handle_launch(&mut self, request: Request<Value>) -> DispatchOutcome {
        if self.launched {
            return self.failure(
                &request,
                ErrorCode::InvalidArguments,
                "debuggee already launched",
            );
        }
        let args = arguments::<LaunchArguments>(&request).unwrap_or_default();
        let Some(program) = launch_program_path(&args) else {
            return self.invalid_arguments(&request);
        };
        self.workspace_root = launch_workspace_root(&args).map(Into::into);
        let target = self.resolve_path(&program);
        let entry_point = launch_entry_point(&args);

        // Held until the response is written so an entry stop cannot overtake it.
        let stop_gate = self.stop_gate.enter();
        let response = self.ok_response::<Value>(&request, None);

        if let Err(err) = self.supervisor.start(&target, &entry_point) {
            return self.launch_failed(response, &err, stop_gate);
        }
        let changed = self.supervisor.verify_breakpoints();
        let mut events: Vec<Value> = changed
            .iter()
            .map(|breakpoint| self.breakpoint_event("changed", breakpoint))
            .collect();
        if launch_stop_on_entry(&args) {
            self.supervisor.set_stop_on_entry();
        }
        if let Err(err) = self.supervisor.spawn() {
            return self.launch_failed(response, &err, stop_gate);
        }
        self.launched = true;
        info!(target = %target.display(), entry_point, "launched");
        events.push(self.output_event(
            "console",
            format!("[brew-debug] launched {} at {entry_point}", target.display()),
        ));

        DispatchOutcome {
            responses: vec![response],
            events,
            should_exit: false,
            stop_gate: Some(stop_gate),
        }
    }

    fn launch_failed(
        &mut self,
        response: Value,
        err: &HostError,
        stop_gate: StopGateToken,
    ) -> DispatchOutcome {
        warn!(%err, "launch failed");
        self.supervisor.terminate();
        let events = vec![
            self.output_event("stderr", err.to_string()),
            self.event("terminated", Some(TerminatedEventBody { restart: None })),
        ];
        DispatchOutcome {
            responses: vec![response],
            events,
            should_exit: false,
            stop_gate: Some(stop_gate),
        }
    }
}
