//! Adapter lifecycle handlers.
//! - handle_disconnect: terminate the debuggee and close the session

use serde_json::Value;
use tracing::info;

use crate::protocol::{DisconnectArguments, Request, TerminatedEventBody};

use super::super::util::arguments;
use super::super::{DebugAdapter, DispatchOutcome};

impl DebugAdapter {
    /// `terminateDebuggee` defaults to true. Events the supervisor queued
    /// before termination are delivered ahead of `terminated`.
    pub(in crate::adapter) fn handle_disconnect(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let args = arguments::<DisconnectArguments>(&request).unwrap_or_default();
        let terminate = args.terminate_debuggee.unwrap_or(true);
        if terminate {
            self.supervisor.terminate();
        }
        info!(terminate, "disconnect");

        let queued = self.flush_host_events();
        let response = self.ok_response::<Value>(&request, None);
        let mut events: Vec<Value> = queued
            .into_iter()
            .flat_map(|event| self.host_event_messages(event))
            .collect();
        events.push(self.event(
            "terminated",
            Some(TerminatedEventBody {
                restart: args.restart,
            }),
        ));

        DispatchOutcome {
            responses: vec![response],
            events,
            should_exit: true,
            stop_gate: None,
        }
    }
}
