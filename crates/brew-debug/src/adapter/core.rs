//! Adapter core loop + request dispatch.
//! - DebugAdapter::new: one session over a shared engine registry
//! - run: protocol loop + event pump lifecycle
//! - dispatch_request: route DAP requests
//! - message helpers: responses, events, breakpoint conversion

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use brew_host::{
    Breakpoint as HostBreakpoint, BreakpointKind, EngineRegistry, ExecutionState, HostEvent,
    Supervisor,
};
use crossbeam_channel::unbounded;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::protocol::{
    Breakpoint, BreakpointEventBody, ErrorResponseBody, Event, Message, MessageType,
    OutputEventBody, Request, Response,
};

use super::protocol_io::{
    open_protocol_log, read_message, write_protocol_log, write_value, ProtocolLog, SharedWriter,
};
use super::pump::{host_event_messages, EventPump};
use super::util::source_for_path;
use super::{DebugAdapter, DispatchOutcome, ErrorCode, StopGate};

/// Environment variable naming the DAP transcript file.
const DAP_LOG_ENV: &str = "BREW_DEBUG_DAP_LOG";

impl DebugAdapter {
    #[must_use]
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        let (events, host_events) = unbounded();
        Self {
            supervisor: Supervisor::new(registry, events),
            launched: false,
            workspace_root: None,
            next_seq: Arc::new(AtomicU32::new(1)),
            host_events,
            stop_gate: StopGate::new(),
            pump: None,
        }
    }

    #[must_use]
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Serve requests from `reader` until disconnect or end of stream.
    ///
    /// Supervisor events are written from a second thread. The supervisor is
    /// terminated before this returns.
    pub fn run<R, W>(&mut self, mut reader: R, writer: W) -> io::Result<()>
    where
        R: BufRead,
        W: Write + Send + 'static,
    {
        let writer: SharedWriter = Arc::new(Mutex::new(Box::new(writer)));
        let logger = std::env::var(DAP_LOG_ENV)
            .ok()
            .and_then(|path| open_protocol_log(&path));
        self.pump = Some(EventPump::spawn(
            self.host_events.clone(),
            self.stop_gate.clone(),
            Arc::clone(&writer),
            logger.clone(),
            Arc::clone(&self.next_seq),
        )?);

        let result = self.serve(&mut reader, &writer, logger.as_ref());

        self.supervisor.terminate();
        if let Some(pump) = self.pump.take() {
            pump.flush();
            pump.shutdown();
        }
        result
    }

    fn serve<R: BufRead>(
        &mut self,
        reader: &mut R,
        writer: &SharedWriter,
        logger: Option<&ProtocolLog>,
    ) -> io::Result<()> {
        loop {
            let Some(payload) = read_message(reader)? else {
                debug!("client closed the stream");
                break;
            };
            if let Some(logger) = logger {
                let _ = write_protocol_log(logger, "<-", &payload);
            }

            let request: Request<Value> = match serde_json::from_str(&payload) {
                Ok(request) => request,
                Err(err) => {
                    warn!(%err, "discarding malformed message");
                    continue;
                }
            };

            debug!(seq = request.seq, command = %request.command, "dispatch");
            let outcome = self.dispatch_request(request);
            for message in outcome.responses.iter().chain(&outcome.events) {
                write_value(writer, logger, message)?;
            }
            if outcome.should_exit {
                break;
            }
        }
        Ok(())
    }

    pub(super) fn dispatch_request(&mut self, request: Request<Value>) -> DispatchOutcome {
        if request.message_type != MessageType::Request {
            return DispatchOutcome::default();
        }

        if self.supervisor.has_terminated() && request.command != "disconnect" {
            debug!(command = %request.command, "ignored after termination");
            return DispatchOutcome {
                responses: vec![self.ok_response::<Value>(&request, None)],
                ..DispatchOutcome::default()
            };
        }

        match request.command.as_str() {
            "initialize" => self.handle_initialize(request),
            "launch" => self.handle_launch(request),
            "configurationDone" => self.handle_configuration_done(request),
            "disconnect" => self.handle_disconnect(request),
            "setBreakpoints" => self.handle_set_breakpoints(request),
            "setInstructionBreakpoints" => self.handle_set_instruction_breakpoints(request),
            "threads" => self.handle_threads(request),
            "stackTrace" => self.handle_stack_trace(request),
            "scopes" => self.handle_scopes(request),
            "variables" => self.handle_variables(request),
            "disassemble" => self.handle_disassemble(request),
            "readMemory" => self.handle_read_memory(request),
            "writeMemory" => self.handle_write_memory(request),
            "continue" => self.handle_continue(request),
            "next" => self.handle_next(request),
            "stepIn" => self.handle_step_in(request),
            "stepOut" => self.handle_step_out(request),
            _ => {
                info!(command = %request.command, "unrecognized request");
                self.failure(&request, ErrorCode::UnrecognizedRequest, "unrecognized request")
            }
        }
    }

    /// Resolve a client path against the launch workspace root.
    pub(super) fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Reject passthrough requests unless the debuggee is launched and suspended.
    pub(super) fn require_suspended(&self, request: &Request<Value>) -> Option<DispatchOutcome> {
        if !self.launched {
            return Some(self.failure(request, ErrorCode::NotLaunched, "debuggee not launched"));
        }
        if self.supervisor.execution_state() != ExecutionState::Suspended {
            return Some(self.failure(request, ErrorCode::NotSuspended, "debuggee is running"));
        }
        None
    }

    /// Take the supervisor events queued so far.
    ///
    /// With a running event pump they are written by the pump and nothing is
    /// returned.
    pub(super) fn flush_host_events(&self) -> Vec<HostEvent> {
        match &self.pump {
            Some(pump) => {
                pump.flush();
                Vec::new()
            }
            None => self.host_events.try_iter().collect(),
        }
    }

    fn next_seq(&self) -> u32 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub(super) fn ok_response<T>(&self, request: &Request<Value>, body: Option<T>) -> Value
    where
        T: Serialize,
    {
        let body = body
            .map(|payload| serde_json::to_value(payload))
            .transpose()
            .unwrap_or(None);
        let response = Response {
            seq: self.next_seq(),
            message_type: MessageType::Response,
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        };
        serde_json::to_value(response).unwrap_or(Value::Null)
    }

    pub(super) fn error_response(
        &self,
        request: &Request<Value>,
        code: ErrorCode,
        message: &str,
    ) -> Value {
        let body = ErrorResponseBody {
            error: Message {
                id: code.id(),
                format: message.to_string(),
                show_user: Some(code != ErrorCode::UnrecognizedRequest),
            },
        };
        let response = Response {
            seq: self.next_seq(),
            message_type: MessageType::Response,
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message.to_string()),
            body: Some(body),
        };
        serde_json::to_value(response).unwrap_or(Value::Null)
    }

    pub(super) fn failure(
        &self,
        request: &Request<Value>,
        code: ErrorCode,
        message: &str,
    ) -> DispatchOutcome {
        DispatchOutcome {
            responses: vec![self.error_response(request, code, message)],
            ..DispatchOutcome::default()
        }
    }

    pub(super) fn invalid_arguments(&self, request: &Request<Value>) -> DispatchOutcome {
        let message = format!("invalid {} args", request.command);
        self.failure(request, ErrorCode::InvalidArguments, &message)
    }

    pub(super) fn event<T>(&self, name: &str, body: Option<T>) -> Value
    where
        T: Serialize,
    {
        event_message(&self.next_seq, name, body)
    }

    pub(super) fn output_event(&self, category: &str, output: impl Into<String>) -> Value {
        let mut output = output.into();
        if !output.ends_with('\n') {
            output.push('\n');
        }
        self.event(
            "output",
            Some(OutputEventBody {
                output,
                category: Some(category.to_string()),
            }),
        )
    }

    pub(super) fn host_event_messages(&self, event: HostEvent) -> Vec<Value> {
        host_event_messages(event, &self.next_seq)
    }

    pub(super) fn breakpoint_event(&self, reason: &str, breakpoint: &HostBreakpoint) -> Value {
        let body = BreakpointEventBody {
            reason: reason.to_string(),
            breakpoint: protocol_breakpoint(breakpoint),
        };
        self.event("breakpoint", Some(body))
    }
}

pub(super) fn event_message<T>(seq: &AtomicU32, name: &str, body: Option<T>) -> Value
where
    T: Serialize,
{
    let body = body
        .map(|payload| serde_json::to_value(payload))
        .transpose()
        .unwrap_or(None);
    let event = Event {
        seq: seq.fetch_add(1, Ordering::Relaxed),
        message_type: MessageType::Event,
        event: name.to_string(),
        body,
    };
    serde_json::to_value(event).unwrap_or(Value::Null)
}

pub(super) fn protocol_breakpoint(breakpoint: &HostBreakpoint) -> Breakpoint {
    let mut converted = Breakpoint {
        id: Some(breakpoint.id),
        verified: breakpoint.verified,
        message: breakpoint.message.clone(),
        source: None,
        line: None,
        instruction_reference: None,
        offset: None,
    };
    match &breakpoint.kind {
        BreakpointKind::Line { path, line } => {
            converted.source = Some(source_for_path(path));
            converted.line = Some(*line);
        }
        BreakpointKind::Instruction {
            reference, offset, ..
        } => {
            converted.instruction_reference = Some(reference.clone());
            converted.offset = Some(*offset);
        }
    }
    converted
}
