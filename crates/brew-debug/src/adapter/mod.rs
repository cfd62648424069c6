//! Debug adapter module map.
//! - core: main loop, dispatch, protocol messages
//! - handlers: DAP request handlers by area
//! - pump: supervisor event forwarding thread
//! - protocol_io: message framing + logging
//! - launch: launch argument helpers
//! - util: small shared helpers
//! - tests: adapter unit tests

mod core;
mod handlers;
mod launch;
mod protocol_io;
mod pump;
mod util;


use std::path::PathBuf;
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Condvar, Mutex};

use brew_host::{HostError, HostEvent, Supervisor};
use crossbeam_channel::Receiver;
use serde_json::Value;

use self::pump::EventPump;

/// Every session drives exactly one debuggee thread.
const THREAD_ID: u32 = 1;

/// Error identifiers carried in `ErrorResponseBody.error.id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    InvalidArguments = 1001,
    NotLaunched = 1002,
    NotSuspended = 1003,
    MalformedInstructionReference = 1004,
    EngineFailure = 1005,
    UnrecognizedRequest = 1012,
}

impl ErrorCode {
    fn id(self) -> u32 {
        self as u32
    }

    fn for_host_error(err: &HostError) -> Self {
        match err {
            HostError::MalformedInstructionReference { .. } => Self::MalformedInstructionReference,
            HostError::NotLaunched => Self::NotLaunched,
            _ => Self::EngineFailure,
        }
    }
}

/// One DAP session bound to a single supervisor.
pub struct DebugAdapter {
    supervisor: Supervisor,
    launched: bool,
    workspace_root: Option<PathBuf>,
    next_seq: Arc<AtomicU32>,
    host_events: Receiver<HostEvent>,
    stop_gate: StopGate,
    pump: Option<EventPump>,
}

#[derive(Debug, Default)]
struct DispatchOutcome {
    responses: Vec<Value>,
    events: Vec<Value>,
    should_exit: bool,
    stop_gate: Option<StopGateToken>,
}

/// Holds supervisor events back while a dispatch outcome is being written.
#[derive(Debug, Clone)]
struct StopGate {
    inner: Arc<StopGateInner>,
}

#[derive(Debug)]
struct StopGateInner {
    count: Mutex<usize>,
    cvar: Condvar,
}

#[derive(Debug)]
struct StopGateToken {
    inner: Arc<StopGateInner>,
}

impl StopGate {
    fn new() -> Self {
        Self {
            inner: Arc::new(StopGateInner {
                count: Mutex::new(0),
                cvar: Condvar::new(),
            }),
        }
    }

    fn enter(&self) -> StopGateToken {
        let mut count = self.inner.count.lock().expect("stop gate poisoned");
        *count = count.saturating_add(1);
        StopGateToken {
            inner: Arc::clone(&self.inner),
        }
    }

    fn wait_clear(&self) {
        let mut count = self.inner.count.lock().expect("stop gate poisoned");
        while *count > 0 {
            count = self.inner.cvar.wait(count).expect("stop gate poisoned");
        }
    }
}

impl Drop for StopGateToken {
    fn drop(&mut self) {
        let mut count = self.inner.count.lock().expect("stop gate poisoned");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.inner.cvar.notify_all();
        }
    }
}
