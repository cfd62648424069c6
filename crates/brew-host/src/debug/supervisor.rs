//! Execution supervisor: run-control state and the background step loop.

#![allow(missing_docs)]

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::breakpoints::{
    Breakpoint, BreakpointStore, InstructionBreakpointRequest, LaunchTarget,
};
use super::types::{ExecutionState, HostEvent, OutputCategory, SteppingGranularity, StopReason};
use crate::debuggee::{Debuggee, DisassembledInstruction, MemoryRead, Scope, StackFrame, Variable};
use crate::engine::{EngineRegistry, OutputSink};
use crate::error::{DebuggeeFault, HostError};
use crate::reference::canonicalize_lossy;

/// Upper bound on how long a suspended loop sleeps before rechecking state.
const SUSPEND_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Most instructions a single disassembly returns.
pub const MAX_DISASSEMBLY_COUNT: usize = 4096;

struct SupervisorState {
    execution: ExecutionState,
    granularity: SteppingGranularity,
    /// Deepest call depth a step may stop at; `None` stops at any depth.
    max_stop_frame: Option<usize>,
    stop_on_entry: bool,
    /// Set once a target has been compiled and started.
    target: Option<LaunchTarget>,
    debuggee: Option<Box<dyn Debuggee>>,
    breakpoints: BreakpointStore,
}

type Shared = (Mutex<SupervisorState>, Condvar);

/// Owns one debuggee and the thread that drives it.
pub struct Supervisor {
    state: Arc<Shared>,
    registry: Arc<EngineRegistry>,
    events: Sender<HostEvent>,
    worker: Option<JoinHandle<()>>,
}

impl Supervisor {
    #[must_use]
    pub fn new(registry: Arc<EngineRegistry>, events: Sender<HostEvent>) -> Self {
        Self {
            state: Arc::new((
                Mutex::new(SupervisorState {
                    execution: ExecutionState::Running,
                    granularity: SteppingGranularity::Line,
                    max_stop_frame: None,
                    stop_on_entry: false,
                    target: None,
                    debuggee: None,
                    breakpoints: BreakpointStore::new(),
                }),
                Condvar::new(),
            )),
            registry,
            events,
            worker: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.0.lock()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn execution_state(&self) -> ExecutionState {
        self.lock().execution
    }

    #[must_use]
    pub fn has_terminated(&self) -> bool {
        self.execution_state() == ExecutionState::Terminated
    }

    /// Compile `target` and start a debuggee at `entry_point`.
    ///
    /// Program output is forwarded as [`HostEvent::Output`] on stdout.
    pub fn start(&self, target: &Path, entry_point: &str) -> Result<(), HostError> {
        let kind = self.registry.extension_for(target)?;
        self.registry.compile(target)?;
        let sender = self.events.clone();
        let output: OutputSink = Arc::new(move |text: &str| {
            let _ = sender.send(HostEvent::Output {
                category: OutputCategory::Stdout,
                text: format!("{text}\n"),
            });
        });
        let debuggee = self.registry.start_thread(target, entry_point, output)?;
        info!(target = %target.display(), entry_point, "debuggee started");
        let mut state = self.lock();
        state.target = Some(LaunchTarget {
            path: canonicalize_lossy(target),
            kind,
        });
        state.debuggee = Some(debuggee);
        Ok(())
    }

    /// Suspend with reason `entry` as soon as the loop starts.
    pub fn set_stop_on_entry(&self) {
        self.lock().stop_on_entry = true;
    }

    /// Start the background loop for a started debuggee.
    pub fn spawn(&mut self) -> Result<(), HostError> {
        if self.worker.is_some() {
            return Ok(());
        }
        if self.lock().debuggee.is_none() {
            return Err(HostError::NotLaunched);
        }
        let shared = Arc::clone(&self.state);
        let registry = Arc::clone(&self.registry);
        let events = self.events.clone();
        let handle = thread::Builder::new()
            .name("brew-debuggee".into())
            .spawn(move || run_loop(&shared, &registry, &events))
            .map_err(|err| {
                HostError::Fault(DebuggeeFault::new(format!(
                    "failed to spawn execution thread: {err}"
                )))
            })?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Run a verification pass and return the breakpoints it changed.
    pub fn verify_breakpoints(&self) -> Vec<Breakpoint> {
        let mut state = self.lock();
        let state = &mut *state;
        state.breakpoints.verify(&self.registry, state.target.as_ref())
    }

    pub fn set_breakpoints(&self, path: &Path, lines: &[u32]) -> Vec<Breakpoint> {
        self.lock().breakpoints.set_line_breakpoints(path, lines)
    }

    pub fn set_instruction_breakpoints(
        &self,
        requests: &[InstructionBreakpointRequest],
    ) -> Result<Vec<Breakpoint>, HostError> {
        self.lock().breakpoints.set_instruction_breakpoints(requests)
    }

    /// Step over: stop at the current depth or shallower.
    pub fn next(&self, granularity: SteppingGranularity) -> Result<(), HostError> {
        self.begin_step(granularity, Some)
    }

    /// Step in: stop at any depth.
    pub fn step_in(&self, granularity: SteppingGranularity) -> Result<(), HostError> {
        self.begin_step(granularity, |_| None)
    }

    /// Step out: stop only after returning to the caller.
    pub fn step_out(&self, granularity: SteppingGranularity) -> Result<(), HostError> {
        self.begin_step(granularity, |depth| Some(depth.saturating_sub(1)))
    }

    fn begin_step(
        &self,
        granularity: SteppingGranularity,
        limit: impl FnOnce(usize) -> Option<usize>,
    ) -> Result<(), HostError> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock();
        if state.execution == ExecutionState::Terminated {
            return Ok(());
        }
        let depth = state
            .debuggee
            .as_ref()
            .ok_or(HostError::NotLaunched)?
            .call_depth();
        state.execution = ExecutionState::Stepping;
        state.granularity = granularity;
        state.max_stop_frame = limit(depth);
        debug!(depth, max_stop_frame = ?state.max_stop_frame, ?granularity, "step requested");
        cvar.notify_all();
        Ok(())
    }

    pub fn continue_execution(&self) -> Result<(), HostError> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock();
        if state.execution == ExecutionState::Terminated {
            return Ok(());
        }
        if state.debuggee.is_none() {
            return Err(HostError::NotLaunched);
        }
        state.execution = ExecutionState::Running;
        state.max_stop_frame = None;
        cvar.notify_all();
        Ok(())
    }

    /// Move to `Terminated` and wait for the background loop to exit.
    ///
    /// No event is sent by the loop once this returns.
    pub fn terminate(&mut self) {
        {
            let (lock, cvar) = &*self.state;
            let mut state = lock.lock();
            state.execution = ExecutionState::Terminated;
            cvar.notify_all();
        }
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("execution thread panicked");
            }
            debug!("execution thread joined");
        }
    }

    fn with_debuggee<T>(&self, read: impl FnOnce(&dyn Debuggee) -> T) -> Result<T, HostError> {
        let state = self.lock();
        let debuggee = state.debuggee.as_deref().ok_or(HostError::NotLaunched)?;
        Ok(read(debuggee))
    }

    /// Frames, innermost first, read fresh from the debuggee.
    pub fn call_stack(&self) -> Result<Vec<StackFrame>, HostError> {
        self.with_debuggee(|debuggee| debuggee.call_stack())
    }

    pub fn scopes(&self, frame_id: u32) -> Result<Vec<Scope>, HostError> {
        self.with_debuggee(|debuggee| debuggee.scopes(frame_id))
    }

    pub fn variables(&self, variables_reference: u32) -> Result<Vec<Variable>, HostError> {
        self.with_debuggee(|debuggee| debuggee.variables(variables_reference))
    }

    /// `count` is clamped to [`MAX_DISASSEMBLY_COUNT`].
    pub fn disassemble(
        &self,
        address: u64,
        instruction_offset: i64,
        count: usize,
    ) -> Result<Vec<DisassembledInstruction>, HostError> {
        let count = count.min(MAX_DISASSEMBLY_COUNT);
        self.with_debuggee(|debuggee| debuggee.disassemble(address, instruction_offset, count))
    }

    pub fn read_memory(&self, address: u64, count: usize) -> Result<MemoryRead, HostError> {
        self.with_debuggee(|debuggee| debuggee.read_memory(address, count))
    }

    pub fn write_memory(&self, address: u64, data: &[u8]) -> Result<usize, HostError> {
        let mut state = self.lock();
        let debuggee = state.debuggee.as_deref_mut().ok_or(HostError::NotLaunched)?;
        Ok(debuggee.write_memory(address, data)?)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn run_loop(shared: &Shared, registry: &EngineRegistry, events: &Sender<HostEvent>) {
    let (lock, cvar) = shared;
    let mut state = lock.lock();
    if state.execution != ExecutionState::Terminated {
        if state.stop_on_entry {
            suspend(&mut state, StopReason::Entry, events);
        } else if let Err(err) = stop_if_necessary(&mut state, registry, events) {
            fail(&mut state, events, &err.to_string());
            return;
        }
    }
    loop {
        match state.execution {
            ExecutionState::Terminated => break,
            ExecutionState::Suspended => {
                cvar.wait_for(&mut state, SUSPEND_POLL_INTERVAL);
            }
            ExecutionState::Running | ExecutionState::Stepping => {
                let outcome = match state.debuggee.as_mut() {
                    Some(debuggee) => debuggee.step(),
                    None => Ok(false),
                };
                match outcome {
                    Ok(true) => {
                        if let Err(err) = stop_if_necessary(&mut state, registry, events) {
                            fail(&mut state, events, &err.to_string());
                            break;
                        }
                        MutexGuard::bump(&mut state);
                    }
                    Ok(false) => {
                        finish(&mut state, events, 0);
                        break;
                    }
                    Err(fault) => {
                        fail(&mut state, events, &fault.message);
                        break;
                    }
                }
            }
        }
    }
    debug!("execution loop finished");
}

fn stop_if_necessary(
    state: &mut SupervisorState,
    registry: &EngineRegistry,
    events: &Sender<HostEvent>,
) -> Result<(), HostError> {
    let Some(debuggee) = state.debuggee.as_deref() else {
        return Ok(());
    };
    let call_stack = debuggee.call_stack();
    let at_line_start = debuggee.at_first_instruction_on_line();
    let Some(frame) = call_stack.first() else {
        return Ok(());
    };
    let file = frame.function.file();
    if registry.is_internal_file(file)? {
        return Ok(());
    }

    let line = frame.line();
    if at_line_start && state.breakpoints.has_line_breakpoint(file, line) {
        suspend(state, StopReason::Breakpoint, events);
    } else if state.breakpoints.has_instruction_breakpoint(frame.pc_address) {
        suspend(state, StopReason::InstructionBreakpoint, events);
    }

    if state.execution == ExecutionState::Stepping {
        let within_limit = state
            .max_stop_frame
            .is_none_or(|max| call_stack.len() <= max);
        let at_boundary = state.granularity == SteppingGranularity::Instruction || at_line_start;
        if within_limit && at_boundary {
            suspend(state, StopReason::Step, events);
        }
    }
    Ok(())
}

fn suspend(state: &mut SupervisorState, reason: StopReason, events: &Sender<HostEvent>) {
    state.execution = ExecutionState::Suspended;
    state.max_stop_frame = None;
    debug!(reason = reason.as_str(), "debuggee suspended");
    let _ = events.send(HostEvent::Stopped { reason });
}

fn finish(state: &mut SupervisorState, events: &Sender<HostEvent>, exit_code: i32) {
    state.execution = ExecutionState::Terminated;
    state.max_stop_frame = None;
    info!(exit_code, "debuggee exited");
    let _ = events.send(HostEvent::Exited { exit_code });
}

fn fail(state: &mut SupervisorState, events: &Sender<HostEvent>, message: &str) {
    warn!(%message, "debuggee fault");
    let _ = events.send(HostEvent::Output {
        category: OutputCategory::Stderr,
        text: format!("{message}\n"),
    });
    finish(state, events, 1);
}
