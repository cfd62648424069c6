use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use brew_host::{
    EngineRegistry, ExecutionState, HostError, HostEvent, InstructionBreakpointRequest,
    OutputCategory, SteppingGranularity, StopReason, Supervisor, TraceEngine,
    MAX_DISASSEMBLY_COUNT,
};
use crossbeam_channel::{unbounded, Receiver};
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(5);

const NESTED: &str = "\
fn main
  call helper
  print done
end
fn helper
  print inner
  call leaf
  print after
end
fn leaf
  nop
end
";

struct Session {
    _dir: TempDir,
    root: PathBuf,
    supervisor: Supervisor,
    events: Receiver<HostEvent>,
}

impl Session {
    fn new(files: &[(&str, &str)]) -> Self {
        Self::with_engine(files, |_| TraceEngine::new())
    }

    fn with_engine(files: &[(&str, &str)], engine: impl FnOnce(&Path) -> TraceEngine) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        for (name, text) in files {
            fs::write(root.join(name), text).unwrap();
        }
        let engine = Arc::new(engine(&root));
        let mut registry = EngineRegistry::new().with_directory_extension("trace");
        registry.register("trace", engine.clone());
        registry.register("brw", engine);
        let (tx, rx) = unbounded();
        Self {
            _dir: dir,
            root,
            supervisor: Supervisor::new(Arc::new(registry), tx),
            events: rx,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn launch(&mut self, target: &Path) {
        self.supervisor.start(target, "main").unwrap();
        self.supervisor.verify_breakpoints();
        self.supervisor.spawn().unwrap();
    }

    fn wait_for_stop(&self) -> StopReason {
        loop {
            match self.events.recv_timeout(TIMEOUT).expect("host event") {
                HostEvent::Stopped { reason } => return reason,
                HostEvent::Exited { exit_code } => panic!("exited ({exit_code}) before stopping"),
                HostEvent::Output { .. } => {}
            }
        }
    }

    fn wait_for_exit(&self) -> (i32, Vec<String>) {
        let mut output = Vec::new();
        loop {
            match self.events.recv_timeout(TIMEOUT).expect("host event") {
                HostEvent::Exited { exit_code } => return (exit_code, output),
                HostEvent::Output { text, .. } => output.push(text),
                HostEvent::Stopped { reason } => panic!("unexpected stop: {reason:?}"),
            }
        }
    }

    fn top(&self) -> (String, u32, usize) {
        let stack = self.supervisor.call_stack().unwrap();
        let frame = &stack[0];
        (
            frame.function.display_name().to_string(),
            frame.line(),
            stack.len(),
        )
    }
}

#[test]
fn first_reached_line_breakpoint_suspends() {
    let source = "\
fn main
  set x 1
  print one
  call other
end
fn other
  print two
end
";
    let mut session = Session::new(&[("a.brw", source)]);
    let target = session.path("a.brw");
    session.supervisor.set_breakpoints(&target, &[3, 7]);
    session.launch(&target);

    assert_eq!(session.wait_for_stop(), StopReason::Breakpoint);
    assert_eq!(session.top(), ("main".to_string(), 3, 1));
    assert_eq!(
        session.supervisor.execution_state(),
        ExecutionState::Suspended
    );

    session.supervisor.continue_execution().unwrap();
    assert_eq!(session.wait_for_stop(), StopReason::Breakpoint);
    assert_eq!(session.top(), ("other".to_string(), 7, 2));

    session.supervisor.continue_execution().unwrap();
    let (exit_code, output) = session.wait_for_exit();
    assert_eq!(exit_code, 0);
    assert_eq!(output, vec!["two\n".to_string()]);
    assert!(session.supervisor.has_terminated());
}

#[test]
fn next_skips_deeper_calls() {
    let mut session = Session::new(&[("main.trace", NESTED)]);
    let target = session.path("main.trace");
    session.supervisor.set_breakpoints(&target, &[2]);
    session.launch(&target);
    assert_eq!(session.wait_for_stop(), StopReason::Breakpoint);
    assert_eq!(session.top(), ("main".to_string(), 2, 1));

    session.supervisor.next(SteppingGranularity::Line).unwrap();
    assert_eq!(session.wait_for_stop(), StopReason::Step);
    assert_eq!(session.top(), ("main".to_string(), 3, 1));
}

#[test]
fn step_in_stops_in_callee() {
    let mut session = Session::new(&[("main.trace", NESTED)]);
    let target = session.path("main.trace");
    session.supervisor.set_breakpoints(&target, &[2]);
    session.launch(&target);
    assert_eq!(session.wait_for_stop(), StopReason::Breakpoint);

    session.supervisor.step_in(SteppingGranularity::Line).unwrap();
    assert_eq!(session.wait_for_stop(), StopReason::Step);
    assert_eq!(session.top(), ("helper".to_string(), 6, 2));
}

#[test]
fn step_out_returns_to_caller() {
    let mut session = Session::new(&[("main.trace", NESTED)]);
    let target = session.path("main.trace");
    session.supervisor.set_breakpoints(&target, &[11]);
    session.launch(&target);
    assert_eq!(session.wait_for_stop(), StopReason::Breakpoint);
    assert_eq!(session.top(), ("leaf".to_string(), 11, 3));

    session.supervisor.step_out(SteppingGranularity::Line).unwrap();
    assert_eq!(session.wait_for_stop(), StopReason::Step);
    assert_eq!(session.top(), ("helper".to_string(), 8, 2));
}

#[test]
fn instruction_granularity_stops_mid_line() {
    let source = "fn main\n  set x 1; set y 2\n  print done\nend\n";
    let mut session = Session::new(&[("main.trace", source)]);
    let target = session.path("main.trace");
    session.supervisor.set_stop_on_entry();
    session.launch(&target);
    assert_eq!(session.wait_for_stop(), StopReason::Entry);

    session
        .supervisor
        .next(SteppingGranularity::Instruction)
        .unwrap();
    assert_eq!(session.wait_for_stop(), StopReason::Step);
    let stack = session.supervisor.call_stack().unwrap();
    assert_eq!(stack[0].line(), 2);
    assert_eq!(stack[0].pc_reference, "0x4004");

    session.supervisor.next(SteppingGranularity::Line).unwrap();
    assert_eq!(session.wait_for_stop(), StopReason::Step);
    assert_eq!(session.top(), ("main".to_string(), 3, 1));
}

#[test]
fn instruction_breakpoint_suspends_at_address() {
    let mut session = Session::new(&[("main.trace", NESTED)]);
    let target = session.path("main.trace");
    let created = session
        .supervisor
        .set_instruction_breakpoints(&[InstructionBreakpointRequest {
            reference: "0x4010".into(),
            offset: 0,
        }])
        .unwrap();
    assert!(!created[0].verified);
    session.supervisor.start(&target, "main").unwrap();
    let changed = session.supervisor.verify_breakpoints();
    assert_eq!(changed.len(), 1);
    assert!(changed[0].verified);
    session.supervisor.spawn().unwrap();

    assert_eq!(
        session.wait_for_stop(),
        StopReason::InstructionBreakpoint
    );
    let stack = session.supervisor.call_stack().unwrap();
    assert_eq!(stack[0].pc_reference, "0x4010");
    assert_eq!(stack[0].line(), 7);
}

#[test]
fn malformed_instruction_reference_is_rejected() {
    let session = Session::new(&[("main.trace", NESTED)]);
    let err = session
        .supervisor
        .set_instruction_breakpoints(&[InstructionBreakpointRequest {
            reference: "4010".into(),
            offset: 0,
        }])
        .unwrap_err();
    assert!(matches!(
        err,
        HostError::MalformedInstructionReference { .. }
    ));
}

#[test]
fn inspection_is_stable_while_suspended() {
    let source = "fn main\n  set x 7\n  call inner\nend\nfn inner\n  set y 1\n  nop\nend\n";
    let mut session = Session::new(&[("main.trace", source)]);
    let target = session.path("main.trace");
    session.supervisor.set_breakpoints(&target, &[7]);
    session.launch(&target);
    assert_eq!(session.wait_for_stop(), StopReason::Breakpoint);

    let describe = |session: &Session| {
        let stack = session.supervisor.call_stack().unwrap();
        let frames: Vec<_> = stack
            .iter()
            .map(|frame| (frame.function.display_name().to_string(), frame.pc_reference.clone()))
            .collect();
        let scopes = session.supervisor.scopes(1).unwrap();
        let variables = session.supervisor.variables(1).unwrap();
        (frames, scopes, variables)
    };
    let first = describe(&session);
    let second = describe(&session);
    assert_eq!(first, second);
    assert_eq!(first.2[0].name, "x");
    assert_eq!(first.2[0].value, "7");
    assert_eq!(session.supervisor.variables(2).unwrap()[0].name, "y");
}

#[test]
fn memory_passthroughs_reach_the_debuggee() {
    let source = "fn main\n  store 0x8001 42\n  nop\nend\n";
    let mut session = Session::new(&[("main.trace", source)]);
    let target = session.path("main.trace");
    session.supervisor.set_breakpoints(&target, &[3]);
    session.launch(&target);
    assert_eq!(session.wait_for_stop(), StopReason::Breakpoint);

    let read = session.supervisor.read_memory(0x8000, 3).unwrap();
    assert_eq!(read.data, vec![0, 42, 0]);
    assert_eq!(session.supervisor.write_memory(0x8002, &[5]).unwrap(), 1);
    assert_eq!(
        session.supervisor.read_memory(0x8002, 1).unwrap().data,
        vec![5]
    );
    let listing = session.supervisor.disassemble(0x4000, 0, 2).unwrap();
    assert_eq!(listing[0].instruction, "store 0x8001 42");
    assert_eq!(listing[1].instruction, "nop");
}

#[test]
fn terminate_joins_a_running_loop() {
    let source = "fn main; print tick; goto 1; end\n";
    let mut session = Session::new(&[("spin.trace", source)]);
    let target = session.path("spin.trace");
    session.launch(&target);
    match session.events.recv_timeout(TIMEOUT).expect("output") {
        HostEvent::Output { category, text } => {
            assert_eq!(category, OutputCategory::Stdout);
            assert_eq!(text, "tick\n");
        }
        other => panic!("unexpected event {other:?}"),
    }

    session.supervisor.terminate();
    assert!(session.supervisor.has_terminated());
    while session.events.try_recv().is_ok() {}
    assert!(session
        .events
        .recv_timeout(Duration::from_millis(200))
        .is_err());
}

#[test]
fn fault_is_reported_and_ends_the_session() {
    let source = "fn main\n  print before\n  fault disk on fire\n  print never\nend\n";
    let mut session = Session::new(&[("boom.trace", source)]);
    let target = session.path("boom.trace");
    session.launch(&target);
    let (exit_code, output) = session.wait_for_exit();
    assert_eq!(exit_code, 1);
    assert_eq!(output, vec!["before\n".to_string(), "disk on fire\n".to_string()]);
    assert!(session.supervisor.has_terminated());
    assert!(session.supervisor.next(SteppingGranularity::Line).is_ok());
}

#[test]
fn internal_files_never_stop() {
    let main = "fn main\n  call util\n  print done\nend\n";
    let lib = "fn util\n  print in util\nend\n";
    let mut session = Session::with_engine(&[("main.trace", main), ("lib.trace", lib)], |root| {
        TraceEngine::new().with_internal_path(root.join("lib.trace"))
    });
    let internal = session.path("lib.trace");
    let target = session.root.clone();
    session.supervisor.set_breakpoints(&internal, &[2]);
    session.supervisor.set_stop_on_entry();
    session.launch(&target);
    assert_eq!(session.wait_for_stop(), StopReason::Entry);

    session.supervisor.step_in(SteppingGranularity::Line).unwrap();
    assert_eq!(session.wait_for_stop(), StopReason::Step);
    assert_eq!(session.top(), ("main".to_string(), 3, 1));
}

#[test]
fn unregistered_extension_fails_to_start() {
    let session = Session::new(&[("prog.xyz", "fn main\nend\n")]);
    let err = session
        .supervisor
        .start(&session.path("prog.xyz"), "main")
        .unwrap_err();
    assert_eq!(
        err,
        HostError::UnregisteredExtension {
            extension: "xyz".into()
        }
    );
}

#[test]
fn disassembly_count_is_bounded() {
    let mut session = Session::new(&[("main.trace", "fn main\n  nop\nend\n")]);
    let target = session.path("main.trace");
    session.supervisor.set_stop_on_entry();
    session.launch(&target);
    assert_eq!(session.wait_for_stop(), StopReason::Entry);

    let listing = session
        .supervisor
        .disassemble(0x4000, 0, u32::MAX as usize)
        .unwrap();
    assert_eq!(listing.len(), MAX_DISASSEMBLY_COUNT);
    assert_eq!(listing[0].instruction, "nop");
    assert_eq!(listing[2].instruction, "(bad)");
    session.supervisor.terminate();
}

#[test]
fn sessions_sharing_an_engine_resolve_against_their_own_target() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let long = root.join("long.trace");
    let short = root.join("short.trace");
    fs::write(&long, format!("fn main\n{}end\n", "  nop\n".repeat(8))).unwrap();
    fs::write(&short, "fn main\n  nop\nend\n").unwrap();

    let mut registry = EngineRegistry::new();
    registry.register("trace", Arc::new(TraceEngine::new()));
    let registry = Arc::new(registry);
    let at_0x4020 = [InstructionBreakpointRequest {
        reference: "0x4020".into(),
        offset: 0,
    }];

    let (first_tx, _first_rx) = unbounded();
    let mut first = Supervisor::new(Arc::clone(&registry), first_tx);
    first.start(&long, "main").unwrap();
    first.set_instruction_breakpoints(&at_0x4020).unwrap();
    let changed = first.verify_breakpoints();
    assert_eq!(changed.len(), 1);
    assert!(changed[0].verified);

    let (second_tx, second_rx) = unbounded();
    let mut second = Supervisor::new(registry, second_tx);
    second.start(&short, "main").unwrap();
    second.set_instruction_breakpoints(&at_0x4020).unwrap();
    second.set_breakpoints(&long, &[3]);
    assert!(second.verify_breakpoints().is_empty());

    second.spawn().unwrap();
    loop {
        match second_rx.recv_timeout(TIMEOUT).expect("host event") {
            HostEvent::Exited { exit_code } => {
                assert_eq!(exit_code, 0);
                break;
            }
            HostEvent::Stopped { reason } => panic!("unexpected stop: {reason:?}"),
            HostEvent::Output { .. } => {}
        }
    }
    first.terminate();
}
