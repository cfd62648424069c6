//! Line and instruction breakpoint storage and verification.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::engine::EngineRegistry;
use crate::error::HostError;
use crate::reference::{canonicalize_lossy, parse_address, qualify_reference};

/// What a breakpoint is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointKind {
    /// 1-based line in a source file.
    Line { path: PathBuf, line: u32 },
    /// Instruction reference plus byte offset; `address` once resolved.
    Instruction {
        reference: String,
        offset: i64,
        address: Option<u64>,
    },
}

/// A client breakpoint and its verification state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u32,
    pub verified: bool,
    pub kind: BreakpointKind,
    /// Reason shown to the user when unverified.
    pub message: Option<String>,
}

impl Breakpoint {
    #[must_use]
    pub fn line(&self) -> Option<u32> {
        match &self.kind {
            BreakpointKind::Line { line, .. } => Some(*line),
            BreakpointKind::Instruction { .. } => None,
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.kind {
            BreakpointKind::Line { path, .. } => Some(path),
            BreakpointKind::Instruction { .. } => None,
        }
    }
}

/// Client request for one instruction breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionBreakpointRequest {
    pub reference: String,
    pub offset: i64,
}

/// The launched program a verification pass resolves against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    /// Canonical path of the target file or directory.
    pub path: PathBuf,
    /// Engine key of the target; qualifies bare instruction references.
    pub kind: SmolStr,
}

/// All breakpoints of a session.
///
/// Line breakpoints are keyed by canonical file path and line, so each line
/// holds at most one. Resolved instruction addresses live in a set.
#[derive(Debug, Default)]
pub struct BreakpointStore {
    next_id: u32,
    lines: IndexMap<PathBuf, BTreeMap<u32, Breakpoint>>,
    instructions: Vec<Breakpoint>,
    addresses: HashSet<u64>,
}

impl BreakpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Replace the line breakpoints of `path`. New breakpoints start unverified.
    pub fn set_line_breakpoints(&mut self, path: &Path, lines: &[u32]) -> Vec<Breakpoint> {
        let path = canonicalize_lossy(path);
        let mut created = Vec::with_capacity(lines.len());
        let mut by_line = BTreeMap::new();
        for &line in lines {
            let breakpoint = Breakpoint {
                id: self.allocate_id(),
                verified: false,
                kind: BreakpointKind::Line {
                    path: path.clone(),
                    line,
                },
                message: None,
            };
            by_line.insert(line, breakpoint.clone());
            created.push(breakpoint);
        }
        debug!(path = %path.display(), count = by_line.len(), "set line breakpoints");
        if by_line.is_empty() {
            self.lines.shift_remove(&path);
        } else {
            self.lines.insert(path, by_line);
        }
        created
    }

    /// Replace all instruction breakpoints.
    ///
    /// Every reference must be `0x`-prefixed hex; a malformed one rejects the
    /// whole request and leaves the store untouched.
    pub fn set_instruction_breakpoints(
        &mut self,
        requests: &[InstructionBreakpointRequest],
    ) -> Result<Vec<Breakpoint>, HostError> {
        for request in requests {
            parse_address(&request.reference)?;
        }
        self.instructions.clear();
        self.addresses.clear();
        for request in requests {
            let breakpoint = Breakpoint {
                id: self.allocate_id(),
                verified: false,
                kind: BreakpointKind::Instruction {
                    reference: request.reference.clone(),
                    offset: request.offset,
                    address: None,
                },
                message: None,
            };
            self.instructions.push(breakpoint);
        }
        Ok(self.instructions.clone())
    }

    /// Run one verification pass and return every breakpoint it changed.
    ///
    /// Everything resolves against the build of `target` only; without a
    /// target nothing resolves. Line breakpoints are resolved through the
    /// function spanning their line; ones that fail to resolve after having
    /// been verified are dropped. Pending instruction breakpoints are
    /// resolved with unqualified references prefixed by the target kind;
    /// unresolved ones stay pending.
    pub fn verify(
        &mut self,
        registry: &EngineRegistry,
        target: Option<&LaunchTarget>,
    ) -> Vec<Breakpoint> {
        let mut changed = Vec::new();
        let Some(target) = target else {
            return changed;
        };
        for (path, by_line) in &mut self.lines {
            verify_file(registry, &target.path, path, by_line, &mut changed);
        }
        self.lines.retain(|_, by_line| !by_line.is_empty());

        for breakpoint in &mut self.instructions {
            let BreakpointKind::Instruction {
                reference,
                offset,
                address,
            } = &mut breakpoint.kind
            else {
                continue;
            };
            if address.is_some() {
                continue;
            }
            let Some(qualified) = qualify_reference(reference, Some(target.kind.as_str())) else {
                continue;
            };
            match registry.resolve_instruction_reference(&target.path, &qualified, *offset) {
                Ok(Some(resolved)) => {
                    *address = Some(resolved);
                    breakpoint.verified = true;
                    breakpoint.message = None;
                    self.addresses.insert(resolved);
                    changed.push(breakpoint.clone());
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(reference = %qualified, %err, "instruction breakpoint pending");
                }
            }
        }
        changed
    }

    #[must_use]
    pub fn has_line_breakpoint(&self, path: &Path, line: u32) -> bool {
        self.lines
            .get(path)
            .is_some_and(|by_line| by_line.contains_key(&line))
    }

    #[must_use]
    pub fn has_instruction_breakpoint(&self, address: u64) -> bool {
        self.addresses.contains(&address)
    }

    /// Active line breakpoints of a file, ordered by line.
    #[must_use]
    pub fn line_breakpoints(&self, path: &Path) -> Vec<Breakpoint> {
        self.lines
            .get(&canonicalize_lossy(path))
            .map(|by_line| by_line.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn instruction_breakpoints(&self) -> &[Breakpoint] {
        &self.instructions
    }
}

fn verify_file(
    registry: &EngineRegistry,
    target: &Path,
    path: &Path,
    by_line: &mut BTreeMap<u32, Breakpoint>,
    changed: &mut Vec<Breakpoint>,
) {
    let lines: Vec<u32> = by_line.keys().copied().collect();
    for line in lines {
        let Some(mut breakpoint) = by_line.remove(&line) else {
            continue;
        };
        let function = match line.checked_sub(1) {
            Some(line0) => registry.resolve_function(target, path, line0).unwrap_or_else(|err| {
                debug!(path = %path.display(), line, %err, "breakpoint unresolved");
                None
            }),
            None => None,
        };
        let Some(function) = function else {
            if breakpoint.verified {
                breakpoint.verified = false;
                breakpoint.message = Some("no code at this line".to_string());
                changed.push(breakpoint);
            } else {
                by_line.insert(line, breakpoint);
            }
            continue;
        };
        let updated = function.update_breakpoint(&mut breakpoint);
        if updated && !breakpoint.verified {
            changed.push(breakpoint);
            continue;
        }
        let new_line = breakpoint.line().unwrap_or(line);
        if new_line != line && by_line.contains_key(&new_line) {
            breakpoint.verified = false;
            breakpoint.message = Some(format!("line {new_line} already has a breakpoint"));
            changed.push(breakpoint);
            continue;
        }
        if updated {
            changed.push(breakpoint.clone());
        }
        by_line.insert(new_line, breakpoint);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::debuggee::Debuggee;
    use crate::engine::trace::TraceEngine;
    use crate::engine::{Engine, Function, OutputSink};
    use crate::error::CompileError;

    const SOURCE: &str = "\
fn main
  call helper

  print done
end

fn helper
  nop
end
";

    fn registry() -> EngineRegistry {
        trace_registry().0
    }

    fn trace_registry() -> (EngineRegistry, Arc<TraceEngine>) {
        let engine = Arc::new(TraceEngine::new());
        engine
            .compile_source(Path::new("/virtual/a.trace"), SOURCE)
            .unwrap();
        let mut registry = EngineRegistry::new();
        registry.register("trace", engine.clone());
        (registry, engine)
    }

    fn target() -> LaunchTarget {
        LaunchTarget {
            path: PathBuf::from("/virtual/a.trace"),
            kind: "trace".into(),
        }
    }

    /// Engine whose single function only verifies once `ready` is set.
    #[derive(Debug, Default)]
    struct LateFunction {
        ready: AtomicBool,
    }

    impl Function for LateFunction {
        fn file(&self) -> &Path {
            Path::new("/virtual/late.stub")
        }

        fn display_name(&self) -> &str {
            "late"
        }

        fn source_line(&self, _pc: u32) -> u32 {
            1
        }

        fn update_breakpoint(&self, breakpoint: &mut Breakpoint) -> bool {
            if breakpoint.verified || !self.ready.load(Ordering::SeqCst) {
                return false;
            }
            breakpoint.verified = true;
            true
        }
    }

    struct LateEngine {
        function: Arc<LateFunction>,
    }

    impl Engine for LateEngine {
        fn compile(&self, _target: &Path) -> Result<(), CompileError> {
            Ok(())
        }

        fn resolve_function(
            &self,
            _target: &Path,
            _file: &Path,
            _line: u32,
        ) -> Option<Arc<dyn Function>> {
            Some(Arc::clone(&self.function) as Arc<dyn Function>)
        }

        fn resolve_instruction_reference(
            &self,
            _target: &Path,
            _reference: &str,
            _offset: i64,
        ) -> Option<u64> {
            None
        }

        fn start_thread(
            &self,
            _target: &Path,
            _entry_point: &str,
            _output: OutputSink,
        ) -> Result<Box<dyn Debuggee>, HostError> {
            Err(HostError::NotLaunched)
        }
    }

    #[test]
    fn set_replaces_file_breakpoints() {
        let mut store = BreakpointStore::new();
        let path = Path::new("/virtual/a.trace");
        let first = store.set_line_breakpoints(path, &[2, 4]);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|bp| !bp.verified));
        store.set_line_breakpoints(path, &[4]);
        assert!(!store.has_line_breakpoint(path, 2));
        assert!(store.has_line_breakpoint(path, 4));
        let ids: Vec<u32> = store.line_breakpoints(path).iter().map(|bp| bp.id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn verification_moves_to_next_executable_line() {
        let registry = registry();
        let mut store = BreakpointStore::new();
        let path = Path::new("/virtual/a.trace");
        store.set_line_breakpoints(path, &[3]);
        let changed = store.verify(&registry, Some(&target()));
        assert_eq!(changed.len(), 1);
        assert!(changed[0].verified);
        assert_eq!(changed[0].line(), Some(4));
        assert!(store.has_line_breakpoint(path, 4));
        assert!(!store.has_line_breakpoint(path, 3));

        // A second pass has nothing left to report.
        assert!(store.verify(&registry, Some(&target())).is_empty());
    }

    #[test]
    fn lines_outside_functions_stay_pending() {
        let registry = registry();
        let mut store = BreakpointStore::new();
        let path = Path::new("/virtual/a.trace");
        store.set_line_breakpoints(path, &[6]);
        assert!(store.verify(&registry, Some(&target())).is_empty());
        assert_eq!(store.line_breakpoints(path).len(), 1);
    }

    #[test]
    fn malformed_instruction_reference_registers_nothing() {
        let mut store = BreakpointStore::new();
        let requests = vec![
            InstructionBreakpointRequest {
                reference: "0x4000".into(),
                offset: 0,
            },
            InstructionBreakpointRequest {
                reference: "4000".into(),
                offset: 0,
            },
        ];
        assert!(store.set_instruction_breakpoints(&requests).is_err());
        assert!(store.instruction_breakpoints().is_empty());
    }

    #[test]
    fn unqualified_instruction_breakpoints_wait_for_target() {
        let registry = registry();
        let mut store = BreakpointStore::new();
        let requests = vec![InstructionBreakpointRequest {
            reference: "0x4000".into(),
            offset: 4,
        }];
        store.set_instruction_breakpoints(&requests).unwrap();
        assert!(store.verify(&registry, None).is_empty());
        assert!(!store.has_instruction_breakpoint(0x4004));

        let changed = store.verify(&registry, Some(&target()));
        assert_eq!(changed.len(), 1);
        assert!(changed[0].verified);
        assert!(store.has_instruction_breakpoint(0x4004));
        assert!(store.verify(&registry, Some(&target())).is_empty());
    }

    #[test]
    fn unresolvable_instruction_stays_unverified() {
        let registry = registry();
        let mut store = BreakpointStore::new();
        let requests = vec![InstructionBreakpointRequest {
            reference: "trace:0x9000".into(),
            offset: 0,
        }];
        store.set_instruction_breakpoints(&requests).unwrap();
        assert!(store.verify(&registry, Some(&target())).is_empty());
        assert!(!store.instruction_breakpoints()[0].verified);
    }

    #[test]
    fn unchanged_unverified_breakpoints_are_retried() {
        let function = Arc::new(LateFunction::default());
        let mut registry = EngineRegistry::new();
        registry.register(
            "stub",
            Arc::new(LateEngine {
                function: Arc::clone(&function),
            }),
        );
        let target = LaunchTarget {
            path: PathBuf::from("/virtual/late.stub"),
            kind: "stub".into(),
        };
        let path = Path::new("/virtual/late.stub");
        let mut store = BreakpointStore::new();
        store.set_line_breakpoints(path, &[2]);

        assert!(store.verify(&registry, Some(&target)).is_empty());
        assert_eq!(store.line_breakpoints(path).len(), 1);

        function.ready.store(true, Ordering::SeqCst);
        let changed = store.verify(&registry, Some(&target));
        assert_eq!(changed.len(), 1);
        assert!(changed[0].verified);
        assert!(store.has_line_breakpoint(path, 2));
    }

    #[test]
    fn breakpoints_lost_by_a_rebuild_are_dropped() {
        let (registry, engine) = trace_registry();
        let mut store = BreakpointStore::new();
        let path = Path::new("/virtual/a.trace");
        store.set_line_breakpoints(path, &[8]);
        let changed = store.verify(&registry, Some(&target()));
        assert_eq!(changed.len(), 1);
        assert!(changed[0].verified);

        engine
            .compile_source(path, "fn main\n  nop\nend\n")
            .unwrap();
        let changed = store.verify(&registry, Some(&target()));
        assert_eq!(changed.len(), 1);
        assert!(!changed[0].verified);
        assert!(changed[0].message.is_some());
        assert!(store.line_breakpoints(path).is_empty());
    }

    #[test]
    fn snapping_onto_an_occupied_line_unverifies_the_mover() {
        let registry = registry();
        let mut store = BreakpointStore::new();
        let path = Path::new("/virtual/a.trace");
        let created = store.set_line_breakpoints(path, &[3, 4]);
        let changed = store.verify(&registry, Some(&target()));
        assert_eq!(changed.len(), 2);

        let moved = changed.iter().find(|bp| bp.id == created[0].id).unwrap();
        assert!(!moved.verified);
        assert_eq!(moved.message.as_deref(), Some("line 4 already has a breakpoint"));
        let kept = changed.iter().find(|bp| bp.id == created[1].id).unwrap();
        assert!(kept.verified);

        let ids: Vec<u32> = store.line_breakpoints(path).iter().map(|bp| bp.id).collect();
        assert_eq!(ids, vec![created[1].id]);
    }

    #[test]
    fn nothing_resolves_without_a_target() {
        let registry = registry();
        let mut store = BreakpointStore::new();
        let path = Path::new("/virtual/a.trace");
        store.set_line_breakpoints(path, &[2]);
        assert!(store.verify(&registry, None).is_empty());
        assert_eq!(store.line_breakpoints(path).len(), 1);
    }
}
