//! Trace: a small line-oriented language used as the bundled engine.
//!
//! ```text
//! fn main          # functions run from `fn NAME` to `end`
//!   set x 4        # locals are integers
//!   call helper
//!   print done; store 0x8000 7
//! end
//! ```
//!
//! Every statement is one instruction. Instructions of a program are laid out
//! 4 bytes apart from `0x4000`; data memory is 256 bytes at `0x8000`.

mod parse;
mod program;
mod thread;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use self::parse::parse_file;
use self::program::Program;
use self::thread::TraceThread;
use super::{Engine, Function, OutputSink};
use crate::debuggee::Debuggee;
use crate::error::{CompileError, HostError};
use crate::reference::{canonicalize_lossy, offset_address, parse_address};

pub use self::program::TraceFunction;

/// File extension of trace sources.
pub const SOURCE_EXTENSION: &str = "trace";

pub(crate) const CODE_BASE: u64 = 0x4000;
pub(crate) const INSTRUCTION_SIZE: u64 = 4;
pub(crate) const DATA_BASE: u64 = 0x8000;
pub(crate) const DATA_SIZE: usize = 256;
pub(crate) const MAX_CALL_DEPTH: usize = 1024;

/// Engine for trace programs.
#[derive(Debug, Default)]
pub struct TraceEngine {
    programs: RwLock<HashMap<PathBuf, Arc<Program>>>,
    internal: Vec<PathBuf>,
}

impl TraceEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat a file, or every file under a directory, as internal code.
    #[must_use]
    pub fn with_internal_path(mut self, path: impl AsRef<Path>) -> Self {
        self.internal.push(canonicalize_lossy(path.as_ref()));
        self
    }

    /// Compile in-memory source as the program for `path`.
    pub fn compile_source(&self, path: &Path, text: &str) -> Result<(), CompileError> {
        let path = canonicalize_lossy(path);
        let functions = parse_file(&path, text)?;
        let program = Program::assemble(vec![(path.clone(), functions)])?;
        self.install(path, program);
        Ok(())
    }

    /// Latest build of `target`.
    fn program(&self, target: &Path) -> Option<Arc<Program>> {
        self.programs.read().get(&canonicalize_lossy(target)).cloned()
    }

    fn install(&self, target: PathBuf, program: Program) {
        info!(
            target = %target.display(),
            functions = program.functions.len(),
            instructions = program.instructions.len(),
            "compiled trace program"
        );
        self.programs.write().insert(target, Arc::new(program));
    }
}

fn source_files(dir: &Path) -> Result<Vec<PathBuf>, CompileError> {
    let pattern = dir.join(format!("*.{SOURCE_EXTENSION}"));
    let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .map_err(|err| CompileError::new(format!("invalid source pattern: {err}")))?
        .filter_map(Result::ok)
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(CompileError::new(format!(
            "{}: no .{SOURCE_EXTENSION} sources",
            dir.display()
        )));
    }
    Ok(files)
}

impl Engine for TraceEngine {
    fn compile(&self, target: &Path) -> Result<(), CompileError> {
        let target = canonicalize_lossy(target);
        let files = if target.is_dir() {
            source_files(&target)?
        } else {
            vec![target.clone()]
        };
        let mut units = Vec::with_capacity(files.len());
        for file in files {
            let text = fs::read_to_string(&file)
                .map_err(|err| CompileError::new(format!("{}: {err}", file.display())))?;
            let functions = parse_file(&file, &text)?;
            units.push((file, functions));
        }
        let program = Program::assemble(units)?;
        self.install(target, program);
        Ok(())
    }

    fn resolve_function(
        &self,
        target: &Path,
        file: &Path,
        line: u32,
    ) -> Option<Arc<dyn Function>> {
        let file = canonicalize_lossy(file);
        self.program(target)?
            .functions
            .iter()
            .find(|function| function.spans(&file, line))
            .map(|function| Arc::clone(function) as Arc<dyn Function>)
    }

    fn resolve_instruction_reference(
        &self,
        target: &Path,
        reference: &str,
        offset: i64,
    ) -> Option<u64> {
        let address = offset_address(parse_address(reference).ok()?, offset)?;
        self.program(target)?
            .instruction_at(address)
            .is_some()
            .then_some(address)
    }

    fn start_thread(
        &self,
        target: &Path,
        entry_point: &str,
        output: OutputSink,
    ) -> Result<Box<dyn Debuggee>, HostError> {
        let program = self.program(target).ok_or_else(|| {
            CompileError::new(format!("{} has not been compiled", target.display()))
        })?;
        let entry = *program
            .by_name
            .get(entry_point)
            .ok_or_else(|| HostError::UnknownEntryPoint {
                name: entry_point.into(),
            })?;
        Ok(Box::new(TraceThread::new(program, entry, output)))
    }

    fn is_internal_file(&self, file: &Path) -> bool {
        self.internal.iter().any(|internal| file.starts_with(internal))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::debug::{Breakpoint, BreakpointKind};

    const SOURCE: &str = "\
fn main
  set x 4
  call helper
  print done
end
fn helper
  print in helper; nop
  store 0x8002 9
end
";

    fn start(engine: &TraceEngine, output: OutputSink) -> Box<dyn Debuggee> {
        engine
            .compile_source(Path::new("/virtual/main.trace"), SOURCE)
            .unwrap();
        engine
            .start_thread(Path::new("/virtual/main.trace"), "main", output)
            .unwrap()
    }

    #[test]
    fn runs_to_completion_and_collects_output() {
        let engine = TraceEngine::new();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let mut thread = start(
            &engine,
            Arc::new(move |text: &str| sink.lock().unwrap().push(text.to_string())),
        );
        let mut steps = 1;
        while thread.step().unwrap() {
            steps += 1;
        }
        assert_eq!(steps, 8);
        assert_eq!(*lines.lock().unwrap(), vec!["in helper", "done"]);
        assert!(thread.call_stack().is_empty());
    }

    #[test]
    fn call_stack_is_innermost_first() {
        let engine = TraceEngine::new();
        let mut thread = start(&engine, Arc::new(|_: &str| {}));
        thread.step().unwrap();
        thread.step().unwrap();
        let stack = thread.call_stack();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[0].function.display_name(), "helper");
        assert_eq!(stack[0].line(), 7);
        assert_eq!(stack[0].pc_reference, "0x4010");
        assert_eq!(stack[1].function.display_name(), "main");
        assert_eq!(stack[1].line(), 4);
        assert!(thread.at_first_instruction_on_line());

        // `nop` shares line 7 with `print`.
        thread.step().unwrap();
        assert_eq!(thread.call_stack()[0].line(), 7);
        assert!(!thread.at_first_instruction_on_line());
    }

    #[test]
    fn locals_and_memory_are_inspectable() {
        let engine = TraceEngine::new();
        let mut thread = start(&engine, Arc::new(|_: &str| {}));
        while thread.call_depth() < 2 {
            thread.step().unwrap();
        }
        assert_eq!(thread.scopes(1)[0].variables_reference, 1);
        assert!(thread.scopes(3).is_empty());
        let variables = thread.variables(1);
        assert_eq!(variables.len(), 1);
        assert_eq!(variables[0].name, "x");
        assert_eq!(variables[0].value, "4");

        for _ in 0..3 {
            thread.step().unwrap();
        }
        let read = thread.read_memory(0x8000, 4);
        assert_eq!(read.data, vec![0, 0, 9, 0]);
        assert_eq!(thread.read_memory(0x80fe, 4).unreadable_bytes, 2);
        assert_eq!(thread.write_memory(0x8000, &[1, 2]).unwrap(), 2);
        assert_eq!(thread.read_memory(0x8000, 2).data, vec![1, 2]);
        assert!(thread.write_memory(0x80ff, &[1, 2]).is_err());
    }

    #[test]
    fn disassembly_pads_with_bad_instructions() {
        let engine = TraceEngine::new();
        let thread = start(&engine, Arc::new(|_: &str| {}));
        let listing = thread.disassemble(0x4000, -1, 3);
        assert_eq!(listing[0].instruction, "(bad)");
        assert_eq!(listing[1].instruction, "set x 4");
        assert_eq!(listing[1].line, Some(2));
        assert_eq!(listing[2].address, 0x4004);
    }

    #[test]
    fn breakpoints_snap_forward_within_function() {
        let engine = TraceEngine::new();
        engine
            .compile_source(Path::new("/virtual/main.trace"), SOURCE)
            .unwrap();
        let function = engine
            .resolve_function(
                Path::new("/virtual/main.trace"),
                Path::new("/virtual/main.trace"),
                5,
            )
            .unwrap();
        assert_eq!(function.display_name(), "helper");
        let mut breakpoint = Breakpoint {
            id: 1,
            verified: false,
            kind: BreakpointKind::Line {
                path: PathBuf::from("/virtual/main.trace"),
                line: 6,
            },
            message: None,
        };
        assert!(function.update_breakpoint(&mut breakpoint));
        assert!(breakpoint.verified);
        assert_eq!(breakpoint.line(), Some(7));
        assert!(!function.update_breakpoint(&mut breakpoint));
    }

    #[test]
    fn unknown_entry_point_is_rejected() {
        let engine = TraceEngine::new();
        engine
            .compile_source(Path::new("/virtual/main.trace"), SOURCE)
            .unwrap();
        let err = engine
            .start_thread(Path::new("/virtual/main.trace"), "Main.main", Arc::new(|_: &str| {}))
            .err()
            .unwrap();
        assert_eq!(
            err,
            HostError::UnknownEntryPoint {
                name: "Main.main".into()
            }
        );
    }

    #[test]
    fn internal_paths_cover_directories() {
        let engine = TraceEngine::new().with_internal_path("/virtual/lib");
        assert!(engine.is_internal_file(Path::new("/virtual/lib/io.trace")));
        assert!(!engine.is_internal_file(Path::new("/virtual/main.trace")));
    }

    #[test]
    fn directory_targets_compile_every_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.trace"), "fn helper\n  nop\nend\n").unwrap();
        fs::write(dir.path().join("a.trace"), "fn main\n  call helper\nend\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "not code").unwrap();
        let engine = TraceEngine::new();
        engine.compile(dir.path()).unwrap();
        let mut thread = engine
            .start_thread(dir.path(), "main", Arc::new(|_: &str| {}))
            .unwrap();
        thread.step().unwrap();
        let stack = thread.call_stack();
        assert!(stack[0].function.file().ends_with("b.trace"));
        // a.trace sorts first, so helper starts after main's two instructions.
        assert_eq!(stack[0].pc_address, 0x4008);
    }
}
