//! Extension-keyed engine registry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use smol_str::SmolStr;
use tracing::debug;

use super::{Engine, Function, OutputSink};
use crate::debuggee::Debuggee;
use crate::error::HostError;
use crate::reference::split_reference;

/// Engine key used for directory targets unless overridden.
pub const DEFAULT_DIRECTORY_EXTENSION: &str = "brw";

/// Dispatches engine calls by file extension or reference type.
#[derive(Clone)]
pub struct EngineRegistry {
    engines: HashMap<SmolStr, Arc<dyn Engine>>,
    directory_extension: SmolStr,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.engines.keys().collect();
        keys.sort();
        f.debug_struct("EngineRegistry")
            .field("engines", &keys)
            .field("directory_extension", &self.directory_extension)
            .finish()
    }
}

impl EngineRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
            directory_extension: SmolStr::new(DEFAULT_DIRECTORY_EXTENSION),
        }
    }

    #[must_use]
    pub fn with_directory_extension(mut self, extension: impl Into<SmolStr>) -> Self {
        self.directory_extension = extension.into();
        self
    }

    /// Register `engine` for `extension`, replacing any earlier registration.
    pub fn register(&mut self, extension: impl Into<SmolStr>, engine: Arc<dyn Engine>) {
        let extension = extension.into();
        debug!(%extension, "registered execution engine");
        self.engines.insert(extension, engine);
    }

    #[must_use]
    pub fn directory_extension(&self) -> &str {
        &self.directory_extension
    }

    /// Engine key for a target: the directory extension for directories,
    /// otherwise the file extension.
    pub fn extension_for(&self, path: &Path) -> Result<SmolStr, HostError> {
        if path.is_dir() {
            return Ok(self.directory_extension.clone());
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(SmolStr::new)
            .ok_or_else(|| HostError::MissingExtension {
                path: path.to_path_buf(),
            })
    }

    pub fn engine_for(&self, path: &Path) -> Result<&Arc<dyn Engine>, HostError> {
        let extension = self.extension_for(path)?;
        self.engines
            .get(&extension)
            .ok_or(HostError::UnregisteredExtension { extension })
    }

    pub fn compile(&self, target: &Path) -> Result<(), HostError> {
        self.engine_for(target)?.compile(target)?;
        Ok(())
    }

    pub fn resolve_function(
        &self,
        target: &Path,
        file: &Path,
        line: u32,
    ) -> Result<Option<Arc<dyn Function>>, HostError> {
        Ok(self.engine_for(file)?.resolve_function(target, file, line))
    }

    /// Resolve a qualified `<type>:0x<hex>` reference through the engine
    /// registered for `<type>`.
    pub fn resolve_instruction_reference(
        &self,
        target: &Path,
        reference: &str,
        offset: i64,
    ) -> Result<Option<u64>, HostError> {
        let (Some(kind), _) = split_reference(reference) else {
            return Err(HostError::MalformedInstructionReference {
                reference: reference.to_string(),
            });
        };
        let engine = self.engines.get(kind).ok_or_else(|| {
            HostError::UnregisteredInstructionReferenceType {
                kind: SmolStr::new(kind),
            }
        })?;
        Ok(engine.resolve_instruction_reference(target, reference, offset))
    }

    pub fn start_thread(
        &self,
        target: &Path,
        entry_point: &str,
        output: OutputSink,
    ) -> Result<Box<dyn Debuggee>, HostError> {
        self.engine_for(target)?
            .start_thread(target, entry_point, output)
    }

    pub fn is_internal_file(&self, file: &Path) -> Result<bool, HostError> {
        Ok(self.engine_for(file)?.is_internal_file(file))
    }
}
