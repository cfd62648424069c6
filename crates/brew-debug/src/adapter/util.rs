//! Small adapter utilities.
//! - arguments: decode typed request arguments
//! - stepping_granularity: map the DAP granularity field
//! - source_for_path: DAP source for a host path

use std::path::Path;

use brew_host::SteppingGranularity;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::protocol::{Request, Source};

pub(super) fn arguments<T: DeserializeOwned>(request: &Request<Value>) -> Option<T> {
    request
        .arguments
        .clone()
        .and_then(|value| serde_json::from_value::<T>(value).ok())
}

pub(super) fn stepping_granularity(granularity: Option<&str>) -> SteppingGranularity {
    match granularity {
        Some("instruction") => SteppingGranularity::Instruction,
        _ => SteppingGranularity::Line,
    }
}

pub(super) fn source_for_path(path: &Path) -> Source {
    Source {
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        path: Some(path.display().to_string()),
        source_reference: None,
    }
}
