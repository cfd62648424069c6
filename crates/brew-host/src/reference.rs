//! Instruction and memory reference helpers.
//!
//! References travel over the wire as `0x<hex>` strings, optionally
//! qualified with the engine type that owns them (`trace:0x4000`).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::HostError;

/// Split an optional `<type>:` qualifier off a reference.
#[must_use]
pub fn split_reference(reference: &str) -> (Option<&str>, &str) {
    match reference.split_once(':') {
        Some((kind, rest)) => (Some(kind), rest),
        None => (None, reference),
    }
}

/// Parse the address part of a reference. The `0x` prefix is required.
pub fn parse_address(reference: &str) -> Result<u64, HostError> {
    let (_, text) = split_reference(reference.trim());
    let malformed = || HostError::MalformedInstructionReference {
        reference: reference.to_string(),
    };
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .ok_or_else(malformed)?;
    u64::from_str_radix(digits, 16).map_err(|_| malformed())
}

/// Apply a signed byte offset to an address.
#[must_use]
pub fn offset_address(address: u64, offset: i64) -> Option<u64> {
    address.checked_add_signed(offset)
}

/// Wire form of an address: `0x` followed by lowercase hex.
#[must_use]
pub fn format_address(address: u64) -> String {
    format!("0x{address:x}")
}

/// Prefix an unqualified reference with the given engine type.
///
/// Returns `None` when the reference is unqualified and no type is known yet.
#[must_use]
pub fn qualify_reference(reference: &str, kind: Option<&str>) -> Option<String> {
    match split_reference(reference) {
        (Some(_), _) => Some(reference.to_string()),
        (None, _) => kind.map(|kind| format!("{kind}:{reference}")),
    }
}

/// Canonicalize a path, keeping it unchanged when it does not exist.
#[must_use]
pub fn canonicalize_lossy(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
