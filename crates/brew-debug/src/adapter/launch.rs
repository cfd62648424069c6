//! Launch argument helpers.
//! - launch_program_path: extract the target (`program` or `projectName`)
//! - launch_workspace_root: workspace root from `cwd`
//! - launch_stop_on_entry: stop-on-entry flag
//! - launch_entry_point: entry point name

use crate::protocol::LaunchArguments;

const DEFAULT_ENTRY_POINT: &str = "main";

pub(super) fn launch_program_path(args: &LaunchArguments) -> Option<String> {
    launch_string(args, "program").or_else(|| launch_string(args, "projectName"))
}

pub(super) fn launch_workspace_root(args: &LaunchArguments) -> Option<String> {
    launch_string(args, "cwd")
}

pub(super) fn launch_stop_on_entry(args: &LaunchArguments) -> bool {
    args.additional
        .get("stopOnEntry")
        .and_then(|value| value.as_bool())
        .unwrap_or(false)
}

pub(super) fn launch_entry_point(args: &LaunchArguments) -> String {
    launch_string(args, "entryPoint").unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_string())
}

fn launch_string(args: &LaunchArguments, key: &str) -> Option<String> {
    args.additional
        .get(key)
        .and_then(|value| value.as_str())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
}
