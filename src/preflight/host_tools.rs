//! Host tool availability checks.

use crate::process;

use super::types::CheckResult;

/// Tools the pipeline shells out to, with the package that provides them.
pub const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("lsblk", "util-linux", "Required to list removable drives"),
    ("fdisk", "util-linux", "Required to create partitions"),
    ("mkfs.ext4", "e2fsprogs", "Required for the persistence partition"),
    ("mkfs.ntfs", "ntfs-3g", "Required for the Windows To Go partition"),
    ("mount", "util-linux", "Required to stage content"),
    ("umount", "util-linux", "Required to stage content"),
    ("tar", "tar", "Required to extract the Ventoy release"),
    ("sh", "dash or bash", "Required to run Ventoy2Disk.sh"),
];

/// Check host tools are installed.
pub fn check_host_tools() -> Vec<CheckResult> {
    REQUIRED_TOOLS
        .iter()
        .map(|&(tool, package, purpose)| check_tool_exists(tool, package, purpose))
        .collect()
}

/// Check if a tool exists in PATH.
fn check_tool_exists(tool: &str, package: &str, purpose: &str) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path.display().to_string()),
        None => CheckResult::fail(
            tool,
            &format!("Not found. Install '{}' package. {}", package, purpose),
        ),
    }
}
