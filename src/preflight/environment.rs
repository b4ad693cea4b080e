//! Host environment checks (privileges, download dir, configured assets).

use std::fs;
use std::path::Path;

use crate::assets::AssetKey;
use crate::config::Config;

use super::types::CheckResult;

/// Partitioning, formatting and mounting all need root.
pub fn check_privileges() -> CheckResult {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid == 0 {
        CheckResult::pass("root privileges")
    } else {
        CheckResult::fail(
            "root privileges",
            &format!("Running as uid {}. Re-run with sudo.", euid),
        )
    }
}

/// Check the download directory exists or can be created, and is writable.
pub fn check_download_dir(dir: &Path) -> CheckResult {
    let name = "download directory";
    if let Err(e) = fs::create_dir_all(dir) {
        return CheckResult::fail(name, &format!("Cannot create {}: {}", dir.display(), e));
    }

    let probe = dir.join(".preflight-test");
    match fs::write(&probe, "test") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            CheckResult::pass_with(name, &dir.display().to_string())
        }
        Err(e) => CheckResult::fail(name, &format!("Cannot write to {}: {}", dir.display(), e)),
    }
}

/// Each asset needs a local file or a URL to fetch it from.
pub fn check_assets(config: &Config) -> Vec<CheckResult> {
    AssetKey::ALL
        .iter()
        .map(|&key| {
            let name = key.config_name();
            match (config.asset_path(key), config.asset_url(key)) {
                (Some(path), _) if path.is_file() => {
                    CheckResult::pass_with(name, &path.display().to_string())
                }
                (_, Some(url)) => CheckResult::warn(name, &format!("Will download from {}", url)),
                (Some(path), None) => CheckResult::fail(
                    name,
                    &format!("{} does not exist and no URL is configured", path.display()),
                ),
                (None, None) => CheckResult::warn(
                    name,
                    "No path or URL configured; interactive runs will ask, headless runs will fail",
                ),
            }
        })
        .collect()
}

/// A configured installer must exist; otherwise a release is downloaded.
pub fn check_installer(config: &Config) -> CheckResult {
    let name = "Ventoy installer";
    match &config.bootmenu.installer {
        Some(path) if path.is_file() => CheckResult::pass_with(name, &path.display().to_string()),
        Some(path) => CheckResult::fail(name, &format!("{} does not exist", path.display())),
        None => CheckResult::warn(
            name,
            &format!("Will download from {}", config.bootmenu.release_url),
        ),
    }
}
