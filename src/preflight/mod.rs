//! Preflight checks before touching a device.
//!
//! Validates host tools, privileges and configured sources.
//! Run with `usbforge preflight` to check everything is ready.

mod environment;
mod host_tools;
mod types;

use anyhow::{bail, Result};

use crate::config::Config;

pub use host_tools::REQUIRED_TOOLS;
pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(config: &Config) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    // =======================================================================
    // Host Tools
    // =======================================================================
    println!("Checking host tools...");
    checks.extend(host_tools::check_host_tools());

    // =======================================================================
    // Environment
    // =======================================================================
    println!("Checking environment...");
    checks.push(environment::check_privileges());
    checks.push(environment::check_download_dir(&config.download_dir()));

    // =======================================================================
    // Sources
    // =======================================================================
    println!("Checking boot assets...");
    checks.extend(environment::check_assets(config));
    checks.push(environment::check_installer(config));

    println!();

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(config: &Config) -> Result<()> {
    let report = run_preflight(config);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before provisioning.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}
