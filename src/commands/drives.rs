//! Drives command - lists removable drives.

use anyhow::Result;

use usbforge::drives;
use usbforge::process::SystemRunner;

/// Execute the drives command.
pub fn cmd_drives() -> Result<()> {
    let drives = drives::list_removable_drives(&SystemRunner)?;
    if drives.is_empty() {
        println!("No removable drives found.");
        return Ok(());
    }

    println!("Removable drives:");
    for drive in &drives {
        println!("  {} ({:.1} GB)", drive, drive.capacity_gb());
    }
    Ok(())
}
