//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `provision` - Set up a USB drive
//! - `drives` - List removable drives
//! - `plan` - Dry-run the partition plan
//! - `preflight` - Run preflight checks
//! - `show` - Display information

mod drives;
mod plan;
mod preflight;
mod provision;
pub mod show;

pub use drives::cmd_drives;
pub use plan::cmd_plan;
pub use preflight::cmd_preflight;
pub use provision::cmd_provision;
pub use show::cmd_show;
