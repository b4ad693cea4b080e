//! Error kinds for provisioning.
//!
//! Every core operation returns [`ProvisionError`]. The CLI layer wraps these
//! in `anyhow` for context, but tests and the session match on the variants.

use std::path::PathBuf;

use thiserror::Error;

use crate::assets::AssetKey;
use crate::pipeline::ProvisionState;

/// Result alias used throughout the core modules.
pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("No removable drives found")]
    NoRemovableDrive,

    #[error("Asset '{key}' is unavailable: {reason}")]
    AssetUnavailable { key: AssetKey, reason: String },

    #[error(
        "Requested raw-image size {requested} GB exceeds the available bound of {bound:.1} GB"
    )]
    CapacityExceeded { requested: u64, bound: f64 },

    #[error("Command '{command}' failed (exit code {code}){}", format_output(.output))]
    ExternalCommandFailed {
        command: String,
        code: i32,
        output: String,
    },

    #[error("Cancelled by user")]
    UserCancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Could not read block device inventory: {0}")]
    Inventory(String),

    #[error("Boot-menu installer unavailable: {0}")]
    InstallerUnavailable(String),

    #[error("Boot-menu icon '{name}' is unavailable: {reason}")]
    IconUnavailable { name: String, reason: String },

    #[error("{} is already mounted in this scope", .0.display())]
    MountConflict(PathBuf),

    #[error("Cannot run '{attempted}' from state {actual} (expected {expected})")]
    OutOfOrder {
        attempted: &'static str,
        expected: ProvisionState,
        actual: ProvisionState,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    /// Wrap an I/O error with a human-readable context line.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{}", trimmed)
    }
}
