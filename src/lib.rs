//! usbforge library exports.
//!
//! Provisions a removable drive into a multi-boot USB: a Ventoy boot-menu
//! layer, a Kali persistence partition and a Windows To Go partition.
//! The binary is a thin CLI over [`session::Session`]; everything is
//! exposed here for integration testing with fake command runners.

pub mod assets;
pub mod config;
pub mod descriptor;
pub mod drives;
pub mod error;
pub mod mount;
pub mod pipeline;
pub mod planner;
pub mod preflight;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod session;
pub mod stage;
pub mod timing;

pub use error::{ProvisionError, Result};
