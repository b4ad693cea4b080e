//! Provision command - sets up a multi-boot USB.

use anyhow::{Context, Result};

use usbforge::assets::{DownloadOptions, HttpDownloader};
use usbforge::config::Config;
use usbforge::process::SystemRunner;
use usbforge::progress::ConsoleProgress;
use usbforge::prompt::StdinPrompter;
use usbforge::session::{Mode, Session};

/// Execute the provision command.
pub fn cmd_provision(config: &Config, headless: bool) -> Result<()> {
    let runner = SystemRunner;
    let downloader = HttpDownloader::new(DownloadOptions::default());
    let progress = ConsoleProgress::new();
    let prompter = StdinPrompter;

    let mode = if headless {
        Mode::Headless
    } else {
        Mode::Interactive(&prompter)
    };

    let session = Session::new(config, mode, &runner, &downloader, &progress);
    session.run().context("Provisioning failed")?;

    println!("\nDone! Your USB stick is ready to boot all OSes with persistence and icons.");
    Ok(())
}
