//! User input boundary for interactive runs.
//!
//! The session asks every question through [`Prompter`]; the default
//! [`StdinPrompter`] reads plain lines from the terminal. End of input is
//! treated as cancellation.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::assets::AssetKey;
use crate::drives::Drive;
use crate::error::{ProvisionError, Result};

pub trait Prompter {
    /// Index into `drives` of the chosen device, or `None` to cancel.
    fn select_drive(&self, drives: &[Drive]) -> Result<Option<usize>>;

    /// Local path for an asset with no configured path. `None` means the
    /// user has none and the configured URL should be used.
    fn asset_path(&self, key: AssetKey) -> Result<Option<PathBuf>>;

    /// Raw-image partition size in GB. `bound` is the largest valid size.
    fn raw_image_size(&self, default_gb: u64, bound: f64) -> Result<u64>;

    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Line-oriented prompts on stdin/stdout.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl StdinPrompter {
    fn ask(&self, question: &str) -> Result<String> {
        print!("{} ", question);
        io::stdout()
            .flush()
            .map_err(|e| ProvisionError::io("writing prompt", e))?;

        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| ProvisionError::io("reading answer", e))?;
        if read == 0 {
            return Err(ProvisionError::UserCancelled);
        }
        Ok(line.trim().to_string())
    }
}

impl Prompter for StdinPrompter {
    fn select_drive(&self, drives: &[Drive]) -> Result<Option<usize>> {
        println!("Select the USB drive to use:");
        for (i, drive) in drives.iter().enumerate() {
            println!("  {}) {}", i + 1, drive);
        }
        println!("  0) Cancel");

        loop {
            let answer = self.ask(">")?;
            match parse_selection(&answer, drives.len()) {
                Some(choice) => return Ok(choice),
                None => println!("Enter a number between 0 and {}.", drives.len()),
            }
        }
    }

    fn asset_path(&self, key: AssetKey) -> Result<Option<PathBuf>> {
        loop {
            let answer = self.ask(&format!(
                "Path to {} (leave empty to download):",
                key.title()
            ))?;
            match parse_asset_path(&answer) {
                Some(choice) => return Ok(choice),
                None => println!("{} is not a file. Try again.", answer),
            }
        }
    }

    fn raw_image_size(&self, default_gb: u64, bound: f64) -> Result<u64> {
        loop {
            let answer = self.ask(&format!(
                "Size (GB) for Windows To Go partition [max {:.1}] ({}):",
                bound, default_gb
            ))?;
            match parse_size(&answer, default_gb) {
                Some(size) => return Ok(size),
                None => println!("Enter a whole number of GB."),
            }
        }
    }

    fn confirm(&self, message: &str) -> Result<bool> {
        let answer = self.ask(&format!("{} [y/N]:", message))?;
        Ok(parse_yes(&answer))
    }
}

/// `0` cancels; `1..=count` picks a drive.
pub fn parse_selection(answer: &str, count: usize) -> Option<Option<usize>> {
    match answer.trim().parse::<usize>() {
        Ok(0) => Some(None),
        Ok(n) if n <= count => Some(Some(n - 1)),
        _ => None,
    }
}

/// Empty answer means download; anything else must name an existing file.
pub fn parse_asset_path(answer: &str) -> Option<Option<PathBuf>> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Some(None);
    }
    let path = PathBuf::from(answer);
    path.is_file().then_some(Some(path))
}

/// Empty answer takes the default.
pub fn parse_size(answer: &str, default_gb: u64) -> Option<u64> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Some(default_gb);
    }
    answer.parse().ok()
}

pub fn parse_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
