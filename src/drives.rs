//! Removable drive inventory.
//!
//! Enumerates whole block devices with `lsblk --json`, keeping removable
//! devices and dropping virtual ones (loop, ram, zram, nbd). The returned
//! [`Drive`] values are snapshots; nothing re-queries the device later.

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{ProvisionError, Result};
use crate::process::{Cmd, CommandRunner};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A removable block device, captured at selection time.
#[derive(Debug, Clone, PartialEq)]
pub struct Drive {
    /// Kernel name, e.g. `sdb`.
    pub name: String,
    /// Device node, e.g. `/dev/sdb`.
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Size as shown to the user, e.g. `57.3G`.
    pub size_human: String,
    pub model: String,
    pub removable: bool,
}

impl Drive {
    /// Capacity in GB (1024³ bytes).
    pub fn capacity_gb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_GB
    }

    /// Device node of partition `index` on this drive.
    ///
    /// Devices whose name ends in a digit (`nvme0n1`, `mmcblk0`) use a `p`
    /// separator.
    pub fn partition_path(&self, index: u32) -> PathBuf {
        let base = self.path.to_string_lossy();
        if base.ends_with(|c: char| c.is_ascii_digit()) {
            PathBuf::from(format!("{}p{}", base, index))
        } else {
            PathBuf::from(format!("{}{}", base, index))
        }
    }
}

impl fmt::Display for Drive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {}",
            self.path.display(),
            self.size_human,
            if self.model.is_empty() {
                "(unknown model)"
            } else {
                &self.model
            }
        )
    }
}

/// Enumerate removable drives on the host.
///
/// Returns an empty list (not an error) when none are attached.
pub fn list_removable_drives(runner: &dyn CommandRunner) -> Result<Vec<Drive>> {
    let result = Cmd::new("lsblk")
        .args(["-J", "-b", "-d", "-o", "NAME,RM,SIZE,MODEL,TYPE"])
        .run(runner)?;
    parse_lsblk(&result.stdout)
}

/// Parse `lsblk -J -b` output into removable, non-virtual drives.
pub fn parse_lsblk(json: &str) -> Result<Vec<Drive>> {
    let response: LsblkResponse =
        serde_json::from_str(json).map_err(|e| ProvisionError::Inventory(e.to_string()))?;

    let mut drives = Vec::new();
    for device in response.blockdevices {
        let removable = device.rm.as_ref().map(Flag::is_set).unwrap_or(false);
        if !removable || is_virtual(&device.name) {
            continue;
        }
        if matches!(device.kind.as_deref(), Some(kind) if kind != "disk") {
            continue;
        }

        let size_bytes = device.size.as_ref().map(Size::bytes).unwrap_or(0);
        drives.push(Drive {
            path: PathBuf::from(format!("/dev/{}", device.name)),
            name: device.name,
            size_bytes,
            size_human: human_size(size_bytes),
            model: device.model.unwrap_or_default().trim().to_string(),
            removable,
        });
    }
    Ok(drives)
}

/// True for loop, ram, zram and nbd devices.
pub fn is_virtual(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(loop|ram|zram|nbd)\d*$").expect("valid regex"))
        .is_match(name)
}

/// Format bytes the way lsblk does (binary units, one decimal).
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "K", "M", "G", "T", "P"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}B", bytes)
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}

#[derive(Debug, Deserialize)]
struct LsblkResponse {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(default)]
    rm: Option<Flag>,
    #[serde(default)]
    size: Option<Size>,
    #[serde(default)]
    model: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// Older lsblk prints flags as "0"/"1" strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Number(u8),
    Text(String),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Number(n) => *n != 0,
            Flag::Text(s) => s.trim() == "1" || s.trim().eq_ignore_ascii_case("true"),
        }
    }
}

/// Older lsblk prints sizes as strings even with `-b`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Size {
    Bytes(u64),
    Text(String),
}

impl Size {
    fn bytes(&self) -> u64 {
        match self {
            Size::Bytes(b) => *b,
            Size::Text(s) => s.trim().parse().unwrap_or(0),
        }
    }
}
