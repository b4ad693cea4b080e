//! Capacity planning.
//!
//! A closed-form bound check: the raw-image partition may take whatever is
//! left after the persistence partition and the reserved free margin. The
//! remainder of the device belongs to the boot-menu layer, which the
//! boot-menu installer sizes itself. Nothing here touches the device.

use std::fmt;

use crate::error::{ProvisionError, Result};

/// Ventoy owns partitions 1 (data) and 2 (EFI); ours start after them.
pub const FIRST_PARTITION_INDEX: u32 = 3;

/// Largest raw-image partition chosen when the user doesn't ask for a size.
pub const DEFAULT_RAW_IMAGE_CAP_GB: u64 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filesystem {
    /// Journaling Linux filesystem.
    Ext4,
    /// Windows-compatible filesystem.
    Ntfs,
}

impl Filesystem {
    /// Formatting command and its arguments, before the label and device.
    pub fn mkfs(self) -> (&'static str, &'static [&'static str]) {
        match self {
            Filesystem::Ext4 => ("mkfs.ext4", &[]),
            Filesystem::Ntfs => ("mkfs.ntfs", &["-f"]),
        }
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Filesystem::Ext4 => "ext4",
            Filesystem::Ntfs => "ntfs",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionPurpose {
    Persistence,
    RawImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionSize {
    Gigabytes(u64),
    /// Everything up to the end of the device.
    Remainder,
}

impl fmt::Display for PartitionSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionSize::Gigabytes(gb) => write!(f, "{} GB", gb),
            PartitionSize::Remainder => f.write_str("remainder"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub index: u32,
    pub size: PartitionSize,
    pub filesystem: Filesystem,
    pub label: String,
    /// MBR partition type, e.g. `83` (Linux) or `07` (NTFS).
    pub type_code: String,
    pub purpose: PartitionPurpose,
}

impl PartitionSpec {
    /// Input for `fdisk` creating this as a primary partition and setting
    /// its type.
    pub fn fdisk_script(&self) -> String {
        let size = match self.size {
            PartitionSize::Gigabytes(gb) => format!("+{}G", gb),
            PartitionSize::Remainder => String::new(),
        };
        format!(
            "n\np\n{index}\n\n{size}\nt\n{index}\n{code}\nw\n",
            index = self.index,
            size = size,
            code = self.type_code
        )
    }
}

/// The computed layout for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisioningPlan {
    pub total_gb: f64,
    pub persistence_gb: u64,
    pub raw_image_gb: u64,
    pub min_free_gb: u64,
    /// Upper bound the raw-image size was checked against.
    pub max_raw_image_gb: f64,
    /// Space left to the boot-menu layer (ISOs and free space).
    pub boot_layer_gb: f64,
    /// Partitions created after the boot-menu layer, in creation order.
    pub partitions: Vec<PartitionSpec>,
}

impl ProvisioningPlan {
    pub fn partition(&self, purpose: PartitionPurpose) -> Option<&PartitionSpec> {
        self.partitions.iter().find(|p| p.purpose == purpose)
    }

    /// Space the boot-menu installer must leave unused at the end of the
    /// device, in MB.
    pub fn reserved_tail_mb(&self) -> u64 {
        (self.persistence_gb + self.raw_image_gb) * 1024
    }

    pub fn print(&self) {
        println!("Partition plan:");
        println!(
            "  * Ventoy + ISOs + free space: ~{:.1} GB",
            self.boot_layer_gb
        );
        println!("  * Kali persistence: {} GB", self.persistence_gb);
        println!("  * Windows To Go: {} GB", self.raw_image_gb);
    }
}

/// Largest raw-image size that still leaves `min_free_gb` free.
pub fn max_raw_image_gb(total_gb: f64, persistence_gb: u64, min_free_gb: u64) -> f64 {
    total_gb - persistence_gb as f64 - min_free_gb as f64
}

/// `min(32, floor(max))`, or 0 when nothing fits.
pub fn default_raw_image_gb(max_raw_image_gb: f64) -> u64 {
    if max_raw_image_gb < 1.0 {
        0
    } else {
        (max_raw_image_gb.floor() as u64).min(DEFAULT_RAW_IMAGE_CAP_GB)
    }
}

/// Compute the partition plan for a device.
///
/// `requested_raw_image_gb` of `None` picks the default size. The request
/// (explicit or defaulted) must satisfy `0 < requested <= max`; otherwise
/// [`ProvisionError::CapacityExceeded`] reports the bound.
pub fn plan(
    total_gb: f64,
    persistence_gb: u64,
    requested_raw_image_gb: Option<u64>,
    min_free_gb: u64,
) -> Result<ProvisioningPlan> {
    if !total_gb.is_finite() || total_gb <= 0.0 {
        return Err(ProvisionError::InvalidConfig(format!(
            "device capacity must be a positive number of GB, got {}",
            total_gb
        )));
    }
    if persistence_gb == 0 {
        return Err(ProvisionError::InvalidConfig(
            "persistence partition size must be greater than zero".to_string(),
        ));
    }

    let bound = max_raw_image_gb(total_gb, persistence_gb, min_free_gb);
    let raw_image_gb = requested_raw_image_gb.unwrap_or_else(|| default_raw_image_gb(bound));

    if raw_image_gb == 0 || raw_image_gb as f64 > bound {
        return Err(ProvisionError::CapacityExceeded {
            requested: raw_image_gb,
            bound,
        });
    }

    let partitions = vec![
        PartitionSpec {
            index: FIRST_PARTITION_INDEX,
            size: PartitionSize::Gigabytes(persistence_gb),
            filesystem: Filesystem::Ext4,
            label: "persistence".to_string(),
            type_code: "83".to_string(),
            purpose: PartitionPurpose::Persistence,
        },
        PartitionSpec {
            index: FIRST_PARTITION_INDEX + 1,
            size: PartitionSize::Gigabytes(raw_image_gb),
            filesystem: Filesystem::Ntfs,
            label: "WTG".to_string(),
            type_code: "07".to_string(),
            purpose: PartitionPurpose::RawImage,
        },
    ];

    Ok(ProvisioningPlan {
        total_gb,
        persistence_gb,
        raw_image_gb,
        min_free_gb,
        max_raw_image_gb: bound,
        boot_layer_gb: total_gb - persistence_gb as f64 - raw_image_gb as f64,
        partitions,
    })
}
