//! The provisioning pipeline.
//!
//! A strict linear state machine over one device:
//!
//! ```text
//! Unprovisioned -> BootLayerInstalled -> PersistenceCreated
//!               -> RawImageCreated -> Staged -> Finalized
//! ```
//!
//! Each transition is one irreversible operation and may only start from
//! its exact predecessor. A failure leaves the pipeline in the last state it
//! reached; nothing is retried or undone.

pub mod bootmenu;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::assets::{AssetKey, AssetResolver, ResolvedAssets};
use crate::config::Config;
use crate::descriptor;
use crate::drives::Drive;
use crate::error::{ProvisionError, Result};
use crate::mount::MountManager;
use crate::planner::{PartitionPurpose, PartitionSpec, ProvisioningPlan};
use crate::process::{Cmd, CommandRunner};
use crate::progress::ProgressSink;
use crate::stage;
use crate::timing::Timer;

/// Marker written to the persistence partition.
pub const PERSISTENCE_CONF: &str = "persistence.conf";
const PERSISTENCE_CONF_CONTENT: &str = "/ union\n";

/// Ventoy's data partition, which holds the ISOs and the descriptor.
const BOOT_LAYER_PARTITION_INDEX: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProvisionState {
    Unprovisioned,
    BootLayerInstalled,
    PersistenceCreated,
    RawImageCreated,
    Staged,
    Finalized,
}

impl ProvisionState {
    /// The step that leaves this state, or `None` when terminal.
    pub fn next_step(self) -> Option<&'static str> {
        match self {
            ProvisionState::Unprovisioned => Some("install boot-menu layer"),
            ProvisionState::BootLayerInstalled => Some("create persistence partition"),
            ProvisionState::PersistenceCreated => Some("create raw-image partition"),
            ProvisionState::RawImageCreated => Some("stage content"),
            ProvisionState::Staged => Some("finalize"),
            ProvisionState::Finalized => None,
        }
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProvisionState::Unprovisioned => "Unprovisioned",
            ProvisionState::BootLayerInstalled => "BootLayerInstalled",
            ProvisionState::PersistenceCreated => "PersistenceCreated",
            ProvisionState::RawImageCreated => "RawImageCreated",
            ProvisionState::Staged => "Staged",
            ProvisionState::Finalized => "Finalized",
        })
    }
}

/// Host capabilities the pipeline acts through.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub runner: &'a dyn CommandRunner,
    pub resolver: &'a AssetResolver<'a>,
    pub progress: &'a dyn ProgressSink,
}

/// Provisions one device according to one plan.
pub struct Pipeline<'a> {
    drive: Drive,
    plan: ProvisioningPlan,
    assets: ResolvedAssets,
    installer: PathBuf,
    config: &'a Config,
    services: Services<'a>,
    mounts: MountManager<'a>,
    state: ProvisionState,
    boot_partition: Option<PathBuf>,
}

impl<'a> Pipeline<'a> {
    /// Take ownership of the plan and assets for `drive`.
    ///
    /// Fails before any device operation if the raw boot image is missing
    /// or the plan lacks one of its partitions.
    pub fn new(
        drive: Drive,
        plan: ProvisioningPlan,
        assets: ResolvedAssets,
        installer: PathBuf,
        config: &'a Config,
        services: Services<'a>,
    ) -> Result<Self> {
        assets.require(AssetKey::RawBootImage)?;
        for purpose in [PartitionPurpose::Persistence, PartitionPurpose::RawImage] {
            if plan.partition(purpose).is_none() {
                return Err(ProvisionError::InvalidConfig(format!(
                    "plan has no {:?} partition",
                    purpose
                )));
            }
        }

        Ok(Self {
            drive,
            plan,
            assets,
            installer,
            config,
            services,
            mounts: MountManager::new(services.runner),
            state: ProvisionState::Unprovisioned,
            boot_partition: None,
        })
    }

    pub fn state(&self) -> ProvisionState {
        self.state
    }

    pub fn drive(&self) -> &Drive {
        &self.drive
    }

    pub fn plan(&self) -> &ProvisioningPlan {
        &self.plan
    }

    /// First partition of the device, known once the boot layer is
    /// installed.
    pub fn boot_partition(&self) -> Option<&Path> {
        self.boot_partition.as_deref()
    }

    /// Run every remaining step in order.
    pub fn run(&mut self) -> Result<()> {
        self.install_boot_layer()?;
        self.create_persistence()?;
        self.create_raw_image()?;
        self.stage_content()?;
        self.finalize()
    }

    // =========================================================================
    // Steps
    // =========================================================================

    /// `Unprovisioned -> BootLayerInstalled`
    pub fn install_boot_layer(&mut self) -> Result<()> {
        self.expect(ProvisionState::Unprovisioned, "install_boot_layer")?;
        let timer = Timer::start("Boot-menu layer installed");

        println!("Installing Ventoy on {}...", self.drive.path.display());
        bootmenu::install(
            self.services.runner,
            &self.installer,
            &self.drive,
            self.plan.reserved_tail_mb(),
        )?;

        self.boot_partition = Some(self.drive.partition_path(BOOT_LAYER_PARTITION_INDEX));
        self.state = ProvisionState::BootLayerInstalled;
        timer.finish();
        Ok(())
    }

    /// `BootLayerInstalled -> PersistenceCreated`
    pub fn create_persistence(&mut self) -> Result<()> {
        self.expect(ProvisionState::BootLayerInstalled, "create_persistence")?;
        let timer = Timer::start("Persistence partition created");

        let spec = self.partition_spec(PartitionPurpose::Persistence)?;
        println!("Creating Kali persistence partition ({})...", spec.size);
        let partition = self.create_partition(&spec)?;

        self.mounts
            .with_mount(&partition, &self.config.mounts.persistence, |dir| {
                let conf = dir.join(PERSISTENCE_CONF);
                fs::write(&conf, PERSISTENCE_CONF_CONTENT)
                    .map_err(|e| ProvisionError::io(format!("writing {}", conf.display()), e))
            })?;

        self.state = ProvisionState::PersistenceCreated;
        timer.finish();
        Ok(())
    }

    /// `PersistenceCreated -> RawImageCreated`
    pub fn create_raw_image(&mut self) -> Result<()> {
        self.expect(ProvisionState::PersistenceCreated, "create_raw_image")?;
        let timer = Timer::start("Raw-image partition created");

        let spec = self.partition_spec(PartitionPurpose::RawImage)?;
        println!("Creating Windows To Go partition ({})...", spec.size);
        let partition = self.create_partition(&spec)?;

        let image = self.assets.require(AssetKey::RawBootImage)?;
        let progress = self.services.progress;
        self.mounts
            .with_mount(&partition, &self.config.mounts.raw_image, |dir| {
                stage::copy_with_progress(&image.path, &dir.join(image.file_name()), progress)
                    .map(|_| ())
            })?;

        self.state = ProvisionState::RawImageCreated;
        timer.finish();
        Ok(())
    }

    /// `RawImageCreated -> Staged`
    pub fn stage_content(&mut self) -> Result<()> {
        self.expect(ProvisionState::RawImageCreated, "stage_content")?;
        let timer = Timer::start("Content staged");

        let partition = self
            .boot_partition
            .clone()
            .unwrap_or_else(|| self.drive.partition_path(BOOT_LAYER_PARTITION_INDEX));
        let assets = self.assets.all_except(AssetKey::RawBootImage);
        let config = self.config;
        let services = self.services;

        println!("Copying ISOs to the Ventoy partition...");
        self.mounts
            .with_mount(&partition, &config.mounts.boot_layer, |dir| {
                let staged = stage::stage(&assets, dir, services.progress)?;

                let families: Vec<&str> = config.icons.keys().map(String::as_str).collect();
                let menu = descriptor::generate_descriptor(
                    &staged,
                    &config.bootmenu.gfxmode,
                    &families,
                );
                descriptor::write_descriptor(dir, &menu, &config.icons, services.resolver)?;
                Ok(())
            })?;

        self.state = ProvisionState::Staged;
        timer.finish();
        Ok(())
    }

    /// `Staged -> Finalized`
    pub fn finalize(&mut self) -> Result<()> {
        self.expect(ProvisionState::Staged, "finalize")?;
        self.state = ProvisionState::Finalized;
        println!("USB setup complete: {}", self.drive);
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn expect(&self, expected: ProvisionState, attempted: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(ProvisionError::OutOfOrder {
                attempted,
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn partition_spec(&self, purpose: PartitionPurpose) -> Result<PartitionSpec> {
        self.plan.partition(purpose).cloned().ok_or_else(|| {
            ProvisionError::InvalidConfig(format!("plan has no {:?} partition", purpose))
        })
    }

    /// Create `spec` with fdisk and format it. Returns the partition path.
    fn create_partition(&self, spec: &PartitionSpec) -> Result<PathBuf> {
        Cmd::new("fdisk")
            .arg_path(&self.drive.path)
            .stdin(spec.fdisk_script())
            .run(self.services.runner)?;

        let partition = self.drive.partition_path(spec.index);
        let (mkfs, extra) = spec.filesystem.mkfs();
        Cmd::new(mkfs)
            .args(extra.iter().copied())
            .arg("-L")
            .arg(&spec.label)
            .arg_path(&partition)
            .run(self.services.runner)?;

        log::debug!(
            "Formatted {} as {} ({})",
            partition.display(),
            spec.filesystem,
            spec.label
        );
        Ok(partition)
    }
}
