//! One provisioning run, from drive selection to a finished device.
//!
//! Interactive and headless runs share this flow; they differ only in where
//! answers come from. Nothing touches the device until the plan is printed
//! and (interactively) confirmed.

use std::path::PathBuf;

use crate::assets::{AssetKey, AssetResolver, Downloader, ResolvedAssets};
use crate::config::Config;
use crate::drives::{self, Drive};
use crate::error::{ProvisionError, Result};
use crate::pipeline::{bootmenu, Pipeline, ProvisionState, Services};
use crate::planner::{self, ProvisioningPlan};
use crate::process::CommandRunner;
use crate::progress::ProgressSink;
use crate::prompt::Prompter;

/// Where answers come from.
#[derive(Clone, Copy)]
pub enum Mode<'a> {
    Interactive(&'a dyn Prompter),
    /// Everything from configuration; first drive; no confirmation.
    Headless,
}

pub struct Session<'a> {
    config: &'a Config,
    mode: Mode<'a>,
    runner: &'a dyn CommandRunner,
    downloader: &'a dyn Downloader,
    progress: &'a dyn ProgressSink,
}

impl<'a> Session<'a> {
    pub fn new(
        config: &'a Config,
        mode: Mode<'a>,
        runner: &'a dyn CommandRunner,
        downloader: &'a dyn Downloader,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            config,
            mode,
            runner,
            downloader,
            progress,
        }
    }

    /// Provision a device end to end. Returns the final pipeline state.
    pub fn run(&self) -> Result<ProvisionState> {
        let drive = self.select_drive()?;
        println!("Using {}", drive);

        let resolver = AssetResolver::new(self.downloader, self.progress, self.config.download_dir());
        let assets = self.resolve_assets(&resolver)?;

        let installer = bootmenu::locate_installer(
            &self.config.bootmenu,
            &self.installer_cache_dir(),
            self.runner,
            &resolver,
        )?;

        let plan = self.plan_for(&drive)?;
        println!();
        plan.print();
        println!();

        if let Mode::Interactive(prompter) = self.mode {
            if !prompter.confirm("Proceed with installation? This will ERASE the USB.")? {
                println!("Cancelled.");
                return Err(ProvisionError::UserCancelled);
            }
        }

        let services = Services {
            runner: self.runner,
            resolver: &resolver,
            progress: self.progress,
        };
        let mut pipeline = Pipeline::new(drive, plan, assets, installer, self.config, services)?;

        if let Err(e) = pipeline.run() {
            let state = pipeline.state();
            eprintln!(
                "Failed at step '{}'; device left in state {}",
                state.next_step().unwrap_or("finalize"),
                state
            );
            return Err(e);
        }

        Ok(pipeline.state())
    }

    /// The device to provision. An empty inventory is a hard stop.
    pub fn select_drive(&self) -> Result<Drive> {
        let mut drives = drives::list_removable_drives(self.runner)?;
        if drives.is_empty() {
            return Err(ProvisionError::NoRemovableDrive);
        }

        let index = match self.mode {
            Mode::Headless => 0,
            Mode::Interactive(prompter) => match prompter.select_drive(&drives)? {
                Some(i) if i < drives.len() => i,
                Some(i) => {
                    return Err(ProvisionError::InvalidConfig(format!(
                        "drive selection {} out of range",
                        i
                    )))
                }
                None => return Err(ProvisionError::UserCancelled),
            },
        };

        Ok(drives.swap_remove(index))
    }

    /// Resolve every asset once, before any device operation.
    pub fn resolve_assets(&self, resolver: &AssetResolver<'_>) -> Result<ResolvedAssets> {
        let mut assets = ResolvedAssets::new();

        for key in AssetKey::ALL {
            let hint: Option<PathBuf> = match (self.config.asset_path(key), self.mode) {
                (Some(path), _) => Some(path.to_path_buf()),
                (None, Mode::Interactive(prompter)) => prompter.asset_path(key)?,
                (None, Mode::Headless) => None,
            };

            let asset = resolver.resolve_verified(
                key,
                hint.as_deref(),
                self.config.asset_url(key),
                self.config.asset_checksum(key),
            )?;
            log::debug!("{} -> {}", key, asset.path.display());
            assets.insert(asset);
        }

        Ok(assets)
    }

    /// Plan the device layout.
    ///
    /// Interactive runs ask for the raw-image size and ask again while it is
    /// out of bounds; headless runs fail with the bound.
    pub fn plan_for(&self, drive: &Drive) -> Result<ProvisioningPlan> {
        let partition = &self.config.partition;
        let total_gb = drive.capacity_gb();

        let prompter = match self.mode {
            Mode::Headless => {
                return planner::plan(
                    total_gb,
                    partition.kali_size_gb,
                    partition.wtg_size_gb,
                    partition.min_free_gb,
                )
            }
            Mode::Interactive(prompter) => prompter,
        };

        let bound = planner::max_raw_image_gb(total_gb, partition.kali_size_gb, partition.min_free_gb);
        let default_gb = partition
            .wtg_size_gb
            .unwrap_or_else(|| planner::default_raw_image_gb(bound));

        loop {
            let requested = prompter.raw_image_size(default_gb, bound)?;
            match planner::plan(
                total_gb,
                partition.kali_size_gb,
                Some(requested),
                partition.min_free_gb,
            ) {
                Err(ProvisionError::CapacityExceeded { bound, .. }) if bound >= 1.0 => {
                    println!("Size must be between 1 and {:.1} GB.", bound);
                }
                other => return other,
            }
        }
    }

    fn installer_cache_dir(&self) -> PathBuf {
        self.config.download_dir().join("ventoy")
    }
}
