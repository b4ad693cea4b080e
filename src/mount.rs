//! Scoped partition mounts.
//!
//! [`MountManager::with_mount`] mounts a partition for the duration of one
//! closure and always unmounts afterwards, whether the closure succeeds,
//! fails or panics. A partition (or mount directory) can only be held by one
//! scope at a time.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ProvisionError, Result};
use crate::process::{Cmd, CommandRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    Mounted,
}

/// A partition mounted at a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountHandle {
    pub partition: PathBuf,
    pub mount_dir: PathBuf,
    pub state: MountState,
}

/// Tracks which partitions are mounted by the current run.
pub struct MountManager<'a> {
    runner: &'a dyn CommandRunner,
    active: RefCell<Vec<MountHandle>>,
}

impl<'a> MountManager<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            active: RefCell::new(Vec::new()),
        }
    }

    /// Mount `partition` at `mount_dir`, run `body` with the mount path, then
    /// unmount.
    ///
    /// `body`'s error takes precedence over an unmount failure; an unmount
    /// failure after a successful body is returned as the error.
    pub fn with_mount<T>(
        &self,
        partition: &Path,
        mount_dir: &Path,
        body: impl FnOnce(&Path) -> Result<T>,
    ) -> Result<T> {
        if self.is_active(partition) || self.is_active(mount_dir) {
            return Err(ProvisionError::MountConflict(partition.to_path_buf()));
        }

        fs::create_dir_all(mount_dir).map_err(|e| {
            ProvisionError::io(
                format!("creating mount point {}", mount_dir.display()),
                e,
            )
        })?;

        Cmd::new("mount")
            .arg_path(partition)
            .arg_path(mount_dir)
            .run(self.runner)?;

        let handle = MountHandle {
            partition: partition.to_path_buf(),
            mount_dir: mount_dir.to_path_buf(),
            state: MountState::Mounted,
        };
        self.active.borrow_mut().push(handle);
        log::debug!("Mounted {} at {}", partition.display(), mount_dir.display());

        let mut guard = MountGuard {
            manager: self,
            mount_dir: mount_dir.to_path_buf(),
            armed: true,
        };

        let outcome = body(mount_dir);
        let unmounted = guard.release();

        match (outcome, unmounted) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(unmount_err)) => {
                log::warn!(
                    "Failed to unmount {} after an earlier error: {}",
                    mount_dir.display(),
                    unmount_err
                );
                Err(e)
            }
        }
    }

    /// True if `path` is a partition or mount directory held by an open
    /// scope.
    pub fn is_active(&self, path: &Path) -> bool {
        self.active
            .borrow()
            .iter()
            .any(|h| h.partition == path || h.mount_dir == path)
    }

    /// Mounts currently held, for diagnostics.
    pub fn active_mounts(&self) -> Vec<MountHandle> {
        self.active.borrow().clone()
    }

    fn unmount(&self, mount_dir: &Path) -> Result<()> {
        Cmd::new("umount").arg_path(mount_dir).run(self.runner)?;
        let mut active = self.active.borrow_mut();
        if let Some(pos) = active.iter().position(|h| h.mount_dir == mount_dir) {
            let mut handle = active.remove(pos);
            handle.state = MountState::Unmounted;
            log::debug!(
                "Unmounted {} from {}",
                handle.partition.display(),
                handle.mount_dir.display()
            );
        }
        Ok(())
    }
}

/// Unmounts on drop if the scope unwinds before [`MountGuard::release`].
struct MountGuard<'m, 'a> {
    manager: &'m MountManager<'a>,
    mount_dir: PathBuf,
    armed: bool,
}

impl MountGuard<'_, '_> {
    fn release(&mut self) -> Result<()> {
        self.armed = false;
        self.manager.unmount(&self.mount_dir)
    }
}

impl Drop for MountGuard<'_, '_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.manager.unmount(&self.mount_dir);
        }
    }
}
