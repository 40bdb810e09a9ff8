//! engine::guards
//!
//! Scoped guards for everything the pipeline must undo on exit.
//!
//! # Design
//!
//! Each guard is created *before* the resource it protects is acquired, so a
//! half-finished acquisition (a mount that failed midway, a partially
//! created scratch tree) is still released when the guard drops:
//!
//! - [`Workspace`] owns the scratch tree. Dropping it unmounts whatever is
//!   still mounted under it and deletes the tree, skipping any mount point
//!   that refuses to unmount.
//! - [`IsoMount`] owns the read-only loop mount of the source ISO.
//! - [`ImageMount`] owns one read-write image mount. It must be committed
//!   explicitly; dropping it discards changes.
//!
//! # Invariants
//!
//! - At most one image is mounted at a time. [`ImageMountPoint::mount`]
//!   borrows the mount point mutably for the lifetime of the returned
//!   [`ImageMount`], so a second mount cannot be requested while one is live.
//! - A still-mounted directory is never recursively deleted.

use std::fs;
use std::path::{Path, PathBuf};

use super::BuildError;
use crate::core::paths::WorkLayout;
use crate::core::types::ImageIndex;
use crate::tools::{ImageToolkit, LoopMounter, ToolError, Toolchain};
use crate::ui::output::{self, Verbosity};

// =============================================================================
// Workspace
// =============================================================================

/// What cleanup managed to do.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Mount points that were unmounted during cleanup.
    pub unmounted: Vec<PathBuf>,
    /// Mount points that were still mounted afterwards and left in place.
    pub still_mounted: Vec<PathBuf>,
    /// True when the whole scratch tree was removed.
    pub removed: bool,
}

/// Owner of the scratch tree.
pub struct Workspace<'a> {
    tools: Toolchain<'a>,
    layout: WorkLayout,
    verbosity: Verbosity,
    released: bool,
}

impl<'a> Workspace<'a> {
    /// Create the scratch layout, replacing a stale tree from an earlier run.
    ///
    /// # Errors
    ///
    /// Refuses to touch a scratch tree that still has live mounts under it
    /// or holds anything the builder did not put there. Fails if the
    /// directories cannot be created.
    pub fn create(
        layout: &WorkLayout,
        tools: Toolchain<'a>,
        verbosity: Verbosity,
    ) -> Result<Self, BuildError> {
        let scratch = layout.scratch();
        if scratch.exists() {
            if layout
                .mount_points()
                .iter()
                .any(|p| tools.host.is_mount_point(p))
            {
                return Err(BuildError::ScratchBusy(scratch.to_path_buf()));
            }
            if let Some(entry) = layout
                .foreign_entry()
                .map_err(super::io_error(scratch))?
            {
                return Err(BuildError::ScratchNotOwned {
                    scratch: scratch.to_path_buf(),
                    entry,
                });
            }
            output::warn(format!(
                "removing stale scratch directory '{}'",
                scratch.display()
            ));
            fs::remove_dir_all(scratch).map_err(super::io_error(scratch))?;
        }

        let workspace = Self {
            tools,
            layout: layout.clone(),
            verbosity,
            released: false,
        };
        for dir in layout.directories() {
            fs::create_dir_all(&dir).map_err(super::io_error(&dir))?;
        }
        output::debug(
            format!("created scratch tree at '{}'", scratch.display()),
            verbosity,
        );
        Ok(workspace)
    }

    /// Unmount leftovers and delete the scratch tree. Never fails; problems
    /// are reported as warnings. Idempotent.
    pub fn release(&mut self) -> CleanupReport {
        if self.released {
            return CleanupReport::default();
        }
        self.released = true;

        release_scratch(&self.layout, self.tools, self.verbosity)
    }
}

impl Drop for Workspace<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Unmount whatever is still mounted under `layout` and delete the tree,
/// keeping any mount point that refuses to go.
fn release_scratch(
    layout: &WorkLayout,
    tools: Toolchain<'_>,
    verbosity: Verbosity,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    let host = tools.host;
    let wim_mount = layout.wim_mount();
    if host.is_mount_point(&wim_mount) {
        match tools.imagex.unmount(&wim_mount, false) {
            Ok(()) => report.unmounted.push(wim_mount),
            Err(e) => output::debug(format!("cleanup: {}", e), verbosity),
        }
    }
    let iso_mount = layout.iso_mount();
    if host.is_mount_point(&iso_mount) {
        match tools.loop_mounter.unmount(&iso_mount) {
            Ok(()) => report.unmounted.push(iso_mount),
            Err(e) => output::debug(format!("cleanup: {}", e), verbosity),
        }
    }

    report.still_mounted = layout
        .mount_points()
        .into_iter()
        .filter(|p| host.is_mount_point(p))
        .collect();

    let scratch = layout.scratch();
    if !scratch.exists() {
        report.removed = true;
        return report;
    }
    if report.still_mounted.is_empty() {
        match fs::remove_dir_all(scratch) {
            Ok(()) => report.removed = true,
            Err(e) => output::warn(format!(
                "could not remove scratch directory '{}': {}",
                scratch.display(),
                e
            )),
        }
    } else {
        for dir in &report.still_mounted {
            output::warn(format!(
                "'{}' is still mounted; leaving it in place",
                dir.display()
            ));
        }
        remove_children_except(scratch, &report.still_mounted);
    }
    report
}

/// Cleanup for a run that is being abandoned mid-stage, typically from an
/// interrupt handler while the pipeline thread is still busy.
///
/// Does nothing when the scratch tree is absent or holds anything the
/// builder did not create.
pub fn release_abandoned(
    layout: &WorkLayout,
    tools: Toolchain<'_>,
    verbosity: Verbosity,
) -> Option<CleanupReport> {
    match layout.foreign_entry() {
        Ok(None) => Some(release_scratch(layout, tools, verbosity)),
        Ok(Some(_)) | Err(_) => None,
    }
}

/// Best-effort removal of everything in `dir` except the `keep` entries.
fn remove_children_except(dir: &Path, keep: &[PathBuf]) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if keep.contains(&path) {
            continue;
        }
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = result {
            output::warn(format!("could not remove '{}': {}", path.display(), e));
        }
    }
}

// =============================================================================
// Source ISO mount
// =============================================================================

/// Read-only loop mount of the source ISO.
pub struct IsoMount<'a> {
    mounter: &'a dyn LoopMounter,
    dir: PathBuf,
    attempted: bool,
    verbosity: Verbosity,
}

impl<'a> IsoMount<'a> {
    pub fn new(mounter: &'a dyn LoopMounter, dir: PathBuf, verbosity: Verbosity) -> Self {
        Self {
            mounter,
            dir,
            attempted: false,
            verbosity,
        }
    }

    pub fn mount(&mut self, image: &Path) -> Result<(), ToolError> {
        self.attempted = true;
        self.mounter.mount_ro(image, &self.dir)
    }

    pub fn root(&self) -> &Path {
        &self.dir
    }

    /// Unmount now and disarm the guard.
    pub fn release(mut self) -> Result<(), ToolError> {
        self.attempted = false;
        self.mounter.unmount(&self.dir)
    }
}

impl Drop for IsoMount<'_> {
    fn drop(&mut self) {
        if self.attempted {
            if let Err(e) = self.mounter.unmount(&self.dir) {
                output::debug(format!("releasing ISO mount: {}", e), self.verbosity);
            }
        }
    }
}

// =============================================================================
// Image mount
// =============================================================================

/// The single directory images are mounted read-write at.
#[derive(Debug)]
pub struct ImageMountPoint {
    dir: PathBuf,
    verbosity: Verbosity,
}

impl ImageMountPoint {
    pub fn new(dir: PathBuf, verbosity: Verbosity) -> Self {
        Self { dir, verbosity }
    }

    /// Mount `index` of `container` read-write.
    ///
    /// The returned guard borrows the mount point, so it must be committed
    /// or dropped before the next image can be mounted.
    pub fn mount<'a>(
        &'a mut self,
        toolkit: &'a dyn ImageToolkit,
        container: &Path,
        index: ImageIndex,
    ) -> Result<ImageMount<'a>, ToolError> {
        let mut guard = ImageMount {
            toolkit,
            dir: &self.dir,
            armed: true,
            mounted: false,
            verbosity: self.verbosity,
        };
        toolkit.mount_rw(container, index, &self.dir)?;
        guard.mounted = true;
        Ok(guard)
    }
}

/// A live read-write image mount. Dropping it discards changes.
pub struct ImageMount<'a> {
    toolkit: &'a dyn ImageToolkit,
    dir: &'a Path,
    armed: bool,
    mounted: bool,
    verbosity: Verbosity,
}

impl ImageMount<'_> {
    /// Root of the mounted image.
    pub fn root(&self) -> &Path {
        self.dir
    }

    /// Unmount, writing changes back into the container.
    ///
    /// If the commit fails the image is unmounted with discard before the
    /// error is returned, so the mount point is free either way.
    pub fn commit(mut self) -> Result<(), ToolError> {
        self.armed = false;
        let result = self.toolkit.unmount(self.dir, true);
        if result.is_err() {
            self.discard_now();
        }
        result
    }

    /// Unmount without writing changes back.
    pub fn discard(mut self) {
        self.armed = false;
        self.discard_now();
    }

    fn discard_now(&mut self) {
        match self.toolkit.unmount(self.dir, false) {
            Ok(()) => output::debug(
                format!("discarded changes in '{}'", self.dir.display()),
                self.verbosity,
            ),
            Err(e) if self.mounted => output::warn(format!(
                "could not unmount '{}': {}",
                self.dir.display(),
                e
            )),
            Err(e) => output::debug(format!("releasing image mount: {}", e), self.verbosity),
        }
    }
}

impl Drop for ImageMount<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            if self.mounted {
                output::warn(format!(
                    "discarding uncommitted changes in '{}'",
                    self.dir.display()
                ));
            }
            self.discard_now();
        }
    }
}
