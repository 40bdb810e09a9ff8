//! core::paths
//!
//! Centralized path routing for the scratch tree.
//!
//! # Storage Layout
//!
//! Everything the builder writes before the final ISO lives under the
//! scratch directory:
//! - `iso_mount/` - read-only loop mount of the source ISO
//! - `wim_mount/` - read-write mount of one OS image at a time
//! - `tiny11/` - writable copy of the ISO contents (the output payload)
//! - `bypass.reg` - registry edit script fed to the hive editor
//! - `autounattend.xml` - downloaded answer file
//!
//! **Hard rule:** no stage computes `scratch.join(..)` itself; all paths go
//! through [`WorkLayout`].
//!
//! # Example
//!
//! ```
//! use tiny11_builder::core::paths::WorkLayout;
//! use std::path::PathBuf;
//!
//! let layout = WorkLayout::new(PathBuf::from("/tmp/work"));
//! assert_eq!(layout.install_wim(), PathBuf::from("/tmp/work/tiny11/sources/install.wim"));
//! ```

use std::path::{Path, PathBuf};

use crate::core::catalog;

const ISO_MOUNT: &str = "iso_mount";
const WIM_MOUNT: &str = "wim_mount";
const STAGE: &str = "tiny11";
const REGISTRY_SCRIPT: &str = "bypass.reg";

/// Every top-level entry the builder may create under the scratch directory.
pub const SCRATCH_ENTRIES: [&str; 5] = [
    ISO_MOUNT,
    WIM_MOUNT,
    STAGE,
    REGISTRY_SCRIPT,
    catalog::ANSWER_FILE_NAME,
];

/// Paths inside the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkLayout {
    scratch: PathBuf,
}

impl WorkLayout {
    pub fn new(scratch: PathBuf) -> Self {
        Self { scratch }
    }

    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    // =========================================================================
    // Mount points and staging
    // =========================================================================

    pub fn iso_mount(&self) -> PathBuf {
        self.scratch.join(ISO_MOUNT)
    }

    pub fn wim_mount(&self) -> PathBuf {
        self.scratch.join(WIM_MOUNT)
    }

    /// Root of the staged ISO tree.
    pub fn stage(&self) -> PathBuf {
        self.scratch.join(STAGE)
    }

    // =========================================================================
    // Containers inside the staged tree
    // =========================================================================

    pub fn install_wim(&self) -> PathBuf {
        self.stage().join(catalog::INSTALL_WIM)
    }

    pub fn install_esd(&self) -> PathBuf {
        self.stage().join(catalog::INSTALL_ESD)
    }

    pub fn boot_wim(&self) -> PathBuf {
        self.stage().join(catalog::BOOT_WIM)
    }

    /// Answer file at the root of the output ISO.
    pub fn staged_answer_file(&self) -> PathBuf {
        self.stage().join(catalog::ANSWER_FILE_NAME)
    }

    // =========================================================================
    // Temp files
    // =========================================================================

    pub fn registry_script(&self) -> PathBuf {
        self.scratch.join(REGISTRY_SCRIPT)
    }

    /// Download target for the answer file, outside any mount.
    pub fn answer_file_download(&self) -> PathBuf {
        self.scratch.join(catalog::ANSWER_FILE_NAME)
    }

    /// First entry directly under the scratch directory that the builder
    /// did not create, if any.
    pub fn foreign_entry(&self) -> std::io::Result<Option<PathBuf>> {
        for entry in std::fs::read_dir(&self.scratch)? {
            let entry = entry?;
            let name = entry.file_name();
            if !SCRATCH_ENTRIES.iter().any(|known| name == *known) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    /// Directories created before staging begins.
    pub fn directories(&self) -> [PathBuf; 3] {
        [self.iso_mount(), self.wim_mount(), self.stage()]
    }

    /// Mount points, in the order cleanup releases them.
    pub fn mount_points(&self) -> [PathBuf; 2] {
        [self.wim_mount(), self.iso_mount()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> WorkLayout {
        WorkLayout::new(PathBuf::from("/w"))
    }

    #[test]
    fn mount_points_live_under_scratch() {
        let l = layout();
        assert_eq!(l.iso_mount(), PathBuf::from("/w/iso_mount"));
        assert_eq!(l.wim_mount(), PathBuf::from("/w/wim_mount"));
        assert_eq!(l.stage(), PathBuf::from("/w/tiny11"));
    }

    #[test]
    fn containers_live_under_stage() {
        let l = layout();
        assert_eq!(l.install_esd(), PathBuf::from("/w/tiny11/sources/install.esd"));
        assert_eq!(l.boot_wim(), PathBuf::from("/w/tiny11/sources/boot.wim"));
        assert_eq!(l.staged_answer_file(), PathBuf::from("/w/tiny11/autounattend.xml"));
    }

    #[test]
    fn scratch_entries_cover_every_top_level_path() {
        let l = layout();
        for path in [
            l.iso_mount(),
            l.wim_mount(),
            l.stage(),
            l.registry_script(),
            l.answer_file_download(),
        ] {
            let name = path.file_name().unwrap();
            assert!(SCRATCH_ENTRIES.iter().any(|known| name == *known));
        }
    }

    #[test]
    fn foreign_entry_spots_unknown_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let l = WorkLayout::new(dir.path().to_path_buf());
        std::fs::create_dir(l.stage()).unwrap();
        std::fs::write(l.registry_script(), "").unwrap();
        assert_eq!(l.foreign_entry().unwrap(), None);

        std::fs::write(dir.path().join("win11.iso"), "").unwrap();
        assert_eq!(l.foreign_entry().unwrap(), Some(dir.path().join("win11.iso")));
    }

    #[test]
    fn temp_files_live_outside_stage() {
        let l = layout();
        assert!(!l.registry_script().starts_with(l.stage()));
        assert!(!l.answer_file_download().starts_with(l.stage()));
    }
}
