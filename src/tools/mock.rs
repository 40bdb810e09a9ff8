//! tools::mock
//!
//! Mock host for deterministic pipeline tests.
//!
//! # Design
//!
//! [`MockSystem`] implements every collaborator trait in [`crate::tools`]
//! against a real temporary directory, so the pipeline's own filesystem
//! work (copying the ISO tree, deleting packages, placing the answer file)
//! runs for real while the external programs are simulated:
//!
//! - mounting the ISO lays out a small fixture tree with read-only files
//! - mounting an image lays out a fake Windows tree with bloatware packages
//! - unmounting records what was left in the tree, then empties it
//! - authoring writes a dummy output file (or an empty one, or none)
//!
//! Every call is recorded as a [`MockOperation`] and any call can be made to
//! fail through [`FailOn`].
//!
//! # Example
//!
//! ```
//! use tiny11_builder::tools::mock::MockSystem;
//!
//! let mock = MockSystem::new().with_install_images(3);
//! let tools = mock.toolchain();
//! assert!(!tools.host.is_root());
//! assert!(mock.operations().is_empty());
//! ```

use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use walkdir::WalkDir;

use super::{
    Downloader, HiveEditor, HostProbe, ImageToolkit, IsoAuthor, LoopMounter, ToolError, Toolchain,
};
use crate::core::catalog;
use crate::core::types::{BootSpec, Compression, ImageIndex, ImageInfo, RegistryPatch};

/// Package directories laid out in a mounted install image that match the
/// bloatware list.
pub const MOCK_BLOAT_PACKAGES: &[&str] = &[
    "Clipchamp.Clipchamp_2.2.8.0_neutral__yxz26nhyzhsrt",
    "Microsoft.BingNews_4.2.27001.0_x64__8wekyb3d8bbwe",
    "Microsoft.XboxGamingOverlay_2.622.3232.0_x64__8wekyb3d8bbwe",
    "microsoft.windowscommunicationsapps_16005.14326.21538.0_x64__8wekyb3d8bbwe",
    "MicrosoftTeams_23033.2608.1961.9130_x64__8wekyb3d8bbwe",
];

/// Package directories laid out in a mounted install image that must survive.
pub const MOCK_KEPT_PACKAGES: &[&str] = &[
    "Microsoft.WindowsStore_22301.1401.6.0_x64__8wekyb3d8bbwe",
    "Microsoft.VCLibs.140.00_14.0.30704.0_x64__8wekyb3d8bbwe",
];

/// A kept scheduled task, used to check task removal is targeted.
pub const MOCK_KEPT_TASK: &str = "Windows/System32/Tasks/Microsoft/Windows/Defrag/ScheduledDefrag";

/// Content served by the mock downloader.
pub const MOCK_ANSWER_FILE: &str = "<unattend xmlns=\"urn:schemas-microsoft-com:unattend\"/>\n";

/// Which install container the fake ISO carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallContainer {
    Wim,
    Esd,
    None,
}

/// What the mock authoring tool leaves at the output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputBehavior {
    /// Write this many bytes.
    Write(usize),
    /// Create a zero-byte file.
    Empty,
    /// Succeed without creating anything.
    Missing,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOn {
    LoopMount,
    Export,
    /// Fail `mount_rw` for containers with this file name.
    MountImage(String),
    /// Fail committing unmounts.
    Commit,
    Optimize,
    ApplyHive,
    BuildIso,
    Fetch,
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    LoopMount {
        image: PathBuf,
        dir: PathBuf,
    },
    LoopUnmount {
        dir: PathBuf,
    },
    ListImages {
        container: PathBuf,
    },
    Export {
        source: PathBuf,
        index: u32,
        dest: PathBuf,
        compression: Compression,
    },
    MountImage {
        container: PathBuf,
        index: u32,
        dir: PathBuf,
    },
    UnmountImage {
        dir: PathBuf,
        commit: bool,
        /// Paths left in the mounted tree, relative and `/`-separated.
        remaining: Vec<String>,
    },
    Optimize {
        container: PathBuf,
    },
    ApplyHive {
        hive: PathBuf,
        key: String,
        values: usize,
    },
    BuildIso {
        tree: PathBuf,
        output: PathBuf,
        /// Paths in the staged tree at authoring time.
        files: Vec<String>,
    },
    Fetch {
        url: String,
        dest: PathBuf,
    },
}

/// Mock host for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping.
#[derive(Debug, Clone)]
pub struct MockSystem {
    inner: Arc<Mutex<MockInner>>,
}

#[derive(Debug)]
struct MockInner {
    root: bool,
    missing_programs: HashSet<String>,
    installed_packages: HashSet<String>,
    install: InstallContainer,
    boot_wim: bool,
    bios_loader: bool,
    efi_loader: bool,
    install_images: u32,
    esd_images: u32,
    install_hive: bool,
    boot_hive: bool,
    output: OutputBehavior,
    fail_on: Vec<FailOn>,
    mounted: HashSet<PathBuf>,
    operations: Vec<MockOperation>,
}

impl Default for MockSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSystem {
    /// A healthy non-root host whose ISO carries a one-image `install.wim`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockInner {
                root: false,
                missing_programs: HashSet::new(),
                installed_packages: HashSet::new(),
                install: InstallContainer::Wim,
                boot_wim: true,
                bios_loader: true,
                efi_loader: true,
                install_images: 1,
                esd_images: 1,
                install_hive: true,
                boot_hive: true,
                output: OutputBehavior::Write(4096),
                fail_on: Vec::new(),
                mounted: HashSet::new(),
                operations: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        // A panic in another test thread must not cascade into this one.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // Builders
    // =========================================================================

    pub fn with_root(self, root: bool) -> Self {
        self.lock().root = root;
        self
    }

    /// Remove a program from the simulated `PATH`.
    pub fn without_program(self, name: &str) -> Self {
        self.lock().missing_programs.insert(name.to_string());
        self
    }

    /// Record a package as installed in the simulated package database.
    pub fn with_package(self, name: &str) -> Self {
        self.lock().installed_packages.insert(name.to_string());
        self
    }

    pub fn with_install_container(self, container: InstallContainer) -> Self {
        self.lock().install = container;
        self
    }

    pub fn with_install_images(self, count: u32) -> Self {
        self.lock().install_images = count;
        self
    }

    pub fn with_esd_images(self, count: u32) -> Self {
        self.lock().esd_images = count;
        self
    }

    pub fn without_boot_wim(self) -> Self {
        self.lock().boot_wim = false;
        self
    }

    pub fn without_bios_loader(self) -> Self {
        self.lock().bios_loader = false;
        self
    }

    pub fn without_efi_loader(self) -> Self {
        self.lock().efi_loader = false;
        self
    }

    pub fn without_install_hive(self) -> Self {
        self.lock().install_hive = false;
        self
    }

    pub fn without_boot_hive(self) -> Self {
        self.lock().boot_hive = false;
        self
    }

    pub fn with_output(self, output: OutputBehavior) -> Self {
        self.lock().output = output;
        self
    }

    pub fn fail_on(self, fail: FailOn) -> Self {
        self.lock().fail_on.push(fail);
        self
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn toolchain(&self) -> Toolchain<'_> {
        Toolchain {
            host: self,
            loop_mounter: self,
            imagex: self,
            hive_editor: self,
            iso_author: self,
            downloader: self,
        }
    }

    /// All recorded operations, in call order.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Paths currently mounted.
    pub fn mounted(&self) -> Vec<PathBuf> {
        let mut v: Vec<_> = self.lock().mounted.iter().cloned().collect();
        v.sort();
        v
    }

    /// Image mounts, as `(container file name, index)`.
    pub fn image_mounts(&self) -> Vec<(String, u32)> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                MockOperation::MountImage {
                    container, index, ..
                } => Some((file_name(&container), index)),
                _ => None,
            })
            .collect()
    }

    /// True if the authoring tool was invoked.
    pub fn built_iso(&self) -> bool {
        self.operations()
            .iter()
            .any(|op| matches!(op, MockOperation::BuildIso { .. }))
    }

    fn fails(&self, fail: &FailOn) -> bool {
        self.lock().fail_on.contains(fail)
    }

    fn record(&self, op: MockOperation) {
        self.lock().operations.push(op);
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn simulated_failure(what: &str, message: &str) -> ToolError {
    ToolError::Failed {
        command: format!("mock {}", what),
        status: "exit status: 1".to_string(),
        stderr: message.to_string(),
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ToolError + '_ {
    move |e| ToolError::Io {
        path: path.to_path_buf(),
        source: e,
    }
}

fn write_file(root: &Path, rel: &str, contents: &[u8]) -> Result<(), ToolError> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    fs::write(&path, contents).map_err(io_error(&path))
}

fn make_read_only(root: &Path) -> Result<(), ToolError> {
    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_file() {
            let mut perms = entry
                .metadata()
                .map_err(|e| simulated_failure("chmod", &e.to_string()))?
                .permissions();
            perms.set_mode(0o444);
            fs::set_permissions(entry.path(), perms).map_err(io_error(entry.path()))?;
        }
    }
    Ok(())
}

/// Relative, `/`-separated listing of everything under `root`, sorted.
fn snapshot(root: &Path) -> Vec<String> {
    let mut paths: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    paths.sort();
    paths
}

/// Remove everything inside `dir`, keeping `dir` itself.
fn clear_dir(dir: &Path) -> Result<(), ToolError> {
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path).map_err(io_error(&path))?;
        } else {
            fs::remove_file(&path).map_err(io_error(&path))?;
        }
    }
    Ok(())
}

impl HostProbe for MockSystem {
    fn is_root(&self) -> bool {
        self.lock().root
    }

    fn find_program(&self, name: &str) -> Option<PathBuf> {
        if self.lock().missing_programs.contains(name) {
            None
        } else {
            Some(PathBuf::from("/usr/bin").join(name))
        }
    }

    fn package_installed(&self, package: &str) -> bool {
        self.lock().installed_packages.contains(package)
    }

    fn is_mount_point(&self, path: &Path) -> bool {
        self.lock().mounted.contains(path)
    }
}

impl LoopMounter for MockSystem {
    fn mount_ro(&self, image: &Path, mount_dir: &Path) -> Result<(), ToolError> {
        self.record(MockOperation::LoopMount {
            image: image.to_path_buf(),
            dir: mount_dir.to_path_buf(),
        });
        if self.fails(&FailOn::LoopMount) {
            return Err(simulated_failure("mount", "failed to setup loop device"));
        }

        let (install, boot_wim, bios, efi) = {
            let inner = self.lock();
            (inner.install, inner.boot_wim, inner.bios_loader, inner.efi_loader)
        };
        write_file(mount_dir, "setup.exe", b"MZ")?;
        match install {
            InstallContainer::Wim => write_file(mount_dir, catalog::INSTALL_WIM, b"MSWIM")?,
            InstallContainer::Esd => write_file(mount_dir, catalog::INSTALL_ESD, b"MSWIM")?,
            InstallContainer::None => {}
        }
        if boot_wim {
            write_file(mount_dir, catalog::BOOT_WIM, b"MSWIM")?;
        }
        if bios {
            write_file(mount_dir, catalog::BIOS_LOADER, b"\xfa\x33\xc0")?;
        }
        if efi {
            write_file(mount_dir, catalog::EFI_LOADER, b"\xeb\x3c\x90")?;
        }
        make_read_only(mount_dir)?;

        self.lock().mounted.insert(mount_dir.to_path_buf());
        Ok(())
    }

    fn unmount(&self, mount_dir: &Path) -> Result<(), ToolError> {
        self.record(MockOperation::LoopUnmount {
            dir: mount_dir.to_path_buf(),
        });
        if !self.lock().mounted.contains(mount_dir) {
            return Err(simulated_failure("umount", "not mounted"));
        }
        clear_dir(mount_dir)?;
        self.lock().mounted.remove(mount_dir);
        Ok(())
    }
}

impl ImageToolkit for MockSystem {
    fn list_images(&self, container: &Path) -> Result<Vec<ImageInfo>, ToolError> {
        self.record(MockOperation::ListImages {
            container: container.to_path_buf(),
        });
        if !container.is_file() {
            return Err(simulated_failure("info", "no such file"));
        }
        let count = {
            let inner = self.lock();
            match file_name(container).as_str() {
                "install.wim" => inner.install_images,
                "install.esd" => inner.esd_images,
                "boot.wim" => 2,
                _ => 1,
            }
        };
        Ok((1..=count)
            .filter_map(ImageIndex::new)
            .map(|index| ImageInfo {
                index,
                name: format!("Mock Edition {}", index),
                description: None,
            })
            .collect())
    }

    fn export(
        &self,
        source: &Path,
        index: ImageIndex,
        dest: &Path,
        compression: Compression,
    ) -> Result<(), ToolError> {
        self.record(MockOperation::Export {
            source: source.to_path_buf(),
            index: index.get(),
            dest: dest.to_path_buf(),
            compression,
        });
        if self.fails(&FailOn::Export) {
            return Err(simulated_failure("export", "image index out of range"));
        }
        fs::write(dest, b"MSWIM").map_err(io_error(dest))
    }

    fn mount_rw(
        &self,
        container: &Path,
        index: ImageIndex,
        mount_dir: &Path,
    ) -> Result<(), ToolError> {
        self.record(MockOperation::MountImage {
            container: container.to_path_buf(),
            index: index.get(),
            dir: mount_dir.to_path_buf(),
        });
        let name = file_name(container);
        if self.fails(&FailOn::MountImage(name.clone())) {
            return Err(simulated_failure("mountrw", "failed to mount image"));
        }
        if self.lock().mounted.contains(mount_dir) {
            return Err(simulated_failure("mountrw", "mount point already in use"));
        }
        if !container.is_file() {
            return Err(simulated_failure("mountrw", "no such file"));
        }

        let (install_hive, boot_hive) = {
            let inner = self.lock();
            (inner.install_hive, inner.boot_hive)
        };
        if name == "boot.wim" {
            write_file(mount_dir, "setup.exe", b"MZ")?;
            if boot_hive {
                write_file(mount_dir, catalog::SYSTEM_HIVE, b"regf")?;
            }
        } else {
            for pkg in MOCK_BLOAT_PACKAGES.iter().chain(MOCK_KEPT_PACKAGES) {
                write_file(
                    mount_dir,
                    &format!("{}/{}/AppxManifest.xml", catalog::APPS_DIR, pkg),
                    b"<Package/>",
                )?;
            }
            for dir in catalog::BROWSER_PATHS {
                write_file(mount_dir, &format!("{}/payload.bin", dir), b"x")?;
            }
            write_file(mount_dir, catalog::CLOUD_SYNC_SETUP, b"MZ")?;
            for task in catalog::SCHEDULED_TASKS {
                write_file(mount_dir, &format!("{}/Task", task), b"<Task/>")?;
            }
            write_file(mount_dir, MOCK_KEPT_TASK, b"<Task/>")?;
            let sysprep = mount_dir.join(catalog::SETUP_ANSWER_DIR);
            fs::create_dir_all(&sysprep).map_err(io_error(&sysprep))?;
            if install_hive {
                write_file(mount_dir, catalog::SYSTEM_HIVE, b"regf")?;
            }
        }

        self.lock().mounted.insert(mount_dir.to_path_buf());
        Ok(())
    }

    fn unmount(&self, mount_dir: &Path, commit: bool) -> Result<(), ToolError> {
        let remaining = snapshot(mount_dir);
        self.record(MockOperation::UnmountImage {
            dir: mount_dir.to_path_buf(),
            commit,
            remaining,
        });
        if !self.lock().mounted.contains(mount_dir) {
            return Err(simulated_failure("unmount", "not a mounted WIM image"));
        }
        if commit && self.fails(&FailOn::Commit) {
            return Err(simulated_failure("unmount", "failed to commit changes"));
        }
        clear_dir(mount_dir)?;
        self.lock().mounted.remove(mount_dir);
        Ok(())
    }

    fn optimize(&self, container: &Path) -> Result<(), ToolError> {
        self.record(MockOperation::Optimize {
            container: container.to_path_buf(),
        });
        if self.fails(&FailOn::Optimize) {
            return Err(simulated_failure("optimize", "write error"));
        }
        Ok(())
    }
}

impl HiveEditor for MockSystem {
    fn apply(&self, hive: &Path, patch: &RegistryPatch) -> Result<(), ToolError> {
        self.record(MockOperation::ApplyHive {
            hive: hive.to_path_buf(),
            key: patch.full_key(),
            values: patch.values.len(),
        });
        if self.fails(&FailOn::ApplyHive) {
            return Err(simulated_failure("hivexregedit", "hivex_commit: Permission denied"));
        }
        if !hive.is_file() {
            return Err(simulated_failure("hivexregedit", "hivex_open: No such file"));
        }
        Ok(())
    }
}

impl IsoAuthor for MockSystem {
    fn build(&self, tree: &Path, _boot: &BootSpec, output: &Path) -> Result<(), ToolError> {
        self.record(MockOperation::BuildIso {
            tree: tree.to_path_buf(),
            output: output.to_path_buf(),
            files: snapshot(tree),
        });
        if self.fails(&FailOn::BuildIso) {
            return Err(simulated_failure("genisoimage", "No space left on device"));
        }
        match self.lock().output {
            OutputBehavior::Write(n) => fs::write(output, vec![0x55; n]).map_err(io_error(output)),
            OutputBehavior::Empty => fs::write(output, b"").map_err(io_error(output)),
            OutputBehavior::Missing => Ok(()),
        }
    }
}

impl Downloader for MockSystem {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ToolError> {
        self.record(MockOperation::Fetch {
            url: url.to_string(),
            dest: dest.to_path_buf(),
        });
        if self.fails(&FailOn::Fetch) {
            return Err(ToolError::Download(
                "error sending request: connection refused".to_string(),
            ));
        }
        fs::write(dest, MOCK_ANSWER_FILE).map_err(io_error(dest))?;
        Ok(MOCK_ANSWER_FILE.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loop_mount_lays_out_read_only_fixture() {
        let dir = TempDir::new().unwrap();
        let mock = MockSystem::new();
        mock.mount_ro(Path::new("/x.iso"), dir.path()).unwrap();

        let wim = dir.path().join(catalog::INSTALL_WIM);
        assert!(wim.is_file());
        assert!(fs::metadata(&wim).unwrap().permissions().readonly());
        assert!(mock.is_mount_point(dir.path()));

        LoopMounter::unmount(&mock, dir.path()).unwrap();
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
        assert!(mock.mounted().is_empty());
    }

    #[test]
    fn image_mount_point_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let wim = dir.path().join("install.wim");
        let mnt = dir.path().join("mnt");
        fs::write(&wim, b"MSWIM").unwrap();
        fs::create_dir(&mnt).unwrap();

        let mock = MockSystem::new().with_install_images(2);
        let one = ImageIndex::new(1).unwrap();
        mock.mount_rw(&wim, one, &mnt).unwrap();
        assert!(mock.mount_rw(&wim, one, &mnt).is_err());
    }

    #[test]
    fn unmount_records_remaining_tree() {
        let dir = TempDir::new().unwrap();
        let wim = dir.path().join("install.wim");
        let mnt = dir.path().join("mnt");
        fs::write(&wim, b"MSWIM").unwrap();
        fs::create_dir(&mnt).unwrap();

        let mock = MockSystem::new();
        mock.mount_rw(&wim, ImageIndex::new(1).unwrap(), &mnt).unwrap();
        fs::remove_file(mnt.join(catalog::CLOUD_SYNC_SETUP)).unwrap();
        ImageToolkit::unmount(&mock, &mnt, true).unwrap();

        match mock.operations().last().unwrap() {
            MockOperation::UnmountImage {
                commit, remaining, ..
            } => {
                assert!(commit);
                assert!(remaining.contains(&catalog::SYSTEM_HIVE.to_string()));
                assert!(!remaining.contains(&catalog::CLOUD_SYNC_SETUP.to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn failed_commit_keeps_image_mounted() {
        let dir = TempDir::new().unwrap();
        let wim = dir.path().join("install.wim");
        let mnt = dir.path().join("mnt");
        fs::write(&wim, b"MSWIM").unwrap();
        fs::create_dir(&mnt).unwrap();

        let mock = MockSystem::new().fail_on(FailOn::Commit);
        mock.mount_rw(&wim, ImageIndex::new(1).unwrap(), &mnt).unwrap();
        assert!(ImageToolkit::unmount(&mock, &mnt, true).is_err());
        assert!(mock.is_mount_point(&mnt));
        ImageToolkit::unmount(&mock, &mnt, false).unwrap();
        assert!(!mock.is_mount_point(&mnt));
    }
}
