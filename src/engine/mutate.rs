//! engine::mutate
//!
//! Trim the selected edition of `install.wim`.
//!
//! # Steps
//!
//! With the image mounted read-write:
//! 1. delete provisioned app packages matching the bloatware list
//! 2. delete the browser and its runtime, and the cloud-sync installer
//! 3. merge the hardware-check bypass into the SYSTEM hive
//! 4. delete the telemetry scheduled tasks
//! 5. place the unattended-setup answer file (best-effort)
//!
//! then commit the mount and optimize the container.
//!
//! Package removals are tolerated individually. Every other removal failure
//! is fatal; a path that is already gone is not a failure.

use std::fs;
use std::io;
use std::path::Path;

use super::guards::ImageMountPoint;
use super::{BuildError, Context, StageResultExt};
use crate::core::catalog;
use crate::core::types::ImageIndex;
use crate::tools::{ToolError, Toolchain};
use crate::ui::output::{self, Verbosity};

/// Result of applying the bypass patch to a mounted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiveOutcome {
    Patched,
    /// The image has no SYSTEM hive at the expected path.
    MissingHive,
}

/// What was done to the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationSummary {
    /// Names of the package directories removed.
    pub removed_packages: Vec<String>,
    /// Fixed component paths that existed and were removed.
    pub removed_components: usize,
    pub hive: HiveOutcome,
    /// True if the answer file was placed in the image.
    pub answer_file: bool,
}

pub fn mutate(
    ctx: &Context<'_>,
    tools: Toolchain<'_>,
    mount_point: &mut ImageMountPoint,
    index: ImageIndex,
) -> Result<MutationSummary, BuildError> {
    let layout = &ctx.settings.layout;
    let v = ctx.verbosity();
    let wim = layout.install_wim();
    if !wim.is_file() {
        return Err(BuildError::MissingContainer(wim));
    }

    output::info(format!("Mounting image {} of install.wim", index), v);
    let mount = mount_point
        .mount(tools.imagex, &wim, index)
        .stage("mounting install.wim")?;
    let root = mount.root();

    output::info("Removing provisioned apps", v);
    let removed_packages = remove_bloatware(&root.join(catalog::APPS_DIR), v);

    output::info("Removing Edge and OneDrive", v);
    let mut removed_components = 0;
    for rel in catalog::BROWSER_PATHS
        .iter()
        .chain(std::iter::once(&catalog::CLOUD_SYNC_SETUP))
    {
        if remove_path(&root.join(rel), v)? {
            removed_components += 1;
        }
    }

    output::info("Patching the registry to bypass hardware checks", v);
    let hive = apply_bypass(tools, root, v).stage("patching the install image registry")?;
    if hive == HiveOutcome::MissingHive {
        output::warn("install image has no SYSTEM hive; hardware checks stay enabled");
    }

    output::info("Removing telemetry scheduled tasks", v);
    for rel in catalog::SCHEDULED_TASKS {
        if remove_path(&root.join(rel), v)? {
            removed_components += 1;
        }
    }

    ctx.checkpoint()?;
    let answer_file = place_answer_file(ctx, tools, root);

    ctx.checkpoint()?;
    output::info("Committing changes to install.wim", v);
    mount.commit().stage("committing install.wim")?;
    output::info("Optimizing install.wim", v);
    tools
        .imagex
        .optimize(&wim)
        .stage("optimizing install.wim")?;

    Ok(MutationSummary {
        removed_packages,
        removed_components,
        hive,
        answer_file,
    })
}

/// Merge the hardware-check bypass into the SYSTEM hive under `root`.
pub(crate) fn apply_bypass(
    tools: Toolchain<'_>,
    root: &Path,
    verbosity: Verbosity,
) -> Result<HiveOutcome, ToolError> {
    let hive = root.join(catalog::SYSTEM_HIVE);
    if !hive.is_file() {
        return Ok(HiveOutcome::MissingHive);
    }
    let patch = catalog::bypass_patch();
    tools.hive_editor.apply(&hive, &patch)?;
    output::debug(format!("merged [{}]", patch.full_key()), verbosity);
    Ok(HiveOutcome::Patched)
}

/// Delete every entry of `apps_dir` whose name matches the bloatware list.
/// Failures are warnings.
fn remove_bloatware(apps_dir: &Path, verbosity: Verbosity) -> Vec<String> {
    let entries = match fs::read_dir(apps_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            output::debug(format!("'{}' does not exist", apps_dir.display()), verbosity);
            return Vec::new();
        }
        Err(e) => {
            output::warn(format!("could not list '{}': {}", apps_dir.display(), e));
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| catalog::is_bloatware(name))
        .collect();
    names.sort();

    names.retain(|name| match remove_path(&apps_dir.join(name), verbosity) {
        Ok(_) => true,
        Err(e) => {
            output::warn(format!("could not remove package '{}': {}", name, e));
            false
        }
    });
    output::debug(format!("removed {} packages", names.len()), verbosity);
    names
}

/// Remove a file or directory tree. Returns `false` if nothing was there.
fn remove_path(path: &Path, verbosity: Verbosity) -> Result<bool, BuildError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            output::debug(format!("'{}' not present", path.display()), verbosity);
            return Ok(false);
        }
        Err(e) => return Err(super::io_error(path)(e)),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
    .map_err(super::io_error(path))?;
    output::debug(format!("removed '{}'", path.display()), verbosity);
    Ok(true)
}

/// Download the answer file and copy it into the image's Sysprep directory.
/// Any failure is a warning.
fn place_answer_file(ctx: &Context<'_>, tools: Toolchain<'_>, root: &Path) -> bool {
    let v = ctx.verbosity();
    let source = &ctx.settings.answer_file;
    let download = ctx.settings.layout.answer_file_download();

    output::info("Downloading the unattended-setup answer file", v);
    match tools.downloader.fetch(&source.url, &download) {
        Ok(bytes) => output::debug(format!("downloaded {} bytes", bytes), v),
        Err(e) => {
            output::warn(format!(
                "{}; continuing without an answer file",
                e
            ));
            return false;
        }
    }

    let dir = root.join(catalog::SETUP_ANSWER_DIR);
    let target = dir.join(catalog::ANSWER_FILE_NAME);
    match fs::create_dir_all(&dir).and_then(|()| fs::copy(&download, &target)) {
        Ok(_) => true,
        Err(e) => {
            output::warn(format!(
                "could not place the answer file at '{}': {}",
                target.display(),
                e
            ));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn remove_path_handles_files_dirs_and_absence() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("OneDriveSetup.exe");
        let tree = dir.path().join("Edge/Application");
        fs::write(&file, b"MZ").unwrap();
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("msedge.exe"), b"MZ").unwrap();

        assert!(remove_path(&file, Verbosity::Quiet).unwrap());
        assert!(remove_path(&dir.path().join("Edge"), Verbosity::Quiet).unwrap());
        assert!(!remove_path(&file, Verbosity::Quiet).unwrap());
        assert!(!dir.path().join("Edge").exists());
    }

    #[test]
    fn bloatware_removal_is_selective() {
        let dir = TempDir::new().unwrap();
        let apps = dir.path().join("WindowsApps");
        for name in [
            "Microsoft.BingWeather_4.53.0_x64__8wekyb3d8bbwe",
            "Microsoft.ZuneMusic_11.2.0_x64__8wekyb3d8bbwe",
            "Microsoft.WindowsStore_22301.1401.6.0_x64__8wekyb3d8bbwe",
        ] {
            fs::create_dir_all(apps.join(name)).unwrap();
        }

        let removed = remove_bloatware(&apps, Verbosity::Quiet);

        assert_eq!(removed.len(), 2);
        assert!(apps
            .join("Microsoft.WindowsStore_22301.1401.6.0_x64__8wekyb3d8bbwe")
            .exists());
        assert_eq!(fs::read_dir(&apps).unwrap().count(), 1);
    }

    #[test]
    fn missing_apps_dir_removes_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(remove_bloatware(&dir.path().join("absent"), Verbosity::Quiet).is_empty());
    }
}
