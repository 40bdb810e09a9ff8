//! engine::stage
//!
//! Mount the source ISO and copy its contents into the writable stage tree.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use walkdir::WalkDir;

use super::guards::IsoMount;
use super::{io_error, BuildError, Context, StageResultExt};
use crate::engine::cancel::CancelToken;
use crate::tools::Toolchain;
use crate::ui::output;

/// Totals for a tree copy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

/// Loop-mount `iso`, copy it into the stage tree and unmount it again.
pub fn mount_and_copy(
    ctx: &Context<'_>,
    tools: Toolchain<'_>,
    iso: &Path,
) -> Result<CopyStats, BuildError> {
    let layout = &ctx.settings.layout;
    let v = ctx.verbosity();

    output::info(format!("Mounting '{}'", iso.display()), v);
    let mut mount = IsoMount::new(tools.loop_mounter, layout.iso_mount(), v);
    mount.mount(iso).stage("mounting the source ISO")?;

    output::info("Copying the ISO contents", v);
    let stats = copy_tree(mount.root(), &layout.stage(), &ctx.cancel)?;
    make_writable(&layout.stage())?;
    output::info(
        format!(
            "Copied {} files ({})",
            stats.files,
            output::format_size(stats.bytes)
        ),
        v,
    );

    if let Err(e) = mount.release() {
        output::warn(format!("could not unmount the source ISO: {}", e));
    }
    Ok(stats)
}

/// Recursively copy `src` into `dest`, preserving structure.
///
/// Symlinks are recreated, not followed. The copy stops at the first I/O
/// error or when `cancel` is set.
pub fn copy_tree(src: &Path, dest: &Path, cancel: &CancelToken) -> Result<CopyStats, BuildError> {
    let mut stats = CopyStats::default();
    for entry in WalkDir::new(src).min_depth(1) {
        if cancel.is_cancelled() {
            return Err(BuildError::Interrupted);
        }
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            BuildError::Io {
                path,
                source: e.into(),
            }
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| BuildError::Io {
                path: entry.path().to_path_buf(),
                source: std::io::Error::other("entry outside the source tree"),
            })?;
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(io_error(&target))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(io_error(entry.path()))?;
            std::os::unix::fs::symlink(&link, &target).map_err(io_error(&target))?;
        } else {
            stats.bytes += fs::copy(entry.path(), &target).map_err(io_error(entry.path()))?;
            stats.files += 1;
        }
    }
    Ok(stats)
}

/// Add owner write permission to every file and directory under `root`
/// (the equivalent of `chmod -R u+w`).
pub fn make_writable(root: &Path) -> Result<(), BuildError> {
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| BuildError::Io {
            path: e.path().unwrap_or(root).to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_symlink() {
            continue;
        }
        let path = entry.path();
        let mut perms = fs::metadata(path).map_err(io_error(path))?.permissions();
        let mode = perms.mode();
        if mode & 0o200 == 0 {
            perms.set_mode(mode | 0o200);
            fs::set_permissions(path, perms).map_err(io_error(path))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_only_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("src");
        fs::create_dir_all(root.join("sources")).unwrap();
        fs::create_dir_all(root.join("efi/microsoft/boot")).unwrap();
        fs::write(root.join("setup.exe"), b"MZ").unwrap();
        fs::write(root.join("sources/install.wim"), b"MSWIM\0\0\0").unwrap();
        fs::write(root.join("efi/microsoft/boot/efisys.bin"), b"x").unwrap();
        for f in ["setup.exe", "sources/install.wim", "efi/microsoft/boot/efisys.bin"] {
            let p = root.join(f);
            let mut perms = fs::metadata(&p).unwrap().permissions();
            perms.set_mode(0o444);
            fs::set_permissions(&p, perms).unwrap();
        }
        dir
    }

    #[test]
    fn copies_structure_and_counts() {
        let dir = read_only_tree();
        let dest = dir.path().join("dest");
        fs::create_dir(&dest).unwrap();

        let stats = copy_tree(&dir.path().join("src"), &dest, &CancelToken::new()).unwrap();

        assert_eq!(stats.files, 3);
        assert_eq!(stats.bytes, 2 + 8 + 1);
        assert!(dest.join("efi/microsoft/boot/efisys.bin").is_file());
    }

    #[test]
    fn make_writable_restores_owner_write() {
        let dir = read_only_tree();
        let dest = dir.path().join("dest");
        fs::create_dir(&dest).unwrap();
        copy_tree(&dir.path().join("src"), &dest, &CancelToken::new()).unwrap();
        assert!(fs::metadata(dest.join("setup.exe"))
            .unwrap()
            .permissions()
            .readonly());

        make_writable(&dest).unwrap();

        let mode = fs::metadata(dest.join("sources/install.wim"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o200, 0o200);
    }

    #[test]
    fn cancelled_copy_stops() {
        let dir = read_only_tree();
        let dest = dir.path().join("dest");
        fs::create_dir(&dest).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = copy_tree(&dir.path().join("src"), &dest, &cancel);
        assert!(matches!(result, Err(BuildError::Interrupted)));
        assert!(!dest.join("setup.exe").exists());
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let result = copy_tree(
            &dir.path().join("absent"),
            dir.path(),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(BuildError::Io { .. })));
    }
}
