//! engine::boot_patch
//!
//! Apply the hardware-check bypass to the setup image in `boot.wim`.
//!
//! Windows Setup runs from image 2 of `boot.wim` and performs its own
//! hardware checks before it ever reads the install image, so the same
//! registry values are merged there. Nothing in this stage is fatal: a
//! failure only means setup may still enforce the checks.

use super::guards::ImageMountPoint;
use super::mutate::{apply_bypass, HiveOutcome};
use super::Context;
use crate::core::catalog;
use crate::tools::Toolchain;
use crate::ui::output;

/// How the boot image patch went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootPatchOutcome {
    Patched,
    /// Skipped or failed; the reason has already been reported.
    Skipped(String),
}

pub fn patch(
    ctx: &Context<'_>,
    tools: Toolchain<'_>,
    mount_point: &mut ImageMountPoint,
) -> BootPatchOutcome {
    let v = ctx.verbosity();
    let boot = ctx.settings.layout.boot_wim();
    let index = catalog::BOOT_SETUP_INDEX;

    let skip = |reason: String| {
        output::warn(format!("skipping boot image patch: {}", reason));
        BootPatchOutcome::Skipped(reason)
    };

    if !boot.is_file() {
        return skip(format!("'{}' not found", boot.display()));
    }

    output::info(format!("Mounting image {} of boot.wim", index), v);
    let mount = match mount_point.mount(tools.imagex, &boot, index) {
        Ok(mount) => mount,
        Err(e) => return skip(e.to_string()),
    };

    match apply_bypass(tools, mount.root(), v) {
        Ok(HiveOutcome::Patched) => {}
        Ok(HiveOutcome::MissingHive) => {
            mount.discard();
            return skip("boot image has no SYSTEM hive".to_string());
        }
        Err(e) => {
            mount.discard();
            return skip(e.to_string());
        }
    }

    match mount.commit() {
        Ok(()) => {
            output::info("Patched the setup image", v);
            BootPatchOutcome::Patched
        }
        Err(e) => skip(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{FileConfig, Overrides, Settings};
    use crate::engine::CancelToken;
    use crate::tools::mock::{FailOn, MockOperation, MockSystem};
    use crate::ui::output::Verbosity;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        settings: Settings,
    }

    fn fixture(with_boot_wim: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let settings = Settings::resolve(
            &FileConfig::default(),
            Overrides {
                scratch: Some(dir.path().join("work")),
                verbosity: Verbosity::Quiet,
                ..Default::default()
            },
            dir.path(),
        )
        .unwrap();
        fs::create_dir_all(settings.layout.wim_mount()).unwrap();
        if with_boot_wim {
            let boot = settings.layout.boot_wim();
            fs::create_dir_all(boot.parent().unwrap()).unwrap();
            fs::write(boot, b"MSWIM").unwrap();
        }
        Fixture {
            _dir: dir,
            settings,
        }
    }

    fn run(f: &Fixture, mock: &MockSystem) -> BootPatchOutcome {
        let ctx = Context::new(&f.settings, CancelToken::new());
        let mut point = ImageMountPoint::new(f.settings.layout.wim_mount(), Verbosity::Quiet);
        patch(&ctx, mock.toolchain(), &mut point)
    }

    #[test]
    fn patches_setup_index_and_commits() {
        let f = fixture(true);
        let mock = MockSystem::new();

        assert_eq!(run(&f, &mock), BootPatchOutcome::Patched);
        assert_eq!(mock.image_mounts(), vec![("boot.wim".to_string(), 2)]);
        assert!(mock.operations().iter().any(|op| matches!(
            op,
            MockOperation::UnmountImage { commit: true, .. }
        )));
        assert!(mock.mounted().is_empty());
    }

    #[test]
    fn missing_container_is_skipped() {
        let f = fixture(false);
        let mock = MockSystem::new();
        assert!(matches!(run(&f, &mock), BootPatchOutcome::Skipped(_)));
        assert!(mock.operations().is_empty());
    }

    #[test]
    fn missing_hive_discards() {
        let f = fixture(true);
        let mock = MockSystem::new().without_boot_hive();

        assert!(matches!(run(&f, &mock), BootPatchOutcome::Skipped(_)));
        assert!(mock.operations().iter().any(|op| matches!(
            op,
            MockOperation::UnmountImage { commit: false, .. }
        )));
        assert!(mock.mounted().is_empty());
    }

    #[test]
    fn failures_are_tolerated() {
        for fail in [
            FailOn::MountImage("boot.wim".to_string()),
            FailOn::ApplyHive,
            FailOn::Commit,
        ] {
            let f = fixture(true);
            let mock = MockSystem::new().fail_on(fail);
            assert!(matches!(run(&f, &mock), BootPatchOutcome::Skipped(_)));
            assert!(mock.mounted().is_empty());
        }
    }
}
