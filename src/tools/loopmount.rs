//! tools::loopmount
//!
//! [`LoopMounter`] backed by `mount -o loop,ro` / `umount`, run through the
//! configured privilege command since loop devices need root.

use std::ffi::OsStr;
use std::path::Path;

use super::runner::CommandRunner;
use super::{LoopMounter, ToolError};

pub struct SystemLoopMounter {
    runner: CommandRunner,
}

impl SystemLoopMounter {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

impl LoopMounter for SystemLoopMounter {
    fn mount_ro(&self, image: &Path, mount_dir: &Path) -> Result<(), ToolError> {
        self.runner.run_privileged(
            "mount",
            [
                OsStr::new("-o"),
                OsStr::new("loop,ro"),
                image.as_os_str(),
                mount_dir.as_os_str(),
            ],
        )?;
        Ok(())
    }

    fn unmount(&self, mount_dir: &Path) -> Result<(), ToolError> {
        self.runner.run_privileged("umount", [mount_dir.as_os_str()])?;
        Ok(())
    }
}
