//! tools::genisoimage
//!
//! [`IsoAuthor`] backed by `genisoimage` (or a command-line compatible
//! `mkisofs`).
//!
//! The image is a hybrid ISO9660/UDF filesystem with two El Torito entries:
//! the BIOS loader as the default no-emulation entry and the EFI boot image
//! as an alternate no-emulation entry. UDF plus `-allow-limited-size` is
//! what lets `install.wim` exceed the 4 GiB ISO9660 file-size limit.

use std::ffi::OsString;
use std::path::Path;

use super::runner::CommandRunner;
use super::{IsoAuthor, ToolError};
use crate::core::types::BootSpec;

/// Sectors loaded by the BIOS for a no-emulation boot entry.
const BIOS_LOAD_SECTORS: &str = "8";

pub struct GenisoimageAuthor {
    runner: CommandRunner,
    program: String,
}

impl GenisoimageAuthor {
    pub fn new(runner: CommandRunner, program: &str) -> Self {
        Self {
            runner,
            program: program.to_string(),
        }
    }
}

impl IsoAuthor for GenisoimageAuthor {
    fn build(&self, tree: &Path, boot: &BootSpec, output: &Path) -> Result<(), ToolError> {
        self.runner.run(&self.program, build_args(tree, boot, output))?;
        Ok(())
    }
}

/// Argument list for a dual-boot hybrid ISO.
pub(crate) fn build_args(tree: &Path, boot: &BootSpec, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-iso-level",
        "3",
        "-udf",
        "-allow-limited-size",
        "-J",
        "-joliet-long",
        "-relaxed-filenames",
        "-V",
        boot.volume.volume_id.as_str(),
        "-A",
        boot.volume.application_id.as_str(),
        "-publisher",
        boot.volume.publisher.as_str(),
        // BIOS entry
        "-b",
    ]
    .iter()
    .map(OsString::from)
    .collect();

    args.push(boot.bios_loader.clone().into_os_string());
    args.extend(
        [
            "-no-emul-boot",
            "-boot-load-size",
            BIOS_LOAD_SECTORS,
            "-hide",
            "boot.catalog",
            // EFI entry
            "-eltorito-alt-boot",
            "-b",
        ]
        .iter()
        .map(OsString::from),
    );
    args.push(boot.efi_loader.clone().into_os_string());
    args.push(OsString::from("-no-emul-boot"));
    args.push(OsString::from("-o"));
    args.push(output.as_os_str().to_owned());
    args.push(tree.as_os_str().to_owned());
    args
}
