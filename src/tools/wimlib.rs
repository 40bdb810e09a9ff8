//! tools::wimlib
//!
//! [`ImageToolkit`] backed by `wimlib-imagex`.
//!
//! `wimlib-imagex info <container>` prints a header block followed by one
//! block per image:
//!
//! ```text
//! Available Images:
//! -----------------
//! Index:                  1
//! Name:                   Windows 11 Home
//! Description:            Windows 11 Home
//! ```
//!
//! Only the `Index`, `Name` and `Description` lines are read.

use std::ffi::OsStr;
use std::path::Path;

use super::runner::CommandRunner;
use super::{ImageToolkit, ToolError};
use crate::core::types::{Compression, ImageIndex, ImageInfo};

pub struct WimlibToolkit {
    runner: CommandRunner,
    program: String,
}

impl WimlibToolkit {
    pub fn new(runner: CommandRunner, program: &str) -> Self {
        Self {
            runner,
            program: program.to_string(),
        }
    }
}

impl ImageToolkit for WimlibToolkit {
    fn list_images(&self, container: &Path) -> Result<Vec<ImageInfo>, ToolError> {
        let out = self
            .runner
            .run(&self.program, [OsStr::new("info"), container.as_os_str()])?;
        parse_image_list(&String::from_utf8_lossy(&out.stdout)).map_err(|message| {
            ToolError::BadOutput {
                program: self.program.clone(),
                message,
            }
        })
    }

    fn export(
        &self,
        source: &Path,
        index: ImageIndex,
        dest: &Path,
        compression: Compression,
    ) -> Result<(), ToolError> {
        let compress = match compression {
            Compression::Fast => "--compress=XPRESS",
            Compression::Maximum => "--compress=LZX",
        };
        let index = index.to_string();
        self.runner.run(
            &self.program,
            [
                OsStr::new("export"),
                source.as_os_str(),
                OsStr::new(&index),
                dest.as_os_str(),
                OsStr::new(compress),
            ],
        )?;
        Ok(())
    }

    fn mount_rw(
        &self,
        container: &Path,
        index: ImageIndex,
        mount_dir: &Path,
    ) -> Result<(), ToolError> {
        let index = index.to_string();
        self.runner.run(
            &self.program,
            [
                OsStr::new("mountrw"),
                container.as_os_str(),
                OsStr::new(&index),
                mount_dir.as_os_str(),
            ],
        )?;
        Ok(())
    }

    fn unmount(&self, mount_dir: &Path, commit: bool) -> Result<(), ToolError> {
        let mut args = vec![OsStr::new("unmount"), mount_dir.as_os_str()];
        if commit {
            args.push(OsStr::new("--commit"));
        }
        self.runner.run(&self.program, args)?;
        Ok(())
    }

    fn optimize(&self, container: &Path) -> Result<(), ToolError> {
        self.runner
            .run(&self.program, [OsStr::new("optimize"), container.as_os_str()])?;
        Ok(())
    }
}

/// Parse the per-image blocks of `wimlib-imagex info` output.
///
/// Returns an error when an `Index:` value is not a positive integer or an
/// image has no name.
pub fn parse_image_list(text: &str) -> Result<Vec<ImageInfo>, String> {
    let mut images = Vec::new();
    let mut current: Option<ImageInfo> = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Index" => {
                if let Some(done) = current.take() {
                    images.push(done);
                }
                let index = ImageIndex::parse(value)
                    .map_err(|e| format!("bad image index line '{}': {}", line.trim(), e))?;
                current = Some(ImageInfo {
                    index,
                    name: String::new(),
                    description: None,
                });
            }
            "Name" => {
                if let Some(info) = current.as_mut() {
                    info.name = value.to_string();
                }
            }
            "Description" => {
                if let Some(info) = current.as_mut() {
                    if !value.is_empty() {
                        info.description = Some(value.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    if let Some(done) = current.take() {
        images.push(done);
    }

    if let Some(unnamed) = images.iter().find(|i| i.name.is_empty()) {
        return Err(format!("image {} has no name", unnamed.index));
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "\
WIM Information:
----------------
Path:           /w/tiny11/sources/install.wim
GUID:           0x5a1b2c3d4e5f60718293a4b5c6d7e8f9
Version:        68864
Image Count:    3
Compression:    LZX
Chunk Size:     32768 bytes
Part Number:    1/1
Boot Index:     0
Size:           5123456789 bytes
Attributes:     Relative path junction

Available Images:
-----------------
Index:                  1
Name:                   Windows 11 Home
Description:            Windows 11 Home
Display Name:           Windows 11 Home
Directory Count:        21000
File Count:             98000
Total Bytes:            16000000000
Hard Link Bytes:        6000000000
Creation Time:          Sat Apr 01 08:00:00 2023 UTC
Last Modification Time: Sat Apr 01 08:10:00 2023 UTC
Architecture:           x86_64

Index:                  2
Name:                   Windows 11 Education
Description:            Windows 11 Education

Index:                  3
Name:                   Windows 11 Pro
Description:
";

    #[test]
    fn parses_all_images() {
        let images = parse_image_list(INFO).unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(images[1].index.get(), 2);
        assert_eq!(images[1].name, "Windows 11 Education");
        assert_eq!(images[2].description, None);
    }

    #[test]
    fn header_lines_are_not_images() {
        // "Boot Index" and "Display Name" must not be taken as Index/Name.
        let images = parse_image_list(INFO).unwrap();
        assert_eq!(images[0].name, "Windows 11 Home");
    }

    #[test]
    fn empty_listing_is_empty() {
        assert!(parse_image_list("WIM Information:\n").unwrap().is_empty());
    }

    #[test]
    fn rejects_garbage_index() {
        assert!(parse_image_list("Index: x\nName: y\n").is_err());
        assert!(parse_image_list("Index: 0\nName: y\n").is_err());
    }

    #[test]
    fn rejects_unnamed_image() {
        assert!(parse_image_list("Index: 1\n").is_err());
    }
}
