//! engine::normalize
//!
//! Convert a solid `install.esd` into a mountable `install.wim`.
//!
//! Consumer ISOs built by the media creation tool ship the OS images as a
//! solid-compressed ESD, which cannot be mounted read-write. One image is
//! exported into a fresh WIM with LZX compression and the ESD is dropped.

use std::fs;

use super::{io_error, BuildError, Context, StageResultExt};
use crate::core::types::{Compression, ImageIndex};
use crate::tools::Toolchain;
use crate::ui::output;
use crate::ui::prompts::Prompter;

/// What normalization did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalized {
    /// The stage already had an `install.wim`, or no ESD to convert.
    Unchanged,
    /// The given ESD image was exported into `install.wim`.
    Converted(ImageIndex),
}

pub fn normalize(
    ctx: &Context<'_>,
    tools: Toolchain<'_>,
    prompter: &mut dyn Prompter,
) -> Result<Normalized, BuildError> {
    let layout = &ctx.settings.layout;
    let v = ctx.verbosity();
    let esd = layout.install_esd();
    let wim = layout.install_wim();

    if !esd.is_file() || wim.exists() {
        output::debug("no install.esd to convert", v);
        return Ok(Normalized::Unchanged);
    }

    output::info("Found install.esd, converting to install.wim", v);
    let images = tools
        .imagex
        .list_images(&esd)
        .stage("listing the images in install.esd")?;
    println!("{}", output::format_list(&images, "  "));

    let answer = prompter.input("Enter the image index to export from install.esd")?;
    let index = ImageIndex::parse(&answer)?;

    output::info(
        format!("Exporting image {} (this can take a while)", index),
        v,
    );
    tools
        .imagex
        .export(&esd, index, &wim, Compression::Maximum)
        .stage("exporting install.esd")?;
    fs::remove_file(&esd).map_err(io_error(&esd))?;
    Ok(Normalized::Converted(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{FileConfig, Overrides, Settings};
    use crate::core::types::IndexError;
    use crate::engine::CancelToken;
    use crate::tools::mock::{FailOn, MockOperation, MockSystem};
    use crate::ui::prompts::ScriptedPrompter;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> Settings {
        Settings::resolve(
            &FileConfig::default(),
            Overrides {
                scratch: Some(dir.path().join("work")),
                verbosity: crate::ui::output::Verbosity::Quiet,
                ..Default::default()
            },
            dir.path(),
        )
        .unwrap()
    }

    fn stage_file(path: std::path::PathBuf) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"MSWIM").unwrap();
    }

    #[test]
    fn converts_esd() {
        let dir = TempDir::new().unwrap();
        let s = settings(&dir);
        stage_file(s.layout.install_esd());
        let ctx = Context::new(&s, CancelToken::new());
        let mock = MockSystem::new().with_esd_images(6);
        let mut prompter = ScriptedPrompter::new(["6"]);

        let result = normalize(&ctx, mock.toolchain(), &mut prompter).unwrap();

        assert_eq!(result, Normalized::Converted(ImageIndex::new(6).unwrap()));
        assert!(s.layout.install_wim().is_file());
        assert!(!s.layout.install_esd().exists());
        assert!(mock.operations().iter().any(|op| matches!(
            op,
            MockOperation::Export {
                index: 6,
                compression: Compression::Maximum,
                ..
            }
        )));
    }

    #[test]
    fn skips_when_wim_present() {
        let dir = TempDir::new().unwrap();
        let s = settings(&dir);
        stage_file(s.layout.install_wim());
        stage_file(s.layout.install_esd());
        let ctx = Context::new(&s, CancelToken::new());
        let mock = MockSystem::new();
        let mut prompter = ScriptedPrompter::new(Vec::<String>::new());

        let result = normalize(&ctx, mock.toolchain(), &mut prompter).unwrap();

        assert_eq!(result, Normalized::Unchanged);
        assert!(mock.operations().is_empty());
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn rejects_non_numeric_index_without_reprompt() {
        let dir = TempDir::new().unwrap();
        let s = settings(&dir);
        stage_file(s.layout.install_esd());
        let ctx = Context::new(&s, CancelToken::new());
        let mock = MockSystem::new();
        let mut prompter = ScriptedPrompter::new(["pro", "1"]);

        let result = normalize(&ctx, mock.toolchain(), &mut prompter);

        assert!(matches!(
            result,
            Err(BuildError::InvalidIndex(IndexError::NotANumber(_)))
        ));
        assert_eq!(prompter.remaining(), 1);
    }

    #[test]
    fn export_failure_keeps_esd() {
        let dir = TempDir::new().unwrap();
        let s = settings(&dir);
        stage_file(s.layout.install_esd());
        let ctx = Context::new(&s, CancelToken::new());
        let mock = MockSystem::new().fail_on(FailOn::Export);
        let mut prompter = ScriptedPrompter::new(["9"]);

        let result = normalize(&ctx, mock.toolchain(), &mut prompter);

        assert!(matches!(result, Err(BuildError::Tool { .. })));
        assert!(s.layout.install_esd().exists());
    }
}
