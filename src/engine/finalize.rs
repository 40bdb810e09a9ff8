//! engine::finalize
//!
//! Assemble the output ISO from the staged tree.
//!
//! The authoring tool writes to a `.partial` sibling of the output path.
//! Only a non-empty result is renamed into place, so an existing ISO at the
//! output path is never clobbered by a failed build, and a stale one can
//! never be mistaken for fresh output.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::{io_error, BuildError, Context, StageResultExt};
use crate::core::types::{BootSpec, BuildReport, ImageIndex};
use crate::tools::Toolchain;
use crate::ui::output;

pub fn finalize(
    ctx: &Context<'_>,
    tools: Toolchain<'_>,
    index: ImageIndex,
) -> Result<BuildReport, BuildError> {
    let settings = ctx.settings;
    let layout = &settings.layout;
    let v = ctx.verbosity();
    let stage = layout.stage();

    let download = layout.answer_file_download();
    if download.is_file() {
        let target = layout.staged_answer_file();
        fs::copy(&download, &target).map_err(io_error(&target))?;
        output::debug(format!("placed '{}'", target.display()), v);
    } else {
        output::warn("no answer file was downloaded; the ISO will run the standard setup");
    }

    verify_boot_files(&stage, &settings.boot)?;

    let partial = partial_path(&settings.output);
    if partial.exists() {
        fs::remove_file(&partial).map_err(io_error(&partial))?;
    }

    output::info(format!("Building '{}'", settings.output.display()), v);
    if let Err(e) = tools.iso_author.build(&stage, &settings.boot, &partial) {
        let _ = fs::remove_file(&partial);
        return Err(e).stage("building the ISO");
    }

    let size_bytes = match fs::metadata(&partial) {
        Ok(meta) if meta.len() > 0 => meta.len(),
        Ok(_) => {
            let _ = fs::remove_file(&partial);
            return Err(BuildError::EmptyOutput(settings.output.clone()));
        }
        Err(_) => return Err(BuildError::MissingOutput(settings.output.clone())),
    };
    if let Err(e) = fs::rename(&partial, &settings.output) {
        let _ = fs::remove_file(&partial);
        return Err(io_error(&settings.output)(e));
    }

    output::debug("computing checksum", v);
    let sha256 = sha256_file(&settings.output)?;

    Ok(BuildReport {
        output: settings.output.clone(),
        size_bytes,
        sha256,
        image_index: index,
    })
}

/// Both boot loaders must be present in the staged tree.
pub fn verify_boot_files(stage: &Path, boot: &BootSpec) -> Result<(), BuildError> {
    for loader in [&boot.bios_loader, &boot.efi_loader] {
        let path = stage.join(loader);
        if !path.is_file() {
            return Err(BuildError::MissingBootFile(path));
        }
    }
    Ok(())
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    output.with_file_name(name)
}

/// Hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> Result<String, BuildError> {
    let mut file = File::open(path).map_err(io_error(path))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1 << 20];
    loop {
        let n = file.read(&mut buf).map_err(io_error(path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
