//! engine::preflight
//!
//! Host checks that run before anything is mounted or written.
//!
//! Checks run in a fixed order and the first failure wins, except for the
//! tool check, which collects every missing program so the operator can fix
//! them in one go.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::config::Settings;
use crate::tools::HostProbe;

/// Why the host is not ready for a build.
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("refusing to run as root; run as a regular user and privileged steps will use the configured privilege command")]
    RunningAsRoot,

    #[error("no source ISO given (use -i/--iso)")]
    NoIso,

    #[error("source ISO '{0}' does not exist or is not a regular file")]
    IsoNotFound(PathBuf),

    #[error("missing required tools: {}", format_missing(.0))]
    MissingTools(Vec<MissingTool>),
}

/// An external program that is neither on `PATH` nor installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingTool {
    pub program: String,
    /// Debian package that provides it.
    pub package: &'static str,
}

fn format_missing(tools: &[MissingTool]) -> String {
    tools
        .iter()
        .map(|t| format!("{} (package '{}')", t.program, t.package))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Programs a run needs, with the package that provides each.
pub fn requirements(settings: &Settings) -> Vec<(String, &'static str)> {
    let mut required = vec![
        (settings.tools.imagex.clone(), "wimtools"),
        (settings.tools.hive_editor.clone(), "libwin-hivex-perl"),
        (settings.tools.iso_author.clone(), "genisoimage"),
        ("mount".to_string(), "mount"),
        ("umount".to_string(), "mount"),
    ];
    if let Some(cmd) = &settings.privilege_command {
        if let Some(program) = cmd.split_whitespace().next() {
            required.push((program.to_string(), "sudo"));
        }
    }
    required
}

/// Validate the host and return the source ISO path.
///
/// # Errors
///
/// - [`PreflightError::RunningAsRoot`] when the effective uid is 0
/// - [`PreflightError::NoIso`] when no ISO was given
/// - [`PreflightError::IsoNotFound`] when the ISO is not a regular file
/// - [`PreflightError::MissingTools`] listing every absent program
pub fn check(settings: &Settings, host: &dyn HostProbe) -> Result<PathBuf, PreflightError> {
    if host.is_root() {
        return Err(PreflightError::RunningAsRoot);
    }

    let iso = settings.iso.clone().ok_or(PreflightError::NoIso)?;
    if !iso.is_file() {
        return Err(PreflightError::IsoNotFound(iso));
    }

    let missing: Vec<MissingTool> = requirements(settings)
        .into_iter()
        .filter(|(program, package)| {
            host.find_program(program).is_none() && !host.package_installed(package)
        })
        .map(|(program, package)| MissingTool { program, package })
        .collect();
    if !missing.is_empty() {
        return Err(PreflightError::MissingTools(missing));
    }

    Ok(iso)
}
