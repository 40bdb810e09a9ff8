//! core::config
//!
//! Configuration loading and the immutable run settings.
//!
//! # Overview
//!
//! A run is configured from three sources:
//! 1. Built-in defaults (see [`crate::core::catalog`])
//! 2. The optional config file (see [`schema`])
//! 3. CLI flags
//!
//! Later sources override earlier ones. The result is a [`Settings`] value
//! that is built once at startup and handed, read-only, to every stage.
//!
//! # Example
//!
//! ```no_run
//! use tiny11_builder::core::config::{Config, Overrides, Settings};
//! use std::path::Path;
//!
//! let loaded = Config::load().unwrap();
//! let settings = Settings::resolve(
//!     &loaded.config,
//!     Overrides::default(),
//!     Path::new("/home/me/isos"),
//! )
//! .unwrap();
//! println!("output: {}", settings.output.display());
//! ```

pub mod schema;

pub use schema::FileConfig;

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::catalog;
use crate::core::paths::WorkLayout;
use crate::core::types::{BootSpec, VolumeMetadata};
use crate::ui::output::Verbosity;

/// Default scratch directory, relative to the invocation directory.
pub const DEFAULT_SCRATCH: &str = "tiny11_work";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Result of loading the config file.
#[derive(Debug, Default)]
pub struct ConfigLoadResult {
    /// The loaded configuration (defaults when no file exists).
    pub config: FileConfig,
    /// Path the configuration was read from, if any.
    pub path: Option<PathBuf>,
}

/// Config file discovery.
pub struct Config;

impl Config {
    /// Load the config file from the standard locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed or
    /// validated. A missing file is not an error.
    pub fn load() -> Result<ConfigLoadResult, ConfigError> {
        match Self::locate() {
            Some(path) => Self::load_from(&path),
            None => Ok(ConfigLoadResult::default()),
        }
    }

    /// Load and validate a specific config file.
    pub fn load_from(path: &Path) -> Result<ConfigLoadResult, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: FileConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate()?;

        Ok(ConfigLoadResult {
            config,
            path: Some(path.to_path_buf()),
        })
    }

    /// Find the first existing config file.
    fn locate() -> Option<PathBuf> {
        // 1. $TINY11_CONFIG
        if let Ok(path) = std::env::var("TINY11_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. $XDG_CONFIG_HOME/tiny11/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("tiny11/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. ~/.config/tiny11/config.toml
        if let Some(home) = dirs::home_dir() {
            let path = home.join(".config/tiny11/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub iso: Option<PathBuf>,
    pub scratch: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub verbosity: Verbosity,
}

/// External program names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolNames {
    pub imagex: String,
    pub hive_editor: String,
    pub iso_author: String,
}

/// Answer-file download parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFileSource {
    pub url: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

/// Immutable settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Source ISO. `None` when the flag was omitted; preflight rejects that.
    pub iso: Option<PathBuf>,
    pub layout: WorkLayout,
    pub output: PathBuf,
    pub tools: ToolNames,
    /// Prefix for commands that need root (loop mount/unmount).
    pub privilege_command: Option<String>,
    pub answer_file: AnswerFileSource,
    pub boot: BootSpec,
    pub verbosity: Verbosity,
}

impl Settings {
    /// Merge defaults, the config file and CLI overrides.
    ///
    /// Relative paths are resolved against `invocation_dir`, since mount
    /// commands and the authoring tool need absolute paths.
    pub fn resolve(
        file: &FileConfig,
        overrides: Overrides,
        invocation_dir: &Path,
    ) -> Result<Self, ConfigError> {
        file.validate()?;

        let invocation_dir = normalize(invocation_dir);
        let absolute = |p: PathBuf| {
            if p.is_absolute() {
                normalize(&p)
            } else {
                normalize(&invocation_dir.join(p))
            }
        };

        let scratch = overrides
            .scratch
            .or_else(|| file.scratch.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH));
        if scratch.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue(
                "scratch directory must not be empty".to_string(),
            ));
        }
        let scratch = absolute(scratch);
        if invocation_dir.starts_with(&scratch) {
            return Err(ConfigError::InvalidValue(format!(
                "scratch directory '{}' would contain the invocation directory and is deleted after the run",
                scratch.display()
            )));
        }

        let output = absolute(
            overrides
                .output
                .unwrap_or_else(|| PathBuf::from(catalog::OUTPUT_NAME)),
        );
        if output.starts_with(&scratch) {
            return Err(ConfigError::InvalidValue(format!(
                "output '{}' must not be inside the scratch directory",
                output.display()
            )));
        }

        let iso = overrides.iso.map(absolute);
        if let Some(iso) = iso.as_ref().filter(|iso| iso.starts_with(&scratch)) {
            return Err(ConfigError::InvalidValue(format!(
                "source ISO '{}' must not be inside the scratch directory",
                iso.display()
            )));
        }

        let tools = file.tools.clone().unwrap_or_default();
        let answer = file.answer_file.clone().unwrap_or_default();
        let volume = file.volume.clone().unwrap_or_default();

        let privilege_command = match &file.privilege_command {
            Some(cmd) if cmd.trim().is_empty() => None,
            Some(cmd) => Some(cmd.trim().to_string()),
            None => Some("sudo".to_string()),
        };

        Ok(Settings {
            iso,
            layout: WorkLayout::new(scratch),
            output,
            tools: ToolNames {
                imagex: tools.imagex.unwrap_or_else(|| "wimlib-imagex".to_string()),
                hive_editor: tools
                    .hive_editor
                    .unwrap_or_else(|| "hivexregedit".to_string()),
                iso_author: tools
                    .iso_author
                    .unwrap_or_else(|| "genisoimage".to_string()),
            },
            privilege_command,
            answer_file: AnswerFileSource {
                url: answer
                    .url
                    .unwrap_or_else(|| catalog::ANSWER_FILE_URL.to_string()),
                connect_timeout: Duration::from_secs(answer.connect_timeout_secs.unwrap_or(10)),
                timeout: Duration::from_secs(answer.timeout_secs.unwrap_or(30)),
            },
            boot: BootSpec {
                bios_loader: PathBuf::from(catalog::BIOS_LOADER),
                efi_loader: PathBuf::from(catalog::EFI_LOADER),
                volume: VolumeMetadata {
                    volume_id: volume.volume_id.unwrap_or_else(|| "TINY11".to_string()),
                    application_id: volume
                        .application_id
                        .unwrap_or_else(|| "tiny11 builder".to_string()),
                    publisher: volume.publisher.unwrap_or_else(|| "tiny11".to_string()),
                },
            },
            verbosity: overrides.verbosity,
        })
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
///
/// `..` at the root stays at the root, matching how the kernel resolves it.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
