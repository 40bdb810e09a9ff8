//! core::config::schema
//!
//! Configuration file schema.
//!
//! # Location
//!
//! Searched in order:
//! 1. `$TINY11_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/tiny11/config.toml`
//! 3. `~/.config/tiny11/config.toml`
//!
//! # Validation
//!
//! Values are validated after parsing so a typo fails before anything is
//! mounted, not halfway through a build.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Maximum length of an ISO9660 volume identifier.
pub const MAX_VOLUME_ID_LEN: usize = 32;

/// Contents of the optional config file.
///
/// # Example
///
/// ```toml
/// scratch = "/var/tmp/tiny11_work"
/// privilege_command = "sudo"
///
/// [tools]
/// iso_author = "mkisofs"
///
/// [answer_file]
/// timeout_secs = 60
///
/// [volume]
/// volume_id = "TINY11_23H2"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Default scratch directory
    pub scratch: Option<String>,

    /// Command prefixed to loop mount/unmount ("" disables it)
    pub privilege_command: Option<String>,

    /// External program names
    pub tools: Option<ToolsConfig>,

    /// Answer-file download settings
    pub answer_file: Option<AnswerFileConfig>,

    /// Output volume identifiers
    pub volume: Option<VolumeConfig>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(scratch) = &self.scratch {
            if scratch.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "scratch must not be empty".to_string(),
                ));
            }
        }
        if let Some(tools) = &self.tools {
            tools.validate()?;
        }
        if let Some(answer) = &self.answer_file {
            answer.validate()?;
        }
        if let Some(volume) = &self.volume {
            volume.validate()?;
        }
        Ok(())
    }
}

/// External program names, looked up on `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    pub imagex: Option<String>,
    pub hive_editor: Option<String>,
    pub iso_author: Option<String>,
}

impl ToolsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("tools.imagex", &self.imagex),
            ("tools.hive_editor", &self.hive_editor),
            ("tools.iso_author", &self.iso_author),
        ] {
            if let Some(v) = value {
                if v.trim().is_empty() {
                    return Err(ConfigError::InvalidValue(format!("{} must not be empty", key)));
                }
            }
        }
        Ok(())
    }
}

/// Where and how patiently to fetch the answer file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnswerFileConfig {
    pub url: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

impl AnswerFileConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue(format!(
                    "answer_file.url must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }
        if self.connect_timeout_secs == Some(0) || self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "answer_file timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Identifiers written into the output ISO.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct VolumeConfig {
    pub volume_id: Option<String>,
    pub application_id: Option<String>,
    pub publisher: Option<String>,
}

impl VolumeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(id) = &self.volume_id {
            if id.is_empty() || id.chars().count() > MAX_VOLUME_ID_LEN {
                return Err(ConfigError::InvalidValue(format!(
                    "volume.volume_id must be 1-{} characters, got '{}'",
                    MAX_VOLUME_ID_LEN, id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_parses_to_default() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config, FileConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn full_file_parses() {
        let config: FileConfig = toml::from_str(
            r#"
            scratch = "/var/tmp/w"
            privilege_command = ""

            [tools]
            imagex = "/opt/wimlib/bin/wimlib-imagex"
            iso_author = "mkisofs"

            [answer_file]
            url = "http://mirror.local/autounattend.xml"
            connect_timeout_secs = 5
            timeout_secs = 60

            [volume]
            volume_id = "TINY11_23H2"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.privilege_command.as_deref(), Some(""));
        assert_eq!(config.tools.unwrap().iso_author.as_deref(), Some("mkisofs"));
        assert_eq!(config.answer_file.unwrap().timeout_secs, Some(60));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("colour = true").is_err());
        assert!(toml::from_str::<FileConfig>("[tools]\nxorriso = \"x\"").is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad_url = FileConfig {
            answer_file: Some(AnswerFileConfig {
                url: Some("ftp://x/y".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(bad_url.validate().is_err());

        let zero_timeout = FileConfig {
            answer_file: Some(AnswerFileConfig {
                timeout_secs: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());

        let long_label = FileConfig {
            volume: Some(VolumeConfig {
                volume_id: Some("X".repeat(33)),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(long_label.validate().is_err());

        let empty_tool = FileConfig {
            tools: Some(ToolsConfig {
                hive_editor: Some(" ".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(empty_tool.validate().is_err());
    }
}
