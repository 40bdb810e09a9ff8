//! core::types
//!
//! Strong types for the values flowing between pipeline stages.
//!
//! # Design
//!
//! Image indices are validated on construction: an [`ImageIndex`] is always
//! 1-based, and [`ImageIndex::parse_in_range`] additionally checks the upper
//! bound reported by the container. Everything else here is plain data that
//! the stages hand to the external tools.

use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from parsing an operator-supplied image index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("index {value} is out of range (1-{count})")]
    OutOfRange { value: u64, count: u32 },
}

/// 1-based ordinal of an image inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageIndex(NonZeroU32);

impl ImageIndex {
    /// Create an index, rejecting zero.
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    pub const fn from_nonzero(value: NonZeroU32) -> Self {
        Self(value)
    }

    /// Parse operator input and check it against the container's image count.
    ///
    /// Accepts only ASCII digits (surrounding whitespace is ignored).
    /// Signs, decimals and empty input are rejected as not-a-number.
    ///
    /// # Example
    ///
    /// ```
    /// use tiny11_builder::core::types::{ImageIndex, IndexError};
    ///
    /// assert_eq!(ImageIndex::parse_in_range("3", 3).unwrap().get(), 3);
    /// assert!(matches!(ImageIndex::parse_in_range("0", 3), Err(IndexError::OutOfRange { .. })));
    /// assert!(matches!(ImageIndex::parse_in_range("abc", 3), Err(IndexError::NotANumber(_))));
    /// ```
    pub fn parse_in_range(input: &str, count: u32) -> Result<Self, IndexError> {
        let value = Self::parse_number(input)?;
        u32::try_from(value)
            .ok()
            .filter(|v| *v <= count)
            .and_then(Self::new)
            .ok_or(IndexError::OutOfRange { value, count })
    }

    /// Parse operator input without an upper bound.
    pub fn parse(input: &str) -> Result<Self, IndexError> {
        let value = Self::parse_number(input)?;
        u32::try_from(value)
            .ok()
            .and_then(Self::new)
            .ok_or(IndexError::OutOfRange {
                value,
                count: u32::MAX,
            })
    }

    fn parse_number(input: &str) -> Result<u64, IndexError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IndexError::NotANumber(trimmed.to_string()));
        }
        // Saturate absurdly long digit strings; they are out of range anyway.
        Ok(trimmed.parse::<u64>().unwrap_or(u64::MAX))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for ImageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a container's image listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub index: ImageIndex,
    pub name: String,
    pub description: Option<String>,
}

impl fmt::Display for ImageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.index, self.name)?;
        if let Some(desc) = &self.description {
            if desc != &self.name {
                write!(f, " - {}", desc)?;
            }
        }
        Ok(())
    }
}

/// Compression used when exporting an image into a new container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// XPRESS
    Fast,
    /// LZX, the best ratio a WIM can still be mounted read-write with
    Maximum,
}

/// A set of DWORD values to merge under one registry key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryPatch {
    /// Root the hive is mounted under, e.g. `HKEY_LOCAL_MACHINE\SYSTEM`.
    pub root: String,
    /// Key path relative to the hive root, e.g. `Setup\LabConfig`.
    pub key: String,
    /// One-line description written as a comment at the top of the script.
    pub comment: String,
    pub values: Vec<(String, u32)>,
}

impl RegistryPatch {
    /// Full key path as it appears in the edit script.
    pub fn full_key(&self) -> String {
        format!("{}\\{}", self.root, self.key)
    }

    /// Render the patch as a regedit (version 5) script.
    pub fn render(&self) -> String {
        let mut out = String::from("Windows Registry Editor Version 5.00\n\n");
        out.push_str(&format!("; {}\n", self.comment));
        out.push_str(&format!("[{}]\n", self.full_key()));
        for (name, value) in &self.values {
            out.push_str(&format!("\"{}\"=dword:{:08x}\n", name, value));
        }
        out
    }
}

/// Identifiers written into the primary volume descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMetadata {
    pub volume_id: String,
    pub application_id: String,
    pub publisher: String,
}

/// Boot catalog layout for the output ISO. Loader paths are relative to
/// the staged tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSpec {
    pub bios_loader: PathBuf,
    pub efi_loader: PathBuf,
    pub volume: VolumeMetadata,
}

/// Summary of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub output: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
    pub image_index: ImageIndex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_in_range_accepts_bounds() {
        assert_eq!(ImageIndex::parse_in_range("1", 3).unwrap().get(), 1);
        assert_eq!(ImageIndex::parse_in_range(" 3\n", 3).unwrap().get(), 3);
    }

    #[test]
    fn parse_in_range_rejects_zero_and_overflow() {
        assert_eq!(
            ImageIndex::parse_in_range("0", 3),
            Err(IndexError::OutOfRange { value: 0, count: 3 })
        );
        assert_eq!(
            ImageIndex::parse_in_range("4", 3),
            Err(IndexError::OutOfRange { value: 4, count: 3 })
        );
        assert!(ImageIndex::parse_in_range("99999999999999999999999", 3).is_err());
    }

    #[test]
    fn parse_rejects_non_digits() {
        for bad in ["", "abc", "-1", "+2", "1.5", "2a", " "] {
            assert!(
                matches!(ImageIndex::parse(bad), Err(IndexError::NotANumber(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn render_registry_patch() {
        let patch = RegistryPatch {
            root: "HKEY_LOCAL_MACHINE\\SYSTEM".to_string(),
            key: "Setup\\LabConfig".to_string(),
            comment: "test".to_string(),
            values: vec![("A".to_string(), 1), ("B".to_string(), 0x10)],
        };
        let script = patch.render();
        assert!(script.starts_with("Windows Registry Editor Version 5.00\n"));
        assert!(script.contains("; test\n"));
        assert!(script.contains("[HKEY_LOCAL_MACHINE\\SYSTEM\\Setup\\LabConfig]\n"));
        assert!(script.contains("\"A\"=dword:00000001\n"));
        assert!(script.contains("\"B\"=dword:00000010\n"));
    }

    #[test]
    fn image_info_display_skips_duplicate_description() {
        let info = ImageInfo {
            index: ImageIndex::new(2).unwrap(),
            name: "Windows 11 Pro".to_string(),
            description: Some("Windows 11 Pro".to_string()),
        };
        assert_eq!(info.to_string(), "[2] Windows 11 Pro");
    }
}
