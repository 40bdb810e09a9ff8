//! tools::hivex
//!
//! [`HiveEditor`] backed by `hivexregedit --merge`.
//!
//! The patch is rendered to a regedit script at a fixed path in the scratch
//! tree, then merged with `--prefix` set to the key the hive would be loaded
//! under on a live system, so the script can use full
//! `HKEY_LOCAL_MACHINE\SYSTEM\...` paths.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use super::runner::CommandRunner;
use super::{HiveEditor, ToolError};
use crate::core::types::RegistryPatch;

pub struct HivexEditor {
    runner: CommandRunner,
    program: String,
    script: PathBuf,
}

impl HivexEditor {
    pub fn new(runner: CommandRunner, program: &str, script: PathBuf) -> Self {
        Self {
            runner,
            program: program.to_string(),
            script,
        }
    }
}

impl HiveEditor for HivexEditor {
    fn apply(&self, hive: &Path, patch: &RegistryPatch) -> Result<(), ToolError> {
        fs::write(&self.script, patch.render()).map_err(|e| ToolError::Io {
            path: self.script.clone(),
            source: e,
        })?;

        self.runner.run(
            &self.program,
            [
                OsStr::new("--merge"),
                OsStr::new("--prefix"),
                OsStr::new(&patch.root),
                hive.as_os_str(),
                self.script.as_os_str(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog;
    use crate::ui::output::Verbosity;
    use tempfile::TempDir;

    #[test]
    fn writes_script_before_merging() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("bypass.reg");
        let editor = HivexEditor::new(
            CommandRunner::new(Verbosity::Quiet, None),
            "true",
            script.clone(),
        );

        editor
            .apply(&dir.path().join("SYSTEM"), &catalog::bypass_patch())
            .unwrap();

        let text = fs::read_to_string(&script).unwrap();
        assert!(text.contains("[HKEY_LOCAL_MACHINE\\SYSTEM\\Setup\\LabConfig]"));
        assert!(text.contains("\"BypassTPMCheck\"=dword:00000001"));
    }

    #[test]
    fn editor_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let editor = HivexEditor::new(
            CommandRunner::new(Verbosity::Quiet, None),
            "false",
            dir.path().join("bypass.reg"),
        );
        assert!(matches!(
            editor.apply(&dir.path().join("SYSTEM"), &catalog::bypass_patch()),
            Err(ToolError::Failed { .. })
        ));
    }
}
