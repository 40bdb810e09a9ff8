//! tools::runner
//!
//! Synchronous execution of external programs.
//!
//! Every adapter in [`crate::tools`] goes through [`CommandRunner`], so
//! failures look the same everywhere: the full command line plus the
//! program's own stderr. In debug mode each command and its stdout are
//! echoed.

use std::ffi::{OsStr, OsString};
use std::process::{Command, Output};

use super::ToolError;
use crate::ui::output::{self, Verbosity};

/// Runs external commands and checks their exit status.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    verbosity: Verbosity,
    privilege: Option<String>,
}

impl CommandRunner {
    /// `privilege` is the command used to run privileged invocations
    /// (usually `sudo`); `None` runs them directly.
    pub fn new(verbosity: Verbosity, privilege: Option<String>) -> Self {
        Self {
            verbosity,
            privilege,
        }
    }

    /// Run `program` with `args`, failing on a nonzero exit.
    pub fn run<I, S>(&self, program: &str, args: I) -> Result<Output, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        self.exec(program, &args)
    }

    /// Run `program` through the privilege command, if one is configured.
    pub fn run_privileged<I, S>(&self, program: &str, args: I) -> Result<Output, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        match &self.privilege {
            Some(prefix) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(OsString::from(program));
                full.extend(args);
                self.exec(prefix, &full)
            }
            None => self.exec(program, &args),
        }
    }

    fn exec(&self, program: &str, args: &[OsString]) -> Result<Output, ToolError> {
        let command_line = render_command(program, args);
        output::debug(format!("$ {}", command_line), self.verbosity);

        let out = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| ToolError::Spawn {
                program: program.to_string(),
                source: e,
            })?;

        if !out.stdout.is_empty() {
            output::debug(String::from_utf8_lossy(&out.stdout).trim_end(), self.verbosity);
        }

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            let stderr = if stderr.is_empty() {
                String::from_utf8_lossy(&out.stdout).trim().to_string()
            } else {
                stderr
            };
            return Err(ToolError::Failed {
                command: command_line,
                status: out.status.to_string(),
                stderr,
            });
        }

        Ok(out)
    }
}

/// Render a command line for display, quoting arguments with spaces.
pub fn render_command(program: &str, args: &[OsString]) -> String {
    let mut line = program.to_string();
    for arg in args {
        let arg = arg.to_string_lossy();
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push('\'');
            line.push_str(&arg);
            line.push('\'');
        } else {
            line.push_str(&arg);
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_quotes_spaces() {
        let args = vec![
            OsString::from("mountrw"),
            OsString::from("/tmp/a b/install.wim"),
            OsString::from("1"),
        ];
        assert_eq!(
            render_command("wimlib-imagex", &args),
            "wimlib-imagex mountrw '/tmp/a b/install.wim' 1"
        );
    }

    #[test]
    fn run_reports_failure_with_stderr() {
        let runner = CommandRunner::new(Verbosity::Quiet, None);
        match runner.run("sh", ["-c", "echo boom >&2; exit 3"]) {
            Err(ToolError::Failed { command, stderr, .. }) => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn run_missing_program_is_spawn_error() {
        let runner = CommandRunner::new(Verbosity::Quiet, None);
        assert!(matches!(
            runner.run("definitely-not-a-real-program-t11", Vec::<&str>::new()),
            Err(ToolError::Spawn { .. })
        ));
    }

    #[test]
    fn privileged_prefixes_command() {
        let runner = CommandRunner::new(Verbosity::Quiet, Some("env".to_string()));
        let out = runner.run_privileged("echo", ["hi"]).unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hi");
    }
}
