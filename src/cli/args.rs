//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Flags
//!
//! - `--iso` / `-i`: Source Windows 11 ISO
//! - `--scratch` / `-s`: Working directory (deleted after the run)
//! - `--output` / `-o`: Output ISO path
//! - `--debug`: Echo every external command
//! - `--quiet` / `-q`: Warnings and errors only
//! - `--help` / `-h`, `--version` / `-V`

use clap::Parser;
use std::path::PathBuf;

use crate::core::config::Overrides;
use crate::ui::output::Verbosity;

/// tiny11 - build a trimmed Windows 11 installation ISO on Linux
#[derive(Parser, Debug)]
#[command(name = "tiny11")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Source Windows 11 ISO
    #[arg(short, long, value_name = "PATH")]
    pub iso: Option<PathBuf>,

    /// Working directory for the mounts and the staged tree
    /// [default: ./tiny11_work]
    #[arg(short, long, value_name = "DIR")]
    pub scratch: Option<PathBuf>,

    /// Where to write the finished ISO [default: ./tiny11.iso]
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Echo every external command and its output
    #[arg(long, conflicts_with = "quiet")]
    pub debug: bool,

    /// Only print warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.debug)
    }

    /// The values that override the config file.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            iso: self.iso.clone(),
            scratch: self.scratch.clone(),
            output: self.output.clone(),
            verbosity: self.verbosity(),
        }
    }
}
