//! cli
//!
//! Command-line interface layer.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments
//! - Load the config file and resolve the run [`Settings`]
//! - Install the interrupt handler (cooperative stop, then forced cleanup)
//! - Hand off to [`crate::engine::run`] and print the report
//!
//! # Architecture
//!
//! The CLI layer is thin. Errors from lower layers are typed; here they are
//! collected into `anyhow::Error` and `main` prints the chain and exits 1.

pub mod args;

pub use args::Cli;

use anyhow::{Context as _, Result};

use crate::core::config::{Config, Settings};
use crate::core::types::BuildReport;
use crate::engine::{self, CancelToken, Context};
use crate::tools::SystemTools;
use crate::ui::output::{self, Verbosity};
use crate::ui::prompts::TerminalPrompter;

/// Exit status after a second interrupt.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let verbosity = cli.verbosity();

    let loaded = Config::load()?;
    if let Some(path) = &loaded.path {
        output::debug(format!("using config '{}'", path.display()), verbosity);
    }
    let cwd = std::env::current_dir().context("cannot determine the current directory")?;
    let settings = Settings::resolve(&loaded.config, cli.overrides(), &cwd)?;

    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone(), settings.clone())?;

    let tools = SystemTools::new(&settings).context("failed to set up the toolchain")?;
    let prompt_cancel = cancel.clone();
    let mut prompter = TerminalPrompter::interruptible(move || prompt_cancel.is_cancelled());
    let ctx = Context::new(&settings, cancel);
    let report = engine::run(&ctx, tools.toolchain(), &mut prompter)?;

    print_report(&report, verbosity);
    Ok(())
}

/// First Ctrl-C requests a clean abort at the next stage boundary (or at
/// the pending prompt). A second one unmounts and removes the scratch tree
/// from the handler thread, then exits.
fn install_interrupt_handler(cancel: CancelToken, settings: Settings) -> Result<()> {
    ctrlc::set_handler(move || {
        if cancel.cancel() {
            output::error("interrupted again; cleaning up and exiting");
            abandon_run(&settings);
            std::process::exit(EXIT_INTERRUPTED);
        }
        output::warn("interrupt received; stopping after the current step (Ctrl-C again to exit now)");
    })
    .context("failed to install the interrupt handler")
}

fn abandon_run(settings: &Settings) {
    let tools = match SystemTools::new(settings) {
        Ok(tools) => tools,
        Err(e) => {
            output::warn(format!("cleanup skipped: {}", e));
            return;
        }
    };
    match engine::release_abandoned(&settings.layout, tools.toolchain(), settings.verbosity) {
        Some(report) if !report.still_mounted.is_empty() => output::warn(format!(
            "still mounted: {}",
            report
                .still_mounted
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )),
        Some(_) => {}
        None => output::debug("no scratch tree to clean up", settings.verbosity),
    }
}

fn print_report(report: &BuildReport, verbosity: Verbosity) {
    output::success(
        format!(
            "Built '{}' ({})",
            report.output.display(),
            output::format_size(report.size_bytes)
        ),
        verbosity,
    );
    output::info(format!("image index: {}", report.image_index), verbosity);
    output::info(format!("sha256: {}", report.sha256), verbosity);
    if verbosity == Verbosity::Quiet {
        println!("{}", report.output.display());
    }
}
