//! engine
//!
//! The build pipeline: Preflight -> Stage -> Normalize -> Select -> Mutate
//! -> Boot patch -> Finalize, with cleanup on every exit path.
//!
//! # Architecture
//!
//! Each stage is a function over a shared [`Context`] (immutable settings
//! plus the cancellation token) and a [`Toolchain`] of external
//! collaborators. Stages run strictly in sequence; every stage after
//! preflight depends on the one before it having succeeded.
//!
//! # Invariants
//!
//! - Preflight performs no side effects
//! - Everything written before the output ISO lives under the scratch tree,
//!   which the [`Workspace`] guard removes on success, failure and interrupt
//! - At most one image is mounted read-write at a time (see [`guards`])
//! - An existing file at the output path is only replaced by a verified,
//!   non-empty ISO
//!
//! # Example
//!
//! ```no_run
//! use tiny11_builder::core::config::{FileConfig, Overrides, Settings};
//! use tiny11_builder::engine::{self, CancelToken, Context};
//! use tiny11_builder::tools::SystemTools;
//! use tiny11_builder::ui::prompts::TerminalPrompter;
//! use std::path::Path;
//!
//! let settings = Settings::resolve(&FileConfig::default(), Overrides::default(), Path::new("."))?;
//! let tools = SystemTools::new(&settings)?;
//! let ctx = Context::new(&settings, CancelToken::new());
//! let report = engine::run(&ctx, tools.toolchain(), &mut TerminalPrompter::new())?;
//! println!("{}", report.output.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod boot_patch;
pub mod cancel;
pub mod finalize;
pub mod guards;
pub mod mutate;
pub mod normalize;
pub mod preflight;
pub mod select;
pub mod stage;

pub use cancel::CancelToken;
pub use guards::{release_abandoned, CleanupReport, ImageMount, ImageMountPoint, IsoMount, Workspace};
pub use preflight::{MissingTool, PreflightError};

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::config::Settings;
use crate::core::types::{BuildReport, IndexError};
use crate::tools::{ToolError, Toolchain};
use crate::ui::output::{self, Verbosity};
use crate::ui::prompts::{PromptError, Prompter};

/// Fatal pipeline failures.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Preflight(#[from] PreflightError),

    /// An external tool failed during a stage.
    #[error("{stage} failed")]
    Tool {
        stage: &'static str,
        #[source]
        source: ToolError,
    },

    #[error("I/O error on '{path}': {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("prompt failed: {0}")]
    Prompt(PromptError),

    #[error("invalid image index: {0}")]
    InvalidIndex(#[from] IndexError),

    #[error("image container '{0}' does not exist")]
    MissingContainer(PathBuf),

    #[error("boot loader '{0}' is missing from the staged tree")]
    MissingBootFile(PathBuf),

    #[error("the ISO authoring tool did not produce '{0}'")]
    MissingOutput(PathBuf),

    #[error("the ISO authoring tool produced an empty '{0}'")]
    EmptyOutput(PathBuf),

    #[error("scratch directory '{0}' still has mounts from an earlier run; unmount them first")]
    ScratchBusy(PathBuf),

    #[error("scratch directory '{scratch}' holds '{entry}', which this tool did not create; choose another scratch directory")]
    ScratchNotOwned { scratch: PathBuf, entry: PathBuf },

    #[error("interrupted")]
    Interrupted,
}

impl From<PromptError> for BuildError {
    fn from(err: PromptError) -> Self {
        match err {
            PromptError::Interrupted => BuildError::Interrupted,
            other => BuildError::Prompt(other),
        }
    }
}

/// Attach the failing stage to a tool error.
pub(crate) trait StageResultExt<T> {
    fn stage(self, stage: &'static str) -> Result<T, BuildError>;
}

impl<T> StageResultExt<T> for Result<T, ToolError> {
    fn stage(self, stage: &'static str) -> Result<T, BuildError> {
        self.map_err(|source| BuildError::Tool { stage, source })
    }
}

pub(crate) fn io_error(path: &Path) -> impl FnOnce(io::Error) -> BuildError + '_ {
    move |source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Shared state for one run.
#[derive(Debug, Clone)]
pub struct Context<'a> {
    pub settings: &'a Settings,
    pub cancel: CancelToken,
}

impl<'a> Context<'a> {
    pub fn new(settings: &'a Settings, cancel: CancelToken) -> Self {
        Self { settings, cancel }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.settings.verbosity
    }

    /// Abort if an interrupt has been requested.
    pub fn checkpoint(&self) -> Result<(), BuildError> {
        if self.cancel.is_cancelled() {
            Err(BuildError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Run the whole pipeline.
///
/// The scratch tree is created after preflight and removed before this
/// returns, whatever the outcome.
pub fn run(
    ctx: &Context<'_>,
    tools: Toolchain<'_>,
    prompter: &mut dyn Prompter,
) -> Result<BuildReport, BuildError> {
    let settings = ctx.settings;
    let v = ctx.verbosity();

    let iso = preflight::check(settings, tools.host)?;
    ctx.checkpoint()?;

    let mut workspace = Workspace::create(&settings.layout, tools, v)?;
    let result = run_stages(ctx, tools, prompter, &iso);

    output::info("Cleaning up", v);
    let cleanup = workspace.release();
    output::debug(format!("cleanup: {:?}", cleanup), v);
    result
}

fn run_stages(
    ctx: &Context<'_>,
    tools: Toolchain<'_>,
    prompter: &mut dyn Prompter,
    iso: &Path,
) -> Result<BuildReport, BuildError> {
    let v = ctx.verbosity();

    stage::mount_and_copy(ctx, tools, iso)?;
    ctx.checkpoint()?;

    normalize::normalize(ctx, tools, prompter)?;
    ctx.checkpoint()?;

    let index = select::select(ctx, tools, prompter)?;
    ctx.checkpoint()?;

    let mut mount_point = ImageMountPoint::new(ctx.settings.layout.wim_mount(), v);
    let summary = mutate::mutate(ctx, tools, &mut mount_point, index)?;
    output::debug(
        format!(
            "removed {} packages and {} components",
            summary.removed_packages.len(),
            summary.removed_components
        ),
        v,
    );
    ctx.checkpoint()?;

    boot_patch::patch(ctx, tools, &mut mount_point);
    ctx.checkpoint()?;

    finalize::finalize(ctx, tools, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{FileConfig, Overrides};

    #[test]
    fn checkpoint_follows_token() {
        let settings =
            Settings::resolve(&FileConfig::default(), Overrides::default(), Path::new("/w"))
                .unwrap();
        let ctx = Context::new(&settings, CancelToken::new());
        assert!(ctx.checkpoint().is_ok());
        ctx.cancel.cancel();
        assert!(matches!(ctx.checkpoint(), Err(BuildError::Interrupted)));
    }

    #[test]
    fn tool_errors_keep_their_source() {
        let err: Result<(), _> = Err(ToolError::Download("timed out".to_string()));
        let err = err.stage("downloading").unwrap_err();
        assert_eq!(err.to_string(), "downloading failed");
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("timed out"));
    }

    #[test]
    fn interrupted_prompt_is_an_interrupt() {
        assert!(matches!(
            BuildError::from(PromptError::Interrupted),
            BuildError::Interrupted
        ));
        assert!(matches!(
            BuildError::from(PromptError::Cancelled),
            BuildError::Prompt(PromptError::Cancelled)
        ));
    }
}
