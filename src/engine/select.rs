//! engine::select
//!
//! Ask the operator which edition of `install.wim` to trim.

use super::{BuildError, Context, StageResultExt};
use crate::core::types::ImageIndex;
use crate::tools::{ToolError, Toolchain};
use crate::ui::output;
use crate::ui::prompts::{PromptError, Prompter};

/// List the images in `install.wim` and prompt until a valid index is given.
///
/// # Errors
///
/// - [`BuildError::MissingContainer`] if the stage has no `install.wim`
/// - [`BuildError::Prompt`] if input ends before a valid answer
pub fn select(
    ctx: &Context<'_>,
    tools: Toolchain<'_>,
    prompter: &mut dyn Prompter,
) -> Result<ImageIndex, BuildError> {
    let wim = ctx.settings.layout.install_wim();
    if !wim.is_file() {
        return Err(BuildError::MissingContainer(wim));
    }

    let images = tools
        .imagex
        .list_images(&wim)
        .stage("listing the images in install.wim")?;
    if images.is_empty() {
        return Err(BuildError::Tool {
            stage: "listing the images in install.wim",
            source: ToolError::BadOutput {
                program: ctx.settings.tools.imagex.clone(),
                message: format!("'{}' contains no images", wim.display()),
            },
        });
    }
    let count = u32::try_from(images.len()).unwrap_or(u32::MAX);

    output::info("Available images:", ctx.verbosity());
    println!("{}", output::format_list(&images, "  "));

    let index = prompt_index(prompter, count)?;
    output::debug(format!("selected image {}", index), ctx.verbosity());
    Ok(index)
}

/// Prompt until the answer is a number in `1..=count`.
///
/// Invalid answers print a warning and ask again. There is no default.
pub fn prompt_index(prompter: &mut dyn Prompter, count: u32) -> Result<ImageIndex, PromptError> {
    let message = format!("Enter the image index to build (1-{})", count);
    loop {
        let answer = prompter.input(&message)?;
        match ImageIndex::parse_in_range(&answer, count) {
            Ok(index) => return Ok(index),
            Err(e) => output::warn(format!("{}; try again", e)),
        }
    }
}
