//! ui
//!
//! User interaction utilities.
//!
//! # Modules
//!
//! - [`prompts`] - Operator prompts for image indices
//! - [`output`] - Color-coded console output
//!
//! # Design
//!
//! All console output and prompts go through this module so the level
//! tags stay consistent and tests can replace the terminal with scripted
//! answers.

pub mod output;
pub mod prompts;
