//! tiny11 - builds a trimmed Windows 11 installation ISO
//!
//! The builder unpacks a stock installation ISO, strips preinstalled
//! applications and telemetry tasks from the install image, patches the
//! registry so setup skips its hardware checks, and repacks a bootable ISO.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, builds settings)
//! - [`engine`] - Runs the pipeline stages in order with scoped cleanup
//! - [`core`] - Settings, fixed catalogs, scratch layout, domain types
//! - [`tools`] - Narrow interfaces to the external programs doing the real work
//! - [`ui`] - Console output and operator prompts
//!
//! # Correctness Invariants
//!
//! 1. Nothing is mounted or mutated before preflight passes
//! 2. At most one OS image is mounted at the image mount point
//! 3. Every mount is released by a guard, on success and failure alike
//! 4. The scratch tree never outlives the run

pub mod cli;
pub mod core;
pub mod engine;
pub mod tools;
pub mod ui;
