//! core
//!
//! Domain types, fixed catalogs, scratch layout and settings.
//!
//! # Modules
//!
//! - [`types`] - Image indices, registry patches, boot layout
//! - [`catalog`] - Fixed removal lists, registry values, well-known paths
//! - [`paths`] - Scratch tree layout
//! - [`config`] - Config file loading and immutable run settings
//!
//! Nothing in this module touches the filesystem except config loading.

pub mod catalog;
pub mod config;
pub mod paths;
pub mod types;
