//! tools
//!
//! Interfaces to the external programs that do the real work.
//!
//! # Architecture
//!
//! The builder never parses WIM containers, registry hives or ISO9660
//! structures itself. Each external collaborator sits behind a narrow,
//! synchronous trait, and pipeline stages depend only on these traits:
//!
//! - [`ImageToolkit`] - list/export/mount/unmount/optimize image containers
//!   (`wimlib-imagex`)
//! - [`HiveEditor`] - merge a registry edit script into a hive file
//!   (`hivexregedit`)
//! - [`IsoAuthor`] - assemble a bootable ISO from a directory tree
//!   (`genisoimage`)
//! - [`LoopMounter`] - read-only loop mount of the source ISO (`mount`)
//! - [`Downloader`] - fetch the answer file over HTTP (`reqwest`)
//! - [`HostProbe`] - facts about the host (uid, PATH, packages, mounts)
//!
//! [`SystemTools`] wires the real implementations together; [`mock`]
//! provides a recording in-memory implementation for tests.

mod genisoimage;
mod hivex;
mod host;
mod http;
mod loopmount;
pub mod mock;
pub mod runner;
mod wimlib;

pub use genisoimage::GenisoimageAuthor;
pub use hivex::HivexEditor;
pub use host::SystemHost;
pub use http::HttpDownloader;
pub use loopmount::SystemLoopMounter;
pub use runner::CommandRunner;
pub use wimlib::{parse_image_list, WimlibToolkit};

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::config::Settings;
use crate::core::types::{BootSpec, Compression, ImageIndex, ImageInfo, RegistryPatch};

/// Errors from external tool invocations.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The program could not be started at all.
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully.
    #[error("'{command}' failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    /// The program succeeded but printed something we could not interpret.
    #[error("unexpected output from '{program}': {message}")]
    BadOutput { program: String, message: String },

    /// Local file I/O performed on behalf of a tool.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Network or HTTP failure.
    #[error("download failed: {0}")]
    Download(String),
}

/// Image container operations.
pub trait ImageToolkit {
    /// List the images in a container.
    fn list_images(&self, container: &Path) -> Result<Vec<ImageInfo>, ToolError>;

    /// Export one image of `source` into a new container at `dest`.
    fn export(
        &self,
        source: &Path,
        index: ImageIndex,
        dest: &Path,
        compression: Compression,
    ) -> Result<(), ToolError>;

    /// Mount one image read-write at `mount_dir`.
    fn mount_rw(&self, container: &Path, index: ImageIndex, mount_dir: &Path)
        -> Result<(), ToolError>;

    /// Unmount `mount_dir`, writing changes back when `commit` is set.
    fn unmount(&self, mount_dir: &Path, commit: bool) -> Result<(), ToolError>;

    /// Rebuild a container to drop space held by deleted files.
    fn optimize(&self, container: &Path) -> Result<(), ToolError>;
}

/// Registry hive editing.
pub trait HiveEditor {
    /// Merge `patch` into the hive file at `hive`.
    fn apply(&self, hive: &Path, patch: &RegistryPatch) -> Result<(), ToolError>;
}

/// Bootable ISO authoring.
pub trait IsoAuthor {
    /// Build an ISO of `tree` at `output` with the given boot catalog.
    fn build(&self, tree: &Path, boot: &BootSpec, output: &Path) -> Result<(), ToolError>;
}

/// Loop mounting of the source ISO.
pub trait LoopMounter {
    /// Mount `image` read-only at `mount_dir`.
    fn mount_ro(&self, image: &Path, mount_dir: &Path) -> Result<(), ToolError>;

    /// Unmount `mount_dir`.
    fn unmount(&self, mount_dir: &Path) -> Result<(), ToolError>;
}

/// HTTP download.
pub trait Downloader {
    /// Fetch `url` into `dest`, returning the number of bytes written.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ToolError>;
}

/// Facts about the host the builder runs on.
pub trait HostProbe {
    /// True when running with effective uid 0.
    fn is_root(&self) -> bool;

    /// Resolve a program name on `PATH`.
    fn find_program(&self, name: &str) -> Option<PathBuf>;

    /// True when the package manager records `package` as installed.
    fn package_installed(&self, package: &str) -> bool;

    /// True when `path` is currently a mount point.
    fn is_mount_point(&self, path: &Path) -> bool;
}

/// The set of collaborators a pipeline run uses.
#[derive(Clone, Copy)]
pub struct Toolchain<'a> {
    pub host: &'a dyn HostProbe,
    pub loop_mounter: &'a dyn LoopMounter,
    pub imagex: &'a dyn ImageToolkit,
    pub hive_editor: &'a dyn HiveEditor,
    pub iso_author: &'a dyn IsoAuthor,
    pub downloader: &'a dyn Downloader,
}

/// Real implementations backed by host programs.
pub struct SystemTools {
    host: SystemHost,
    loop_mounter: SystemLoopMounter,
    imagex: WimlibToolkit,
    hive_editor: HivexEditor,
    iso_author: GenisoimageAuthor,
    downloader: HttpDownloader,
}

impl SystemTools {
    /// Build the real toolchain from run settings.
    pub fn new(settings: &Settings) -> Result<Self, ToolError> {
        let runner = CommandRunner::new(settings.verbosity, settings.privilege_command.clone());
        Ok(Self {
            host: SystemHost::new(),
            loop_mounter: SystemLoopMounter::new(runner.clone()),
            imagex: WimlibToolkit::new(runner.clone(), &settings.tools.imagex),
            hive_editor: HivexEditor::new(
                runner.clone(),
                &settings.tools.hive_editor,
                settings.layout.registry_script(),
            ),
            iso_author: GenisoimageAuthor::new(runner, &settings.tools.iso_author),
            downloader: HttpDownloader::new(
                settings.answer_file.connect_timeout,
                settings.answer_file.timeout,
            )?,
        })
    }

    pub fn toolchain(&self) -> Toolchain<'_> {
        Toolchain {
            host: &self.host,
            loop_mounter: &self.loop_mounter,
            imagex: &self.imagex,
            hive_editor: &self.hive_editor,
            iso_author: &self.iso_author,
            downloader: &self.downloader,
        }
    }
}
