//! tools::http
//!
//! [`Downloader`] backed by a blocking `reqwest` client.
//!
//! The client carries both a connect timeout and an overall timeout, so an
//! unreachable host can stall the pipeline for at most the overall budget.
//! The body is written to a sibling `.part` file and renamed into place, so
//! `dest` never holds a truncated download.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;

use super::{Downloader, ToolError};

pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(connect_timeout: Duration, timeout: Duration) -> Result<Self, ToolError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .user_agent(concat!("tiny11-builder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::Download(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Downloader for HttpDownloader {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ToolError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| ToolError::Download(e.to_string()))?;

        let partial = dest.with_extension("part");
        let io_err = |e: io::Error| ToolError::Io {
            path: partial.clone(),
            source: e,
        };

        let mut file = File::create(&partial).map_err(io_err)?;
        let written = match response.copy_to(&mut file) {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&partial);
                return Err(ToolError::Download(e.to_string()));
            }
        };
        drop(file);

        fs::rename(&partial, dest).map_err(|e| ToolError::Io {
            path: dest.to_path_buf(),
            source: e,
        })?;
        Ok(written)
    }
}
