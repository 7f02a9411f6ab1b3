use std::path::PathBuf;

use thiserror::Error;

use crate::{http::HttpError, resolver::ResolverError, updates::UpdatesError};

/// Top-level error type returned by every fallible public entry point.
///
/// Each variant carries enough context to print a one-line message plus a
/// suggested follow-up, mirroring the `suggested_action` text upstream
/// attaches to its exception hierarchy.
#[derive(Error, Debug)]
pub enum AqtError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Updates(#[from] UpdatesError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error("no package found matching the request: {missing:?}")]
    NoPackageFound { missing: Vec<String> },

    #[error("invalid input: {0}")]
    CliInput(String),

    #[error("failed to patch installation at {path}: {source}")]
    Updater {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path {path} is too long to patch in place ({len} >= 255 bytes)")]
    SlotOverflow { path: PathBuf, len: usize },

    #[error("ran out of memory while extracting {archive}")]
    OutOfMemory { archive: String },

    #[error("not enough disk space to extract {archive}")]
    OutOfDiskSpace { archive: String },

    #[error("permission denied writing to {path}")]
    DiskAccessNotPermitted { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AqtError {
    /// A short, user-facing suggestion to append after the error message.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NoPackageFound { .. } => {
                Some("run the corresponding list-* subcommand to see available modules")
            }
            Self::Http(HttpError::ChecksumDownloadFailure { .. }) => {
                Some("check your configured mirrors with --base or the settings file")
            }
            Self::OutOfMemory { .. } => Some("try reducing concurrency in the settings file"),
            Self::OutOfDiskSpace { .. } => Some("free up disk space and retry"),
            _ => None,
        }
    }

    /// Process exit code for this error class. Unhandled/panic-class errors
    /// are mapped to 254 by the caller, never constructed as this variant.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
