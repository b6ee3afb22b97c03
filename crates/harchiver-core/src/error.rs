//! Error taxonomy for the archiver.
//!
//! Construction errors are fatal to instantiation. Build and write errors are
//! reported through the diagnostic channel and never stop other exchanges from
//! being archived (except an unrecoverable write error, which halts the archiver).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The archive file could not be created or initialised.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("archive path is a directory: {}", .0.display())]
    IsDirectory(PathBuf),

    #[error("parent directory of archive does not exist: {}", .0.display())]
    MissingParent(PathBuf),

    #[error("cannot resolve current directory for relative archive path")]
    CurrentDir(#[source] io::Error),

    #[error("failed to create archive file {}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize empty archive")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to start archive writer thread")]
    SpawnWriter(#[source] io::Error),
}

/// The exchange data could not be turned into a HAR entry; the entry is skipped.
#[derive(Debug, Error)]
pub enum EntryBuildError {
    #[error("invalid request URL {url:?}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid header name {name:?}")]
    InvalidHeaderName { name: String },

    #[error("invalid request method {method:?}")]
    InvalidMethod { method: String },
}

/// Writing the archive to disk failed.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("archive write failed for {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize archive")]
    Serialize(#[from] serde_json::Error),
}

impl WriteError {
    pub(crate) fn io(path: &std::path::Path, source: io::Error) -> Self {
        WriteError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True when retrying later cannot succeed: the file or its directory is
    /// gone, or write access was revoked.
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            WriteError::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ),
            WriteError::Serialize(_) => false,
        }
    }
}

/// Any error the archiver reports.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error("skipped exchange {exchange}")]
    EntryBuild {
        exchange: crate::exchange::ExchangeId,
        #[source]
        source: EntryBuildError,
    },

    #[error(transparent)]
    Write(#[from] WriteError),

    /// An unrecoverable write error stopped the archiver; construct a new one.
    #[error("archiver halted after an unrecoverable write error")]
    Halted,
}
