//! Error taxonomy for bundle deployment.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeployError>;

/// Every failure aborts the run; nothing here is recovered locally.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("could not find library {library} (searched: {})", format_dirs(.searched))]
    LibraryNotFound {
        library: String,
        searched: Vec<PathBuf>,
    },

    #[error("{tool} failed on {}: {status}", .path.display())]
    ExternalToolFailure {
        tool: String,
        path: PathBuf,
        status: ExitStatus,
    },

    #[error("failed to run {tool}: {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write archive {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid library declaration '{0}'")]
    InvalidLibrarySpec(String),

    #[error("platform '{0}' is deployed with vendor tooling and is not supported here")]
    UnsupportedPlatform(String),
}

impl DeployError {
    pub(crate) fn fs(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Attach a path to an `io::Result`, producing a [`DeployError::Filesystem`].
pub(crate) trait IoContext<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| DeployError::fs(path, e))
    }
}

fn format_dirs(dirs: &[PathBuf]) -> String {
    if dirs.is_empty() {
        return "no directories".to_string();
    }
    dirs.iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
