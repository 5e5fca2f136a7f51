use std::path::PathBuf;

use lavender_common::{CommonError, Md5};

pub type IndexResult<T> = std::result::Result<T, IndexError>;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The file does not exist. Callers decide whether that means "never
    /// published" or a consistency problem.
    #[error("Index file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed line {line} in `{path}`: {source}")]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        source: CommonError,
    },
    #[error("Destination `{destination}` already holds {existing}, refusing {new}")]
    DestinationConflict {
        destination: String,
        existing: Md5,
        new: Md5,
    },
    #[error(transparent)]
    Common(#[from] CommonError),
}
