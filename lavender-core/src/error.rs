use std::path::PathBuf;

use lavender_common::CommonError;
use lavender_index::IndexError;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid module name `{0}`")]
    InvalidModuleName(String),
    #[error("Invalid pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("Invalid destination `{0}`")]
    InvalidDestination(String),
    #[error("No target docroots given")]
    NoTargets,
    #[error("Targets are inconsistent: `{file}` differs between {first} and {other}")]
    Inconsistent {
        file: String,
        first: PathBuf,
        other: PathBuf,
    },
    #[error("All-index of {docroot} has no entry for `{destination}`")]
    MissingReference {
        docroot: PathBuf,
        destination: String,
    },
    #[error("Lock `{0}` is held by another process")]
    Locked(PathBuf),
    #[error("Archive error in `{path}`: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
    #[error("{0}")]
    Common(#[from] CommonError),
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| CoreError::Io { path, source }
    }
}
