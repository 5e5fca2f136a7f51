use std::path::PathBuf;

use lavender_index::IndexError;

pub type RewriteResult<T> = std::result::Result<T, RewriteError>;

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("Consistent hash ring has no nodes")]
    EmptyRing,
    #[error("Failed to read node list `{path}`: {source}")]
    NodesFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid node `{uri}` on line {line}: {reason}")]
    InvalidNode {
        line: usize,
        uri: String,
        reason: String,
    },
    #[error("No {scheme} node named `{node}`")]
    UnknownNode { scheme: String, node: String },
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}
