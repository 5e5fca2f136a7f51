use std::path::{Component, Path, PathBuf};

use lavender_index::ALL_IDX;

use crate::error::{CoreError, CoreResult};

/// Directory below a docroot holding its index files unless configured
/// otherwise.
pub const INDEX_DIR: &str = ".lavender";

/// A published directory on one target host together with the directory of
/// its index files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Docroot {
    root: PathBuf,
    indexes: PathBuf,
}

impl Docroot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let indexes = root.join(INDEX_DIR);
        Self { root, indexes }
    }

    pub fn with_indexes(root: impl Into<PathBuf>, indexes: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            indexes: indexes.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn indexes(&self) -> &Path {
        &self.indexes
    }

    pub fn module_index(&self, module: &str) -> PathBuf {
        self.indexes.join(format!("{module}.idx"))
    }

    pub fn all_index(&self) -> PathBuf {
        self.indexes.join(ALL_IDX)
    }

    /// The file of `destination`, which must stay below the root.
    pub fn destination(&self, destination: &str) -> CoreResult<PathBuf> {
        let relative = Path::new(destination.trim_start_matches('/'));
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || relative.as_os_str().is_empty() {
            return Err(CoreError::InvalidDestination(destination.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Names and files of all per-module indexes, sorted by name.
    pub fn module_indexes(&self) -> CoreResult<Vec<(String, PathBuf)>> {
        let pattern = format!(
            "{}/*.idx",
            glob::Pattern::escape(&self.indexes.to_string_lossy())
        );
        let paths = glob::glob(&pattern).map_err(|source| CoreError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;

        let mut indexes = Vec::new();
        for path in paths {
            let path = path.map_err(|e| CoreError::Io {
                path: e.path().to_path_buf(),
                source: e.into_error(),
            })?;
            let is_all = path.file_name().is_some_and(|n| n == ALL_IDX);
            let name = path.file_stem().and_then(|s| s.to_str()).map(str::to_string);
            match name {
                Some(name) if !is_all && path.is_file() => indexes.push((name, path)),
                _ => {}
            }
        }
        indexes.sort();
        Ok(indexes)
    }

    /// Whether the index directory lies inside the published tree.
    pub(crate) fn indexes_inside_root(&self) -> bool {
        self.indexes.starts_with(&self.root)
    }
}

impl std::fmt::Display for Docroot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root.display())
    }
}
