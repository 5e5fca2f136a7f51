use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use lavender_index::Md5Cache;
use walkdir::WalkDir;

use crate::{
    error::{CoreError, CoreResult},
    module::{Module, ModuleConfig},
    resource::{Resource, ResourceData},
};

/// Snapshot of the files below a module root, built on first use.
#[derive(Debug, Default)]
enum FileMap {
    #[default]
    Unloaded,
    Loaded(BTreeMap<String, PathBuf>),
}

impl FileMap {
    fn invalidate(&mut self) {
        *self = FileMap::Unloaded;
    }
}

/// Resources from a directory tree. The content id is the modification time
/// in milliseconds.
#[derive(Debug)]
pub struct FileModule {
    config: ModuleConfig,
    root: PathBuf,
    files: FileMap,
    cache: Option<Md5Cache>,
}

impl FileModule {
    pub fn new(config: ModuleConfig, root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            root: root.into(),
            files: FileMap::Unloaded,
            cache: None,
        }
    }

    pub fn with_md5_cache(mut self, cache: Md5Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drops the file snapshot; the next access walks the tree again.
    pub fn invalidate(&mut self) {
        self.files.invalidate();
    }

    fn load(&mut self) -> CoreResult<()> {
        if let FileMap::Unloaded = self.files {
            self.files = FileMap::Loaded(self.scan()?);
        }
        Ok(())
    }

    fn loaded(&self) -> Option<&BTreeMap<String, PathBuf>> {
        match &self.files {
            FileMap::Loaded(files) => Some(files),
            FileMap::Unloaded => None,
        }
    }

    fn scan(&self) -> CoreResult<BTreeMap<String, PathBuf>> {
        let mut files = BTreeMap::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.map_err(|e| CoreError::Io {
                path: e.path().unwrap_or(&self.root).to_path_buf(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(path) = relative_path(&self.root, entry.path()) else {
                tracing::warn!("skipping non UTF-8 path {}", entry.path().display());
                continue;
            };
            if self.config.accepts(&path) {
                files.insert(path, entry.into_path());
            }
        }
        tracing::debug!(
            "module {}: found {} files below {}",
            self.config.name(),
            files.len(),
            self.root.display()
        );
        Ok(files)
    }

    fn resource(path: &str, file: &Path) -> CoreResult<Resource> {
        let metadata = std::fs::metadata(file).map_err(CoreError::io(file))?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Ok(Resource {
            path: path.to_string(),
            content_id: modified.to_string(),
            size: Some(metadata.len()),
            data: ResourceData::File(file.to_path_buf()),
        })
    }
}

/// `path` relative to `root` with `/` separators.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

impl Module for FileModule {
    fn config(&self) -> &ModuleConfig {
        &self.config
    }

    fn resources(&mut self) -> CoreResult<Vec<Resource>> {
        self.load()?;
        self.loaded()
            .into_iter()
            .flatten()
            .map(|(path, file)| Self::resource(path, file))
            .collect()
    }

    fn probe(&mut self, path: &str) -> CoreResult<Option<Resource>> {
        let path = path.trim_start_matches('/');
        self.load()?;
        let known = self.loaded().and_then(|files| files.get(path)).cloned();
        match known {
            Some(file) if file.is_file() => Self::resource(path, &file).map(Some),
            Some(_) => {
                tracing::debug!("{path} vanished, dropping file map");
                self.invalidate();
                Ok(None)
            }
            None => {
                let file = self.root.join(path);
                if file.is_file() && self.config.accepts(path) {
                    tracing::debug!("{path} appeared, dropping file map");
                    self.invalidate();
                    Self::resource(path, &file).map(Some)
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn md5_cache(&mut self) -> Option<&mut Md5Cache> {
        self.cache.as_mut()
    }
}
