use std::{collections::BTreeMap, fs::File, io::Read, path::Path};

use bytes::Bytes;
use lavender_index::Md5Cache;

use crate::{
    error::{CoreError, CoreResult},
    module::{Module, ModuleConfig},
    resource::{Resource, ResourceData},
};

/// One archive member, held in memory.
#[derive(Debug, Clone)]
pub struct JarEntry {
    pub path: String,
    pub content_id: String,
    pub data: Bytes,
}

impl JarEntry {
    pub fn new(path: impl Into<String>, content_id: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            content_id: content_id.into(),
            data: data.into(),
        }
    }
}

/// Resources from a zip or jar archive, optionally only those below a prefix
/// such as `META-INF/resources/`. The content id is `{crc32}-{dos mtime}`.
#[derive(Debug)]
pub struct JarModule {
    config: ModuleConfig,
    entries: BTreeMap<String, JarEntry>,
    cache: Option<Md5Cache>,
}

impl JarModule {
    pub fn open(config: ModuleConfig, archive: &Path, prefix: &str) -> CoreResult<Self> {
        let zip_error = |source| CoreError::Archive {
            path: archive.to_path_buf(),
            source,
        };
        let file = File::open(archive).map_err(CoreError::io(archive))?;
        let mut zip = zip::ZipArchive::new(file).map_err(zip_error)?;
        let prefix = prefix.trim_start_matches('/');

        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut member = zip.by_index(i).map_err(zip_error)?;
            if member.is_dir() {
                continue;
            }
            let Some(path) = member.name().strip_prefix(prefix).map(str::to_string) else {
                continue;
            };
            if path.is_empty() || !config.accepts(&path) {
                continue;
            }
            let modified = member
                .last_modified()
                .map(|t| format!("{:04x}{:04x}", t.datepart(), t.timepart()))
                .unwrap_or_default();
            let content_id = format!("{:08x}-{}", member.crc32(), modified);

            let mut data = Vec::with_capacity(member.size() as usize);
            member
                .read_to_end(&mut data)
                .map_err(CoreError::io(archive))?;
            entries.push(JarEntry::new(path, content_id, data));
        }

        tracing::debug!(
            "module {}: {} entries from {}",
            config.name(),
            entries.len(),
            archive.display()
        );
        Ok(Self::from_entries(config, entries))
    }

    /// Entries rejected by the module filters are dropped.
    pub fn from_entries(config: ModuleConfig, entries: impl IntoIterator<Item = JarEntry>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|e| config.accepts(&e.path))
            .map(|e| (e.path.clone(), e))
            .collect();
        Self {
            config,
            entries,
            cache: None,
        }
    }

    pub fn with_md5_cache(mut self, cache: Md5Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn resource(entry: &JarEntry) -> Resource {
        Resource {
            path: entry.path.clone(),
            content_id: entry.content_id.clone(),
            size: Some(entry.data.len() as u64),
            data: ResourceData::Bytes(entry.data.clone()),
        }
    }
}

impl Module for JarModule {
    fn config(&self) -> &ModuleConfig {
        &self.config
    }

    fn resources(&mut self) -> CoreResult<Vec<Resource>> {
        Ok(self.entries.values().map(Self::resource).collect())
    }

    fn probe(&mut self, path: &str) -> CoreResult<Option<Resource>> {
        Ok(self
            .entries
            .get(path.trim_start_matches('/'))
            .map(Self::resource))
    }

    fn md5_cache(&mut self) -> Option<&mut Md5Cache> {
        self.cache.as_mut()
    }
}
