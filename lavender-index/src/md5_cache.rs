use std::{
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use lavender_common::{codec, fs::write_atomic, Md5};

use crate::error::{IndexError, IndexResult};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    content_id: String,
    md5: Md5,
}

/// Remembers the md5 of a resource per source content id, so resources whose
/// content id did not change are neither read nor hashed again.
///
/// The cache is saved on [`Md5Cache::close`], or on drop if it was modified
/// and not closed explicitly.
#[derive(Debug)]
pub struct Md5Cache {
    file: PathBuf,
    entries: IndexMap<String, Entry>,
    dirty: bool,
}

impl Md5Cache {
    /// Loads `file`; a missing file yields an empty cache.
    pub fn load_or_create(file: impl Into<PathBuf>) -> IndexResult<Self> {
        let file = file.into();
        let mut entries = IndexMap::new();

        match std::fs::File::open(&file) {
            Ok(f) => {
                for (number, line) in BufReader::new(f).lines().enumerate() {
                    let line = line.map_err(|source| IndexError::Io {
                        path: file.clone(),
                        source,
                    })?;
                    if line.is_empty() {
                        continue;
                    }
                    let malformed = |source| IndexError::Malformed {
                        path: file.clone(),
                        line: number + 1,
                        source,
                    };
                    let mut fields = codec::decode_line(&line, 3).map_err(malformed)?.into_iter();
                    if let (Some(path), Some(content_id), Some(md5)) =
                        (fields.next(), fields.next(), fields.next())
                    {
                        let md5 = Md5::from_hex(&md5).map_err(malformed)?;
                        entries.insert(path, Entry { content_id, md5 });
                    }
                }
                tracing::debug!("loaded {} md5 cache entries from {}", entries.len(), file.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no md5 cache at {}, starting empty", file.display());
            }
            Err(source) => return Err(IndexError::Io { path: file, source }),
        }

        Ok(Self {
            file,
            entries,
            dirty: false,
        })
    }

    /// The cached md5 of `path`, but only if it was computed for exactly
    /// `content_id`.
    pub fn lookup(&self, path: &str, content_id: &str) -> Option<Md5> {
        self.entries
            .get(path)
            .filter(|entry| entry.content_id == content_id)
            .map(|entry| entry.md5)
    }

    pub fn add(&mut self, path: &str, content_id: &str, md5: Md5) {
        let entry = Entry {
            content_id: content_id.to_string(),
            md5,
        };
        if self.entries.get(path) != Some(&entry) {
            self.entries.insert(path.to_string(), entry);
            self.dirty = true;
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the cache via temp file and rename. A clean cache is left
    /// alone.
    pub fn save(&mut self) -> IndexResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let mut out = String::new();
        for (path, entry) in &self.entries {
            let md5 = entry.md5.to_hex();
            out.push_str(&codec::encode_line(&[
                path.as_str(),
                entry.content_id.as_str(),
                md5.as_str(),
            ]));
            out.push('\n');
        }
        write_atomic(&self.file, out.as_bytes())?;
        self.dirty = false;
        tracing::debug!("saved {} md5 cache entries to {}", self.entries.len(), self.file.display());
        Ok(())
    }

    /// Saves if modified, propagating failures.
    pub fn close(mut self) -> IndexResult<()> {
        self.save()
    }
}

impl Drop for Md5Cache {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.save() {
                tracing::error!("Failed to save md5 cache {}: {}", self.file.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_requires_matching_content_id() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut cache = Md5Cache::load_or_create(dir.path().join("m.cache")).unwrap();
        let md5 = Md5::digest(b"body");
        cache.add("a.css", "1000", md5);

        assert_eq!(cache.lookup("a.css", "1000"), Some(md5));
        assert_eq!(cache.lookup("a.css", "1001"), None);
        assert_eq!(cache.lookup("b.css", "1000"), None);
    }

    #[test]
    fn last_write_wins() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut cache = Md5Cache::load_or_create(dir.path().join("m.cache")).unwrap();
        cache.add("a.css", "1", Md5::digest(b"1"));
        cache.add("a.css", "2", Md5::digest(b"2"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("a.css", "2"), Some(Md5::digest(b"2")));
    }

    #[test]
    fn close_persists_only_when_dirty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let file = dir.path().join("m.cache");

        let cache = Md5Cache::load_or_create(&file).unwrap();
        cache.close().unwrap();
        assert!(!file.exists());

        let mut cache = Md5Cache::load_or_create(&file).unwrap();
        cache.add("x:y\nz", "42", Md5::digest(b"x"));
        cache.close().unwrap();

        let cache = Md5Cache::load_or_create(&file).unwrap();
        assert_eq!(cache.lookup("x:y\nz", "42"), Some(Md5::digest(b"x")));
        assert!(!cache.is_dirty());
    }

    #[test]
    fn drop_saves_dirty_cache() {
        let dir = tempfile::tempdir().expect("temp dir");
        let file = dir.path().join("m.cache");
        {
            let mut cache = Md5Cache::load_or_create(&file).unwrap();
            cache.add("a", "1", Md5::digest(b"a"));
        }
        let cache = Md5Cache::load_or_create(&file).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn re_adding_identical_entry_keeps_cache_clean() {
        let dir = tempfile::tempdir().expect("temp dir");
        let file = dir.path().join("m.cache");
        let mut cache = Md5Cache::load_or_create(&file).unwrap();
        cache.add("a", "1", Md5::digest(b"a"));
        cache.save().unwrap();

        cache.add("a", "1", Md5::digest(b"a"));
        assert!(!cache.is_dirty());
    }

    #[test]
    fn saving_a_clean_cache_does_not_touch_the_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let file = dir.path().join("m.cache");
        let mut cache = Md5Cache::load_or_create(&file).unwrap();
        cache.add("a", "1", Md5::digest(b"a"));
        cache.save().unwrap();
        std::fs::remove_file(&file).unwrap();

        cache.save().unwrap();
        assert!(!file.exists());
    }
}
