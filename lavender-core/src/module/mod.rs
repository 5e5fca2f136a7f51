//! Sources of publishable resources.

use glob::Pattern;
use lavender_common::Md5;
use lavender_index::{Label, Md5Cache, ALL_IDX};

use crate::{
    error::{CoreError, CoreResult},
    resource::Resource,
};

pub mod file;
pub mod jar;

/// Static settings of one module, resolved once before the module is built.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    name: String,
    /// Content-addressed destinations when set, the resource path otherwise.
    lavendelize: bool,
    /// Prepended to resource paths to form the original path served to
    /// browsers. Always ends with `/`.
    resource_path_prefix: String,
    /// Prepended to every destination.
    target_path_prefix: String,
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl ModuleConfig {
    /// A lavendelizing module serving its resources from `/`.
    ///
    /// The name ends up as the index file name, so it must be a plain file
    /// name and must not collide with the all-index.
    pub fn new(name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        let reserved = format!("{name}.idx") == ALL_IDX;
        if name.is_empty()
            || reserved
            || name.starts_with('.')
            || name.contains(['/', '\\', ':'])
        {
            return Err(CoreError::InvalidModuleName(name));
        }
        Ok(Self {
            name,
            lavendelize: true,
            resource_path_prefix: "/".to_string(),
            target_path_prefix: String::new(),
            includes: Vec::new(),
            excludes: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lavendelize(&self) -> bool {
        self.lavendelize
    }

    pub fn with_lavendelize(mut self, lavendelize: bool) -> Self {
        self.lavendelize = lavendelize;
        self
    }

    pub fn with_resource_path_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        self.resource_path_prefix = if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{trimmed}/")
        };
        self
    }

    pub fn with_target_path_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        self.target_path_prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}/")
        };
        self
    }

    pub fn with_includes<S: AsRef<str>>(mut self, patterns: &[S]) -> CoreResult<Self> {
        self.includes = compile(patterns)?;
        Ok(self)
    }

    pub fn with_excludes<S: AsRef<str>>(mut self, patterns: &[S]) -> CoreResult<Self> {
        self.excludes = compile(patterns)?;
        Ok(self)
    }

    /// Whether `path` passes the include and exclude patterns. Without
    /// include patterns everything is included.
    pub fn accepts(&self, path: &str) -> bool {
        (self.includes.is_empty() || self.includes.iter().any(|p| p.matches(path)))
            && !self.excludes.iter().any(|p| p.matches(path))
    }

    pub fn original_path(&self, path: &str) -> String {
        format!("{}{}", self.resource_path_prefix, path.trim_start_matches('/'))
    }

    /// The destination of `path` with content `md5`:
    /// `{target}{hex[..3]}/{hex[3..]}/{file name}` when lavendelizing.
    pub fn destination(&self, path: &str, md5: &Md5) -> String {
        let path = path.trim_start_matches('/');
        if !self.lavendelize {
            return format!("{}{}", self.target_path_prefix, path);
        }
        let hex = md5.to_hex();
        let file_name = path.rsplit('/').next().unwrap_or(path);
        format!(
            "{}{}/{}/{}",
            self.target_path_prefix,
            &hex[..3],
            &hex[3..],
            file_name
        )
    }

    pub fn label(&self, path: &str, md5: Md5) -> Label {
        Label::new(self.original_path(path), self.destination(path, &md5), md5)
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> CoreResult<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p.as_ref()).map_err(|source| CoreError::Pattern {
                pattern: p.as_ref().to_string(),
                source,
            })
        })
        .collect()
}

/// A source tree of resources, such as a directory or an archive.
pub trait Module {
    fn config(&self) -> &ModuleConfig;

    fn name(&self) -> &str {
        self.config().name()
    }

    /// Every resource accepted by the module's filters.
    fn resources(&mut self) -> CoreResult<Vec<Resource>>;

    /// The resource at `path`, if the module has it.
    fn probe(&mut self, path: &str) -> CoreResult<Option<Resource>>;

    /// The cache used to skip hashing unchanged resources.
    fn md5_cache(&mut self) -> Option<&mut Md5Cache>;

    fn save_caches(&mut self) -> CoreResult<()> {
        if let Some(cache) = self.md5_cache() {
            cache.save()?;
        }
        Ok(())
    }
}
