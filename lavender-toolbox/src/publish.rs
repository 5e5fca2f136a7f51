use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use lavender_config::{CONFIG, LOCK_FILE_PATH};
use lavender_core::{publish_to, Docroot, FileModule, JarModule, Lock, Module, ModuleConfig};
use lavender_index::Md5Cache;

use crate::ModuleArgs;

impl ModuleArgs {
    fn config(&self) -> anyhow::Result<ModuleConfig> {
        Ok(ModuleConfig::new(&self.module)?
            .with_lavendelize(!self.literal)
            .with_resource_path_prefix(&self.resource_prefix)
            .with_target_path_prefix(&self.target_prefix)
            .with_includes(&self.includes)?
            .with_excludes(&self.excludes)?)
    }

    fn md5_cache(&self) -> anyhow::Result<Option<Md5Cache>> {
        if self.no_cache {
            return Ok(None);
        }
        let file = CONFIG.cache_dir.join(format!("{}.md5", self.module));
        tracing::debug!("using md5 cache {}", file.display());
        let cache = Md5Cache::load_or_create(&file)
            .with_context(|| format!("Failed to load md5 cache {}", file.display()))?;
        Ok(Some(cache))
    }

    pub(crate) fn docroots(&self) -> Vec<Docroot> {
        docroots(&self.targets, self.index_dir.as_ref())
    }
}

pub(crate) fn docroots(roots: &[PathBuf], index_dir: Option<&PathBuf>) -> Vec<Docroot> {
    roots
        .iter()
        .map(|root| match index_dir {
            Some(dir) => Docroot::with_indexes(root, root.join(dir)),
            None => Docroot::new(root),
        })
        .collect()
}

pub(crate) fn lock() -> anyhow::Result<Lock> {
    Lock::acquire(&*LOCK_FILE_PATH, Duration::from_secs(CONFIG.lock_wait_secs))
        .context("Another lavender process is running")
}

fn run(module: &mut dyn Module, targets: Vec<Docroot>) -> anyhow::Result<()> {
    let _lock = lock()?;
    tracing::info!("publishing module {} to {} docroot(s)", module.name(), targets.len());
    let (report, _) = publish_to(module, targets)
        .with_context(|| format!("Failed to publish module {}", module.name()))?;
    println!("{report}");
    Ok(())
}

pub fn publish_files(source: PathBuf, args: ModuleArgs) -> anyhow::Result<()> {
    let mut module = FileModule::new(args.config()?, source);
    if let Some(cache) = args.md5_cache()? {
        module = module.with_md5_cache(cache);
    }
    run(&mut module, args.docroots())
}

pub fn publish_jar(archive: PathBuf, prefix: String, args: ModuleArgs) -> anyhow::Result<()> {
    let mut module = JarModule::open(args.config()?, &archive, &prefix)
        .with_context(|| format!("Failed to read {}", archive.display()))?;
    if let Some(cache) = args.md5_cache()? {
        module = module.with_md5_cache(cache);
    }
    run(&mut module, args.docroots())
}

/// Prints the label `path` would be published under and whether the targets
/// already have it.
pub fn probe(source: PathBuf, path: String, args: ModuleArgs) -> anyhow::Result<()> {
    let config = args.config()?;
    let mut module = FileModule::new(config.clone(), &source);
    let resource = module
        .probe(&path)?
        .with_context(|| format!("{path} is not a resource of {}", source.display()))?;
    let label = config.label(&resource.path, resource.data.md5()?);

    println!("{label}");
    println!("content id: {}", resource.content_id);
    for docroot in args.docroots() {
        let published = lavender_index::Index::load_or_empty(&docroot.module_index(config.name()))?
            .lookup(label.original_path())
            .is_some_and(|l| l == &label);
        println!(
            "{docroot}: {}",
            if published { "published" } else { "not published" }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_dir_is_relative_to_each_docroot() {
        let roots = [PathBuf::from("/srv/a"), PathBuf::from("/srv/b")];
        let plain = docroots(&roots, None);
        assert_eq!(plain[1].indexes(), PathBuf::from("/srv/b/.lavender"));

        let custom = docroots(&roots, Some(&PathBuf::from("idx")));
        assert_eq!(custom[0].indexes(), PathBuf::from("/srv/a/idx"));
        assert_eq!(custom[0].root(), PathBuf::from("/srv/a"));
    }
}
