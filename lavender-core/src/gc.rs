use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use lavender_index::Index;
use walkdir::WalkDir;

use crate::{
    docroot::Docroot,
    error::{CoreError, CoreResult},
};

/// What a garbage collection removed, or would remove in a dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    pub dry_run: bool,
    pub kept: usize,
    pub files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
}

/// Every destination referenced by a per-module index of `docroot`.
pub fn referenced_destinations(docroot: &Docroot) -> CoreResult<HashSet<String>> {
    let mut referenced = HashSet::new();
    for (_, file) in docroot.module_indexes()? {
        let index = Index::load(&file)?;
        referenced.extend(index.destinations().map(|(d, _)| d.to_string()));
    }
    Ok(referenced)
}

/// Deletes every file below the docroot that no module index references, then
/// every directory left empty. The docroot itself and its index directory are
/// kept.
pub fn collect_garbage(docroot: &Docroot, dry_run: bool) -> CoreResult<GcReport> {
    let referenced = referenced_destinations(docroot)?;
    let mut report = GcReport {
        dry_run,
        ..GcReport::default()
    };
    let mut removed: HashSet<PathBuf> = HashSet::new();

    let walker = WalkDir::new(docroot.root())
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_entry(|e| !(docroot.indexes_inside_root() && e.path() == docroot.indexes()));

    for entry in walker {
        let entry = entry.map_err(|e| CoreError::Io {
            path: e.path().unwrap_or(docroot.root()).to_path_buf(),
            source: e.into(),
        })?;
        let path = entry.path();

        if entry.file_type().is_dir() {
            if is_empty_after(path, &removed)? {
                if !dry_run {
                    std::fs::remove_dir(path).map_err(CoreError::io(path))?;
                }
                tracing::debug!("removing empty directory {}", path.display());
                removed.insert(path.to_path_buf());
                report.directories.push(path.to_path_buf());
            }
            continue;
        }

        let destination = destination_of(docroot.root(), path);
        if destination.is_some_and(|d| referenced.contains(&d)) {
            report.kept += 1;
            continue;
        }
        if !dry_run {
            std::fs::remove_file(path).map_err(CoreError::io(path))?;
        }
        tracing::debug!("removing unreferenced {}", path.display());
        removed.insert(path.to_path_buf());
        report.files.push(path.to_path_buf());
    }

    tracing::info!(
        "gc of {docroot}: {} files and {} directories {}, {} files kept",
        report.files.len(),
        report.directories.len(),
        if dry_run { "deletable" } else { "deleted" },
        report.kept
    );
    Ok(report)
}

fn destination_of(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

/// Whether `dir` has nothing left once `removed` is gone.
fn is_empty_after(dir: &Path, removed: &HashSet<PathBuf>) -> CoreResult<bool> {
    for child in std::fs::read_dir(dir).map_err(CoreError::io(dir))? {
        let child = child.map_err(CoreError::io(dir))?;
        if !removed.contains(&child.path()) {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use lavender_common::Md5;
    use lavender_index::Label;

    use super::*;

    fn docroot_with_garbage() -> (tempfile::TempDir, Docroot) {
        let dir = tempfile::tempdir().expect("temp dir");
        let docroot = Docroot::new(dir.path());
        let root = dir.path();
        for file in ["web/a/logo.png", "web/b/old.png", "stale/deep/x.css", "top.txt"] {
            let path = root.join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, file).unwrap();
        }
        std::fs::create_dir_all(root.join("empty")).unwrap();

        let mut index = Index::new();
        index
            .add(Label::new("/img/logo.png", "web/a/logo.png", Md5::digest(b"logo")))
            .unwrap();
        index.save(&docroot.module_index("web")).unwrap();
        (dir, docroot)
    }

    #[test]
    fn dry_run_reports_without_deleting() {
        let (dir, docroot) = docroot_with_garbage();
        let report = collect_garbage(&docroot, true).unwrap();

        assert!(report.dry_run);
        assert_eq!(report.kept, 1);
        assert_eq!(report.files.len(), 3);
        let mut directories: Vec<_> = report
            .directories
            .iter()
            .map(|d| d.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        directories.sort();
        assert_eq!(
            directories,
            ["empty", "stale", "stale/deep", "web/b"].map(PathBuf::from)
        );
        assert!(dir.path().join("web/b/old.png").exists());
    }

    #[test]
    fn deletes_unreferenced_files_and_empty_directories() {
        let (dir, docroot) = docroot_with_garbage();
        let report = collect_garbage(&docroot, false).unwrap();
        assert_eq!(report.files.len(), 3);

        let root = dir.path();
        assert!(root.join("web/a/logo.png").exists());
        assert!(!root.join("web/b").exists());
        assert!(!root.join("stale").exists());
        assert!(!root.join("top.txt").exists());
        assert!(docroot.module_index("web").exists());
        assert!(root.exists());

        let again = collect_garbage(&docroot, false).unwrap();
        assert!(again.files.is_empty() && again.directories.is_empty());
    }
}
