use std::collections::HashSet;

use lavender_common::fs::{write_atomic_from, write_new_from};
use lavender_index::{Index, Label};

use crate::{
    docroot::Docroot,
    error::{CoreError, CoreResult},
    resource::ResourceData,
};

/// One publish run of a module to a set of docroots.
///
/// [`Distributor::open`] checks that all targets agree on the module index
/// and the all-index, [`Distributor::write`] stores changed content on every
/// target and [`Distributor::close`] commits the new indexes. Callers hold
/// the publish [`crate::Lock`] for the whole session.
#[derive(Debug)]
pub struct Distributor {
    targets: Vec<Docroot>,
    module: String,
    all: Index,
    prev: Index,
    next: Index,
    written: HashSet<String>,
}

impl Distributor {
    pub fn open(targets: Vec<Docroot>, module: &str) -> CoreResult<Self> {
        let Some(first) = targets.first() else {
            return Err(CoreError::NoTargets);
        };
        let prev = Index::load_or_empty(&first.module_index(module))?;
        let mut all = Index::load_or_empty(&first.all_index())?;

        for other in &targets[1..] {
            let inconsistent = |path: std::path::PathBuf| CoreError::Inconsistent {
                file: path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                first: first.root().to_path_buf(),
                other: other.root().to_path_buf(),
            };
            if Index::load_or_empty(&other.module_index(module))? != prev {
                return Err(inconsistent(other.module_index(module)));
            }
            if Index::load_or_empty(&other.all_index())? != all {
                return Err(inconsistent(other.all_index()));
            }
        }

        // all.idx stores every destination once; the other modules' indexes
        // say who else still uses it
        for (name, path) in first.module_indexes()? {
            if name == module {
                continue;
            }
            for (destination, md5) in Index::load(&path)?.destinations() {
                if all.destination_md5(destination) == Some(md5) {
                    all.add_reference(destination, md5);
                }
            }
        }

        tracing::info!(
            "publishing module {module} to {} target(s), {} labels currently published",
            targets.len(),
            prev.len()
        );
        Ok(Self {
            targets,
            module: module.to_string(),
            all,
            prev,
            next: Index::new(),
            written: HashSet::new(),
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// The module index as published before this run.
    pub fn previous(&self) -> &Index {
        &self.prev
    }

    /// Records `label` and stores `data` at its destination on every target
    /// unless that content is already there. Returns whether anything was
    /// written.
    pub fn write(&mut self, label: &Label, data: &ResourceData) -> CoreResult<bool> {
        let destination = label.lavendelized_path();
        let unchanged = self.all.destination_md5(destination) == Some(label.md5())
            || self.written.contains(destination);

        if !unchanged {
            for target in &self.targets {
                let path = target.destination(destination)?;
                if path.exists() {
                    write_atomic_from(&path, data.open()?)?;
                } else {
                    write_new_from(&path, data.open()?)?;
                }
            }
            tracing::debug!("wrote {label}");
            self.written.insert(destination.to_string());
        }

        self.next.add(label.clone())?;
        Ok(!unchanged)
    }

    /// Commits the run: the all-index drops this module's reference to each
    /// previous destination and gains the new ones, then both indexes are
    /// saved on every target. A destination other modules still use stays in
    /// the all-index. Returns the new module index.
    pub fn close(mut self) -> CoreResult<Index> {
        let previous: Vec<String> = self.prev.destinations().map(|(d, _)| d.to_string()).collect();
        for destination in previous {
            if !self.all.remove_reference_opt(&destination) {
                return Err(CoreError::MissingReference {
                    docroot: self.targets[0].root().to_path_buf(),
                    destination,
                });
            }
        }
        for (destination, md5) in self.next.destinations() {
            self.all.add_reference(destination, md5);
        }

        for target in &self.targets {
            self.next.save(&target.module_index(&self.module))?;
            self.all.save(&target.all_index())?;
        }
        tracing::info!(
            "module {}: {} labels published, {} destinations in all-index",
            self.module,
            self.next.len(),
            self.all.len()
        );
        Ok(self.next)
    }
}
