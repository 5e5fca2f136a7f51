use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::PathBuf,
};

use lavender_common::Md5;
use lavender_index::{Index, IndexError, ALL_IDX};

use crate::{
    docroot::Docroot,
    error::{CoreError, CoreResult},
    resource::ResourceData,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Hash every referenced file and compare with its index entry.
    pub md5: bool,
    /// Rewrite a missing or broken all-index from the module indexes.
    pub fix: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    AllIndexMissing {
        docroot: PathBuf,
    },
    AllIndexMismatch {
        docroot: PathBuf,
        missing: Vec<String>,
        unexpected: Vec<String>,
        md5_differs: Vec<String>,
    },
    MissingFile {
        docroot: PathBuf,
        destination: String,
    },
    Md5Mismatch {
        docroot: PathBuf,
        destination: String,
        expected: Md5,
        actual: Md5,
    },
    DocrootsDiffer {
        file: String,
        first: PathBuf,
        other: PathBuf,
    },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::AllIndexMissing { docroot } => {
                write!(f, "{}: {ALL_IDX} is missing", docroot.display())
            }
            Problem::AllIndexMismatch {
                docroot,
                missing,
                unexpected,
                md5_differs,
            } => write!(
                f,
                "{}: {ALL_IDX} differs from the module indexes ({} missing, {} unexpected, {} with other md5)",
                docroot.display(),
                missing.len(),
                unexpected.len(),
                md5_differs.len()
            ),
            Problem::MissingFile {
                docroot,
                destination,
            } => write!(f, "{}: {destination} does not exist", docroot.display()),
            Problem::Md5Mismatch {
                docroot,
                destination,
                expected,
                actual,
            } => write!(
                f,
                "{}: {destination} has md5 {actual}, expected {expected}",
                docroot.display()
            ),
            Problem::DocrootsDiffer { file, first, other } => write!(
                f,
                "{file} differs between {} and {}",
                first.display(),
                other.display()
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub problems: Vec<Problem>,
    /// Index files rewritten by `fix`.
    pub fixed: Vec<PathBuf>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Checks one docroot: the all-index must equal the union of the module
/// indexes and every referenced file must exist (with matching md5 if
/// requested).
pub fn validate(docroot: &Docroot, options: ValidateOptions) -> CoreResult<ValidationReport> {
    let mut report = ValidationReport::default();
    let root = docroot.root().to_path_buf();

    let mut expected: BTreeMap<String, Md5> = BTreeMap::new();
    for (_, file) in docroot.module_indexes()? {
        let index = Index::load(&file)?;
        expected.extend(index.destinations().map(|(d, md5)| (d.to_string(), md5)));
    }

    let all_broken = match Index::load(&docroot.all_index()) {
        Ok(all) => {
            let actual: BTreeMap<String, Md5> = all
                .destinations()
                .map(|(d, md5)| (d.to_string(), md5))
                .collect();
            let missing: Vec<String> = expected
                .keys()
                .filter(|d| !actual.contains_key(*d))
                .cloned()
                .collect();
            let unexpected: Vec<String> = actual
                .keys()
                .filter(|d| !expected.contains_key(*d))
                .cloned()
                .collect();
            let md5_differs: Vec<String> = expected
                .iter()
                .filter(|(d, md5)| actual.get(*d).is_some_and(|a| a != *md5))
                .map(|(d, _)| d.clone())
                .collect();
            let broken = !(missing.is_empty() && unexpected.is_empty() && md5_differs.is_empty());
            if broken {
                report.problems.push(Problem::AllIndexMismatch {
                    docroot: root.clone(),
                    missing,
                    unexpected,
                    md5_differs,
                });
            }
            broken
        }
        Err(IndexError::NotFound(_)) => {
            report
                .problems
                .push(Problem::AllIndexMissing { docroot: root.clone() });
            true
        }
        Err(e) => return Err(e.into()),
    };

    if all_broken && options.fix {
        let mut all = Index::new();
        for (destination, md5) in &expected {
            all.add_reference(destination, *md5);
        }
        all.save(&docroot.all_index())?;
        tracing::warn!("rewrote {} with {} entries", docroot.all_index().display(), all.len());
        report.fixed.push(docroot.all_index());
    }

    for (destination, md5) in &expected {
        let file = docroot.destination(destination)?;
        if !file.is_file() {
            report.problems.push(Problem::MissingFile {
                docroot: root.clone(),
                destination: destination.clone(),
            });
        } else if options.md5 {
            let actual = ResourceData::File(file).md5()?;
            if actual != *md5 {
                report.problems.push(Problem::Md5Mismatch {
                    docroot: root.clone(),
                    destination: destination.clone(),
                    expected: *md5,
                    actual,
                });
            }
        }
    }

    tracing::info!(
        "validated {docroot}: {} destinations, {} problems",
        expected.len(),
        report.problems.len()
    );
    Ok(report)
}

/// Validates every docroot, then checks that all of them carry the same
/// index files. Indexes are compared by content, not by line order.
pub fn validate_cluster(docroots: &[Docroot], options: ValidateOptions) -> CoreResult<ValidationReport> {
    let Some(first) = docroots.first() else {
        return Err(CoreError::NoTargets);
    };
    let mut report = ValidationReport::default();
    for docroot in docroots {
        let single = validate(docroot, options)?;
        report.problems.extend(single.problems);
        report.fixed.extend(single.fixed);
    }

    let reference = index_files(first)?;
    for other in &docroots[1..] {
        let files = index_files(other)?;
        let names: BTreeSet<&String> = reference.keys().chain(files.keys()).collect();
        for name in names {
            if reference.get(name) != files.get(name) {
                report.problems.push(Problem::DocrootsDiffer {
                    file: name.clone(),
                    first: first.root().to_path_buf(),
                    other: other.root().to_path_buf(),
                });
            }
        }
    }
    Ok(report)
}

/// All index files of `docroot` by file name.
fn index_files(docroot: &Docroot) -> CoreResult<BTreeMap<String, Index>> {
    let mut files = BTreeMap::new();
    let mut paths: Vec<PathBuf> = docroot
        .module_indexes()?
        .into_iter()
        .map(|(_, path)| path)
        .collect();
    paths.push(docroot.all_index());
    for path in paths {
        match Index::load(&path) {
            Ok(index) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                files.insert(name, index);
            }
            Err(IndexError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(files)
}
