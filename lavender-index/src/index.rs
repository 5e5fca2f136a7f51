use std::{
    collections::BTreeMap,
    io::{BufRead, BufReader},
    path::Path,
};

use indexmap::IndexMap;
use lavender_common::{codec, fs::write_atomic, CommonError, Md5};

use crate::{
    error::{IndexError, IndexResult},
    label::Label,
};

/// File name of the all-index inside an index directory.
pub const ALL_IDX: &str = "all.idx";

#[derive(Debug, Clone, Copy)]
struct Destination {
    md5: Md5,
    references: usize,
}

/// Labels keyed by original path, with a reference count per destination.
///
/// Two labels may share a destination only if they carry the same md5, so a
/// destination always identifies exactly one content.
///
/// In the all-index every destination is a single reference label; its count
/// is the number of modules using it and only lives in memory.
#[derive(Debug, Clone, Default)]
pub struct Index {
    labels: IndexMap<String, Label>,
    destinations: BTreeMap<String, Destination>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads an index file. A missing file is [`IndexError::NotFound`].
    pub fn load(path: &Path) -> IndexResult<Self> {
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexError::NotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(IndexError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let mut index = Index::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| IndexError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if line.is_empty() {
                continue;
            }
            let label = Self::parse_line(&line).map_err(|source| IndexError::Malformed {
                path: path.to_path_buf(),
                line: number + 1,
                source,
            })?;
            index.add(label)?;
        }

        tracing::debug!("loaded {} labels from {}", index.len(), path.display());
        Ok(index)
    }

    /// Like [`Index::load`], but a missing file yields an empty index.
    pub fn load_or_empty(path: &Path) -> IndexResult<Self> {
        match Self::load(path) {
            Err(IndexError::NotFound(_)) => Ok(Index::new()),
            other => other,
        }
    }

    fn parse_line(line: &str) -> lavender_common::CommonResult<Label> {
        let [original, lavendelized, md5]: [String; 3] = codec::decode_line(line, 3)?
            .try_into()
            .map_err(|fields: Vec<String>| CommonError::FieldCount {
                expected: 3,
                found: fields.len(),
            })?;
        Ok(Label::new(original, lavendelized, Md5::from_hex(&md5)?))
    }

    /// Writes the index to `path` via temp file and rename.
    pub fn save(&self, path: &Path) -> IndexResult<()> {
        write_atomic(path, self.serialize().as_bytes())?;
        tracing::debug!("saved {} labels to {}", self.len(), path.display());
        Ok(())
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for label in self.labels.values() {
            let md5 = label.md5().to_hex();
            out.push_str(&codec::encode_line(&[
                label.original_path(),
                label.lavendelized_path(),
                md5.as_str(),
            ]));
            out.push('\n');
        }
        out
    }

    pub fn lookup(&self, original_path: &str) -> Option<&Label> {
        self.labels.get(original_path)
    }

    /// Adds `label`, replacing a label with the same original path. Returns
    /// the replaced label.
    pub fn add(&mut self, label: Label) -> IndexResult<Option<Label>> {
        if let Some(existing) = self.destinations.get(label.lavendelized_path()) {
            let replaces_sole_reference = existing.references == 1
                && self
                    .labels
                    .get(label.original_path())
                    .is_some_and(|prev| prev.lavendelized_path() == label.lavendelized_path());
            if existing.md5 != label.md5() && !replaces_sole_reference {
                return Err(IndexError::DestinationConflict {
                    destination: label.lavendelized_path().to_string(),
                    existing: existing.md5,
                    new: label.md5(),
                });
            }
        }

        let previous = self.remove(label.original_path());
        self.destinations
            .entry(label.lavendelized_path().to_string())
            .and_modify(|d| {
                d.md5 = label.md5();
                d.references += 1;
            })
            .or_insert(Destination {
                md5: label.md5(),
                references: 1,
            });
        self.labels.insert(label.original_path().to_string(), label);
        Ok(previous)
    }

    /// Removes the label for `original_path`.
    pub fn remove(&mut self, original_path: &str) -> Option<Label> {
        let label = self.labels.shift_remove(original_path)?;
        if let Some(destination) = self.destinations.get_mut(label.lavendelized_path()) {
            destination.references -= 1;
            if destination.references == 0 {
                self.destinations.remove(label.lavendelized_path());
            }
        }
        Some(label)
    }

    /// Inserts or overwrites the all-index entry for `destination`. An
    /// existing entry gains one more reference.
    pub fn add_reference(&mut self, destination: &str, md5: Md5) {
        let references = match self.labels.get(destination) {
            Some(label) if label.lavendelized_path() == destination => self
                .destinations
                .get(destination)
                .map_or(1, |d| d.references + 1),
            _ => 1,
        };
        self.remove(destination);
        // the only label left that could share the destination is gone now
        self.destinations.remove(destination);
        self.destinations
            .insert(destination.to_string(), Destination { md5, references });
        self.labels
            .insert(destination.to_string(), Label::reference(destination, md5));
    }

    /// Drops one reference to `destination`, removing the entry with the
    /// last one. Returns whether the entry existed.
    pub fn remove_reference_opt(&mut self, destination: &str) -> bool {
        let is_reference = self
            .labels
            .get(destination)
            .is_some_and(|label| label.lavendelized_path() == destination);
        match self.destinations.get_mut(destination) {
            Some(d) if is_reference && d.references > 1 => {
                d.references -= 1;
                true
            }
            _ => self.remove(destination).is_some(),
        }
    }

    /// How many references the all-index entry for `destination` holds.
    pub fn references(&self, destination: &str) -> usize {
        self.destinations.get(destination).map_or(0, |d| d.references)
    }

    /// The md5 stored for `destination`, if any label points there.
    pub fn destination_md5(&self, destination: &str) -> Option<Md5> {
        self.destinations.get(destination).map(|d| d.md5)
    }

    /// Distinct destinations with their md5, sorted by destination.
    pub fn destinations(&self) -> impl Iterator<Item = (&str, Md5)> {
        self.destinations.iter().map(|(k, d)| (k.as_str(), d.md5))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.values()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .all(|(original, label)| other.labels.get(original) == Some(label))
    }
}

impl Eq for Index {}

impl<'a> IntoIterator for &'a Index {
    type Item = &'a Label;
    type IntoIter = indexmap::map::Values<'a, String, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.labels.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md5(s: &str) -> Md5 {
        Md5::digest(s.as_bytes())
    }

    #[test]
    fn serialize_writes_one_line_per_label() {
        let mut index = Index::new();
        index
            .add(Label::new("img/a.gif", "abc/def/a.gif", md5("a")))
            .unwrap();
        index
            .add(Label::new("img/b.gif", "123/456/b.gif", md5("b")))
            .unwrap();

        let expected = format!(
            "{}\n{}\n",
            codec::encode_line(&["img/a.gif", "abc/def/a.gif", &md5("a").to_hex()]),
            codec::encode_line(&["img/b.gif", "123/456/b.gif", &md5("b").to_hex()]),
        );
        assert_eq!(index.serialize(), expected);
        assert_eq!(Index::new().serialize(), "");
    }

    #[test]
    fn lookup_by_original_path() {
        let mut index = Index::new();
        index
            .add(Label::new("img/a.gif", "abc/def/a.gif", md5("a")))
            .unwrap();

        let label = index.lookup("img/a.gif").unwrap();
        assert_eq!(label.lavendelized_path(), "abc/def/a.gif");
        assert!(index.lookup("img/b.gif").is_none());
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let a = Label::new("a", "x/a", md5("a"));
        let b = Label::new("b", "x/b", md5("b"));

        let mut left = Index::new();
        left.add(a.clone()).unwrap();
        left.add(b.clone()).unwrap();
        let mut right = Index::new();
        right.add(b).unwrap();
        right.add(a).unwrap();

        assert_eq!(left, right);
        right.remove("a");
        assert_ne!(left, right);
    }

    #[test]
    fn identical_content_may_share_a_destination() {
        let mut index = Index::new();
        index.add(Label::new("a/logo.png", "123/logo.png", md5("logo"))).unwrap();
        index.add(Label::new("b/logo.png", "123/logo.png", md5("logo"))).unwrap();
        assert_eq!(index.destinations().count(), 1);

        index.remove("a/logo.png");
        assert_eq!(index.destination_md5("123/logo.png"), Some(md5("logo")));
        index.remove("b/logo.png");
        assert_eq!(index.destination_md5("123/logo.png"), None);
    }

    #[test]
    fn conflicting_content_for_one_destination_is_rejected() {
        let mut index = Index::new();
        index.add(Label::new("a.css", "a.css", md5("one"))).unwrap();
        index.add(Label::new("b.css", "a.css", md5("one"))).unwrap();

        let err = index.add(Label::new("c.css", "a.css", md5("two"))).unwrap_err();
        assert!(matches!(err, IndexError::DestinationConflict { .. }));
    }

    #[test]
    fn relabeling_the_sole_reference_is_allowed() {
        let mut index = Index::new();
        index.add(Label::new("a.css", "a.css", md5("one"))).unwrap();
        let previous = index.add(Label::new("a.css", "a.css", md5("two"))).unwrap();

        assert_eq!(previous.unwrap().md5(), md5("one"));
        assert_eq!(index.destination_md5("a.css"), Some(md5("two")));
    }

    #[test]
    fn references_insert_overwrite_and_remove() {
        let mut all = Index::new();
        all.add_reference("x/y.gif", md5("1"));
        all.add_reference("x/y.gif", md5("2"));

        assert_eq!(all.len(), 1);
        assert_eq!(all.destination_md5("x/y.gif"), Some(md5("2")));
        assert!(all.remove_reference_opt("x/y.gif"));
        assert!(all.remove_reference_opt("x/y.gif"));
        assert!(!all.remove_reference_opt("x/y.gif"));
        assert!(all.is_empty());
    }

    #[test]
    fn shared_reference_survives_until_the_last_user_leaves() {
        let mut all = Index::new();
        all.add_reference("96d/logo.png", md5("logo"));
        all.add_reference("96d/logo.png", md5("logo"));
        assert_eq!(all.len(), 1);
        assert_eq!(all.references("96d/logo.png"), 2);

        assert!(all.remove_reference_opt("96d/logo.png"));
        assert_eq!(all.destination_md5("96d/logo.png"), Some(md5("logo")));
        assert!(all.remove_reference_opt("96d/logo.png"));
        assert_eq!(all.references("96d/logo.png"), 0);
        assert!(all.is_empty());
    }

    #[test]
    fn destinations_are_sorted() {
        let mut index = Index::new();
        index.add(Label::new("z", "c/z", md5("z"))).unwrap();
        index.add(Label::new("a", "a/a", md5("a"))).unwrap();
        index.add(Label::new("m", "b/m", md5("m"))).unwrap();
        let destinations: Vec<&str> = index.destinations().map(|(d, _)| d).collect();
        assert_eq!(destinations, ["a/a", "b/m", "c/z"]);
    }

    #[test]
    fn missing_file_is_not_found_but_loads_empty_on_request() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nope.idx");

        assert!(matches!(Index::load(&path), Err(IndexError::NotFound(_))));
        assert!(Index::load_or_empty(&path).unwrap().is_empty());
    }

    #[test]
    fn malformed_file_names_the_line() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("broken.idx");
        let good = codec::encode_line(&["a", "b", &md5("a").to_hex()]);
        std::fs::write(&path, format!("{good}\n\na::b::nothex\n")).unwrap();

        match Index::load(&path) {
            Err(IndexError::Malformed { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed error, got {other:?}"),
        }
    }
}
