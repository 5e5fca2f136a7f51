use std::fmt;

use lavender_common::Md5;

/// One published resource: where it came from, where it lives on the
/// docroots and what its content hash was at publish time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    original_path: String,
    lavendelized_path: String,
    md5: Md5,
}

impl Label {
    pub fn new(
        original_path: impl Into<String>,
        lavendelized_path: impl Into<String>,
        md5: Md5,
    ) -> Self {
        Self {
            original_path: original_path.into(),
            lavendelized_path: lavendelized_path.into(),
            md5,
        }
    }

    /// A label as stored in the all-index, where only the destination matters.
    pub fn reference(destination: impl Into<String>, md5: Md5) -> Self {
        let destination = destination.into();
        Self {
            original_path: destination.clone(),
            lavendelized_path: destination,
            md5,
        }
    }

    pub fn original_path(&self) -> &str {
        &self.original_path
    }

    pub fn lavendelized_path(&self) -> &str {
        &self.lavendelized_path
    }

    pub fn md5(&self) -> Md5 {
        self.md5
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({})",
            self.original_path, self.lavendelized_path, self.md5
        )
    }
}
