//! Debounced change batches

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A set of distinct changed source files
///
/// Built once when the debounce window closes and never mutated afterwards.
/// Iteration is in sorted path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    paths: BTreeSet<PathBuf>,
}

impl ChangeBatch {
    /// Create a batch from paths; duplicates collapse
    #[must_use]
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    /// Paths in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    /// Number of distinct paths
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the batch is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Whether `path` is in the batch
    #[must_use]
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.paths.contains(path.as_ref())
    }

    /// Consume the batch
    #[must_use]
    pub fn into_paths(self) -> BTreeSet<PathBuf> {
        self.paths
    }
}

impl FromIterator<PathBuf> for ChangeBatch {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<'a> IntoIterator for &'a ChangeBatch {
    type Item = &'a PathBuf;
    type IntoIter = std::collections::btree_set::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}
