//! Include/exclude path filtering
//!
//! Prefixes are kept in radix tries so a lookup costs one walk down the
//! path's bytes regardless of how many prefixes are configured.

use radix_trie::Trie;
use std::path::Path;

/// Decides which changed paths are eligible for live patching
///
/// A path is monitored when it starts with at least one include prefix and
/// with no exclude prefix. Comparison is case-sensitive on the normalized
/// form: `\` becomes `/` and leading `./` segments are dropped.
#[derive(Debug)]
pub struct PathFilter {
    include: Vec<String>,
    exclude: Vec<String>,
    extensions: Vec<String>,
    include_trie: PrefixSet,
    exclude_trie: PrefixSet,
}

impl PathFilter {
    /// Create a filter from include and exclude prefixes
    ///
    /// Source extensions default to `src`.
    #[must_use]
    pub fn new<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let include: Vec<String> = include.into_iter().map(|p| normalize(&p.into())).collect();
        let exclude: Vec<String> = exclude.into_iter().map(|p| normalize(&p.into())).collect();
        Self {
            include_trie: PrefixSet::build(&include),
            exclude_trie: PrefixSet::build(&exclude),
            include,
            exclude,
            extensions: vec!["src".to_string()],
        }
    }

    /// Restrict accepted files to these extensions (empty accepts any)
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_string())
            .collect();
        self
    }

    /// Include prefixes, normalized
    #[inline]
    #[must_use]
    pub fn include_prefixes(&self) -> &[String] {
        &self.include
    }

    /// Exclude prefixes, normalized
    #[inline]
    #[must_use]
    pub fn exclude_prefixes(&self) -> &[String] {
        &self.exclude
    }

    /// Accepted source extensions
    #[inline]
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Prefix test only: ≥1 include prefix matches and no exclude prefix does
    #[must_use]
    pub fn should_monitor(&self, path: impl AsRef<Path>) -> bool {
        let key = normalize(&path.as_ref().to_string_lossy());
        self.include_trie.matches(&key) && !self.exclude_trie.matches(&key)
    }

    /// Prefix test plus the source extension check
    #[must_use]
    pub fn accepts(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        self.should_monitor(path) && self.has_source_extension(path)
    }

    fn has_source_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}

impl Clone for PathFilter {
    fn clone(&self) -> Self {
        Self::new(self.include.clone(), self.exclude.clone())
            .with_extensions(self.extensions.clone())
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(["src/"], ["target/", ".git/"])
    }
}

/// A set of prefixes with an explicit "everything" case for the empty prefix
#[derive(Debug)]
struct PrefixSet {
    trie: Trie<String, ()>,
    match_all: bool,
}

impl PrefixSet {
    fn build(prefixes: &[String]) -> Self {
        let mut trie = Trie::new();
        let mut match_all = false;
        for prefix in prefixes {
            if prefix.is_empty() {
                match_all = true;
            } else {
                trie.insert(prefix.clone(), ());
            }
        }
        Self { trie, match_all }
    }

    fn matches(&self, key: &str) -> bool {
        self.match_all || self.trie.get_ancestor_value(key).is_some()
    }
}

/// Forward slashes, no leading `./`
#[must_use]
pub fn normalize(path: &str) -> String {
    let mut out = path.replace('\\', "/");
    while let Some(rest) = out.strip_prefix("./") {
        out = rest.to_string();
    }
    out
}
