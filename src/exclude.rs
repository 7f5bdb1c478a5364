//! Exclusion rules for top-level source entries
//!
//! A backup run can skip selected entries directly under the source
//! directory. Patterns are glob-style names (`".cache"`, `"*.tmp"`,
//! `"node_modules"`) matched against the entry's file name, never against
//! deeper path components: a pattern `"build"` excludes `<source>/build`
//! but leaves `<source>/src/build` alone.
//!
//! The default exclusion list contains only `.cache`.

use crate::error::{Result, SnaplinkError};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Top-level entry name excluded by default
pub const DEFAULT_EXCLUDES: &[&str] = &[".cache"];

/// Compiled set of top-level exclusion patterns
///
/// # Examples
///
/// ```rust
/// use snaplink::exclude::ExcludeList;
///
/// let excludes = ExcludeList::new(&[".cache".to_string(), "*.tmp".to_string()])?;
/// assert!(excludes.is_excluded(".cache"));
/// assert!(excludes.is_excluded("scratch.tmp"));
/// assert!(!excludes.is_excluded("documents"));
/// # Ok::<(), snaplink::SnaplinkError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ExcludeList {
    set: GlobSet,
    patterns: Vec<String>,
}

impl ExcludeList {
    /// Compile an exclusion list from glob patterns
    ///
    /// # Errors
    ///
    /// - [`SnaplinkError::InvalidPattern`] if a pattern fails to compile
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| SnaplinkError::InvalidPattern(format!("{}: {}", pattern, e)))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| SnaplinkError::InvalidPattern(e.to_string()))?;

        Ok(Self {
            set,
            patterns: patterns.to_vec(),
        })
    }

    /// The default list: `.cache` only
    pub fn default_list() -> Self {
        // The defaults are literal names and always compile.
        let patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect();
        Self::new(&patterns).unwrap_or_else(|_| Self::empty())
    }

    /// An empty list that excludes nothing
    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// Check whether a top-level entry name is excluded
    pub fn is_excluded(&self, name: &str) -> bool {
        self.set.is_match(name)
    }

    /// The source patterns this list was compiled from
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether the list contains no patterns
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for ExcludeList {
    fn default() -> Self {
        Self::default_list()
    }
}
