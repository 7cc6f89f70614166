//! File filtering for change events.
//!
//! Events are filtered before they reach the settle timer, so a burst of
//! editor swap-file churn never schedules a transfer.
//!
//! # Design
//!
//! The [`FileFilter`] trait is a simple predicate over a changed path.
//! [`ExcludeFilter`] implements it with shell globs matched against the
//! path's basename, the same patterns that are handed to rsync as
//! `--exclude` flags.
//!
//! # Examples
//!
//! ```
//! use mimic_watcher::{ExcludeFilter, FileFilter};
//! use camino::Utf8Path;
//!
//! let filter = ExcludeFilter::new(["*.swp", "*~"]).unwrap();
//!
//! assert!(filter.should_process(Utf8Path::new("/site/index.html")));
//! assert!(!filter.should_process(Utf8Path::new("/site/.index.html.swp")));
//! assert!(!filter.should_process(Utf8Path::new("/site/notes.txt~")));
//! ```

use camino::Utf8Path;
use glob::Pattern;
use smallvec::SmallVec;

use crate::error::WatchError;

/// A filter for determining which change events to act on.
///
/// # Thread Safety
///
/// Filters must be [`Send`] and [`Sync`] because they are owned by the
/// per-watch task. They must also be `'static` to be moved into it.
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if a change to `path` should count towards a transfer.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// A filter that accepts all files.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl FileFilter for AcceptAllFilter {
    #[inline]
    fn should_process(&self, _path: &Utf8Path) -> bool {
        true
    }
}

/// Ignores paths whose basename matches any of a set of shell globs.
///
/// Supports `*`, `?`, `[abc]`, `[a-z]` and `[!abc]`. Unlike path globs,
/// `*` also matches a leading dot, so `*.swp` catches `.main.rs.swp`.
/// An empty pattern set ignores nothing.
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    patterns: SmallVec<[Pattern; 4]>,
}

impl ExcludeFilter {
    /// Compiles a set of exclude patterns.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidPattern`] for the first pattern that is
    /// not a valid glob.
    pub fn new<I, S>(patterns: I) -> Result<Self, WatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|raw| {
                let raw = raw.as_ref();
                Pattern::new(raw).map_err(|e| WatchError::invalid_pattern(raw, e.msg))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    /// Returns `true` if the path's basename matches an exclude pattern.
    #[must_use]
    pub fn is_excluded(&self, path: &Utf8Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        self.patterns.iter().any(|pattern| pattern.matches(name))
    }

    /// Returns the compiled patterns in their original spelling.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Pattern::as_str)
    }

    /// Returns `true` if no patterns are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl FileFilter for ExcludeFilter {
    #[inline]
    fn should_process(&self, path: &Utf8Path) -> bool {
        !self.is_excluded(path)
    }
}

/// Returns `true` if a change to `filename` should be ignored under `patterns`.
///
/// Convenience wrapper for one-off checks; watches compile an
/// [`ExcludeFilter`] once instead.
///
/// # Errors
///
/// Returns [`WatchError::InvalidPattern`] if a pattern does not compile.
pub fn should_ignore<S: AsRef<str>>(filename: &Utf8Path, patterns: &[S]) -> Result<bool, WatchError> {
    Ok(ExcludeFilter::new(patterns)?.is_excluded(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(patterns: &[&str]) -> ExcludeFilter {
        ExcludeFilter::new(patterns).unwrap()
    }

    #[test]
    fn test_accept_all_filter() {
        assert!(AcceptAllFilter.should_process(Utf8Path::new("anything.swp")));
    }

    #[test]
    fn test_empty_patterns_ignore_nothing() {
        let filter = ExcludeFilter::default();
        assert!(filter.is_empty());
        assert!(!filter.is_excluded(Utf8Path::new("/a/.hidden.swp")));
        assert!(filter.should_process(Utf8Path::new("/a/b.txt")));
    }

    #[test]
    fn test_star_matches_basename_only() {
        let filter = filter(&["*.swp"]);
        assert!(filter.is_excluded(Utf8Path::new("/a/b/file.swp")));
        assert!(filter.is_excluded(Utf8Path::new("/a/b/.file.txt.swp")));
        assert!(!filter.is_excluded(Utf8Path::new("/a/b/file.txt")));
        // Directory names in the path are not considered
        assert!(!filter.is_excluded(Utf8Path::new("/a/x.swp/file.txt")));
    }

    #[test]
    fn test_question_mark_and_classes() {
        let filter = filter(&["?.o", "[ab]*.log", "tmp[!0-9]"]);
        assert!(filter.is_excluded(Utf8Path::new("/x/a.o")));
        assert!(!filter.is_excluded(Utf8Path::new("/x/ab.o")));
        assert!(filter.is_excluded(Utf8Path::new("/x/app.log")));
        assert!(!filter.is_excluded(Utf8Path::new("/x/core.log")));
        assert!(filter.is_excluded(Utf8Path::new("/x/tmpa")));
        assert!(!filter.is_excluded(Utf8Path::new("/x/tmp1")));
    }

    #[test]
    fn test_literal_name() {
        let filter = filter(&[".git"]);
        assert!(filter.is_excluded(Utf8Path::new("/repo/.git")));
        assert!(!filter.is_excluded(Utf8Path::new("/repo/.github")));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = ExcludeFilter::new(["ok", "[unclosed"]).unwrap_err();
        match err {
            WatchError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "[unclosed"),
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn test_patterns_preserve_spelling() {
        let filter = filter(&["*.swp", "build"]);
        assert_eq!(filter.patterns().collect::<Vec<_>>(), vec!["*.swp", "build"]);
    }

    #[test]
    fn test_should_ignore() {
        assert!(should_ignore(Utf8Path::new("/a/x.swp"), &["*.swp"]).unwrap());
        assert!(!should_ignore(Utf8Path::new("/a/x.txt"), &["*.swp"]).unwrap());
        assert!(!should_ignore::<&str>(Utf8Path::new("/a/x.swp"), &[]).unwrap());
    }
}
