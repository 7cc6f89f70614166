//! Raw change events delivered by a notification source.
//!
//! # Event Flow
//!
//! ```text
//! File System Change
//!        │
//!        ▼
//!  NotificationSource (notify, one watch per directory)
//!        │
//!        ▼
//!   ChangeEvent created
//!        │
//!        ▼
//!  ChangeAggregator (exclude filter + settle timer)
//! ```

use camino::{Utf8Path, Utf8PathBuf};

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The path was created or moved into the watched tree.
    Created,
    /// The path was removed or moved out of the watched tree.
    Deleted,
    /// The path's contents or metadata changed.
    Modified,
}

/// A single raw change notification.
///
/// Unlike a debounced event, every filesystem notification produces one of
/// these; coalescing happens later in the aggregator.
///
/// # Examples
///
/// ```
/// use mimic_watcher::{ChangeEvent, ChangeKind};
/// use camino::Utf8PathBuf;
///
/// let event = ChangeEvent::modified(Utf8PathBuf::from("/site/index.html"));
/// assert_eq!(event.kind, ChangeKind::Modified);
/// assert_eq!(event.file_name(), Some("index.html"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,

    /// Absolute path of the changed file or directory.
    pub path: Utf8PathBuf,

    /// Whether the path is a directory.
    pub is_dir: bool,
}

impl ChangeEvent {
    /// Creates an event.
    #[inline]
    #[must_use]
    pub const fn new(kind: ChangeKind, path: Utf8PathBuf, is_dir: bool) -> Self {
        Self { kind, path, is_dir }
    }

    /// Creates a modification event for a file.
    #[inline]
    #[must_use]
    pub const fn modified(path: Utf8PathBuf) -> Self {
        Self::new(ChangeKind::Modified, path, false)
    }

    /// Creates a creation event for a directory.
    #[inline]
    #[must_use]
    pub const fn dir_created(path: Utf8PathBuf) -> Self {
        Self::new(ChangeKind::Created, path, true)
    }

    /// Returns the base name of the changed path.
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }

    /// Returns the changed path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns `true` if a new directory appeared.
    #[inline]
    #[must_use]
    pub const fn is_new_directory(&self) -> bool {
        self.is_dir && matches!(self.kind, ChangeKind::Created)
    }
}
