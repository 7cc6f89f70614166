//! Notification sources: where raw change events come from.
//!
//! The aggregator never talks to the filesystem directly. It asks a
//! [`NotificationSource`] for a [`Subscription`] plus a stream of
//! [`ChangeEvent`]s, and calls [`Subscription::extend_coverage`] when a new
//! directory should start producing events.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                notify event thread                           │
//! │  ┌────────────────────┐    ┌──────────────────────────────┐  │
//! │  │ RecommendedWatcher │ -> │ callback: notify::Event ->   │  │
//! │  │ (one watch per dir)│    │ ChangeEvent, UTF-8 check     │  │
//! │  └────────────────────┘    └──────────────┬───────────────┘  │
//! └───────────────────────────────────────────│──────────────────┘
//!                                             │ unbounded send
//!                                             ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                per-watch tokio task                          │
//! │   mpsc::UnboundedReceiver<ChangeEvent> -> ChangeAggregator   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`NotifySource`] registers every directory of the tree individually and
//! non-recursively, so "extend coverage to a new directory" is an explicit
//! operation rather than something the backend does behind our back.

use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::WatchError;
use crate::events::{ChangeEvent, ChangeKind};

/// Receiving half of a subscription's event stream.
pub type EventStream = mpsc::UnboundedReceiver<ChangeEvent>;

/// Produces change events for a directory tree.
pub trait NotificationSource: Send + Sync + 'static {
    /// Starts delivering events for `path`.
    ///
    /// With `recursive`, every existing subdirectory is covered as well.
    /// `auto_add` is advisory: it tells the source that the caller will
    /// extend coverage to new directories, which lets sources that can
    /// only cover trees wholesale pick the right mode.
    fn subscribe(
        &self,
        path: &Utf8Path,
        recursive: bool,
        auto_add: bool,
    ) -> Result<(Box<dyn Subscription>, EventStream), WatchError>;
}

/// A live subscription. Dropping it stops event delivery.
pub trait Subscription: Send {
    /// Starts delivering events for a directory created after subscribing.
    fn extend_coverage(&mut self, path: &Utf8Path) -> Result<(), WatchError>;
}

/// The default [`NotificationSource`], backed by the `notify` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifySource;

impl NotifySource {
    /// Creates a notify-backed source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl NotificationSource for NotifySource {
    fn subscribe(
        &self,
        path: &Utf8Path,
        recursive: bool,
        auto_add: bool,
    ) -> Result<(Box<dyn Subscription>, EventStream), WatchError> {
        if !path.exists() {
            return Err(WatchError::path_not_found(path));
        }

        // Unbounded: watch() round-trips through the notify event thread, so
        // the callback must never block on a full channel.
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for change in translate(&event) {
                        if event_tx.send(change).is_err() {
                            tracing::debug!("Event channel closed, dropping notification");
                            return;
                        }
                    }
                }
                Err(error) => tracing::warn!(error = %error, "Notify error"),
            }
        })?;

        let mut subscription = NotifySubscription {
            watcher,
            recursive,
        };
        subscription.cover_tree(path)?;

        tracing::info!(path = %path, recursive, auto_add, "Change notifications started");

        Ok((Box::new(subscription), event_rx))
    }
}

/// Subscription handed out by [`NotifySource`].
struct NotifySubscription {
    watcher: RecommendedWatcher,
    recursive: bool,
}

impl NotifySubscription {
    /// Watches `root` and, for recursive subscriptions, every directory below it.
    fn cover_tree(&mut self, root: &Utf8Path) -> Result<(), WatchError> {
        self.watcher
            .watch(root.as_std_path(), RecursiveMode::NonRecursive)?;

        if !self.recursive || !root.is_dir() {
            return Ok(());
        }

        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    tracing::warn!(error = %error, "Skipping unreadable directory");
                    continue;
                }
            };
            if entry.depth() == 0 || !entry.file_type().is_some_and(|ft| ft.is_dir()) {
                continue;
            }
            if let Err(error) = self.watcher.watch(entry.path(), RecursiveMode::NonRecursive) {
                // The directory may have vanished between listing and watching
                tracing::debug!(path = %entry.path().display(), error = %error, "Could not watch directory");
            }
        }

        Ok(())
    }
}

impl Subscription for NotifySubscription {
    fn extend_coverage(&mut self, path: &Utf8Path) -> Result<(), WatchError> {
        tracing::debug!(path = %path, "Extending coverage to new directory");
        self.cover_tree(path)
    }
}

/// Converts one notify event into zero or more [`ChangeEvent`]s.
fn translate(event: &notify::Event) -> Vec<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            ChangeKind::Created
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            ChangeKind::Deleted
        }
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter_map(|path| match Utf8PathBuf::try_from(path.clone()) {
            Ok(path) => {
                let is_dir = matches!(kind, ChangeKind::Created) && path.is_dir();
                Some(ChangeEvent::new(kind, path, is_dir))
            }
            Err(e) => {
                let invalid_path = e.into_path_buf();
                tracing::warn!(
                    path = %invalid_path.display(),
                    "Skipping non-UTF-8 path in change event"
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("Invalid path")
    }

    #[test]
    fn test_translate_kinds() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let file = dir.path().join("a.txt");

        let created = notify::Event::new(EventKind::Create(CreateKind::File)).add_path(file.clone());
        let changes = translate(&created);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Created);
        assert!(!changes[0].is_dir);

        let modified = notify::Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(file.clone());
        assert_eq!(translate(&modified)[0].kind, ChangeKind::Modified);

        let removed = notify::Event::new(EventKind::Remove(RemoveKind::File)).add_path(file.clone());
        assert_eq!(translate(&removed)[0].kind, ChangeKind::Deleted);

        let accessed = notify::Event::new(EventKind::Access(AccessKind::Any)).add_path(file);
        assert!(translate(&accessed).is_empty());
    }

    #[test]
    fn test_translate_directory_creation() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let sub = dir.path().join("assets");
        fs::create_dir(&sub).expect("Failed to create dir");

        let event = notify::Event::new(EventKind::Create(CreateKind::Folder)).add_path(sub);
        let changes = translate(&event);
        assert!(changes[0].is_new_directory());
    }

    #[test]
    fn test_translate_rename_into_tree_is_creation() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let moved = dir.path().join("moved");
        fs::create_dir(&moved).expect("Failed to create dir");

        let event = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(moved);
        assert!(translate(&event)[0].is_new_directory());
    }

    #[tokio::test]
    async fn test_subscribe_missing_path() {
        let result = NotifySource.subscribe(Utf8Path::new("/nonexistent/mimic/path"), true, true);
        assert!(matches!(result, Err(WatchError::PathNotFound(_))));
    }

    #[tokio::test]
    async fn test_subscribe_receives_events() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let root = utf8(&dir);

        let (_subscription, mut events) = NotifySource
            .subscribe(&root, true, true)
            .expect("Failed to subscribe");

        fs::write(root.join("hello.txt"), "hello").expect("Failed to write file");

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv()).await;

        // Timing-dependent, may not always fire in CI sandboxes
        if let Ok(Some(event)) = event {
            assert!(event.path.as_str().contains("hello.txt"));
        }
    }

    #[tokio::test]
    async fn test_extend_coverage_to_new_directory() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let root = utf8(&dir);

        let (mut subscription, _events) = NotifySource
            .subscribe(&root, false, true)
            .expect("Failed to subscribe");

        let sub = root.join("late").join("nested");
        fs::create_dir_all(&sub).expect("Failed to create dir");
        assert!(subscription.extend_coverage(&root.join("late")).is_ok());
    }

    #[tokio::test]
    async fn test_extend_coverage_to_vanished_directory() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let root = utf8(&dir);

        let (mut subscription, _events) = NotifySource
            .subscribe(&root, true, true)
            .expect("Failed to subscribe");

        let result = subscription.extend_coverage(&root.join("gone"));
        assert!(matches!(result, Err(WatchError::Notify(_))));
    }
}
