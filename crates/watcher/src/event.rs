//! Normalized file change events

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::EventKind;
use std::path::PathBuf;

/// Type of file change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
}

/// One change notification for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
    pub is_directory: bool,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FileEventKind, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            kind,
            is_directory,
        }
    }

    /// Synthetic modify event for a regular file (startup scans)
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path, FileEventKind::Modified, false)
    }
}

/// Translate a `notify` event into zero or more file events
///
/// Renames become a delete of the old name and a create of the new one.
/// Access and metadata-only notifications are dropped.
pub fn from_notify(event: &notify::Event) -> Vec<FileEvent> {
    let on_all = |kind: FileEventKind, folder: Option<bool>| -> Vec<FileEvent> {
        event
            .paths
            .iter()
            .map(|path| {
                let is_directory = folder.unwrap_or_else(|| path.is_dir());
                FileEvent::new(path.clone(), kind, is_directory)
            })
            .collect()
    };

    match &event.kind {
        EventKind::Create(create) => {
            let folder = match create {
                CreateKind::Folder => Some(true),
                CreateKind::File => Some(false),
                _ => None,
            };
            on_all(FileEventKind::Created, folder)
        }
        EventKind::Modify(ModifyKind::Name(mode)) => rename_events(&event.paths, mode),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => on_all(FileEventKind::Modified, None),
        EventKind::Remove(remove) => {
            let folder = matches!(remove, RemoveKind::Folder);
            on_all(FileEventKind::Deleted, Some(folder))
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn rename_events(paths: &[PathBuf], mode: &RenameMode) -> Vec<FileEvent> {
    let gone = |path: &PathBuf| FileEvent::new(path.clone(), FileEventKind::Deleted, false);
    let arrived = |path: &PathBuf| FileEvent::new(path.clone(), FileEventKind::Created, path.is_dir());

    match (mode, paths) {
        (RenameMode::Both, [from, to]) => vec![gone(from), arrived(to)],
        (RenameMode::From, _) => paths.iter().map(gone).collect(),
        (RenameMode::To, _) => paths.iter().map(arrived).collect(),
        // Unpaired renames: whatever exists now counts as created
        _ => paths
            .iter()
            .map(|path| {
                if path.exists() {
                    arrived(path)
                } else {
                    gone(path)
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, DataChange, MetadataKind};

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        let mut event = notify::Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn test_create_modify_remove() {
        let created = from_notify(&event(EventKind::Create(CreateKind::File), &["/in/a.mp4"]));
        assert_eq!(created, vec![FileEvent::new("/in/a.mp4", FileEventKind::Created, false)]);

        let modified = from_notify(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Any)),
            &["/nonexistent/a.mp4"],
        ));
        assert_eq!(modified, vec![FileEvent::modified("/nonexistent/a.mp4")]);

        let removed = from_notify(&event(EventKind::Remove(RemoveKind::Folder), &["/in/dir"]));
        assert_eq!(removed, vec![FileEvent::new("/in/dir", FileEventKind::Deleted, true)]);
    }

    #[test]
    fn test_rename_both_splits() {
        let events = from_notify(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/nonexistent/a.tmp", "/nonexistent/a.mp4"],
        ));
        assert_eq!(
            events,
            vec![
                FileEvent::new("/nonexistent/a.tmp", FileEventKind::Deleted, false),
                FileEvent::new("/nonexistent/a.mp4", FileEventKind::Created, false),
            ]
        );
    }

    #[test]
    fn test_ignored_kinds() {
        assert!(from_notify(&event(EventKind::Access(AccessKind::Any), &["/in/a.mp4"])).is_empty());
        assert!(from_notify(&event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/in/a.mp4"]
        ))
        .is_empty());
    }
}
