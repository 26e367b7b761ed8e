//! Relevance filtering for watched files

use crate::event::FileEvent;
use std::path::Path;

/// Accepts regular files whose name ends with a suffix (e.g. `.mp4`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixFilter {
    suffix: String,
}

impl SuffixFilter {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Case-sensitive match on the file name
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(&self.suffix))
    }

    /// Whether an event is for a non-directory path with the suffix
    pub fn accepts(&self, event: &FileEvent) -> bool {
        !event.is_directory && self.matches(&event.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FileEventKind;

    #[test]
    fn test_suffix_match() {
        let filter = SuffixFilter::new(".mp4");
        assert!(filter.matches(Path::new("/in/cam1.mp4")));
        assert!(!filter.matches(Path::new("/in/cam1.mp4.part")));
        assert!(!filter.matches(Path::new("/in/cam1.MP4")));
        assert!(!filter.matches(Path::new("/")));
    }

    #[test]
    fn test_directories_rejected() {
        let filter = SuffixFilter::new(".mp4");
        let dir = FileEvent::new("/in/odd.mp4", FileEventKind::Created, true);
        let file = FileEvent::new("/in/odd.mp4", FileEventKind::Created, false);
        assert!(!filter.accepts(&dir));
        assert!(filter.accepts(&file));
    }
}
