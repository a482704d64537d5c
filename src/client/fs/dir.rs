use std::collections::VecDeque;

use super::{EntryKind, Metadata};

/// Entries returned by the [`ReadDir`] iterator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    file: String,
    metadata: Metadata,
}

impl DirEntry {
    pub(crate) fn new(file: String, metadata: Metadata) -> Self {
        Self { file, metadata }
    }

    /// Returns the bare file name of the entry, without its directory.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file
    }

    #[must_use]
    pub fn kind(&self) -> EntryKind {
        self.metadata.kind()
    }

    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    #[must_use]
    pub fn into_parts(self) -> (String, Metadata) {
        (self.file, self.metadata)
    }
}

/// Iterator over the entries of a remote directory, in the order the
/// server reported them. `.` and `..` are skipped.
#[derive(Debug)]
pub struct ReadDir {
    pub(crate) entries: VecDeque<DirEntry>,
}

impl ReadDir {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Iterator for ReadDir {
    type Item = DirEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.entries.len(), Some(self.entries.len()))
    }
}

impl ExactSizeIterator for ReadDir {}

pub(crate) fn is_self_or_parent(name: &str) -> bool {
    name == "." || name == ".."
}
