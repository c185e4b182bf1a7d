//! Deferred page deallocation.
//!
//! Destroying the last object on a page unlinks the page from its file
//! chain immediately but returns the page to the volume allocator
//! later: destroy pushes a record onto a caller-supplied list, and the
//! caller drains the list at a point of its choosing.

use crate::storage::buffer::BufferPool;
use crate::storage::page::PageId;
use crate::storage::volume::Volume;
use std::collections::VecDeque;

/// One pending deallocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeallocEntry {
    /// A whole page to return to the allocator.
    Page(PageId),
}

/// A list of pending deallocations, newest first.
#[derive(Debug, Default)]
pub struct DeallocList {
    entries: VecDeque<DeallocEntry>,
}

impl DeallocList {
    /// Create an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Push a page record at the head.
    pub fn push_page(&mut self, pid: PageId) {
        self.entries.push_front(DeallocEntry::Page(pid));
    }

    /// Entries, newest first.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, DeallocEntry> {
        self.entries.iter()
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether anything is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return every pending page to the volume allocator, dropping any
    /// cached frame on the way.
    pub fn drain(&mut self, volume: &mut Volume, pool: &mut BufferPool) {
        for entry in self.entries.drain(..) {
            let DeallocEntry::Page(pid) = entry;
            pool.discard(pid);
            volume.free_page(pid.page_no);
            tracing::debug!(page = %pid, "deallocated page");
        }
    }
}

impl<'a> IntoIterator for &'a DeallocList {
    type Item = &'a DeallocEntry;
    type IntoIter = std::collections::vec_deque::Iter<'a, DeallocEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_newest_first() {
        let mut list = DeallocList::new();
        list.push_page(PageId::new(1, 5));
        list.push_page(PageId::new(1, 9));

        let pages: Vec<_> = list.iter().copied().collect();
        assert_eq!(
            pages,
            vec![
                DeallocEntry::Page(PageId::new(1, 9)),
                DeallocEntry::Page(PageId::new(1, 5))
            ]
        );
    }

    #[test]
    fn test_drain_frees_pages() {
        let dir = tempdir().expect("create temp dir");
        let mut volume =
            Volume::format(&dir.path().join("test.vol"), 1, 64).expect("format");
        let mut pool = BufferPool::new(4);

        let page_no = volume.alloc_train(None, 100).expect("alloc");
        let pid = PageId::new(volume.volume_id(), page_no);

        let mut list = DeallocList::new();
        list.push_page(pid);
        list.drain(&mut volume, &mut pool);

        assert!(list.is_empty());
        assert!(!volume.is_allocated(page_no));
    }
}
