//! Buffered page cache with pin counting.
//!
//! The pool keeps a fixed number of page frames in memory. Callers pin
//! a page before touching it and unpin it when done; only unpinned
//! frames are eligible for eviction, and dirty frames are written back
//! to the volume before their frame is reused.
//!
//! # Discipline
//!
//! - Every pin is matched by an unpin on every exit path.
//! - Mutations go through a pinned frame and are followed by
//!   `mark_dirty` before the final unpin.
//! - Operations hold at most a couple of pages pinned at once, so a
//!   small pool never starves.
//!
//! # Invariants
//!
//! - `frames.len() <= capacity`
//! - every page table entry points at a frame holding that page
//! - a frame with a non-zero pin count is never evicted

use std::collections::HashMap;

use crate::storage::page::{Page, PageId};
use crate::storage::volume::{Volume, VolumeError};

struct Frame {
    page: Page,
    pin_count: u32,
    dirty: bool,
    last_use: u64,
}

/// A fixed-capacity page cache.
pub struct BufferPool {
    frames: HashMap<PageId, Frame>,
    capacity: usize,
    tick: u64,
}

impl BufferPool {
    /// Create a pool with the given frame capacity.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer pool capacity must be positive");
        Self {
            frames: HashMap::with_capacity(capacity),
            capacity,
            tick: 0,
        }
    }

    /// Pin a page, reading it from the volume if it is not cached.
    pub fn pin(&mut self, volume: &mut Volume, pid: PageId) -> Result<(), BufferError> {
        self.tick += 1;
        if let Some(frame) = self.frames.get_mut(&pid) {
            frame.pin_count += 1;
            frame.last_use = self.tick;
            return Ok(());
        }

        self.make_room(volume)?;
        let mut page = Page::new();
        volume.read_page(pid.page_no, &mut page)?;
        self.frames.insert(
            pid,
            Frame {
                page,
                pin_count: 1,
                dirty: false,
                last_use: self.tick,
            },
        );
        Ok(())
    }

    /// Pin a freshly allocated page without reading it.
    ///
    /// The frame starts zeroed; the caller initialises it and marks it
    /// dirty.
    pub fn pin_new(&mut self, volume: &mut Volume, pid: PageId) -> Result<(), BufferError> {
        self.tick += 1;
        if let Some(frame) = self.frames.get_mut(&pid) {
            // A stale frame from a previous life of this page number.
            debug_assert_eq!(frame.pin_count, 0, "pin_new on a pinned page {pid}");
            frame.page.zero();
            frame.pin_count += 1;
            frame.dirty = false;
            frame.last_use = self.tick;
            return Ok(());
        }

        self.make_room(volume)?;
        self.frames.insert(
            pid,
            Frame {
                page: Page::new(),
                pin_count: 1,
                dirty: false,
                last_use: self.tick,
            },
        );
        Ok(())
    }

    /// Access a pinned page.
    pub fn page(&self, pid: PageId) -> Result<&Page, BufferError> {
        self.frames
            .get(&pid)
            .filter(|f| f.pin_count > 0)
            .map(|f| &f.page)
            .ok_or(BufferError::NotPinned(pid))
    }

    /// Mutable access to a pinned page.
    pub fn page_mut(&mut self, pid: PageId) -> Result<&mut Page, BufferError> {
        self.frames
            .get_mut(&pid)
            .filter(|f| f.pin_count > 0)
            .map(|f| &mut f.page)
            .ok_or(BufferError::NotPinned(pid))
    }

    /// Record that a pinned page has been modified.
    pub fn mark_dirty(&mut self, pid: PageId) -> Result<(), BufferError> {
        let frame = self
            .frames
            .get_mut(&pid)
            .filter(|f| f.pin_count > 0)
            .ok_or(BufferError::NotPinned(pid))?;
        frame.dirty = true;
        Ok(())
    }

    /// Release one pin on a page.
    ///
    /// Unpinning a page that is not pinned is a no-op (the damage, a
    /// double unpin, is caught in debug builds).
    pub fn unpin(&mut self, pid: PageId) {
        if let Some(frame) = self.frames.get_mut(&pid) {
            debug_assert!(frame.pin_count > 0, "unpin of unpinned page {pid}");
            frame.pin_count = frame.pin_count.saturating_sub(1);
        } else {
            debug_assert!(false, "unpin of uncached page {pid}");
        }
    }

    /// Current pin count of a page (zero if uncached).
    #[must_use]
    pub fn pin_count(&self, pid: PageId) -> u32 {
        self.frames.get(&pid).map_or(0, |f| f.pin_count)
    }

    /// Write every dirty frame back to the volume.
    pub fn flush(&mut self, volume: &mut Volume) -> Result<(), BufferError> {
        for (pid, frame) in &mut self.frames {
            if frame.dirty {
                volume.write_page(pid.page_no, &frame.page)?;
                frame.dirty = false;
            }
        }
        Ok(())
    }

    /// Drop a page's frame without writing it back.
    ///
    /// Used for pages returned to the volume allocator; their contents
    /// are dead.
    pub fn discard(&mut self, pid: PageId) {
        if let Some(frame) = self.frames.get(&pid) {
            debug_assert_eq!(frame.pin_count, 0, "discard of pinned page {pid}");
        }
        self.frames.remove(&pid);
    }

    /// Frame capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn make_room(&mut self, volume: &mut Volume) -> Result<(), BufferError> {
        if self.frames.len() < self.capacity {
            return Ok(());
        }

        let victim = self
            .frames
            .iter()
            .filter(|(_, f)| f.pin_count == 0)
            .min_by_key(|(_, f)| f.last_use)
            .map(|(pid, _)| *pid)
            .ok_or(BufferError::Exhausted)?;

        if let Some(frame) = self.frames.get(&victim) {
            if frame.dirty {
                volume.write_page(victim.page_no, &frame.page)?;
            }
        }
        self.frames.remove(&victim);
        Ok(())
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("cached", &self.frames.len())
            .finish_non_exhaustive()
    }
}

/// Errors from the buffer pool.
#[derive(Debug)]
pub enum BufferError {
    /// Every frame is pinned; nothing can be evicted.
    Exhausted,
    /// The page is not pinned in the pool.
    NotPinned(PageId),
    /// Error from the underlying volume.
    Volume(VolumeError),
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted => write!(f, "buffer pool exhausted: all frames pinned"),
            Self::NotPinned(pid) => write!(f, "page {pid} is not pinned"),
            Self::Volume(e) => write!(f, "volume error: {e}"),
        }
    }
}

impl std::error::Error for BufferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Volume(e) => Some(e),
            Self::Exhausted | Self::NotPinned(_) => None,
        }
    }
}

impl From<VolumeError> for BufferError {
    fn from(e: VolumeError) -> Self {
        Self::Volume(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::volume::Volume;
    use tempfile::tempdir;

    fn test_volume(dir: &tempfile::TempDir) -> Volume {
        Volume::format(&dir.path().join("test.vol"), 1, 64).expect("format")
    }

    fn data_pid(volume: &mut Volume) -> PageId {
        let page_no = volume.alloc_train(None, 100).expect("alloc");
        PageId::new(volume.volume_id(), page_no)
    }

    #[test]
    fn test_pin_reads_through() {
        let dir = tempdir().expect("create temp dir");
        let mut volume = test_volume(&dir);
        let pid = data_pid(&mut volume);

        let mut page = Page::new();
        page.write_bytes(0, b"on disk");
        volume.write_page(pid.page_no, &page).expect("write");

        let mut pool = BufferPool::new(4);
        pool.pin(&mut volume, pid).expect("pin");
        assert_eq!(pool.page(pid).expect("page").read_bytes(0, 7), b"on disk");
        pool.unpin(pid);
    }

    #[test]
    fn test_unpinned_page_not_accessible() {
        let dir = tempdir().expect("create temp dir");
        let mut volume = test_volume(&dir);
        let pid = data_pid(&mut volume);

        let mut pool = BufferPool::new(4);
        pool.pin(&mut volume, pid).expect("pin");
        pool.unpin(pid);

        assert!(matches!(pool.page(pid), Err(BufferError::NotPinned(_))));
    }

    #[test]
    fn test_dirty_page_written_back_on_eviction() {
        let dir = tempdir().expect("create temp dir");
        let mut volume = test_volume(&dir);
        let pid = data_pid(&mut volume);
        let others: Vec<PageId> = (0..2).map(|_| data_pid(&mut volume)).collect();

        let mut pool = BufferPool::new(2);
        pool.pin_new(&mut volume, pid).expect("pin_new");
        pool.page_mut(pid).expect("page").write_bytes(0, b"dirty");
        pool.mark_dirty(pid).expect("mark");
        pool.unpin(pid);

        // Fill the pool so the dirty frame is evicted.
        for other in &others {
            pool.pin_new(&mut volume, *other).expect("pin_new");
            pool.unpin(*other);
        }

        let mut page = Page::new();
        volume.read_page(pid.page_no, &mut page).expect("read");
        assert_eq!(page.read_bytes(0, 5), b"dirty");
    }

    #[test]
    fn test_exhausted_when_all_pinned() {
        let dir = tempdir().expect("create temp dir");
        let mut volume = test_volume(&dir);
        let a = data_pid(&mut volume);
        let b = data_pid(&mut volume);
        let c = data_pid(&mut volume);

        let mut pool = BufferPool::new(2);
        pool.pin_new(&mut volume, a).expect("pin_new");
        pool.pin_new(&mut volume, b).expect("pin_new");

        assert!(matches!(
            pool.pin_new(&mut volume, c),
            Err(BufferError::Exhausted)
        ));

        pool.unpin(a);
        pool.unpin(b);
    }

    #[test]
    fn test_nested_pins() {
        let dir = tempdir().expect("create temp dir");
        let mut volume = test_volume(&dir);
        let pid = data_pid(&mut volume);

        let mut pool = BufferPool::new(4);
        pool.pin_new(&mut volume, pid).expect("pin_new");
        pool.pin(&mut volume, pid).expect("pin");
        assert_eq!(pool.pin_count(pid), 2);

        pool.unpin(pid);
        assert_eq!(pool.pin_count(pid), 1);
        assert!(pool.page(pid).is_ok());

        pool.unpin(pid);
        assert_eq!(pool.pin_count(pid), 0);
    }

    #[test]
    fn test_flush_writes_dirty_frames() {
        let dir = tempdir().expect("create temp dir");
        let mut volume = test_volume(&dir);
        let pid = data_pid(&mut volume);

        let mut pool = BufferPool::new(4);
        pool.pin_new(&mut volume, pid).expect("pin_new");
        pool.page_mut(pid).expect("page").write_bytes(8, b"flushed");
        pool.mark_dirty(pid).expect("mark");
        pool.unpin(pid);

        pool.flush(&mut volume).expect("flush");

        let mut page = Page::new();
        volume.read_page(pid.page_no, &mut page).expect("read");
        assert_eq!(page.read_bytes(8, 7), b"flushed");
    }

    #[test]
    fn test_discard_drops_without_writeback() {
        let dir = tempdir().expect("create temp dir");
        let mut volume = test_volume(&dir);
        let pid = data_pid(&mut volume);

        let mut pool = BufferPool::new(4);
        pool.pin_new(&mut volume, pid).expect("pin_new");
        pool.page_mut(pid).expect("page").write_bytes(0, b"doomed");
        pool.mark_dirty(pid).expect("mark");
        pool.unpin(pid);
        pool.discard(pid);

        pool.flush(&mut volume).expect("flush");
        let mut page = Page::new();
        volume.read_page(pid.page_no, &mut page).expect("read");
        assert_ne!(page.read_bytes(0, 6), b"doomed");
    }
}
