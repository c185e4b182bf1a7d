//! Slotted page layout: header, forward-growing data region, and a
//! slot array growing backward from the end of the page.
//!
//! # Page Format
//!
//! ```text
//! Offset        Size   Field
//! 0             4      volume id
//! 4             4      page number
//! 8             4      prev page in file chain (0 = none)
//! 12            4      next page in file chain (0 = none)
//! 16            4      space-list prev page (0 = none)
//! 20            4      space-list next page (0 = none)
//! 24            2      slot count
//! 26            2      free (offset of first unoccupied data byte)
//! 28            2      unused (reclaimable hole bytes)
//! 30            2      flags (bit 0: catalog page)
//! 32            4      unique counter (next stamp to assign)
//! 36            12     reserved (zero)
//! 48            var    data region: object records, insertion order
//! ...                  free window
//! PAGE_SIZE-8k  8      slot k-1
//! ...
//! PAGE_SIZE-8   8      slot 0
//! ```
//!
//! A slot entry is `{ offset: i32, unique: u32 }`; `offset == -1`
//! marks a tombstone. Slot indices are dense and stable: compaction
//! rewrites offsets but never moves a live slot to a different index,
//! so outstanding object identifiers keep resolving.
//!
//! # Invariants
//!
//! - `PAGE_HEADER_SIZE <= free <= PAGE_SIZE - n_slots * SLOT_SIZE`
//! - live records are pairwise disjoint and lie in `[PAGE_HEADER_SIZE, free)`
//! - `free_window + unused + live record bytes + slot array + header == PAGE_SIZE`

// Offsets and lengths are bounded by PAGE_SIZE, so the u16 casts below
// cannot truncate.
#![allow(clippy::cast_possible_truncation)]

use crate::storage::object::{OBJECT_HDR_SIZE, ObjectHdr};
use crate::storage::page::{NIL_PAGE_NO, PAGE_SIZE, Page, PageId, PageNo};

/// Size of the slotted page header in bytes.
pub const PAGE_HEADER_SIZE: usize = 48;

/// On-disk size of one slot entry.
pub const SLOT_SIZE: usize = 8;

/// Slot offset value marking a tombstone.
pub const EMPTY_SLOT: i32 = -1;

const OFFSET_VOLUME: usize = 0;
const OFFSET_PAGE_NO: usize = 4;
const OFFSET_PREV_PAGE: usize = 8;
const OFFSET_NEXT_PAGE: usize = 12;
const OFFSET_SPACE_PREV: usize = 16;
const OFFSET_SPACE_NEXT: usize = 20;
const OFFSET_N_SLOTS: usize = 24;
const OFFSET_FREE: usize = 26;
const OFFSET_UNUSED: usize = 28;
const OFFSET_FLAGS: usize = 30;
const OFFSET_UNIQUE: usize = 32;

const FLAG_CATALOG: u16 = 0x0001;

/// What a slotted page is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Holds user objects.
    Data,
    /// Holds file catalog entries.
    Catalog,
}

/// One slot entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Page-absolute offset of the record, or [`EMPTY_SLOT`].
    pub offset: i32,
    /// Stamp assigned when the slot was written.
    pub unique: u32,
}

impl Slot {
    /// Whether this slot is a tombstone.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.offset == EMPTY_SLOT
    }
}

/// A structured view over a raw page buffer.
///
/// The view borrows the buffer mutably for its lifetime; callers keep
/// views short-lived so the owning buffer pool stays available for
/// other pages.
pub struct SlottedPage<'a> {
    page: &'a mut Page,
}

impl<'a> SlottedPage<'a> {
    /// Wrap an existing slotted page.
    pub const fn new(page: &'a mut Page) -> Self {
        Self { page }
    }

    /// Initialise a freshly allocated (zeroed) page.
    pub fn init(page: &'a mut Page, pid: PageId, kind: PageKind) -> Self {
        page.zero();
        page.write_u32(OFFSET_VOLUME, pid.volume);
        page.write_u32(OFFSET_PAGE_NO, pid.page_no);
        page.write_u16(OFFSET_FREE, PAGE_HEADER_SIZE as u16);
        page.write_u32(OFFSET_UNIQUE, 1);
        if matches!(kind, PageKind::Catalog) {
            page.write_u16(OFFSET_FLAGS, FLAG_CATALOG);
        }
        Self { page }
    }

    /// The page's identity as recorded in its header.
    #[must_use]
    pub fn pid(&self) -> PageId {
        PageId::new(
            self.page.read_u32(OFFSET_VOLUME),
            self.page.read_u32(OFFSET_PAGE_NO),
        )
    }

    /// Whether this page holds catalog entries.
    #[must_use]
    pub fn is_catalog(&self) -> bool {
        self.page.read_u16(OFFSET_FLAGS) & FLAG_CATALOG != 0
    }

    /// Number of slot entries, tombstones included.
    #[must_use]
    pub fn n_slots(&self) -> u16 {
        self.page.read_u16(OFFSET_N_SLOTS)
    }

    /// Offset of the first unoccupied byte in the data region.
    #[must_use]
    pub fn free(&self) -> usize {
        self.page.read_u16(OFFSET_FREE) as usize
    }

    /// Reclaimable bytes scattered as holes in the data region.
    #[must_use]
    pub fn unused(&self) -> usize {
        self.page.read_u16(OFFSET_UNUSED) as usize
    }

    /// Previous page in the file chain.
    #[must_use]
    pub fn prev_page(&self) -> PageNo {
        self.page.read_u32(OFFSET_PREV_PAGE)
    }

    /// Next page in the file chain.
    #[must_use]
    pub fn next_page(&self) -> PageNo {
        self.page.read_u32(OFFSET_NEXT_PAGE)
    }

    /// Previous page in the available-space list.
    #[must_use]
    pub fn space_prev(&self) -> PageNo {
        self.page.read_u32(OFFSET_SPACE_PREV)
    }

    /// Next page in the available-space list.
    #[must_use]
    pub fn space_next(&self) -> PageNo {
        self.page.read_u32(OFFSET_SPACE_NEXT)
    }

    /// Set the previous page in the file chain.
    pub fn set_prev_page(&mut self, page_no: PageNo) {
        self.page.write_u32(OFFSET_PREV_PAGE, page_no);
    }

    /// Set the next page in the file chain.
    pub fn set_next_page(&mut self, page_no: PageNo) {
        self.page.write_u32(OFFSET_NEXT_PAGE, page_no);
    }

    /// Set the previous page in the available-space list.
    pub fn set_space_prev(&mut self, page_no: PageNo) {
        self.page.write_u32(OFFSET_SPACE_PREV, page_no);
    }

    /// Set the next page in the available-space list.
    pub fn set_space_next(&mut self, page_no: PageNo) {
        self.page.write_u32(OFFSET_SPACE_NEXT, page_no);
    }

    /// Contiguous free bytes between the data region and the slot array.
    ///
    /// A record of `need` bytes (plus a new slot) fits in place iff
    /// `need + SLOT_SIZE <= free_window()`.
    #[must_use]
    pub fn free_window(&self) -> usize {
        PAGE_SIZE - self.free() - self.n_slots() as usize * SLOT_SIZE
    }

    /// Total reclaimable bytes: the contiguous window plus holes.
    ///
    /// A record fits after compaction iff it fits in the total.
    #[must_use]
    pub fn total_free(&self) -> usize {
        self.free_window() + self.unused()
    }

    /// Read slot `i`. Panics if `i` is out of range.
    #[must_use]
    pub fn slot(&self, i: u16) -> Slot {
        debug_assert!(i < self.n_slots(), "slot {i} out of range");
        let base = PAGE_SIZE - (i as usize + 1) * SLOT_SIZE;
        Slot {
            offset: self.page.read_i32(base),
            unique: self.page.read_u32(base + 4),
        }
    }

    fn set_slot(&mut self, i: u16, slot: Slot) {
        let base = PAGE_SIZE - (i as usize + 1) * SLOT_SIZE;
        self.page.write_i32(base, slot.offset);
        self.page.write_u32(base + 4, slot.unique);
    }

    /// Header of the record a live slot points at.
    #[must_use]
    #[allow(clippy::cast_sign_loss)] // live offsets are non-negative
    pub fn object_hdr(&self, slot_no: u16) -> ObjectHdr {
        let slot = self.slot(slot_no);
        debug_assert!(!slot.is_empty(), "slot {slot_no} is a tombstone");
        ObjectHdr::from_bytes(self.page.read_bytes(slot.offset as usize, OBJECT_HDR_SIZE))
    }

    /// Payload bytes of the record a live slot points at.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn object_bytes(&self, slot_no: u16) -> &[u8] {
        let slot = self.slot(slot_no);
        debug_assert!(!slot.is_empty(), "slot {slot_no} is a tombstone");
        let hdr = self.object_hdr(slot_no);
        self.page
            .read_bytes(slot.offset as usize + OBJECT_HDR_SIZE, hdr.length as usize)
    }

    fn take_unique(&mut self) -> u32 {
        let unique = self.page.read_u32(OFFSET_UNIQUE);
        self.page.write_u32(OFFSET_UNIQUE, unique + 1);
        unique
    }

    /// Append an object into the contiguous free window.
    ///
    /// The caller has already made room: `hdr + aligned payload + slot`
    /// must fit in [`Self::free_window`]. Returns the new slot index
    /// and its unique stamp.
    #[allow(clippy::cast_possible_wrap)]
    pub fn insert(&mut self, tag: i16, data: &[u8]) -> (u16, u32) {
        let hdr = ObjectHdr::new(data.len() as u32, tag);
        let record = hdr.record_size();
        debug_assert!(
            record + SLOT_SIZE <= self.free_window(),
            "insert into page without room"
        );

        let offset = self.free();
        self.page.write_bytes(offset, &hdr.to_bytes());
        self.page.write_bytes(offset + OBJECT_HDR_SIZE, data);
        // Zero the word padding so record bytes are deterministic.
        let pad_start = offset + OBJECT_HDR_SIZE + data.len();
        let pad_end = offset + record;
        for i in pad_start..pad_end {
            self.page.write_u8(i, 0);
        }

        let slot_no = self.n_slots();
        self.page.write_u16(OFFSET_N_SLOTS, slot_no + 1);
        let unique = self.take_unique();
        self.set_slot(
            slot_no,
            Slot {
                offset: offset as i32,
                unique,
            },
        );
        self.page.write_u16(OFFSET_FREE, (offset + record) as u16);

        debug_assert!(self.space_accounted());
        (slot_no, unique)
    }

    /// Overwrite a live record's payload with same-length bytes.
    ///
    /// Records never grow in place; this is for fixed-size entries
    /// such as catalog records.
    #[allow(clippy::cast_sign_loss)]
    pub fn update_in_place(&mut self, slot_no: u16, data: &[u8]) {
        let slot = self.slot(slot_no);
        debug_assert!(!slot.is_empty(), "update of tombstone {slot_no}");
        debug_assert_eq!(
            self.object_hdr(slot_no).length as usize,
            data.len(),
            "in-place update must keep the length"
        );
        self.page
            .write_bytes(slot.offset as usize + OBJECT_HDR_SIZE, data);
    }

    /// Tombstone a live slot and reclaim its space.
    ///
    /// If the record is physically last in the data region its bytes
    /// return to the contiguous window; otherwise they become a hole
    /// counted in `unused` until the next compaction. If the slot is
    /// the last entry in the slot array it is popped, along with any
    /// tombstones that become trailing as a result.
    #[allow(clippy::cast_sign_loss)]
    pub fn remove(&mut self, slot_no: u16) {
        let slot = self.slot(slot_no);
        debug_assert!(!slot.is_empty(), "removing tombstone {slot_no}");
        let reclaim = self.object_hdr(slot_no).record_size();
        let offset = slot.offset as usize;

        self.set_slot(
            slot_no,
            Slot {
                offset: EMPTY_SLOT,
                unique: slot.unique,
            },
        );

        if offset + reclaim == self.free() {
            self.page.write_u16(OFFSET_FREE, offset as u16);
        } else {
            self.page
                .write_u16(OFFSET_UNUSED, (self.unused() + reclaim) as u16);
        }

        let mut n_slots = self.n_slots();
        if slot_no == n_slots - 1 {
            n_slots -= 1;
            while n_slots > 0 && self.raw_slot_is_empty(n_slots - 1) {
                n_slots -= 1;
            }
            self.page.write_u16(OFFSET_N_SLOTS, n_slots);
        }

        debug_assert!(self.space_accounted());
    }

    fn raw_slot_is_empty(&self, i: u16) -> bool {
        let base = PAGE_SIZE - (i as usize + 1) * SLOT_SIZE;
        self.page.read_i32(base) == EMPTY_SLOT
    }

    /// Rewrite the data region so the free space is one contiguous
    /// window.
    ///
    /// Live records are copied to the front of the data region in slot
    /// order; if `pivot` names a live slot its record is parked last
    /// instead, so a caller can grow it or append right behind it.
    /// Every live slot keeps its index and unique stamp; only offsets
    /// change. `unused` drops to zero and the slot count is untouched.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    pub fn compact(&mut self, pivot: Option<u16>) {
        let snapshot = self.page.clone();
        let n_slots = self.n_slots();

        // A tombstoned pivot has no record to park; ignore it.
        let pivot = pivot.filter(|&p| p < n_slots && !self.raw_slot_is_empty(p));

        let mut cursor = PAGE_HEADER_SIZE;
        let mut relocate = |this: &mut Self, i: u16| {
            let base = PAGE_SIZE - (i as usize + 1) * SLOT_SIZE;
            let offset = snapshot.read_i32(base) as usize;
            let hdr = ObjectHdr::from_bytes(snapshot.read_bytes(offset, OBJECT_HDR_SIZE));
            let record = hdr.record_size();
            this.page
                .write_bytes(cursor, snapshot.read_bytes(offset, record));
            this.set_slot(
                i,
                Slot {
                    offset: cursor as i32,
                    unique: snapshot.read_u32(base + 4),
                },
            );
            cursor += record;
        };

        for i in 0..n_slots {
            if Some(i) == pivot || self.raw_slot_is_empty(i) {
                continue;
            }
            relocate(self, i);
        }
        if let Some(p) = pivot {
            relocate(self, p);
        }

        self.page.write_u16(OFFSET_FREE, cursor as u16);
        self.page.write_u16(OFFSET_UNUSED, 0);

        debug_assert!(self.space_accounted());
    }

    /// Whether the page's space bookkeeping balances: window + holes +
    /// live record bytes + slot array + header must cover the page
    /// exactly.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn space_accounted(&self) -> bool {
        let mut live = 0usize;
        for i in 0..self.n_slots() {
            if !self.raw_slot_is_empty(i) {
                live += self.object_hdr(i).record_size();
            }
        }
        let slots = self.n_slots() as usize * SLOT_SIZE;
        PAGE_HEADER_SIZE + live + self.unused() + self.free_window() + slots == PAGE_SIZE
    }
}

/// Whether a page-number link field is nil.
#[must_use]
pub const fn is_nil(page_no: PageNo) -> bool {
    page_no == NIL_PAGE_NO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::object::aligned_length;

    fn fresh_page() -> Page {
        let mut page = Page::new();
        SlottedPage::init(&mut page, PageId::new(1, 2), PageKind::Data);
        page
    }

    #[test]
    fn test_init() {
        let mut page = fresh_page();
        let sp = SlottedPage::new(&mut page);

        assert_eq!(sp.pid(), PageId::new(1, 2));
        assert_eq!(sp.n_slots(), 0);
        assert_eq!(sp.free(), PAGE_HEADER_SIZE);
        assert_eq!(sp.unused(), 0);
        assert_eq!(sp.free_window(), PAGE_SIZE - PAGE_HEADER_SIZE);
        assert!(!sp.is_catalog());
        assert!(sp.space_accounted());
    }

    #[test]
    fn test_insert_and_read_back() {
        let mut page = fresh_page();
        let mut sp = SlottedPage::new(&mut page);

        let (slot0, unique0) = sp.insert(7, b"hello world");
        let (slot1, unique1) = sp.insert(-2, b"");

        assert_eq!(slot0, 0);
        assert_eq!(slot1, 1);
        assert!(unique1 > unique0);

        assert_eq!(sp.object_bytes(0), b"hello world");
        assert_eq!(sp.object_hdr(0).tag, 7);
        assert_eq!(sp.object_bytes(1), b"");
        assert_eq!(sp.object_hdr(1).length, 0);

        let expect_free =
            PAGE_HEADER_SIZE + OBJECT_HDR_SIZE + aligned_length(11) + OBJECT_HDR_SIZE;
        assert_eq!(sp.free(), expect_free);
        assert!(sp.space_accounted());
    }

    #[test]
    fn test_remove_middle_leaves_hole() {
        let mut page = fresh_page();
        let mut sp = SlottedPage::new(&mut page);

        sp.insert(0, &[1u8; 10]);
        sp.insert(0, &[2u8; 20]);
        sp.insert(0, &[3u8; 30]);
        let free_before = sp.free();

        sp.remove(1);

        assert_eq!(sp.n_slots(), 3);
        assert_eq!(sp.free(), free_before);
        assert_eq!(sp.unused(), OBJECT_HDR_SIZE + aligned_length(20));
        assert!(sp.slot(1).is_empty());
        assert_eq!(sp.object_bytes(2), &[3u8; 30]);
    }

    #[test]
    fn test_remove_last_returns_bytes_to_window() {
        let mut page = fresh_page();
        let mut sp = SlottedPage::new(&mut page);

        sp.insert(0, &[1u8; 10]);
        sp.insert(0, &[2u8; 20]);
        sp.insert(0, &[3u8; 30]);
        let free_before = sp.free();
        let unused_before = sp.unused();

        sp.remove(2);

        assert_eq!(sp.n_slots(), 2);
        assert_eq!(
            sp.free(),
            free_before - (OBJECT_HDR_SIZE + aligned_length(30))
        );
        assert_eq!(sp.unused(), unused_before);
    }

    #[test]
    fn test_remove_last_collapses_trailing_tombstones() {
        let mut page = fresh_page();
        let mut sp = SlottedPage::new(&mut page);

        sp.insert(0, &[1u8; 8]);
        sp.insert(0, &[2u8; 8]);
        sp.insert(0, &[3u8; 8]);

        sp.remove(1);
        assert_eq!(sp.n_slots(), 3);

        sp.remove(2);
        // Popping slot 2 exposes the tombstone at 1, which pops too.
        assert_eq!(sp.n_slots(), 1);
        assert_eq!(sp.object_bytes(0), &[1u8; 8]);
    }

    #[test]
    fn test_slot_index_reuse_gets_fresh_unique() {
        let mut page = fresh_page();
        let mut sp = SlottedPage::new(&mut page);

        sp.insert(0, b"a");
        let (_, old_unique) = sp.insert(0, b"b");
        sp.remove(1);
        let (slot_no, new_unique) = sp.insert(0, b"c");

        assert_eq!(slot_no, 1);
        assert!(new_unique > old_unique);
    }

    #[test]
    fn test_compact_squeezes_holes() {
        let mut page = fresh_page();
        let mut sp = SlottedPage::new(&mut page);

        sp.insert(0, &[1u8; 10]);
        sp.insert(0, &[2u8; 20]);
        sp.insert(0, &[3u8; 30]);
        sp.remove(1);
        let uniques = [sp.slot(0).unique, sp.slot(2).unique];

        sp.compact(None);

        assert_eq!(sp.unused(), 0);
        assert_eq!(sp.n_slots(), 3);
        assert_eq!(
            sp.free(),
            PAGE_HEADER_SIZE
                + OBJECT_HDR_SIZE
                + aligned_length(10)
                + OBJECT_HDR_SIZE
                + aligned_length(30)
        );
        assert_eq!(sp.object_bytes(0), &[1u8; 10]);
        assert_eq!(sp.object_bytes(2), &[3u8; 30]);
        assert_eq!(sp.slot(0).unique, uniques[0]);
        assert_eq!(sp.slot(2).unique, uniques[1]);
        assert!(sp.slot(1).is_empty());
    }

    #[test]
    fn test_compact_parks_pivot_last() {
        let mut page = fresh_page();
        let mut sp = SlottedPage::new(&mut page);

        sp.insert(0, &[1u8; 10]);
        sp.insert(0, &[2u8; 20]);
        sp.insert(0, &[3u8; 30]);

        sp.compact(Some(1));

        let pivot_record = OBJECT_HDR_SIZE + aligned_length(20);
        let slot = sp.slot(1);
        assert_eq!(slot.offset as usize, sp.free() - pivot_record);
        assert_eq!(sp.object_bytes(1), &[2u8; 20]);
        assert_eq!(sp.object_bytes(0), &[1u8; 10]);
        assert_eq!(sp.object_bytes(2), &[3u8; 30]);
    }

    #[test]
    fn test_remove_highest_slot_after_pivot_compaction() {
        // After a pivot compaction the highest slot index is no longer
        // the physically last record; its bytes must land in `unused`,
        // not fold into the window.
        let mut page = fresh_page();
        let mut sp = SlottedPage::new(&mut page);

        sp.insert(0, &[1u8; 10]);
        sp.insert(0, &[2u8; 20]);
        sp.insert(0, &[3u8; 30]);
        sp.compact(Some(1));

        sp.remove(2);

        assert_eq!(sp.n_slots(), 2);
        assert_eq!(sp.unused(), OBJECT_HDR_SIZE + aligned_length(30));
        assert_eq!(sp.object_bytes(1), &[2u8; 20]);
        assert!(sp.space_accounted());
    }

    #[test]
    fn test_compact_with_tombstoned_pivot_is_plain_compaction() {
        let mut page = fresh_page();
        let mut sp = SlottedPage::new(&mut page);

        sp.insert(0, &[1u8; 10]);
        sp.insert(0, &[2u8; 20]);
        sp.insert(0, &[3u8; 30]);
        sp.remove(1);

        sp.compact(Some(1));

        assert_eq!(sp.unused(), 0);
        assert_eq!(sp.object_bytes(0), &[1u8; 10]);
        assert_eq!(sp.object_bytes(2), &[3u8; 30]);
    }
}
