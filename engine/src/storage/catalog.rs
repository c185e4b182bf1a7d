//! File catalog entries.
//!
//! Each file's bookkeeping record lives as an object in the volume's
//! catalog page; the object's identifier is the handle every
//! object-manager operation takes. The record carries the file chain
//! anchors and the heads of the five available-space lists.
//!
//! # Record Format (36 bytes, little-endian)
//!
//! ```text
//! Offset   Size   Field
//! 0        4      file id
//! 4        2      extent fill factor (percent)
//! 6        2      padding (zero)
//! 8        4      first page in chain
//! 12       4      last page in chain
//! 16       20     available-space list heads (5 x page number)
//! ```

use crate::storage::object::ObjectId;
use crate::storage::page::PageNo;
use crate::storage::slotted::SlottedPage;

/// On-disk size of a catalog entry record.
pub const CATALOG_ENTRY_SIZE: usize = 36;

/// Number of available-space lists per file.
pub const AVAIL_LISTS: usize = 5;

/// A file's catalog record, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    /// File identifier, unique within the volume.
    pub fid: u32,
    /// Extent fill factor handed to the allocator (percent).
    pub eff: u16,
    /// First page of the file chain. Never deallocated.
    pub first_page: PageNo,
    /// Last page of the file chain.
    pub last_page: PageNo,
    /// Heads of the available-space lists, lowest size class first.
    pub avail_lists: [PageNo; AVAIL_LISTS],
}

impl CatalogEntry {
    /// Serialize to the on-disk record form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; CATALOG_ENTRY_SIZE] {
        let mut buf = [0u8; CATALOG_ENTRY_SIZE];
        buf[0..4].copy_from_slice(&self.fid.to_le_bytes());
        buf[4..6].copy_from_slice(&self.eff.to_le_bytes());
        buf[8..12].copy_from_slice(&self.first_page.to_le_bytes());
        buf[12..16].copy_from_slice(&self.last_page.to_le_bytes());
        for (i, head) in self.avail_lists.iter().enumerate() {
            let at = 16 + i * 4;
            buf[at..at + 4].copy_from_slice(&head.to_le_bytes());
        }
        buf
    }

    /// Deserialize from the on-disk record form.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut avail_lists = [0u32; AVAIL_LISTS];
        for (i, head) in avail_lists.iter_mut().enumerate() {
            let at = 16 + i * 4;
            *head = u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        }
        Self {
            fid: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            eff: u16::from_le_bytes([bytes[4], bytes[5]]),
            first_page: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            last_page: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            avail_lists,
        }
    }

    /// Decode the entry a catalog OID points at.
    ///
    /// Returns `None` when the OID does not reference a live,
    /// correctly stamped catalog record on this page.
    #[must_use]
    pub fn read_from(page: &SlottedPage<'_>, oid: &ObjectId) -> Option<Self> {
        if !page.is_catalog() || oid.slot_no >= page.n_slots() {
            return None;
        }
        let slot = page.slot(oid.slot_no);
        if slot.is_empty() || slot.unique != oid.unique {
            return None;
        }
        let hdr = page.object_hdr(oid.slot_no);
        if hdr.length as usize != CATALOG_ENTRY_SIZE {
            return None;
        }
        Some(Self::from_bytes(page.object_bytes(oid.slot_no)))
    }

    /// Write the entry back through a pinned catalog page.
    pub fn write_to(&self, page: &mut SlottedPage<'_>, oid: &ObjectId) {
        page.update_in_place(oid.slot_no, &self.to_bytes());
    }
}
