//! Object records and object identity.
//!
//! An object is a variable-length byte payload with a small fixed
//! header, stored inside a slotted page. Payloads are padded to a
//! word boundary so that records in the data region stay aligned.

use crate::storage::page::{PAGE_SIZE, PageId, PageNo};
use crate::storage::slotted::{PAGE_HEADER_SIZE, SLOT_SIZE};

/// Word size payloads are padded to.
pub const WORD_SIZE: usize = 8;

/// On-disk size of an object record header.
pub const OBJECT_HDR_SIZE: usize = 8;

/// Largest aligned payload that fits in a single page alongside the
/// page header, the record header, and one slot entry. Anything above
/// this belongs to a large-object store, which this engine does not
/// provide.
pub const LARGE_OBJECT_THRESHOLD: usize =
    PAGE_SIZE - PAGE_HEADER_SIZE - OBJECT_HDR_SIZE - SLOT_SIZE;

/// Round a payload length up to the next word boundary.
#[must_use]
pub const fn aligned_length(len: usize) -> usize {
    len.div_ceil(WORD_SIZE) * WORD_SIZE
}

/// Object record header, stored immediately before the payload.
///
/// Layout (8 bytes, little-endian):
///
/// ```text
/// Offset   Size   Field
/// 0        4      length (i32, payload bytes before padding)
/// 4        2      tag (i16, caller-defined)
/// 6        1      properties (u8)
/// 7        1      padding (zero)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHdr {
    /// Payload length in bytes, before word padding.
    pub length: u32,
    /// Caller-defined type tag.
    pub tag: i16,
    /// Property bits. Always zero in this engine; reserved for
    /// forwarded/large-object markers in the full system.
    pub properties: u8,
}

impl ObjectHdr {
    /// Create a header for a fresh object.
    #[must_use]
    pub const fn new(length: u32, tag: i16) -> Self {
        Self {
            length,
            tag,
            properties: 0,
        }
    }

    /// Serialize the header to its on-disk form.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)] // lengths are bounded by PAGE_SIZE
    pub fn to_bytes(self) -> [u8; OBJECT_HDR_SIZE] {
        let mut buf = [0u8; OBJECT_HDR_SIZE];
        buf[0..4].copy_from_slice(&(self.length as i32).to_le_bytes());
        buf[4..6].copy_from_slice(&self.tag.to_le_bytes());
        buf[6] = self.properties;
        buf
    }

    /// Deserialize a header from its on-disk form.
    #[must_use]
    #[allow(clippy::cast_sign_loss)] // lengths are written non-negative
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let length = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u32;
        let tag = i16::from_le_bytes([bytes[4], bytes[5]]);
        Self {
            length,
            tag,
            properties: bytes[6],
        }
    }

    /// Total bytes the record occupies in the data region.
    #[must_use]
    pub const fn record_size(&self) -> usize {
        OBJECT_HDR_SIZE + aligned_length(self.length as usize)
    }
}

/// Identity of an object: its page plus the slot index and the slot's
/// unique stamp.
///
/// The `unique` field detects stale identifiers: if the slot has been
/// collapsed and reused since this OID was issued, the stamp no longer
/// matches and lookups fail instead of returning the wrong object.
/// OIDs are dense indices, not pointers; they survive in-page
/// compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    /// Volume holding the page.
    pub volume: u32,
    /// Page number within the volume.
    pub page_no: PageNo,
    /// Slot index within the page.
    pub slot_no: u16,
    /// Unique stamp assigned when the slot was written.
    pub unique: u32,
}

impl ObjectId {
    /// Create an object identity.
    #[must_use]
    pub const fn new(volume: u32, page_no: PageNo, slot_no: u16, unique: u32) -> Self {
        Self {
            volume,
            page_no,
            slot_no,
            unique,
        }
    }

    /// The page this object lives on.
    #[must_use]
    pub const fn page_id(&self) -> PageId {
        PageId::new(self.volume, self.page_no)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}#{}",
            self.volume, self.page_no, self.slot_no, self.unique
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_length() {
        assert_eq!(aligned_length(0), 0);
        assert_eq!(aligned_length(1), 8);
        assert_eq!(aligned_length(8), 8);
        assert_eq!(aligned_length(9), 16);
        assert_eq!(aligned_length(20), 24);
    }

    #[test]
    fn test_header_roundtrip() {
        let hdr = ObjectHdr::new(20, -3);
        let bytes = hdr.to_bytes();
        let restored = ObjectHdr::from_bytes(&bytes);

        assert_eq!(restored, hdr);
        assert_eq!(restored.record_size(), OBJECT_HDR_SIZE + 24);
    }

    #[test]
    fn test_threshold_leaves_room_for_one_max_object() {
        // A maximal object plus its slot must exactly fill a fresh page.
        assert_eq!(
            PAGE_HEADER_SIZE + OBJECT_HDR_SIZE + LARGE_OBJECT_THRESHOLD + SLOT_SIZE,
            PAGE_SIZE
        );
    }

    #[test]
    fn test_object_id_display() {
        let oid = ObjectId::new(1, 7, 3, 99);
        assert_eq!(oid.to_string(), "1:7:3#99");
    }
}
