//! Slotted-page object storage engine.
//!
//! Variable-length byte objects live inside fixed-size slotted pages,
//! grouped per file into a doubly-linked page chain. Each file keeps a
//! directory of its pages bucketed by reclaimable space, so object
//! placement can reuse holes before growing the file.
//!
//! # Volume Format
//!
//! A volume is a single file of 4 KiB pages:
//!
//! - Page 0: volume header (magic, geometry, CRC32)
//! - Page 1: page allocation bitmap
//! - Page 2: catalog page (one record object per file)
//! - Remaining pages: data pages in per-file chains
//!
//! # Usage
//!
//! ```ignore
//! use engine::config::EngineConfig;
//! use engine::storage::{DeallocList, ObjectManager};
//!
//! let config = EngineConfig::from_env()?;
//! let mut om = ObjectManager::create(&path, &config)?;
//!
//! let file = om.create_file(100)?;
//! let oid = om.create_object(file, None, 0, b"payload")?;
//!
//! // Scan the file in order
//! let mut cur = None;
//! while let Some((oid, hdr)) = om.next_object(file, cur)? {
//!     cur = Some(oid);
//! }
//!
//! let mut dealloc = DeallocList::new();
//! om.destroy_object(file, oid, &mut dealloc)?;
//! ```

mod buffer;
mod catalog;
mod dealloc;
mod file_chain;
mod object;
mod object_manager;
mod page;
mod slotted;
mod space_list;
mod volume;

pub use buffer::{BufferError, BufferPool};
pub use catalog::{AVAIL_LISTS, CATALOG_ENTRY_SIZE, CatalogEntry};
pub use dealloc::{DeallocEntry, DeallocList};
pub use object::{
    LARGE_OBJECT_THRESHOLD, OBJECT_HDR_SIZE, ObjectHdr, ObjectId, WORD_SIZE, aligned_length,
};
pub use object_manager::{FileStats, ObjectManager, OmError, PageStats};
pub use page::{NIL_PAGE_NO, PAGE_SIZE, Page, PageId, PageNo};
pub use slotted::{EMPTY_SLOT, PAGE_HEADER_SIZE, PageKind, SLOT_SIZE, Slot, SlottedPage, is_nil};
pub use space_list::{size_class, threshold};
pub use volume::{EXTENT_SIZE, Volume, VolumeError};
