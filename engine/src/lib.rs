#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )
)]
// An educational object storage engine:
//  - Objects are variable-length byte payloads addressed by stable
//    object identifiers (page, slot, unique stamp).
//  - Pages are 4 KiB slotted pages chained per file, with in-place
//    compaction when free space fragments.
//  - A per-file directory buckets pages by reclaimable space so new
//    objects reuse holes before the file grows.
//
// System components:
//  - Volume: one file of pages plus an extent-aware allocator
//  - Buffer pool: pinned frame cache between operations and the volume
//  - Object manager: create / destroy / fetch / ordered scans

pub mod config;
mod e2e_tests;
pub mod storage;

pub use storage::{DeallocList, ObjectHdr, ObjectId, ObjectManager, OmError};
