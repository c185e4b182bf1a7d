//! End-to-end tests at the object-manager operation level.
//!
//! Each test file covers a specific scenario, using deterministic
//! inputs to verify placement, removal, compaction, and scan behaviour
//! against a real on-disk volume.

#![cfg(test)]

mod helpers;

mod test_append_and_scan;
mod test_bucket_reuse;
mod test_compaction_on_insert;
mod test_empty_page_dealloc;
mod test_first_page_persists;
mod test_middle_delete;
mod test_near_placement;
mod test_pivot_compaction;
mod test_random_workload;
mod test_scan_round_trip;
mod test_stale_oid;
mod test_tail_delete;
