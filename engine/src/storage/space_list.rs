//! Per-file available-space directory.
//!
//! Every file keeps five doubly-linked lists of its pages, grouped by
//! how many reclaimable bytes a page has. The lists are intrusive: the
//! links live in the page headers (`space_prev`/`space_next`) and the
//! heads in the file's catalog entry. A page with at least 10% of the
//! page size reclaimable sits in the highest bucket whose threshold it
//! meets; pages below 10% are listed nowhere.
//!
//! Callers bracket any mutation that changes a page's reclaimable
//! bytes with [`remove_from_space_list`] / [`insert_into_space_list`]
//! so membership always reflects the current size class.

use crate::storage::buffer::{BufferError, BufferPool};
use crate::storage::catalog::{AVAIL_LISTS, CatalogEntry};
use crate::storage::page::{NIL_PAGE_NO, PAGE_SIZE, PageId, PageNo};
use crate::storage::slotted::{SlottedPage, is_nil};
use crate::storage::volume::Volume;

/// Free-byte threshold of size class `k` (0-based).
#[must_use]
pub const fn threshold(class: usize) -> usize {
    (class + 1) * PAGE_SIZE / 10
}

/// Size class of a page with `total_free` reclaimable bytes, or `None`
/// when the page is too full to list.
#[must_use]
pub fn size_class(total_free: usize) -> Option<usize> {
    (0..AVAIL_LISTS).rev().find(|&k| total_free >= threshold(k))
}

/// Head of the first list that guarantees room for `needed` bytes.
///
/// Buckets are scanned in ascending threshold order; a page in bucket
/// `k` has at least `threshold(k)` bytes reclaimable, so the threshold
/// itself is the qualification test.
#[must_use]
pub fn pick_bucket(entry: &CatalogEntry, needed: usize) -> Option<PageNo> {
    (0..AVAIL_LISTS)
        .filter(|&k| needed <= threshold(k))
        .map(|k| entry.avail_lists[k])
        .find(|&head| !is_nil(head))
}

/// Link a pinned page into the list matching its current size class.
///
/// No-op (beyond clearing the links) for pages too full to list.
pub fn insert_into_space_list(
    pool: &mut BufferPool,
    volume: &mut Volume,
    entry: &mut CatalogEntry,
    pid: PageId,
) -> Result<(), BufferError> {
    let total_free = SlottedPage::new(pool.page_mut(pid)?).total_free();
    let Some(class) = size_class(total_free) else {
        let mut sp = SlottedPage::new(pool.page_mut(pid)?);
        sp.set_space_prev(NIL_PAGE_NO);
        sp.set_space_next(NIL_PAGE_NO);
        pool.mark_dirty(pid)?;
        return Ok(());
    };

    let head = entry.avail_lists[class];
    if !is_nil(head) {
        let head_pid = PageId::new(pid.volume, head);
        pool.pin(volume, head_pid)?;
        SlottedPage::new(pool.page_mut(head_pid)?).set_space_prev(pid.page_no);
        pool.mark_dirty(head_pid)?;
        pool.unpin(head_pid);
    }

    let mut sp = SlottedPage::new(pool.page_mut(pid)?);
    sp.set_space_prev(NIL_PAGE_NO);
    sp.set_space_next(head);
    pool.mark_dirty(pid)?;
    entry.avail_lists[class] = pid.page_no;
    Ok(())
}

/// Unlink a pinned page from the list matching its current size class.
///
/// Must run before any mutation that changes the page's reclaimable
/// bytes. No-op for pages too full to be listed.
pub fn remove_from_space_list(
    pool: &mut BufferPool,
    volume: &mut Volume,
    entry: &mut CatalogEntry,
    pid: PageId,
) -> Result<(), BufferError> {
    let (total_free, prev, next) = {
        let sp = SlottedPage::new(pool.page_mut(pid)?);
        (sp.total_free(), sp.space_prev(), sp.space_next())
    };
    let Some(class) = size_class(total_free) else {
        return Ok(());
    };

    if is_nil(prev) {
        debug_assert_eq!(entry.avail_lists[class], pid.page_no);
        entry.avail_lists[class] = next;
    } else {
        let prev_pid = PageId::new(pid.volume, prev);
        pool.pin(volume, prev_pid)?;
        SlottedPage::new(pool.page_mut(prev_pid)?).set_space_next(next);
        pool.mark_dirty(prev_pid)?;
        pool.unpin(prev_pid);
    }

    if !is_nil(next) {
        let next_pid = PageId::new(pid.volume, next);
        pool.pin(volume, next_pid)?;
        SlottedPage::new(pool.page_mut(next_pid)?).set_space_prev(prev);
        pool.mark_dirty(next_pid)?;
        pool.unpin(next_pid);
    }

    let mut sp = SlottedPage::new(pool.page_mut(pid)?);
    sp.set_space_prev(NIL_PAGE_NO);
    sp.set_space_next(NIL_PAGE_NO);
    pool.mark_dirty(pid)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::slotted::PageKind;
    use tempfile::tempdir;

    #[test]
    fn test_thresholds() {
        assert_eq!(threshold(0), PAGE_SIZE / 10);
        assert_eq!(threshold(4), PAGE_SIZE / 2);
    }

    #[test]
    fn test_size_class_boundaries() {
        assert_eq!(size_class(0), None);
        assert_eq!(size_class(threshold(0) - 1), None);
        assert_eq!(size_class(threshold(0)), Some(0));
        assert_eq!(size_class(threshold(2)), Some(2));
        assert_eq!(size_class(threshold(4)), Some(4));
        // Nearly empty pages sit in the highest class that exists.
        assert_eq!(size_class(PAGE_SIZE), Some(4));
    }

    #[test]
    fn test_pick_bucket_ascending() {
        let mut entry = CatalogEntry {
            fid: 1,
            eff: 100,
            first_page: 0,
            last_page: 0,
            avail_lists: [0; AVAIL_LISTS],
        };
        entry.avail_lists[2] = 7;
        entry.avail_lists[4] = 9;

        // Small requests take the lowest qualifying non-empty bucket.
        assert_eq!(pick_bucket(&entry, 10), Some(7));
        // Requests above the 30% threshold skip to the 50% list.
        assert_eq!(pick_bucket(&entry, threshold(2) + 1), Some(9));
        // Requests no bucket can guarantee find nothing.
        assert_eq!(pick_bucket(&entry, threshold(4) + 1), None);
    }

    struct Fixture {
        volume: Volume,
        pool: BufferPool,
        entry: CatalogEntry,
    }

    fn fixture(dir: &tempfile::TempDir) -> Fixture {
        let volume = Volume::format(&dir.path().join("test.vol"), 1, 64).expect("format");
        Fixture {
            volume,
            pool: BufferPool::new(8),
            entry: CatalogEntry {
                fid: 1,
                eff: 100,
                first_page: 0,
                last_page: 0,
                avail_lists: [0; AVAIL_LISTS],
            },
        }
    }

    fn fresh_data_page(fx: &mut Fixture) -> PageId {
        let page_no = fx.volume.alloc_train(None, 100).expect("alloc");
        let pid = PageId::new(fx.volume.volume_id(), page_no);
        fx.pool.pin_new(&mut fx.volume, pid).expect("pin_new");
        SlottedPage::init(
            fx.pool.page_mut(pid).expect("page"),
            pid,
            PageKind::Data,
        );
        fx.pool.mark_dirty(pid).expect("dirty");
        pid
    }

    #[test]
    fn test_insert_links_at_head() {
        let dir = tempdir().expect("create temp dir");
        let mut fx = fixture(&dir);

        let a = fresh_data_page(&mut fx);
        let b = fresh_data_page(&mut fx);
        insert_into_space_list(&mut fx.pool, &mut fx.volume, &mut fx.entry, a).expect("insert");
        insert_into_space_list(&mut fx.pool, &mut fx.volume, &mut fx.entry, b).expect("insert");

        // Fresh pages are nearly empty, so both land in the top class.
        assert_eq!(fx.entry.avail_lists[4], b.page_no);
        let sp_b = SlottedPage::new(fx.pool.page_mut(b).expect("page"));
        assert_eq!(sp_b.space_next(), a.page_no);
        let sp_a = SlottedPage::new(fx.pool.page_mut(a).expect("page"));
        assert_eq!(sp_a.space_prev(), b.page_no);

        fx.pool.unpin(a);
        fx.pool.unpin(b);
    }

    #[test]
    fn test_remove_middle_and_head() {
        let dir = tempdir().expect("create temp dir");
        let mut fx = fixture(&dir);

        let a = fresh_data_page(&mut fx);
        let b = fresh_data_page(&mut fx);
        let c = fresh_data_page(&mut fx);
        for pid in [a, b, c] {
            insert_into_space_list(&mut fx.pool, &mut fx.volume, &mut fx.entry, pid)
                .expect("insert");
        }
        // List is now c -> b -> a.

        remove_from_space_list(&mut fx.pool, &mut fx.volume, &mut fx.entry, b).expect("remove");
        assert_eq!(fx.entry.avail_lists[4], c.page_no);
        {
            let sp_c = SlottedPage::new(fx.pool.page_mut(c).expect("page"));
            assert_eq!(sp_c.space_next(), a.page_no);
        }

        remove_from_space_list(&mut fx.pool, &mut fx.volume, &mut fx.entry, c).expect("remove");
        assert_eq!(fx.entry.avail_lists[4], a.page_no);
        {
            let sp_a = SlottedPage::new(fx.pool.page_mut(a).expect("page"));
            assert_eq!(sp_a.space_prev(), NIL_PAGE_NO);
        }

        remove_from_space_list(&mut fx.pool, &mut fx.volume, &mut fx.entry, a).expect("remove");
        assert_eq!(fx.entry.avail_lists[4], NIL_PAGE_NO);

        for pid in [a, b, c] {
            fx.pool.unpin(pid);
        }
    }
}
