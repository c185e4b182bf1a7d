//! File page chains.
//!
//! A file's pages form a doubly-linked list threaded through the page
//! headers (`prev_page`/`next_page`), anchored by `first_page` and
//! `last_page` in the catalog entry. Scans walk it in order; placement
//! splices new pages next to their neighbours so locality survives.

use crate::storage::buffer::{BufferError, BufferPool};
use crate::storage::catalog::CatalogEntry;
use crate::storage::page::{NIL_PAGE_NO, PageId, PageNo};
use crate::storage::slotted::{SlottedPage, is_nil};
use crate::storage::volume::Volume;

/// Splice a pinned, freshly initialised page in right after `anchor`.
pub fn insert_after(
    pool: &mut BufferPool,
    volume: &mut Volume,
    entry: &mut CatalogEntry,
    anchor: PageNo,
    new_pid: PageId,
) -> Result<(), BufferError> {
    let anchor_pid = PageId::new(new_pid.volume, anchor);
    pool.pin(volume, anchor_pid)?;
    let old_next = SlottedPage::new(pool.page_mut(anchor_pid)?).next_page();
    SlottedPage::new(pool.page_mut(anchor_pid)?).set_next_page(new_pid.page_no);
    pool.mark_dirty(anchor_pid)?;
    pool.unpin(anchor_pid);

    {
        let mut sp = SlottedPage::new(pool.page_mut(new_pid)?);
        sp.set_prev_page(anchor);
        sp.set_next_page(old_next);
    }
    pool.mark_dirty(new_pid)?;

    if is_nil(old_next) {
        entry.last_page = new_pid.page_no;
    } else {
        let next_pid = PageId::new(new_pid.volume, old_next);
        pool.pin(volume, next_pid)?;
        SlottedPage::new(pool.page_mut(next_pid)?).set_prev_page(new_pid.page_no);
        pool.mark_dirty(next_pid)?;
        pool.unpin(next_pid);
    }
    Ok(())
}

/// Append a pinned, freshly initialised page at the chain tail.
///
/// An empty chain (only during file creation) makes the page both
/// anchors.
pub fn append(
    pool: &mut BufferPool,
    volume: &mut Volume,
    entry: &mut CatalogEntry,
    new_pid: PageId,
) -> Result<(), BufferError> {
    if is_nil(entry.last_page) {
        entry.first_page = new_pid.page_no;
        entry.last_page = new_pid.page_no;
        return Ok(());
    }
    insert_after(pool, volume, entry, entry.last_page, new_pid)
}

/// Detach a pinned page from the chain, fixing neighbours and anchors.
pub fn unlink(
    pool: &mut BufferPool,
    volume: &mut Volume,
    entry: &mut CatalogEntry,
    pid: PageId,
) -> Result<(), BufferError> {
    let (prev, next) = {
        let sp = SlottedPage::new(pool.page_mut(pid)?);
        (sp.prev_page(), sp.next_page())
    };

    if is_nil(prev) {
        debug_assert_eq!(entry.first_page, pid.page_no);
        entry.first_page = next;
    } else {
        let prev_pid = PageId::new(pid.volume, prev);
        pool.pin(volume, prev_pid)?;
        SlottedPage::new(pool.page_mut(prev_pid)?).set_next_page(next);
        pool.mark_dirty(prev_pid)?;
        pool.unpin(prev_pid);
    }

    if is_nil(next) {
        debug_assert_eq!(entry.last_page, pid.page_no);
        entry.last_page = prev;
    } else {
        let next_pid = PageId::new(pid.volume, next);
        pool.pin(volume, next_pid)?;
        SlottedPage::new(pool.page_mut(next_pid)?).set_prev_page(prev);
        pool.mark_dirty(next_pid)?;
        pool.unpin(next_pid);
    }

    let mut sp = SlottedPage::new(pool.page_mut(pid)?);
    sp.set_prev_page(NIL_PAGE_NO);
    sp.set_next_page(NIL_PAGE_NO);
    pool.mark_dirty(pid)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::catalog::AVAIL_LISTS;
    use crate::storage::slotted::PageKind;
    use tempfile::tempdir;

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

    fn chain(fx: &mut Fixture) -> Vec<PageNo> {
        let mut pages = Vec::new();
        let mut cur = fx.entry.first_page;
        while !is_nil(cur) {
            pages.push(cur);
            let pid = PageId::new(1, cur);
            fx.pool.pin(&mut fx.volume, pid).expect("pin");
            cur = SlottedPage::new(fx.pool.page_mut(pid).expect("page")).next_page();
            fx.pool.unpin(pid);
        }
        pages
    }

    #[test]
    fn test_append_builds_chain() {
        let dir = tempdir().expect("create temp dir");
        let mut fx = fixture(&dir);

        let a = fresh_data_page(&mut fx);
        let b = fresh_data_page(&mut fx);
        append(&mut fx.pool, &mut fx.volume, &mut fx.entry, a).expect("append");
        append(&mut fx.pool, &mut fx.volume, &mut fx.entry, b).expect("append");

        assert_eq!(fx.entry.first_page, a.page_no);
        assert_eq!(fx.entry.last_page, b.page_no);
        assert_eq!(chain(&mut fx), vec![a.page_no, b.page_no]);

        fx.pool.unpin(a);
        fx.pool.unpin(b);
    }

    #[test]
    fn test_insert_after_middle() {
        let dir = tempdir().expect("create temp dir");
        let mut fx = fixture(&dir);

        let a = fresh_data_page(&mut fx);
        let b = fresh_data_page(&mut fx);
        let c = fresh_data_page(&mut fx);
        append(&mut fx.pool, &mut fx.volume, &mut fx.entry, a).expect("append");
        append(&mut fx.pool, &mut fx.volume, &mut fx.entry, b).expect("append");
        insert_after(&mut fx.pool, &mut fx.volume, &mut fx.entry, a.page_no, c)
            .expect("insert_after");

        assert_eq!(chain(&mut fx), vec![a.page_no, c.page_no, b.page_no]);
        assert_eq!(fx.entry.last_page, b.page_no);

        for pid in [a, b, c] {
            fx.pool.unpin(pid);
        }
    }

    #[test]
    fn test_insert_after_tail_moves_anchor() {
        let dir = tempdir().expect("create temp dir");
        let mut fx = fixture(&dir);

        let a = fresh_data_page(&mut fx);
        let b = fresh_data_page(&mut fx);
        append(&mut fx.pool, &mut fx.volume, &mut fx.entry, a).expect("append");
        insert_after(&mut fx.pool, &mut fx.volume, &mut fx.entry, a.page_no, b)
            .expect("insert_after");

        assert_eq!(fx.entry.last_page, b.page_no);

        fx.pool.unpin(a);
        fx.pool.unpin(b);
    }

    #[test]
    fn test_unlink_middle_and_tail() {
        let dir = tempdir().expect("create temp dir");
        let mut fx = fixture(&dir);

        let a = fresh_data_page(&mut fx);
        let b = fresh_data_page(&mut fx);
        let c = fresh_data_page(&mut fx);
        for pid in [a, b, c] {
            append(&mut fx.pool, &mut fx.volume, &mut fx.entry, pid).expect("append");
        }

        unlink(&mut fx.pool, &mut fx.volume, &mut fx.entry, b).expect("unlink");
        assert_eq!(chain(&mut fx), vec![a.page_no, c.page_no]);

        unlink(&mut fx.pool, &mut fx.volume, &mut fx.entry, c).expect("unlink");
        assert_eq!(chain(&mut fx), vec![a.page_no]);
        assert_eq!(fx.entry.last_page, a.page_no);

        for pid in [a, b, c] {
            fx.pool.unpin(pid);
        }
    }
}
