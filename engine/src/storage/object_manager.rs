//! The object manager: create, destroy, fetch, and ordered scans over
//! variable-length objects stored in slotted pages.
//!
//! # Placement
//!
//! A new object lands on (in order of preference):
//!
//! 1. the page holding a caller-supplied near object, when its total
//!    reclaimable space suffices (compacting first if the contiguous
//!    window is short);
//! 2. a fresh page from the near page's extent, spliced into the chain
//!    right after it, when the near page is too full;
//! 3. without a near hint, the head of the first available-space
//!    bucket whose threshold covers the request;
//! 4. a fresh page appended at the chain tail.
//!
//! Compaction runs only when an insert cannot fit contiguously, so its
//! cost amortises into the allocations that need it.
//!
//! # Pinning
//!
//! Every operation pins the file's catalog page for its duration and
//! data pages one at a time; each pin is released on every exit path.

use std::path::Path;

use crate::config::EngineConfig;
use crate::storage::buffer::{BufferError, BufferPool};
use crate::storage::catalog::{AVAIL_LISTS, CATALOG_ENTRY_SIZE, CatalogEntry};
use crate::storage::dealloc::DeallocList;
use crate::storage::file_chain::{append, insert_after, unlink};
use crate::storage::object::{
    LARGE_OBJECT_THRESHOLD, OBJECT_HDR_SIZE, ObjectHdr, ObjectId, aligned_length,
};
use crate::storage::page::{NIL_PAGE_NO, PageId, PageNo};
use crate::storage::slotted::{PAGE_HEADER_SIZE, PageKind, SLOT_SIZE, SlottedPage, is_nil};
use crate::storage::space_list::{
    insert_into_space_list, pick_bucket, remove_from_space_list, size_class,
};
use crate::storage::volume::{Volume, VolumeError};

/// Volume identifier for single-volume deployments.
const VOLUME_ID: u32 = 1;

/// Pages a fresh volume starts with.
const INITIAL_PAGES: u32 = 64;

/// One step of a chain scan.
enum ScanStep {
    Found(ObjectId, ObjectHdr),
    End,
    Advance(PageNo),
}

/// Space bookkeeping of one page, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStats {
    /// Slot entries, tombstones included.
    pub n_slots: u16,
    /// Offset of the first unoccupied data byte.
    pub free: usize,
    /// Hole bytes awaiting compaction.
    pub unused: usize,
    /// Contiguous free bytes.
    pub free_window: usize,
    /// Contiguous plus hole bytes.
    pub total_free: usize,
}

/// Result of a file integrity walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    /// Pages in the file chain.
    pub pages: u32,
    /// Live objects across the chain.
    pub objects: u64,
}

/// What a chain walk learned about one page.
struct PageCheck {
    next: PageNo,
    class: Option<usize>,
    live: u64,
}

/// The storage engine's object layer over one volume.
pub struct ObjectManager {
    volume: Volume,
    pool: BufferPool,
}

impl ObjectManager {
    /// Create a new volume at `path` and open an object manager on it.
    pub fn create(path: &Path, config: &EngineConfig) -> Result<Self, OmError> {
        let mut volume = Volume::format(path, VOLUME_ID, INITIAL_PAGES)?;
        let mut pool = BufferPool::new(config.pool_capacity);

        let cat_pid = PageId::new(volume.volume_id(), volume.catalog_page());
        pool.pin_new(&mut volume, cat_pid)?;
        SlottedPage::init(pool.page_mut(cat_pid)?, cat_pid, PageKind::Catalog);
        pool.mark_dirty(cat_pid)?;
        pool.unpin(cat_pid);

        let mut manager = Self { volume, pool };
        manager.flush()?;
        Ok(manager)
    }

    /// Open an object manager on an existing volume.
    pub fn open(path: &Path, config: &EngineConfig) -> Result<Self, OmError> {
        let volume = Volume::open(path)?;
        Ok(Self {
            volume,
            pool: BufferPool::new(config.pool_capacity),
        })
    }

    /// Write all cached dirty pages and the volume metadata to disk.
    pub fn flush(&mut self) -> Result<(), OmError> {
        self.pool.flush(&mut self.volume)?;
        self.volume.sync()?;
        Ok(())
    }

    /// The underlying volume.
    #[must_use]
    pub const fn volume(&self) -> &Volume {
        &self.volume
    }

    /// The buffer pool.
    #[must_use]
    pub const fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Create a new file and return its catalog object identifier.
    ///
    /// The file starts with one (never-deallocated) page. `eff` is the
    /// extent fill factor passed to the allocator, in percent.
    pub fn create_file(&mut self, eff: u16) -> Result<ObjectId, OmError> {
        let eff = eff.clamp(1, 100);
        let first = self.alloc_data_page(None, eff)?;

        let mut entry = CatalogEntry {
            fid: self.volume.take_file_id(),
            eff,
            first_page: first.page_no,
            last_page: first.page_no,
            avail_lists: [NIL_PAGE_NO; AVAIL_LISTS],
        };
        let listed = insert_into_space_list(&mut self.pool, &mut self.volume, &mut entry, first);
        self.pool.unpin(first);
        listed?;

        let cat_pid = PageId::new(self.volume.volume_id(), self.volume.catalog_page());
        self.pool.pin(&mut self.volume, cat_pid)?;
        let result = self.insert_catalog_entry(cat_pid, &entry);
        self.pool.unpin(cat_pid);
        let oid = result?;

        tracing::debug!(fid = entry.fid, first_page = first.page_no, "created file");
        Ok(oid)
    }

    fn insert_catalog_entry(
        &mut self,
        cat_pid: PageId,
        entry: &CatalogEntry,
    ) -> Result<ObjectId, OmError> {
        let needed = OBJECT_HDR_SIZE + aligned_length(CATALOG_ENTRY_SIZE) + SLOT_SIZE;
        {
            let mut sp = SlottedPage::new(self.pool.page_mut(cat_pid)?);
            if needed > sp.free_window() {
                if needed > sp.total_free() {
                    return Err(OmError::CatalogFull);
                }
                sp.compact(None);
            }
        }
        let (slot_no, unique) = {
            let mut sp = SlottedPage::new(self.pool.page_mut(cat_pid)?);
            sp.insert(0, &entry.to_bytes())
        };
        self.pool.mark_dirty(cat_pid)?;
        Ok(ObjectId::new(cat_pid.volume, cat_pid.page_no, slot_no, unique))
    }

    /// Create an object in `file`, optionally near an existing object.
    ///
    /// Returns the new object's identifier. The payload's aligned
    /// length must not exceed [`LARGE_OBJECT_THRESHOLD`].
    pub fn create_object(
        &mut self,
        file: ObjectId,
        near: Option<ObjectId>,
        tag: i16,
        data: &[u8],
    ) -> Result<ObjectId, OmError> {
        let aligned = aligned_length(data.len());
        if aligned > LARGE_OBJECT_THRESHOLD {
            return Err(OmError::ObjectTooLarge { aligned });
        }
        let needed = OBJECT_HDR_SIZE + aligned + SLOT_SIZE;

        let cat_pid = self.catalog_pid(&file)?;
        self.pool.pin(&mut self.volume, cat_pid)?;
        let result = self.create_object_pinned(&file, cat_pid, near.as_ref(), tag, data, needed);
        self.pool.unpin(cat_pid);
        result
    }

    fn create_object_pinned(
        &mut self,
        file: &ObjectId,
        cat_pid: PageId,
        near: Option<&ObjectId>,
        tag: i16,
        data: &[u8],
        needed: usize,
    ) -> Result<ObjectId, OmError> {
        let mut entry = self.read_entry(cat_pid, file)?;

        let target = self.choose_target(&mut entry, near, needed)?;
        let written = self.write_object(&mut entry, target, tag, data);
        self.pool.unpin(target);
        let (slot_no, unique) = written?;

        self.write_entry(cat_pid, file, &entry)?;

        let oid = ObjectId::new(target.volume, target.page_no, slot_no, unique);
        tracing::debug!(oid = %oid, fid = entry.fid, len = data.len(), "created object");
        Ok(oid)
    }

    /// Pick and pin the page the new object goes to. On success the
    /// returned page is pinned, unlisted, and has a contiguous window
    /// big enough for `needed`.
    fn choose_target(
        &mut self,
        entry: &mut CatalogEntry,
        near: Option<&ObjectId>,
        needed: usize,
    ) -> Result<PageId, OmError> {
        if let Some(near) = near {
            if near.volume != self.volume.volume_id() {
                return Err(OmError::BadObjectId);
            }
            let near_pid = near.page_id();
            self.pool.pin(&mut self.volume, near_pid)?;

            let total_free = SlottedPage::new(self.pool.page_mut(near_pid)?).total_free();
            if needed <= total_free {
                match self.prepare_target(entry, near_pid, needed) {
                    Ok(()) => return Ok(near_pid),
                    Err(e) => {
                        self.pool.unpin(near_pid);
                        return Err(e);
                    }
                }
            }

            // Near page is full: new page from the same extent, spliced
            // right behind it so locality survives.
            let spliced = self.splice_new_after(entry, near_pid.page_no);
            self.pool.unpin(near_pid);
            return spliced;
        }

        if let Some(head) = pick_bucket(entry, needed) {
            let pid = PageId::new(self.volume.volume_id(), head);
            self.pool.pin(&mut self.volume, pid)?;
            return match self.prepare_target(entry, pid, needed) {
                Ok(()) => Ok(pid),
                Err(e) => {
                    self.pool.unpin(pid);
                    Err(e)
                }
            };
        }

        let near_hint = (!is_nil(entry.first_page)).then_some(entry.first_page);
        let new_pid = self.alloc_data_page(near_hint, entry.eff)?;
        if let Err(e) = append(&mut self.pool, &mut self.volume, entry, new_pid) {
            self.pool.unpin(new_pid);
            return Err(e.into());
        }
        Ok(new_pid)
    }

    /// Unlist a pinned target page and compact it if the request does
    /// not fit the contiguous window.
    fn prepare_target(
        &mut self,
        entry: &mut CatalogEntry,
        pid: PageId,
        needed: usize,
    ) -> Result<(), OmError> {
        remove_from_space_list(&mut self.pool, &mut self.volume, entry, pid)?;
        let needs_compaction = {
            let sp = SlottedPage::new(self.pool.page_mut(pid)?);
            needed > sp.free_window()
        };
        if needs_compaction {
            SlottedPage::new(self.pool.page_mut(pid)?).compact(None);
            self.pool.mark_dirty(pid)?;
            tracing::trace!(page = %pid, "compacted page for insert");
        }
        Ok(())
    }

    fn splice_new_after(
        &mut self,
        entry: &mut CatalogEntry,
        anchor: PageNo,
    ) -> Result<PageId, OmError> {
        let new_pid = self.alloc_data_page(Some(anchor), entry.eff)?;
        if let Err(e) = insert_after(&mut self.pool, &mut self.volume, entry, anchor, new_pid) {
            self.pool.unpin(new_pid);
            return Err(e.into());
        }
        Ok(new_pid)
    }

    /// Allocate, pin, and initialise a fresh data page.
    fn alloc_data_page(&mut self, near: Option<PageNo>, eff: u16) -> Result<PageId, OmError> {
        let page_no = self.volume.alloc_train(near, eff)?;
        let pid = PageId::new(self.volume.volume_id(), page_no);
        if let Err(e) = self.pool.pin_new(&mut self.volume, pid) {
            self.volume.free_page(page_no);
            return Err(e.into());
        }
        SlottedPage::init(self.pool.page_mut(pid)?, pid, PageKind::Data);
        self.pool.mark_dirty(pid)?;
        Ok(pid)
    }

    /// Append the record into a prepared page and relist the page.
    fn write_object(
        &mut self,
        entry: &mut CatalogEntry,
        pid: PageId,
        tag: i16,
        data: &[u8],
    ) -> Result<(u16, u32), OmError> {
        let (slot_no, unique) = {
            let mut sp = SlottedPage::new(self.pool.page_mut(pid)?);
            sp.insert(tag, data)
        };
        self.pool.mark_dirty(pid)?;
        insert_into_space_list(&mut self.pool, &mut self.volume, entry, pid)?;
        Ok((slot_no, unique))
    }

    /// Destroy an object, reclaiming its space.
    ///
    /// A page emptied by the destroy is unlinked from the file chain
    /// and queued on `dealloc`, unless it is the file's first page,
    /// which survives for the file's lifetime.
    pub fn destroy_object(
        &mut self,
        file: ObjectId,
        oid: ObjectId,
        dealloc: &mut DeallocList,
    ) -> Result<(), OmError> {
        let cat_pid = self.catalog_pid(&file)?;
        self.pool.pin(&mut self.volume, cat_pid)?;
        let result = self.destroy_object_pinned(&file, cat_pid, &oid, dealloc);
        self.pool.unpin(cat_pid);
        result
    }

    fn destroy_object_pinned(
        &mut self,
        file: &ObjectId,
        cat_pid: PageId,
        oid: &ObjectId,
        dealloc: &mut DeallocList,
    ) -> Result<(), OmError> {
        let mut entry = self.read_entry(cat_pid, file)?;
        if oid.volume != self.volume.volume_id() {
            return Err(OmError::BadObjectId);
        }

        let pid = oid.page_id();
        self.pool.pin(&mut self.volume, pid)?;
        let result = self.destroy_in_page(&mut entry, oid, pid, dealloc);
        self.pool.unpin(pid);
        result?;

        self.write_entry(cat_pid, file, &entry)?;
        Ok(())
    }

    fn destroy_in_page(
        &mut self,
        entry: &mut CatalogEntry,
        oid: &ObjectId,
        pid: PageId,
        dealloc: &mut DeallocList,
    ) -> Result<(), OmError> {
        {
            let sp = SlottedPage::new(self.pool.page_mut(pid)?);
            if sp.is_catalog() || oid.slot_no >= sp.n_slots() {
                return Err(OmError::BadObjectId);
            }
            let slot = sp.slot(oid.slot_no);
            if slot.is_empty() || slot.unique != oid.unique {
                return Err(OmError::BadObjectId);
            }
        }

        remove_from_space_list(&mut self.pool, &mut self.volume, entry, pid)?;
        let n_slots = {
            let mut sp = SlottedPage::new(self.pool.page_mut(pid)?);
            sp.remove(oid.slot_no);
            sp.n_slots()
        };
        self.pool.mark_dirty(pid)?;

        if n_slots == 0 && pid.page_no != entry.first_page {
            unlink(&mut self.pool, &mut self.volume, entry, pid)?;
            dealloc.push_page(pid);
            tracing::debug!(page = %pid, fid = entry.fid, "emptied page queued for dealloc");
        } else {
            insert_into_space_list(&mut self.pool, &mut self.volume, entry, pid)?;
        }

        tracing::debug!(oid = %oid, fid = entry.fid, "destroyed object");
        Ok(())
    }

    /// Read an object's header and payload.
    pub fn fetch_object(&mut self, oid: ObjectId) -> Result<(ObjectHdr, Vec<u8>), OmError> {
        if oid.volume != self.volume.volume_id() {
            return Err(OmError::BadObjectId);
        }
        let pid = oid.page_id();
        self.pool.pin(&mut self.volume, pid)?;
        let result = self.fetch_pinned(&oid, pid);
        self.pool.unpin(pid);
        result
    }

    fn fetch_pinned(&mut self, oid: &ObjectId, pid: PageId) -> Result<(ObjectHdr, Vec<u8>), OmError> {
        let sp = SlottedPage::new(self.pool.page_mut(pid)?);
        if sp.is_catalog() || oid.slot_no >= sp.n_slots() {
            return Err(OmError::BadObjectId);
        }
        let slot = sp.slot(oid.slot_no);
        if slot.is_empty() || slot.unique != oid.unique {
            return Err(OmError::BadObjectId);
        }
        Ok((sp.object_hdr(oid.slot_no), sp.object_bytes(oid.slot_no).to_vec()))
    }

    /// Next object of the file in chain order, skipping tombstones.
    ///
    /// With no cursor the scan starts at the file's first object;
    /// `Ok(None)` marks the end of the scan.
    pub fn next_object(
        &mut self,
        file: ObjectId,
        cur: Option<ObjectId>,
    ) -> Result<Option<(ObjectId, ObjectHdr)>, OmError> {
        let cat_pid = self.catalog_pid(&file)?;
        self.pool.pin(&mut self.volume, cat_pid)?;
        let result = self.next_pinned(&file, cat_pid, cur.as_ref());
        self.pool.unpin(cat_pid);
        result
    }

    fn next_pinned(
        &mut self,
        file: &ObjectId,
        cat_pid: PageId,
        cur: Option<&ObjectId>,
    ) -> Result<Option<(ObjectId, ObjectHdr)>, OmError> {
        let entry = self.read_entry(cat_pid, file)?;
        let (mut page_no, mut start) = match cur {
            None => (entry.first_page, 0),
            Some(c) => {
                if c.volume != self.volume.volume_id() {
                    return Err(OmError::BadObjectId);
                }
                (c.page_no, c.slot_no + 1)
            }
        };
        if is_nil(page_no) {
            return Ok(None);
        }

        loop {
            let pid = PageId::new(self.volume.volume_id(), page_no);
            self.pool.pin(&mut self.volume, pid)?;
            let step = self.scan_page_forward(pid, start, &entry);
            self.pool.unpin(pid);
            match step? {
                ScanStep::Found(oid, hdr) => return Ok(Some((oid, hdr))),
                ScanStep::End => return Ok(None),
                ScanStep::Advance(next) => {
                    if is_nil(next) {
                        return Ok(None);
                    }
                    page_no = next;
                    start = 0;
                }
            }
        }
    }

    fn scan_page_forward(
        &mut self,
        pid: PageId,
        start: u16,
        entry: &CatalogEntry,
    ) -> Result<ScanStep, OmError> {
        let sp = SlottedPage::new(self.pool.page_mut(pid)?);
        if sp.is_catalog() {
            return Err(OmError::BadObjectId);
        }
        for i in start..sp.n_slots() {
            let slot = sp.slot(i);
            if slot.is_empty() {
                continue;
            }
            let oid = ObjectId::new(pid.volume, pid.page_no, i, slot.unique);
            return Ok(ScanStep::Found(oid, sp.object_hdr(i)));
        }
        if pid.page_no == entry.last_page {
            Ok(ScanStep::End)
        } else {
            Ok(ScanStep::Advance(sp.next_page()))
        }
    }

    /// Previous object of the file in chain order, skipping tombstones.
    ///
    /// With no cursor the scan starts at the file's last object;
    /// `Ok(None)` marks the end of the scan.
    pub fn prev_object(
        &mut self,
        file: ObjectId,
        cur: Option<ObjectId>,
    ) -> Result<Option<(ObjectId, ObjectHdr)>, OmError> {
        let cat_pid = self.catalog_pid(&file)?;
        self.pool.pin(&mut self.volume, cat_pid)?;
        let result = self.prev_pinned(&file, cat_pid, cur.as_ref());
        self.pool.unpin(cat_pid);
        result
    }

    fn prev_pinned(
        &mut self,
        file: &ObjectId,
        cat_pid: PageId,
        cur: Option<&ObjectId>,
    ) -> Result<Option<(ObjectId, ObjectHdr)>, OmError> {
        let entry = self.read_entry(cat_pid, file)?;
        // `bound` is exclusive: slots below it are still unseen.
        let (mut page_no, mut bound) = match cur {
            None => (entry.last_page, None),
            Some(c) => {
                if c.volume != self.volume.volume_id() {
                    return Err(OmError::BadObjectId);
                }
                (c.page_no, Some(c.slot_no))
            }
        };
        if is_nil(page_no) {
            return Ok(None);
        }

        loop {
            let pid = PageId::new(self.volume.volume_id(), page_no);
            self.pool.pin(&mut self.volume, pid)?;
            let step = self.scan_page_backward(pid, bound, &entry);
            self.pool.unpin(pid);
            match step? {
                ScanStep::Found(oid, hdr) => return Ok(Some((oid, hdr))),
                ScanStep::End => return Ok(None),
                ScanStep::Advance(prev) => {
                    if is_nil(prev) {
                        return Ok(None);
                    }
                    page_no = prev;
                    bound = None;
                }
            }
        }
    }

    fn scan_page_backward(
        &mut self,
        pid: PageId,
        bound: Option<u16>,
        entry: &CatalogEntry,
    ) -> Result<ScanStep, OmError> {
        let sp = SlottedPage::new(self.pool.page_mut(pid)?);
        if sp.is_catalog() {
            return Err(OmError::BadObjectId);
        }
        let bound = bound.unwrap_or_else(|| sp.n_slots()).min(sp.n_slots());
        for i in (0..bound).rev() {
            let slot = sp.slot(i);
            if slot.is_empty() {
                continue;
            }
            let oid = ObjectId::new(pid.volume, pid.page_no, i, slot.unique);
            return Ok(ScanStep::Found(oid, sp.object_hdr(i)));
        }
        if pid.page_no == entry.first_page {
            Ok(ScanStep::End)
        } else {
            Ok(ScanStep::Advance(sp.prev_page()))
        }
    }

    /// Compact a page in place, optionally parking one slot's record
    /// last in the data region.
    ///
    /// Total reclaimable space is unchanged, so the page's bucket
    /// membership stays valid.
    pub fn compact_page(&mut self, pid: PageId, pivot: Option<u16>) -> Result<(), OmError> {
        self.pool.pin(&mut self.volume, pid)?;
        SlottedPage::new(self.pool.page_mut(pid)?).compact(pivot);
        let marked = self.pool.mark_dirty(pid);
        self.pool.unpin(pid);
        marked?;
        Ok(())
    }

    /// Return every page queued on a dealloc list to the volume.
    pub fn drain_dealloc(&mut self, dealloc: &mut DeallocList) {
        dealloc.drain(&mut self.volume, &mut self.pool);
    }

    /// Space bookkeeping of one page.
    pub fn page_stats(&mut self, pid: PageId) -> Result<PageStats, OmError> {
        self.pool.pin(&mut self.volume, pid)?;
        let stats = self.pool.page_mut(pid).map(|page| {
            let sp = SlottedPage::new(page);
            PageStats {
                n_slots: sp.n_slots(),
                free: sp.free(),
                unused: sp.unused(),
                free_window: sp.free_window(),
                total_free: sp.total_free(),
            }
        });
        self.pool.unpin(pid);
        Ok(stats?)
    }

    /// Walk a file and check its structural invariants: chain links
    /// symmetric and anchored, per-page space accounting balanced,
    /// live records disjoint, slot stamps unique, and every page in
    /// exactly the available-space list matching its size class.
    pub fn verify_file(&mut self, file: ObjectId) -> Result<FileStats, OmError> {
        let cat_pid = self.catalog_pid(&file)?;
        self.pool.pin(&mut self.volume, cat_pid)?;
        let result = self.verify_file_pinned(&file, cat_pid);
        self.pool.unpin(cat_pid);
        result
    }

    fn verify_file_pinned(
        &mut self,
        file: &ObjectId,
        cat_pid: PageId,
    ) -> Result<FileStats, OmError> {
        let entry = self.read_entry(cat_pid, file)?;

        let mut chain = Vec::new();
        let mut objects = 0u64;
        let mut prev_expected = NIL_PAGE_NO;
        let mut page_no = entry.first_page;
        while !is_nil(page_no) {
            let pid = PageId::new(self.volume.volume_id(), page_no);
            let check = self.verify_page(pid, prev_expected)?;
            objects += check.live;
            chain.push((page_no, check.class));
            if is_nil(check.next) && page_no != entry.last_page {
                return Err(OmError::Corrupt("chain ends before the last-page anchor"));
            }
            prev_expected = page_no;
            page_no = check.next;
        }
        if !is_nil(entry.last_page) && prev_expected != entry.last_page {
            return Err(OmError::Corrupt("last-page anchor is not on the chain"));
        }

        let mut listed = std::collections::HashMap::new();
        for (class, &list_head) in entry.avail_lists.iter().enumerate() {
            let mut prev = NIL_PAGE_NO;
            let mut head = list_head;
            while !is_nil(head) {
                if listed.insert(head, class).is_some() {
                    return Err(OmError::Corrupt("page listed twice"));
                }
                let pid = PageId::new(self.volume.volume_id(), head);
                self.pool.pin(&mut self.volume, pid)?;
                let links = self.pool.page_mut(pid).map(|page| {
                    let sp = SlottedPage::new(page);
                    (sp.space_prev(), sp.space_next())
                });
                self.pool.unpin(pid);
                let (space_prev, space_next) = links?;
                if space_prev != prev {
                    return Err(OmError::Corrupt("space list prev link broken"));
                }
                prev = head;
                head = space_next;
            }
        }
        for (page_no, class) in &chain {
            if listed.get(page_no) != class.as_ref() {
                return Err(OmError::Corrupt("page not in the list of its size class"));
            }
        }
        if listed.keys().any(|p| !chain.iter().any(|(c, _)| c == p)) {
            return Err(OmError::Corrupt("listed page is not on the file chain"));
        }

        Ok(FileStats {
            pages: chain.len() as u32,
            objects,
        })
    }

    fn verify_page(&mut self, pid: PageId, prev_expected: PageNo) -> Result<PageCheck, OmError> {
        self.pool.pin(&mut self.volume, pid)?;
        let result = self.verify_page_pinned(pid, prev_expected);
        self.pool.unpin(pid);
        result
    }

    #[allow(clippy::cast_sign_loss)] // live slot offsets are non-negative
    fn verify_page_pinned(
        &mut self,
        pid: PageId,
        prev_expected: PageNo,
    ) -> Result<PageCheck, OmError> {
        let sp = SlottedPage::new(self.pool.page_mut(pid)?);
        if sp.is_catalog() {
            return Err(OmError::Corrupt("catalog page on a data chain"));
        }
        if sp.prev_page() != prev_expected {
            return Err(OmError::Corrupt("chain prev link broken"));
        }
        if !sp.space_accounted() {
            return Err(OmError::Corrupt("page space accounting does not balance"));
        }

        let mut live = 0u64;
        let mut regions = Vec::new();
        let mut stamps = std::collections::HashSet::new();
        for i in 0..sp.n_slots() {
            let slot = sp.slot(i);
            if slot.is_empty() {
                continue;
            }
            let offset = slot.offset as usize;
            let record = sp.object_hdr(i).record_size();
            if offset < PAGE_HEADER_SIZE || offset + record > sp.free() {
                return Err(OmError::Corrupt("record outside the data region"));
            }
            if !stamps.insert(slot.unique) {
                return Err(OmError::Corrupt("duplicate slot stamp"));
            }
            regions.push((offset, offset + record));
            live += 1;
        }
        regions.sort_unstable();
        if regions.windows(2).any(|w| w[0].1 > w[1].0) {
            return Err(OmError::Corrupt("live records overlap"));
        }

        Ok(PageCheck {
            next: sp.next_page(),
            class: size_class(sp.total_free()),
            live,
        })
    }

    fn catalog_pid(&self, file: &ObjectId) -> Result<PageId, OmError> {
        if file.volume != self.volume.volume_id() {
            return Err(OmError::BadCatalog);
        }
        Ok(file.page_id())
    }

    fn read_entry(&mut self, cat_pid: PageId, file: &ObjectId) -> Result<CatalogEntry, OmError> {
        let sp = SlottedPage::new(self.pool.page_mut(cat_pid)?);
        CatalogEntry::read_from(&sp, file).ok_or(OmError::BadCatalog)
    }

    fn write_entry(
        &mut self,
        cat_pid: PageId,
        file: &ObjectId,
        entry: &CatalogEntry,
    ) -> Result<(), OmError> {
        let mut sp = SlottedPage::new(self.pool.page_mut(cat_pid)?);
        entry.write_to(&mut sp, file);
        self.pool.mark_dirty(cat_pid)?;
        Ok(())
    }
}

impl std::fmt::Debug for ObjectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectManager")
            .field("volume", &self.volume)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Errors from object-manager operations.
#[derive(Debug)]
pub enum OmError {
    /// The file catalog reference is missing or malformed.
    BadCatalog,
    /// The object identifier does not name a live object.
    BadObjectId,
    /// The payload's aligned length exceeds the single-page limit.
    ObjectTooLarge {
        /// The offending aligned length.
        aligned: usize,
    },
    /// The catalog page cannot hold another file entry.
    CatalogFull,
    /// A structural invariant does not hold on disk.
    Corrupt(&'static str),
    /// Error from the buffer pool.
    Buffer(BufferError),
    /// Error from the volume.
    Volume(VolumeError),
}

impl std::fmt::Display for OmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadCatalog => write!(f, "bad file catalog reference"),
            Self::BadObjectId => write!(f, "bad object identifier"),
            Self::ObjectTooLarge { aligned } => write!(
                f,
                "aligned payload of {aligned} bytes exceeds the large-object threshold ({LARGE_OBJECT_THRESHOLD})"
            ),
            Self::CatalogFull => write!(f, "catalog page is full"),
            Self::Corrupt(detail) => write!(f, "corrupt file structure: {detail}"),
            Self::Buffer(e) => write!(f, "buffer pool error: {e}"),
            Self::Volume(e) => write!(f, "volume error: {e}"),
        }
    }
}

impl std::error::Error for OmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Buffer(e) => Some(e),
            Self::Volume(e) => Some(e),
            Self::BadCatalog
            | Self::BadObjectId
            | Self::ObjectTooLarge { .. }
            | Self::CatalogFull
            | Self::Corrupt(_) => None,
        }
    }
}

impl From<BufferError> for OmError {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

impl From<VolumeError> for OmError {
    fn from(e: VolumeError) -> Self {
        Self::Volume(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_manager(dir: &tempfile::TempDir) -> ObjectManager {
        let config = EngineConfig {
            data_directory: dir.path().to_path_buf(),
            pool_capacity: 16,
        };
        ObjectManager::create(&dir.path().join("test.vol"), &config).expect("create")
    }

    #[test]
    fn test_create_fetch_roundtrip() {
        let dir = tempdir().expect("create temp dir");
        let mut om = test_manager(&dir);
        let file = om.create_file(100).expect("create file");

        let oid = om
            .create_object(file, None, 3, b"first object")
            .expect("create object");
        let (hdr, bytes) = om.fetch_object(oid).expect("fetch");

        assert_eq!(hdr.tag, 3);
        assert_eq!(hdr.length, 12);
        assert_eq!(bytes, b"first object");
    }

    #[test]
    fn test_create_rejects_large_object() {
        let dir = tempdir().expect("create temp dir");
        let mut om = test_manager(&dir);
        let file = om.create_file(100).expect("create file");

        let data = vec![0u8; LARGE_OBJECT_THRESHOLD + 1];
        let result = om.create_object(file, None, 0, &data);
        assert!(matches!(result, Err(OmError::ObjectTooLarge { .. })));
    }

    #[test]
    fn test_max_object_fits() {
        let dir = tempdir().expect("create temp dir");
        let mut om = test_manager(&dir);
        let file = om.create_file(100).expect("create file");

        let data = vec![7u8; LARGE_OBJECT_THRESHOLD];
        let oid = om.create_object(file, None, 0, &data).expect("create");
        let (_, bytes) = om.fetch_object(oid).expect("fetch");
        assert_eq!(bytes, data);
    }

    #[test]
    fn test_bad_catalog_reference() {
        let dir = tempdir().expect("create temp dir");
        let mut om = test_manager(&dir);
        let file = om.create_file(100).expect("create file");

        let bogus = ObjectId::new(file.volume, file.page_no, file.slot_no, file.unique + 17);
        let result = om.create_object(bogus, None, 0, b"x");
        assert!(matches!(result, Err(OmError::BadCatalog)));
    }

    #[test]
    fn test_destroy_then_fetch_fails() {
        let dir = tempdir().expect("create temp dir");
        let mut om = test_manager(&dir);
        let file = om.create_file(100).expect("create file");
        let oid = om.create_object(file, None, 0, b"doomed").expect("create");

        let mut dealloc = DeallocList::new();
        om.destroy_object(file, oid, &mut dealloc).expect("destroy");

        assert!(matches!(om.fetch_object(oid), Err(OmError::BadObjectId)));
        assert!(matches!(
            om.destroy_object(file, oid, &mut dealloc),
            Err(OmError::BadObjectId)
        ));
    }

    #[test]
    fn test_catalog_page_immune_to_destroy() {
        let dir = tempdir().expect("create temp dir");
        let mut om = test_manager(&dir);
        let file = om.create_file(100).expect("create file");

        let mut dealloc = DeallocList::new();
        let result = om.destroy_object(file, file, &mut dealloc);
        assert!(matches!(result, Err(OmError::BadObjectId)));
    }

    #[test]
    fn test_no_pins_leak_after_operations() {
        let dir = tempdir().expect("create temp dir");
        let mut om = test_manager(&dir);
        let file = om.create_file(100).expect("create file");

        let oid = om.create_object(file, None, 0, b"payload").expect("create");
        let near = om.create_object(file, Some(oid), 0, b"near").expect("create");
        om.next_object(file, None).expect("scan");
        om.prev_object(file, None).expect("scan");
        let mut dealloc = DeallocList::new();
        om.destroy_object(file, near, &mut dealloc).expect("destroy");

        for page_no in 0..om.volume().total_pages() {
            let pid = PageId::new(om.volume().volume_id(), page_no);
            assert_eq!(om.pool().pin_count(pid), 0, "leaked pin on {pid}");
        }
    }

    #[test]
    fn test_reopen_preserves_objects() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("reopen.vol");
        let config = EngineConfig {
            data_directory: dir.path().to_path_buf(),
            pool_capacity: 16,
        };

        let (file, oid);
        {
            let mut om = ObjectManager::create(&path, &config).expect("create");
            file = om.create_file(100).expect("create file");
            oid = om.create_object(file, None, 5, b"durable").expect("create");
            om.flush().expect("flush");
        }

        let mut om = ObjectManager::open(&path, &config).expect("open");
        let (hdr, bytes) = om.fetch_object(oid).expect("fetch");
        assert_eq!(hdr.tag, 5);
        assert_eq!(bytes, b"durable");
        assert!(om.next_object(file, None).expect("scan").is_some());
    }
}
