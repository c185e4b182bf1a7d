//! Volume files: raw page I/O and the extent allocator.
//!
//! A volume is a single file of 4 KiB pages:
//!
//! - Page 0: volume header (magic, geometry, catalog page, CRC32)
//! - Page 1: allocation bitmap, one bit per page (0 = free, 1 = used)
//! - Remaining pages: catalog and data pages
//!
//! Pages are grouped into fixed-size extents. Allocation prefers the
//! extent of a caller-supplied near page, subject to the file's extent
//! fill factor, so related pages cluster physically; otherwise it
//! first-fits anywhere and grows the file by one extent when full.

// Page numbers are u32 and PAGE_SIZE fits in u32, so these casts are
// value-preserving.
#![allow(clippy::cast_possible_truncation)]

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::storage::page::{PAGE_SIZE, PAGE_SIZE_U64, Page, PageNo};

/// Magic bytes identifying a volume file.
const VOLUME_MAGIC: [u8; 4] = *b"OMV1";

/// Volume format version.
const FORMAT_VERSION: u32 = 1;

/// Pages per extent.
pub const EXTENT_SIZE: u32 = 16;

/// Page number of the allocation bitmap.
const BITMAP_PAGE_NO: PageNo = 1;

/// Hard page-count cap: one bitmap page tracks this many pages.
const MAX_PAGES: u32 = (PAGE_SIZE * 8) as u32;

const OFFSET_MAGIC: usize = 0;
const OFFSET_VERSION: usize = 4;
const OFFSET_PAGE_SIZE: usize = 8;
const OFFSET_VOLUME_ID: usize = 12;
const OFFSET_TOTAL_PAGES: usize = 16;
const OFFSET_EXTENT_SIZE: usize = 20;
const OFFSET_CATALOG_PAGE: usize = 24;
const OFFSET_NEXT_FILE_ID: usize = 28;
const OFFSET_CHECKSUM: usize = 32;

/// A volume file handle with page I/O and page allocation.
pub struct Volume {
    file: File,
    volume_id: u32,
    total_pages: u32,
    catalog_page: PageNo,
    next_file_id: u32,
    bitmap: Vec<u8>,
    search_hint: PageNo,
}

impl Volume {
    /// Create and format a new volume file.
    ///
    /// Returns an error if the file already exists. The volume starts
    /// with `initial_pages` (rounded up to a whole number of extents),
    /// with the header, bitmap, and catalog pages marked used. The
    /// catalog page's contents are initialised by the caller.
    pub fn format(path: &Path, volume_id: u32, initial_pages: u32) -> Result<Self, VolumeError> {
        if path.exists() {
            return Err(VolumeError::AlreadyExists(path.to_path_buf()));
        }

        let total_pages = initial_pages
            .max(EXTENT_SIZE)
            .div_ceil(EXTENT_SIZE)
            .checked_mul(EXTENT_SIZE)
            .filter(|&n| n <= MAX_PAGES)
            .ok_or(VolumeError::VolumeFull)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(VolumeError::Io)?;
        file.set_len(u64::from(total_pages) * PAGE_SIZE_U64)
            .map_err(VolumeError::Io)?;

        let mut bitmap = vec![0u8; PAGE_SIZE];
        set_bit(&mut bitmap, 0);
        set_bit(&mut bitmap, BITMAP_PAGE_NO as usize);
        let catalog_page = BITMAP_PAGE_NO + 1;
        set_bit(&mut bitmap, catalog_page as usize);

        let mut volume = Self {
            file,
            volume_id,
            total_pages,
            catalog_page,
            next_file_id: 1,
            bitmap,
            search_hint: catalog_page + 1,
        };
        volume.sync()?;

        tracing::debug!(volume_id, total_pages, "formatted volume");
        Ok(volume)
    }

    /// Open an existing volume file, validating its header.
    pub fn open(path: &Path) -> Result<Self, VolumeError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(VolumeError::Io)?;

        let mut header = Page::new();
        file.seek(SeekFrom::Start(0)).map_err(VolumeError::Io)?;
        file.read_exact(header.as_bytes_mut())
            .map_err(VolumeError::Io)?;

        if header.read_bytes(OFFSET_MAGIC, 4) != VOLUME_MAGIC {
            return Err(VolumeError::BadMagic);
        }
        let version = header.read_u32(OFFSET_VERSION);
        if version != FORMAT_VERSION {
            return Err(VolumeError::UnsupportedVersion(version));
        }
        let page_size = header.read_u32(OFFSET_PAGE_SIZE);
        if page_size != PAGE_SIZE as u32 {
            return Err(VolumeError::BadPageSize(page_size));
        }

        let stored = header.read_u32(OFFSET_CHECKSUM);
        if stored != header_checksum(&header) {
            return Err(VolumeError::ChecksumMismatch);
        }

        let mut bitmap_page = Page::new();
        file.seek(SeekFrom::Start(u64::from(BITMAP_PAGE_NO) * PAGE_SIZE_U64))
            .map_err(VolumeError::Io)?;
        file.read_exact(bitmap_page.as_bytes_mut())
            .map_err(VolumeError::Io)?;

        Ok(Self {
            file,
            volume_id: header.read_u32(OFFSET_VOLUME_ID),
            total_pages: header.read_u32(OFFSET_TOTAL_PAGES),
            catalog_page: header.read_u32(OFFSET_CATALOG_PAGE),
            next_file_id: header.read_u32(OFFSET_NEXT_FILE_ID),
            bitmap: bitmap_page.as_bytes().to_vec(),
            search_hint: 0,
        })
    }

    /// This volume's identifier.
    #[must_use]
    pub const fn volume_id(&self) -> u32 {
        self.volume_id
    }

    /// Total pages currently in the volume.
    #[must_use]
    pub const fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Page number of the catalog page.
    #[must_use]
    pub const fn catalog_page(&self) -> PageNo {
        self.catalog_page
    }

    /// Hand out the next file identifier.
    pub const fn take_file_id(&mut self) -> u32 {
        let fid = self.next_file_id;
        self.next_file_id += 1;
        fid
    }

    /// The extent a page belongs to.
    #[must_use]
    pub const fn page_to_extent(page_no: PageNo) -> u32 {
        page_no / EXTENT_SIZE
    }

    /// Read a page into the caller's buffer.
    pub fn read_page(&mut self, page_no: PageNo, buf: &mut Page) -> Result<(), VolumeError> {
        if page_no >= self.total_pages {
            return Err(VolumeError::PageOutOfBounds {
                page_no,
                total_pages: self.total_pages,
            });
        }
        self.file
            .seek(SeekFrom::Start(u64::from(page_no) * PAGE_SIZE_U64))
            .map_err(VolumeError::Io)?;
        self.file
            .read_exact(buf.as_bytes_mut())
            .map_err(VolumeError::Io)?;
        Ok(())
    }

    /// Write a page from the caller's buffer.
    pub fn write_page(&mut self, page_no: PageNo, buf: &Page) -> Result<(), VolumeError> {
        if page_no >= self.total_pages {
            return Err(VolumeError::PageOutOfBounds {
                page_no,
                total_pages: self.total_pages,
            });
        }
        self.file
            .seek(SeekFrom::Start(u64::from(page_no) * PAGE_SIZE_U64))
            .map_err(VolumeError::Io)?;
        self.file
            .write_all(buf.as_bytes())
            .map_err(VolumeError::Io)?;
        Ok(())
    }

    /// Allocate one page.
    ///
    /// With a `near` hint the allocation prefers a free page in the
    /// hint's extent, as long as that extent's used count stays within
    /// the fill factor `eff` (a percentage). Otherwise, or when the
    /// near extent is full, the first free page anywhere is taken; the
    /// file grows by one extent when no page is free.
    pub fn alloc_train(&mut self, near: Option<PageNo>, eff: u16) -> Result<PageNo, VolumeError> {
        if let Some(near) = near {
            let extent = Self::page_to_extent(near);
            if let Some(page_no) = self.alloc_in_extent(extent, eff) {
                return Ok(page_no);
            }
        }

        if let Some(page_no) = self.alloc_first_fit() {
            return Ok(page_no);
        }

        let first_new = self.grow_one_extent()?;
        set_bit(&mut self.bitmap, first_new as usize);
        self.search_hint = first_new + 1;
        Ok(first_new)
    }

    /// Return a page to the free pool.
    pub fn free_page(&mut self, page_no: PageNo) {
        if page_no >= self.total_pages {
            return;
        }
        clear_bit(&mut self.bitmap, page_no as usize);
        if page_no < self.search_hint {
            self.search_hint = page_no;
        }
    }

    /// Whether a page is currently allocated.
    #[must_use]
    pub fn is_allocated(&self, page_no: PageNo) -> bool {
        page_no < self.total_pages && get_bit(&self.bitmap, page_no as usize)
    }

    /// Persist the header and allocation bitmap and fsync the file.
    pub fn sync(&mut self) -> Result<(), VolumeError> {
        let mut header = Page::new();
        header.write_bytes(OFFSET_MAGIC, &VOLUME_MAGIC);
        header.write_u32(OFFSET_VERSION, FORMAT_VERSION);
        header.write_u32(OFFSET_PAGE_SIZE, PAGE_SIZE as u32);
        header.write_u32(OFFSET_VOLUME_ID, self.volume_id);
        header.write_u32(OFFSET_TOTAL_PAGES, self.total_pages);
        header.write_u32(OFFSET_EXTENT_SIZE, EXTENT_SIZE);
        header.write_u32(OFFSET_CATALOG_PAGE, self.catalog_page);
        header.write_u32(OFFSET_NEXT_FILE_ID, self.next_file_id);
        header.write_u32(OFFSET_CHECKSUM, header_checksum(&header));

        self.file.seek(SeekFrom::Start(0)).map_err(VolumeError::Io)?;
        self.file
            .write_all(header.as_bytes())
            .map_err(VolumeError::Io)?;

        self.file
            .seek(SeekFrom::Start(u64::from(BITMAP_PAGE_NO) * PAGE_SIZE_U64))
            .map_err(VolumeError::Io)?;
        self.file.write_all(&self.bitmap).map_err(VolumeError::Io)?;

        self.file.sync_all().map_err(VolumeError::Io)
    }

    fn alloc_in_extent(&mut self, extent: u32, eff: u16) -> Option<PageNo> {
        let start = extent * EXTENT_SIZE;
        let end = (start + EXTENT_SIZE).min(self.total_pages);
        if start >= self.total_pages {
            return None;
        }

        let used = (start..end)
            .filter(|&p| get_bit(&self.bitmap, p as usize))
            .count() as u32;
        let cap = (EXTENT_SIZE * u32::from(eff.min(100)) / 100).max(1);
        if used >= cap {
            return None;
        }

        let page_no = (start..end).find(|&p| !get_bit(&self.bitmap, p as usize))?;
        set_bit(&mut self.bitmap, page_no as usize);
        Some(page_no)
    }

    fn alloc_first_fit(&mut self) -> Option<PageNo> {
        let found = (self.search_hint..self.total_pages)
            .chain(0..self.search_hint)
            .find(|&p| !get_bit(&self.bitmap, p as usize))?;
        set_bit(&mut self.bitmap, found as usize);
        self.search_hint = found + 1;
        Some(found)
    }

    fn grow_one_extent(&mut self) -> Result<PageNo, VolumeError> {
        let first_new = self.total_pages;
        let new_total = self
            .total_pages
            .checked_add(EXTENT_SIZE)
            .filter(|&n| n <= MAX_PAGES)
            .ok_or(VolumeError::VolumeFull)?;

        self.file
            .set_len(u64::from(new_total) * PAGE_SIZE_U64)
            .map_err(VolumeError::Io)?;
        self.total_pages = new_total;

        tracing::debug!(total_pages = new_total, "grew volume by one extent");
        Ok(first_new)
    }
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("volume_id", &self.volume_id)
            .field("total_pages", &self.total_pages)
            .field("catalog_page", &self.catalog_page)
            .finish_non_exhaustive()
    }
}

/// CRC32 of a header page with the checksum field zeroed.
fn header_checksum(header: &Page) -> u32 {
    let bytes = header.as_bytes();
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&bytes[..OFFSET_CHECKSUM]);
    hasher.update(&[0u8; 4]);
    hasher.update(&bytes[OFFSET_CHECKSUM + 4..]);
    hasher.finalize()
}

const fn get_bit(bitmap: &[u8], index: usize) -> bool {
    bitmap[index / 8] & (1 << (index % 8)) != 0
}

const fn set_bit(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] |= 1 << (index % 8);
}

const fn clear_bit(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] &= !(1 << (index % 8));
}

/// Errors from volume operations.
#[derive(Debug)]
pub enum VolumeError {
    /// I/O error.
    Io(std::io::Error),
    /// File already exists.
    AlreadyExists(std::path::PathBuf),
    /// Not a volume file.
    BadMagic,
    /// Format version this build does not understand.
    UnsupportedVersion(u32),
    /// Volume was formatted with a different page size.
    BadPageSize(u32),
    /// Header checksum mismatch.
    ChecksumMismatch,
    /// Page number beyond the end of the volume.
    PageOutOfBounds {
        /// Requested page.
        page_no: PageNo,
        /// Pages in the volume.
        total_pages: u32,
    },
    /// The volume cannot grow any further.
    VolumeFull,
}

impl std::fmt::Display for VolumeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::AlreadyExists(p) => write!(f, "volume already exists: {}", p.display()),
            Self::BadMagic => write!(f, "not a volume file: bad magic"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported volume format version {v}"),
            Self::BadPageSize(s) => {
                write!(f, "volume page size {s} does not match build ({PAGE_SIZE})")
            }
            Self::ChecksumMismatch => write!(f, "volume header checksum mismatch"),
            Self::PageOutOfBounds {
                page_no,
                total_pages,
            } => write!(f, "page {page_no} out of bounds (total pages: {total_pages})"),
            Self::VolumeFull => write!(f, "volume is full"),
        }
    }
}

impl std::error::Error for VolumeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::AlreadyExists(_)
            | Self::BadMagic
            | Self::UnsupportedVersion(_)
            | Self::BadPageSize(_)
            | Self::ChecksumMismatch
            | Self::PageOutOfBounds { .. }
            | Self::VolumeFull => None,
        }
    }
}
