//! Record Manager: fixed-size heap files layered on the buffer pool.
//!
//! A heap file's page 0 holds [`RmFileHdr`]; every following page holds an
//! [`RmPageHdr`], an occupancy bitmap, and a dense array of fixed-size record
//! slots. Free pages (not yet full) are threaded into a singly linked free
//! list rooted at the file header's `first_free_page_no`.

use common::{DbError, DbResult, PageId, RecordId};
use storage::{
    bitmap, RmFileHdr, RmPageHdr, FILE_HDR_PAGE, FIRST_RECORD_PAGE, NO_PAGE, PAGE_BODY_OFFSET,
    RM_FILE_HDR_LEN, RM_PAGE_HDR_LEN,
};

use crate::BufferPoolManager;

const HDR_START: usize = PAGE_BODY_OFFSET;
const PAGE_HDR_START: usize = PAGE_BODY_OFFSET;


fn bitmap_start() -> usize {
    PAGE_HDR_START + RM_PAGE_HDR_LEN
}

fn slot_offset(bitmap_size: usize, record_size: usize, slot: usize) -> usize {
    bitmap_start() + bitmap_size + slot * record_size
}

/// A fixed-record-size heap file opened against a [`BufferPoolManager`].
pub struct HeapFile {
    fd: storage::Fd,
    hdr: RmFileHdr,
}

impl HeapFile {
    /// Creates a new, empty heap file sized for `record_size`-byte tuples.
    pub fn create(pool: &BufferPoolManager, name: &str, record_size: usize) -> DbResult<Self> {
        pool.create_file(name)?;
        let fd = pool.open_file(name)?;
        let hdr = RmFileHdr::new_for_record_size(record_size);

        let (frame, page_no) = pool.new_page(fd)?;
        if page_no != FILE_HDR_PAGE {
            return Err(DbError::Internal(format!(
                "expected heap file header at page {FILE_HDR_PAGE}, got {page_no}"
            )));
        }
        pool.write_page(frame, |data| {
            data[HDR_START..HDR_START + RM_FILE_HDR_LEN].copy_from_slice(&hdr.to_bytes());
        });
        pool.unpin_page(frame, true)?;

        Ok(Self { fd, hdr })
    }

    /// Opens an existing heap file, reading its cached header from page 0.
    pub fn open(pool: &BufferPoolManager, name: &str) -> DbResult<Self> {
        let fd = pool.open_file(name)?;
        let frame = pool.fetch_page(fd, FILE_HDR_PAGE)?;
        let hdr = pool.read_page(frame, |data| {
            RmFileHdr::from_bytes(&data[HDR_START..HDR_START + RM_FILE_HDR_LEN])
        });
        pool.unpin_page(frame, false)?;
        Ok(Self { fd, hdr })
    }

    pub fn record_size(&self) -> usize {
        self.hdr.record_size as usize
    }

    fn persist_header(&self, pool: &BufferPoolManager) -> DbResult<()> {
        let frame = pool.fetch_page(self.fd, FILE_HDR_PAGE)?;
        pool.write_page(frame, |data| {
            data[HDR_START..HDR_START + RM_FILE_HDR_LEN].copy_from_slice(&self.hdr.to_bytes());
        });
        pool.unpin_page(frame, true)
    }

    fn read_page_hdr(&self, pool: &BufferPoolManager, frame: crate::replacer::FrameId) -> RmPageHdr {
        pool.read_page(frame, |data| {
            RmPageHdr::from_bytes(&data[PAGE_HDR_START..PAGE_HDR_START + RM_PAGE_HDR_LEN])
        })
    }

    fn write_page_hdr(&self, pool: &BufferPoolManager, frame: crate::replacer::FrameId, hdr: &RmPageHdr) {
        pool.write_page(frame, |data| {
            data[PAGE_HDR_START..PAGE_HDR_START + RM_PAGE_HDR_LEN].copy_from_slice(&hdr.to_bytes());
        });
    }

    /// Allocates a fresh, empty data page and threads it onto the free list.
    fn allocate_data_page(&mut self, pool: &BufferPoolManager) -> DbResult<i32> {
        let (frame, page_no) = pool.new_page(pool_fd(self))?;
        let page_hdr = RmPageHdr {
            next_free_page_no: self.hdr.first_free_page_no,
            num_records: 0,
        };
        self.write_page_hdr(pool, frame, &page_hdr);
        pool.write_page(frame, |data| {
            let bitmap_size = self.hdr.bitmap_size as usize;
            data[bitmap_start()..bitmap_start() + bitmap_size].fill(0);
        });
        pool.unpin_page(frame, true)?;
        self.hdr.first_free_page_no = page_no as i32;
        self.hdr.num_pages += 1;
        self.persist_header(pool)?;
        Ok(page_no as i32)
    }

    /// Inserts `buf` (exactly `record_size` bytes) and returns its [`RecordId`].
    pub fn insert(&mut self, pool: &BufferPoolManager, buf: &[u8]) -> DbResult<RecordId> {
        if buf.len() != self.record_size() {
            return Err(DbError::Internal(format!(
                "record size mismatch: expected {}, got {}",
                self.record_size(),
                buf.len()
            )));
        }

        let page_no = if self.hdr.first_free_page_no == NO_PAGE {
            self.allocate_data_page(pool)?
        } else {
            self.hdr.first_free_page_no
        };

        let frame = pool.fetch_page(pool_fd(self), page_no as u32)?;
        let mut page_hdr = self.read_page_hdr(pool, frame);
        let records_per_page = self.hdr.num_records_per_page as usize;
        let bitmap_size = self.hdr.bitmap_size as usize;
        let record_size = self.record_size();

        let slot = pool.read_page(frame, |data| {
            bitmap::first_unset(&data[bitmap_start()..bitmap_start() + bitmap_size], records_per_page)
        });
        let Some(slot) = slot else {
            pool.unpin_page(frame, false)?;
            return Err(DbError::Internal(format!(
                "heap page {page_no} claimed free but has no open slot"
            )));
        };

        pool.write_page(frame, |data| {
            bitmap::set(&mut data[bitmap_start()..bitmap_start() + bitmap_size], slot);
            let off = slot_offset(bitmap_size, record_size, slot);
            data[off..off + record_size].copy_from_slice(buf);
        });
        page_hdr.num_records += 1;
        let page_now_full = page_hdr.num_records as usize == records_per_page;
        if page_now_full {
            self.hdr.first_free_page_no = page_hdr.next_free_page_no;
            page_hdr.next_free_page_no = NO_PAGE;
        }
        self.write_page_hdr(pool, frame, &page_hdr);
        pool.unpin_page(frame, true)?;
        if page_now_full {
            self.persist_header(pool)?;
        }

        Ok(RecordId {
            page_id: PageId(page_no as u64),
            slot: slot as u16,
        })
    }

    /// Recovery-replay variant of [`HeapFile::insert`]: writes at an exact
    /// `rid`, extending the file with fresh pages if necessary, and does not
    /// touch the free list (recovery owns free-list consistency separately).
    pub fn insert_at(&mut self, pool: &BufferPoolManager, rid: RecordId, buf: &[u8]) -> DbResult<()> {
        let page_no = rid.page_id.0 as u32;
        while (self.hdr.num_pages as u32) <= page_no {
            self.allocate_data_page(pool)?;
        }
        let frame = pool.fetch_page(pool_fd(self), page_no)?;
        let mut page_hdr = self.read_page_hdr(pool, frame);
        let bitmap_size = self.hdr.bitmap_size as usize;
        let record_size = self.record_size();
        let slot = rid.slot as usize;

        let was_set = pool.read_page(frame, |data| {
            bitmap::is_set(&data[bitmap_start()..bitmap_start() + bitmap_size], slot)
        });
        pool.write_page(frame, |data| {
            bitmap::set(&mut data[bitmap_start()..bitmap_start() + bitmap_size], slot);
            let off = slot_offset(bitmap_size, record_size, slot);
            data[off..off + record_size].copy_from_slice(buf);
        });
        if !was_set {
            page_hdr.num_records += 1;
            self.write_page_hdr(pool, frame, &page_hdr);
        }
        pool.unpin_page(frame, true)
    }

    /// Returns whether `rid` currently names a live record.
    pub fn is_record(&self, pool: &BufferPoolManager, rid: RecordId) -> DbResult<bool> {
        let page_no = rid.page_id.0 as u32;
        let frame = pool.fetch_page(pool_fd(self), page_no)?;
        let bitmap_size = self.hdr.bitmap_size as usize;
        let set = pool.read_page(frame, |data| {
            bitmap::is_set(&data[bitmap_start()..bitmap_start() + bitmap_size], rid.slot as usize)
        });
        pool.unpin_page(frame, false)?;
        Ok(set)
    }

    /// Fetches the raw bytes stored at `rid`.
    pub fn get(&self, pool: &BufferPoolManager, rid: RecordId) -> DbResult<Vec<u8>> {
        let page_no = rid.page_id.0 as u32;
        let frame = pool.fetch_page(pool_fd(self), page_no)?;
        let bitmap_size = self.hdr.bitmap_size as usize;
        let record_size = self.record_size();
        let slot = rid.slot as usize;

        let result = pool.read_page(frame, |data| {
            if !bitmap::is_set(&data[bitmap_start()..bitmap_start() + bitmap_size], slot) {
                None
            } else {
                let off = slot_offset(bitmap_size, record_size, slot);
                Some(data[off..off + record_size].to_vec())
            }
        });
        pool.unpin_page(frame, false)?;
        result.ok_or_else(|| DbError::RecordNotFound(format!("{rid:?}")))
    }

    /// Fetches every live record on `page_no`, as `(bytes, slot)` pairs, in
    /// slot order. Page-batched reads build on this for sequential scans.
    pub fn get_page(&self, pool: &BufferPoolManager, page_no: u32) -> DbResult<Vec<(Vec<u8>, u16)>> {
        let frame = pool.fetch_page(pool_fd(self), page_no)?;
        let bitmap_size = self.hdr.bitmap_size as usize;
        let record_size = self.record_size();
        let records_per_page = self.hdr.num_records_per_page as usize;

        let out = pool.read_page(frame, |data| {
            let bmap = &data[bitmap_start()..bitmap_start() + bitmap_size];
            (0..records_per_page)
                .filter(|&slot| bitmap::is_set(bmap, slot))
                .map(|slot| {
                    let off = slot_offset(bitmap_size, record_size, slot);
                    (data[off..off + record_size].to_vec(), slot as u16)
                })
                .collect::<Vec<_>>()
        });
        pool.unpin_page(frame, false)?;
        Ok(out)
    }

    pub fn num_pages(&self) -> u32 {
        self.hdr.num_pages as u32
    }

    pub fn first_data_page(&self) -> u32 {
        FIRST_RECORD_PAGE
    }

    /// Deletes the record at `rid`, relinking its page onto the free list if
    /// it had been full.
    pub fn delete(&mut self, pool: &BufferPoolManager, rid: RecordId) -> DbResult<()> {
        let page_no = rid.page_id.0 as u32;
        let frame = pool.fetch_page(pool_fd(self), page_no)?;
        let mut page_hdr = self.read_page_hdr(pool, frame);
        let bitmap_size = self.hdr.bitmap_size as usize;
        let records_per_page = self.hdr.num_records_per_page as usize;
        let slot = rid.slot as usize;

        let was_set = pool.read_page(frame, |data| {
            bitmap::is_set(&data[bitmap_start()..bitmap_start() + bitmap_size], slot)
        });
        if !was_set {
            pool.unpin_page(frame, false)?;
            return Err(DbError::RecordNotFound(format!("{rid:?}")));
        }
        pool.write_page(frame, |data| {
            bitmap::unset(&mut data[bitmap_start()..bitmap_start() + bitmap_size], slot);
        });
        let was_full = page_hdr.num_records as usize == records_per_page;
        page_hdr.num_records -= 1;
        if was_full {
            page_hdr.next_free_page_no = self.hdr.first_free_page_no;
        }
        self.write_page_hdr(pool, frame, &page_hdr);
        pool.unpin_page(frame, true)?;
        if was_full {
            self.hdr.first_free_page_no = page_no as i32;
            self.persist_header(pool)?;
        }
        Ok(())
    }

    /// Overwrites the record at `rid` in place. The caller is responsible for
    /// ensuring `buf.len() == record_size()`; the physical slot never moves.
    pub fn update(&mut self, pool: &BufferPoolManager, rid: RecordId, buf: &[u8]) -> DbResult<()> {
        let page_no = rid.page_id.0 as u32;
        let frame = pool.fetch_page(pool_fd(self), page_no)?;
        let bitmap_size = self.hdr.bitmap_size as usize;
        let record_size = self.record_size();
        let slot = rid.slot as usize;

        let was_set = pool.read_page(frame, |data| {
            bitmap::is_set(&data[bitmap_start()..bitmap_start() + bitmap_size], slot)
        });
        if !was_set {
            pool.unpin_page(frame, false)?;
            return Err(DbError::RecordNotFound(format!("{rid:?}")));
        }
        pool.write_page(frame, |data| {
            let off = slot_offset(bitmap_size, record_size, slot);
            data[off..off + record_size].copy_from_slice(buf);
        });
        pool.unpin_page(frame, true)
    }

    /// Undoes an insert during transaction abort: identical to [`Self::delete`],
    /// named separately so callers read clearly at abort sites.
    pub fn abort_insert(&mut self, pool: &BufferPoolManager, rid: RecordId) -> DbResult<()> {
        self.delete(pool, rid)
    }

    /// Undoes a delete during transaction abort by reinserting the original bytes.
    pub fn abort_delete(&mut self, pool: &BufferPoolManager, rid: RecordId, buf: &[u8]) -> DbResult<()> {
        self.insert_at(pool, rid, buf)
    }

    /// Undoes an update during transaction abort by restoring the before-image.
    pub fn abort_update(&mut self, pool: &BufferPoolManager, rid: RecordId, before: &[u8]) -> DbResult<()> {
        self.update(pool, rid, before)
    }

    /// Inserts every buffer in `bufs`, returning their assigned record ids in order.
    pub fn batch_insert(&mut self, pool: &BufferPoolManager, bufs: &[Vec<u8>]) -> DbResult<Vec<RecordId>> {
        bufs.iter().map(|buf| self.insert(pool, buf)).collect()
    }

    /// Scans every live record in the file, running `is_reclaimable` against
    /// each to decide whether to physically reclaim its slot. Used by the
    /// background MVCC page cleaner, bounded by the caller to a handful of
    /// pages per wakeup so a single GC pass never stalls foreground I/O.
    pub fn clean_page(
        &mut self,
        pool: &BufferPoolManager,
        page_no: u32,
        is_reclaimable: impl Fn(&[u8]) -> bool,
    ) -> DbResult<usize> {
        let live = self.get_page(pool, page_no)?;
        let mut reclaimed = 0;
        for (bytes, slot) in live {
            if is_reclaimable(&bytes) {
                self.delete(
                    pool,
                    RecordId {
                        page_id: PageId(page_no as u64),
                        slot,
                    },
                )?;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}

fn pool_fd(heap: &HeapFile) -> storage::Fd {
    heap.fd
}

#[cfg(test)]
mod tests;
