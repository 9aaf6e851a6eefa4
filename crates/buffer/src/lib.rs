//! Buffer Pool: pinning, pluggable replacement (Clock/LRU), dirty tracking,
//! and a background flusher thread.
//!
//! The pool's bookkeeping (pin counts, page table, free list, replacer) lives
//! behind a single coarse lock — a deliberate simplification of a sharded
//! frame table, recorded in DESIGN.md. Each frame's byte content is
//! independently guarded by its own reader/writer latch, orthogonal to pin
//! count, so content access never contends with bookkeeping beyond the
//! instant a frame is looked up.

pub mod heap;
pub mod replacer;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use common::{DbError, DbResult, ReplacerPolicy};
use storage::{DiskManager, Fd, PAGE_SIZE};

use replacer::{ClockReplacer, FrameId, LruReplacer, Replacer};

struct FrameSlot {
    data: RwLock<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, Default)]
struct FrameMeta {
    key: Option<(Fd, u32)>,
    pin_count: i64,
    dirty: bool,
}

struct PoolState {
    metas: Vec<FrameMeta>,
    page_table: HashMap<(Fd, u32), FrameId>,
    free_list: VecDeque<FrameId>,
}

/// The buffer pool manager. Always held behind an `Arc`, since the
/// background flusher thread needs shared ownership.
pub struct BufferPoolManager {
    disk: Mutex<DiskManager>,
    slots: Vec<FrameSlot>,
    state: Mutex<PoolState>,
    replacer: Mutex<Box<dyn Replacer>>,
    capacity: usize,
    shutdown: Arc<AtomicBool>,
    dirty_count: AtomicUsize,
    flush_cv: Condvar,
    flush_mutex: Mutex<()>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl BufferPoolManager {
    pub fn new(disk: DiskManager, capacity: usize, policy: ReplacerPolicy) -> Arc<Self> {
        let slots = (0..capacity)
            .map(|_| FrameSlot {
                data: RwLock::new(vec![0u8; PAGE_SIZE]),
            })
            .collect();
        let replacer: Box<dyn Replacer> = match policy {
            ReplacerPolicy::Clock => Box::new(ClockReplacer::new(capacity)),
            ReplacerPolicy::Lru => Box::new(LruReplacer::new(capacity)),
        };
        let pool = Arc::new(Self {
            disk: Mutex::new(disk),
            slots,
            state: Mutex::new(PoolState {
                metas: vec![FrameMeta::default(); capacity],
                page_table: HashMap::new(),
                free_list: (0..capacity).collect(),
            }),
            replacer: Mutex::new(replacer),
            capacity,
            shutdown: Arc::new(AtomicBool::new(false)),
            dirty_count: AtomicUsize::new(0),
            flush_cv: Condvar::new(),
            flush_mutex: Mutex::new(()),
            flusher: Mutex::new(None),
        });
        Self::spawn_flusher(&pool);
        pool
    }

    fn spawn_flusher(pool: &Arc<Self>) {
        let pool = pool.clone();
        let shutdown = pool.shutdown.clone();
        let handle = std::thread::spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                let guard = pool.flush_mutex.lock().unwrap();
                let _ = pool
                    .flush_cv
                    .wait_timeout(guard, Duration::from_millis(50))
                    .unwrap();
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                pool.flush_dirty_batch();
            }
        });
        *pool.flusher.lock().unwrap() = Some(handle);
    }

    fn flush_dirty_batch(&self) {
        let candidates: Vec<FrameId> = {
            let state = self.state.lock().unwrap();
            state
                .metas
                .iter()
                .enumerate()
                .filter(|(_, m)| m.dirty && m.pin_count == 0 && m.key.is_some())
                .map(|(i, _)| i)
                .collect()
        };
        for frame in candidates {
            let _ = self.flush_frame(frame);
        }
    }

    pub fn create_file(&self, name: &str) -> DbResult<()> {
        match self.disk.lock().unwrap().create_file(name) {
            Ok(()) => Ok(()),
            Err(DbError::Storage(_)) => Ok(()), // idempotent: already exists
            Err(e) => Err(e),
        }
    }

    pub fn open_file(&self, name: &str) -> DbResult<Fd> {
        self.disk.lock().unwrap().open_file(name)
    }

    pub fn close_file(&self, fd: Fd) -> DbResult<()> {
        self.disk.lock().unwrap().close_file(fd)
    }

    pub fn destroy_file(&self, name: &str) -> DbResult<()> {
        self.disk.lock().unwrap().destroy_file(name)
    }

    pub fn ensure_file_size(&self, fd: Fd, num_pages: u32) -> DbResult<()> {
        self.disk.lock().unwrap().ensure_file_size(fd, num_pages)
    }

    /// Returns a frame holding `(fd, page_no)`, pinned, loading from disk on miss.
    pub fn fetch_page(&self, fd: Fd, page_no: u32) -> DbResult<FrameId> {
        let mut state = self.state.lock().unwrap();
        if let Some(&frame) = state.page_table.get(&(fd, page_no)) {
            state.metas[frame].pin_count += 1;
            drop(state);
            let mut replacer = self.replacer.lock().unwrap();
            replacer.record_access(frame);
            replacer.set_evictable(frame, false);
            return Ok(frame);
        }

        let frame = self.obtain_frame(&mut state)?;
        state.metas[frame] = FrameMeta {
            key: Some((fd, page_no)),
            pin_count: 1,
            dirty: false,
        };
        state.page_table.insert((fd, page_no), frame);
        drop(state);

        {
            let mut data = self.slots[frame].data.write().unwrap();
            self.disk.lock().unwrap().read_page(fd, page_no, &mut data)?;
        }

        let mut replacer = self.replacer.lock().unwrap();
        replacer.record_access(frame);
        replacer.set_evictable(frame, false);
        Ok(frame)
    }

    /// Allocates the next page number for `fd` and returns a pinned, zeroed frame.
    pub fn new_page(&self, fd: Fd) -> DbResult<(FrameId, u32)> {
        let page_no = {
            let mut disk = self.disk.lock().unwrap();
            let page_no = disk.allocate_page(fd)?;
            disk.ensure_file_size(fd, page_no + 1)?;
            page_no
        };

        let mut state = self.state.lock().unwrap();
        let frame = self.obtain_frame(&mut state)?;
        state.metas[frame] = FrameMeta {
            key: Some((fd, page_no)),
            pin_count: 1,
            dirty: true,
        };
        state.page_table.insert((fd, page_no), frame);
        self.dirty_count.fetch_add(1, Ordering::SeqCst);
        drop(state);

        *self.slots[frame].data.write().unwrap() = vec![0u8; PAGE_SIZE];

        let mut replacer = self.replacer.lock().unwrap();
        replacer.record_access(frame);
        replacer.set_evictable(frame, false);
        Ok((frame, page_no))
    }

    /// Must be called with `state` locked; picks a frame from the free list or
    /// evicts one, flushing it first if dirty.
    fn obtain_frame(&self, state: &mut PoolState) -> DbResult<FrameId> {
        if let Some(frame) = state.free_list.pop_front() {
            return Ok(frame);
        }
        let victim = self.replacer.lock().unwrap().evict();
        let frame = victim.ok_or_else(|| {
            DbError::Internal("buffer pool exhausted: no frame is evictable".into())
        })?;
        let meta = state.metas[frame];
        if let Some(key) = meta.key {
            if meta.dirty {
                let data = self.slots[frame].data.read().unwrap().clone();
                self.disk.lock().unwrap().write_page(key.0, key.1, &data)?;
            }
            state.page_table.remove(&key);
        }
        Ok(frame)
    }

    /// Reads frame content under a shared latch.
    pub fn read_page<F, R>(&self, frame: FrameId, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        let data = self.slots[frame].data.read().unwrap();
        f(&data)
    }

    /// Mutates frame content under an exclusive latch and marks the frame dirty.
    pub fn write_page<F, R>(&self, frame: FrameId, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let result = {
            let mut data = self.slots[frame].data.write().unwrap();
            f(&mut data)
        };
        let mut state = self.state.lock().unwrap();
        if !state.metas[frame].dirty {
            self.dirty_count.fetch_add(1, Ordering::SeqCst);
        }
        state.metas[frame].dirty = true;
        result
    }

    /// Decrements pin count; the frame becomes evictable at pin count 0.
    /// The dirty bit only ever accumulates here, never clears.
    pub fn unpin_page(&self, frame: FrameId, is_dirty: bool) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let meta = &mut state.metas[frame];
        if meta.pin_count == 0 {
            return Err(DbError::Internal(format!("unpin of frame {frame} with pin_count 0")));
        }
        meta.pin_count -= 1;
        if is_dirty && !meta.dirty {
            self.dirty_count.fetch_add(1, Ordering::SeqCst);
        }
        meta.dirty |= is_dirty;
        let now_evictable = meta.pin_count == 0;
        let dirty_now = meta.dirty;
        drop(state);
        if now_evictable {
            self.replacer.lock().unwrap().set_evictable(frame, true);
        }
        if dirty_now && self.dirty_count.load(Ordering::SeqCst) > self.capacity / 4 {
            self.flush_cv.notify_all();
        }
        Ok(())
    }

    fn flush_frame(&self, frame: FrameId) -> DbResult<()> {
        let (key, dirty) = {
            let state = self.state.lock().unwrap();
            (state.metas[frame].key, state.metas[frame].dirty)
        };
        let Some((fd, page_no)) = key else {
            return Ok(());
        };
        if !dirty {
            return Ok(());
        }
        let data = self.slots[frame].data.read().unwrap().clone();
        self.disk.lock().unwrap().write_page(fd, page_no, &data)?;
        let mut state = self.state.lock().unwrap();
        if state.metas[frame].dirty {
            state.metas[frame].dirty = false;
            self.dirty_count.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Writes the frame holding `(fd, page_no)` if dirty, and clears its dirty bit.
    pub fn flush_page(&self, fd: Fd, page_no: u32) -> DbResult<()> {
        let frame = {
            let state = self.state.lock().unwrap();
            state.page_table.get(&(fd, page_no)).copied()
        };
        if let Some(frame) = frame {
            self.flush_frame(frame)?;
        }
        Ok(())
    }

    /// Drops every frame belonging to `fd`, optionally flushing first.
    pub fn remove_all_pages(&self, fd: Fd, flush: bool) -> DbResult<()> {
        let frames: Vec<FrameId> = {
            let state = self.state.lock().unwrap();
            state
                .page_table
                .iter()
                .filter(|((f, _), _)| *f == fd)
                .map(|(_, &frame)| frame)
                .collect()
        };
        for frame in frames {
            if flush {
                self.flush_frame(frame)?;
            }
            let mut state = self.state.lock().unwrap();
            if let Some(key) = state.metas[frame].key.take() {
                state.page_table.remove(&key);
            }
            state.metas[frame] = FrameMeta::default();
            state.free_list.push_back(frame);
            drop(state);
            self.replacer.lock().unwrap().remove(frame);
        }
        Ok(())
    }

    /// Synchronous flush of every dirty frame, across all files.
    pub fn force_flush_all_pages(&self) -> DbResult<()> {
        let frames: Vec<FrameId> = {
            let state = self.state.lock().unwrap();
            state
                .metas
                .iter()
                .enumerate()
                .filter(|(_, m)| m.dirty && m.key.is_some())
                .map(|(i, _)| i)
                .collect()
        };
        for frame in frames {
            self.flush_frame(frame)?;
        }
        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        self.capacity
    }

    pub fn pin_count(&self, frame: FrameId) -> i64 {
        self.state.lock().unwrap().metas[frame].pin_count
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.flush_cv.notify_all();
        if let Some(handle) = self.flusher.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}
