// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Shared scratch stack and per-coroutine snapshots.
//!
//! Every coroutine executes on the same mapped region. When one suspends,
//! the bytes between its stack pointer and the region top are copied into
//! its `Snapshot`; on resume they are copied back to the same addresses, so
//! pointers into its own frames stay valid. All raw copying lives here.

use std::io;
use std::ptr;

use crate::error::CoError;

/// Bounds of a stack a context can be bound to. Grows down from `top()`.
#[derive(Debug, Clone, Copy)]
pub struct StackRegion {
    base: *mut u8,
    len: usize,
}

impl StackRegion {
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the highest usable byte. Page aligned.
    pub fn top(&self) -> usize {
        self.base as usize + self.len
    }
}

/// The one real stack coroutines run on, with an inaccessible guard page
/// below it so overflow faults instead of scribbling on the heap.
pub(crate) struct ScratchStack {
    map: *mut u8,
    map_len: usize,
    guard: usize,
}

impl ScratchStack {
    /// Map `size` bytes (rounded up to whole pages) plus one guard page.
    pub fn map(size: usize) -> Result<Self, CoError> {
        #[cfg(not(target_os = "macos"))]
        use libc::MAP_STACK;
        #[cfg(target_os = "macos")]
        const MAP_STACK: libc::c_int = 0;

        let page = page_size();
        let size = size.div_ceil(page) * page;
        let map_len = size + page;

        // SAFETY: anonymous private mapping, no existing memory is touched.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | MAP_STACK,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(CoError::StackAlloc {
                size,
                source: io::Error::last_os_error(),
            });
        }

        // SAFETY: the first page belongs to the mapping created above.
        if unsafe { libc::mprotect(ptr, page, libc::PROT_NONE) } != 0 {
            let source = io::Error::last_os_error();
            unsafe { libc::munmap(ptr, map_len) };
            return Err(CoError::StackAlloc { size, source });
        }

        Ok(Self {
            map: ptr as *mut u8,
            map_len,
            guard: page,
        })
    }

    /// Usable part of the mapping, guard page excluded.
    pub fn region(&self) -> StackRegion {
        StackRegion {
            // SAFETY: guard < map_len, stays inside the mapping.
            base: unsafe { self.map.add(self.guard) },
            len: self.map_len - self.guard,
        }
    }

    pub fn size(&self) -> usize {
        self.map_len - self.guard
    }

    pub fn top(&self) -> usize {
        self.region().top()
    }

    /// Copy the live span `[sp, top)` into `snapshot`.
    ///
    /// Returns the span length. `Err(depth)` if `sp` lies outside the
    /// usable region; the snapshot is left untouched in that case.
    ///
    /// # Safety
    /// No context may be executing on the scratch stack while this runs.
    pub unsafe fn save(&self, sp: usize, snapshot: &mut Snapshot) -> Result<usize, usize> {
        let region = self.region();
        let top = region.top();
        let depth = top.wrapping_sub(sp);
        if sp > top || depth > region.len() {
            return Err(depth);
        }
        let live = std::slice::from_raw_parts(sp as *const u8, depth);
        snapshot.fill(live);
        Ok(depth)
    }

    /// Copy `snapshot` back so its last byte sits just below the top.
    ///
    /// # Safety
    /// No context may be executing on the scratch stack while this runs,
    /// and `snapshot` must have been produced by `save` on this stack.
    pub unsafe fn restore(&self, snapshot: &Snapshot) {
        let len = snapshot.len();
        debug_assert!(len <= self.size());
        let dst = (self.top() - len) as *mut u8;
        ptr::copy_nonoverlapping(snapshot.bytes.as_ptr(), dst, len);
    }
}

impl Drop for ScratchStack {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.map as *mut libc::c_void, self.map_len) };
    }
}

impl std::fmt::Debug for ScratchStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchStack")
            .field("top", &format_args!("{:#x}", self.top()))
            .field("size", &self.size())
            .finish()
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

/// Saved stack bytes of a suspended coroutine.
///
/// Capacity only ever grows, to the deepest stack seen so far. `len()` is
/// the depth at the most recent suspend.
#[derive(Default)]
pub struct Snapshot {
    bytes: Vec<u8>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    fn fill(&mut self, live: &[u8]) {
        self.bytes.clear();
        self.bytes.reserve_exact(live.len());
        self.bytes.extend_from_slice(live);
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
