// src/host/arena.rs

//! Growth-only arena backing the engine's heap.
//!
//! The engine allocates through `allocate` and "frees" through a no-op: no
//! memory goes back to the system allocator while the engine lives. Chunks
//! are carved with a bump pointer and released in bulk when the arena is
//! dropped at bridge teardown.

use log::{debug, error};
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::{Mutex, PoisonError};

/// Alignment of every allocation, enough for any scalar the engine stores.
pub const ARENA_ALIGN: usize = 16;

struct Chunk {
    base: NonNull<u8>,
    layout: Layout,
    used: usize,
}

// SAFETY: a chunk is plain owned memory; it is only touched under the arena lock.
unsafe impl Send for Chunk {}

impl Chunk {
    fn new(size: usize) -> Option<Chunk> {
        let layout = Layout::from_size_align(size, ARENA_ALIGN).ok()?;
        // SAFETY: `size` is non-zero (callers round up to at least ARENA_ALIGN).
        let base = NonNull::new(unsafe { alloc::alloc(layout) })?;
        Some(Chunk {
            base,
            layout,
            used: 0,
        })
    }

    fn remaining(&self) -> usize {
        self.layout.size() - self.used
    }

    fn bump(&mut self, size: usize) -> NonNull<u8> {
        // SAFETY: callers check `remaining() >= size`, so the result stays in bounds.
        let ptr = unsafe { self.base.as_ptr().add(self.used) };
        self.used += size;
        // SAFETY: derived from a non-null base with an in-bounds offset.
        unsafe { NonNull::new_unchecked(ptr) }
    }
}

#[derive(Default)]
struct ArenaInner {
    chunks: Vec<Chunk>,
    allocated_bytes: usize,
}

pub struct Arena {
    chunk_size: usize,
    inner: Mutex<ArenaInner>,
}

fn align_up(value: usize, align: usize) -> Option<usize> {
    Some(value.checked_add(align - 1)? & !(align - 1))
}

impl Arena {
    pub fn new(chunk_size: usize) -> Self {
        Arena {
            chunk_size: align_up(chunk_size.max(ARENA_ALIGN), ARENA_ALIGN).unwrap_or(ARENA_ALIGN),
            inner: Mutex::new(ArenaInner::default()),
        }
    }

    /// Returns `size` bytes aligned to [`ARENA_ALIGN`], or `None` when the
    /// system allocator refuses to grow the arena.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let Some(rounded) = align_up(size.max(1), ARENA_ALIGN) else {
            error!("Arena: Allocation of {} bytes overflows", size);
            return None;
        };

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let fits = inner
            .chunks
            .last()
            .is_some_and(|chunk| chunk.remaining() >= rounded);

        if !fits {
            let chunk_size = rounded.max(self.chunk_size);
            let Some(chunk) = Chunk::new(chunk_size) else {
                error!(
                    "Arena: Failed to grow by {} bytes for a {} byte request",
                    chunk_size, size
                );
                return None;
            };
            debug!(
                "Arena: Added chunk {} ({} bytes)",
                inner.chunks.len(),
                chunk_size
            );
            // A dedicated oversized chunk goes in front of the current one so
            // the partially used chunk keeps serving small requests.
            if chunk_size > self.chunk_size && !inner.chunks.is_empty() {
                let last = inner.chunks.len() - 1;
                inner.chunks.insert(last, chunk);
                inner.allocated_bytes += rounded;
                return Some(inner.chunks[last].bump(rounded));
            }
            inner.chunks.push(chunk);
        }

        inner.allocated_bytes += rounded;
        inner.chunks.last_mut().map(|chunk| chunk.bump(rounded))
    }

    /// Intentionally does nothing. Memory is reclaimed when the arena drops.
    pub fn free(&self, _ptr: *mut u8) {}

    /// Bytes handed out so far (after alignment rounding).
    pub fn allocated_bytes(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .allocated_bytes
    }

    pub fn chunk_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .chunks
            .len()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        debug!(
            "Arena: Releasing {} chunks ({} bytes handed out)",
            inner.chunks.len(),
            inner.allocated_bytes
        );
        for chunk in inner.chunks.drain(..) {
            // SAFETY: every chunk was allocated in `Chunk::new` with exactly this layout.
            unsafe { alloc::dealloc(chunk.base.as_ptr(), chunk.layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_aligned_and_distinct() {
        let arena = Arena::new(1024);
        let a = arena.allocate(3).expect("alloc");
        let b = arena.allocate(40).expect("alloc");
        let c = arena.allocate(0).expect("alloc");

        for ptr in [a, b, c] {
            assert_eq!(ptr.as_ptr() as usize % ARENA_ALIGN, 0);
        }
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 16);
        assert_eq!(c.as_ptr() as usize - b.as_ptr() as usize, 48);
        assert_eq!(arena.allocated_bytes(), 16 + 48 + 16);
        assert_eq!(arena.chunk_count(), 1);
    }

    #[test]
    fn arena_grows_by_chunks() {
        let arena = Arena::new(64);
        for _ in 0..4 {
            arena.allocate(16).expect("alloc");
        }
        assert_eq!(arena.chunk_count(), 1);
        arena.allocate(16).expect("alloc");
        assert_eq!(arena.chunk_count(), 2);
    }

    #[test]
    fn oversized_request_gets_its_own_chunk() {
        let arena = Arena::new(64);
        let small = arena.allocate(16).expect("alloc");
        let big = arena.allocate(1000).expect("alloc");
        let next_small = arena.allocate(16).expect("alloc");

        assert_eq!(arena.chunk_count(), 2);
        // The first chunk keeps serving small requests.
        assert_eq!(next_small.as_ptr() as usize - small.as_ptr() as usize, 16);
        assert_ne!(big, next_small);
    }

    #[test]
    fn memory_is_writable_for_the_requested_size() {
        let arena = Arena::new(128);
        let ptr = arena.allocate(100).expect("alloc");
        // SAFETY: the arena handed out at least 100 bytes at `ptr`.
        let bytes = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), 100) };
        bytes.fill(0xAB);
        assert!(bytes.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn free_is_a_no_op() {
        let arena = Arena::new(64);
        let ptr = arena.allocate(32).expect("alloc");
        arena.free(ptr.as_ptr());
        arena.free(std::ptr::null_mut());
        assert_eq!(arena.allocated_bytes(), 32);
        let next = arena.allocate(16).expect("alloc");
        assert_ne!(next, ptr);
    }

    #[test]
    fn absurd_size_fails_cleanly() {
        let arena = Arena::new(64);
        assert!(arena.allocate(usize::MAX).is_none());
        assert!(arena.allocate(usize::MAX - 4).is_none());
    }
}
