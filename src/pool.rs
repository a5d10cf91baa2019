//! A single aligned byte arena used as a bump-plus-free-list allocator for
//! mesh/texture payload bytes (§4.1).
//!
//! Grounded in `Core/Memory/MemoryPool.cpp` from the original engine: the
//! three-branch allocation failure order, the O(1) hash-indexed free with
//! sequential-index renumbering, and the cursor-reset-to-end-of-last-record
//! behavior are all taken from that source. `defragment_pool`/`realloc_pool`
//! are not present there (the source commentary around them is
//! contradictory — see DESIGN.md's open-question #2) and are designed here
//! from the invariants in SPEC_FULL.md §8.
//!
//! Unlike the original, raw pool pointers are never handed to callers (§9,
//! "pool pointer hazards"): allocations are identified by an opaque
//! [`PoolOffset`], and reading/writing the backing bytes goes through
//! copy-in/copy-out accessors so no client can hold a reference across a
//! defragment or realloc.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{AllocErrorFlags, Error, Result};

/// An opaque token identifying a live allocation. Never dereferenced by
/// client code directly; pass it back to [`MemoryPool`] methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolOffset(usize);

impl PoolOffset {
    #[inline]
    pub fn raw(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct AllocRecord {
    offset: usize,
    size: usize,
    sequential_index: usize,
}

fn align_up(size: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (size + alignment - 1) & !(alignment - 1)
}

struct PoolInner {
    data: Vec<u8>,
    size: usize,
    cursor: usize,
    used_bytes: usize,
    alloc_data: Vec<AllocRecord>,
    alloc_index_by_offset: HashMap<usize, usize>,
    last_error: Option<(usize, AllocErrorFlags)>,
}

impl PoolInner {
    fn is_fragmented_locked(&self) -> bool {
        let mut expected = 0usize;
        for rec in &self.alloc_data {
            if rec.offset != expected {
                return true;
            }
            expected += rec.size;
        }
        false
    }
}

/// A single contiguous byte block with bump-allocation, O(1) free, and
/// relocation-callback-driven defragmentation / growth.
pub struct MemoryPool {
    alignment: usize,
    inner: Mutex<PoolInner>,
}

impl MemoryPool {
    /// `alignment` must be a power of two; `size` is rounded up to a
    /// multiple of `alignment`.
    pub fn allocate_pool(size: usize, alignment: usize) -> Result<Self> {
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(Error::parser_fail(format!(
                "pool alignment {alignment} is not a power of two"
            )));
        }
        let size = align_up(size, alignment);
        Ok(MemoryPool {
            alignment,
            inner: Mutex::new(PoolInner {
                data: vec![0u8; size],
                size,
                cursor: 0,
                used_bytes: 0,
                alloc_data: Vec::new(),
                alloc_index_by_offset: HashMap::new(),
                last_error: None,
            }),
        })
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn size(&self) -> usize {
        self.inner.lock().size
    }

    pub fn used_bytes(&self) -> usize {
        self.inner.lock().used_bytes
    }

    pub fn free_bytes(&self) -> usize {
        let inner = self.inner.lock();
        inner.size - inner.used_bytes
    }

    pub fn is_fragmented(&self) -> bool {
        self.inner.lock().is_fragmented_locked()
    }

    pub fn can_alloc(&self, size: usize) -> bool {
        let aligned = align_up(size, self.alignment);
        aligned <= self.free_bytes()
    }

    pub fn get_last_error(&self) -> Option<(usize, AllocErrorFlags)> {
        self.inner.lock().last_error
    }

    /// Allocate `requested_size` bytes, rounded up to the pool's alignment.
    /// Never splits an existing record; always advances the cursor.
    pub fn alloc(&self, requested_size: usize) -> Result<PoolOffset> {
        let aligned_size = align_up(requested_size, self.alignment);

        // Branch 1: terminal, no amount of defragmentation helps.
        if aligned_size > self.size() {
            let flags = AllocErrorFlags {
                pool_out_of_memory: true,
                alloc_size_greater_than_pool_size: true,
                pool_fragmented: self.is_fragmented(),
            };
            self.record_error(requested_size, flags);
            return Err(Error::AllocError {
                failed_size: requested_size,
                flags,
            });
        }

        let mut inner = self.inner.lock();

        // Branch 2: not enough total free room anywhere in the pool.
        if aligned_size > inner.size - inner.used_bytes {
            let flags = AllocErrorFlags {
                pool_out_of_memory: true,
                pool_fragmented: inner.is_fragmented_locked(),
                ..Default::default()
            };
            inner.last_error = Some((requested_size, flags));
            return Err(Error::AllocError {
                failed_size: requested_size,
                flags,
            });
        }

        // Branch 3: enough total room, but not contiguously at the cursor.
        if inner.cursor + aligned_size > inner.size {
            let flags = AllocErrorFlags {
                pool_fragmented: true,
                ..Default::default()
            };
            inner.last_error = Some((requested_size, flags));
            return Err(Error::AllocError {
                failed_size: requested_size,
                flags,
            });
        }

        let offset = inner.cursor;
        let sequential_index = inner.alloc_data.len();
        inner.alloc_data.push(AllocRecord {
            offset,
            size: aligned_size,
            sequential_index,
        });
        inner.alloc_index_by_offset.insert(offset, sequential_index);
        inner.cursor += aligned_size;
        inner.used_bytes += aligned_size;
        Ok(PoolOffset(offset))
    }

    fn record_error(&self, failed_size: usize, flags: AllocErrorFlags) {
        self.inner.lock().last_error = Some((failed_size, flags));
    }

    /// Free a previously-allocated offset. `offset` must have come from
    /// [`alloc`](Self::alloc) on this pool; passing anything else is a
    /// contract violation caught only in debug builds, matching the
    /// source's `ionassert`-guarded precondition.
    pub fn free(&self, offset: PoolOffset) {
        let mut inner = self.inner.lock();
        let Some(&index) = inner.alloc_index_by_offset.get(&offset.0) else {
            debug_assert!(false, "free() called with an offset not owned by this pool");
            return;
        };

        let record = inner.alloc_data.remove(index);
        inner.alloc_index_by_offset.remove(&record.offset);
        inner.used_bytes -= record.size;

        for rec in inner.alloc_data[index..].iter_mut() {
            rec.sequential_index -= 1;
            *inner
                .alloc_index_by_offset
                .get_mut(&rec.offset)
                .expect("alloc_index_by_offset out of sync with alloc_data") -= 1;
        }

        inner.cursor = inner
            .alloc_data
            .last()
            .map(|r| r.offset + r.size)
            .unwrap_or(0);
    }

    /// Copy `data` into the allocation at `offset`. `data.len()` must not
    /// exceed the record's allocated size.
    pub fn write(&self, offset: PoolOffset, data: &[u8]) {
        let mut inner = self.inner.lock();
        let end = offset.0 + data.len();
        inner.data[offset.0..end].copy_from_slice(data);
    }

    /// Copy `len` bytes out of the allocation at `offset`.
    pub fn read(&self, offset: PoolOffset, len: usize) -> Vec<u8> {
        let inner = self.inner.lock();
        inner.data[offset.0..offset.0 + len].to_vec()
    }

    /// Close every gap left by prior `free` calls, relocating live data
    /// down to keep the pool contiguous from the base. `on_relocate` is
    /// invoked exactly once per record whose offset actually moved.
    pub fn defragment_pool(&self, mut on_relocate: impl FnMut(PoolOffset, PoolOffset)) {
        let mut inner = self.inner.lock();
        let mut expected = 0usize;
        for i in 0..inner.alloc_data.len() {
            let (old_offset, size) = {
                let rec = inner.alloc_data[i];
                (rec.offset, rec.size)
            };
            if old_offset != expected {
                inner.data.copy_within(old_offset..old_offset + size, expected);
                inner.alloc_index_by_offset.remove(&old_offset);
                inner.alloc_index_by_offset.insert(expected, i);
                inner.alloc_data[i].offset = expected;
                on_relocate(PoolOffset(old_offset), PoolOffset(expected));
            }
            expected += size;
        }
        inner.cursor = expected;
    }

    /// Grow (or shrink, down to `used_bytes`) the pool to `new_size`,
    /// rounded up to the pool's alignment. `on_relocate` is invoked once
    /// per live record, even when its offset does not change, since the
    /// backing allocation itself is new.
    pub fn realloc_pool(
        &self,
        new_size: usize,
        mut on_relocate: impl FnMut(PoolOffset, PoolOffset),
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let new_size = align_up(new_size.max(inner.used_bytes), self.alignment);

        let mut new_data = vec![0u8; new_size];
        for rec in &inner.alloc_data {
            new_data[rec.offset..rec.offset + rec.size]
                .copy_from_slice(&inner.data[rec.offset..rec.offset + rec.size]);
        }
        inner.data = new_data;
        inner.size = new_size;

        for rec in &inner.alloc_data {
            on_relocate(PoolOffset(rec.offset), PoolOffset(rec.offset));
        }
        Ok(())
    }

    /// Compute the next pool size to try after an `AllocError`, per §4.1's
    /// remediation contract: double the pool, or — when a single
    /// allocation exceeds the whole pool — round up to a 64 KiB multiple
    /// of four times the failed size.
    pub fn next_grow_size(&self, failed_size: usize, flags: AllocErrorFlags) -> usize {
        const SIXTY_FOUR_KIB: usize = 64 * 1024;
        if flags.alloc_size_greater_than_pool_size {
            let target = failed_size * 4;
            align_up(target, SIXTY_FOUR_KIB)
        } else {
            (self.size() * 2).max(self.alignment)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(size: usize, align: usize) -> MemoryPool {
        MemoryPool::allocate_pool(size, align).unwrap()
    }

    #[test]
    fn invariant_1_allocations_are_disjoint() {
        let p = pool(1024, 16);
        let a = p.alloc(100).unwrap();
        let b = p.alloc(200).unwrap();
        let aligned_a = align_up(100, 16);
        assert!(a.raw() + aligned_a <= b.raw());
    }

    #[test]
    fn invariant_2_used_bytes_matches_sum_of_aligned_sizes() {
        let p = pool(1024, 32);
        p.alloc(10).unwrap();
        p.alloc(50).unwrap();
        assert_eq!(p.used_bytes(), align_up(10, 32) + align_up(50, 32));
    }

    #[test]
    fn alloc_size_greater_than_pool_size_is_terminal() {
        let p = pool(64, 16);
        let err = p.alloc(1024).unwrap_err();
        match err {
            Error::AllocError { flags, .. } => {
                assert!(flags.alloc_size_greater_than_pool_size);
                assert!(flags.pool_out_of_memory);
            }
            _ => panic!("expected AllocError"),
        }
    }

    #[test]
    fn alloc_fails_with_pool_fragmented_when_room_exists_but_not_at_cursor() {
        let p = pool(16 * 1024, 4096);
        let p1 = p.alloc(4096).unwrap();
        let _p2 = p.alloc(8192).unwrap();
        let _p3 = p.alloc(4096).unwrap();
        p.free(p1);
        // 4 KiB is free (from p1) but it's a gap before the cursor, which
        // sits at the end of the pool (all three allocations consumed it).
        let err = p.alloc(4096).unwrap_err();
        match err {
            Error::AllocError { flags, .. } => assert!(flags.pool_fragmented),
            _ => panic!("expected AllocError"),
        }
    }

    #[test]
    fn s4_pool_fragmentation_then_defragment() {
        let alignment = 4096;
        let p = pool(64 * 1024, alignment);
        let p1 = p.alloc(4096).unwrap();
        let p2 = p.alloc(8192).unwrap();
        let p3 = p.alloc(4096).unwrap();
        p.free(p2);
        assert!(p.is_fragmented());

        let used_before = p.used_bytes();
        let mut relocations = Vec::new();
        p.defragment_pool(|old, new| relocations.push((old, new)));

        assert_eq!(relocations.len(), 1);
        assert_eq!(relocations[0].0, p3);
        assert_eq!(relocations[0].1.raw(), p1.raw() + align_up(4096, alignment));
        assert_eq!(p.used_bytes(), used_before);
        assert!(!p.is_fragmented());

        // The gap left by p2 (8 KiB) is now reclaimed at the cursor.
        assert!(p.alloc(8192).is_ok());
    }

    #[test]
    fn invariant_3_unmoved_records_are_not_relocated() {
        let alignment = 64;
        let p = pool(4096, alignment);
        let p1 = p.alloc(64).unwrap();
        let _p2 = p.alloc(64).unwrap();
        // Nothing freed, nothing fragmented: defragment should be a no-op.
        let mut calls = 0;
        p.defragment_pool(|_, _| calls += 1);
        assert_eq!(calls, 0);
        assert_eq!(p1.raw(), 0);
    }

    #[test]
    fn invariant_4_realloc_preserves_bytes_and_calls_cb_once_per_record() {
        let p = pool(256, 32);
        let a = p.alloc(10).unwrap();
        p.write(a, b"hello pool");
        let b = p.alloc(10).unwrap();
        p.write(b, b"second rec");

        let mut calls = 0;
        p.realloc_pool(8192, |_, _| calls += 1).unwrap();

        assert_eq!(calls, 2);
        assert_eq!(&p.read(a, 10), b"hello pool");
        assert_eq!(&p.read(b, 10), b"second rec");
        assert_eq!(p.size(), 8192);
    }

    #[test]
    fn free_resets_cursor_to_end_of_last_live_record() {
        let p = pool(4096, 64);
        let p1 = p.alloc(64).unwrap();
        let _p2 = p.alloc(64).unwrap();
        p.free(p1);
        // Freeing the first of two records shifts the second one's
        // sequential index down but the cursor stays at the true end of
        // all remaining live data.
        assert_eq!(p.used_bytes(), 64);
        let p3 = p.alloc(64).unwrap();
        assert!(p3.raw() >= 64);
    }

    #[test]
    fn free_of_everything_resets_cursor_to_base() {
        let p = pool(1024, 32);
        let a = p.alloc(32).unwrap();
        p.free(a);
        assert_eq!(p.used_bytes(), 0);
        let b = p.alloc(32).unwrap();
        assert_eq!(b.raw(), 0);
    }

    #[test]
    fn next_grow_size_doubles_normally_and_rounds_up_when_oversized() {
        let p = pool(1024, 64);
        let normal = p.next_grow_size(10, AllocErrorFlags { pool_out_of_memory: true, ..Default::default() });
        assert_eq!(normal, 2048);

        let oversized = p.next_grow_size(
            100_000,
            AllocErrorFlags {
                pool_out_of_memory: true,
                alloc_size_greater_than_pool_size: true,
                pool_fragmented: false,
            },
        );
        assert_eq!(oversized % (64 * 1024), 0);
        assert!(oversized >= 100_000 * 4);
    }
}
