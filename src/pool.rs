//! Fixed-block memory pool: a bitmap-indexed chain of equally-sized "silos".
//!
//! Each silo tracks up to `K` blocks with a single bitmap word. Allocation
//! scans the chain tail-first (the most recently grown silo drains last,
//! biasing new allocations away from older, more likely-to-be-released
//! silos); deallocation classifies the freed pointer against each silo's
//! address range and may shrink the chain once a silo falls idle.
//!
//! `K` is a const generic bounded by the bitmap width (`u32`, so `K <= 32`);
//! the source this is modeled on hard-codes `K = 32`, which is also this
//! module's default.

use core::alloc::Layout;
use core::cell::Cell;
use core::mem::{align_of, size_of};
use core::ptr::NonNull;

use crate::error::PoolError;
use crate::host::{HostAllocator, SystemHostAllocator};

const fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

const fn full_mask(k: usize) -> u32 {
    if k >= 32 {
        u32::MAX
    } else {
        (1u32 << k) - 1
    }
}

/// The pool's reservation state, replacing the reference design's packed
/// signed integer (negative = permanent, positive = one-use, `== K` = idle)
/// with an explicit sum type (see the design notes on reservation counters).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// No standing reservation; the shrink policy is free to release empty
    /// silos.
    Idle,
    /// At least `n` free blocks are guaranteed for the next allocations;
    /// each successful `alloc` that draws on the reservation decrements it.
    OneUse(usize),
    /// Like `OneUse`, but never decremented by ordinary allocation and never
    /// cleared except by an explicit `Reserve(.., Release)`.
    Permanent(usize),
}

/// The mode passed to [`Pool::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveMode {
    /// Grant a reservation that ordinary allocation is allowed to consume.
    OneUse,
    /// Grant a reservation that persists until explicitly released.
    Permanent,
    /// Clear any standing reservation and run a full empty-silo sweep.
    Release,
}

/// A snapshot of pool state, returned by [`Pool::statistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// The (pointer-alignment-rounded) size of one block.
    pub block_size: usize,
    /// Total blocks across all silos (`K * number_of_silos`).
    pub capacity: usize,
    /// Blocks currently allocated.
    pub used: usize,
    /// `capacity - used`.
    pub free: usize,
    /// The current reservation state.
    pub reservation: Reservation,
    /// Whether the pool was configured for non-blocking host growth.
    pub non_blocking: bool,
    /// Whether allocated blocks are zero-filled.
    pub zero_on_alloc: bool,
}

struct Silo<const K: usize> {
    next: Cell<Option<NonNull<Silo<K>>>>,
    prev: Cell<Option<NonNull<Silo<K>>>>,
    bitmap: Cell<u32>,
    blocks: NonNull<u8>,
    limit: *const u8,
}

impl<const K: usize> Silo<K> {
    fn is_full(&self) -> bool {
        (self.bitmap.get() & full_mask(K)) == full_mask(K)
    }

    fn is_empty(&self) -> bool {
        (self.bitmap.get() & full_mask(K)) == 0
    }

    fn contains(&self, ptr: NonNull<u8>) -> bool {
        let p = ptr.as_ptr() as *const u8;
        p >= self.blocks.as_ptr() as *const u8 && p < self.limit
    }

    /// Finds the first free slot, skipping fully-used bytes, mirroring the
    /// reference implementation's byte-granular `0xFF` short-circuit.
    fn find_free_slot(&self) -> Option<usize> {
        let search = self.bitmap.get() | !full_mask(K);
        if search == u32::MAX {
            return None;
        }
        let bytes = search.to_le_bytes();
        for (byte_idx, byte) in bytes.iter().enumerate() {
            if *byte != 0xFF {
                for bit in 0..8 {
                    if byte & (1 << bit) == 0 {
                        let slot = byte_idx * 8 + bit;
                        if slot < K {
                            return Some(slot);
                        }
                    }
                }
            }
        }
        None
    }

    fn set_used(&self, slot: usize) {
        self.bitmap.set(self.bitmap.get() | (1 << slot));
    }

    fn set_free(&self, slot: usize) {
        self.bitmap.set(self.bitmap.get() & !(1u32 << slot));
    }

    fn slot_ptr(&self, slot: usize, block_size: usize) -> NonNull<u8> {
        let raw = unsafe { self.blocks.as_ptr().add(slot * block_size) };
        // SAFETY: `raw` is derived from the silo's own live allocation.
        unsafe { NonNull::new_unchecked(raw) }
    }

    fn slot_of(&self, ptr: NonNull<u8>, block_size: usize) -> usize {
        let offset = ptr.as_ptr() as usize - self.blocks.as_ptr() as usize;
        offset / block_size
    }
}

fn blocks_layout(block_size: usize, k: usize) -> Option<Layout> {
    Layout::from_size_align(block_size.checked_mul(k)?, align_of::<usize>()).ok()
}

fn box_silo<const K: usize>(blocks: NonNull<u8>, limit: *const u8) -> NonNull<Silo<K>> {
    let silo = alloc::boxed::Box::new(Silo {
        next: Cell::new(None),
        prev: Cell::new(None),
        bitmap: Cell::new(0),
        blocks,
        limit,
    });
    NonNull::from(alloc::boxed::Box::leak(silo))
}

/// An opaque handle a [`crate::list::List`] uses to route node storage
/// through a pool without depending on the pool's concrete type or silo
/// capacity. The list never reaches past this trait into pool internals.
pub trait PoolHandle {
    /// The block size this pool was configured with.
    fn block_size(&self) -> usize;
    /// Whether this pool zero-fills every block it returns.
    fn zeroes_on_alloc(&self) -> bool;
    /// Allocates one block, per [`Pool::alloc`].
    fn pool_alloc(&mut self) -> Option<NonNull<u8>>;
    /// Deallocates one block, per [`Pool::dealloc`].
    ///
    /// # Safety
    /// `block`, if present, must have been returned by this same pool's
    /// `pool_alloc` and not already freed.
    unsafe fn pool_dealloc(&mut self, block: &mut Option<NonNull<u8>>);
}

/// A fixed-block memory pool: `K` blocks per silo, growing and shrinking the
/// silo chain on demand.
pub struct Pool<A: HostAllocator = SystemHostAllocator, const K: usize = 32> {
    block_size: usize,
    non_blocking: bool,
    zero_on_alloc: bool,
    used: usize,
    num_silos: usize,
    reservation: Reservation,
    first_silo: NonNull<Silo<K>>,
    last_silo: NonNull<Silo<K>>,
    allocator: A,
}

impl<A: HostAllocator + Default, const K: usize> Pool<A, K> {
    /// Initializes a pool with the default-constructed host allocator.
    pub fn new(block_size: usize, non_blocking: bool, zero_on_alloc: bool) -> Option<Self> {
        Self::with_allocator(block_size, non_blocking, zero_on_alloc, A::default())
    }
}

impl<A: HostAllocator, const K: usize> Pool<A, K> {
    /// Initializes a pool backed by `allocator`. `block_size` is rounded up
    /// to pointer alignment; the embedded first silo is allocated
    /// immediately and is permanent (never released by the shrink policy).
    pub fn with_allocator(
        block_size: usize,
        non_blocking: bool,
        zero_on_alloc: bool,
        allocator: A,
    ) -> Option<Self> {
        assert!(K >= 1 && K <= 32, "silo capacity K must be in 1..=32");
        let block_size = align_up(block_size.max(size_of::<usize>()), align_of::<usize>());
        let layout = blocks_layout(block_size, K)?;
        let blocks = if zero_on_alloc {
            allocator.alloc_zeroed(layout)?
        } else {
            allocator.alloc(layout)?
        };
        let limit = unsafe { blocks.as_ptr().add(block_size * K) } as *const u8;
        let first_silo = box_silo(blocks, limit);

        Some(Self {
            block_size,
            non_blocking,
            zero_on_alloc,
            used: 0,
            num_silos: 1,
            reservation: Reservation::Idle,
            first_silo,
            last_silo: first_silo,
            allocator,
        })
    }

    /// Grows the chain by one silo, using the non-blocking primitive if
    /// `no_wait` is set (or the pool is configured non-blocking), the
    /// blocking primitive otherwise.
    fn create_silo(&mut self, no_wait: bool) -> Option<NonNull<Silo<K>>> {
        let layout = blocks_layout(self.block_size, K)?;
        let blocks = if no_wait {
            if self.zero_on_alloc {
                // `alloc_no_wait` has no zeroed variant in the host
                // contract; zero manually after a successful non-blocking
                // allocation.
                let ptr = self.allocator.alloc_no_wait(layout)?;
                unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, layout.size()) };
                ptr
            } else {
                self.allocator.alloc_no_wait(layout)?
            }
        } else if self.zero_on_alloc {
            self.allocator.alloc_zeroed(layout)?
        } else {
            self.allocator.alloc(layout)?
        };

        let limit = unsafe { blocks.as_ptr().add(self.block_size * K) } as *const u8;
        let silo_ptr = box_silo(blocks, limit);

        unsafe {
            silo_ptr.as_ref().prev.set(Some(self.last_silo));
            self.last_silo.as_ref().next.set(Some(silo_ptr));
        }
        self.last_silo = silo_ptr;
        self.num_silos += 1;

        #[cfg(feature = "diagnostics")]
        tracing::debug!(block_size = self.block_size, num_silos = self.num_silos, "silo created");

        Some(silo_ptr)
    }

    fn first_silo_ptr(&self) -> NonNull<Silo<K>> {
        self.first_silo
    }

    fn is_embedded(&self, silo: NonNull<Silo<K>>) -> bool {
        silo == self.first_silo_ptr()
    }

    /// Scans tail-to-head for a silo with a free slot, creating a new one if
    /// every existing silo is full.
    fn alloc_raw(&mut self, no_wait: bool) -> Option<NonNull<u8>> {
        let mut cursor = Some(self.last_silo);
        while let Some(silo) = cursor {
            let silo_ref = unsafe { silo.as_ref() };
            if let Some(slot) = silo_ref.find_free_slot() {
                silo_ref.set_used(slot);
                let ptr = silo_ref.slot_ptr(slot, self.block_size);
                if self.zero_on_alloc {
                    unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, self.block_size) };
                }
                self.used += 1;
                self.consume_reservation();
                return Some(ptr);
            }
            cursor = unsafe { silo.as_ref().prev.get() };
        }

        let silo = self.create_silo(no_wait || self.non_blocking)?;
        let silo_ref = unsafe { silo.as_ref() };
        // A freshly created silo always has a free slot 0.
        let slot = silo_ref.find_free_slot()?;
        silo_ref.set_used(slot);
        let ptr = silo_ref.slot_ptr(slot, self.block_size);
        if self.zero_on_alloc {
            unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, self.block_size) };
        }
        self.used += 1;
        self.consume_reservation();
        Some(ptr)
    }

    fn consume_reservation(&mut self) {
        if let Reservation::OneUse(n) = self.reservation {
            self.reservation = if n <= 1 { Reservation::Idle } else { Reservation::OneUse(n - 1) };
        }
    }

    /// Allocates one block. Returns `None` only when the pool is configured
    /// non-blocking and the host declines to grow the chain.
    pub fn alloc(&mut self) -> Option<NonNull<u8>> {
        self.alloc_raw(false)
    }

    /// Same as [`Self::alloc`] but returns a [`PoolError`] instead of `None`
    /// so callers composing with `?` get a named failure.
    pub fn try_alloc(&mut self) -> Result<NonNull<u8>, PoolError> {
        self.alloc().ok_or(PoolError::HostDeclined)
    }

    /// Allocates a block of `size` bytes. If `size <= block_size`, behaves
    /// exactly like [`Self::alloc`] (with the given override flags); larger
    /// requests bypass the pool entirely and go straight to the host
    /// allocator, zeroing exactly `size` bytes when `zero` is set (the
    /// reference implementation under-zeros this path by using
    /// `block_size` regardless of `size`; this is treated as a bug and
    /// fixed here, see the design notes on the open questions).
    pub fn alloc_flexible(&mut self, size: usize, non_blocking: bool, zero: bool) -> Option<NonNull<u8>> {
        if size <= self.block_size {
            let saved_non_blocking = self.non_blocking;
            let saved_zero = self.zero_on_alloc;
            self.non_blocking = non_blocking;
            self.zero_on_alloc = zero;
            let result = self.alloc_raw(non_blocking);
            self.non_blocking = saved_non_blocking;
            self.zero_on_alloc = saved_zero;
            return result;
        }

        let layout = Layout::from_size_align(size, align_of::<usize>()).ok()?;
        if non_blocking {
            let ptr = self.allocator.alloc_no_wait(layout)?;
            if zero {
                unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, size) };
            }
            Some(ptr)
        } else if zero {
            self.allocator.alloc_zeroed(layout)
        } else {
            self.allocator.alloc(layout)
        }
    }

    /// Classifies `block` against the silo chain and frees it; if it
    /// belongs to no silo, delegates to the host deallocator. Either way,
    /// `*block` is set to `None` on return (the double-pointer form, per
    /// the resolved open question on `MPoolDealloc`'s signature). A `None`
    /// input is a no-op.
    pub fn dealloc(&mut self, block: &mut Option<NonNull<u8>>) {
        let Some(ptr) = *block else { return };

        let mut cursor = Some(self.last_silo);
        while let Some(silo) = cursor {
            let silo_ref = unsafe { silo.as_ref() };
            if silo_ref.contains(ptr) {
                let slot = silo_ref.slot_of(ptr, self.block_size);
                silo_ref.set_free(slot);
                self.used -= 1;
                self.maybe_shrink(false);
                *block = None;
                return;
            }
            cursor = unsafe { silo.as_ref().prev.get() };
        }

        let layout = Layout::from_size_align(self.block_size, align_of::<usize>())
            .unwrap_or_else(|_| Layout::new::<usize>());
        unsafe { self.allocator.dealloc(ptr, layout) };
        *block = None;
    }

    fn capacity(&self) -> usize {
        self.num_silos * K
    }

    /// Shrink policy: with more than one silo, reservation idle, and
    /// `capacity > 2 * used`, release the first fully empty non-embedded
    /// silo found scanning from the second silo onward (never the silo that
    /// was just touched by the caller in particular — any silo in the chain
    /// may have gone empty earlier and been left behind by a reservation
    /// that has since cleared). `release_all` releases every such silo
    /// instead of just the first (used when a reservation transitions to
    /// `Release`).
    fn maybe_shrink(&mut self, release_all: bool) {
        if self.num_silos <= 1 {
            return;
        }
        if !release_all {
            if self.reservation != Reservation::Idle {
                return;
            }
            if self.capacity() <= 2 * self.used {
                return;
            }
        }

        let mut cursor = unsafe { self.first_silo_ptr().as_ref().next.get() };
        while let Some(silo) = cursor {
            cursor = unsafe { silo.as_ref().next.get() };
            if unsafe { silo.as_ref() }.is_empty() {
                self.release_silo(silo);
                if !release_all {
                    return;
                }
            }
        }
    }

    fn release_silo(&mut self, silo: NonNull<Silo<K>>) {
        debug_assert!(!self.is_embedded(silo));
        let (prev, next) = unsafe { (silo.as_ref().prev.get(), silo.as_ref().next.get()) };
        match prev {
            Some(p) => unsafe { p.as_ref().next.set(next) },
            None => {}
        }
        match next {
            Some(n) => unsafe { n.as_ref().prev.set(prev) },
            None => self.last_silo = prev.unwrap_or_else(|| self.first_silo_ptr()),
        }
        self.num_silos -= 1;

        let boxed = unsafe { alloc::boxed::Box::from_raw(silo.as_ptr()) };
        let layout = blocks_layout(self.block_size, K);
        if let Some(layout) = layout {
            unsafe { self.allocator.dealloc(boxed.blocks, layout) };
        }
        drop(boxed);

        #[cfg(feature = "diagnostics")]
        tracing::debug!(num_silos = self.num_silos, "silo released");
    }

    /// If `block` lies inside a pool silo, moves its content to a freshly
    /// host-allocated block of the same size, frees the pool slot, and
    /// rewrites `*block`; returns `true`. If `block` is not pool-owned,
    /// returns `true` with no change (per this document's §4.1 contract;
    /// the reference implementation's fall-through failure in this case is
    /// not carried forward, see the design notes). Returns `false` only
    /// when the host declines the replacement allocation.
    pub fn extract(&mut self, block: &mut Option<NonNull<u8>>) -> bool {
        let Some(ptr) = *block else { return true };

        let mut cursor = Some(self.first_silo_ptr());
        while let Some(silo) = cursor {
            let silo_ref = unsafe { silo.as_ref() };
            if silo_ref.contains(ptr) {
                let layout = match Layout::from_size_align(self.block_size, align_of::<usize>()) {
                    Ok(l) => l,
                    Err(_) => return false,
                };
                let Some(replacement) = self.allocator.alloc_no_wait(layout) else {
                    return false;
                };
                unsafe {
                    core::ptr::copy_nonoverlapping(ptr.as_ptr(), replacement.as_ptr(), self.block_size);
                }
                let slot = silo_ref.slot_of(ptr, self.block_size);
                silo_ref.set_free(slot);
                self.used -= 1;
                self.maybe_shrink(false);
                *block = Some(replacement);
                return true;
            }
            cursor = unsafe { silo.as_ref().next.get() };
        }

        true
    }

    /// Ensures at least `amount` free blocks exist, growing the chain with
    /// blocking allocation as needed. Returns `false` only if the host
    /// declines during growth (always possible in principle even in
    /// blocking mode, since the primitive is still fallible here).
    pub fn reserve(&mut self, amount: usize, mode: ReserveMode) -> bool {
        match mode {
            ReserveMode::Release => {
                self.reservation = Reservation::Idle;
                self.maybe_shrink(true);
                true
            }
            ReserveMode::OneUse | ReserveMode::Permanent => {
                while self.capacity() - self.used < amount {
                    if self.create_silo(false).is_none() {
                        return false;
                    }
                }
                let existing = match self.reservation {
                    Reservation::Idle => 0,
                    Reservation::OneUse(n) | Reservation::Permanent(n) => n,
                };
                let total = existing + amount;
                self.reservation = match mode {
                    ReserveMode::OneUse => Reservation::OneUse(total),
                    ReserveMode::Permanent => Reservation::Permanent(total),
                    ReserveMode::Release => unreachable!(),
                };
                true
            }
        }
    }

    /// A snapshot of the pool's current state.
    pub fn statistics(&self) -> Statistics {
        Statistics {
            block_size: self.block_size,
            capacity: self.capacity(),
            used: self.used,
            free: self.capacity() - self.used,
            reservation: self.reservation,
            non_blocking: self.non_blocking,
            zero_on_alloc: self.zero_on_alloc,
        }
    }

    /// Consumes the pool, releasing every silo and the header. Equivalent
    /// to dropping the pool; provided so call sites can mirror the
    /// reference API's explicit `Dispose(&handle)` and document that the
    /// caller's handle is gone.
    pub fn dispose(self) {}
}

impl<A: HostAllocator, const K: usize> Drop for Pool<A, K> {
    fn drop(&mut self) {
        let layout = blocks_layout(self.block_size, K);
        let mut cursor = unsafe { self.first_silo_ptr().as_ref().next.get() };
        while let Some(silo) = cursor {
            cursor = unsafe { silo.as_ref().next.get() };
            let boxed = unsafe { alloc::boxed::Box::from_raw(silo.as_ptr()) };
            if let Some(layout) = layout {
                unsafe { self.allocator.dealloc(boxed.blocks, layout) };
            }
            drop(boxed);
        }
        let first = unsafe { alloc::boxed::Box::from_raw(self.first_silo.as_ptr()) };
        if let Some(layout) = layout {
            unsafe { self.allocator.dealloc(first.blocks, layout) };
        }
        drop(first);
    }
}

impl<A: HostAllocator, const K: usize> PoolHandle for Pool<A, K> {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn zeroes_on_alloc(&self) -> bool {
        self.zero_on_alloc
    }

    fn pool_alloc(&mut self) -> Option<NonNull<u8>> {
        self.alloc()
    }

    unsafe fn pool_dealloc(&mut self, block: &mut Option<NonNull<u8>>) {
        self.dealloc(block);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn init_has_one_embedded_silo() {
        let pool = Pool::<SystemHostAllocator, 32>::new(10, false, true).expect("init");
        let stats = pool.statistics();
        assert_eq!(stats.capacity, 32);
        assert_eq!(stats.used, 0);
    }

    #[test]
    fn alloc_zero_on_alloc_returns_zeroed_blocks() {
        let mut pool = Pool::<SystemHostAllocator, 32>::new(16, false, true).expect("init");
        let block = pool.alloc().expect("alloc");
        let bytes = unsafe { core::slice::from_raw_parts(block.as_ptr(), 16) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn dealloc_nulls_the_handle() {
        let mut pool = Pool::<SystemHostAllocator, 32>::new(16, false, true).expect("init");
        let mut block = pool.alloc();
        pool.dealloc(&mut block);
        assert!(block.is_none());
    }

    #[test]
    fn end_to_end_pool_scenario() {
        // block_size=10, blocking, zero-on-alloc; alloc 100, free every
        // other, Reserve(0, release), free the rest.
        let mut pool = Pool::<SystemHostAllocator, 32>::new(10, false, true).expect("init");
        let mut blocks: alloc::vec::Vec<Option<NonNull<u8>>> = (0..100).map(|_| pool.alloc()).collect();
        assert!(blocks.iter().all(|b| b.is_some()));
        assert_eq!(pool.statistics().used, 100);
        assert_eq!(pool.statistics().capacity, 4 * 32);

        for (i, block) in blocks.iter_mut().enumerate() {
            if i % 2 == 0 {
                pool.dealloc(block);
            }
        }
        assert_eq!(pool.statistics().used, 50);

        pool.reserve(0, ReserveMode::Release);
        assert_eq!(pool.statistics().num_silos_for_test(), 4);

        for block in blocks.iter_mut() {
            if block.is_some() {
                pool.dealloc(block);
            }
        }
        assert_eq!(pool.statistics().used, 0);
        assert_eq!(pool.statistics().capacity, 32);
    }

    impl Statistics {
        fn num_silos_for_test(&self) -> usize {
            self.capacity / 32
        }
    }

    #[test]
    fn reservation_transitions() {
        let mut pool = Pool::<SystemHostAllocator, 32>::new(8, false, true).expect("init");
        assert!(pool.reserve(40, ReserveMode::Permanent));
        assert_eq!(pool.statistics().reservation, Reservation::Permanent(40));
        pool.reserve(0, ReserveMode::Release);
        assert_eq!(pool.statistics().reservation, Reservation::Idle);
    }

    #[test]
    fn extract_moves_pool_block_to_host() {
        let mut pool = Pool::<SystemHostAllocator, 32>::new(16, false, true).expect("init");
        let mut block = pool.alloc();
        let used_before = pool.statistics().used;
        assert!(pool.extract(&mut block));
        assert_eq!(pool.statistics().used, used_before - 1);
        assert!(block.is_some());
        // Extracted block is no longer pool-owned; a second extract is a
        // no-op success.
        assert!(pool.extract(&mut block));
    }
}
