//! Intrusive doubly-linked list: nodes embed their own link fields (a
//! [`Links<T>`]) rather than being wrapped by the list, and may be backed by
//! a [`crate::pool::Pool`] or by a plain [`HostAllocator`].
//!
//! The list never allocates node storage itself beyond the `Create*`/`Alloc`
//! family; everything else is pointer surgery over nodes the caller already
//! owns (directly or via one of the `Create*` calls).

use core::alloc::Layout;
use core::cmp::Ordering;
use core::ptr::NonNull;

use alloc::vec::Vec;

use crate::host::{HostAllocator, SystemHostAllocator};
use crate::pool::PoolHandle;

/// Which way a traversal walks the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `first` toward `last`, following `next`.
    Forward,
    /// `last` toward `first`, following `prev`.
    Backward,
}

/// The forward/backward link pair embedded in every node.
///
/// `Cell` gives interior mutability through a shared reference, which is
/// what lets the list relink neighbors it only has a `NonNull` to, without
/// claiming exclusive access to the whole node.
pub struct Links<T: ?Sized> {
    next: core::cell::Cell<Option<NonNull<T>>>,
    prev: core::cell::Cell<Option<NonNull<T>>>,
}

impl<T: ?Sized> Links<T> {
    /// A fresh, detached link pair.
    pub const fn new() -> Self {
        Self {
            next: core::cell::Cell::new(None),
            prev: core::cell::Cell::new(None),
        }
    }

    /// The next node, if any.
    pub fn next(&self) -> Option<NonNull<T>> {
        self.next.get()
    }

    /// The previous node, if any.
    pub fn prev(&self) -> Option<NonNull<T>> {
        self.prev.get()
    }

    /// A link pair with both sides absent denotes a detached node.
    pub fn is_detached(&self) -> bool {
        self.next.get().is_none() && self.prev.get().is_none()
    }

    fn set_next(&self, value: Option<NonNull<T>>) {
        self.next.set(value);
    }

    fn set_prev(&self, value: Option<NonNull<T>>) {
        self.prev.set(value);
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A type that can act as a list node: it exposes its own [`Links`] at a
/// known location. This replaces the reference design's macro that inlines
/// two raw pointers at the head of every record; a type implementing this
/// trait can put its `Links<Self>` field anywhere, at any offset (see
/// [`crate::expanded`] for records that need the link pair *after* a
/// variable-size payload instead of before it).
pub trait Linked: Sized {
    /// Returns a reference to this node's embedded link pair.
    fn links(&self) -> &Links<Self>;
}

/// Per-node cleanup, run just before a node's storage is released. Returns
/// `true` to have the list return the storage to the pool/host allocator,
/// or `false` to keep the (now detached) node alive for the caller to
/// manage itself.
pub type ClearHook<T> = fn(&mut T) -> bool;

/// A three-way comparison between two nodes' payloads.
pub type CompareFn<T> = fn(&T, &T) -> Ordering;

/// A read-only predicate used by the `Filter*` family and `FindNode`.
pub type FilterFn<T> = fn(&T, usize) -> bool;

/// A mutating per-node operation used by `FilterOperate`.
pub type OperateFn<T> = fn(&mut T, usize) -> bool;

/// Produces a cloned payload for `FilterClone`, or `None` to filter the
/// source node out of the clone.
pub type CloneFn<T> = fn(&T, usize) -> Option<T>;

/// The verdict returned by [`List::compare`], in the fixed priority order
/// the comparison is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Same length, element-by-element equal front-to-front.
    InOrder,
    /// Same length, element-by-element equal when list2 is walked
    /// tail-to-head.
    Reverse,
    /// Same length, every element of list1 has a distinct equal partner in
    /// list2.
    NonOrder,
    /// `|list1| < |list2|`; list1 is a contiguous forward run inside list2.
    Subset,
    /// `|list1| < |list2|`; list1 is a contiguous run walking list2
    /// tail-to-head.
    RevSubset,
    /// `|list1| < |list2|`; every list1 element has a distinct equal
    /// partner in list2.
    Included,
    /// Every list1 element has some equal partner in list2 (duplicates in
    /// list1 may share a partner).
    Covered,
    /// Some but not all list1 elements had any partner.
    Partial,
    /// No matches, or list1 is empty.
    Nothing,
}

unsafe fn next_of<T: Linked>(node: NonNull<T>) -> Option<NonNull<T>> {
    unsafe { node.as_ref() }.links().next()
}

unsafe fn prev_of<T: Linked>(node: NonNull<T>) -> Option<NonNull<T>> {
    unsafe { node.as_ref() }.links().prev()
}

unsafe fn set_next_of<T: Linked>(node: NonNull<T>, value: Option<NonNull<T>>) {
    unsafe { node.as_ref() }.links().set_next(value);
}

unsafe fn set_prev_of<T: Linked>(node: NonNull<T>, value: Option<NonNull<T>>) {
    unsafe { node.as_ref() }.links().set_prev(value);
}

/// Walks the chain starting at `node` via `next`, returning the tail and
/// the chain's length. Used by the `Attach*` family to accept either a
/// single node or an already-linked chain.
fn chain_tail_and_len<T: Linked>(node: NonNull<T>) -> (NonNull<T>, usize) {
    let mut tail = node;
    let mut count = 1;
    while let Some(n) = unsafe { next_of(tail) } {
        tail = n;
        count += 1;
    }
    (tail, count)
}

/// An intrusive doubly-linked list of `T`, optionally backed by a
/// [`crate::pool::Pool`] for node storage.
///
/// `A` is only consulted when no pool is attached; it is the host allocator
/// used for `Create*`/`Alloc` when the list stands alone.
pub struct List<T: Linked, A: HostAllocator = SystemHostAllocator> {
    first: Option<NonNull<T>>,
    last: Option<NonNull<T>>,
    count: usize,
    node_size: usize,
    clear_hook: Option<ClearHook<T>>,
    pool: Option<NonNull<dyn PoolHandle>>,
    allocator: A,
}

impl<T: Linked, A: HostAllocator + Default> List<T, A> {
    /// Builds a list with no pool; node storage comes from `A`'s default
    /// instance, zero-filled on every `Create*`/`Alloc`.
    pub fn new(clear_hook: Option<ClearHook<T>>) -> Self {
        Self {
            first: None,
            last: None,
            count: 0,
            node_size: core::mem::size_of::<T>(),
            clear_hook,
            pool: None,
            allocator: A::default(),
        }
    }

    /// Builds a list backed by `pool`. Panics (the reference design's
    /// assertion-guarded "pool misconfiguration relative to list" contract
    /// violation) if the pool's block size is smaller than `T`, or if the
    /// pool does not zero on allocation.
    pub fn with_pool(clear_hook: Option<ClearHook<T>>, pool: &mut dyn PoolHandle) -> Self {
        assert!(
            pool.block_size() >= core::mem::size_of::<T>(),
            "pool block size is smaller than the list's node size"
        );
        assert!(pool.zeroes_on_alloc(), "pool attached to a list must zero on allocation");
        Self {
            first: None,
            last: None,
            count: 0,
            node_size: core::mem::size_of::<T>(),
            clear_hook,
            pool: Some(NonNull::from(pool)),
            allocator: A::default(),
        }
    }
}

impl<T: Linked, A: HostAllocator> List<T, A> {
    fn alloc_node(&mut self) -> Option<NonNull<T>> {
        let ptr = if let Some(mut pool) = self.pool {
            unsafe { pool.as_mut() }.pool_alloc()?
        } else {
            self.allocator.alloc_zeroed(Layout::new::<T>())?
        };
        Some(ptr.cast::<T>())
    }

    fn free_node(&mut self, node: NonNull<T>) {
        let mut raw = Some(node.cast::<u8>());
        if let Some(mut pool) = self.pool {
            unsafe { pool.as_mut().pool_dealloc(&mut raw) };
        } else if let Some(ptr) = raw {
            unsafe { self.allocator.dealloc(ptr, Layout::new::<T>()) };
        }
    }

    fn clear_and_free(&mut self, mut node: NonNull<T>) {
        let should_free = match self.clear_hook {
            Some(hook) => hook(unsafe { node.as_mut() }),
            None => true,
        };
        if should_free {
            self.free_node(node);
        }
    }

    /// Number of nodes currently attached.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The configured node size (`size_of::<T>()`).
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// The first node, if any.
    pub fn first(&self) -> Option<NonNull<T>> {
        self.first
    }

    /// The last node, if any.
    pub fn last(&self) -> Option<NonNull<T>> {
        self.last
    }

    /// The node following `node`.
    pub fn next(&self, node: NonNull<T>) -> Option<NonNull<T>> {
        unsafe { next_of(node) }
    }

    /// The node preceding `node`.
    pub fn prev(&self, node: NonNull<T>) -> Option<NonNull<T>> {
        unsafe { prev_of(node) }
    }

    /// The expanded-node adapter's directional accessor: the chain's head
    /// in the given direction.
    pub fn loop_head(&self, direction: Direction) -> Option<NonNull<T>> {
        match direction {
            Direction::Forward => self.first,
            Direction::Backward => self.last,
        }
    }

    /// The expanded-node adapter's directional accessor: the next node from
    /// `node` in the given direction.
    pub fn loop_next(&self, node: NonNull<T>, direction: Direction) -> Option<NonNull<T>> {
        match direction {
            Direction::Forward => self.next(node),
            Direction::Backward => self.prev(node),
        }
    }

    // ---- node creation (auto-managed) -----------------------------------

    /// Allocates a node (pool if attached, else host-zeroing allocator) and
    /// links it at the tail.
    pub fn create_last(&mut self) -> Option<NonNull<T>> {
        let node = self.alloc_node()?;
        self.attach_last(node);
        Some(node)
    }

    /// As [`Self::create_last`], linking at the head instead.
    pub fn create_first(&mut self) -> Option<NonNull<T>> {
        let node = self.alloc_node()?;
        self.attach_first(node);
        Some(node)
    }

    /// As [`Self::create_last`], linking before `before`. Unlike
    /// [`Self::attach_before`], an absent or out-of-list `before` degrades
    /// gracefully to [`Self::create_first`] rather than being treated as a
    /// contract violation.
    pub fn create_before(&mut self, before: Option<NonNull<T>>) -> Option<NonNull<T>> {
        let node = self.alloc_node()?;
        match before {
            Some(b) if self.contains(b) => self.attach_before(node, Some(b)),
            _ => self.attach_first(node),
        }
        Some(node)
    }

    /// As [`Self::create_last`], linking after `after`. Unlike
    /// [`Self::attach_after`], an absent or out-of-list `after` degrades
    /// gracefully to [`Self::create_last`].
    pub fn create_after(&mut self, after: Option<NonNull<T>>) -> Option<NonNull<T>> {
        let node = self.alloc_node()?;
        match after {
            Some(a) if self.contains(a) => self.attach_after(node, Some(a)),
            _ => self.attach_last(node),
        }
        Some(node)
    }

    // ---- node creation (detached) ----------------------------------------

    /// Returns a detached, zeroed node of `size` bytes (clamped up to at
    /// least `size_of::<T>()`, the link-pair-carrying payload), the caller
    /// attaches later. Always allocates from the host allocator, never from
    /// an attached pool: an arbitrary `size` does not fit a fixed-block
    /// silo's single `block_size` contract, so pool-backed storage is only
    /// ever handed out at the list's own `node_size` via `Create*`.
    /// `non_blocking` controls whether the host allocator may block to
    /// satisfy the request.
    pub fn alloc_detached(&mut self, size: usize, non_blocking: bool) -> Option<NonNull<T>> {
        let size = size.max(core::mem::size_of::<T>());
        let layout = Layout::from_size_align(size, core::mem::align_of::<T>()).ok()?;
        let ptr = if non_blocking {
            let raw = self.allocator.alloc_no_wait(layout)?;
            unsafe { core::ptr::write_bytes(raw.as_ptr(), 0, size) };
            raw
        } else {
            self.allocator.alloc_zeroed(layout)?
        };
        Some(ptr.cast::<T>())
    }

    // ---- structural mutation ---------------------------------------------

    /// Attaches `node` (or the chain reachable from it via `next`) after
    /// `after`. `after = None` is only valid on an empty list; any other
    /// `None` into a non-empty list is a contract violation (asserted).
    pub fn attach_after(&mut self, node: NonNull<T>, after: Option<NonNull<T>>) {
        let (tail, chain_len) = chain_tail_and_len(node);
        match after {
            Some(a) => {
                let after_next = unsafe { next_of(a) };
                match after_next {
                    Some(an) => unsafe { set_prev_of(an, Some(tail)) },
                    None => self.last = Some(tail),
                }
                unsafe {
                    set_next_of(tail, after_next);
                    set_prev_of(node, Some(a));
                    set_next_of(a, Some(node));
                }
            }
            None => {
                assert!(self.count == 0, "attach with a null reference into a non-empty list");
                self.first = Some(node);
                self.last = Some(tail);
            }
        }
        self.count += chain_len;
    }

    /// Attaches `node` (or its chain) before `before`, with the same
    /// `None`-reference contract as [`Self::attach_after`].
    pub fn attach_before(&mut self, node: NonNull<T>, before: Option<NonNull<T>>) {
        let (tail, chain_len) = chain_tail_and_len(node);
        match before {
            Some(b) => {
                let before_prev = unsafe { prev_of(b) };
                match before_prev {
                    Some(bp) => unsafe { set_next_of(bp, Some(node)) },
                    None => self.first = Some(node),
                }
                unsafe {
                    set_prev_of(node, before_prev);
                    set_prev_of(b, Some(tail));
                    set_next_of(tail, Some(b));
                }
            }
            None => {
                assert!(self.count == 0, "attach with a null reference into a non-empty list");
                self.first = Some(node);
                self.last = Some(tail);
            }
        }
        self.count += chain_len;
    }

    /// Attaches at the tail.
    pub fn attach_last(&mut self, node: NonNull<T>) {
        let after = self.last;
        self.attach_after(node, after);
    }

    /// Attaches at the head.
    pub fn attach_first(&mut self, node: NonNull<T>) {
        let before = self.first;
        self.attach_before(node, before);
    }

    /// Inserts `node` so the list remains sorted by `cmp`. Forward scans
    /// head-to-tail, inserting before the first element strictly greater
    /// than `node` (so `node` joins after any existing equal elements,
    /// which is what makes repeated sorted insertion stable); backward
    /// scans tail-to-head, inserting after the first element
    /// less-than-or-equal.
    pub fn attach_sorted(&mut self, node: NonNull<T>, cmp: CompareFn<T>, direction: Direction) {
        match direction {
            Direction::Forward => {
                let mut cur = self.first;
                while let Some(c) = cur {
                    if unsafe { cmp(node.as_ref(), c.as_ref()) } == Ordering::Less {
                        self.attach_before(node, Some(c));
                        return;
                    }
                    cur = unsafe { next_of(c) };
                }
                self.attach_last(node);
            }
            Direction::Backward => {
                let mut cur = self.last;
                while let Some(c) = cur {
                    if unsafe { cmp(node.as_ref(), c.as_ref()) } != Ordering::Less {
                        self.attach_after(node, Some(c));
                        return;
                    }
                    cur = unsafe { prev_of(c) };
                }
                self.attach_first(node);
            }
        }
    }

    /// Detaches `node` from wherever it is in the list; its links are
    /// cleared on return.
    pub fn detach(&mut self, node: NonNull<T>) {
        let p = unsafe { prev_of(node) };
        let n = unsafe { next_of(node) };
        match n {
            Some(nn) => unsafe { set_prev_of(nn, p) },
            None => self.last = p,
        }
        match p {
            Some(pp) => unsafe { set_next_of(pp, n) },
            None => self.first = n,
        }
        unsafe {
            set_next_of(node, None);
            set_prev_of(node, None);
        }
        self.count -= 1;
    }

    /// Detaches and returns the first node.
    pub fn detach_first(&mut self) -> Option<NonNull<T>> {
        let node = self.first?;
        if self.count > 1 {
            if let Some(n) = unsafe { next_of(node) } {
                self.first = Some(n);
                unsafe {
                    set_prev_of(n, None);
                    set_next_of(node, None);
                }
            }
            self.count -= 1;
        } else {
            self.count = 0;
            self.first = None;
            self.last = None;
        }
        Some(node)
    }

    /// Detaches and returns the last node.
    pub fn detach_last(&mut self) -> Option<NonNull<T>> {
        let node = self.last?;
        if self.count > 1 {
            if let Some(p) = unsafe { prev_of(node) } {
                self.last = Some(p);
                unsafe {
                    set_next_of(p, None);
                    set_prev_of(node, None);
                }
            }
            self.count -= 1;
        } else {
            self.count = 0;
            self.first = None;
            self.last = None;
        }
        Some(node)
    }

    /// Detaches every node, returning the chain's head; the list becomes
    /// empty.
    pub fn detach_all(&mut self) -> Option<NonNull<T>> {
        let node = self.first;
        self.first = None;
        self.last = None;
        self.count = 0;
        node
    }

    /// Detaches `number` nodes starting at `node` in `direction`
    /// (`number = 0` means "to the end").
    pub fn detach_many(&mut self, node: NonNull<T>, number: usize, direction: Direction) {
        let total = if number == 0 { usize::MAX } else { number };
        let mut remaining = total;
        let (head, tail) = match direction {
            Direction::Forward => {
                let mut loop_node = node;
                remaining -= 1;
                while remaining > 0 {
                    match unsafe { next_of(loop_node) } {
                        Some(n) => {
                            loop_node = n;
                            remaining -= 1;
                        }
                        None => break,
                    }
                }
                (node, loop_node)
            }
            Direction::Backward => {
                let mut start = node;
                remaining -= 1;
                while remaining > 0 {
                    match unsafe { prev_of(start) } {
                        Some(p) => {
                            start = p;
                            remaining -= 1;
                        }
                        None => break,
                    }
                }
                (start, node)
            }
        };

        let removed = total - remaining;
        let before_head = unsafe { prev_of(head) };
        let after_tail = unsafe { next_of(tail) };

        match after_tail {
            Some(at) => unsafe { set_prev_of(at, before_head) },
            None => self.last = before_head,
        }
        match before_head {
            Some(bh) => unsafe { set_next_of(bh, after_tail) },
            None => self.first = after_tail,
        }
        unsafe {
            set_next_of(tail, None);
            set_prev_of(head, None);
        }
        self.count -= removed;
    }

    // ---- removal and deallocation -----------------------------------------

    /// Detaches `node`, runs the clear hook if present, and (unless the
    /// hook declines) returns its storage to the pool or host allocator.
    pub fn remove(&mut self, node: NonNull<T>) {
        self.detach(node);
        self.clear_and_free(node);
    }

    /// Convenience over [`Self::remove`] for the first node.
    pub fn remove_first(&mut self) {
        if let Some(n) = self.detach_first() {
            self.clear_and_free(n);
        }
    }

    /// Convenience over [`Self::remove`] for the last node.
    pub fn remove_last(&mut self) {
        if let Some(n) = self.detach_last() {
            self.clear_and_free(n);
        }
    }

    /// Removes every node; the list object itself remains valid and empty.
    pub fn remove_all(&mut self) {
        if let Some(chain) = self.detach_all() {
            self.dealloc_chain(chain);
        }
    }

    /// Frees a detached chain with this list's clear-hook-and-route
    /// discipline: walks backward from `node` to the chain's head, then
    /// forward, freeing each.
    pub fn dealloc_chain(&mut self, node: NonNull<T>) {
        let mut head = node;
        while let Some(p) = unsafe { prev_of(head) } {
            head = p;
        }
        let mut cur = Some(head);
        while let Some(n) = cur {
            cur = unsafe { next_of(n) };
            self.clear_and_free(n);
        }
    }

    /// Consumes the list, removing every node and freeing the header.
    /// Equivalent to letting the list drop.
    pub fn dispose(self) {}

    // ---- move ---------------------------------------------------------------

    /// Detaches and reattaches `node` at the head; a no-op if it is already
    /// there.
    pub fn move_first(&mut self, node: NonNull<T>) {
        if self.first == Some(node) {
            return;
        }
        self.detach(node);
        self.attach_first(node);
    }

    /// Detaches and reattaches `node` at the tail; a no-op if it is already
    /// there.
    pub fn move_last(&mut self, node: NonNull<T>) {
        if self.last == Some(node) {
            return;
        }
        self.detach(node);
        self.attach_last(node);
    }

    /// Detaches and reattaches `node` immediately before `before`; a no-op
    /// if it is already there.
    pub fn move_before(&mut self, node: NonNull<T>, before: NonNull<T>) {
        if unsafe { next_of(node) } == Some(before) {
            return;
        }
        self.detach(node);
        self.attach_before(node, Some(before));
    }

    /// Detaches and reattaches `node` immediately after `after`; a no-op if
    /// it is already there.
    pub fn move_after(&mut self, node: NonNull<T>, after: NonNull<T>) {
        if unsafe { prev_of(node) } == Some(after) {
            return;
        }
        self.detach(node);
        self.attach_after(node, Some(after));
    }

    // ---- swap -----------------------------------------------------------------

    /// Swaps the positions of two nodes in this same list, including the
    /// adjacent-node special cases (where the general four-pointer
    /// relinking would clobber itself).
    pub fn swap_inside(&mut self, node1: NonNull<T>, node2: NonNull<T>) {
        if node1 == node2 {
            return;
        }
        if unsafe { next_of(node1) } == Some(node2) {
            let after = unsafe { next_of(node2) };
            let before = unsafe { prev_of(node1) };
            match after {
                Some(a) => unsafe { set_prev_of(a, Some(node1)) },
                None => self.last = Some(node1),
            }
            match before {
                Some(b) => unsafe { set_next_of(b, Some(node2)) },
                None => self.first = Some(node2),
            }
            unsafe {
                set_next_of(node1, after);
                set_next_of(node2, Some(node1));
                set_prev_of(node2, before);
                set_prev_of(node1, Some(node2));
            }
        } else if unsafe { prev_of(node1) } == Some(node2) {
            let before = unsafe { prev_of(node2) };
            let after = unsafe { next_of(node1) };
            match before {
                Some(b) => unsafe { set_next_of(b, Some(node1)) },
                None => self.first = Some(node1),
            }
            match after {
                Some(a) => unsafe { set_prev_of(a, Some(node2)) },
                None => self.last = Some(node2),
            }
            unsafe {
                set_next_of(node2, after);
                set_next_of(node1, Some(node2));
                set_prev_of(node1, before);
                set_prev_of(node2, Some(node1));
            }
        } else {
            let n1p = unsafe { prev_of(node1) };
            let n1n = unsafe { next_of(node1) };
            let n2p = unsafe { prev_of(node2) };
            let n2n = unsafe { next_of(node2) };
            match n1p {
                Some(p) => unsafe { set_next_of(p, Some(node2)) },
                None => self.first = Some(node2),
            }
            match n1n {
                Some(n) => unsafe { set_prev_of(n, Some(node2)) },
                None => self.last = Some(node2),
            }
            match n2p {
                Some(p) => unsafe { set_next_of(p, Some(node1)) },
                None => self.first = Some(node1),
            }
            match n2n {
                Some(n) => unsafe { set_prev_of(n, Some(node1)) },
                None => self.last = Some(node1),
            }
            unsafe {
                set_next_of(node1, n2n);
                set_prev_of(node1, n2p);
                set_next_of(node2, n1n);
                set_prev_of(node2, n1p);
            }
        }
    }

    /// Swaps every node between two lists, O(1): a plain field swap. The
    /// "same list" case the reference design special-cases does not arise
    /// here, since two `&mut` borrows of the same list cannot coexist.
    pub fn swap_all(list1: &mut Self, list2: &mut Self) {
        core::mem::swap(&mut list1.first, &mut list2.first);
        core::mem::swap(&mut list1.last, &mut list2.last);
        core::mem::swap(&mut list1.count, &mut list2.count);
    }

    /// Swaps `node1` (in `list1`) with `node2` (in a different `list2`).
    pub fn swap_between(list1: &mut Self, node1: NonNull<T>, list2: &mut Self, node2: NonNull<T>) {
        let n1p = unsafe { prev_of(node1) };
        let n1n = unsafe { next_of(node1) };
        let n2p = unsafe { prev_of(node2) };
        let n2n = unsafe { next_of(node2) };
        match n1p {
            Some(p) => unsafe { set_next_of(p, Some(node2)) },
            None => list1.first = Some(node2),
        }
        match n1n {
            Some(n) => unsafe { set_prev_of(n, Some(node2)) },
            None => list1.last = Some(node2),
        }
        match n2p {
            Some(p) => unsafe { set_next_of(p, Some(node1)) },
            None => list2.first = Some(node1),
        }
        match n2n {
            Some(n) => unsafe { set_prev_of(n, Some(node1)) },
            None => list2.last = Some(node1),
        }
        unsafe {
            set_next_of(node1, n2n);
            set_prev_of(node1, n2p);
            set_next_of(node2, n1n);
            set_prev_of(node2, n1p);
        }
    }

    // ---- split / join -----------------------------------------------------

    /// Splits the list so `node` becomes the first element of a new list;
    /// `node`'s predecessors stay in `self`.
    pub fn split(&mut self, node: NonNull<T>) -> Self
    where
        A: Clone,
    {
        let mut new_list = Self {
            first: None,
            last: None,
            count: 0,
            node_size: self.node_size,
            clear_hook: self.clear_hook,
            pool: self.pool,
            allocator: self.allocator.clone(),
        };

        if let Some(index) = self.get_index(node) {
            let movecount = self.count - index;
            new_list.first = Some(node);
            new_list.last = self.last;
            new_list.count = movecount;

            match unsafe { prev_of(node) } {
                Some(p) => {
                    unsafe { set_next_of(p, None) };
                    self.last = Some(p);
                }
                None => {
                    self.first = None;
                    self.last = None;
                }
            }
            unsafe { set_prev_of(node, None) };
            self.count -= movecount;
        }

        new_list
    }

    /// Appends `other`'s chain to the tail of `self`; `other` becomes
    /// empty (and its `Drop` is then a no-op).
    pub fn join(&mut self, mut other: Self) {
        if let Some(other_first) = other.first {
            match self.last {
                Some(l) => unsafe { set_next_of(l, Some(other_first)) },
                None => self.first = Some(other_first),
            }
            unsafe { set_prev_of(other_first, self.last) };
            self.last = other.last;
            self.count += other.count;
            other.first = None;
            other.last = None;
            other.count = 0;
        }
    }

    // ---- queries / traversal ------------------------------------------------

    /// The 0-based index of `node`, or `None` if it is not attached here.
    pub fn get_index(&self, node: NonNull<T>) -> Option<usize> {
        let mut index = 0;
        let mut cur = self.first;
        while let Some(c) = cur {
            if c == node {
                return Some(index);
            }
            index += 1;
            cur = unsafe { next_of(c) };
        }
        None
    }

    /// `true` iff `node` is attached to this list.
    pub fn contains(&self, node: NonNull<T>) -> bool {
        self.get_index(node).is_some()
    }

    /// The node at `index`, walking from whichever end is nearer.
    pub fn get_node(&self, index: usize) -> Option<NonNull<T>> {
        if index >= self.count {
            return None;
        }
        if index <= self.count / 2 {
            let mut cur = self.first;
            for _ in 0..index {
                cur = cur.and_then(|c| unsafe { next_of(c) });
            }
            cur
        } else {
            let mut cur = self.last;
            for _ in 0..(self.count - 1 - index) {
                cur = cur.and_then(|c| unsafe { prev_of(c) });
            }
            cur
        }
    }

    /// Repositions `node` to `index`, clamping out-of-range indices to the
    /// last position. Returns the node's resulting index.
    pub fn set_index(&mut self, node: NonNull<T>, index: usize) -> usize {
        let target = index.min(self.count.saturating_sub(1));
        self.detach(node);
        if target == 0 {
            self.attach_first(node);
        } else {
            match self.get_node(target - 1) {
                Some(after) => self.attach_after(node, Some(after)),
                None => self.attach_last(node),
            }
        }
        self.get_index(node).unwrap_or(target)
    }

    /// The first node (starting at `start`, walking `direction`) for which
    /// `cmp(candidate, match_node) == Equal`.
    pub fn find_pair(
        start: Option<NonNull<T>>,
        cmp: CompareFn<T>,
        match_node: NonNull<T>,
        direction: Direction,
    ) -> Option<NonNull<T>> {
        let mut cur = start;
        while let Some(c) = cur {
            if unsafe { cmp(c.as_ref(), match_node.as_ref()) } == Ordering::Equal {
                return Some(c);
            }
            cur = match direction {
                Direction::Forward => unsafe { next_of(c) },
                Direction::Backward => unsafe { prev_of(c) },
            };
        }
        None
    }

    /// The first node (starting at `start`, walking `direction`) for which
    /// `predicate` returns `true`.
    pub fn find_node(
        start: Option<NonNull<T>>,
        predicate: FilterFn<T>,
        userdata: usize,
        direction: Direction,
    ) -> Option<NonNull<T>> {
        let mut cur = start;
        while let Some(c) = cur {
            if predicate(unsafe { c.as_ref() }, userdata) {
                return Some(c);
            }
            cur = match direction {
                Direction::Forward => unsafe { next_of(c) },
                Direction::Backward => unsafe { prev_of(c) },
            };
        }
        None
    }

    // ---- bulk operations ----------------------------------------------------

    /// Counts nodes matching `filter` (`None` matches every node).
    pub fn filter_count(&self, filter: Option<FilterFn<T>>, userdata: usize) -> usize {
        match filter {
            None => self.count,
            Some(f) => {
                let mut matched = 0;
                let mut cur = self.first;
                while let Some(c) = cur {
                    if f(unsafe { c.as_ref() }, userdata) {
                        matched += 1;
                    }
                    cur = unsafe { next_of(c) };
                }
                matched
            }
        }
    }

    /// Removes every node matching `filter` (`None` matches every node),
    /// returning how many were removed.
    pub fn filter_remove(&mut self, filter: Option<FilterFn<T>>, userdata: usize) -> usize {
        let mut matched = 0;
        let mut cur = self.first;
        while let Some(c) = cur {
            let after = unsafe { next_of(c) };
            if filter.map_or(true, |f| f(unsafe { c.as_ref() }, userdata)) {
                self.remove(c);
                matched += 1;
            }
            cur = after;
        }
        matched
    }

    /// Runs `operate` on every node matching `filter` (`None` matches every
    /// node), returning how many were operated on.
    pub fn filter_operate(
        &mut self,
        filter: Option<FilterFn<T>>,
        filter_ud: usize,
        operate: OperateFn<T>,
        operate_ud: usize,
    ) -> usize {
        let mut matched = 0;
        let mut cur = self.first;
        while let Some(mut c) = cur {
            cur = unsafe { next_of(c) };
            if filter.map_or(true, |f| f(unsafe { c.as_ref() }, filter_ud)) {
                let _ = operate(unsafe { c.as_mut() }, operate_ud);
                matched += 1;
            }
        }
        matched
    }

    /// Clones matching nodes into `target` (a fresh list with this list's
    /// configuration if `target` is `None`). If `clone_fn` is supplied,
    /// each source node is passed through it and a `None` return filters
    /// the node out; with no `clone_fn`, every node's payload is cloned via
    /// `T: Clone` (the idiomatic analogue of the reference design's
    /// raw bit-copy by `node_size`).
    pub fn filter_clone(&mut self, target: Option<Self>, clone_fn: Option<CloneFn<T>>, userdata: usize) -> Self
    where
        A: Clone,
        T: Clone,
    {
        let mut target = target.unwrap_or_else(|| Self {
            first: None,
            last: None,
            count: 0,
            node_size: self.node_size,
            clear_hook: self.clear_hook,
            pool: self.pool,
            allocator: self.allocator.clone(),
        });

        let mut cur = self.first;
        while let Some(c) = cur {
            let value = match clone_fn {
                Some(f) => f(unsafe { c.as_ref() }, userdata),
                None => Some(unsafe { c.as_ref() }.clone()),
            };
            if let Some(payload) = value {
                if let Some(new_node) = target.alloc_node() {
                    unsafe { core::ptr::write(new_node.as_ptr(), payload) };
                    unsafe {
                        set_next_of(new_node, None);
                        set_prev_of(new_node, None);
                    }
                    target.attach_last(new_node);
                }
            }
            cur = unsafe { next_of(c) };
        }

        target
    }

    /// Detaches every node matching `filter` (`None` matches every node)
    /// from `self` and attaches them at the tail of `target` (a fresh list
    /// with this list's configuration if `target` is `None`).
    pub fn filter_move(&mut self, target: Option<Self>, filter: Option<FilterFn<T>>, userdata: usize) -> Self
    where
        A: Clone,
    {
        let mut target = target.unwrap_or_else(|| Self {
            first: None,
            last: None,
            count: 0,
            node_size: self.node_size,
            clear_hook: self.clear_hook,
            pool: self.pool,
            allocator: self.allocator.clone(),
        });

        let mut cur = self.first;
        while let Some(c) = cur {
            let after = unsafe { next_of(c) };
            if filter.map_or(true, |f| f(unsafe { c.as_ref() }, userdata)) {
                self.detach(c);
                target.attach_last(c);
            }
            cur = after;
        }

        target
    }

    /// Removes duplicates under the equivalence induced by `cmp`, keeping
    /// the first (forward) or last (backward) occurrence of each class.
    pub fn unique(&mut self, cmp: CompareFn<T>, direction: Direction) {
        let nodes = self.collect();
        let mut keep: Vec<NonNull<T>> = Vec::with_capacity(nodes.len());

        match direction {
            Direction::Forward => {
                for &n in nodes.iter() {
                    let is_dup = keep
                        .iter()
                        .any(|&k| unsafe { cmp(k.as_ref(), n.as_ref()) } == Ordering::Equal);
                    if !is_dup {
                        keep.push(n);
                    }
                }
            }
            Direction::Backward => {
                let mut kept_rev: Vec<NonNull<T>> = Vec::with_capacity(nodes.len());
                for &n in nodes.iter().rev() {
                    let is_dup = kept_rev
                        .iter()
                        .any(|&k| unsafe { cmp(k.as_ref(), n.as_ref()) } == Ordering::Equal);
                    if !is_dup {
                        kept_rev.push(n);
                    }
                }
                kept_rev.reverse();
                keep = kept_rev;
            }
        }

        for &n in nodes.iter() {
            if !keep.contains(&n) {
                self.detach(n);
                self.clear_and_free(n);
            }
        }
    }

    // ---- ordering -------------------------------------------------------------

    fn collect(&self) -> Vec<NonNull<T>> {
        let mut nodes = Vec::with_capacity(self.count);
        let mut cur = self.first;
        while let Some(c) = cur {
            nodes.push(c);
            cur = unsafe { next_of(c) };
        }
        nodes
    }

    fn relink_from(&mut self, nodes: &[NonNull<T>]) {
        self.first = nodes.first().copied();
        self.last = nodes.last().copied();
        for pair in nodes.windows(2) {
            unsafe {
                set_next_of(pair[0], Some(pair[1]));
                set_prev_of(pair[1], Some(pair[0]));
            }
        }
        if let Some(&f) = nodes.first() {
            unsafe { set_prev_of(f, None) };
        }
        if let Some(&l) = nodes.last() {
            unsafe { set_next_of(l, None) };
        }
        self.count = nodes.len();
    }

    /// `true` iff adjacent pairs are all `<=` under `cmp`.
    pub fn verify(&self, cmp: CompareFn<T>) -> bool {
        let nodes = self.collect();
        nodes
            .windows(2)
            .all(|w| unsafe { cmp(w[0].as_ref(), w[1].as_ref()) } != Ordering::Greater)
    }

    /// Sorts the list by `cmp`. Stable: equal elements keep their relative
    /// order. Implemented with an auxiliary `Vec` and a stable sort rather
    /// than the reference design's double-ended selection over sentinel
    /// nodes — see the design notes on replacing pointer-mutation tricks
    /// with auxiliary structures.
    pub fn sort(&mut self, cmp: CompareFn<T>) {
        let mut nodes = self.collect();
        nodes.sort_by(|a, b| unsafe { cmp(a.as_ref(), b.as_ref()) });
        self.relink_from(&nodes);
    }

    /// Permutes the list in place using `randomizer`, a caller-provided
    /// source that maps a bound `n` to an index in `0..n`. No state is
    /// retained across calls (the reference design's process-wide counter
    /// is not carried forward, per the design notes).
    pub fn shuffle(&mut self, randomizer: &mut dyn FnMut(usize) -> usize) {
        let mut nodes = self.collect();
        let len = nodes.len();
        if len < 2 {
            return;
        }
        for i in (1..len).rev() {
            let j = randomizer(i + 1).min(i);
            nodes.swap(i, j);
        }
        self.relink_from(&nodes);
    }

    /// Reverses the list in place, O(n).
    pub fn reverse(&mut self) {
        let mut nodes = self.collect();
        nodes.reverse();
        self.relink_from(&nodes);
    }

    /// Compares two lists under `cmp`, returning the first matching
    /// [`Verdict`] from the fixed priority order. The distinct-partner
    /// tests (`NonOrder`, `Included`) use an auxiliary claimed-bitset keyed
    /// by list2's traversal index rather than mutating list2's links (the
    /// reference design's temporary-mutation trick, which the design notes
    /// direct against carrying forward). The header-declared `limit_mask`
    /// parameter is dropped (see the resolved open question): verdicts are
    /// mutually exclusive in the order below.
    pub fn compare(list1: &Self, list2: &Self, cmp: CompareFn<T>) -> Verdict {
        let a = list1.collect();
        let b = list2.collect();

        if a.is_empty() {
            return Verdict::Nothing;
        }

        let eq = |x: NonNull<T>, y: NonNull<T>| unsafe { cmp(x.as_ref(), y.as_ref()) } == Ordering::Equal;

        if a.len() == b.len() && a.iter().zip(b.iter()).all(|(&x, &y)| eq(x, y)) {
            return Verdict::InOrder;
        }
        if a.len() == b.len() && a.iter().zip(b.iter().rev()).all(|(&x, &y)| eq(x, y)) {
            return Verdict::Reverse;
        }
        if a.len() == b.len() && Self::has_distinct_partners(&a, &b, cmp) {
            return Verdict::NonOrder;
        }
        if a.len() < b.len() && Self::contiguous_forward(&a, &b, cmp) {
            return Verdict::Subset;
        }
        if a.len() < b.len() && Self::contiguous_backward(&a, &b, cmp) {
            return Verdict::RevSubset;
        }
        if a.len() < b.len() && Self::has_distinct_partners(&a, &b, cmp) {
            return Verdict::Included;
        }
        if a.iter().all(|&x| b.iter().any(|&y| eq(x, y))) {
            return Verdict::Covered;
        }
        if a.iter().any(|&x| b.iter().any(|&y| eq(x, y))) {
            return Verdict::Partial;
        }
        Verdict::Nothing
    }

    fn has_distinct_partners(a: &[NonNull<T>], b: &[NonNull<T>], cmp: CompareFn<T>) -> bool {
        let mut claimed = alloc::vec![false; b.len()];
        for &x in a {
            let mut found = false;
            for (j, &y) in b.iter().enumerate() {
                if !claimed[j] && unsafe { cmp(x.as_ref(), y.as_ref()) } == Ordering::Equal {
                    claimed[j] = true;
                    found = true;
                    break;
                }
            }
            if !found {
                return false;
            }
        }
        true
    }

    fn contiguous_forward(a: &[NonNull<T>], b: &[NonNull<T>], cmp: CompareFn<T>) -> bool {
        if a.len() > b.len() {
            return false;
        }
        for start in 0..=(b.len() - a.len()) {
            if a
                .iter()
                .zip(&b[start..start + a.len()])
                .all(|(&x, &y)| unsafe { cmp(x.as_ref(), y.as_ref()) } == Ordering::Equal)
            {
                return true;
            }
        }
        false
    }

    fn contiguous_backward(a: &[NonNull<T>], b: &[NonNull<T>], cmp: CompareFn<T>) -> bool {
        let reversed: Vec<NonNull<T>> = b.iter().rev().copied().collect();
        Self::contiguous_forward(a, &reversed, cmp)
    }
}

impl<T: Linked, A: HostAllocator> Drop for List<T, A> {
    fn drop(&mut self) {
        self.remove_all();
    }
}
