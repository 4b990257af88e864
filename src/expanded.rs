//! Expanded-node adapter: lets a record whose link pair cannot live at
//! offset zero still be used as a [`crate::list::List`] node, by storing the
//! links (plus a back-offset to the payload) *after* the payload instead of
//! before it.
//!
//! This generalizes the intrusive-linking discipline in [`crate::list`] to
//! records that already own their own layout (e.g. a foreign struct, or one
//! whose first field must stay at offset zero for an external ABI). The
//! payload and the trailing [`ExpandedNode`] are one allocation; [`cast_node`]
//! and [`cast_object`] are the forward/backward casts between the two views
//! of it.

use core::alloc::Layout;
use core::mem::{align_of, size_of};
use core::ptr::NonNull;

use crate::host::{HostAllocator, SystemHostAllocator};
use crate::list::{Linked, Links};

/// The link pair plus a back-offset to the payload, placed after a
/// variable-size payload rather than at the front of the allocation.
#[repr(C)]
pub struct ExpandedNode {
    links: Links<ExpandedNode>,
    offset: usize,
}

impl Linked for ExpandedNode {
    fn links(&self) -> &Links<Self> {
        &self.links
    }
}

/// Rounds `size` up to the next multiple of 4 and returns that rounded value
/// as the `offset` at which the trailing [`ExpandedNode`] block should be
/// placed inside the allocation; writes `offset + size_of::<ExpandedNode>()`
/// back into `*size` as the total allocation size the caller must request.
pub fn expanded_size(size: &mut usize) -> usize {
    let offset = (*size + 3) & !3;
    *size = offset + size_of::<ExpandedNode>();
    offset
}

/// Initializes the trailing link-pair-plus-offset block at `offset` inside
/// `object`'s allocation and returns a pointer to it, usable as a
/// [`crate::list::List`] node.
///
/// # Safety
/// `object` must point to a live allocation of at least
/// `offset + size_of::<ExpandedNode>()` bytes, aligned to at least
/// `align_of::<ExpandedNode>()`, per the size computed by [`expanded_size`].
pub unsafe fn cast_node(object: NonNull<u8>, offset: usize) -> NonNull<ExpandedNode> {
    let node_ptr = unsafe { object.as_ptr().add(offset) } as *mut ExpandedNode;
    unsafe {
        core::ptr::write(
            node_ptr,
            ExpandedNode {
                links: Links::new(),
                offset,
            },
        );
        NonNull::new_unchecked(node_ptr)
    }
}

/// Reconstructs the original object pointer from an expanded node by
/// subtracting its stored offset. The inverse of [`cast_node`].
///
/// # Safety
/// `node` must have been produced by [`cast_node`] and must still be part of
/// the same, still-live allocation.
pub unsafe fn cast_object(node: NonNull<ExpandedNode>) -> NonNull<u8> {
    let offset = unsafe { node.as_ref() }.offset;
    let raw = unsafe { (node.as_ptr() as *mut u8).sub(offset) };
    unsafe { NonNull::new_unchecked(raw) }
}

/// A [`crate::list::ClearHook`] for `List<ExpandedNode, _>`: recovers the
/// original object pointer via [`cast_object`] and hands the whole
/// payload-plus-node allocation to the host deallocator, then tells the list
/// *not* to also free the node itself (the list's default free would use
/// `size_of::<ExpandedNode>()` at the node's own address, which is neither
/// the right size nor the right base for this allocation).
///
/// Ties to [`SystemHostAllocator`] rather than an arbitrary `HostAllocator`,
/// mirroring the reference design where `ExpandedDealloc` calls a single
/// global host deallocator rather than one threaded per-list.
pub fn expanded_dealloc(node: &mut ExpandedNode) -> bool {
    let offset = node.offset;
    let object = unsafe { cast_object(NonNull::from(&*node)) };
    let layout = Layout::from_size_align(offset + size_of::<ExpandedNode>(), align_of::<usize>())
        .unwrap_or_else(|_| Layout::new::<ExpandedNode>());
    unsafe { SystemHostAllocator.dealloc(object, layout) };
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::list::{Direction, List};

    #[repr(C)]
    struct Payload {
        a: u32,
        b: u64,
    }

    #[test]
    fn expanded_size_rounds_up_to_four_and_adds_node() {
        let mut size = 13usize;
        let offset = expanded_size(&mut size);
        assert_eq!(offset, 16);
        assert_eq!(size, 16 + size_of::<ExpandedNode>());
    }

    #[test]
    fn cast_node_then_cast_object_round_trips() {
        let mut total = size_of::<Payload>();
        let offset = expanded_size(&mut total);
        let layout = Layout::from_size_align(total, align_of::<usize>()).expect("layout");
        let object = SystemHostAllocator.alloc_zeroed(layout).expect("alloc");

        unsafe {
            core::ptr::write(object.as_ptr() as *mut Payload, Payload { a: 7, b: 9 });
        }

        let node = unsafe { cast_node(object, offset) };
        let recovered = unsafe { cast_object(node) };
        assert_eq!(recovered.as_ptr(), object.as_ptr());

        unsafe { SystemHostAllocator.dealloc(object, layout) };
    }

    #[test]
    fn expanded_node_attaches_to_a_list_like_any_other_node() {
        let mut total = size_of::<Payload>();
        let offset = expanded_size(&mut total);
        let layout = Layout::from_size_align(total, align_of::<usize>()).expect("layout");

        let mut list: List<ExpandedNode, SystemHostAllocator> = List::new(Some(expanded_dealloc));

        let object = SystemHostAllocator.alloc_zeroed(layout).expect("alloc");
        unsafe {
            core::ptr::write(object.as_ptr() as *mut Payload, Payload { a: 1, b: 2 });
        }
        let node = unsafe { cast_node(object, offset) };
        list.attach_last(node);
        assert_eq!(list.count(), 1);

        let head = list.loop_head(Direction::Forward).expect("head");
        let payload = unsafe { cast_object(head) };
        let value = unsafe { &*(payload.as_ptr() as *const Payload) };
        assert_eq!(value.a, 1);
        assert_eq!(value.b, 2);

        list.remove_all();
        assert_eq!(list.count(), 0);
    }
}
