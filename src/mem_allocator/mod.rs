use std::{alloc::Layout, sync::Arc};

mod block_arena;
mod default_allocator;

pub mod prelude {
    #![allow(unused)]

    pub use super::MemAllocator;
    pub use super::block_arena::BlockArena;
    pub use super::default_allocator::DefaultAllocator;
}

/// Memory source for skip list nodes.
///
/// Nodes are allocated and released from many threads at once, so both
/// `allocate` and `deallocate` must be thread-safe.
pub trait MemAllocator: Send + Sync {
    /// # Safety
    ///
    /// `layout` must have a non-zero size. A null return is an allocation failure.
    unsafe fn allocate(&self, layout: Layout) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator with the
    /// same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout);

    fn mem_usage(&self) -> usize;

    /// Arena allocators free everything in bulk when they drop. For those a
    /// list holding values without drop glue can skip tearing down its nodes.
    fn is_arena(&self) -> bool {
        false
    }
}

impl<A: MemAllocator + ?Sized> MemAllocator for Arc<A> {
    unsafe fn allocate(&self, layout: Layout) -> *mut u8 {
        unsafe { self.as_ref().allocate(layout) }
    }

    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout) {
        unsafe { self.as_ref().deallocate(ptr, layout) }
    }

    fn mem_usage(&self) -> usize {
        self.as_ref().mem_usage()
    }

    fn is_arena(&self) -> bool {
        self.as_ref().is_arena()
    }
}
