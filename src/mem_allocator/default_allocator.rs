use std::{
    alloc::Layout,
    sync::atomic::{AtomicUsize, Ordering::*},
};

use super::MemAllocator;

/// Global heap allocator with live-byte accounting.
#[derive(Default, Debug)]
pub struct DefaultAllocator {
    mem_alloc: AtomicUsize,
}

impl DefaultAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemAllocator for DefaultAllocator {
    unsafe fn allocate(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { std::alloc::alloc(layout) };
        if !ptr.is_null() {
            self.mem_alloc.fetch_add(layout.size(), Relaxed);
        }
        ptr
    }

    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout) {
        unsafe { std::alloc::dealloc(ptr, layout) };
        self.mem_alloc.fetch_sub(layout.size(), Relaxed);
    }

    fn mem_usage(&self) -> usize {
        self.mem_alloc.load(Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_accounting() {
        let a = DefaultAllocator::new();
        let layout = Layout::from_size_align(48, 8).unwrap();

        let p1 = unsafe { a.allocate(layout) };
        let p2 = unsafe { a.allocate(layout) };
        assert!(!p1.is_null() && !p2.is_null());
        assert_eq!(a.mem_usage(), 96);

        unsafe { a.deallocate(p1, layout) };
        assert_eq!(a.mem_usage(), 48);
        unsafe { a.deallocate(p2, layout) };
        assert_eq!(a.mem_usage(), 0);
        assert!(!a.is_arena());
    }
}
