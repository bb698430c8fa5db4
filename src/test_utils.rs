use std::{
    alloc::Layout,
    sync::atomic::{AtomicUsize, Ordering::*},
};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::mem_allocator::prelude::*;

pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .with(EnvFilter::from_default_env())
        .try_init();
}

/// Heap allocator that counts calls, for checking when nodes are freed.
#[derive(Default, Debug)]
pub struct TrackingAllocator {
    inner: DefaultAllocator,
    allocs: AtomicUsize,
    deallocs: AtomicUsize,
}

impl TrackingAllocator {
    pub fn allocs(&self) -> usize {
        self.allocs.load(SeqCst)
    }

    pub fn deallocs(&self) -> usize {
        self.deallocs.load(SeqCst)
    }
}

impl MemAllocator for TrackingAllocator {
    unsafe fn allocate(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, SeqCst);
        unsafe { self.inner.allocate(layout) }
    }

    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout) {
        self.deallocs.fetch_add(1, SeqCst);
        unsafe { self.inner.deallocate(ptr, layout) }
    }

    fn mem_usage(&self) -> usize {
        self.inner.mem_usage()
    }
}

/// Zeroes freed memory and never returns it, so a read through a dangling
/// node pointer sees a zero height instead of faulting.
#[derive(Default, Debug)]
pub struct PoisonAllocator {
    allocs: AtomicUsize,
    frees: AtomicUsize,
}

impl PoisonAllocator {
    pub fn allocs(&self) -> usize {
        self.allocs.load(SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.frees.load(SeqCst)
    }
}

impl MemAllocator for PoisonAllocator {
    unsafe fn allocate(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, SeqCst);
        unsafe { std::alloc::alloc(layout) }
    }

    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout) {
        self.frees.fetch_add(1, SeqCst);
        unsafe { std::ptr::write_bytes(ptr, 0, layout.size()) };
    }

    fn mem_usage(&self) -> usize {
        0
    }
}
