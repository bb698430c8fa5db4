use std::{
    alloc::Layout,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering::*},
};

use parking_lot::Mutex;

use super::MemAllocator;

const ITEM_SIZE: usize = std::mem::size_of::<u64>();
const BLOCK_SIZE: usize = 4096 / ITEM_SIZE;
const NO_BLOCK_LIMIT: usize = BLOCK_SIZE / 4 * ITEM_SIZE;

struct BlockArenaInner {
    mems: Vec<Vec<u64>>,
    ptr: NonNull<u8>,
    remaining_size: usize,
}

// `ptr` always points into one of the blocks owned by `mems`.
unsafe impl Send for BlockArenaInner {}

impl BlockArenaInner {
    fn alloc(&mut self, layout: Layout, usage: &AtomicUsize) -> NonNull<u8> {
        if layout.size() + layout.align() > NO_BLOCK_LIMIT {
            return self.alloc_new_block(layout, usage);
        }

        let (slop, mut aligned_ptr) = align_up(self.ptr.as_ptr(), layout.align());
        let mut need = slop + layout.size();
        if need > self.remaining_size {
            self.reload_block(usage);
            let (slop, ptr) = align_up(self.ptr.as_ptr(), layout.align());
            need = slop + layout.size();
            aligned_ptr = ptr;
            debug_assert!(need <= self.remaining_size);
        }

        let new_tail = aligned_ptr.wrapping_add(layout.size());
        unsafe {
            self.ptr = NonNull::new_unchecked(new_tail);
            self.remaining_size -= need;
            NonNull::new_unchecked(aligned_ptr)
        }
    }

    fn reload_block(&mut self, usage: &AtomicUsize) {
        let mut block = vec![0; BLOCK_SIZE];
        let ptr = block.as_mut_ptr() as *mut u8;
        let cap = block.len() * ITEM_SIZE;

        self.mems.push(block);
        unsafe {
            self.ptr = NonNull::new_unchecked(ptr);
        }
        self.remaining_size = cap;

        usage.fetch_add(cap, Relaxed);
    }

    // Oversized requests get a block of their own so the current block keeps
    // serving small nodes.
    fn alloc_new_block(&mut self, layout: Layout, usage: &AtomicUsize) -> NonNull<u8> {
        let size = (layout.size() + layout.align()).div_ceil(ITEM_SIZE);

        let mut mem = vec![0; size];
        let (_, ptr) = align_up(mem.as_mut_ptr() as *mut u8, layout.align());
        let len = mem.len() * ITEM_SIZE;

        self.mems.push(mem);
        usage.fetch_add(len, Relaxed);

        unsafe { NonNull::new_unchecked(ptr) }
    }
}

fn align_up(ptr: *mut u8, align: usize) -> (usize, *mut u8) {
    assert!(align.is_power_of_two());
    let slop = ptr.align_offset(align);
    (slop, ptr.wrapping_add(slop))
}

/// Bump allocator handing out node memory from 4 KiB blocks.
///
/// Individual frees are ignored; every block is returned when the arena drops.
/// Share one arena between lists with `Arc<BlockArena>`, and keep it alive for
/// as long as any list allocated from it.
pub struct BlockArena {
    inner: Mutex<BlockArenaInner>,
    memory_usage: AtomicUsize,
}

impl BlockArena {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BlockArenaInner {
                mems: Vec::new(),
                ptr: NonNull::dangling(),
                remaining_size: 0,
            }),
            memory_usage: AtomicUsize::new(0),
        }
    }

    pub fn alloc(&self, layout: Layout) -> NonNull<u8> {
        self.inner.lock().alloc(layout, &self.memory_usage)
    }

    pub fn memory_usage(&self) -> usize {
        self.memory_usage.load(Relaxed)
    }

    pub fn blocks(&self) -> usize {
        self.inner.lock().mems.len()
    }
}

impl Default for BlockArena {
    fn default() -> Self {
        Self::new()
    }
}

impl MemAllocator for BlockArena {
    unsafe fn allocate(&self, layout: Layout) -> *mut u8 {
        self.alloc(layout).as_ptr()
    }

    unsafe fn deallocate(&self, _ptr: *mut u8, _layout: Layout) {}

    fn mem_usage(&self) -> usize {
        self.memory_usage()
    }

    fn is_arena(&self) -> bool {
        true
    }
}
