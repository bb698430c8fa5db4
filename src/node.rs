use std::{
    alloc::Layout,
    mem::{self, MaybeUninit},
    ptr::{self, NonNull, addr_of_mut},
    sync::atomic::{AtomicPtr, AtomicU8, Ordering::*},
};

use crossbeam::utils::Backoff;
use parking_lot::{Mutex, MutexGuard};

use crate::{MAX_HEIGHT, mem_allocator::prelude::*};

const IS_HEAD_NODE: u8 = 1;
const MARKED_FOR_REMOVAL: u8 = 1 << 1;
const FULLY_LINKED: u8 = 1 << 2;

/// A skip list element together with its tower of forward pointers.
///
/// The tower is a trailing array sized by `height` at allocation time, so a
/// node must only ever be reached through the pointer returned by
/// [`Node::create`] or [`Node::create_head`].
#[repr(C)]
pub(crate) struct Node<T> {
    lock: Mutex<()>,
    flags: AtomicU8,
    height: u8,
    value: MaybeUninit<T>,
    tower: [AtomicPtr<Node<T>>; 0],
}

impl<T> Node<T> {
    fn layout(height: usize) -> Layout {
        assert!(height > 0 && height <= MAX_HEIGHT);
        let size = mem::size_of::<Self>() + mem::size_of::<AtomicPtr<Self>>() * height;
        let align = mem::align_of::<Self>();
        Layout::from_size_align(size, align)
            .unwrap_or_else(|_| panic!("Layout error, size: {size}, align: {align}"))
    }

    unsafe fn alloc_in(height: usize, flags: u8, alloc: &impl MemAllocator) -> NonNull<Self> {
        let layout = Self::layout(height);
        unsafe {
            let p = alloc.allocate(layout) as *mut Self;
            if p.is_null() {
                std::alloc::handle_alloc_error(layout);
            }
            debug_assert!(p.is_aligned());

            ptr::write(addr_of_mut!((*p).lock), Mutex::new(()));
            ptr::write(addr_of_mut!((*p).flags), AtomicU8::new(flags));
            ptr::write(addr_of_mut!((*p).height), height as u8);
            let tower = addr_of_mut!((*p).tower) as *mut AtomicPtr<Self>;
            for level in 0..height {
                ptr::write(tower.add(level), AtomicPtr::new(ptr::null_mut()));
            }
            NonNull::new_unchecked(p)
        }
    }

    /// Allocates an unlinked node holding `value` with `height` empty forward slots.
    pub(crate) fn create(alloc: &impl MemAllocator, height: usize, value: T) -> NonNull<Self> {
        unsafe {
            let p = Self::alloc_in(height, 0, alloc);
            ptr::write(addr_of_mut!((*p.as_ptr()).value), MaybeUninit::new(value));
            p
        }
    }

    /// Allocates a sentinel head, which carries no value.
    pub(crate) fn create_head(alloc: &impl MemAllocator, height: usize) -> NonNull<Self> {
        unsafe { Self::alloc_in(height, IS_HEAD_NODE, alloc) }
    }

    /// Drops the value (heads have none) and returns the memory to `alloc`.
    ///
    /// # Safety
    ///
    /// `node` must come from `create`/`create_head` on the same allocator and
    /// must be unreachable by every other thread.
    pub(crate) unsafe fn destroy(alloc: &impl MemAllocator, node: *mut Self) {
        unsafe {
            let layout = Self::layout((*node).height());
            if !(*node).is_head() {
                (*node).value.assume_init_drop();
            }
            ptr::drop_in_place(addr_of_mut!((*node).lock));
            alloc.deallocate(node as *mut u8, layout);
        }
    }

    /// Copies every forward pointer of `other` into this (taller) head.
    pub(crate) fn copy_head(&self, other: &Self) {
        debug_assert!(self.is_head() && other.is_head());
        debug_assert!(self.height() >= other.height());
        self.flags.store(other.flags.load(Acquire), Release);
        for level in 0..other.height() {
            self.set_skip(level, other.skip(level));
        }
    }

    fn tower(&self, level: usize) -> &AtomicPtr<Self> {
        debug_assert!(level < self.height(), "level {level}, height {}", self.height());
        unsafe { &*(self.tower.as_ptr()).add(level) }
    }

    pub(crate) fn skip(&self, level: usize) -> *mut Self {
        self.tower(level).load(Acquire)
    }

    /// Caller holds this node's lock, or the node is not yet published.
    pub(crate) fn set_skip(&self, level: usize, node: *mut Self) {
        self.tower(level).store(node, Release);
    }

    pub(crate) fn acquire_guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    pub(crate) fn height(&self) -> usize {
        self.height as usize
    }

    pub(crate) fn max_layer(&self) -> usize {
        self.height() - 1
    }

    pub(crate) fn value(&self) -> &T {
        debug_assert!(!self.is_head());
        unsafe { self.value.assume_init_ref() }
    }

    pub(crate) fn is_head(&self) -> bool {
        self.flags.load(Acquire) & IS_HEAD_NODE != 0
    }

    pub(crate) fn marked_for_removal(&self) -> bool {
        self.flags.load(Acquire) & MARKED_FOR_REMOVAL != 0
    }

    pub(crate) fn set_marked_for_removal(&self) {
        self.flags.fetch_or(MARKED_FOR_REMOVAL, Release);
    }

    pub(crate) fn fully_linked(&self) -> bool {
        self.flags.load(Acquire) & FULLY_LINKED != 0
    }

    pub(crate) fn set_fully_linked(&self) {
        self.flags.fetch_or(FULLY_LINKED, Release);
    }

    /// Spins until the inserting thread finishes linking this node.
    pub(crate) fn wait_fully_linked(&self) {
        let backoff = Backoff::new();
        while !self.fully_linked() {
            backoff.snooze();
        }
    }
}
