use std::{
    mem,
    ptr::NonNull,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering::*, fence},
};

use parking_lot::Mutex;

use crate::{mem_allocator::prelude::*, node::Node};

/// Deferred-deletion queue shared by every accessor of one list.
///
/// A node handed to [`NodeRecycler::add`] is already unlinked at every level,
/// so no thread that starts traversing afterwards can reach it. Threads that
/// started earlier each hold a reference, and the queue is only drained when
/// the last of those references is released.
pub(crate) struct NodeRecycler<T, A: MemAllocator> {
    nodes: Mutex<Vec<NonNull<Node<T>>>>,
    refs: AtomicUsize,
    dirty: AtomicBool,
    alloc: A,
}

unsafe impl<T: Send, A: MemAllocator> Send for NodeRecycler<T, A> {}
unsafe impl<T: Send + Sync, A: MemAllocator> Sync for NodeRecycler<T, A> {}

impl<T, A: MemAllocator> NodeRecycler<T, A> {
    pub(crate) fn new(alloc: A) -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
            refs: AtomicUsize::new(0),
            dirty: AtomicBool::new(false),
            alloc,
        }
    }

    pub(crate) fn alloc(&self) -> &A {
        &self.alloc
    }

    pub(crate) fn refs(&self) -> usize {
        self.refs.load(SeqCst)
    }

    /// Returns the reference count before the increment.
    ///
    /// Pairs with the fence in [`NodeRecycler::add`]: either `add` sees this
    /// reference and defers, or every link read after this call already
    /// misses the unlinked node.
    pub(crate) fn add_ref(&self) -> usize {
        let prev = self.refs.fetch_add(1, SeqCst);
        fence(SeqCst);
        prev
    }

    /// Returns the reference count before the decrement. The caller that drops
    /// the count to zero frees everything queued so far.
    pub(crate) fn release_ref(&self) -> usize {
        // Racing releases may both take this path and leave the queue behind;
        // it is drained by the next release or when the list drops.
        if !self.dirty.load(Relaxed) || self.refs() > 1 {
            let prev = self.refs.fetch_sub(1, AcqRel);
            debug_assert!(prev > 0, "unbalanced release_ref");
            return prev;
        }

        let (prev, nodes) = {
            let mut nodes = self.nodes.lock();
            let prev = self.refs.fetch_sub(1, AcqRel);
            debug_assert!(prev > 0, "unbalanced release_ref");
            if prev == 1 {
                self.dirty.store(false, Relaxed);
                (prev, mem::take(&mut *nodes))
            } else {
                (prev, Vec::new())
            }
        };

        if !nodes.is_empty() {
            tracing::trace!("recycle {} nodes", nodes.len());
            for node in nodes {
                unsafe { Node::destroy(&self.alloc, node.as_ptr()) };
            }
        }
        prev
    }

    /// Takes ownership of a fully unlinked node.
    pub(crate) fn add(&self, node: NonNull<Node<T>>) {
        fence(SeqCst);
        {
            let mut nodes = self.nodes.lock();
            if self.refs() > 0 {
                nodes.push(node);
                self.dirty.store(true, Relaxed);
                return;
            }
        }
        unsafe { Node::destroy(&self.alloc, node.as_ptr()) };
    }

    pub(crate) fn pending(&self) -> usize {
        self.nodes.lock().len()
    }
}

impl<T, A: MemAllocator> Drop for NodeRecycler<T, A> {
    fn drop(&mut self) {
        let nodes = mem::take(self.nodes.get_mut());
        if self.alloc.is_arena() && !mem::needs_drop::<T>() {
            return;
        }
        for node in nodes {
            unsafe { Node::destroy(&self.alloc, node.as_ptr()) };
        }
    }
}
