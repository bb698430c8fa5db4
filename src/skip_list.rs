use std::{
    mem,
    ptr::{self, NonNull, null_mut},
    sync::atomic::{AtomicPtr, AtomicUsize, Ordering::*},
};

use crossbeam::utils::Backoff;
use parking_lot::MutexGuard;

use crate::{
    MAX_HEIGHT, accessor::Accessor, height::RandomHeight, mem_allocator::prelude::*, node::Node,
    recycler::NodeRecycler,
};

pub(crate) type Link<T> = *mut Node<T>;
pub(crate) type Tower<T> = [Link<T>; MAX_HEIGHT];

type Guards<'g> = [Option<MutexGuard<'g, ()>>; MAX_HEIGHT];

#[cfg(test)]
thread_local! {
    /// Layer the most recent `find_insertion_point` on this thread started from.
    pub(crate) static LAST_SEARCH_LAYER: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Concurrent ordered set of unique values.
///
/// Readers never take a lock. Writers lock only the predecessors they are
/// about to rewrite, validate what they saw while searching, and start over
/// when the validation fails. Unlinked nodes are parked in a recycler and
/// freed once no [`Accessor`] that could still see them is alive, which is
/// why every operation goes through an accessor.
pub struct SkipList<T, A: MemAllocator = DefaultAllocator> {
    head: AtomicPtr<Node<T>>,
    size: AtomicUsize,
    recycler: NodeRecycler<T, A>,
}

unsafe impl<T: Send, A: MemAllocator> Send for SkipList<T, A> {}
unsafe impl<T: Send + Sync, A: MemAllocator> Sync for SkipList<T, A> {}

impl<T: Ord> SkipList<T> {
    /// Creates a list whose head starts at `height` levels.
    ///
    /// # Panics
    ///
    /// Panics unless `1 <= height <= MAX_HEIGHT`.
    pub fn new(height: usize) -> Self {
        Self::with_allocator(height, DefaultAllocator::default())
    }
}

impl<T: Ord> Default for SkipList<T> {
    fn default() -> Self {
        Self::new(1)
    }
}

impl<T, A: MemAllocator> SkipList<T, A> {
    /// Same as [`SkipList::new`], with nodes taken from `alloc`.
    pub fn with_allocator(height: usize, alloc: A) -> Self {
        assert!(
            height > 0 && height <= MAX_HEIGHT,
            "height {height} out of range 1..={MAX_HEIGHT}"
        );
        let recycler = NodeRecycler::new(alloc);
        let head = Node::create_head(recycler.alloc(), height);
        Self {
            head: AtomicPtr::new(head.as_ptr()),
            size: AtomicUsize::new(0),
            recycler,
        }
    }

    pub fn accessor(&self) -> Accessor<'_, T, A> {
        Accessor::borrowed(self)
    }

    /// Number of committed elements. Under concurrent writers this is a
    /// snapshot that may already be stale.
    pub fn size(&self) -> usize {
        self.size.load(Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Current head height; never decreases.
    pub fn height(&self) -> usize {
        // pin the head so a concurrent grow cannot free it under us
        let _pin = self.accessor();
        self.head_height()
    }

    /// Caller must hold an accessor.
    pub(crate) fn head_height(&self) -> usize {
        unsafe { (*self.head()).height() }
    }

    pub fn mem_usage(&self) -> usize {
        self.recycler.alloc().mem_usage()
    }

    pub fn allocator(&self) -> &A {
        self.recycler.alloc()
    }

    pub(crate) fn recycler(&self) -> &NodeRecycler<T, A> {
        &self.recycler
    }

    pub(crate) fn head(&self) -> Link<T> {
        self.head.load(SeqCst)
    }

    fn recycle(&self, node: Link<T>) {
        debug_assert!(!node.is_null());
        self.recycler.add(unsafe { NonNull::new_unchecked(node) });
    }
}

impl<T: Ord, A: MemAllocator> SkipList<T, A> {
    /// `node` sorts strictly before `value`.
    pub(crate) fn greater(value: &T, node: Link<T>) -> bool {
        !node.is_null() && unsafe { (*node).value() } < value
    }

    /// `value` sorts strictly before `node`; the end of a level sorts last.
    pub(crate) fn less(value: &T, node: Link<T>) -> bool {
        node.is_null() || value < unsafe { (*node).value() }
    }

    /// Walks down from `start` at `start_layer`, filling `preds`/`succs` for
    /// every layer up to `start_layer`. Returns the highest layer on which
    /// `value` itself was seen; below that layer `succs` holds the node found.
    ///
    /// # Safety
    ///
    /// `start` must be live, sort before `value` and have a tower taller than
    /// `start_layer`.
    pub(crate) unsafe fn find_insertion_point(
        start: Link<T>,
        start_layer: usize,
        value: &T,
        preds: &mut Tower<T>,
        succs: &mut Tower<T>,
    ) -> Option<usize> {
        #[cfg(test)]
        LAST_SEARCH_LAYER.with(|l| l.set(start_layer));

        let mut found_layer = None;
        let mut found_node = null_mut();
        let mut pred = start;
        for layer in (0..=start_layer).rev() {
            let mut node = unsafe { (*pred).skip(layer) };
            while Self::greater(value, node) {
                pred = node;
                node = unsafe { (*node).skip(layer) };
            }
            if found_layer.is_none() && !Self::less(value, node) {
                found_layer = Some(layer);
                found_node = node;
            }
            preds[layer] = pred;
            // A found node may be unlinked concurrently, so lower layers
            // keep pointing at it instead of re-reading pred.skip().
            succs[layer] = if found_node.is_null() { node } else { found_node };
        }
        found_layer
    }

    fn find_insertion_point_from_head(
        &self,
        value: &T,
        preds: &mut Tower<T>,
        succs: &mut Tower<T>,
    ) -> (Option<usize>, usize) {
        let head = self.head();
        let max_layer = unsafe { (*head).max_layer() };
        let layer = unsafe { Self::find_insertion_point(head, max_layer, value, preds, succs) };
        (layer, max_layer)
    }

    /// Down-right search. Returns the node equal to `value` and `true`, or the
    /// first node after `value` (possibly null) and `false`.
    fn find_node(&self, value: &T) -> (Link<T>, bool) {
        unsafe {
            let mut pred = self.head();
            let mut ht = (*pred).height();
            loop {
                // step down while the next node overshoots
                let mut node = (*pred).skip(ht - 1);
                while Self::less(value, node) {
                    ht -= 1;
                    if ht == 0 {
                        return (node, false);
                    }
                    node = (*pred).skip(ht - 1);
                }
                ht -= 1;

                while Self::greater(value, node) {
                    pred = node;
                    node = (*node).skip(ht);
                }
                if !Self::less(value, node) {
                    return (node, true);
                }
                if ht == 0 {
                    return (node, false);
                }
            }
        }
    }

    /// Returns the live node equal to `value`, or null.
    pub(crate) fn find(&self, value: &T) -> Link<T> {
        let (node, found) = self.find_node(value);
        if !found {
            return null_mut();
        }
        unsafe {
            (*node).wait_fully_linked();
            if (*node).marked_for_removal() {
                return null_mut();
            }
        }
        node
    }

    /// First live node not less than `value`, or null.
    pub(crate) fn lower_bound(&self, value: &T) -> Link<T> {
        let (node, _) = self.find_node(value);
        unsafe { Self::settle(node) }
    }

    /// First live node of the list, or null.
    pub(crate) fn first_node(&self) -> Link<T> {
        unsafe { Self::settle((*self.head()).skip(0)) }
    }

    /// Waits out an in-flight insert on `node` and skips over nodes that are
    /// being removed, following level 0.
    ///
    /// # Safety
    ///
    /// `node` must be null or reachable by the calling accessor.
    pub(crate) unsafe fn settle(mut node: Link<T>) -> Link<T> {
        unsafe {
            while !node.is_null() {
                (*node).wait_fully_linked();
                if !(*node).marked_for_removal() {
                    break;
                }
                node = (*node).skip(0);
            }
        }
        node
    }

    /// Rightmost node, found by running each layer to its end. Not guaranteed
    /// to be the maximum when writers are active, nor to still be live.
    pub(crate) fn last(&self) -> Option<&T> {
        unsafe {
            let head = self.head();
            let mut pred = head;
            for layer in (0..(*head).height()).rev() {
                loop {
                    let node = (*pred).skip(layer);
                    if node.is_null() {
                        break;
                    }
                    pred = node;
                }
            }
            if ptr::eq(pred, head) {
                None
            } else {
                Some((*pred).value())
            }
        }
    }

    pub(crate) fn first(&self) -> Option<&T> {
        let node = self.first_node();
        if node.is_null() {
            None
        } else {
            Some(unsafe { (*node).value() })
        }
    }

    /// Locks the distinct predecessors of layers `0..node_height` and checks
    /// that the links captured by the search still hold.
    ///
    /// # Safety
    ///
    /// Every `preds[..node_height]` entry must be live.
    unsafe fn lock_nodes_for_change<'g>(
        node_height: usize,
        guards: &mut Guards<'g>,
        preds: &Tower<T>,
        succs: &Tower<T>,
        adding: bool,
    ) -> bool
    where
        T: 'g,
    {
        let mut prev_pred = null_mut();
        for layer in 0..node_height {
            let pred = preds[layer];
            debug_assert!(!pred.is_null(), "layer {layer}, node height {node_height}");
            let succ = succs[layer];
            unsafe {
                if pred != prev_pred {
                    guards[layer] = Some((*pred).acquire_guard());
                    prev_pred = pred;
                }
                let mut valid = !(*pred).marked_for_removal() && (*pred).skip(layer) == succ;
                // a new node must not link to a successor on its way out
                if adding {
                    valid = valid && (succ.is_null() || !(*succ).marked_for_removal());
                }
                if !valid {
                    return false;
                }
            }
        }
        true
    }

    fn ok_to_delete(candidate: Link<T>, layer: usize) -> bool {
        unsafe {
            (*candidate).fully_linked()
                && (*candidate).max_layer() == layer
                && !(*candidate).marked_for_removal()
        }
    }

    /// Inserts `value` unless an equal value is present. Returns the node
    /// holding the value and the size right after the insert, or 0 when
    /// nothing was added.
    pub(crate) fn add_or_get_data(&self, value: T) -> (NonNull<Node<T>>, usize) {
        self.add_or_get_data_with(value, |max| RandomHeight::instance().get_height(max))
    }

    pub(crate) fn add_or_get_data_with(
        &self,
        value: T,
        draw_height: impl Fn(usize) -> usize,
    ) -> (NonNull<Node<T>>, usize) {
        let mut preds: Tower<T> = [null_mut(); MAX_HEIGHT];
        let mut succs: Tower<T> = [null_mut(); MAX_HEIGHT];
        let backoff = Backoff::new();

        let (new_node, new_size) = loop {
            let (layer, max_layer) =
                self.find_insertion_point_from_head(&value, &mut preds, &mut succs);
            if let Some(layer) = layer {
                let found = succs[layer];
                debug_assert!(!found.is_null());
                unsafe {
                    // retry until the remover has unlinked it
                    if (*found).marked_for_removal() {
                        backoff.spin();
                        continue;
                    }
                    (*found).wait_fully_linked();
                    return (NonNull::new_unchecked(found), 0);
                }
            }

            // capped to the height seen by the search, the head may be taller now
            let node_height = draw_height(max_layer + 1);
            debug_assert!(node_height > 0 && node_height <= max_layer + 1);

            let mut guards: Guards<'_> = std::array::from_fn(|_| None);
            let locked = unsafe {
                Self::lock_nodes_for_change(node_height, &mut guards, &preds, &succs, true)
            };
            if !locked {
                backoff.spin();
                continue;
            }

            let new_node = Node::create(self.recycler.alloc(), node_height, value);
            unsafe {
                let node = new_node.as_ref();
                for k in 0..node_height {
                    node.set_skip(k, succs[k]);
                    (*preds[k]).set_skip(k, new_node.as_ptr());
                }
                node.set_fully_linked();
            }
            let new_size = self.size.fetch_add(1, Relaxed) + 1;
            break (new_node, new_size);
        };

        let height = self.head_height();
        if height < MAX_HEIGHT && new_size > RandomHeight::instance().get_size_limit(height) {
            self.grow_height(height + 1);
        }
        debug_assert!(new_size > 0);
        (new_node, new_size)
    }

    /// Removes the node equal to `value`. Returns `false` if it is absent or
    /// another thread is already removing it.
    pub(crate) fn remove(&self, value: &T) -> bool {
        let mut preds: Tower<T> = [null_mut(); MAX_HEIGHT];
        let mut succs: Tower<T> = [null_mut(); MAX_HEIGHT];
        let mut node_to_delete: Link<T> = null_mut();
        let mut node_guard = None;
        let mut node_height = 0;
        let backoff = Backoff::new();

        loop {
            let (layer, _) = self.find_insertion_point_from_head(value, &mut preds, &mut succs);
            if node_guard.is_none() {
                let Some(layer) = layer else {
                    return false;
                };
                let candidate = succs[layer];
                if !Self::ok_to_delete(candidate, layer) {
                    return false;
                }

                let node = unsafe { &*candidate };
                let guard = node.acquire_guard();
                if node.marked_for_removal() {
                    return false;
                }
                node.set_marked_for_removal();
                node_to_delete = candidate;
                node_height = node.height();
                node_guard = Some(guard);
            }

            let mut guards: Guards<'_> = std::array::from_fn(|_| None);
            let locked = unsafe {
                Self::lock_nodes_for_change(node_height, &mut guards, &preds, &succs, false)
            };
            if !locked {
                backoff.spin();
                continue;
            }

            unsafe {
                for k in (0..node_height).rev() {
                    (*preds[k]).set_skip(k, (*node_to_delete).skip(k));
                }
            }
            self.size.fetch_sub(1, Relaxed);
            break;
        }

        drop(node_guard);
        self.recycle(node_to_delete);
        true
    }

    /// Replaces the head with a taller copy. Losing the race to another
    /// grower is harmless.
    pub(crate) fn grow_height(&self, height: usize) {
        let old_head = self.head();
        unsafe {
            let old_height = (*old_head).height();
            if old_height >= height {
                return;
            }

            let new_head = Node::create_head(self.recycler.alloc(), height);
            {
                let _guard = (*old_head).acquire_guard();
                new_head.as_ref().copy_head(&*old_head);
                if self
                    .head
                    .compare_exchange(old_head, new_head.as_ptr(), SeqCst, Acquire)
                    .is_err()
                {
                    tracing::debug!("lost race growing skip list to height {}", height);
                    Node::destroy(self.recycler.alloc(), new_head.as_ptr());
                    return;
                }
                (*old_head).set_marked_for_removal();
            }
            tracing::debug!("skip list height grown from {} to {}", old_height, height);
        }
        self.recycle(old_head);
    }
}

impl<T, A: MemAllocator> Drop for SkipList<T, A> {
    fn drop(&mut self) {
        if self.recycler.alloc().is_arena() && !mem::needs_drop::<T>() {
            return;
        }
        tracing::trace!("drop skip list, size: {}", self.size.load(Relaxed));
        unsafe {
            let head = *self.head.get_mut();
            let mut cur = (*head).skip(0);
            while !cur.is_null() {
                let next = (*cur).skip(0);
                Node::destroy(self.recycler.alloc(), cur);
                cur = next;
            }
            Node::destroy(self.recycler.alloc(), head);
        }
    }
}
