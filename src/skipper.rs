use std::ptr::null_mut;

use crate::{
    MAX_HEIGHT,
    accessor::Accessor,
    mem_allocator::prelude::*,
    skip_list::{SkipList, Tower},
};

/// Cursor for a sequence of non-decreasing lower-bound queries.
///
/// Each call to [`Skipper::to`] resumes from the predecessors cached by the
/// previous one and only climbs as many levels as the new target requires,
/// instead of descending from the top of the head every time. This makes
/// walks such as intersecting two sorted lists close to linear. A target
/// smaller than the current position is not supported.
pub struct Skipper<'a, T, A: MemAllocator = DefaultAllocator> {
    accessor: Accessor<'a, T, A>,
    head_height: usize,
    preds: Tower<T>,
    succs: Tower<T>,
    // level to resume searching from, per level of the current node
    hints: [u8; MAX_HEIGHT],
}

impl<'a, T: Ord, A: MemAllocator> Skipper<'a, T, A> {
    pub fn new(accessor: Accessor<'a, T, A>) -> Self {
        let head = accessor.skip_list().head();
        let head_height = unsafe { (*head).height() };

        let mut preds = [null_mut(); MAX_HEIGHT];
        let mut succs = [null_mut(); MAX_HEIGHT];
        for i in 0..head_height {
            preds[i] = head;
            succs[i] = unsafe { (*head).skip(i) };
        }

        let max_layer = head_height - 1;
        let mut hints = [0; MAX_HEIGHT];
        for (i, hint) in hints.iter_mut().enumerate().take(max_layer) {
            *hint = (i + 1) as u8;
        }
        hints[max_layer] = max_layer as u8;

        let mut skipper = Self {
            accessor,
            head_height,
            preds,
            succs,
            hints,
        };
        skipper.settle_current();
        skipper
    }

    pub fn accessor(&self) -> &Accessor<'a, T, A> {
        &self.accessor
    }

    pub fn is_valid(&self) -> bool {
        !self.succs[0].is_null()
    }

    pub fn value(&self) -> Option<&T> {
        if self.is_valid() {
            unsafe { Some((*self.succs[0]).value()) }
        } else {
            None
        }
    }

    fn max_layer(&self) -> usize {
        self.head_height - 1
    }

    // Capped by the cached head height: the current node may have been
    // inserted after the head grew.
    fn cur_height(&self) -> usize {
        if self.succs[0].is_null() {
            0
        } else {
            self.head_height
                .min(unsafe { (*self.succs[0]).height() })
        }
    }

    fn settle_current(&mut self) {
        if !self.succs[0].is_null() {
            unsafe { (*self.succs[0]).wait_fully_linked() };
        }
    }

    /// Steps to the next node on the bottom level.
    ///
    /// # Panics
    ///
    /// Panics if the skipper is already past the end.
    pub fn advance(&mut self) {
        assert!(self.is_valid());
        let passed = self.succs[0];
        let height = self.cur_height();

        self.preds[0] = passed;
        self.succs[0] = unsafe { (*passed).skip(0) };
        for i in 1..height {
            if self.succs[i] != passed {
                break;
            }
            self.preds[i] = passed;
            self.succs[i] = unsafe { (*passed).skip(i) };
        }
        self.settle_current();
    }

    /// Moves to the first node not less than `value`. Returns `true` when that
    /// node equals `value` and is not being removed.
    pub fn to(&mut self, value: &T) -> bool {
        let Some(layer) = self.cur_height().checked_sub(1) else {
            // past the end
            return false;
        };

        let max_layer = self.max_layer();
        let mut lyr = self.hints[layer] as usize;
        while SkipList::<T, A>::greater(value, self.succs[lyr]) && lyr < max_layer {
            lyr += 1;
        }
        self.hints[layer] = lyr as u8;

        let found = unsafe {
            SkipList::<T, A>::find_insertion_point(
                self.preds[lyr],
                lyr,
                value,
                &mut self.preds,
                &mut self.succs,
            )
        };
        self.settle_current();
        if found.is_none() {
            return false;
        }
        debug_assert!(!self.succs[0].is_null(), "lyr {lyr}, max layer {max_layer}");
        unsafe { !(*self.succs[0]).marked_for_removal() }
    }
}
