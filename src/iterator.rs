use std::{fmt, ptr};

use crate::{
    mem_allocator::prelude::*,
    skip_list::{Link, SkipList},
};

/// Forward cursor over the bottom level of a [`SkipList`].
///
/// Obtained from an [`Accessor`](crate::Accessor) and bound to its lifetime,
/// so the values it yields stay valid even if they are erased meanwhile.
/// Cursors are independent of each other; start over with a fresh `begin()`.
pub struct Iter<'a, T, A: MemAllocator = DefaultAllocator> {
    list: &'a SkipList<T, A>,
    node: Link<T>,
}

impl<'a, T, A: MemAllocator> Iter<'a, T, A> {
    pub(crate) fn new(list: &'a SkipList<T, A>, node: Link<T>) -> Self {
        Self { list, node }
    }

    pub(crate) fn end(list: &'a SkipList<T, A>) -> Self {
        Self::new(list, ptr::null_mut())
    }

    pub fn is_valid(&self) -> bool {
        !self.node.is_null()
    }

    pub fn value(&self) -> Option<&'a T> {
        if self.is_valid() {
            unsafe { Some((*self.node).value()) }
        } else {
            None
        }
    }
}

impl<'a, T: Ord, A: MemAllocator> Iter<'a, T, A> {
    /// Moves to the next live element.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is already past the end.
    pub fn next(&mut self) {
        assert!(self.is_valid());
        self.node = unsafe { SkipList::<T, A>::settle((*self.node).skip(0)) };
    }

    pub fn seek_to_first(&mut self) {
        self.node = self.list.first_node();
    }

    /// Moves to the first element not less than `value`.
    pub fn seek(&mut self, value: &T) {
        self.node = self.list.lower_bound(value);
    }
}

impl<T, A: MemAllocator> Clone for Iter<'_, T, A> {
    fn clone(&self) -> Self {
        Self {
            list: self.list,
            node: self.node,
        }
    }
}

impl<T, A: MemAllocator> PartialEq for Iter<'_, T, A> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.node, other.node)
    }
}

impl<T, A: MemAllocator> Eq for Iter<'_, T, A> {}

impl<T: fmt::Debug, A: MemAllocator> fmt::Debug for Iter<'_, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Iter").field(&self.value()).finish()
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use crate::skip_list::SkipList;

    fn drain<T: Ord + Clone>(mut iter: super::Iter<'_, T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(v) = iter.value() {
            out.push(v.clone());
            iter.next();
        }
        out
    }

    #[test]
    fn test_iterate_in_order() {
        const TEST_COUNT: u64 = 10_000;

        let list = SkipList::new(1);
        let a = list.accessor();
        for i in (0..TEST_COUNT).rev() {
            a.insert(i);
        }

        let values = drain(a.begin());
        assert_eq!(values.len(), TEST_COUNT as usize);
        assert!(values.iter().tuple_windows().all(|(x, y)| x < y));
        assert_eq!(values.first(), Some(&0));
        assert_eq!(values.last(), Some(&(TEST_COUNT - 1)));
    }

    #[test]
    fn test_seek() {
        let list = SkipList::new(1);
        let a = list.accessor();
        for i in (0..100u32).map(|i| i * 10) {
            a.insert(i);
        }

        let mut iter = a.end();
        assert!(!iter.is_valid());
        iter.seek(&55);
        assert_eq!(iter.value(), Some(&60));
        iter.next();
        assert_eq!(iter.value(), Some(&70));

        iter.seek_to_first();
        assert_eq!(iter.value(), Some(&0));

        iter.seek(&1000);
        assert!(!iter.is_valid());
        assert!(iter == a.end());
    }

    #[test]
    fn test_independent_cursors() {
        let list = SkipList::new(1);
        let a = list.accessor();
        for i in 0..10u32 {
            a.insert(i);
        }

        let mut x = a.begin();
        let y = x.clone();
        x.next();
        x.next();
        assert_eq!(x.value(), Some(&2));
        assert_eq!(y.value(), Some(&0));
        assert_eq!(drain(a.begin()), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_skips_erased() {
        let list = SkipList::new(1);
        let a = list.accessor();
        for i in 0..10u32 {
            a.insert(i);
        }
        let mut iter = a.find(&3);
        for i in 4..8u32 {
            assert!(a.erase(&i));
        }
        // the cursor's own node is still readable
        assert_eq!(iter.value(), Some(&3));
        iter.next();
        assert_eq!(iter.value(), Some(&8));
        assert_eq!(drain(a.begin()), vec![0, 1, 2, 3, 8, 9]);
    }

    #[test]
    #[should_panic]
    fn test_next_past_end() {
        let list: SkipList<u32> = SkipList::new(1);
        let a = list.accessor();
        let mut iter = a.end();
        iter.next();
    }
}
