use std::sync::Arc;

use crate::{
    iterator::Iter, mem_allocator::prelude::*, skip_list::SkipList, skipper::Skipper,
};

enum ListRef<'a, T, A: MemAllocator> {
    Shared(Arc<SkipList<T, A>>),
    Borrowed(&'a SkipList<T, A>),
}

impl<T, A: MemAllocator> Clone for ListRef<'_, T, A> {
    fn clone(&self) -> Self {
        match self {
            ListRef::Shared(list) => ListRef::Shared(list.clone()),
            ListRef::Borrowed(list) => ListRef::Borrowed(list),
        }
    }
}

/// Handle through which a [`SkipList`] is read and written.
///
/// Nodes removed while any accessor is alive are only freed after the last
/// live accessor drops, so every reference handed out by an accessor stays
/// valid for as long as that accessor does.
pub struct Accessor<'a, T, A: MemAllocator = DefaultAllocator> {
    list: ListRef<'a, T, A>,
}

impl<T, A: MemAllocator> Accessor<'static, T, A> {
    /// Accessor that keeps the list itself alive.
    pub fn new(list: Arc<SkipList<T, A>>) -> Self {
        list.recycler().add_ref();
        Self {
            list: ListRef::Shared(list),
        }
    }
}

impl<'a, T, A: MemAllocator> Accessor<'a, T, A> {
    pub fn borrowed(list: &'a SkipList<T, A>) -> Self {
        list.recycler().add_ref();
        Self {
            list: ListRef::Borrowed(list),
        }
    }

    pub fn skip_list(&self) -> &SkipList<T, A> {
        match &self.list {
            ListRef::Shared(list) => list,
            ListRef::Borrowed(list) => list,
        }
    }

    pub fn size(&self) -> usize {
        self.skip_list().size()
    }

    pub fn is_empty(&self) -> bool {
        self.skip_list().is_empty()
    }

    pub fn height(&self) -> usize {
        self.skip_list().head_height()
    }
}

impl<'a, T: Ord, A: MemAllocator> Accessor<'a, T, A> {
    /// Inserts `value`. The cursor points at the stored element, which is the
    /// pre-existing one when the flag is `false`.
    pub fn insert(&self, value: T) -> (Iter<'_, T, A>, bool) {
        let (node, size) = self.skip_list().add_or_get_data(value);
        (Iter::new(self.skip_list(), node.as_ptr()), size > 0)
    }

    pub fn add_or_get(&self, value: T) -> (&T, bool) {
        let (node, size) = self.skip_list().add_or_get_data(value);
        (unsafe { node.as_ref().value() }, size > 0)
    }

    /// Returns `false` if `value` is absent or already being removed.
    pub fn erase(&self, value: &T) -> bool {
        self.skip_list().remove(value)
    }

    /// Cursor at `value`, or [`Accessor::end`] when absent.
    pub fn find(&self, value: &T) -> Iter<'_, T, A> {
        Iter::new(self.skip_list(), self.skip_list().find(value))
    }

    pub fn contains(&self, value: &T) -> bool {
        !self.skip_list().find(value).is_null()
    }

    /// Cursor at the first element not less than `value`.
    pub fn lower_bound(&self, value: &T) -> Iter<'_, T, A> {
        Iter::new(self.skip_list(), self.skip_list().lower_bound(value))
    }

    pub fn begin(&self) -> Iter<'_, T, A> {
        Iter::new(self.skip_list(), self.skip_list().first_node())
    }

    pub fn end(&self) -> Iter<'_, T, A> {
        Iter::end(self.skip_list())
    }

    /// Smallest element, as seen at the time of the call. Writers running
    /// concurrently may make this stale before it returns.
    pub fn first(&self) -> Option<&T> {
        self.skip_list().first()
    }

    /// Largest element, as seen at the time of the call. Writers running
    /// concurrently may make this stale before it returns.
    pub fn last(&self) -> Option<&T> {
        self.skip_list().last()
    }

    /// Removes the last element. Returns `false` when the list is empty or
    /// another thread removed that element first.
    pub fn pop_back(&self) -> bool {
        match self.last() {
            Some(last) => self.skip_list().remove(last),
            None => false,
        }
    }

    pub fn skipper(&self) -> Skipper<'a, T, A> {
        Skipper::new(self.clone())
    }
}

impl<T, A: MemAllocator> Clone for Accessor<'_, T, A> {
    fn clone(&self) -> Self {
        self.skip_list().recycler().add_ref();
        Self {
            list: self.list.clone(),
        }
    }
}

impl<T, A: MemAllocator> Drop for Accessor<'_, T, A> {
    fn drop(&mut self) {
        self.skip_list().recycler().release_ref();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_utils::TrackingAllocator;

    #[test]
    fn test_insert_twice() {
        let list = SkipList::new(1);
        let a = list.accessor();

        let (it, added) = a.insert(3u32);
        assert!(added);
        assert_eq!(it.value(), Some(&3));

        let (it, added) = a.insert(3u32);
        assert!(!added);
        assert_eq!(it.value(), Some(&3));
        assert_eq!(a.size(), 1);
    }

    #[test]
    fn test_add_or_get() {
        let list = SkipList::new(1);
        let a = list.accessor();
        let (v, added) = a.add_or_get((1u32, "x"));
        assert!(added);
        assert_eq!(v, &(1, "x"));
        assert_eq!(a.add_or_get((1u32, "x")), (&(1, "x"), false));
    }

    #[test]
    fn test_find_erase() {
        let list = SkipList::new(1);
        let a = list.accessor();
        for i in 0..10u32 {
            a.insert(i);
        }

        assert_eq!(a.find(&4).value(), Some(&4));
        assert!(a.find(&42) == a.end());

        assert!(a.erase(&4));
        assert!(!a.erase(&4));
        assert!(a.find(&4) == a.end());
        assert!(!a.contains(&4));
        assert_eq!(a.size(), 9);

        // erasing an absent value leaves the size alone
        assert!(!a.erase(&100));
        assert_eq!(a.size(), 9);
    }

    #[test]
    fn test_lower_bound_and_begin() {
        let list = SkipList::new(1);
        let a = list.accessor();
        assert!(a.begin() == a.end());
        assert!(a.is_empty());

        for i in [5u32, 1, 3] {
            a.insert(i);
        }
        assert_eq!(a.begin().value(), Some(&1));
        assert_eq!(a.lower_bound(&2).value(), Some(&3));
        assert_eq!(a.lower_bound(&3).value(), Some(&3));
        assert!(a.lower_bound(&6) == a.end());
    }

    #[test]
    fn test_first_last_pop_back() {
        let list = SkipList::new(1);
        let a = list.accessor();
        assert!(!a.pop_back());
        assert_eq!(a.first(), None);
        assert_eq!(a.last(), None);

        for i in 1..=5u32 {
            a.insert(i);
        }
        assert_eq!(a.first(), Some(&1));
        assert_eq!(a.last(), Some(&5));

        assert!(a.pop_back());
        assert_eq!(a.last(), Some(&4));
        assert_eq!(a.size(), 4);
    }

    #[test]
    fn test_shared_accessor() {
        let list = Arc::new(SkipList::new(1));
        let a = Accessor::new(list.clone());
        a.insert(1u32);

        let handle = std::thread::spawn({
            let list = list.clone();
            move || {
                let a = Accessor::new(list);
                a.contains(&1)
            }
        });
        assert!(handle.join().unwrap());
        assert_eq!(a.skip_list().recycler().refs(), 1);
    }

    #[test]
    fn test_clone_adds_ref() {
        let list: SkipList<u32> = SkipList::new(1);
        let a = list.accessor();
        assert_eq!(list.recycler().refs(), 1);
        let b = a.clone();
        assert_eq!(list.recycler().refs(), 2);
        drop(a);
        assert_eq!(list.recycler().refs(), 1);
        drop(b);
        assert_eq!(list.recycler().refs(), 0);
    }

    #[test]
    fn test_erased_node_outlives_accessor() {
        let alloc = Arc::new(TrackingAllocator::default());
        let list = SkipList::with_allocator(1, alloc.clone());

        let reader = list.accessor();
        reader.insert(7u64);
        reader.insert(8u64);
        let kept = reader.find(&7);

        crossbeam::thread::scope(|s| {
            s.spawn(|_| {
                let writer = list.accessor();
                assert!(writer.erase(&7));
            });
        })
        .unwrap();
        // the writer is gone but the reader still pins the node
        assert_eq!(alloc.deallocs(), 0);
        assert_eq!(kept.value(), Some(&7));
        assert!(!reader.contains(&7));

        drop(kept);
        drop(reader);
        assert_eq!(alloc.deallocs(), 1);
    }
}
