use crate::{
    MAX_HEIGHT,
    error::{Error, Result},
    mem_allocator::prelude::*,
    skip_list::SkipList,
};

#[derive(Debug, Clone)]
pub struct SkipListOptions {
    initial_height: usize,
}

impl Default for SkipListOptions {
    fn default() -> Self {
        Self { initial_height: 1 }
    }
}

impl SkipListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Height of the head tower the list starts with. The list grows on its own
    /// as elements are added, so this only matters for lists known to be large.
    pub fn initial_height(&mut self, height: usize) -> &mut Self {
        self.initial_height = height;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_height == 0 || self.initial_height > MAX_HEIGHT {
            return Err(Error::InvalidHeight {
                height: self.initial_height,
                max: MAX_HEIGHT,
            });
        }
        Ok(())
    }

    pub fn build<T: Ord>(&self) -> Result<SkipList<T>> {
        self.build_with_allocator(DefaultAllocator::default())
    }

    pub fn build_with_allocator<T: Ord, A: MemAllocator>(
        &self,
        alloc: A,
    ) -> Result<SkipList<T, A>> {
        self.validate()?;
        tracing::debug!("build skip list, initial height: {}", self.initial_height);
        Ok(SkipList::with_allocator(self.initial_height, alloc))
    }
}
