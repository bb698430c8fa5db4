//! A concurrent ordered set built on a skip list.
//!
//! Lookups and iteration are lock-free; inserts and removals lock only the
//! nodes whose links they rewrite. Every operation goes through an
//! [`Accessor`], which also decides when removed nodes may be freed.

mod accessor;
mod height;
mod iterator;
mod mem_allocator;
mod node;
mod options;
mod recycler;
mod skip_list;
mod skipper;

#[cfg(test)]
mod test_utils;

pub mod error;

/// Tallest tower a node or the head can have.
pub const MAX_HEIGHT: usize = 24;

pub use accessor::Accessor;
pub use iterator::Iter;
pub use mem_allocator::prelude::*;
pub use options::SkipListOptions;
pub use skip_list::SkipList;
pub use skipper::Skipper;

pub mod prelude {
    pub use crate::{
        Accessor, BlockArena, DefaultAllocator, Iter, MAX_HEIGHT, MemAllocator, SkipList,
        SkipListOptions, Skipper,
    };
}
