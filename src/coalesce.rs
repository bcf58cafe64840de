//! Boundary-tag coalescing.
//!
//! ```text
//!   before:  │ hdr │ prev (free) │ 96 │ hdr │ block (free) │ 48 │ hdr │ next (free) │ 32 │
//!   after:   │ hdr │              merged (free)                                  │ 208 │
//! ```
//!
//! Each merge reclaims one footer and one header, so the merged size is
//! the sum of the parts plus `OVERHEAD` per merge.

use log::trace;

use crate::{
  allocator::SegregatedAllocator,
  block::{BlockRef, OVERHEAD},
  memlib::HeapGrowth,
};

impl<G: HeapGrowth> SegregatedAllocator<G> {
  /// Merges the free `block` with free neighbours until neither side is
  /// free. Returns the block that now contains it.
  pub(crate) fn coalesce(
    &mut self,
    mut block: BlockRef,
  ) -> BlockRef {
    loop {
      let mut merged = false;

      if let Some(prev) = block.free_predecessor(self.heap.memory()) {
        block = self.merge(prev, block);
        merged = true;
      }

      if let Some(next) = self.free_successor(block) {
        block = self.merge(block, next);
        merged = true;
      }

      if !merged {
        return block;
      }
    }
  }

  fn free_successor(
    &self,
    block: BlockRef,
  ) -> Option<BlockRef> {
    let mem = self.heap.memory();
    let next = block.end(mem);

    (next < self.tail.real_heap_hi)
      .then(|| BlockRef::at(next))
      .filter(|next| next.is_free(mem))
  }

  /// Joins two adjacent free blocks, `low` directly before `high`.
  fn merge(
    &mut self,
    low: BlockRef,
    high: BlockRef,
  ) -> BlockRef {
    let mem = self.heap.memory_mut();
    let size = low.size(mem) + high.size(mem) + OVERHEAD;

    self.lists.remove(mem, low);
    self.lists.remove(mem, high);
    low.set_size(mem, size);
    self.lists.insert(mem, low);

    trace!(
      "[segalloc] coalesced {:#x} and {:#x} into {} bytes",
      low.offset(),
      high.offset(),
      size
    );
    low
  }
}
