//! Heap-end bookkeeping.
//!
//! ```text
//!   heap_lo                      real_heap_hi         watermark
//!   ├──────── blocks ─────────────┼──── heap_rem ───────┤
//!                                 ▲
//!                                 └── end of the topmost allocated block
//! ```

use log::{debug, warn};

use crate::{
  allocator::SegregatedAllocator,
  block::{BlockRef, Footer, OVERHEAD, WORD, read_mark},
  error::GrowthError,
  memlib::HeapGrowth,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tail {
  /// One past the last byte of the topmost non-free block.
  pub real_heap_hi: usize,
  /// Bytes between `real_heap_hi` and the provider's watermark.
  pub heap_rem: usize,
}

impl<G: HeapGrowth> SegregatedAllocator<G> {
  pub(crate) fn reset_tail(&mut self) {
    self.tail = Tail {
      real_heap_hi: self.heap.watermark(),
      heap_rem: 0,
    };
  }

  /// Claims `amount` bytes at the end of the heap, using the retained
  /// slack before asking the provider. Returns the offset of the claimed
  /// span. Nothing changes on failure.
  pub(crate) fn extend_tail(
    &mut self,
    amount: usize,
  ) -> Result<usize, GrowthError> {
    let base = self.tail.real_heap_hi;

    if self.tail.heap_rem >= amount {
      self.tail.real_heap_hi += amount;
      self.tail.heap_rem -= amount;
    } else {
      self.heap.sbrk(amount - self.tail.heap_rem)?;
      self.reset_tail();
      debug!(
        "[segalloc] heap grown to {:#x} bytes",
        self.heap.watermark()
      );
    }

    Ok(base)
  }

  pub(crate) fn is_topmost(
    &self,
    block: BlockRef,
  ) -> bool {
    block.end(self.heap.memory()) == self.tail.real_heap_hi
  }

  /// Moves `real_heap_hi` down by `amount` bytes into the slack.
  pub(crate) fn shrink_tail(
    &mut self,
    amount: usize,
  ) {
    self.tail.real_heap_hi -= amount;
    self.tail.heap_rem += amount;
  }

  /// If `block` is the topmost block, gives it to the slack together with
  /// any free blocks that become topmost behind it.
  pub(crate) fn retract_if_topmost(
    &mut self,
    block: BlockRef,
  ) -> bool {
    if !self.is_topmost(block) {
      return false;
    }

    let span = block.end(self.heap.memory()) - block.offset();
    self.shrink_tail(span);

    loop {
      let mem = self.heap.memory_mut();
      let Footer::Free(size) = read_mark(mem, self.tail.real_heap_hi - WORD) else {
        break;
      };
      let below = BlockRef::at(self.tail.real_heap_hi - OVERHEAD - size);
      self.lists.remove(mem, below);
      self.shrink_tail(size + OVERHEAD);
    }

    self.settle_tail();
    true
  }

  /// Returns slack beyond `retain_tail` to the provider.
  pub(crate) fn settle_tail(&mut self) {
    let Some(excess) = self.tail.heap_rem.checked_sub(self.config.retain_tail) else {
      return;
    };
    if excess == 0 {
      return;
    }

    match self.heap.trim(excess) {
      Ok(()) => {
        self.tail.heap_rem -= excess;
        debug!(
          "[segalloc] trimmed {} bytes, heap now {:#x} bytes",
          excess,
          self.heap.watermark()
        );
      }
      Err(err) => warn!("[segalloc] tail trim failed: {err}"),
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::{
    SegregatedAllocator,
    block::{OVERHEAD, WORD, block_of},
    config::Config,
    memlib::{HeapGrowth, MemLib},
  };

  fn allocator(retain_tail: usize) -> SegregatedAllocator<MemLib> {
    let heap = MemLib::with_capacity(1 << 16).unwrap();
    SegregatedAllocator::new(heap, Config::default().with_retain_tail(retain_tail)).unwrap()
  }

  #[test]
  fn test_init_tracks_prologue() {
    let allocator = allocator(0);

    assert_eq!(allocator.tail.real_heap_hi, WORD);
    assert_eq!(allocator.tail.heap_rem, 0);
    assert_eq!(allocator.heap.watermark(), WORD);
  }

  #[test]
  fn test_extend_uses_slack_first() {
    let mut allocator = allocator(4096);

    let p = allocator.malloc(200).unwrap();
    let watermark = allocator.heap.watermark();
    allocator.free(p);

    assert_eq!(allocator.tail.real_heap_hi, WORD);
    assert_eq!(allocator.tail.heap_rem, watermark - WORD);
    assert_eq!(allocator.heap.watermark(), watermark);

    let q = allocator.malloc(100).unwrap();
    assert_eq!(q, p);
    assert_eq!(allocator.heap.watermark(), watermark);
    assert_eq!(
      allocator.tail.real_heap_hi + allocator.tail.heap_rem,
      allocator.heap.watermark()
    );
  }

  #[test]
  fn test_retract_collapses_free_blocks_below() {
    let mut allocator = allocator(0);

    let a = allocator.malloc(64).unwrap();
    let b = allocator.malloc(64).unwrap();
    let c = allocator.malloc(64).unwrap();

    allocator.free(a);
    allocator.free(b);
    assert!(!allocator.is_topmost(block_of(b)));

    assert!(allocator.retract_if_topmost(block_of(c)));
    assert_eq!(allocator.tail.real_heap_hi, WORD);
    assert_eq!(allocator.heap.watermark(), WORD);
    assert!(allocator.lists.head(allocator.lists.classify(64 * 2 + 16)).is_none());
  }

  #[test]
  fn test_settle_keeps_retained_slack() {
    let mut allocator = allocator(64);

    let p = allocator.malloc(200).unwrap();
    allocator.free(p);

    assert_eq!(allocator.tail.heap_rem, 64);
    assert_eq!(allocator.heap.watermark(), WORD + 64);
  }

  #[test]
  fn test_realloc_grows_through_partial_slack() {
    let mut allocator = allocator(64);

    let a = allocator.malloc(200).unwrap();
    let b = allocator.malloc(40).unwrap();
    allocator.payload_mut(a)[..4].copy_from_slice(b"tail");
    allocator.free(b);

    assert_eq!(allocator.tail.heap_rem, 40 + OVERHEAD);
    assert_eq!(allocator.heap.watermark(), WORD + 200 + OVERHEAD + 40 + OVERHEAD);

    // 200 more bytes, only 56 of them in the slack
    let q = allocator.realloc(Some(a), 400).unwrap();

    assert_eq!(q, a);
    assert_eq!(allocator.usable_size(q), 400);
    assert_eq!(&allocator.payload(q)[..4], b"tail");
    assert_eq!(allocator.tail.heap_rem, 0);
    assert_eq!(allocator.tail.real_heap_hi, WORD + 400 + OVERHEAD);
    assert_eq!(allocator.heap.watermark(), WORD + 400 + OVERHEAD);
    assert!(allocator.validate_heap().is_ok());
  }

  #[test]
  fn test_realloc_shrink_keeps_retained_slack() {
    let mut allocator = allocator(64);

    let a = allocator.malloc(400).unwrap();
    let q = allocator.realloc(Some(a), 200).unwrap();

    assert_eq!(q, a);
    assert_eq!(allocator.tail.real_heap_hi, WORD + 200 + OVERHEAD);
    assert_eq!(allocator.tail.heap_rem, 64);
    assert_eq!(allocator.heap.watermark(), WORD + 200 + OVERHEAD + 64);

    let q = allocator.realloc(Some(q), 240).unwrap();

    assert_eq!(q, a);
    assert_eq!(allocator.tail.heap_rem, 24);
    assert_eq!(allocator.heap.watermark(), WORD + 200 + OVERHEAD + 64);
    assert!(allocator.validate_heap().is_ok());
  }
}
