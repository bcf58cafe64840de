//! Diagnostic heap walk.

use log::error;

use crate::{
  allocator::SegregatedAllocator,
  block::{BlockRef, Footer, WORD, footer_slot, read_mark},
  error::InvariantViolation,
  free_list::{FreeLists, NUM_LISTS},
  memlib::HeapGrowth,
};

/// Summary of a successful [`validate_heap`](SegregatedAllocator::validate_heap).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
  pub blocks: usize,
  pub allocated_blocks: usize,
  pub allocated_bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  /// Claimed heap-end bytes not covered by any block.
  pub tail_slack: usize,
}

impl<G: HeapGrowth> SegregatedAllocator<G> {
  /// Walks every block header from the prologue to `real_heap_hi`.
  ///
  /// Stops at the first broken invariant and reports it; nothing is
  /// repaired.
  pub fn validate_heap(&self) -> Result<HeapStats, InvariantViolation> {
    self.walk().inspect_err(|violation| {
      error!("[segalloc] heap check failed: {violation}");
    })
  }

  fn walk(&self) -> Result<HeapStats, InvariantViolation> {
    let mem = self.heap.memory();
    let tail = self.tail;

    let watermark = self.heap.watermark();
    if tail.real_heap_hi + tail.heap_rem != watermark {
      return Err(InvariantViolation::TailMismatch {
        real_heap_hi: tail.real_heap_hi,
        heap_rem: tail.heap_rem,
        watermark,
      });
    }

    if tail.real_heap_hi < WORD || read_mark(mem, 0) != Footer::Allocated {
      return Err(InvariantViolation::MissingPrologue);
    }

    let mut stats = HeapStats {
      tail_slack: tail.heap_rem,
      ..HeapStats::default()
    };
    let mut at = WORD;
    let mut previous_free: Option<BlockRef> = None;
    // ascending, since the walk goes up the heap
    let mut free = Vec::new();

    while at < tail.real_heap_hi {
      let block = BlockRef::at(at);
      let size = block.size(mem);

      if size < self.config.min_block() || size % WORD != 0 {
        return Err(InvariantViolation::BadSize { block: at, size });
      }

      let end = at
        .checked_add(WORD * 2)
        .and_then(|end| end.checked_add(size))
        .filter(|&end| end <= tail.real_heap_hi)
        .ok_or(InvariantViolation::BrokenChain {
          block: at,
          end: at.saturating_add(WORD * 2).saturating_add(size),
          tail: tail.real_heap_hi,
        })?;

      stats.blocks += 1;
      match read_mark(mem, footer_slot(mem, block)) {
        Footer::Allocated => {
          stats.allocated_blocks += 1;
          stats.allocated_bytes += size;
          previous_free = None;
        }
        Footer::Free(footer) => {
          if footer != size {
            return Err(InvariantViolation::FooterMismatch {
              block: at,
              header: size,
              footer,
            });
          }
          if let Some(left) = previous_free {
            return Err(InvariantViolation::Uncoalesced {
              left: left.offset(),
              right: at,
            });
          }

          let expected = self.lists.classify(size);
          let found = FreeLists::list_of(mem, block);
          if found != expected {
            return Err(InvariantViolation::WrongClass {
              block: at,
              size,
              expected,
              found,
            });
          }

          stats.free_blocks += 1;
          stats.free_bytes += size;
          previous_free = Some(block);
          free.push(at);
        }
      }

      at = end;
    }

    if let Some(block) = previous_free {
      return Err(InvariantViolation::FreeTail {
        block: block.offset(),
      });
    }

    // links are only followed into blocks the walk saw as free; a cycle
    // is cut one past the walked count
    let mut listed = 0;
    'lists: for list in 0..NUM_LISTS {
      let mut link = self.lists.head(list);
      while let Some(block) = link {
        if free.binary_search(&block.offset()).is_err() {
          return Err(InvariantViolation::BadLink {
            list,
            link: block.offset(),
          });
        }
        listed += 1;
        if listed > stats.free_blocks {
          break 'lists;
        }
        link = FreeLists::next_of(mem, block);
      }
    }

    if listed != stats.free_blocks {
      return Err(InvariantViolation::ListCountMismatch {
        listed,
        walked: stats.free_blocks,
      });
    }

    Ok(stats)
  }
}
