use log::{debug, trace, warn};

use crate::{
  align::checked_align,
  block::{BlockRef, Footer, OVERHEAD, Payload, WORD, block_of, payload_of, write_mark},
  config::Config,
  error::AllocError,
  free_list::FreeLists,
  memlib::HeapGrowth,
  tail::Tail,
};

/// Segregated-fit allocator with boundary-tag coalescing over a heap
/// provided by `G`.
///
/// ```text
///   ┌──────────┬─────────────┬─────────────┬─────────────┬─ ─ ─ ─ ─ ─┐
///   │ prologue │  allocated  │    free     │  allocated  │  heap_rem  │
///   └──────────┴─────────────┴─────────────┴─────────────┴─ ─ ─ ─ ─ ─┘
///   ▲                                                    ▲            ▲
///   heap_lo                                   real_heap_hi    watermark
/// ```
///
/// The prologue is a single word marked allocated so the first block
/// never looks for a free predecessor below `heap_lo`.
pub struct SegregatedAllocator<G: HeapGrowth> {
  pub(crate) heap: G,
  pub(crate) config: Config,
  pub(crate) lists: FreeLists,
  pub(crate) tail: Tail,
}

impl<G: HeapGrowth> SegregatedAllocator<G> {
  /// Validates `config` and initializes the allocator over `heap`.
  pub fn new(
    heap: G,
    config: Config,
  ) -> Result<Self, AllocError> {
    config.validate()?;

    let mut allocator = Self {
      heap,
      lists: FreeLists::new(config.size_classes),
      tail: Tail::default(),
      config,
    };
    allocator.init()?;

    Ok(allocator)
  }

  /// Starts a fresh allocator lifetime: resets the heap to empty, clears
  /// every free list and lays down the prologue word.
  ///
  /// Payloads returned before the call are invalid afterwards.
  pub fn init(&mut self) -> Result<(), AllocError> {
    self.heap.reset_brk();
    self.lists.clear();
    self.reset_tail();

    let prologue = self
      .extend_tail(WORD)
      .map_err(|source| AllocError::out_of_memory(WORD, source))?;
    write_mark(self.heap.memory_mut(), prologue, Footer::Allocated);

    debug!("[segalloc] init, heap_lo = {:#x}", self.heap.heap_lo());
    Ok(())
  }

  /// Allocates at least `size` bytes.
  ///
  /// Serves the request from the free lists when possible, splitting off
  /// the unused tail of the block, and grows the heap otherwise.
  pub fn malloc(
    &mut self,
    size: usize,
  ) -> Result<Payload, AllocError> {
    let block_size = self.block_size(size)?;

    if let Some(block) = self.take_fit(block_size) {
      trace!(
        "[segalloc] malloc({}) -> {:#x} (free list)",
        size,
        payload_of(block).offset()
      );
      return Ok(payload_of(block));
    }

    let span = block_size
      .checked_add(OVERHEAD)
      .ok_or_else(|| AllocError::too_large(size))?;

    let base = self.extend_tail(span).map_err(|source| {
      warn!("[segalloc] malloc({}) -> OOM: {}", size, source);
      AllocError::out_of_memory(size, source)
    })?;

    let block = BlockRef::at(base);
    let mem = self.heap.memory_mut();
    block.set_size(mem, block_size);
    block.set_footer(mem, Footer::Allocated);

    trace!(
      "[segalloc] malloc({}) -> {:#x} (heap end)",
      size,
      payload_of(block).offset()
    );
    Ok(payload_of(block))
  }

  /// Releases a payload.
  ///
  /// `payload` must have been returned by this allocator and not freed
  /// since; this is not checked.
  pub fn free(
    &mut self,
    payload: Payload,
  ) {
    let block = block_of(payload);

    if self.retract_if_topmost(block) {
      trace!("[segalloc] free({:#x}) -> heap end", payload.offset());
      return;
    }

    let mem = self.heap.memory_mut();
    self.lists.insert(mem, block);
    let merged = self.coalesce(block);

    trace!(
      "[segalloc] free({:#x}) -> free block {:#x}",
      payload.offset(),
      merged.offset()
    );
  }

  /// Resizes a payload, keeping its first `min(old, new)` bytes.
  ///
  /// The topmost block grows or shrinks in place. Any other block is
  /// moved to a fresh allocation. On error the original payload is left
  /// untouched and still owned by the caller. `None` allocates.
  pub fn realloc(
    &mut self,
    payload: Option<Payload>,
    size: usize,
  ) -> Result<Payload, AllocError> {
    let Some(payload) = payload else {
      return self.malloc(size);
    };

    let new_size = self.block_size(size)?;
    let block = block_of(payload);
    let old_size = block.size(self.heap.memory());

    if self.is_topmost(block) {
      if new_size > old_size {
        self.extend_tail(new_size - old_size).map_err(|source| {
          warn!("[segalloc] realloc({:#x}, {}) -> OOM: {}", payload.offset(), size, source);
          AllocError::out_of_memory(size, source)
        })?;
      } else {
        self.shrink_tail(old_size - new_size);
      }

      let mem = self.heap.memory_mut();
      block.set_size(mem, new_size);
      block.set_footer(mem, Footer::Allocated);
      self.settle_tail();

      trace!(
        "[segalloc] realloc({:#x}, {}) in place, {} -> {}",
        payload.offset(),
        size,
        old_size,
        new_size
      );
      return Ok(payload);
    }

    let fresh = self.malloc(size)?;
    let copied = old_size.min(new_size);
    let from = payload.offset();
    self
      .heap
      .memory_mut()
      .copy_within(from..from + copied, fresh.offset());
    self.free(payload);

    trace!(
      "[segalloc] realloc({:#x}, {}) moved to {:#x}",
      from,
      size,
      fresh.offset()
    );
    Ok(fresh)
  }

  /// Address of the first heap byte.
  pub fn heap_lo(&self) -> usize {
    self.heap.heap_lo()
  }

  /// Address of the last heap byte.
  pub fn heap_hi(&self) -> usize {
    self.heap.heap_hi()
  }

  /// Absolute address of a payload.
  pub fn address(
    &self,
    payload: Payload,
  ) -> usize {
    self.heap.heap_lo() + payload.offset()
  }

  /// Aligned capacity of a payload, at least the size it was requested
  /// with.
  pub fn usable_size(
    &self,
    payload: Payload,
  ) -> usize {
    block_of(payload).size(self.heap.memory())
  }

  pub fn payload(
    &self,
    payload: Payload,
  ) -> &[u8] {
    let size = self.usable_size(payload);
    &self.heap.memory()[payload.offset()..payload.offset() + size]
  }

  pub fn payload_mut(
    &mut self,
    payload: Payload,
  ) -> &mut [u8] {
    let size = self.usable_size(payload);
    &mut self.heap.memory_mut()[payload.offset()..payload.offset() + size]
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn heap(&self) -> &G {
    &self.heap
  }

  /// Gives the heap back, ending this allocator's lifetime.
  pub fn into_inner(self) -> G {
    self.heap
  }

  /// Payload size for a request: aligned and at least the smallest class.
  fn block_size(
    &self,
    size: usize,
  ) -> Result<usize, AllocError> {
    checked_align(size)
      .map(|aligned| aligned.max(self.config.min_block()))
      .ok_or_else(|| AllocError::too_large(size))
  }

  /// Unlinks a fitting free block, splitting off what the request does
  /// not need when the rest can stand as a free block of its own.
  fn take_fit(
    &mut self,
    size: usize,
  ) -> Option<BlockRef> {
    let mem = self.heap.memory_mut();
    let block = self.lists.find_fit(mem, size)?;
    self.lists.remove(mem, block);

    let found = block.size(mem);
    if found - size >= self.config.min_block() + OVERHEAD {
      let rest = BlockRef::at(block.offset() + OVERHEAD + size);
      rest.set_size(mem, found - size - OVERHEAD);
      self.lists.insert(mem, rest);

      block.set_size(mem, size);
      block.set_footer(mem, Footer::Allocated);
    }

    Some(block)
  }
}
