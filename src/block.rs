//! Physical block layout inside the heap bytes.
//!
//! ```text
//!   offset:  base          base + WORD              base + WORD + size
//!            ┌─────────────┬────────────────────────┬─────────────┐
//!            │ size header │   payload (size bytes) │  free mark  │
//!            └─────────────┴────────────────────────┴─────────────┘
//!                          ▲
//!                          └── Payload handed to the client
//! ```
//!
//! The free mark holds the block size while the block is free and
//! `NON_FREE` while it is allocated.

use crate::align;

/// Width of a header or footer slot.
pub const WORD: usize = align!(std::mem::size_of::<u64>());

/// Header plus footer cost of every block.
pub const OVERHEAD: usize = 2 * WORD;

/// A free block stores `next`, `prev` and its list index in the payload.
pub const MIN_FREE_PAYLOAD: usize = 3 * WORD;

const NON_FREE: u64 = 0;

/// Offset of a block's header from `heap_lo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockRef(usize);

/// Opaque handle to an allocated payload.
///
/// Only valid for the allocator that returned it, until it is freed or
/// passed to `realloc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(usize);

/// Decoded trailing boundary tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Footer {
  Allocated,
  Free(usize),
}

impl Footer {
  fn encode(self) -> u64 {
    match self {
      Footer::Allocated => NON_FREE,
      Footer::Free(size) => size as u64,
    }
  }

  fn decode(word: u64) -> Self {
    match word {
      NON_FREE => Footer::Allocated,
      size => Footer::Free(size as usize),
    }
  }
}

impl Payload {
  /// Offset from `heap_lo`.
  pub fn offset(self) -> usize {
    self.0
  }
}

pub fn payload_of(block: BlockRef) -> Payload {
  Payload(block.0 + WORD)
}

pub fn block_of(payload: Payload) -> BlockRef {
  BlockRef(payload.0 - WORD)
}

/// Offset of the free mark, right after the payload.
pub fn footer_slot(
  mem: &[u8],
  block: BlockRef,
) -> usize {
  block.0 + WORD + block.size(mem)
}

pub(crate) fn read_word(
  mem: &[u8],
  at: usize,
) -> u64 {
  let mut bytes = [0u8; WORD];
  bytes.copy_from_slice(&mem[at..at + WORD]);
  u64::from_ne_bytes(bytes)
}

pub(crate) fn write_word(
  mem: &mut [u8],
  at: usize,
  value: u64,
) {
  mem[at..at + WORD].copy_from_slice(&value.to_ne_bytes());
}

/// Reads the mark stored in the word at `at`.
pub(crate) fn read_mark(
  mem: &[u8],
  at: usize,
) -> Footer {
  Footer::decode(read_word(mem, at))
}

pub(crate) fn write_mark(
  mem: &mut [u8],
  at: usize,
  mark: Footer,
) {
  write_word(mem, at, mark.encode());
}

impl BlockRef {
  pub const fn at(offset: usize) -> Self {
    Self(offset)
  }

  pub fn offset(self) -> usize {
    self.0
  }

  pub fn size(
    self,
    mem: &[u8],
  ) -> usize {
    read_word(mem, self.0) as usize
  }

  pub fn set_size(
    self,
    mem: &mut [u8],
    size: usize,
  ) {
    write_word(mem, self.0, size as u64);
  }

  pub fn footer(
    self,
    mem: &[u8],
  ) -> Footer {
    read_mark(mem, footer_slot(mem, self))
  }

  pub fn set_footer(
    self,
    mem: &mut [u8],
    mark: Footer,
  ) {
    let slot = footer_slot(mem, self);
    write_mark(mem, slot, mark);
  }

  pub fn is_free(
    self,
    mem: &[u8],
  ) -> bool {
    matches!(self.footer(mem), Footer::Free(_))
  }

  /// Offset one past the footer, where the next block starts.
  pub fn end(
    self,
    mem: &[u8],
  ) -> usize {
    self.0 + OVERHEAD + self.size(mem)
  }

  /// Block whose footer is the word right before `self`, if that block
  /// is free.
  pub fn free_predecessor(
    self,
    mem: &[u8],
  ) -> Option<BlockRef> {
    match read_mark(mem, self.0 - WORD) {
      Footer::Allocated => None,
      Footer::Free(size) => Some(BlockRef(self.0 - OVERHEAD - size)),
    }
  }
}
