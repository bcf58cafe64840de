use std::io;

use thiserror::Error;

/// Failures of the heap growth provider.
#[derive(Debug, Error)]
pub enum GrowthError {
  #[error("heap exhausted: requested {requested} bytes, {available} bytes left")]
  Exhausted { requested: usize, available: usize },

  #[error("cannot trim {requested} bytes from a heap of {brk} bytes")]
  Underflow { requested: usize, brk: usize },

  #[error("failed to reserve {bytes} bytes for the simulated heap")]
  Reserve {
    bytes: usize,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Config(#[from] ConfigError),
}

/// Rejected allocator configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("size class {index} ({size}) is not a multiple of {alignment}")]
  Unaligned {
    index: usize,
    size: usize,
    alignment: usize,
  },

  #[error("size class {index} ({size}) does not exceed the previous class ({previous})")]
  NotIncreasing {
    index: usize,
    size: usize,
    previous: usize,
  },

  #[error("smallest size class ({size}) cannot hold a free-list node of {minimum} bytes")]
  TooSmall { size: usize, minimum: usize },

  #[error("heap limit of {max_heap} bytes is below the {minimum} bytes needed for the prologue")]
  HeapTooSmall { max_heap: usize, minimum: usize },
}

/// Errors returned by the allocator operations.
#[derive(Debug, Error)]
pub enum AllocError {
  #[error("out of memory while requesting {requested} bytes")]
  OutOfMemory {
    requested: usize,
    #[source]
    source: Option<GrowthError>,
  },

  #[error(transparent)]
  Config(#[from] ConfigError),
}

impl AllocError {
  pub(crate) fn out_of_memory(
    requested: usize,
    source: GrowthError,
  ) -> Self {
    AllocError::OutOfMemory {
      requested,
      source: Some(source),
    }
  }

  /// Requests whose padded size does not fit in a `usize`.
  pub(crate) fn too_large(requested: usize) -> Self {
    AllocError::OutOfMemory {
      requested,
      source: None,
    }
  }
}

/// A broken heap invariant found by [`validate_heap`].
///
/// These are caller contract violations (double free, writes past a
/// payload) and are only detected by the diagnostic walk.
///
/// [`validate_heap`]: crate::SegregatedAllocator::validate_heap
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantViolation {
  #[error("prologue word at offset 0 is not marked as allocated")]
  MissingPrologue,

  #[error("block at {block:#x} has an invalid size {size}")]
  BadSize { block: usize, size: usize },

  #[error("header chain left the heap: block at {block:#x} ends at {end:#x}, tail is {tail:#x}")]
  BrokenChain { block: usize, end: usize, tail: usize },

  #[error("free block at {block:#x} has header size {header} but footer {footer}")]
  FooterMismatch {
    block: usize,
    header: usize,
    footer: usize,
  },

  #[error("adjacent free blocks at {left:#x} and {right:#x} were not coalesced")]
  Uncoalesced { left: usize, right: usize },

  #[error("free block at {block:#x} of size {size} is listed in class {found}, expected {expected}")]
  WrongClass {
    block: usize,
    size: usize,
    expected: usize,
    found: usize,
  },

  #[error("free list {list} links to {link:#x}, which is not a free block")]
  BadLink { list: usize, link: usize },

  #[error("free lists hold {listed} blocks but the heap walk found {walked}")]
  ListCountMismatch { listed: usize, walked: usize },

  #[error("topmost block at {block:#x} is free")]
  FreeTail { block: usize },

  #[error("tail state {real_heap_hi:#x} + {heap_rem} does not match watermark {watermark:#x}")]
  TailMismatch {
    real_heap_hi: usize,
    heap_rem: usize,
    watermark: usize,
  },
}
