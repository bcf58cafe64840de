use crate::{
  align::ALIGNMENT,
  block::{MIN_FREE_PAYLOAD, WORD},
  error::ConfigError,
  free_list::NUM_LISTS,
};

/// Fibonacci-like bucket floors, in payload bytes.
pub const DEFAULT_SIZE_CLASSES: [usize; NUM_LISTS] =
  [24, 56, 88, 152, 248, 408, 664, 1080, 1752, 2840];

/// Default reservation for [`MemLib`](crate::MemLib).
pub const DEFAULT_MAX_HEAP: usize = 20 * (1 << 20);

/// Allocator tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Floor of each free list. List `i` holds free blocks with sizes in
  /// `[size_classes[i], size_classes[i + 1])`; the last list holds
  /// everything at or above the last floor. The first floor is also the
  /// minimum block size.
  pub size_classes: [usize; NUM_LISTS],
  /// Bytes of reclaimed heap-end space kept for the next allocation
  /// instead of being trimmed back to the growth provider.
  pub retain_tail: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      size_classes: DEFAULT_SIZE_CLASSES,
      retain_tail: 0,
    }
  }
}

impl Config {
  pub fn with_size_classes(
    mut self,
    size_classes: [usize; NUM_LISTS],
  ) -> Self {
    self.size_classes = size_classes;
    self
  }

  /// Rounded up to [`ALIGNMENT`] so trims keep the break aligned.
  pub fn with_retain_tail(
    mut self,
    retain_tail: usize,
  ) -> Self {
    self.retain_tail = crate::align!(retain_tail);
    self
  }

  /// Smallest payload handed out by `malloc`.
  pub fn min_block(&self) -> usize {
    self.size_classes[0]
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let first = self.size_classes[0];
    if first < MIN_FREE_PAYLOAD {
      return Err(ConfigError::TooSmall {
        size: first,
        minimum: MIN_FREE_PAYLOAD,
      });
    }

    for (index, &size) in self.size_classes.iter().enumerate() {
      if size % ALIGNMENT != 0 {
        return Err(ConfigError::Unaligned {
          index,
          size,
          alignment: ALIGNMENT,
        });
      }
      if index > 0 && size <= self.size_classes[index - 1] {
        return Err(ConfigError::NotIncreasing {
          index,
          size,
          previous: self.size_classes[index - 1],
        });
      }
    }

    Ok(())
  }
}

/// Settings of the simulated heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
  /// Upper bound on the break; `sbrk` past it fails.
  pub max_heap: usize,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      max_heap: DEFAULT_MAX_HEAP,
    }
  }
}

impl HeapConfig {
  pub fn with_max_heap(
    mut self,
    max_heap: usize,
  ) -> Self {
    self.max_heap = max_heap;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_heap < WORD {
      return Err(ConfigError::HeapTooSmall {
        max_heap: self.max_heap,
        minimum: WORD,
      });
    }
    Ok(())
  }
}
