//! Simulated heap that the allocator grows through an `sbrk`-like API.

use std::{io, ptr::NonNull, slice};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_NORESERVE, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void};
use log::{debug, warn};

use crate::{config::HeapConfig, error::GrowthError};

/// Source of heap memory for the allocator.
///
/// Offsets are relative to [`heap_lo`](HeapGrowth::heap_lo). The heap
/// only ever grows or shrinks at its end.
pub trait HeapGrowth {
  /// Extends the heap by `increment` bytes and returns the offset of the
  /// first new byte.
  fn sbrk(
    &mut self,
    increment: usize,
  ) -> Result<usize, GrowthError>;

  /// Gives `decrement` bytes at the end of the heap back.
  fn trim(
    &mut self,
    decrement: usize,
  ) -> Result<(), GrowthError>;

  /// Current break as an offset: one past the last usable byte.
  fn watermark(&self) -> usize;

  /// Address of the first heap byte.
  fn heap_lo(&self) -> usize;

  /// Address of the last heap byte, `heap_lo() - 1` for an empty heap.
  fn heap_hi(&self) -> usize {
    (self.heap_lo() + self.watermark()).wrapping_sub(1)
  }

  /// Shrinks the heap back to zero bytes.
  fn reset_brk(&mut self);

  /// Bytes `heap_lo..break`.
  fn memory(&self) -> &[u8];

  fn memory_mut(&mut self) -> &mut [u8];
}

/// A fixed reservation of anonymous memory with a movable break.
///
/// The whole `max_heap` region is mapped up front with `MAP_NORESERVE`,
/// so untouched pages cost nothing until the break reaches them.
pub struct MemLib {
  base: NonNull<u8>,
  brk: usize,
  max_heap: usize,
}

impl MemLib {
  pub fn new(config: &HeapConfig) -> Result<Self, GrowthError> {
    config.validate()?;
    Self::with_capacity(config.max_heap)
  }

  pub fn with_capacity(max_heap: usize) -> Result<Self, GrowthError> {
    let address = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        max_heap,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS | MAP_NORESERVE,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      return Err(GrowthError::Reserve {
        bytes: max_heap,
        source: io::Error::last_os_error(),
      });
    }

    let base = NonNull::new(address as *mut u8).ok_or_else(|| GrowthError::Reserve {
      bytes: max_heap,
      source: io::Error::from(io::ErrorKind::AddrNotAvailable),
    })?;

    debug!("[memlib] reserved {} bytes at {:p}", max_heap, base);

    Ok(Self {
      base,
      brk: 0,
      max_heap,
    })
  }

  pub fn max_heap(&self) -> usize {
    self.max_heap
  }
}

impl HeapGrowth for MemLib {
  fn sbrk(
    &mut self,
    increment: usize,
  ) -> Result<usize, GrowthError> {
    let available = self.max_heap - self.brk;
    if increment > available {
      return Err(GrowthError::Exhausted {
        requested: increment,
        available,
      });
    }

    let old = self.brk;
    self.brk += increment;
    Ok(old)
  }

  fn trim(
    &mut self,
    decrement: usize,
  ) -> Result<(), GrowthError> {
    if decrement > self.brk {
      return Err(GrowthError::Underflow {
        requested: decrement,
        brk: self.brk,
      });
    }

    self.brk -= decrement;
    Ok(())
  }

  fn watermark(&self) -> usize {
    self.brk
  }

  fn heap_lo(&self) -> usize {
    self.base.as_ptr() as usize
  }

  fn reset_brk(&mut self) {
    self.brk = 0;
  }

  fn memory(&self) -> &[u8] {
    unsafe { slice::from_raw_parts(self.base.as_ptr(), self.brk) }
  }

  fn memory_mut(&mut self) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.brk) }
  }
}

impl Drop for MemLib {
  fn drop(&mut self) {
    let status = unsafe { libc::munmap(self.base.as_ptr() as *mut c_void, self.max_heap) };
    if status != 0 {
      warn!(
        "[memlib] failed to unmap {} bytes at {:p}: {}",
        self.max_heap,
        self.base,
        io::Error::last_os_error()
      );
    }
  }
}
