//! Trace replay checker.
//!
//! Drives an allocator through a list of operations and checks that every
//! payload is aligned, inside the heap, disjoint from every other live
//! payload, and that `realloc` carries the old bytes over.

#![allow(dead_code)]

use segalloc::{Config, MemLib, Payload, SegregatedAllocator};

const MAX_NUM_ENTRY: usize = 100;
const SMALL_PRIME: u8 = 137;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
  Alloc { index: usize, size: usize },
  Realloc { index: usize, size: usize },
  Free { index: usize },
}

#[derive(Debug, Clone, Copy)]
struct Range {
  lo: usize,
  hi: usize,
}

pub fn allocator(max_heap: usize) -> SegregatedAllocator<MemLib> {
  allocator_with(max_heap, Config::default())
}

pub fn allocator_with(
  max_heap: usize,
  config: Config,
) -> SegregatedAllocator<MemLib> {
  let heap = MemLib::with_capacity(max_heap).unwrap();
  SegregatedAllocator::new(heap, config).unwrap()
}

/// Small deterministic generator for payload contents.
pub struct Lcg(u64);

impl Lcg {
  pub fn new(seed: u64) -> Self {
    Self(seed)
  }

  pub fn next(&mut self) -> u64 {
    self.0 = self
      .0
      .wrapping_mul(6364136223846793005)
      .wrapping_add(1442695040888963407);
    self.0 >> 33
  }
}

/// Indices of the first and last `MAX_NUM_ENTRY` bytes of a payload.
fn sampled(size: usize) -> impl Iterator<Item = usize> {
  let left = MAX_NUM_ENTRY.min(size);
  let right = left.max(size.saturating_sub(MAX_NUM_ENTRY));
  (0..left).chain(right..size)
}

fn fill_random(
  bytes: &mut [u8],
  rng: &mut Lcg,
) {
  for j in sampled(bytes.len()) {
    bytes[j] = rng.next() as u8;
  }
}

fn checksum(bytes: &[u8]) -> u8 {
  sampled(bytes.len()).fold(0u8, |sum, j| sum.wrapping_mul(SMALL_PRIME).wrapping_add(bytes[j]))
}

pub struct Checker {
  pub allocator: SegregatedAllocator<MemLib>,
  blocks: Vec<Option<(Payload, usize)>>,
  ranges: Vec<(Payload, Range)>,
  rng: Lcg,
  /// Run `validate_heap` after every operation.
  pub strict: bool,
}

impl Checker {
  pub fn new(allocator: SegregatedAllocator<MemLib>) -> Self {
    Self {
      allocator,
      blocks: Vec::new(),
      ranges: Vec::new(),
      rng: Lcg::new(0x6172),
      strict: true,
    }
  }

  pub fn live(&self) -> usize {
    self.ranges.len()
  }

  fn add_range(
    &mut self,
    payload: Payload,
    size: usize,
    op: usize,
  ) -> Result<(), String> {
    let lo = self.allocator.address(payload);
    let hi = lo + size.max(1) - 1;

    if lo % 8 != 0 {
      return Err(format!("op {op}: payload {lo:#x} is not 8-byte aligned"));
    }
    if lo < self.allocator.heap_lo() || hi > self.allocator.heap_hi() {
      return Err(format!("op {op}: payload {lo:#x}..={hi:#x} lies outside the heap"));
    }
    if let Some((_, other)) = self
      .ranges
      .iter()
      .find(|(_, other)| !(other.hi < lo || hi < other.lo))
    {
      return Err(format!(
        "op {op}: payload {lo:#x}..={hi:#x} overlaps {:#x}..={:#x}",
        other.lo, other.hi
      ));
    }

    self.ranges.push((payload, Range { lo, hi }));
    Ok(())
  }

  fn remove_range(
    &mut self,
    payload: Payload,
  ) {
    self.ranges.retain(|(live, _)| *live != payload);
  }

  fn slot(
    &mut self,
    index: usize,
  ) -> &mut Option<(Payload, usize)> {
    if index >= self.blocks.len() {
      self.blocks.resize(index + 1, None);
    }
    &mut self.blocks[index]
  }

  pub fn apply(
    &mut self,
    op_number: usize,
    op: Op,
  ) -> Result<(), String> {
    match op {
      Op::Alloc { index, size } => {
        let payload = self
          .allocator
          .malloc(size)
          .map_err(|err| format!("op {op_number}: malloc({size}) failed: {err}"))?;
        self.add_range(payload, size, op_number)?;
        fill_random(&mut self.allocator.payload_mut(payload)[..size], &mut self.rng);
        *self.slot(index) = Some((payload, size));
      }
      Op::Realloc { index, size } => {
        let Some((old, old_size)) = *self.slot(index) else {
          return Err(format!("op {op_number}: realloc of empty slot {index}"));
        };
        let kept = old_size.min(size);
        let before = checksum(&self.allocator.payload(old)[..kept]);

        let payload = self
          .allocator
          .realloc(Some(old), size)
          .map_err(|err| format!("op {op_number}: realloc({size}) failed: {err}"))?;
        self.remove_range(old);
        self.add_range(payload, size, op_number)?;

        if checksum(&self.allocator.payload(payload)[..kept]) != before {
          return Err(format!("op {op_number}: realloc lost the old contents"));
        }
        fill_random(&mut self.allocator.payload_mut(payload)[..size], &mut self.rng);
        *self.slot(index) = Some((payload, size));
      }
      Op::Free { index } => {
        if let Some((payload, _)) = self.slot(index).take() {
          self.remove_range(payload);
          self.allocator.free(payload);
        }
      }
    }

    if self.strict {
      self
        .allocator
        .validate_heap()
        .map_err(|violation| format!("op {op_number}: {violation}"))?;
    }
    Ok(())
  }

  pub fn run(
    &mut self,
    trace: &[Op],
  ) -> Result<(), String> {
    trace
      .iter()
      .enumerate()
      .try_for_each(|(op_number, &op)| self.apply(op_number, op))
  }
}
