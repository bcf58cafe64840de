//! Segregated free lists.
//!
//! ```text
//!   heads[0]  [24, 56)      ──▶ B ⇄ B ⇄ B
//!   heads[1]  [56, 88)      ──▶ B
//!   ...
//!   heads[8]  [1752, 2840)  ──▶ ∅
//!   heads[9]  [2840, ∞)     ──▶ B ⇄ B          (first-fit scan)
//! ```
//!
//! Links live in the payload of each free block:
//! `[next][prev][list index]`, one word each.

use std::iter;

use crate::block::{BlockRef, Footer, WORD, payload_of, read_word, write_word};

/// Number of free lists, the last one being the overflow list.
pub const NUM_LISTS: usize = 10;

pub const OVERFLOW: usize = NUM_LISTS - 1;

const NIL: u64 = u64::MAX;

const NEXT: usize = 0;
const PREV: usize = WORD;
const LIST: usize = 2 * WORD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Links {
  next: Option<BlockRef>,
  prev: Option<BlockRef>,
  list: usize,
}

fn encode(block: Option<BlockRef>) -> u64 {
  block.map_or(NIL, |block| block.offset() as u64)
}

fn decode(word: u64) -> Option<BlockRef> {
  (word != NIL).then(|| BlockRef::at(word as usize))
}

impl Links {
  fn read(
    mem: &[u8],
    block: BlockRef,
  ) -> Self {
    let at = payload_of(block).offset();
    Self {
      next: decode(read_word(mem, at + NEXT)),
      prev: decode(read_word(mem, at + PREV)),
      list: read_word(mem, at + LIST) as usize,
    }
  }

  fn write(
    self,
    mem: &mut [u8],
    block: BlockRef,
  ) {
    let at = payload_of(block).offset();
    write_word(mem, at + NEXT, encode(self.next));
    write_word(mem, at + PREV, encode(self.prev));
    write_word(mem, at + LIST, self.list as u64);
  }
}

fn set_next(
  mem: &mut [u8],
  block: BlockRef,
  next: Option<BlockRef>,
) {
  write_word(mem, payload_of(block).offset() + NEXT, encode(next));
}

fn set_prev(
  mem: &mut [u8],
  block: BlockRef,
  prev: Option<BlockRef>,
) {
  write_word(mem, payload_of(block).offset() + PREV, encode(prev));
}

#[derive(Debug, Clone)]
pub struct FreeLists {
  floors: [usize; NUM_LISTS],
  heads: [Option<BlockRef>; NUM_LISTS],
}

impl FreeLists {
  pub fn new(floors: [usize; NUM_LISTS]) -> Self {
    Self {
      floors,
      heads: [None; NUM_LISTS],
    }
  }

  pub fn clear(&mut self) {
    self.heads = [None; NUM_LISTS];
  }

  /// List index for a free block of `size` bytes.
  pub fn classify(
    &self,
    size: usize,
  ) -> usize {
    self.floors[1..]
      .iter()
      .position(|&floor| size < floor)
      .unwrap_or(OVERFLOW)
  }

  pub fn head(
    &self,
    list: usize,
  ) -> Option<BlockRef> {
    self.heads[list]
  }

  /// Decoded `next` link of a free block. The result is not checked.
  pub fn next_of(
    mem: &[u8],
    block: BlockRef,
  ) -> Option<BlockRef> {
    decode(read_word(mem, payload_of(block).offset() + NEXT))
  }

  /// List index recorded in a free block.
  pub fn list_of(
    mem: &[u8],
    block: BlockRef,
  ) -> usize {
    Links::read(mem, block).list
  }

  pub fn iter<'a>(
    &self,
    mem: &'a [u8],
    list: usize,
  ) -> impl Iterator<Item = BlockRef> + 'a {
    iter::successors(self.heads[list], move |&block| Links::read(mem, block).next)
  }

  /// Pushes a free block to the front of its list and sets its free mark.
  pub fn insert(
    &mut self,
    mem: &mut [u8],
    block: BlockRef,
  ) {
    let size = block.size(mem);
    let list = self.classify(size);
    let next = self.heads[list];

    Links {
      next,
      prev: None,
      list,
    }
    .write(mem, block);

    if let Some(next) = next {
      set_prev(mem, next, Some(block));
    }
    self.heads[list] = Some(block);

    block.set_footer(mem, Footer::Free(size));
  }

  /// Unlinks a free block and marks it allocated.
  pub fn remove(
    &mut self,
    mem: &mut [u8],
    block: BlockRef,
  ) {
    let links = Links::read(mem, block);

    if self.heads[links.list] == Some(block) {
      self.heads[links.list] = links.next;
    }
    if let Some(next) = links.next {
      set_prev(mem, next, links.prev);
    }
    if let Some(prev) = links.prev {
      set_next(mem, prev, links.next);
    }

    block.set_footer(mem, Footer::Allocated);
  }

  /// Finds a free block of at least `size` bytes without unlinking it.
  ///
  /// Lists whose floor is at least `size` only hold blocks that fit, so
  /// their head is taken directly. Failing that, the list `size` itself
  /// falls into and then the overflow list are scanned first-fit.
  pub fn find_fit(
    &self,
    mem: &[u8],
    size: usize,
  ) -> Option<BlockRef> {
    let exact = (0..OVERFLOW)
      .filter(|&list| size <= self.floors[list])
      .find_map(|list| self.heads[list]);
    if exact.is_some() {
      return exact;
    }

    let own = self.classify(size);
    if own != OVERFLOW && self.floors[own] < size {
      if let Some(block) = self.first_fit(mem, own, size) {
        return Some(block);
      }
    }

    self.first_fit(mem, OVERFLOW, size)
  }

  fn first_fit(
    &self,
    mem: &[u8],
    list: usize,
    size: usize,
  ) -> Option<BlockRef> {
    self.iter(mem, list).find(|block| block.size(mem) >= size)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    block::{OVERHEAD, write_mark},
    config::DEFAULT_SIZE_CLASSES,
  };

  /// Lays out allocated blocks of the given sizes after a prologue word.
  fn heap_with(sizes: &[usize]) -> (Vec<u8>, Vec<BlockRef>) {
    let total = WORD + sizes.iter().map(|size| size + OVERHEAD).sum::<usize>();
    let mut mem = vec![0u8; total];
    write_mark(&mut mem, 0, Footer::Allocated);

    let mut blocks = Vec::new();
    let mut at = WORD;
    for &size in sizes {
      let block = BlockRef::at(at);
      block.set_size(&mut mem, size);
      block.set_footer(&mut mem, Footer::Allocated);
      blocks.push(block);
      at = block.end(&mem);
    }
    (mem, blocks)
  }

  #[test]
  fn test_classify() {
    let lists = FreeLists::new(DEFAULT_SIZE_CLASSES);

    assert_eq!(lists.classify(24), 0);
    assert_eq!(lists.classify(48), 0);
    assert_eq!(lists.classify(56), 1);
    assert_eq!(lists.classify(151), 2);
    assert_eq!(lists.classify(152), 3);
    assert_eq!(lists.classify(2832), 8);
    assert_eq!(lists.classify(2840), OVERFLOW);
    assert_eq!(lists.classify(1 << 20), OVERFLOW);
  }

  #[test]
  fn test_insert_prepends_and_marks() {
    let (mut mem, blocks) = heap_with(&[24, 32, 40]);
    let mut lists = FreeLists::new(DEFAULT_SIZE_CLASSES);

    for &block in &blocks {
      lists.insert(&mut mem, block);
    }

    let order: Vec<_> = lists.iter(&mem, 0).collect();
    assert_eq!(order, vec![blocks[2], blocks[1], blocks[0]]);
    assert_eq!(blocks[1].footer(&mem), Footer::Free(32));
    assert_eq!(FreeLists::list_of(&mem, blocks[1]), 0);
  }

  #[test]
  fn test_remove_head_middle_and_tail() {
    let (mut mem, blocks) = heap_with(&[24, 24, 24, 24]);
    let mut lists = FreeLists::new(DEFAULT_SIZE_CLASSES);
    for &block in &blocks {
      lists.insert(&mut mem, block);
    }

    lists.remove(&mut mem, blocks[3]);
    assert_eq!(lists.head(0), Some(blocks[2]));
    assert_eq!(blocks[3].footer(&mem), Footer::Allocated);

    lists.remove(&mut mem, blocks[1]);
    let order: Vec<_> = lists.iter(&mem, 0).collect();
    assert_eq!(order, vec![blocks[2], blocks[0]]);

    lists.remove(&mut mem, blocks[0]);
    lists.remove(&mut mem, blocks[2]);
    assert_eq!(lists.head(0), None);
  }

  #[test]
  fn test_find_fit_takes_larger_class_head() {
    let (mut mem, blocks) = heap_with(&[24, 408]);
    let mut lists = FreeLists::new(DEFAULT_SIZE_CLASSES);
    lists.insert(&mut mem, blocks[0]);
    lists.insert(&mut mem, blocks[1]);

    assert_eq!(lists.find_fit(&mem, 24), Some(blocks[0]));
    assert_eq!(lists.find_fit(&mem, 32), Some(blocks[1]));
    assert_eq!(lists.find_fit(&mem, 408), Some(blocks[1]));
    assert_eq!(lists.find_fit(&mem, 416), None);
  }

  #[test]
  fn test_find_fit_scans_own_class() {
    let (mut mem, blocks) = heap_with(&[152, 224]);
    let mut lists = FreeLists::new(DEFAULT_SIZE_CLASSES);
    lists.insert(&mut mem, blocks[0]);
    lists.insert(&mut mem, blocks[1]);

    assert_eq!(lists.find_fit(&mem, 200), Some(blocks[1]));
    assert_eq!(lists.find_fit(&mem, 232), None);
  }

  #[test]
  fn test_find_fit_overflow_is_first_fit() {
    let (mut mem, blocks) = heap_with(&[3000, 5000, 4000]);
    let mut lists = FreeLists::new(DEFAULT_SIZE_CLASSES);
    for &block in &blocks {
      lists.insert(&mut mem, block);
    }

    // list order is 4000, 5000, 3000
    assert_eq!(lists.find_fit(&mem, 3000), Some(blocks[2]));
    assert_eq!(lists.find_fit(&mem, 4500), Some(blocks[1]));
    assert_eq!(lists.find_fit(&mem, 2000), Some(blocks[2]));
    assert_eq!(lists.find_fit(&mem, 6000), None);
  }
}
