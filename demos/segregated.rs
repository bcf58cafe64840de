use std::io::Read;

use segalloc::{Config, HeapConfig, MemLib, Payload, SegregatedAllocator};

/// Waits until the user presses ENTER.
/// Useful when you want to follow how each step moves the heap watermark.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_heap(
  allocator: &SegregatedAllocator<MemLib>,
  label: &str,
) {
  let stats = allocator.validate_heap().expect("heap is consistent");
  println!(
    "[{}] heap_lo = {:#x}, heap_hi = {:#x}, blocks = {} ({} free, {} bytes free)",
    label,
    allocator.heap_lo(),
    allocator.heap_hi(),
    stats.blocks,
    stats.free_blocks,
    stats.free_bytes,
  );
}

fn print_alloc(
  allocator: &SegregatedAllocator<MemLib>,
  requested: usize,
  payload: Payload,
) {
  println!(
    "Allocated {} bytes ({} usable), address = {:#x}",
    requested,
    allocator.usable_size(payload),
    allocator.address(payload),
  );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  let heap = MemLib::new(&HeapConfig::default())?;
  let mut allocator = SegregatedAllocator::new(heap, Config::default())?;

  print_heap(&allocator, "start");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Three blocks in a row. Each one extends the heap.
  // --------------------------------------------------------------------
  let a = allocator.malloc(100)?;
  let b = allocator.malloc(100)?;
  let c = allocator.malloc(40)?;
  println!("\n[1] Allocate 100, 100 and 40 bytes");
  for (size, payload) in [(100, a), (100, b), (40, c)] {
    print_alloc(&allocator, size, payload);
  }
  allocator.payload_mut(a)[..4].copy_from_slice(b"abcd");
  print_heap(&allocator, "1");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Free the two neighbours. They merge into one free block.
  // --------------------------------------------------------------------
  allocator.free(a);
  allocator.free(b);
  println!("\n[2] Free the two 100 byte blocks");
  print_heap(&allocator, "2");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) A request of the merged size reuses it without growing the heap.
  // --------------------------------------------------------------------
  let merged = allocator.malloc(224)?;
  println!("\n[3] Allocate 224 bytes");
  print_alloc(&allocator, 224, merged);
  println!(
    "[3] merged == a? {}",
    if merged == a { "Yes, it reused the coalesced block" } else { "No" }
  );
  print_heap(&allocator, "3");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) The topmost block grows in place.
  // --------------------------------------------------------------------
  let grown = allocator.realloc(Some(c), 4000)?;
  println!("\n[4] Realloc the topmost block to 4000 bytes");
  println!("[4] same address? {}", grown == c);
  print_heap(&allocator, "4");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Freeing everything gives the heap back down to the prologue.
  // --------------------------------------------------------------------
  allocator.free(merged);
  allocator.free(grown);
  println!("\n[5] Free everything");
  print_heap(&allocator, "5");

  println!("\n[6] End of example.");
  Ok(())
}
