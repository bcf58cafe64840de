//! # segalloc - A Segregated Free List Allocator
//!
//! This crate provides a `malloc`/`free`/`realloc` allocator over a
//! simulated heap that only grows and shrinks at its end, the way a
//! program break moved by `sbrk` does.
//!
//! ## Overview
//!
//! Free blocks are kept in ten doubly linked lists bucketed by size.
//! Every block carries a size header and a free mark after its payload,
//! so a freed block can find and merge with free neighbours without
//! walking any list:
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         SIMULATED HEAP                               │
//!   │                                                                      │
//!   │   ┌────┬──────────┬──────────┬──────────┬──────────┬ ─ ─ ─ ─ ─ ┐     │
//!   │   │ P  │  used    │   free   │  used    │  used    │  heap_rem       │
//!   │   └────┴──────────┴────┬─────┴──────────┴──────────┴ ─ ─ ─ ─ ─ ┘     │
//!   │                        │                       ▲             ▲       │
//!   │                        ▼                       │             │       │
//!   │                  free list for            real_heap_hi   watermark   │
//!   │                  its size class                                      │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   P is a prologue word marked as allocated.
//! ```
//!
//! Each block looks like this:
//!
//! ```text
//!   Single Block:
//!   ┌──────────────┬────────────────────────────────┬──────────────┐
//!   │ Size Header  │           Payload              │  Free Mark   │
//!   │   8 bytes    │  allocated: client data        │   8 bytes    │
//!   │              │  free: next | prev | list      │  size or 0   │
//!   └──────────────┴────────────────────────────────┴──────────────┘
//!                  ▲
//!                  └── Payload returned to the client
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Alignment macro (align!) and checked rounding
//!   ├── block      - Header, payload and free mark encoding
//!   ├── free_list  - Size classes and the segregated lists
//!   ├── coalesce   - Boundary-tag merging of free neighbours
//!   ├── tail       - real_heap_hi / heap_rem bookkeeping
//!   ├── allocator  - SegregatedAllocator: malloc, free, realloc
//!   ├── check      - validate_heap diagnostic walk
//!   ├── memlib     - HeapGrowth trait and the mmap-backed MemLib
//!   ├── config     - Config and HeapConfig
//!   └── error      - Error types
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::{Config, HeapConfig, MemLib, SegregatedAllocator};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let heap = MemLib::new(&HeapConfig::default())?;
//! let mut allocator = SegregatedAllocator::new(heap, Config::default())?;
//!
//! let p = allocator.malloc(100)?;
//! allocator.payload_mut(p)[..5].copy_from_slice(b"hello");
//!
//! let p = allocator.realloc(Some(p), 400)?;
//! assert_eq!(&allocator.payload(p)[..5], b"hello");
//!
//! allocator.free(p);
//! allocator.validate_heap()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## How It Works
//!
//! - **malloc** rounds the request up to 8 bytes and to the smallest
//!   size class, takes the head of the first non-empty list whose floor
//!   covers the request, falls back to a first-fit scan of the request's
//!   own list and the overflow list, and only then grows the heap. Large
//!   leftovers are split off as a new free block.
//! - **free** of the topmost block moves `real_heap_hi` down, swallowing
//!   any free blocks that become topmost, and trims the heap. Any other
//!   block goes into its list and is coalesced with its neighbours.
//! - **realloc** of the topmost block grows or shrinks it in place;
//!   other blocks are moved.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: wrap the allocator in a mutex to share it
//! - **Unchecked frees**: double frees and foreign payloads corrupt the
//!   heap; `validate_heap` can detect the damage afterwards
//! - **First-fit overflow list**: requests above the largest class scan
//!   a list of unbounded length
//! - **Unix-only**: `MemLib` reserves its memory with `mmap`

pub mod align;
mod allocator;
mod block;
mod check;
mod coalesce;
mod config;
mod error;
mod free_list;
mod memlib;
mod tail;

pub use allocator::SegregatedAllocator;
pub use block::Payload;
pub use check::HeapStats;
pub use config::{Config, DEFAULT_MAX_HEAP, DEFAULT_SIZE_CLASSES, HeapConfig};
pub use error::{AllocError, ConfigError, GrowthError, InvariantViolation};
pub use free_list::NUM_LISTS;
pub use memlib::{HeapGrowth, MemLib};
