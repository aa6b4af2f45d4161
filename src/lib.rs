//! # firstfit - A First-Fit Heap Allocator
//!
//! This crate manages one contiguous, growable region the way `malloc` manages the process
//! heap: variable-sized blocks handed out first-fit, split when oversized, coalesced when
//! released, and the region shrunk again whenever its tail becomes free.
//!
//! ## Overview
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌────────┬──────────┬────────┬──────────┬────────┬──────────────┐
//!   │ header │ payload  │ header │ payload  │ header │   payload    │
//!   │ in use │          │  free  │          │ in use │              │
//!   └────────┴──────────┴────────┴──────────┴────────┴──────────────┘
//!   ▲                                                               ▲
//!   │                                                               │
//!   Start of region                                        Top (program break)
//!
//!   Every block is linked to its neighbours in address order:
//!
//!   first ──► [A] ◄──► [B] ◄──► [C] ◄── last visited / created
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   firstfit
//!   ├── align      - ALIGNMENT, align! and request size normalization
//!   ├── block      - Block record and HEADER_SIZE
//!   ├── directory  - Address-ordered block chain (internal)
//!   ├── heap       - HeapSource, ProgramBreak (sbrk) and FixedRegion
//!   ├── first_fit  - FirstFitAllocator
//!   └── error      - AllocError, HeapError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use firstfit::{FirstFitAllocator, FixedRegion};
//!
//! let mut allocator = FirstFitAllocator::with_heap(FixedRegion::with_capacity(4096));
//!
//! let ptr = allocator.allocate(8).unwrap().cast::<u64>();
//! unsafe { ptr.write(42) };
//!
//! let ptr = allocator.resize(ptr.as_ptr().cast(), 64).unwrap().cast::<u64>();
//! assert_eq!(unsafe { ptr.read() }, 42);
//!
//! allocator.release(ptr.as_ptr().cast());
//! assert!(allocator.is_empty());
//! ```
//!
//! ## How It Works
//!
//! - **Allocation**: the request is rounded up to a multiple of [`ALIGNMENT`]. The chain is
//!   scanned from the first block for a free one that is large enough; if none is, the
//!   region grows by one block. An oversized block is split when the rest can hold a
//!   header plus one alignment unit.
//! - **Release**: the block is marked free and merged with free neighbours. A free block at
//!   the end of the region is given back to the [`HeapSource`].
//! - **Resize**: shrinks in place, grows into a free successor, or moves and copies.
//!
//! Headers live in the allocator's own arena rather than in the managed memory, so an
//! address that was never handed out, or was already released, is recognized and ignored
//! instead of being read as a header. Each block still reserves [`HEADER_SIZE`] bytes in
//! front of its payload.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives
//! - **One region**: no arenas or size classes
//! - **Word alignment**: payloads are aligned to [`ALIGNMENT`] relative to the region start
//!
//! ## Safety
//!
//! The allocator API is safe: every address passed in is looked up before use. Reading and
//! writing through the returned pointers is up to the caller.

pub mod align;
mod block;
mod directory;
mod error;
mod first_fit;
mod heap;

pub use align::{ALIGNMENT, align_size};
pub use block::{Block, HEADER_SIZE};
pub use directory::HeapStats;
pub use error::{AllocError, HeapError};
pub use first_fit::FirstFitAllocator;
pub use heap::{FixedRegion, HeapSource, ProgramBreak};
