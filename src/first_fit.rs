use std::ptr::{self, NonNull};

use log::{debug, trace, warn};
use snafu::{OptionExt as _, ResultExt as _, ensure};

use crate::{
  align::{ALIGNMENT, align_size},
  block::{Block, BlockId, HEADER_SIZE},
  directory::{BlockDirectory, HeapStats},
  error::{
    AllocError, AnchorNotTailSnafu, ExhaustedSnafu, MissingAnchorSnafu, TooLargeSnafu,
    UnknownPayloadSnafu,
  },
  heap::{HeapSource, ProgramBreak},
};

/// First-fit allocator over a single growable region.
///
/// Not thread-safe: one owner drives it at a time.
#[derive(Debug)]
pub struct FirstFitAllocator<H: HeapSource = ProgramBreak> {
  heap: H,
  directory: BlockDirectory,
}

impl FirstFitAllocator<ProgramBreak> {
  /// Allocator on the process data segment.
  pub fn new() -> Self {
    Self::with_heap(ProgramBreak::new())
  }
}

impl Default for FirstFitAllocator<ProgramBreak> {
  fn default() -> Self {
    Self::new()
  }
}

impl<H: HeapSource> FirstFitAllocator<H> {
  pub fn with_heap(heap: H) -> Self {
    Self {
      heap,
      directory: BlockDirectory::new(),
    }
  }

  pub fn heap(&self) -> &H {
    &self.heap
  }

  /// Whether the heap holds no blocks at all.
  pub fn is_empty(&self) -> bool {
    self.directory.is_empty()
  }

  /// Blocks in address order.
  pub fn blocks(&self) -> impl Iterator<Item = &Block> + '_ {
    self.directory.iter().map(|(_, block)| block)
  }

  /// Blocks from the highest address down, following `prev` links.
  pub fn blocks_rev(&self) -> impl Iterator<Item = &Block> + '_ {
    self.directory.iter_rev().map(|(_, block)| block)
  }

  pub fn stats(&self) -> HeapStats {
    self.directory.stats()
  }

  /// Capacity of the live allocation at `payload`.
  pub fn usable_size(
    &self,
    payload: *const u8,
  ) -> Option<usize> {
    self
      .live_block(payload)
      .map(|id| self.directory[id].size)
  }

  /// Hands out at least `size` bytes.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let size = align_size(size).context(TooLargeSnafu { size })?;

    let id = if self.directory.is_empty() {
      self.extend_heap(None, size)?
    } else {
      match self.find_free_block(size) {
        Some(id) => {
          self.split_block(id, size);
          id
        }
        None => {
          let anchor = self.directory.last();
          self.extend_heap(anchor, size)?
        }
      }
    };

    let block = &mut self.directory[id];
    block.is_free = false;

    Ok(block.payload())
  }

  /// Hands out `count * size` zeroed bytes.
  pub fn allocate_zeroed(
    &mut self,
    count: usize,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let total = count
      .checked_mul(size)
      .context(TooLargeSnafu { size: usize::MAX })?;
    let payload = self.allocate(total)?;

    // SAFETY: the block behind `payload` holds at least `total` bytes.
    unsafe { payload.as_ptr().write_bytes(0, total) };

    Ok(payload)
  }

  /// Gives an allocation back.
  ///
  /// Null, unknown and already released addresses are ignored.
  pub fn release(
    &mut self,
    payload: *mut u8,
  ) {
    let Some(id) = self.live_block(payload) else {
      trace!("release of {payload:?} ignored, not a live allocation");
      return;
    };

    self.directory[id].is_free = true;

    let mut current = id;
    if let Some(prev) = self.directory[id].prev {
      if self.directory[prev].is_free {
        self.coalesce(prev);
        current = prev;
      }
    }

    self.coalesce(current);
    if self.directory[current].next.is_none() {
      self.release_tail(current);
    }
  }

  /// Resizes the allocation at `payload`, keeping its contents.
  ///
  /// Null behaves like [`allocate`](Self::allocate). On failure the original allocation is
  /// left untouched.
  pub fn resize(
    &mut self,
    payload: *mut u8,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if payload.is_null() {
      return self.allocate(size);
    }

    let id = self.live_block(payload).context(UnknownPayloadSnafu {
      address: payload as usize,
    })?;
    let size = align_size(size).context(TooLargeSnafu { size })?;
    let block = self.directory[id];

    if block.size >= size {
      debug!("resize {payload:?}: shrinking in place {} -> {size}", block.size);
      self.split_block(id, size);
      return Ok(block.payload());
    }

    if let Some(next) = block.next {
      let next = self.directory[next];
      if next.is_free && block.size + HEADER_SIZE + next.size >= size {
        debug!("resize {payload:?}: growing into the next block");
        self.absorb_next(id);
        self.split_block(id, size);
        return Ok(block.payload());
      }
    }

    let moved = self.allocate(size)?;
    debug!("resize {payload:?}: moved to {moved:?}");

    // SAFETY: both blocks are live, distinct and hold at least `block.size.min(size)` bytes.
    unsafe {
      ptr::copy_nonoverlapping(
        block.payload().as_ptr(),
        moved.as_ptr(),
        block.size.min(size),
      );
    }
    self.release(payload);

    Ok(moved)
  }

  fn live_block(
    &self,
    payload: *const u8,
  ) -> Option<BlockId> {
    self
      .directory
      .block_from_payload(payload)
      .filter(|id| !self.directory[*id].is_free)
  }

  /// First free block with room for `size` bytes.
  ///
  /// Leaves `last` on the final block visited so growth has its anchor.
  fn find_free_block(
    &mut self,
    size: usize,
  ) -> Option<BlockId> {
    let mut current = self.directory.first();

    while let Some(id) = current {
      self.directory.set_last(id);

      let block = &self.directory[id];
      if block.is_free && block.size >= size {
        trace!("first fit for {size} bytes: block {id} with {}", block.size);
        return Some(id);
      }
      current = block.next;
    }

    None
  }

  /// Grows the region by one free block of `size` bytes appended after `anchor`.
  fn extend_heap(
    &mut self,
    anchor: Option<BlockId>,
    size: usize,
  ) -> Result<BlockId, AllocError> {
    match anchor {
      Some(anchor) => {
        let block = &self.directory[anchor];
        ensure!(
          block.next.is_none(),
          AnchorNotTailSnafu {
            address: block.header.as_ptr() as usize,
          }
        );
      }
      None => ensure!(self.directory.is_empty(), MissingAnchorSnafu),
    }

    let delta = size
      .checked_add(HEADER_SIZE)
      .and_then(|total| isize::try_from(total).ok())
      .context(TooLargeSnafu { size })?;
    let header = self
      .heap
      .grow_or_shrink(delta)
      .context(ExhaustedSnafu { size })?;

    debug!("heap grown by {delta} bytes at {header:?}");
    debug_assert!(
      anchor.is_none_or(|anchor| self.directory[anchor].end() == header.as_ptr() as usize),
      "heap source broke contiguity"
    );

    Ok(self.directory.append(anchor, Block::new(header, size, true)))
  }

  /// Cuts `id` down to `size` bytes when the rest can hold a block of its own.
  fn split_block(
    &mut self,
    id: BlockId,
    size: usize,
  ) {
    let block = self.directory[id];
    if block.size - size < HEADER_SIZE + ALIGNMENT {
      return;
    }

    // The remainder header lies inside the payload of `block`.
    let header = block.payload().map_addr(|addr| addr.saturating_add(size));
    let remainder = Block::new(header, block.size - size - HEADER_SIZE, true);
    trace!("split block {id}: {} -> {size} + {}", block.size, remainder.size);

    self.directory[id].size = size;
    let remainder = self.directory.insert_after(id, remainder);
    self.coalesce(remainder);
  }

  /// Merges the free block `id` with its successor if that one is free too.
  fn coalesce(
    &mut self,
    id: BlockId,
  ) {
    debug_assert!(self.directory[id].is_free, "coalescing a block in use");

    if let Some(next) = self.directory[id].next {
      if self.directory[next].is_free {
        self.absorb_next(id);
      }
    }
  }

  fn absorb_next(
    &mut self,
    id: BlockId,
  ) {
    let Some(next) = self.directory[id].next else {
      return;
    };

    let absorbed = self.directory.unlink(next);
    trace!("block {id} absorbs {next} ({} bytes)", absorbed.size);
    self.directory[id].size += absorbed.extent();
  }

  /// Gives the free tail block back to the heap source.
  fn release_tail(
    &mut self,
    id: BlockId,
  ) {
    let block = self.directory[id];
    // Extents are bounded by an earlier successful growth.
    let delta = -(block.extent() as isize);

    if let Err(err) = self.heap.grow_or_shrink(delta) {
      warn!("keeping free tail block {id}: {err}");
      return;
    }

    self.directory.unlink(id);
    if self.directory.is_empty() {
      debug!("heap fully released");
    } else {
      debug!("heap shrunk by {} bytes", block.extent());
    }
  }
}
