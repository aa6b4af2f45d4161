use std::{fmt, mem, ptr::NonNull};

use crate::align;

/// Bytes every block reserves in front of its payload.
pub const HEADER_SIZE: usize = align!(4 * mem::size_of::<usize>());

/// Stable handle of a block record inside the directory arena.
///
/// Never leaves the crate:
///
/// ```compile_fail
/// use firstfit::BlockId;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BlockId(pub(crate) usize);

impl fmt::Display for BlockId {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// A header plus its payload, as tracked by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  pub(crate) header: NonNull<u8>,
  pub(crate) size: usize,
  pub(crate) is_free: bool,
  pub(crate) prev: Option<BlockId>,
  pub(crate) next: Option<BlockId>,
}

impl Block {
  pub(crate) fn new(
    header: NonNull<u8>,
    size: usize,
    is_free: bool,
  ) -> Self {
    Self {
      header,
      size,
      is_free,
      prev: None,
      next: None,
    }
  }

  /// Address of the header, i.e. where the block starts on the heap.
  pub fn address(&self) -> NonNull<u8> {
    self.header
  }

  /// Address handed out to callers.
  ///
  /// Pure address arithmetic, so a copy that outlived its region is still fine to ask.
  pub fn payload(&self) -> NonNull<u8> {
    self.header.map_addr(|addr| addr.saturating_add(HEADER_SIZE))
  }

  /// Usable capacity in bytes, header excluded.
  pub fn size(&self) -> usize {
    self.size
  }

  pub fn is_free(&self) -> bool {
    self.is_free
  }

  /// Bytes the block occupies on the heap.
  pub fn extent(&self) -> usize {
    HEADER_SIZE + self.size
  }

  /// One past the last byte of the payload.
  pub fn end(&self) -> usize {
    self.header.as_ptr() as usize + self.extent()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align::ALIGNMENT;

  #[test]
  fn header_keeps_payloads_aligned() {
    assert_eq!(HEADER_SIZE % ALIGNMENT, 0);
    assert!(HEADER_SIZE >= 4 * mem::size_of::<usize>());
  }

  #[test]
  fn payload_follows_header() {
    let mut memory = [0u64; 16];
    let header = NonNull::new(memory.as_mut_ptr().cast::<u8>()).unwrap();

    let block = Block::new(header, 24, true);

    let base = header.as_ptr() as usize;
    assert_eq!(block.payload().as_ptr() as usize, base + HEADER_SIZE);
    assert_eq!(block.end(), base + HEADER_SIZE + 24);
    assert_eq!(block.extent(), HEADER_SIZE + 24);
  }

  #[test]
  fn payload_of_a_block_outliving_its_memory() {
    let block = {
      let mut memory = vec![0u64; 16];
      let header = NonNull::new(memory.as_mut_ptr().cast::<u8>()).unwrap();
      Block::new(header, 8, false)
    };

    let header = block.address().as_ptr() as usize;
    assert_eq!(block.payload().as_ptr() as usize, header + HEADER_SIZE);
  }
}
