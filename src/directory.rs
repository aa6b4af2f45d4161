//! Address-ordered chain of every block on the heap.
//!
//! Blocks live in an arena and link to each other by `BlockId`, so a stale or foreign
//! address can be rejected by a lookup instead of being reinterpreted as a header.

use std::{
  collections::BTreeMap,
  ops::{Index, IndexMut},
};

use crate::block::{Block, BlockId, HEADER_SIZE};

/// Totals over the blocks currently on the heap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
  pub blocks: usize,
  pub free_blocks: usize,
  pub used_bytes: usize,
  pub free_bytes: usize,
  /// Headers included.
  pub heap_bytes: usize,
}

#[derive(Debug, Default)]
pub(crate) struct BlockDirectory {
  slots: Vec<Option<Block>>,
  vacant: Vec<BlockId>,
  by_address: BTreeMap<usize, BlockId>,
  first: Option<BlockId>,
  last: Option<BlockId>,
}

impl BlockDirectory {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.first.is_none()
  }

  pub fn first(&self) -> Option<BlockId> {
    self.first
  }

  /// Most recently visited or created block, the anchor for heap growth.
  pub fn last(&self) -> Option<BlockId> {
    self.last
  }

  pub fn set_last(
    &mut self,
    id: BlockId,
  ) {
    self.last = Some(id);
  }

  /// Block with the highest address.
  pub fn tail(&self) -> Option<BlockId> {
    self.by_address.last_key_value().map(|(_, id)| *id)
  }

  /// Resolves a payload address handed out earlier to its block.
  pub fn block_from_payload(
    &self,
    payload: *const u8,
  ) -> Option<BlockId> {
    let header = (payload as usize).checked_sub(HEADER_SIZE)?;
    self.by_address.get(&header).copied()
  }

  /// Links `block` after `anchor`, or makes it the first block when `anchor` is `None`.
  ///
  /// The anchor must be the tail; growth checks this before calling.
  pub fn append(
    &mut self,
    anchor: Option<BlockId>,
    mut block: Block,
  ) -> BlockId {
    block.prev = anchor;
    block.next = None;
    let id = self.insert(block);

    match anchor {
      Some(anchor) => self[anchor].next = Some(id),
      None => self.first = Some(id),
    }
    self.last = Some(id);

    id
  }

  /// Links `block` between `anchor` and its current successor.
  pub fn insert_after(
    &mut self,
    anchor: BlockId,
    mut block: Block,
  ) -> BlockId {
    let next = self[anchor].next;
    block.prev = Some(anchor);
    block.next = next;
    let id = self.insert(block);

    self[anchor].next = Some(id);
    if let Some(next) = next {
      self[next].prev = Some(id);
    }

    id
  }

  /// Takes a block out of the chain, joining its neighbours.
  pub fn unlink(
    &mut self,
    id: BlockId,
  ) -> Block {
    let block = self[id];

    match block.prev {
      Some(prev) => self[prev].next = block.next,
      None => self.first = block.next,
    }
    if let Some(next) = block.next {
      self[next].prev = block.prev;
    }
    if self.last == Some(id) {
      self.last = block.prev.or(block.next);
    }

    self.by_address.remove(&(block.header.as_ptr() as usize));
    self.slots[id.0] = None;
    self.vacant.push(id);

    block
  }

  pub fn iter(&self) -> impl Iterator<Item = (BlockId, &Block)> + '_ {
    let mut current = self.first;
    std::iter::from_fn(move || {
      let id = current?;
      let block = &self[id];
      current = block.next;
      Some((id, block))
    })
  }

  /// Walks from the tail back to the first block through `prev`.
  pub fn iter_rev(&self) -> impl Iterator<Item = (BlockId, &Block)> + '_ {
    let mut current = self.tail();
    std::iter::from_fn(move || {
      let id = current?;
      let block = &self[id];
      current = block.prev;
      Some((id, block))
    })
  }

  pub fn stats(&self) -> HeapStats {
    self
      .iter()
      .fold(HeapStats::default(), |mut stats, (_, block)| {
        stats.blocks += 1;
        stats.heap_bytes += block.extent();
        if block.is_free {
          stats.free_blocks += 1;
          stats.free_bytes += block.size;
        } else {
          stats.used_bytes += block.size;
        }
        stats
      })
  }

  fn insert(
    &mut self,
    block: Block,
  ) -> BlockId {
    let address = block.header.as_ptr() as usize;
    let id = match self.vacant.pop() {
      Some(id) => {
        self.slots[id.0] = Some(block);
        id
      }
      None => {
        self.slots.push(Some(block));
        BlockId(self.slots.len() - 1)
      }
    };
    self.by_address.insert(address, id);
    id
  }
}

impl Index<BlockId> for BlockDirectory {
  type Output = Block;

  fn index(
    &self,
    id: BlockId,
  ) -> &Block {
    match self.slots.get(id.0) {
      Some(Some(block)) => block,
      _ => panic!("stale block handle {id}"),
    }
  }
}

impl IndexMut<BlockId> for BlockDirectory {
  fn index_mut(
    &mut self,
    id: BlockId,
  ) -> &mut Block {
    match self.slots.get_mut(id.0) {
      Some(Some(block)) => block,
      _ => panic!("stale block handle {id}"),
    }
  }
}
