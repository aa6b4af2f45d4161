use snafu::Snafu;

/// Failures reported by a [`HeapSource`](crate::HeapSource).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HeapError {
  #[snafu(display("heap source refused to move the top by {delta} bytes"))]
  Refused { delta: isize },

  #[snafu(display("program break moved from {expected:#x} to {actual:#x} outside the allocator"))]
  Discontiguous { expected: usize, actual: usize },

  #[snafu(display("cannot shrink by {delta} bytes below the start of the region"))]
  BelowBase { delta: isize },
}

/// Failures reported by [`FirstFitAllocator`](crate::FirstFitAllocator).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AllocError {
  #[snafu(display("out of memory growing the heap for a {size} byte block"))]
  Exhausted { size: usize, source: HeapError },

  #[snafu(display("a request of {size} bytes does not fit in the address space"))]
  TooLarge { size: usize },

  #[snafu(display("growth anchor at {address:#x} is not the tail block"))]
  AnchorNotTail { address: usize },

  #[snafu(display("heap growth on a non-empty directory without an anchor"))]
  MissingAnchor,

  #[snafu(display("{address:#x} is not a live allocation"))]
  UnknownPayload { address: usize },
}

impl AllocError {
  /// Whether the error breaks an internal invariant rather than reporting a refusal.
  pub fn is_contract_violation(&self) -> bool {
    matches!(self, Self::AnchorNotTail { .. } | Self::MissingAnchor)
  }
}
