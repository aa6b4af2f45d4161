/// Size unit every block capacity is rounded to.
pub const ALIGNMENT: usize = 4;

/// Rounds a size up to the next multiple of [`ALIGNMENT`].
///
/// Meant for constant expressions; overflows for values close to `usize::MAX`.
/// Request sizes go through [`align_size`] instead.
///
/// # Examples
///
/// ```rust
/// use firstfit::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(12), 12);
/// assert_eq!(align!(1), 4);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::ALIGNMENT - 1) & !($crate::align::ALIGNMENT - 1)
  };
}

/// Normalizes a requested byte count into a block capacity.
///
/// Zero maps to one alignment unit so an empty request still gets a real block.
/// Returns `None` when rounding up would overflow.
pub fn align_size(size: usize) -> Option<usize> {
  if size == 0 {
    return Some(ALIGNMENT);
  }

  size
    .checked_add(ALIGNMENT - 1)
    .map(|rounded| rounded & !(ALIGNMENT - 1))
}
