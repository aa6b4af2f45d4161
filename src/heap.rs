use std::{
  fmt,
  marker::PhantomData,
  ptr::NonNull,
  sync::{Mutex, PoisonError},
};

use libc::{c_void, intptr_t, sbrk};
use snafu::{OptionExt as _, ensure};

use crate::error::{BelowBaseSnafu, DiscontiguousSnafu, HeapError, RefusedSnafu};

/// The primitive that grows and shrinks the contiguous region the allocator manages.
///
/// # Safety
///
/// On success with a positive `delta`, the returned pointer must be the previous top of the
/// region and the `delta` bytes following it must be valid for reads and writes until they
/// are given back with a negative `delta`. Consecutive growths must be contiguous.
pub unsafe trait HeapSource {
  /// Moves the top of the region by `delta` bytes and returns the previous top.
  fn grow_or_shrink(
    &mut self,
    delta: isize,
  ) -> Result<NonNull<u8>, HeapError>;
}

/// Serializes every `ProgramBreak` between checking the break and moving it.
static BREAK_LOCK: Mutex<()> = Mutex::new(());

/// The process data segment, moved with `sbrk(2)`.
///
/// Refuses to move the break while it holds memory and somebody else has moved it since,
/// so the managed region stays contiguous and a shrink never gives back foreign bytes.
/// The check and the move happen under one process-wide lock, and a source stays on the
/// thread that created it:
///
/// ```compile_fail
/// fn on_another_thread<T: Send>(_: T) {}
/// on_another_thread(firstfit::ProgramBreak::new());
/// ```
#[derive(Debug, Default)]
pub struct ProgramBreak {
  held: usize,
  top: usize,
  _not_send: PhantomData<*mut ()>,
}

impl ProgramBreak {
  pub fn new() -> Self {
    Self::default()
  }

  /// Current program break.
  pub fn current(&self) -> *mut c_void {
    unsafe { sbrk(0) }
  }

  /// Bytes of the data segment currently owned by this source.
  pub fn held(&self) -> usize {
    self.held
  }
}

unsafe impl HeapSource for ProgramBreak {
  fn grow_or_shrink(
    &mut self,
    delta: isize,
  ) -> Result<NonNull<u8>, HeapError> {
    let _guard = BREAK_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    if self.held > 0 {
      let actual = self.current() as usize;
      ensure!(
        actual == self.top,
        DiscontiguousSnafu {
          expected: self.top,
          actual,
        }
      );
    }
    if delta < 0 {
      ensure!(delta.unsigned_abs() <= self.held, BelowBaseSnafu { delta });
    }

    let previous = unsafe { sbrk(delta as intptr_t) };

    if previous == usize::MAX as *mut c_void {
      return RefusedSnafu { delta }.fail();
    }

    let previous = NonNull::new(previous.cast::<u8>()).context(RefusedSnafu { delta })?;
    self.top = (previous.as_ptr() as usize).wrapping_add_signed(delta);
    self.held = self.held.wrapping_add_signed(delta);

    Ok(previous)
  }
}

/// A fixed-capacity buffer handed out front to back.
///
/// Gives deterministic addresses, which is what the tests build on, and lets the allocator
/// run over memory the caller sets aside.
pub struct FixedRegion {
  memory: Box<[u64]>,
  base: NonNull<u8>,
  top: usize,
}

impl FixedRegion {
  pub fn with_capacity(bytes: usize) -> Self {
    let mut memory = vec![0u64; bytes.div_ceil(8)].into_boxed_slice();
    let base = NonNull::from(&mut *memory).cast::<u8>();

    Self {
      memory,
      base,
      top: 0,
    }
  }

  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  pub fn capacity(&self) -> usize {
    self.memory.len() * 8
  }

  /// Bytes currently handed out.
  pub fn used(&self) -> usize {
    self.top
  }
}

impl fmt::Debug for FixedRegion {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("FixedRegion")
      .field("base", &self.base)
      .field("top", &self.top)
      .field("capacity", &self.capacity())
      .finish()
  }
}

unsafe impl HeapSource for FixedRegion {
  fn grow_or_shrink(
    &mut self,
    delta: isize,
  ) -> Result<NonNull<u8>, HeapError> {
    let top = if delta >= 0 {
      self
        .top
        .checked_add(delta.unsigned_abs())
        .filter(|top| *top <= self.capacity())
        .context(RefusedSnafu { delta })?
    } else {
      self
        .top
        .checked_sub(delta.unsigned_abs())
        .context(BelowBaseSnafu { delta })?
    };

    // SAFETY: `self.top` never exceeds the capacity of `memory`.
    let previous = unsafe { self.base.add(self.top) };
    self.top = top;

    Ok(previous)
  }
}

/// Keeps tests that move the real program break from running at the same time.
#[cfg(test)]
pub(crate) fn program_break_test_guard() -> std::sync::MutexGuard<'static, ()> {
  static PROGRAM_BREAK_TESTS: Mutex<()> = Mutex::new(());
  PROGRAM_BREAK_TESTS
    .lock()
    .unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
  use std::thread;

  use super::*;

  #[test]
  fn fixed_region_hands_out_bytes_in_order() {
    let mut region = FixedRegion::with_capacity(64);
    let base = region.base();

    assert_eq!(region.grow_or_shrink(16).unwrap(), base);
    assert_eq!(region.grow_or_shrink(8).unwrap(), unsafe { base.add(16) });
    assert_eq!(region.used(), 24);

    assert_eq!(region.grow_or_shrink(-8).unwrap(), unsafe { base.add(24) });
    assert_eq!(region.used(), 16);
  }

  #[test]
  fn fixed_region_refuses_past_capacity() {
    let mut region = FixedRegion::with_capacity(32);
    region.grow_or_shrink(24).unwrap();

    let err = region.grow_or_shrink(16).unwrap_err();

    assert!(matches!(err, HeapError::Refused { delta: 16 }));
    assert_eq!(region.used(), 24);
  }

  #[test]
  fn fixed_region_refuses_shrink_below_base() {
    let mut region = FixedRegion::with_capacity(32);
    region.grow_or_shrink(8).unwrap();

    let err = region.grow_or_shrink(-16).unwrap_err();

    assert!(matches!(err, HeapError::BelowBase { delta: -16 }));
    assert_eq!(region.used(), 8);
  }

  #[test]
  fn fixed_region_debug_skips_the_buffer() {
    let mut region = FixedRegion::with_capacity(4096);
    region.grow_or_shrink(40).unwrap();

    let printed = format!("{region:?}");

    assert!(printed.starts_with("FixedRegion { base: "));
    assert!(printed.ends_with("top: 40, capacity: 4096 }"));
  }

  #[test]
  fn capacity_rounds_to_words() {
    assert_eq!(FixedRegion::with_capacity(10).capacity(), 16);
  }

  #[test]
  fn program_break_grows_and_shrinks() {
    let _serial = program_break_test_guard();
    let mut program_break = ProgramBreak::new();

    let previous = program_break.grow_or_shrink(64).unwrap();

    unsafe {
      previous.as_ptr().write_bytes(0xAB, 64);
      assert_eq!(*previous.as_ptr().add(63), 0xAB);
    }
    assert_eq!(program_break.held(), 64);

    // The process allocator may have moved the break in between.
    match program_break.grow_or_shrink(-64) {
      Ok(_) => assert_eq!(program_break.held(), 0),
      Err(err) => assert!(matches!(err, HeapError::Discontiguous { .. })),
    }
  }

  #[test]
  fn program_break_never_shrinks_what_it_does_not_hold() {
    let mut program_break = ProgramBreak::new();

    let err = program_break.grow_or_shrink(-8).unwrap_err();

    assert!(matches!(err, HeapError::BelowBase { delta: -8 }));
  }

  #[test]
  fn program_breaks_on_two_threads_never_release_each_others_bytes() {
    let _serial = program_break_test_guard();

    let workers: Vec<_> = (0..2u8)
      .map(|worker| {
        thread::spawn(move || {
          let mut program_break = ProgramBreak::new();
          let mut rounds = 0;

          for _ in 0..200 {
            let Ok(bytes) = program_break.grow_or_shrink(8192) else {
              break;
            };
            unsafe {
              bytes.as_ptr().write_bytes(worker, 8192);
              assert_eq!(*bytes.as_ptr().add(8191), worker);
            }
            rounds += 1;

            if let Err(err) = program_break.grow_or_shrink(-8192) {
              // The other thread grew past us; our bytes stay ours.
              assert!(matches!(err, HeapError::Discontiguous { .. }));
              break;
            }
          }

          rounds
        })
      })
      .collect();

    for worker in workers {
      assert!(worker.join().unwrap() > 0);
    }
  }
}
