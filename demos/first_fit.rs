use std::{env, io::Read, ptr::NonNull};

use firstfit::{FirstFitAllocator, ProgramBreak};
use log::info;

/// Waits until the user presses ENTER when run with `--step`.
/// Useful when you want to inspect memory state with tools like `pmap` or `gdb`,
/// or just watch how allocations move the program break.
fn block_until_enter_pressed(step: bool) {
  if !step {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_heap(
  label: &str,
  allocator: &FirstFitAllocator<ProgramBreak>,
) {
  println!(
    "[{}] program break = {:?}, held = {} bytes",
    label,
    allocator.heap().current(),
    allocator.heap().held(),
  );
  for block in allocator.blocks() {
    println!(
      "    {:?}: {:>6} bytes {}",
      block.payload(),
      block.size(),
      if block.is_free() { "free" } else { "in use" },
    );
  }
}

fn main() {
  env_logger::init();
  let step = env::args().any(|arg| arg == "--step");

  let mut allocator = FirstFitAllocator::new();

  print_heap("start", &allocator);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 1) Two small allocations grow the heap one block at a time.
  // --------------------------------------------------------------------
  let first = allocator.allocate(10).expect("allocate 10 bytes");
  let second = allocator.allocate(20).expect("allocate 20 bytes");
  unsafe { first.as_ptr().write_bytes(0xAB, 10) };
  info!("[1] first = {first:?}, second = {second:?}");
  print_heap("1", &allocator);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 2) Releasing the first block and asking for 8 bytes reuses it.
  // --------------------------------------------------------------------
  allocator.release(first.as_ptr());
  let third = allocator.allocate(8).expect("allocate 8 bytes");
  println!(
    "[2] third == first? {}",
    if third == first {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );
  print_heap("2", &allocator);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 3) Growing an allocation whose neighbour is busy moves it.
  // --------------------------------------------------------------------
  let values = allocator
    .allocate_zeroed(16, size_of::<u16>())
    .expect("allocate 16 u16")
    .cast::<u16>();
  for i in 0..16 {
    unsafe { values.add(i).write(i as u16) };
  }
  let moved: NonNull<u16> = allocator
    .resize(values.as_ptr().cast(), 64 * size_of::<u16>())
    .expect("resize to 64 u16")
    .cast();
  println!(
    "[3] moved {:?} -> {:?}, element 15 = {}",
    values,
    moved,
    unsafe { moved.add(15).read() }
  );
  print_heap("3", &allocator);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 4) Releasing everything hands the whole region back.
  // --------------------------------------------------------------------
  allocator.release(moved.as_ptr().cast());
  allocator.release(third.as_ptr());
  allocator.release(second.as_ptr());
  print_heap("4", &allocator);
  println!("\n[4] Heap empty: {}", allocator.is_empty());
}
