//! Bookkeeping for how many bits each piece of output cost to decode.

use crate::bitreader::BitSource;

/// A two-level bit counter. Bits are charged to the operation currently being
/// decoded (a literal, a back-reference, a table header) and rolled up into
/// the enclosing block when that operation is closed.
#[derive(Debug, Default, Clone)]
pub struct BitAccount {
  current: u32,
  block: u32,
}

impl BitAccount {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn inc(&mut self, delta: u32) {
    self.current += delta;
  }

  /// Bits charged to the open operation so far.
  pub fn pending(&self) -> u32 {
    self.current
  }

  /// Close the current operation, returning its cost.
  pub fn close(&mut self) -> u32 {
    let result = self.current;
    self.block += result;
    self.current = 0;
    result
  }

  /// Close the block, returning the total cost of everything in it. Every
  /// operation in the block must already have been closed.
  pub fn close_block(&mut self) -> u32 {
    debug_assert_eq!(
      self.current, 0,
      "Block closed with {} unaccounted bits",
      self.current
    );
    let result = self.block;
    self.block = 0;
    result
  }
}

/// Wraps a bit source, charging every bit read to an account.
#[derive(Debug)]
pub struct InputTracker<S> {
  src: S,
  account: BitAccount,
}

impl<S: BitSource> InputTracker<S> {
  pub fn new(src: S) -> Self {
    Self {
      src,
      account: BitAccount::new(),
    }
  }

  pub fn account(&mut self) -> &mut BitAccount {
    &mut self.account
  }

  pub fn into_inner(self) -> S {
    self.src
  }
}

impl<S: BitSource> BitSource for InputTracker<S> {
  fn next_bit(&mut self) -> u32 {
    self.account.inc(1);
    self.src.next_bit()
  }

  fn next_word(&mut self, width: u32) -> u32 {
    self.account.inc(width);
    self.src.next_word(width)
  }

  fn next_byte(&mut self) -> u8 {
    self.account.inc(8);
    self.src.next_byte()
  }

  fn next_short(&mut self) -> u16 {
    self.account.inc(16);
    self.src.next_short()
  }

  fn bit_cursor(&self) -> u8 {
    self.src.bit_cursor()
  }

  fn ensure_aligned(&mut self) -> u8 {
    let skipped = self.src.ensure_aligned();
    self.account.inc(u32::from(skipped));
    skipped
  }

  fn overrun_bits(&self) -> u64 {
    self.src.overrun_bits()
  }
}

#[cfg(test)]
mod tests {
  use super::{BitAccount, InputTracker};
  use crate::bitreader::{BitSource, SliceBitReader};

  #[test]
  fn operations_roll_up_into_block() {
    let mut account = BitAccount::new();
    account.inc(3);
    assert_eq!(account.close(), 3);
    account.inc(7);
    account.inc(5);
    assert_eq!(account.pending(), 12);
    assert_eq!(account.close(), 12);
    assert_eq!(account.close(), 0);
    assert_eq!(account.close_block(), 15);
    assert_eq!(account.close_block(), 0);
  }

  #[test]
  #[cfg(debug_assertions)]
  #[should_panic(expected = "unaccounted bits")]
  fn undrained_block_panics_in_debug() {
    let mut account = BitAccount::new();
    account.inc(1);
    account.close_block();
  }

  #[test]
  fn tracker_charges_every_read() {
    let data = [0xffu8, 0x01, 0x02, 0x03, 0x04];
    let mut input = InputTracker::new(SliceBitReader::new(&data));
    input.next_bit();
    input.next_word(2);
    assert_eq!(input.account().close(), 3);
    assert_eq!(input.ensure_aligned(), 5);
    input.next_short();
    input.next_byte();
    assert_eq!(input.account().close(), 29);
    assert_eq!(input.account().close_block(), 32);
    assert_eq!(input.into_inner().bits_consumed(), 32);
  }
}
