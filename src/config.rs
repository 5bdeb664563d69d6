use crate::deflate::decoder::DEFAULT_PADDING_ALLOWANCE_BITS;

/// DEFLATE's largest back-reference distance. The output history is never
/// smaller than this.
pub const MIN_WINDOW_CAPACITY: usize = 1 << 15;

const DEFAULT_STAT_CAPACITY: usize = 1 << 16;

/// Tunables for a profiling decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilerConfig {
  /// Initial size of the output history. Always a power of two, and at least
  /// `MIN_WINDOW_CAPACITY`; grows as the output does.
  pub window_capacity: usize,
  /// Number of byte records to reserve up front.
  pub stat_capacity: usize,
  /// How many bits the decoder may read past the end of its input.
  pub padding_allowance_bits: u64,
}

impl Default for ProfilerConfig {
  fn default() -> Self {
    Self {
      window_capacity: MIN_WINDOW_CAPACITY,
      stat_capacity: DEFAULT_STAT_CAPACITY,
      padding_allowance_bits: DEFAULT_PADDING_ALLOWANCE_BITS,
    }
  }
}

impl ProfilerConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_window_capacity(mut self, capacity: usize) -> Self {
    self.window_capacity = capacity.max(MIN_WINDOW_CAPACITY).next_power_of_two();
    self
  }

  pub fn with_stat_capacity(mut self, capacity: usize) -> Self {
    self.stat_capacity = capacity;
    self
  }

  pub fn with_padding_allowance(mut self, bits: u64) -> Self {
    self.padding_allowance_bits = bits;
    self
  }
}
