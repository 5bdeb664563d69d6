/*! Destinations for decoded output.

The decoder only knows how to hand bytes to an `OutputSink`. `VecSink` just
collects them; `ProfilingSink` records where every byte came from and what it
cost, and produces a `ProfileModel` at the end. */

use crate::config::{ProfilerConfig, MIN_WINDOW_CAPACITY};
use crate::deflate::decoder::MAX_OUTPUT_BYTES;
use crate::deflate::BlockType;
use crate::profile::{BlockStat, ByteStat, ProfileModel};

pub trait OutputSink {
  /// Number of bytes written so far.
  fn position(&self) -> usize;

  /// Write a literal byte that cost `bit_size` bits.
  fn append(&mut self, value: u8, bit_size: u32);

  /// Write one byte of a back-reference: the byte `distance` positions behind
  /// the current one. Called once per byte of the run.
  fn copy(&mut self, distance: usize, run_serial: u32, bit_size: u32);

  fn open_block(&mut self, _block_type: BlockType, _is_final: bool) {}

  fn close_block(&mut self, _bit_size: u32) {}
}

/// Plain decompression into a vector.
#[derive(Debug, Default, Clone)]
pub struct VecSink {
  buf: Vec<u8>,
}

impl VecSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn into_inner(self) -> Vec<u8> {
    self.buf
  }
}

impl OutputSink for VecSink {
  fn position(&self) -> usize {
    self.buf.len()
  }

  fn append(&mut self, value: u8, _bit_size: u32) {
    self.buf.push(value);
  }

  fn copy(&mut self, distance: usize, _run_serial: u32, _bit_size: u32) {
    let value = self.buf[self.buf.len() - distance];
    self.buf.push(value);
  }
}

/// Output history for resolving back-references. The capacity is a power of
/// two so positions map to slots with a mask.
#[derive(Debug, Clone)]
pub struct OutputWindow {
  buf: Vec<u8>,
  mask: usize,
  written: usize,
}

impl OutputWindow {
  pub fn with_capacity(capacity: usize) -> Self {
    let capacity = capacity.max(MIN_WINDOW_CAPACITY).next_power_of_two();
    Self {
      buf: vec![0; capacity],
      mask: capacity - 1,
      written: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.buf.len()
  }

  pub fn push(&mut self, value: u8) {
    if self.written == self.buf.len() {
      self.grow();
    }
    self.buf[self.written & self.mask] = value;
    self.written += 1;
  }

  /// The byte written at output position `pos`.
  pub fn get(&self, pos: usize) -> u8 {
    debug_assert!(pos < self.written, "Read of unwritten position {}", pos);
    self.buf[pos & self.mask]
  }

  // Doubling keeps every slot at its masked position: nothing has wrapped yet.
  fn grow(&mut self) {
    let capacity = self.buf.len() * 2;
    self.buf.resize(capacity, 0);
    self.mask = capacity - 1;
  }
}

/// Records a `ByteStat` for every output byte and a `BlockStat` for every block.
/// Positions are stored as `u32`; the inflater never writes past
/// `MAX_OUTPUT_BYTES`, so they always fit.
#[derive(Debug)]
pub struct ProfilingSink {
  window: OutputWindow,
  byte_stats: Vec<ByteStat>,
  block_stats: Vec<BlockStat>,
  open_block: Option<(BlockType, bool)>,
  literal_count: u32,
}

fn stat_position(pos: usize) -> u32 {
  debug_assert!(pos < MAX_OUTPUT_BYTES);
  u32::try_from(pos).unwrap_or(u32::MAX)
}

impl ProfilingSink {
  pub fn new(config: &ProfilerConfig) -> Self {
    Self {
      window: OutputWindow::with_capacity(config.window_capacity),
      byte_stats: Vec::with_capacity(config.stat_capacity),
      block_stats: Vec::new(),
      open_block: None,
      literal_count: 0,
    }
  }

  /// Finish profiling a stream that was `deflated_size` bytes long.
  pub fn flush(self, deflated_size: u32) -> ProfileModel {
    ProfileModel::new(
      deflated_size,
      self.literal_count,
      self.byte_stats,
      self.block_stats,
    )
  }
}

impl OutputSink for ProfilingSink {
  fn position(&self) -> usize {
    self.byte_stats.len()
  }

  fn append(&mut self, value: u8, bit_size: u32) {
    let pos = self.byte_stats.len();
    self.byte_stats.push(ByteStat {
      source: stat_position(pos),
      copy_id: 0,
      bit_size,
      value,
    });
    self.window.push(value);
    self.literal_count += 1;
  }

  fn copy(&mut self, distance: usize, run_serial: u32, bit_size: u32) {
    let pos = self.byte_stats.len();
    debug_assert!(distance > 0 && distance <= pos);
    let source = pos - distance;
    let value = self.window.get(source);
    self.byte_stats.push(ByteStat {
      source: stat_position(source),
      copy_id: run_serial + 1,
      bit_size,
      value,
    });
    self.window.push(value);
  }

  fn open_block(&mut self, block_type: BlockType, is_final: bool) {
    self.open_block = Some((block_type, is_final));
  }

  fn close_block(&mut self, bit_size: u32) {
    if let Some((block_type, is_final)) = self.open_block.take() {
      self.block_stats.push(BlockStat {
        block_type,
        is_final,
        bit_size,
      });
    }
  }
}
