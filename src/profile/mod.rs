/*! The result of profiling one DEFLATE stream.

Every output byte gets a `ByteStat` saying where it came from and what it cost.
Following the `source` links of copied bytes back to a literal gives each
byte's *origin*; the number of output bytes sharing an origin is that
literal's *weight*. Each byte contributes `1 / weight` of its origin literal,
so the contributions of all bytes sum to the number of literals.
*/

use crate::deflate::BlockType;

use serde::Serialize;
use std::sync::OnceLock;

/// Per-output-byte record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct ByteStat {
  /// Position this byte was copied from, or its own position for a literal.
  pub source: u32,
  /// Serial number of the copy that produced this byte, plus one. 0 for literals.
  pub copy_id: u32,
  pub bit_size: u32,
  pub value: u8,
}

impl ByteStat {
  pub fn is_literal(&self) -> bool {
    self.copy_id == 0
  }
}

/// Per-block record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct BlockStat {
  pub block_type: BlockType,
  pub is_final: bool,
  /// Every bit the block consumed, headers and padding included.
  pub bit_size: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileModel {
  deflated_size: u32,
  literal_count: u32,
  byte_stats: Vec<ByteStat>,
  block_stats: Vec<BlockStat>,
  origins: OnceLock<Vec<u32>>,
  literal_weights: OnceLock<Vec<u32>>,
  contents: OnceLock<Vec<u8>>,
}

impl ProfileModel {
  pub fn new(
    deflated_size: u32,
    literal_count: u32,
    byte_stats: Vec<ByteStat>,
    block_stats: Vec<BlockStat>,
  ) -> Self {
    debug_assert!(byte_stats
      .iter()
      .enumerate()
      .all(|(i, stat)| stat.source as usize <= i));
    Self {
      deflated_size,
      literal_count,
      byte_stats,
      block_stats,
      ..Default::default()
    }
  }

  /// The profile of nothing, returned for archive paths that don't exist.
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn deflated_size(&self) -> u32 {
    self.deflated_size
  }

  pub fn inflated_size(&self) -> u32 {
    self.byte_stats.len() as u32
  }

  pub fn literal_count(&self) -> u32 {
    self.literal_count
  }

  pub fn block_count(&self) -> u32 {
    self.block_stats.len() as u32
  }

  /// Number of back-references in the stream.
  pub fn copy_count(&self) -> u32 {
    self.byte_stats.iter().map(|s| s.copy_id).max().unwrap_or(0)
  }

  /// Total bits consumed by all blocks.
  pub fn compressed_bits(&self) -> u64 {
    self.block_stats.iter().map(|b| u64::from(b.bit_size)).sum()
  }

  pub fn byte_stats(&self) -> &[ByteStat] {
    &self.byte_stats
  }

  pub fn block_stats(&self) -> &[BlockStat] {
    &self.block_stats
  }

  /// For each output position, the literal it ultimately descends from.
  pub fn origins(&self) -> &[u32] {
    self.origins.get_or_init(|| {
      let mut origins = Vec::with_capacity(self.byte_stats.len());
      for (i, stat) in self.byte_stats.iter().enumerate() {
        let source = stat.source as usize;
        let origin = if source == i {
          i as u32
        } else {
          origins[source]
        };
        origins.push(origin);
      }
      origins
    })
  }

  /// Indexed by output position: how many output bytes resolve to the
  /// literal at that position. Zero at positions that aren't origins.
  pub fn literal_weights(&self) -> &[u32] {
    self.literal_weights.get_or_init(|| {
      let mut weights = vec![0u32; self.byte_stats.len()];
      for origin in self.origins() {
        weights[*origin as usize] += 1;
      }
      weights
    })
  }

  /// Weight of the literal that output byte `index` descends from.
  pub fn literal_weight(&self, index: usize) -> u32 {
    self.literal_weights()[self.origins()[index] as usize]
  }

  pub fn literal_contribution(&self, index: usize) -> f64 {
    1.0 / f64::from(self.literal_weight(index))
  }

  /// The decompressed bytes.
  pub fn contents(&self) -> &[u8] {
    self
      .contents
      .get_or_init(|| self.byte_stats.iter().map(|s| s.value).collect())
  }

  /// Sum of literal contributions over `buckets` equal slices of the output.
  pub fn contribution_histogram(&self, buckets: usize) -> Vec<f64> {
    let mut histogram = vec![0.0; buckets];
    let size = self.byte_stats.len();
    if buckets == 0 || size == 0 {
      return histogram;
    }
    for i in 0..size {
      histogram[i * buckets / size] += self.literal_contribution(i);
    }
    histogram
  }

  pub fn summary(&self) -> ProfileSummary {
    let inflated_size = self.inflated_size();
    ProfileSummary {
      deflated_size: self.deflated_size,
      inflated_size,
      literal_count: self.literal_count,
      copy_count: self.copy_count(),
      block_count: self.block_count(),
      compressed_bits: self.compressed_bits(),
      max_literal_weight: self.literal_weights().iter().copied().max().unwrap_or(0),
      compression_ratio: if self.deflated_size == 0 {
        0.0
      } else {
        f64::from(inflated_size) / f64::from(self.deflated_size)
      },
      blocks: self.block_stats.clone(),
    }
  }
}

/// Aggregate numbers of a `ProfileModel`, for printing or serializing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
  pub deflated_size: u32,
  pub inflated_size: u32,
  pub literal_count: u32,
  pub copy_count: u32,
  pub block_count: u32,
  pub compressed_bits: u64,
  pub max_literal_weight: u32,
  pub compression_ratio: f64,
  pub blocks: Vec<BlockStat>,
}
