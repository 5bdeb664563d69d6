/*! Decode DEFLATE streams while recording, for every output byte, where it
came from and how many compressed bits were spent on it.

```no_run
let data = std::fs::read("lipsum.txt.z").unwrap();
let model = deflate_profiler::decode_zlib(&data).unwrap();
println!("{} literals in {} bytes", model.literal_count(), model.inflated_size());
```
*/

pub mod archive;
pub mod bitreader;
pub mod config;
pub mod deflate;
pub mod huff_tree;
pub mod profile;
pub mod sink;
pub mod zlib;

pub use archive::{Archive, ArchiveError};
pub use config::ProfilerConfig;
pub use deflate::decoder::{DecodeError, Inflater};
pub use deflate::BlockType;
pub use profile::{BlockStat, ByteStat, ProfileModel, ProfileSummary};
pub use zlib::HeaderError;

use bitreader::SliceBitReader;
use log::info;
use sink::{ProfilingSink, VecSink};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
  #[error("Invalid zlib header: {0}")]
  Header(#[from] HeaderError),
  #[error("Invalid DEFLATE stream: {0}")]
  Decode(#[from] DecodeError),
}

/// Runs profiling decodes with a fixed configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Profiler {
  config: ProfilerConfig,
}

impl Profiler {
  pub fn new(config: ProfilerConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &ProfilerConfig {
    &self.config
  }

  /// Profile a raw DEFLATE stream.
  pub fn decode_deflate(&self, data: &[u8]) -> Result<ProfileModel, DecodeError> {
    self.profile_stream(data, data.len())
  }

  /// Profile a zlib stream. The deflated size reported is that of the whole
  /// zlib buffer.
  pub fn decode_zlib(&self, data: &[u8]) -> Result<ProfileModel, ProfileError> {
    let deflate_data = zlib::strip_header(data)?;
    Ok(self.profile_stream(deflate_data, data.len())?)
  }

  fn profile_stream(&self, data: &[u8], deflated_size: usize) -> Result<ProfileModel, DecodeError> {
    let deflated_size =
      u32::try_from(deflated_size).map_err(|_| DecodeError::InputTooLarge(deflated_size))?;
    let sink = ProfilingSink::new(&self.config);
    let inflater = Inflater::new(SliceBitReader::new(data), sink)
      .with_padding_allowance(self.config.padding_allowance_bits);
    let model = inflater.inflate()?.flush(deflated_size);
    info!(
      "Profiled {} -> {} bytes: {} literals, {} blocks",
      deflated_size,
      model.inflated_size(),
      model.literal_count(),
      model.block_count()
    );
    Ok(model)
  }
}

/// Profile a raw DEFLATE stream with the default configuration.
pub fn decode_deflate(data: &[u8]) -> Result<ProfileModel, DecodeError> {
  Profiler::default().decode_deflate(data)
}

/// Profile a zlib stream with the default configuration.
pub fn decode_zlib(data: &[u8]) -> Result<ProfileModel, ProfileError> {
  Profiler::default().decode_zlib(data)
}

/// Decompress a raw DEFLATE stream without profiling it.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
  let inflater = Inflater::new(SliceBitReader::new(data), VecSink::new());
  Ok(inflater.inflate()?.into_inner())
}

/// Decompress a zlib stream without profiling it.
pub fn inflate_zlib(data: &[u8]) -> Result<Vec<u8>, ProfileError> {
  Ok(inflate(zlib::strip_header(data)?)?)
}

#[cfg(test)]
mod tests {
  use super::*;

  const FOOBARBAZ_STORED: [u8; 21] = [
    0x78, 0x01, 0x01, 0x0a, 0x00, 0xf5, 0xff, 0x46, 0x6f, 0x6f, 0x42, 0x61, 0x72, 0x42, 0x61,
    0x7a, 0x00, 0x13, 0x92, 0x03, 0x57,
  ];

  #[test]
  fn stored_foobarbaz() {
    let model = decode_zlib(&FOOBARBAZ_STORED).unwrap();
    assert_eq!(model.literal_count(), 10);
    assert_eq!(model.inflated_size(), 10);
    assert_eq!(model.block_count(), 1);
    assert_eq!(model.deflated_size(), 21);
    assert_eq!(model.contents(), b"FooBarBaz\0");
    assert_eq!(model.block_stats()[0].block_type, BlockType::Raw);
    assert!(model.byte_stats().iter().all(|s| s.bit_size == 8));
    assert_eq!(inflate_zlib(&FOOBARBAZ_STORED).unwrap(), b"FooBarBaz\0");
  }

  #[test]
  fn header_errors_come_first() {
    let mut data = FOOBARBAZ_STORED;
    data[1] = 0x02;
    assert!(matches!(
      decode_zlib(&data),
      Err(ProfileError::Header(HeaderError::ChecksumFailed(0x78, 0x02)))
    ));
  }

  #[test]
  fn reserved_block_type_is_a_decode_error() {
    assert!(matches!(
      decode_zlib(&[0x78, 0x9c, 0x07, 0x00]),
      Err(ProfileError::Decode(DecodeError::ReservedBlockType))
    ));
    assert!(matches!(
      decode_deflate(&[0x06]),
      Err(DecodeError::ReservedBlockType)
    ));
  }

  #[test]
  fn configured_profiler() {
    let config = ProfilerConfig::new()
      .with_window_capacity(1 << 16)
      .with_stat_capacity(16);
    let profiler = Profiler::new(config);
    assert_eq!(profiler.config().window_capacity, 1 << 16);
    let model = profiler
      .decode_deflate(&[0xf3, 0x48, 0xcd, 0xc9, 0xc9, 0xe7, 0x2, 0x0])
      .unwrap();
    assert_eq!(model.contents(), b"Hello\n");
    assert_eq!(model.deflated_size(), 8);
    assert_eq!(model.literal_count(), 6);
  }

  #[test]
  fn truncated_stored_stream_fails() {
    // Cut off inside the stored block's payload.
    let data = &FOOBARBAZ_STORED[..10];
    assert!(matches!(
      decode_zlib(data),
      Err(ProfileError::Decode(DecodeError::UnexpectedEndOfData(56)))
    ));
    assert!(inflate_zlib(data).is_err());
  }

  #[test]
  fn truncated_fixed_stream_fails() {
    // "Hello\n" without its end-of-block code.
    assert!(matches!(
      decode_deflate(&[0xf3, 0x48, 0xcd, 0xc9, 0xc9, 0xe7]),
      Err(DecodeError::UnexpectedEndOfData(_))
    ));
  }

  #[test]
  fn tight_padding_allowance_rejects_truncation() {
    // "Hello\n" cut off after its third byte.
    let profiler = Profiler::new(ProfilerConfig::new().with_padding_allowance(0));
    assert!(matches!(
      profiler.decode_deflate(&[0xf3, 0x48, 0xcd]),
      Err(DecodeError::UnexpectedEndOfData(_))
    ));
  }
}
