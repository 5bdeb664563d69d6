/* Structure from RFC 1950

      0   1
    +---+---+
    |CMF|FLG|   (more-->)
    +---+---+

  (if FLG.FDICT set)

      0   1   2   3
    +---+---+---+---+
    |     DICTID    |   (more-->)
    +---+---+---+---+

    +=====================+---+---+---+---+
    |...compressed data...|    ADLER32    |
    +=====================+---+---+---+---+

  CMF: bits 0-3 CM (8 = deflate), bits 4-7 CINFO (log2 of window size - 8).
  FLG: bits 0-4 FCHECK, bit 5 FDICT, bits 6-7 FLEVEL. CMF * 256 + FLG must be
  a multiple of 31.
*/

use bitflags::bitflags;
use log::debug;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::convert::TryFrom;
use thiserror::Error;

pub const ZLIB_HEADER_LEN: usize = 2;
pub const CM_DEFLATE: u8 = 8;
const MAX_CINFO: u8 = 7;

#[derive(Error, Debug)]
pub enum HeaderError {
  #[error("zlib stream too short for a header: {0} bytes")]
  TooShort(usize),
  #[error("zlib compression method invalid. Expected 8, got {0}")]
  InvalidMethod(u8),
  #[error("zlib window size invalid: CINFO = {0}")]
  InvalidWindowSize(u8),
  #[error("zlib header check failed: CMF = {:02x}, FLG = {:02x}", .0, .1)]
  ChecksumFailed(u8, u8),
  #[error("zlib streams with a preset dictionary are not supported")]
  PresetDictionary,
}

bitflags! {
    /** The bitfields corresponding to FLG in RFC 1950 */
    #[derive(Default)]
    pub struct ZlibFlags: u8 {
        const FCHECK = 0b11111;
        const FDICT  = 0b1 << 5;
        const FLEVEL = 0b11 << 6;
    }
}

/// The compressor's hint about how hard it tried. Only logged.
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone)]
#[repr(u8)]
pub enum CompressionLevel {
  Fastest = 0,
  Fast = 1,
  Default = 2,
  Maximum = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZlibHeader {
  pub window_size: u32,
  pub level: CompressionLevel,
}

impl ZlibHeader {
  /// Validate the two header bytes at the front of `data`.
  pub fn parse(data: &[u8]) -> Result<Self, HeaderError> {
    if data.len() < ZLIB_HEADER_LEN {
      return Err(HeaderError::TooShort(data.len()));
    }
    let cmf = data[0];
    let flg = data[1];

    if (u16::from(cmf) * 256 + u16::from(flg)) % 31 != 0 {
      return Err(HeaderError::ChecksumFailed(cmf, flg));
    }
    let cm = cmf & 0x0f;
    if cm != CM_DEFLATE {
      return Err(HeaderError::InvalidMethod(cm));
    }
    let cinfo = cmf >> 4;
    if cinfo > MAX_CINFO {
      return Err(HeaderError::InvalidWindowSize(cinfo));
    }
    let flags = ZlibFlags::from_bits_truncate(flg);
    if flags.contains(ZlibFlags::FDICT) {
      return Err(HeaderError::PresetDictionary);
    }
    let level = CompressionLevel::try_from((flags & ZlibFlags::FLEVEL).bits() >> 6)
      .unwrap_or(CompressionLevel::Default);

    Ok(Self {
      window_size: 1 << (cinfo + 8),
      level,
    })
  }
}

/// Validate the header of a zlib stream and return the DEFLATE data after it.
/// The Adler-32 trailer is left in place; the decoder stops before it.
pub fn strip_header(data: &[u8]) -> Result<&[u8], HeaderError> {
  let header = ZlibHeader::parse(data)?;
  debug!(
    "zlib stream: {:?} compression, {} byte window",
    header.level, header.window_size
  );
  Ok(&data[ZLIB_HEADER_LEN..])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_common_headers() {
    let header = ZlibHeader::parse(&[0x78, 0x9c]).unwrap();
    assert_eq!(header.window_size, 32768);
    assert_eq!(header.level, CompressionLevel::Default);
    let header = ZlibHeader::parse(&[0x78, 0xda]).unwrap();
    assert_eq!(header.level, CompressionLevel::Maximum);
    let header = ZlibHeader::parse(&[0x78, 0x01]).unwrap();
    assert_eq!(header.level, CompressionLevel::Fastest);
  }

  #[test]
  fn strips_two_bytes() {
    let data = [0x78, 0x9c, 0xf3, 0x48];
    assert_eq!(strip_header(&data).unwrap(), &[0xf3, 0x48]);
  }

  #[test]
  fn rejects_bad_headers() {
    assert!(matches!(ZlibHeader::parse(&[0x78]), Err(HeaderError::TooShort(1))));
    assert!(matches!(
      ZlibHeader::parse(&[0x78, 0x9d]),
      Err(HeaderError::ChecksumFailed(0x78, 0x9d))
    ));
    // CM = 7, FCHECK fixed up so only the method is wrong
    assert!(matches!(
      ZlibHeader::parse(&[0x77, 0x09]),
      Err(HeaderError::InvalidMethod(7))
    ));
    // CINFO = 8
    assert!(matches!(
      ZlibHeader::parse(&[0x88, 0x1c]),
      Err(HeaderError::InvalidWindowSize(8))
    ));
    // FDICT set
    assert!(matches!(
      ZlibHeader::parse(&[0x78, 0xbb]),
      Err(HeaderError::PresetDictionary)
    ));
  }
}
