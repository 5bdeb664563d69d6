/*! A straight implementation of the DEFLATE decompressor as specified in RFC
1951 (https://tools.ietf.org/html/rfc1951), instrumented so that every bit
read from the stream is charged to the output it produced. */

pub mod account;
pub mod decoder;

mod codepoints;
mod deflate_header;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

/// The BTYPE field of a block header. The fourth value, 0b11, is reserved.
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone, Serialize)]
#[repr(u8)]
pub enum BlockType {
  Raw = 0b00,
  Fixed = 0b01,
  Dynamic = 0b10,
}

#[cfg(test)]
mod tests {
  use super::BlockType;
  use std::convert::TryFrom;

  #[test]
  fn block_type_from_bits() {
    assert_eq!(BlockType::try_from(0u8).unwrap(), BlockType::Raw);
    assert_eq!(BlockType::try_from(1u8).unwrap(), BlockType::Fixed);
    assert_eq!(BlockType::try_from(2u8).unwrap(), BlockType::Dynamic);
    assert!(BlockType::try_from(3u8).is_err());
    assert_eq!(u8::from(BlockType::Dynamic), 2);
  }
}
