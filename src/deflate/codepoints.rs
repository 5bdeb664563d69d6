/*! Codepoints are used by RFC 1951 to encode distances and lengths. Each codepoint
consists of a value, decoded using the appropriate Huffman Tree, possibly followed
by a number of literal bits that are used to disambiguate the codepoint. */

/* The code table from RFC 1951 is reproduced below to avoid extra ALT-TABs

             Extra               Extra               Extra
        Code Bits Length(s) Code Bits Lengths   Code Bits Length(s)
        ---- ---- ------     ---- ---- -------   ---- ---- -------
         257   0     3       267   1   15,16     277   4   67-82
         258   0     4       268   1   17,18     278   4   83-98
         259   0     5       269   2   19-22     279   4   99-114
         260   0     6       270   2   23-26     280   4  115-130
         261   0     7       271   2   27-30     281   5  131-162
         262   0     8       272   2   31-34     282   5  163-194
         263   0     9       273   3   35-42     283   5  195-226
         264   0    10       274   3   43-50     284   5  227-257
         265   1  11,12      275   3   51-58     285   0    258
         266   1  13,14      276   3   59-66

              Extra           Extra               Extra
         Code Bits Dist  Code Bits   Dist     Code Bits Distance
         ---- ---- ----  ---- ----  ------    ---- ---- --------
           0   0    1     10   4     33-48    20    9   1025-1536
           1   0    2     11   4     49-64    21    9   1537-2048
           2   0    3     12   5     65-96    22   10   2049-3072
           3   0    4     13   5     97-128   23   10   3073-4096
           4   1   5,6    14   6    129-192   24   11   4097-6144
           5   1   7,8    15   6    193-256   25   11   6145-8192
           6   2   9-12   16   7    257-384   26   12  8193-12288
           7   2  13-16   17   7    385-512   27   12 12289-16384
           8   3  17-24   18   8    513-768   28   13 16385-24576
           9   3  25-32   19   8   769-1024   29   13 24577-32768

    The tables follow a pattern: after the first few codes, every group of
    codes (four for lengths, two for distances) adds one extra bit, and the
    base value doubles with it. The codepoints below are generated from that
    pattern rather than typed in.
*/

use lazy_static::lazy_static;

use crate::bitreader::BitSource;
use crate::deflate::decoder::DecodeError;

pub const MAX_DIST_CODE: u16 = 29;
pub const MIN_LENGTH_CODE: u16 = 257;
pub const MAX_LENGTH_CODE: u16 = 285;
pub const EOB_CODE: u16 = 256;

lazy_static! {
  pub static ref DEFAULT_CODEPOINTS: CodepointTable = CodepointTable::new();
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Codepoint {
  code: u16,
  nbits: u8,
  lo: u16,
}

impl Codepoint {
  pub fn new(code: u16, nbits: u8, lo: u16) -> Self {
    Self { code, nbits, lo }
  }

  fn for_length(code: u16) -> Self {
    match code {
      257..=264 => Self::new(code, 0, code - 254),
      265..=284 => {
        let nbits = (code - 261) >> 2;
        let lo = ((((code - 265) & 0x3) + 4) << nbits) + 3;
        Self::new(code, nbits as u8, lo)
      }
      _ => Self::new(code, 0, 258),
    }
  }

  fn for_distance(code: u16) -> Self {
    if code <= 3 {
      Self::new(code, 0, code + 1)
    } else {
      let nbits = (code >> 1) - 1;
      let lo = (((code & 0x1) + 2) << nbits) + 1;
      Self::new(code, nbits as u8, lo)
    }
  }

  pub fn code(&self) -> u16 {
    self.code
  }

  /// Largest value this codepoint can represent.
  pub fn hi(&self) -> u16 {
    let range = if self.nbits == 0 { 0 } else { (1u16 << self.nbits) - 1 };
    self.lo + range
  }

  /// Read the extra bits for this codepoint and return the value they select.
  pub fn read_value<B: BitSource>(&self, bit_src: &mut B) -> u16 {
    let extra = bit_src.next_word(u32::from(self.nbits)) as u16;
    self.lo + extra
  }
}

pub struct CodepointTable {
  length_codepoints: Vec<Codepoint>,
  dist_codepoints: Vec<Codepoint>,
}

impl CodepointTable {
  pub fn new() -> Self {
    Self {
      length_codepoints: (MIN_LENGTH_CODE..=MAX_LENGTH_CODE)
        .map(Codepoint::for_length)
        .collect(),
      dist_codepoints: (0..=MAX_DIST_CODE).map(Codepoint::for_distance).collect(),
    }
  }

  pub fn length_codepoint(&self, code: u16) -> Option<Codepoint> {
    code
      .checked_sub(MIN_LENGTH_CODE)
      .and_then(|i| self.length_codepoints.get(i as usize))
      .copied()
  }

  pub fn dist_codepoint(&self, code: u16) -> Option<Codepoint> {
    self.dist_codepoints.get(code as usize).copied()
  }

  /// Given a length symbol that has already been read, read its extra bits.
  pub fn read_length<B: BitSource>(&self, code: u16, bit_src: &mut B) -> Result<u16, DecodeError> {
    let codept = self
      .length_codepoint(code)
      .ok_or(DecodeError::LengthCodeOutOfRange(code))?;
    Ok(codept.read_value(bit_src))
  }

  /// Given a distance symbol that has already been read, read its extra bits.
  pub fn read_dist<B: BitSource>(&self, code: u16, bit_src: &mut B) -> Result<u16, DecodeError> {
    let codept = self
      .dist_codepoint(code)
      .ok_or(DecodeError::DistanceCodeOutOfRange(code))?;
    Ok(codept.read_value(bit_src))
  }
}

impl Default for CodepointTable {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bitreader::SliceBitReader;

  #[test]
  fn length_table_matches_rfc() {
    let expected = [
      (257, 0, 3, 3),
      (264, 0, 10, 10),
      (265, 1, 11, 12),
      (268, 1, 17, 18),
      (269, 2, 19, 22),
      (273, 3, 35, 42),
      (277, 4, 67, 82),
      (280, 4, 115, 130),
      (281, 5, 131, 162),
      (284, 5, 227, 258),
      (285, 0, 258, 258),
    ];
    for (code, nbits, lo, hi) in expected.iter() {
      let c = DEFAULT_CODEPOINTS.length_codepoint(*code).unwrap();
      assert_eq!((c.code(), c.nbits, c.lo, c.hi()), (*code, *nbits, *lo, *hi));
    }
  }

  #[test]
  fn distance_table_matches_rfc() {
    let expected = [
      (0, 0, 1, 1),
      (3, 0, 4, 4),
      (4, 1, 5, 6),
      (5, 1, 7, 8),
      (9, 3, 25, 32),
      (10, 4, 33, 48),
      (19, 8, 769, 1024),
      (20, 9, 1025, 1536),
      (28, 13, 16385, 24576),
      (29, 13, 24577, 32768),
    ];
    for (code, nbits, lo, hi) in expected.iter() {
      let c = DEFAULT_CODEPOINTS.dist_codepoint(*code).unwrap();
      assert_eq!((c.code(), c.nbits, c.lo, c.hi()), (*code, *nbits, *lo, *hi));
    }
  }

  #[test]
  fn ranges_are_contiguous() {
    let table = CodepointTable::new();
    for code in MIN_LENGTH_CODE..MAX_LENGTH_CODE - 1 {
      let this = table.length_codepoint(code).unwrap();
      let next = table.length_codepoint(code + 1).unwrap();
      assert_eq!(this.hi() + 1, next.lo);
    }
    for code in 0..MAX_DIST_CODE {
      let this = table.dist_codepoint(code).unwrap();
      let next = table.dist_codepoint(code + 1).unwrap();
      assert_eq!(this.hi() + 1, next.lo);
    }
  }

  #[test]
  fn reads_extra_bits() {
    // 0b101 in the low bits: length code 273 (3 extra bits) gives 35 + 5
    let mut reader = SliceBitReader::new(&[0b0000_0101]);
    assert_eq!(DEFAULT_CODEPOINTS.read_length(273, &mut reader).unwrap(), 40);
    let mut reader = SliceBitReader::new(&[0xff, 0xff]);
    assert_eq!(DEFAULT_CODEPOINTS.read_dist(29, &mut reader).unwrap(), 32768);
  }

  #[test]
  fn out_of_range_codes_fail() {
    let mut reader = SliceBitReader::new(&[]);
    assert!(matches!(
      DEFAULT_CODEPOINTS.read_length(286, &mut reader),
      Err(DecodeError::LengthCodeOutOfRange(286))
    ));
    assert!(matches!(
      DEFAULT_CODEPOINTS.read_dist(30, &mut reader),
      Err(DecodeError::DistanceCodeOutOfRange(30))
    ));
  }
}
