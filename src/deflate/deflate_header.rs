/*! A dynamically-encoded DEFLATE stream block is preceded by a header which
contains the following information:

  - 5 bits: HLIT, # of length/literal codes - 257
  - 5 bits: HDIST, # of distance codes - 1
  - 4 bits: HCLEN, # of Code Length codes - 4
  - (HCLEN + 4) * 3 bits of code lengths for the code alphabet specified by HCLEN,
    given in the order 16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15

  HLIT + 257 code lengths, encoded using the code length alphabet
  HDIST + 1 distance lengths, encoded with the code length alphabet
  From these code lengths, it is possible to construct the canonical Huffman
  codes used for the distance and length/lit trees, and thus to decode the
  DEFLATE payload.
*/

/* From RFC 1951:

      0 - 15: Represent code lengths of 0 - 15
          16: Copy the previous code length 3 - 6 times.
              The next 2 bits indicate repeat length
                    (0 = 3, ... , 3 = 6)
                 Example:  Codes 8, 16 (+2 bits 11),
                           16 (+2 bits 10) will expand to
                           12 code lengths of 8 (1 + 6 + 5)
          17: Repeat a code length of 0 for 3 - 10 times.
              (3 bits of length)
          18: Repeat a code length of 0 for 11 - 138 times
              (7 bits of length)
*/

use lazy_static::lazy_static;
use log::trace;

use crate::bitreader::BitSource;
use crate::deflate::decoder::DecodeError;
use crate::huff_tree::{CodeTree, HuffCoder};

lazy_static! {
  static ref RAW_CODE_ORDER: Vec<usize> =
    vec![16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];
}

const NUM_CODE_LENGTH_CODES: usize = 19;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum CodeLengthCodepoint {
  Length(u8),       // A Number of bits, 0-15
  ValueRepeat(u8),  // Valid values: 3-6
  ShortZeroRep(u8), // Valid values: 3-10
  LongZeroRep(u8),  // Valid values: 11-138
}

impl CodeLengthCodepoint {
  fn read_from_bitstream<B: BitSource>(
    bit_src: &mut B,
    coder: &HuffCoder,
    codelength_tree: CodeTree,
  ) -> Result<Self, DecodeError> {
    let symbol = coder.decode_symbol(codelength_tree, bit_src)?;
    match symbol {
      0..=15 => Ok(Self::Length(symbol as u8)),
      16 => Ok(Self::ValueRepeat(bit_src.next_word(2) as u8 + 3)),
      17 => Ok(Self::ShortZeroRep(bit_src.next_word(3) as u8 + 3)),
      18 => Ok(Self::LongZeroRep(bit_src.next_word(7) as u8 + 11)),
      too_high => Err(DecodeError::CodeLengthCodeOutOfRange(too_high)),
    }
  }
}

/// Read the HCLEN + 4 code length code lengths and build the tree that decodes
/// the main code lengths.
fn read_size_codes<B: BitSource>(
  bit_src: &mut B,
  coder: &mut HuffCoder,
  num_codes: usize,
) -> Result<CodeTree, DecodeError> {
  let mut codecodelen = [0u8; NUM_CODE_LENGTH_CODES];
  for code in RAW_CODE_ORDER.iter().take(num_codes) {
    codecodelen[*code] = bit_src.next_word(3) as u8;
  }
  coder.build_code_tree(&codecodelen)
}

/// Decode `num_symbols` code lengths with the code length tree.
fn decode_code_lengths<B: BitSource>(
  bit_src: &mut B,
  coder: &HuffCoder,
  size_tree: CodeTree,
  num_symbols: usize,
) -> Result<Vec<u8>, DecodeError> {
  let mut lengths = Vec::with_capacity(num_symbols);
  while lengths.len() < num_symbols {
    let (value, count) = match CodeLengthCodepoint::read_from_bitstream(bit_src, coder, size_tree)? {
      CodeLengthCodepoint::Length(n) => (n, 1),
      CodeLengthCodepoint::ValueRepeat(n) => {
        let previous = lengths.last().copied().ok_or(DecodeError::RepeatWithoutPrevious)?;
        (previous, n as usize)
      }
      CodeLengthCodepoint::ShortZeroRep(n) | CodeLengthCodepoint::LongZeroRep(n) => (0, n as usize),
    };
    if lengths.len() + count > num_symbols {
      return Err(DecodeError::CodeLengthsOverrun {
        expected: num_symbols,
        got: lengths.len() + count,
      });
    }
    lengths.extend(std::iter::repeat(value).take(count));
  }
  Ok(lengths)
}

/// Read a dynamic block header from the stream and build the length/literal
/// and distance trees it describes in `coder`.
pub fn read_header<B: BitSource>(
  bit_src: &mut B,
  coder: &mut HuffCoder,
) -> Result<(CodeTree, CodeTree), DecodeError> {
  let num_literals = bit_src.next_word(5) as usize + 257;
  let num_dists = bit_src.next_word(5) as usize + 1;
  let num_code_lengths = bit_src.next_word(4) as usize + 4;
  trace!(
    "Dynamic header: {} literal/length codes, {} distance codes, {} code length codes",
    num_literals,
    num_dists,
    num_code_lengths
  );

  let size_tree = read_size_codes(bit_src, coder, num_code_lengths)?;
  let lengths = decode_code_lengths(bit_src, coder, size_tree, num_literals + num_dists)?;

  let (literal_lengths, dist_lengths) = lengths.split_at(num_literals);
  let length_tree = coder.build_code_tree(literal_lengths)?;
  let dist_tree = coder.build_code_tree(dist_lengths)?;
  Ok((length_tree, dist_tree))
}
