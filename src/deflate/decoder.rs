use super::account::InputTracker;
use super::codepoints::{DEFAULT_CODEPOINTS, EOB_CODE};
use super::deflate_header::read_header;
use super::BlockType;
use crate::bitreader::BitSource;
use crate::huff_tree::{CodeTree, HuffCoder};
use crate::sink::OutputSink;

use std::convert::TryFrom;

use log::debug;
use thiserror::Error;

/// Bits a decoder may read past the end of its input before giving up: one
/// prefetch word's worth.
pub const DEFAULT_PADDING_ALLOWANCE_BITS: u64 = 64;

/// Profiles index output bytes with `u32`s, so no stream may inflate to more
/// than this.
pub const MAX_OUTPUT_BYTES: usize = u32::MAX as usize;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("Block header used the reserved block type 0b11")]
  ReservedBlockType,
  #[error("The LEN and NLEN fields of an uncompressed block mismatched: {0}, {1}")]
  LenNlenMismatch(u16, u16),
  #[error("Length/literal symbol out of range: {0}")]
  LengthCodeOutOfRange(u16),
  #[error("Distance symbol out of range: {0}")]
  DistanceCodeOutOfRange(u16),
  #[error("Code length symbol out of range: {0}")]
  CodeLengthCodeOutOfRange(u16),
  #[error("Tried to go back {0} bytes, but only {1} bytes have been written")]
  BackrefPastStart(u16, usize),
  #[error("Code lengths describe an oversubscribed Huffman code")]
  OversubscribedCode,
  #[error("Attempted to decode a symbol from an empty Huffman code")]
  EmptyCode,
  #[error("Read a bit sequence that is not assigned in an incomplete Huffman code")]
  IncompleteCode,
  #[error("Code length repeat used before any code length was read")]
  RepeatWithoutPrevious,
  #[error("Code length repeats ran past the end of the table: expected {expected}, got {got}")]
  CodeLengthsOverrun { expected: usize, got: usize },
  #[error("Unexpected end of DEFLATE data: read {0} bits past the end of input")]
  UnexpectedEndOfData(u64),
  #[error("Input of {0} bytes is too large to profile")]
  InputTooLarge(usize),
  #[error("Output exceeded the limit of {0} bytes")]
  OutputTooLarge(usize),
}

/// The DEFLATE block state machine. Reads blocks from a bit source and writes
/// every decoded byte, along with the number of bits it cost, to a sink.
pub struct Inflater<S, W> {
  input: InputTracker<S>,
  out: W,
  // Trees for fixed-Huffman blocks, built the first time one is seen.
  fixed_code: HuffCoder,
  fixed_trees: Option<(CodeTree, CodeTree)>,
  copy_serial: u32,
  padding_allowance_bits: u64,
  output_limit: usize,
}

impl<S: BitSource, W: OutputSink> Inflater<S, W> {
  pub fn new(input: S, out: W) -> Self {
    Self {
      input: InputTracker::new(input),
      out,
      fixed_code: HuffCoder::new(),
      fixed_trees: None,
      copy_serial: 0,
      padding_allowance_bits: DEFAULT_PADDING_ALLOWANCE_BITS,
      output_limit: MAX_OUTPUT_BYTES,
    }
  }

  pub fn with_padding_allowance(mut self, bits: u64) -> Self {
    self.padding_allowance_bits = bits;
    self
  }

  /// Cap the output length. Limits above `MAX_OUTPUT_BYTES` are lowered to it.
  pub fn with_output_limit(mut self, bytes: usize) -> Self {
    self.output_limit = bytes.min(MAX_OUTPUT_BYTES);
    self
  }

  /// Decode blocks until the final one, then hand back the sink.
  pub fn inflate(mut self) -> Result<W, DecodeError> {
    let mut has_more_blocks = true;
    while has_more_blocks {
      self.check_overrun()?;
      let is_final = self.input.next_bit() == 1;
      let btype = self.input.next_word(2) as u8;
      let block_type = BlockType::try_from(btype).map_err(|_| DecodeError::ReservedBlockType)?;
      self.input.account().close();
      self.out.open_block(block_type, is_final);

      match block_type {
        BlockType::Raw => {
          self.decompress_raw()?;
          // Stored bytes are never padding.
          self.check_overrun_within(0)?
        }
        BlockType::Fixed => {
          let (len_tree, dist_tree) = self.fixed_trees()?;
          let coder = std::mem::take(&mut self.fixed_code);
          let result = self.decompress_huffman(&coder, len_tree, dist_tree);
          self.fixed_code = coder;
          result?
        }
        BlockType::Dynamic => {
          let mut coder = HuffCoder::new();
          let (len_tree, dist_tree) = read_header(&mut self.input, &mut coder)?;
          self.input.account().close();
          self.decompress_huffman(&coder, len_tree, dist_tree)?
        }
      }

      let bit_size = self.input.account().close_block();
      debug!(
        "Decoded {:?} block ({} bits, final = {}), output now {} bytes",
        block_type,
        bit_size,
        is_final,
        self.out.position()
      );
      self.out.close_block(bit_size);
      has_more_blocks = !is_final;
    }
    // A complete stream ends inside its input.
    self.check_overrun_within(0)?;
    Ok(self.out)
  }

  /// Returns the fixed length/literal and distance trees, building them on
  /// first use.
  fn fixed_trees(&mut self) -> Result<(CodeTree, CodeTree), DecodeError> {
    if let Some(trees) = self.fixed_trees {
      return Ok(trees);
    }
    let mut lengths = [0u8; 288];
    lengths[0..144].iter_mut().for_each(|l| *l = 8);
    lengths[144..256].iter_mut().for_each(|l| *l = 9);
    lengths[256..280].iter_mut().for_each(|l| *l = 7);
    lengths[280..288].iter_mut().for_each(|l| *l = 8);
    let len_tree = self.fixed_code.build_code_tree(&lengths)?;
    let dist_tree = self.fixed_code.build_code_tree(&[5u8; 32])?;
    self.fixed_trees = Some((len_tree, dist_tree));
    Ok((len_tree, dist_tree))
  }

  fn check_overrun(&self) -> Result<(), DecodeError> {
    self.check_overrun_within(self.padding_allowance_bits)
  }

  fn check_overrun_within(&self, allowance_bits: u64) -> Result<(), DecodeError> {
    let overrun = self.input.overrun_bits();
    if overrun > allowance_bits {
      return Err(DecodeError::UnexpectedEndOfData(overrun));
    }
    Ok(())
  }

  fn reserve_output(&self, bytes: usize) -> Result<(), DecodeError> {
    if self.out.position() + bytes > self.output_limit {
      return Err(DecodeError::OutputTooLarge(self.output_limit));
    }
    Ok(())
  }

  fn decompress_raw(&mut self) -> Result<(), DecodeError> {
    // According to 1951, we need to skip any remaining bits in the partial byte
    self.input.ensure_aligned();
    let len = self.input.next_short();
    let nlen = self.input.next_short();
    if len != !nlen {
      return Err(DecodeError::LenNlenMismatch(len, nlen));
    }
    self.input.account().close();
    self.reserve_output(len as usize)?;

    for _ in 0..len {
      let value = self.input.next_byte();
      let bit_size = self.input.account().close();
      self.out.append(value, bit_size);
    }
    Ok(())
  }

  fn decompress_huffman(
    &mut self,
    coder: &HuffCoder,
    len_tree: CodeTree,
    dist_tree: CodeTree,
  ) -> Result<(), DecodeError> {
    loop {
      self.check_overrun()?;
      let symbol = coder.decode_symbol(len_tree, &mut self.input)?;
      match symbol {
        0..=255 => {
          self.reserve_output(1)?;
          let bit_size = self.input.account().close();
          self.out.append(symbol as u8, bit_size);
        }
        EOB_CODE => {
          self.input.account().close();
          return Ok(());
        }
        _ => {
          let length = DEFAULT_CODEPOINTS.read_length(symbol, &mut self.input)?;
          let dist_code = coder.decode_symbol(dist_tree, &mut self.input)?;
          let distance = DEFAULT_CODEPOINTS.read_dist(dist_code, &mut self.input)?;
          let bit_size = self.input.account().close();
          self.copy_run(distance, length, bit_size)?;
        }
      }
    }
  }

  /// Expand a backref at the current output position. The whole cost of the
  /// length/distance pair is charged to the first byte of the run.
  fn copy_run(&mut self, distance: u16, length: u16, bit_size: u32) -> Result<(), DecodeError> {
    let position = self.out.position();
    if distance as usize > position {
      return Err(DecodeError::BackrefPastStart(distance, position));
    }
    self.reserve_output(length as usize)?;
    for i in 0..length {
      let cost = if i == 0 { bit_size } else { 0 };
      self.out.copy(distance as usize, self.copy_serial, cost);
    }
    self.copy_serial += 1;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bitreader::SliceBitReader;
  use crate::sink::VecSink;

  fn inflate_bytes(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let inflater = Inflater::new(SliceBitReader::new(data), VecSink::new());
    Ok(inflater.inflate()?.into_inner())
  }

  /// Records every call the decoder makes, for checking bit attribution.
  #[derive(Default)]
  struct CallLog {
    written: usize,
    calls: Vec<String>,
  }

  impl OutputSink for CallLog {
    fn position(&self) -> usize {
      self.written
    }
    fn append(&mut self, value: u8, bit_size: u32) {
      self.written += 1;
      self.calls.push(format!("lit {} {}", value, bit_size));
    }
    fn copy(&mut self, distance: usize, run_serial: u32, bit_size: u32) {
      self.written += 1;
      self.calls.push(format!("copy {} {} {}", distance, run_serial, bit_size));
    }
    fn open_block(&mut self, block_type: BlockType, is_final: bool) {
      self.calls.push(format!("open {:?} {}", block_type, is_final));
    }
    fn close_block(&mut self, bit_size: u32) {
      self.calls.push(format!("close {}", bit_size));
    }
  }

  #[test]
  fn hello_fixed() {
    let data = [0xf3, 0x48, 0xcd, 0xc9, 0xc9, 0xe7, 0x2, 0x0u8];
    let decoded = inflate_bytes(&data).unwrap();
    let correct_answer = [72, 101, 108, 108, 111, 10u8];
    assert_eq!(decoded, correct_answer);
  }

  #[test]
  fn hello_dyn_compressed() {
    let data = [
      0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0xcf, 0x80, 0x13, 0x5c, 0x19, 0xa3, 0x7c, 0xaa, 0xf2, 0x01,
    ];
    let decoded = inflate_bytes(&data).unwrap();
    let correct_answer = "hellohellohello\n".repeat(22);
    assert_eq!(decoded, correct_answer.as_bytes());
  }

  #[test]
  fn raw_block() {
    // final, raw, LEN = 3, NLEN = !3
    let data = [0x01, 0x03, 0x00, 0xfc, 0xff, b'a', b'b', b'c'];
    assert_eq!(inflate_bytes(&data).unwrap(), b"abc");
  }

  #[test]
  fn raw_bytes_cost_eight_bits() {
    let data = [0x01, 0x02, 0x00, 0xfd, 0xff, b'x', b'y'];
    let inflater = Inflater::new(SliceBitReader::new(&data), CallLog::default());
    let log = inflater.inflate().unwrap();
    // 3 header bits + 5 padding + 32 length bits + 2 bytes
    assert_eq!(
      log.calls,
      vec!["open Raw true", "lit 120 8", "lit 121 8", "close 56"]
    );
  }

  #[test]
  fn run_cost_lands_on_first_byte() {
    // Fixed block: 'a', then <length 3, distance 1>, then end-of-block.
    let data = [0x4b, 0x04, 0x02, 0x00];
    let inflater = Inflater::new(SliceBitReader::new(&data), CallLog::default());
    let log = inflater.inflate().unwrap();
    assert_eq!(
      log.calls,
      vec![
        "open Fixed true",
        "lit 97 8",
        "copy 1 0 12",
        "copy 1 0 0",
        "copy 1 0 0",
        "close 30",
      ]
    );
  }

  #[test]
  fn reserved_block_type_fails() {
    // BFINAL = 1, BTYPE = 11
    let data = [0b0000_0111u8, 0, 0, 0];
    assert!(matches!(
      inflate_bytes(&data),
      Err(DecodeError::ReservedBlockType)
    ));
  }

  #[test]
  fn len_nlen_mismatch_fails() {
    let data = [0x01, 0x03, 0x00, 0x00, 0x00, b'a', b'b', b'c'];
    assert!(matches!(
      inflate_bytes(&data),
      Err(DecodeError::LenNlenMismatch(3, 0))
    ));
  }

  #[test]
  fn backref_before_start_fails() {
    // Fixed block whose first symbol is <length 3, distance 1>.
    let data = [0x03, 0x02, 0x00];
    assert!(matches!(
      inflate_bytes(&data),
      Err(DecodeError::BackrefPastStart(1, 0))
    ));
  }

  #[test]
  fn truncated_stream_fails() {
    // A non-final fixed block with no end: the zero padding decodes as an
    // end-of-block, and then as an empty raw block with a bad NLEN.
    let data = [0x02];
    assert!(inflate_bytes(&data).is_err());
  }

  #[test]
  fn truncated_raw_block_fails() {
    // LEN = 10, but only 3 bytes follow.
    let data = [0x01, 0x0a, 0x00, 0xf5, 0xff, b'F', b'o', b'o'];
    assert!(matches!(
      inflate_bytes(&data),
      Err(DecodeError::UnexpectedEndOfData(56))
    ));
  }

  #[test]
  fn truncated_raw_block_before_final_fails() {
    // Non-final raw block cut short; the zero padding would otherwise read as
    // further blocks.
    let data = [0x00, 0x04, 0x00, 0xfb, 0xff, b'a'];
    assert!(matches!(
      inflate_bytes(&data),
      Err(DecodeError::UnexpectedEndOfData(24))
    ));
  }

  #[test]
  fn truncated_huffman_block_fails() {
    let data = [
      0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0xcf, 0x80, 0x13, 0x5c, 0x19, 0xa3, 0x7c, 0xaa, 0xf2,
    ];
    assert!(matches!(
      inflate_bytes(&data),
      Err(DecodeError::UnexpectedEndOfData(_))
    ));
  }

  #[test]
  fn trailing_bytes_are_ignored() {
    let data = [0x01, 0x03, 0x00, 0xfc, 0xff, b'a', b'b', b'c', 0xde, 0xad];
    assert_eq!(inflate_bytes(&data).unwrap(), b"abc");
  }

  #[test]
  fn output_limit_is_enforced() {
    let raw = [0x01, 0x03, 0x00, 0xfc, 0xff, b'a', b'b', b'c'];
    let inflater = Inflater::new(SliceBitReader::new(&raw), VecSink::new()).with_output_limit(2);
    assert!(matches!(
      inflater.inflate(),
      Err(DecodeError::OutputTooLarge(2))
    ));
    let inflater = Inflater::new(SliceBitReader::new(&raw), VecSink::new()).with_output_limit(3);
    assert_eq!(inflater.inflate().unwrap().into_inner(), b"abc");

    // 'a' then a run of 3: the run crosses the limit.
    let fixed = [0x4b, 0x04, 0x02, 0x00];
    let inflater = Inflater::new(SliceBitReader::new(&fixed), VecSink::new()).with_output_limit(3);
    assert!(matches!(
      inflater.inflate(),
      Err(DecodeError::OutputTooLarge(3))
    ));

    let hello = [0xf3, 0x48, 0xcd, 0xc9, 0xc9, 0xe7, 0x2, 0x0u8];
    let inflater = Inflater::new(SliceBitReader::new(&hello), VecSink::new()).with_output_limit(5);
    assert!(matches!(
      inflater.inflate(),
      Err(DecodeError::OutputTooLarge(5))
    ));
  }

  #[test]
  fn empty_input_fails() {
    assert!(matches!(
      inflate_bytes(&[]),
      Err(DecodeError::LenNlenMismatch(0, 0))
    ));
  }
}
