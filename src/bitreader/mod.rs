/*! Bit-level access to an in-memory DEFLATE stream.

RFC 1951 packs data elements starting with the least-significant bit of each
byte, and multi-bit fields (other than Huffman codes) are stored LSB first.
Huffman codes are packed starting with their most-significant bit, which is
why the Huffman decoder pulls single bits out of the reader rather than words.

Reads past the end of the buffer return zeros: a decoder must be able to
finish the final block of a stream whose last byte is only partially used.
*/

use bitstream_io::{BitRead, BitReader, LittleEndian};
use std::io::Cursor;

/// A source of bits in DEFLATE order.
pub trait BitSource {
  /// Returns the next bit (0 or 1).
  fn next_bit(&mut self) -> u32;

  /// Returns the next `width`-bit little-endian field.
  fn next_word(&mut self, width: u32) -> u32;

  /// Returns the next byte. The reader must be byte-aligned.
  fn next_byte(&mut self) -> u8;

  /// Returns the next little-endian 16-bit value. The reader must be byte-aligned.
  fn next_short(&mut self) -> u16;

  /// Offset of the next bit within the current byte, 0-7.
  fn bit_cursor(&self) -> u8;

  /// Skip to the next byte boundary, returning the number of bits skipped.
  fn ensure_aligned(&mut self) -> u8;

  /// Number of bits handed out beyond the end of the underlying data.
  fn overrun_bits(&self) -> u64;
}

/// Reads bits from a byte slice through a `bitstream_io::BitReader`, padding
/// the end of the slice with zeros.
pub struct SliceBitReader<'a> {
  bit_src: BitReader<Cursor<&'a [u8]>, LittleEndian>,
  available: u64,
  consumed: u64,
}

impl<'a> SliceBitReader<'a> {
  pub fn new(data: &'a [u8]) -> Self {
    Self {
      bit_src: BitReader::new(Cursor::new(data)),
      available: (data.len() as u64) * 8,
      consumed: 0,
    }
  }

  /// Total number of bits consumed so far, including any zero padding.
  pub fn bits_consumed(&self) -> u64 {
    self.consumed
  }

  fn remaining(&self) -> u64 {
    self.available.saturating_sub(self.consumed)
  }
}

impl<'a> BitSource for SliceBitReader<'a> {
  fn next_bit(&mut self) -> u32 {
    let bit = if self.remaining() > 0 {
      self.bit_src.read_bit().map(u32::from).unwrap_or(0)
    } else {
      0
    };
    self.consumed += 1;
    bit
  }

  fn next_word(&mut self, width: u32) -> u32 {
    debug_assert!(width <= 32, "Attempted to read a {}-bit word", width);
    if width == 0 {
      return 0;
    }
    // Only the bits that actually exist are read; the rest are zero.
    let in_range = self.remaining().min(u64::from(width)) as u32;
    let word = if in_range > 0 {
      self.bit_src.read::<u32>(in_range).unwrap_or(0)
    } else {
      0
    };
    self.consumed += u64::from(width);
    word
  }

  fn next_byte(&mut self) -> u8 {
    debug_assert_eq!(self.bit_cursor(), 0, "Byte read from an unaligned reader");
    self.next_word(8) as u8
  }

  fn next_short(&mut self) -> u16 {
    debug_assert_eq!(self.bit_cursor(), 0, "Short read from an unaligned reader");
    self.next_word(16) as u16
  }

  fn bit_cursor(&self) -> u8 {
    (self.consumed % 8) as u8
  }

  fn ensure_aligned(&mut self) -> u8 {
    let cursor = self.bit_cursor();
    if cursor == 0 {
      return 0;
    }
    let skipped = 8 - cursor;
    self.bit_src.byte_align();
    self.consumed += u64::from(skipped);
    skipped
  }

  fn overrun_bits(&self) -> u64 {
    self.consumed.saturating_sub(self.available)
  }
}
