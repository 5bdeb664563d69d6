/*! A Huffman tree implementation designed for decoding DEFLATE-style trees.

Huffman Trees in the DEFLATE format carry additional constraints that
 - Symbols with the same length are listed in lexicographical order
 - Shorter codes lexicographically precede longer codes.

This makes it possible to specify a huffman tree by simply specifying the code
length for each symbol. Rather than computing the bit patterns of the
canonical code, we build the tree bottom-up: starting at the longest length,
each level admits its leaves in symbol order and then pairs up every node
carried over from the deeper level. Leaves therefore sit to the left of the
subtrees at the same depth, which is exactly the ordering above.

Nodes live in a pool owned by a `HuffCoder` and refer to their children by
index. A coder is kept for as long as any of its trees may still be used.
*/

use crate::bitreader::BitSource;
use crate::deflate::decoder::DecodeError;

/// Longest code length DEFLATE allows.
pub const MAX_CODE_LENGTH: u8 = 15;

pub type NodeIndex = u32;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HuffNode {
  Leaf(u16),
  Branch(NodeIndex, NodeIndex),
  // The unused half of an incomplete code.
  Vacant,
}

/// Handle to the root of a tree in a `HuffCoder`'s pool. A table in which
/// no symbol is used has no root.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CodeTree {
  root: Option<NodeIndex>,
}

impl CodeTree {
  pub fn is_empty(&self) -> bool {
    self.root.is_none()
  }
}

#[derive(Debug, Default, Clone)]
pub struct HuffCoder {
  pool: Vec<HuffNode>,
}

impl HuffCoder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn node(&self, index: NodeIndex) -> HuffNode {
    self.pool[index as usize]
  }

  /// Number of nodes allocated so far, across all trees in this coder.
  pub fn len(&self) -> usize {
    self.pool.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pool.is_empty()
  }

  fn new_node(&mut self, node: HuffNode) -> NodeIndex {
    let index = self.pool.len() as NodeIndex;
    self.pool.push(node);
    index
  }

  /// Build the canonical code tree for the given per-symbol code lengths,
  /// where a length of 0 means the symbol is unused.
  pub fn build_code_tree(&mut self, lengths: &[u8]) -> Result<CodeTree, DecodeError> {
    let mut nodes: Vec<NodeIndex> = Vec::new();
    for length in (0..=MAX_CODE_LENGTH).rev() {
      let mut level = Vec::with_capacity(nodes.len() / 2 + 1);
      if length > 0 {
        for (symbol, _) in lengths.iter().enumerate().filter(|(_, l)| **l == length) {
          level.push(self.new_node(HuffNode::Leaf(symbol as u16)));
        }
      }
      for pair in nodes.chunks(2) {
        let right = match pair.get(1) {
          Some(right) => *right,
          None => self.new_node(HuffNode::Vacant),
        };
        level.push(self.new_node(HuffNode::Branch(pair[0], right)));
      }
      nodes = level;
    }

    match nodes.len() {
      0 => Ok(CodeTree { root: None }),
      1 => Ok(CodeTree {
        root: Some(nodes[0]),
      }),
      _ => Err(DecodeError::OversubscribedCode),
    }
  }

  /// Decode one symbol by walking the tree one bit at a time.
  pub fn decode_symbol<B: BitSource>(
    &self,
    tree: CodeTree,
    bit_src: &mut B,
  ) -> Result<u16, DecodeError> {
    let mut current = tree.root.ok_or(DecodeError::EmptyCode)?;
    // Roots are always branches, so at least one bit is read per symbol.
    loop {
      match self.node(current) {
        HuffNode::Branch(left, right) => {
          current = if bit_src.next_bit() == 0 { left } else { right };
        }
        HuffNode::Leaf(symbol) => return Ok(symbol),
        HuffNode::Vacant => return Err(DecodeError::IncompleteCode),
      }
    }
  }
}
