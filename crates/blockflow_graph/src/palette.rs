// SPDX-License-Identifier: MIT OR Apache-2.0
//! The palette: blocks waiting to be dragged into the graph layer.

use crate::block::{Block, BlockId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered collection of blocks outside the graph layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Palette {
    blocks: IndexMap<BlockId, Block>,
}

impl Palette {
    /// Create an empty palette
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a block into the palette, at the end
    pub fn insert(&mut self, block: Block) -> BlockId {
        let id = block.id;
        self.blocks.insert(id, block);
        id
    }

    /// Take a block out of the palette, keeping the order of the rest
    pub fn take(&mut self, block_id: BlockId) -> Option<Block> {
        self.blocks.shift_remove(&block_id)
    }

    /// Check if a block is in the palette
    pub fn contains(&self, block_id: BlockId) -> bool {
        self.blocks.contains_key(&block_id)
    }

    /// Get a block by ID
    pub fn get(&self, block_id: BlockId) -> Option<&Block> {
        self.blocks.get(&block_id)
    }

    /// Blocks in palette order
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if the palette is empty
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Find a block by label
    pub fn find_by_label(&self, label: &str) -> Option<&Block> {
        self.blocks.values().find(|b| b.label == label)
    }

    /// Number of blocks made from a template
    pub fn count_of(&self, template: &str) -> usize {
        self.blocks.values().filter(|b| b.template == template).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockRegistry;

    #[test]
    fn test_take_keeps_order() {
        let registry = BlockRegistry::with_builtins();
        let mut palette = Palette::new();
        let a = palette.insert(registry.create_block("add", "add0").unwrap());
        let b = palette.insert(registry.create_block("multiply", "multiply0").unwrap());
        let c = palette.insert(registry.create_block("add", "add1").unwrap());

        let taken = palette.take(b).unwrap();
        assert_eq!(taken.label, "multiply0");
        let order: Vec<_> = palette.blocks().map(|b| b.id).collect();
        assert_eq!(order, vec![a, c]);
        assert_eq!(palette.count_of("add"), 2);
        assert!(palette.take(b).is_none());
        assert_eq!(palette.find_by_label("add1").map(|b| b.id), Some(c));
    }
}
