// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pipe (edge) definitions for the graph.

use crate::block::BlockId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipeId(pub Uuid);

impl PipeId {
    /// Create a new random pipe ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PipeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directed pipe from one block's output socket to another block's input socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipe {
    /// Unique pipe ID
    pub id: PipeId,
    /// Source block (its output socket)
    pub source: BlockId,
    /// Target block (its input socket)
    pub target: BlockId,
    /// Highlighted as a drop target
    pub highlighted: bool,
    /// Under the pointer
    pub hovered: bool,
}

impl Pipe {
    pub(crate) fn new(source: BlockId, target: BlockId) -> Self {
        Self {
            id: PipeId::new(),
            source,
            target,
            highlighted: false,
            hovered: false,
        }
    }

    /// Check if this pipe touches a block
    pub fn involves_block(&self, block_id: BlockId) -> bool {
        self.source == block_id || self.target == block_id
    }
}
