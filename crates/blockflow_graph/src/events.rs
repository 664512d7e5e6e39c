// SPDX-License-Identifier: MIT OR Apache-2.0
//! Observable events emitted by the session and the traversal engine.

use crate::block::BlockId;
use crate::interaction::InteractionState;
use crate::traversal::{TokenFate, TokenId};
use serde::{Deserialize, Serialize};

/// Something a presentation layer may want to react to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlowEvent {
    /// A token left a source block
    TokenSpawned {
        /// Token
        token: TokenId,
        /// Source block
        block: BlockId,
        /// Value carried
        value: f32,
    },
    /// A token arrived at a block and took on its transform
    BlockVisited {
        /// Token
        token: TokenId,
        /// Block reached
        block: BlockId,
        /// Value after the block's transform
        value: f32,
    },
    /// A token left the simulation
    TokenDestroyed {
        /// Token
        token: TokenId,
        /// Why
        fate: TokenFate,
    },
    /// A block changed interaction state
    StateChanged {
        /// Block
        block: BlockId,
        /// Previous state
        from: InteractionState,
        /// New state
        to: InteractionState,
    },
}

/// Receiver of [`FlowEvent`]s
pub trait EventSink {
    /// Handle one event
    fn emit(&mut self, event: FlowEvent);
}

impl EventSink for Vec<FlowEvent> {
    fn emit(&mut self, event: FlowEvent) {
        self.push(event);
    }
}
