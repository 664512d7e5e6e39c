// SPDX-License-Identifier: MIT OR Apache-2.0
//! Token traversal.
//!
//! Tokens are spawned on source blocks and hop from block to block along
//! pipes. Each hop is looked up from the graph at dispatch time, so a chain
//! rewired while a token is in flight is honoured at the token's next hop.
//! The engine never mutates the graph.

use crate::block::{BlockId, BlockKind};
use crate::events::{EventSink, FlowEvent};
use crate::geometry::{lerp, point_along, polyline_length, PipeGeometry, Point};
use crate::graph::ConnectionGraph;
use crate::pipe::PipeId;
use crate::settings::TraversalSettings;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(pub Uuid);

impl TokenId {
    /// Create a new random token ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a token left the simulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TokenFate {
    /// The chain ended at an Output block
    Completed {
        /// Final value
        value: f32,
    },
    /// The chain ended at a block that is not an Output block
    Dangling {
        /// Final value
        value: f32,
    },
    /// A block the token referenced left the graph layer
    Stranded,
}

impl TokenFate {
    /// Final value, unless the token was stranded
    pub fn value(&self) -> Option<f32> {
        match *self {
            Self::Completed { value } | Self::Dangling { value } => Some(value),
            Self::Stranded => None,
        }
    }
}

/// A value travelling through the graph
#[derive(Debug, Clone)]
pub struct Token {
    /// Unique token ID
    pub id: TokenId,
    /// Carried value
    pub value: f32,
    /// Block the token sits at, or last left
    pub current_block: Option<BlockId>,
    /// Block the token is moving to
    pub target_block: Option<BlockId>,
    /// Pipe being travelled
    pub pipe: Option<PipeId>,
    /// Movement progress along the pipe, `0..=1`
    pub progress: f32,
    /// Seconds the current hop takes
    pub duration: f32,
    /// Interpolated position
    pub position: Point,
    /// Blocks already processed, in visit order
    pub visited: IndexSet<BlockId>,
}

impl Token {
    /// Check if the token is travelling along a pipe
    pub fn is_moving(&self) -> bool {
        self.target_block.is_some()
    }

    fn references(&self, block_id: BlockId) -> bool {
        self.current_block == Some(block_id) || self.target_block == Some(block_id)
    }
}

/// Advances tokens and applies block transforms on arrival
#[derive(Debug, Clone, Default)]
pub struct TraversalEngine {
    tokens: IndexMap<TokenId, Token>,
    settings: TraversalSettings,
}

impl TraversalEngine {
    /// Create an engine with the given settings
    pub fn new(settings: TraversalSettings) -> Self {
        Self {
            tokens: IndexMap::new(),
            settings,
        }
    }

    /// Movement settings
    pub fn settings(&self) -> &TraversalSettings {
        &self.settings
    }

    /// Tokens in flight, oldest first
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    /// Get a token by ID
    pub fn token(&self, token_id: TokenId) -> Option<&Token> {
        self.tokens.get(&token_id)
    }

    /// Number of tokens in flight
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Check if no token is in flight
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Spawn a token on a source block and dispatch it right away
    pub fn spawn(
        &mut self,
        graph: &ConnectionGraph,
        geometry: &dyn PipeGeometry,
        source: BlockId,
        sink: &mut impl EventSink,
    ) -> Result<TokenId, SpawnError> {
        let block = graph.block(source).ok_or(SpawnError::NotInGraph(source))?;
        if block.kind != BlockKind::Input {
            return Err(SpawnError::NotASource(source));
        }

        let token = Token {
            id: TokenId::new(),
            value: block.value,
            current_block: Some(source),
            target_block: None,
            pipe: None,
            progress: 0.0,
            duration: 0.0,
            position: block.position,
            visited: IndexSet::new(),
        };
        let id = token.id;
        tracing::debug!(token = %id, block = %source, value = token.value, "token spawned");
        sink.emit(FlowEvent::TokenSpawned {
            token: id,
            block: source,
            value: token.value,
        });

        self.tokens.insert(id, token);
        self.dispatch(graph, geometry, id, sink);
        Ok(id)
    }

    /// Advance every token by `dt` seconds.
    ///
    /// Idle tokens are dispatched to their next hop (or destroyed at the end
    /// of the chain); moving tokens advance and, on the tick their progress
    /// reaches 1, arrive and apply the target block's transform.
    pub fn tick(
        &mut self,
        graph: &ConnectionGraph,
        geometry: &dyn PipeGeometry,
        dt: f32,
        sink: &mut impl EventSink,
    ) {
        self.prune(graph, sink);

        let ids: Vec<TokenId> = self.tokens.keys().copied().collect();
        for id in ids {
            let moving = self.tokens.get(&id).is_some_and(Token::is_moving);
            if moving {
                self.advance(graph, geometry, id, dt, sink);
            } else {
                self.dispatch(graph, geometry, id, sink);
            }
        }
    }

    /// Force-destroy every token referencing a block. Returns how many went.
    pub fn evict(&mut self, block_id: BlockId, sink: &mut impl EventSink) -> usize {
        let doomed: Vec<TokenId> = self
            .tokens
            .values()
            .filter(|t| t.references(block_id))
            .map(|t| t.id)
            .collect();
        for id in &doomed {
            self.destroy(*id, TokenFate::Stranded, sink);
        }
        doomed.len()
    }

    /// Destroy every token as stranded. Returns how many were destroyed.
    pub fn clear(&mut self, sink: &mut impl EventSink) -> usize {
        let doomed: Vec<TokenId> = self.tokens.keys().copied().collect();
        for id in &doomed {
            self.destroy(*id, TokenFate::Stranded, sink);
        }
        doomed.len()
    }

    fn prune(&mut self, graph: &ConnectionGraph, sink: &mut impl EventSink) {
        let stranded: Vec<TokenId> = self
            .tokens
            .values()
            .filter(|t| {
                [t.current_block, t.target_block]
                    .into_iter()
                    .flatten()
                    .any(|b| !graph.contains_block(b))
            })
            .map(|t| t.id)
            .collect();
        for id in stranded {
            self.destroy(id, TokenFate::Stranded, sink);
        }
    }

    fn dispatch(
        &mut self,
        graph: &ConnectionGraph,
        geometry: &dyn PipeGeometry,
        id: TokenId,
        sink: &mut impl EventSink,
    ) {
        let Some(token) = self.tokens.get_mut(&id) else {
            return;
        };
        let Some(current) = token.current_block else {
            self.destroy(id, TokenFate::Stranded, sink);
            return;
        };

        match graph.next_hop(current) {
            Some((target, pipe)) => {
                let curve = graph.pipe_curve(pipe, geometry).unwrap_or_default();
                token.target_block = Some(target);
                token.pipe = Some(pipe);
                token.progress = 0.0;
                token.duration = self.settings.hop_duration(polyline_length(&curve));
                if let Some(start) = curve.first() {
                    token.position = *start;
                }
                tracing::trace!(token = %id, from = %current, to = %target, "token dispatched");
            }
            None => {
                let value = token.value;
                let fate = match graph.block(current).map(|b| b.kind) {
                    Some(BlockKind::Output) => TokenFate::Completed { value },
                    Some(_) => TokenFate::Dangling { value },
                    None => TokenFate::Stranded,
                };
                self.destroy(id, fate, sink);
            }
        }
    }

    fn advance(
        &mut self,
        graph: &ConnectionGraph,
        geometry: &dyn PipeGeometry,
        id: TokenId,
        dt: f32,
        sink: &mut impl EventSink,
    ) {
        let Some(token) = self.tokens.get_mut(&id) else {
            return;
        };

        if token.duration > 0.0 {
            token.progress = (token.progress + dt / token.duration).min(1.0);
        } else {
            token.progress = 1.0;
        }
        if let Some(position) = interpolate(graph, geometry, token) {
            token.position = position;
        }

        if token.progress < 1.0 {
            return;
        }

        let Some(target) = token.target_block.take() else {
            return;
        };
        token.current_block = Some(target);
        token.pipe = None;

        let Some(block) = graph.block(target) else {
            self.destroy(id, TokenFate::Stranded, sink);
            return;
        };
        token.value = block.process(token.value);
        token.position = block.position;
        token.visited.insert(target);

        tracing::debug!(token = %id, block = %target, label = %block.label, value = token.value, "token arrived");
        sink.emit(FlowEvent::BlockVisited {
            token: id,
            block: target,
            value: token.value,
        });
    }

    fn destroy(&mut self, id: TokenId, fate: TokenFate, sink: &mut impl EventSink) {
        let Some(token) = self.tokens.shift_remove(&id) else {
            return;
        };
        match fate {
            TokenFate::Stranded => {
                tracing::warn!(token = %id, visited = token.visited.len(), "token stranded")
            }
            _ => tracing::debug!(token = %id, ?fate, "token destroyed"),
        }
        sink.emit(FlowEvent::TokenDestroyed { token: id, fate });
    }
}

/// Position along the token's pipe, or along the straight line between its
/// blocks' anchors if the pipe is gone.
fn interpolate(graph: &ConnectionGraph, geometry: &dyn PipeGeometry, token: &Token) -> Option<Point> {
    if let Some(curve) = token.pipe.and_then(|p| graph.pipe_curve(p, geometry)) {
        return point_along(&curve, token.progress);
    }
    let from = graph.block(token.current_block?)?;
    let to = graph.block(token.target_block?)?;
    let (start, end) = geometry.anchors(from, to);
    Some(lerp(start, end, token.progress))
}

/// Error when spawning a token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    /// The block is not in the graph layer
    #[error("Block {0} is not in the graph layer")]
    NotInGraph(BlockId),

    /// Only Input blocks emit tokens
    #[error("Block {0} is not an input block")]
    NotASource(BlockId),
}
