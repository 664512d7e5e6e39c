// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection graph: the block layer, its pipes, and the adjacency index.
//!
//! [`ConnectionGraph`] is the only place pipes are created or destroyed.
//! Every mutation validates first and leaves the graph unchanged when it
//! rejects a request, so readers (the traversal engine) only ever observe
//! a consistent topology.

use crate::block::{Block, BlockId};
use crate::geometry::{polyline_distance, PipeGeometry, Point};
use crate::interaction::{InteractionEvent, Transition};
use crate::pipe::{Pipe, PipeId};
use crate::socket::SocketDirection;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The block layer and its pipes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectionGraph {
    /// Blocks living in the block layer
    blocks: IndexMap<BlockId, Block>,
    /// Pipes between blocks
    pipes: IndexMap<PipeId, Pipe>,
    /// Pipes incident to each block. Every block in the layer has an entry.
    block_to_pipes: IndexMap<BlockId, Vec<PipeId>>,
}

/// Result of a successful splice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Splice {
    /// Pipe from the old source into the spliced block
    pub upstream: PipeId,
    /// Pipe from the spliced block to the old target
    pub downstream: PipeId,
    /// Interaction transition of the spliced block, if it changed state
    pub transition: Option<Transition>,
}

/// A pipe removed from the graph together with where it sat, so it can be
/// put back exactly.
struct DetachedPipe {
    pipe: Pipe,
    index: usize,
    source_slot: Option<usize>,
    target_slot: Option<usize>,
}

impl ConnectionGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block to the block layer
    pub fn add_block(&mut self, mut block: Block) -> BlockId {
        let id = block.id;
        // A block entering the layer has no pipes yet
        block.set_socket_connected(SocketDirection::Input, false);
        block.set_socket_connected(SocketDirection::Output, false);
        self.blocks.insert(id, block);
        self.block_to_pipes.entry(id).or_default();
        tracing::trace!(block = %id, "block added to graph layer");
        id
    }

    /// Remove a block from the block layer, detaching its pipes first
    pub fn take_block(&mut self, block_id: BlockId) -> Option<Block> {
        if !self.blocks.contains_key(&block_id) {
            return None;
        }
        self.disconnect(block_id);
        self.block_to_pipes.shift_remove(&block_id);
        self.blocks.shift_remove(&block_id)
    }

    /// Check if a block is in the block layer
    pub fn contains_block(&self, block_id: BlockId) -> bool {
        self.blocks.contains_key(&block_id)
    }

    /// Get a block by ID
    pub fn block(&self, block_id: BlockId) -> Option<&Block> {
        self.blocks.get(&block_id)
    }

    /// Get a mutable block by ID
    pub fn block_mut(&mut self, block_id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(&block_id)
    }

    /// Get all blocks
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Get the number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Find a block by label
    pub fn find_by_label(&self, label: &str) -> Option<&Block> {
        self.blocks.values().find(|b| b.label == label)
    }

    /// Get a pipe by ID
    pub fn pipe(&self, pipe_id: PipeId) -> Option<&Pipe> {
        self.pipes.get(&pipe_id)
    }

    /// Get all pipes
    pub fn pipes(&self) -> impl Iterator<Item = &Pipe> {
        self.pipes.values()
    }

    /// Get the number of pipes
    pub fn pipe_count(&self) -> usize {
        self.pipes.len()
    }

    /// Get the pipes incident to a block, in the order they were attached
    pub fn pipes_for(&self, block_id: BlockId) -> impl Iterator<Item = &Pipe> {
        self.block_to_pipes
            .get(&block_id)
            .into_iter()
            .flatten()
            .filter_map(move |pipe_id| {
                let pipe = self.pipes.get(pipe_id);
                debug_assert!(
                    pipe.is_some(),
                    "adjacency index of {block_id} names missing pipe {pipe_id}"
                );
                pipe
            })
    }

    /// The pipe ending on a block's input socket
    pub fn incoming(&self, block_id: BlockId) -> Option<&Pipe> {
        self.pipes_for(block_id).find(|p| p.target == block_id)
    }

    /// The pipe starting on a block's output socket
    pub fn outgoing(&self, block_id: BlockId) -> Option<&Pipe> {
        self.pipes_for(block_id).find(|p| p.source == block_id)
    }

    /// Check if a block has any pipe
    pub fn is_connected(&self, block_id: BlockId) -> bool {
        self.pipes_for(block_id).next().is_some()
    }

    /// Next block after `block_id` and the pipe leading there
    pub fn next_hop(&self, block_id: BlockId) -> Option<(BlockId, PipeId)> {
        self.outgoing(block_id).map(|p| (p.target, p.id))
    }

    /// Blocks reachable from `start` by following pipes, `start` included.
    /// Stops if it comes back to a block it already listed.
    pub fn chain_from(&self, start: BlockId) -> Vec<BlockId> {
        let mut chain = vec![start];
        let mut current = start;
        while let Some((next, _)) = self.next_hop(current) {
            if chain.contains(&next) {
                break;
            }
            chain.push(next);
            current = next;
        }
        chain
    }

    /// Create a pipe from `source`'s output socket to `target`'s input socket
    pub fn connect(&mut self, source: BlockId, target: BlockId) -> Result<PipeId, ConnectError> {
        if let Err(e) = self.validate_connect(source, target) {
            tracing::debug!(%source, %target, error = %e, "connect rejected");
            return Err(e);
        }

        let id = self.attach(Pipe::new(source, target));
        tracing::debug!(pipe = %id, %source, %target, "pipe created");
        Ok(id)
    }

    fn validate_connect(&self, source: BlockId, target: BlockId) -> Result<(), ConnectError> {
        if source == target {
            return Err(ConnectError::SelfConnection(source));
        }

        let source_block = self.blocks.get(&source).ok_or(ConnectError::NotInGraph(source))?;
        let target_block = self.blocks.get(&target).ok_or(ConnectError::NotInGraph(target))?;

        if !source_block.has_output() {
            return Err(ConnectError::InvalidSocket {
                block: source,
                direction: SocketDirection::Output,
            });
        }
        if !target_block.has_input() {
            return Err(ConnectError::InvalidSocket {
                block: target,
                direction: SocketDirection::Input,
            });
        }

        if source_block.output_connected() {
            return Err(ConnectError::AlreadyConnected {
                block: source,
                direction: SocketDirection::Output,
            });
        }
        if target_block.input_connected() {
            return Err(ConnectError::AlreadyConnected {
                block: target,
                direction: SocketDirection::Input,
            });
        }

        if self.chain_from(target).contains(&source) {
            return Err(ConnectError::WouldCycle {
                from: source,
                to: target,
            });
        }

        Ok(())
    }

    /// Remove every pipe incident to a block. Disconnecting an unconnected
    /// block is a no-op.
    pub fn disconnect(&mut self, block_id: BlockId) -> Vec<Pipe> {
        let Some(pipe_ids) = self.block_to_pipes.get(&block_id).cloned() else {
            return Vec::new();
        };

        let removed: Vec<Pipe> = pipe_ids
            .into_iter()
            .filter_map(|id| self.detach(id).map(|d| d.pipe))
            .collect();

        if let Some(leftover) = self.block_to_pipes.get_mut(&block_id) {
            if !leftover.is_empty() {
                tracing::error!(block = %block_id, count = leftover.len(), "dropping dangling adjacency entries");
                leftover.clear();
            }
        }

        if !removed.is_empty() {
            tracing::debug!(block = %block_id, count = removed.len(), "block disconnected");
        }
        removed
    }

    /// Splice `new_block` into `pipe_id`, replacing `source -> target` with
    /// `source -> new_block -> target`.
    ///
    /// All-or-nothing: on any failure the graph is left exactly as it was.
    /// On success the block is sent [`InteractionEvent::EnterPipeHover`].
    pub fn insert_into_pipe(
        &mut self,
        new_block: BlockId,
        pipe_id: PipeId,
    ) -> Result<Splice, InsertError> {
        let (source, target) = {
            let pipe = self.pipes.get(&pipe_id).ok_or(InsertError::PipeNotFound(pipe_id))?;
            (pipe.source, pipe.target)
        };

        for endpoint in [source, target, new_block] {
            if !self.blocks.contains_key(&endpoint) {
                return Err(InsertError::EndpointMissing(endpoint));
            }
        }
        if new_block == source || new_block == target {
            return Err(InsertError::SelfInsertion(new_block));
        }

        let original = self.detach(pipe_id).ok_or(InsertError::PipeNotFound(pipe_id))?;

        let upstream = match self.connect(source, new_block) {
            Ok(id) => id,
            Err(cause) => {
                self.restore(original);
                tracing::debug!(block = %new_block, pipe = %pipe_id, error = %cause, "splice rolled back");
                return Err(InsertError::PartialFailureRolledBack {
                    stage: SpliceStage::Upstream,
                    cause,
                });
            }
        };

        let downstream = match self.connect(new_block, target) {
            Ok(id) => id,
            Err(cause) => {
                self.detach(upstream);
                self.restore(original);
                tracing::debug!(block = %new_block, pipe = %pipe_id, error = %cause, "splice rolled back");
                return Err(InsertError::PartialFailureRolledBack {
                    stage: SpliceStage::Downstream,
                    cause,
                });
            }
        };

        let transition = self
            .blocks
            .get_mut(&new_block)
            .and_then(|b| b.interaction_mut().send(InteractionEvent::EnterPipeHover));

        tracing::debug!(block = %new_block, %source, %target, "block spliced into pipe");
        Ok(Splice {
            upstream,
            downstream,
            transition,
        })
    }

    /// Take a block out of the chain. If it sits between an upstream and a
    /// downstream block, those two are joined directly; the block itself
    /// ends up with no pipes. Returns the joining pipe, if one was made.
    pub fn remove_from_chain(&mut self, block_id: BlockId) -> Option<PipeId> {
        let upstream = self.incoming(block_id).map(|p| p.source);
        let downstream = self.outgoing(block_id).map(|p| p.target);

        self.disconnect(block_id);

        let (upstream, downstream) = (upstream?, downstream?);
        match self.connect(upstream, downstream) {
            Ok(pipe_id) => {
                tracing::debug!(block = %block_id, %upstream, %downstream, "block removed from chain");
                Some(pipe_id)
            }
            Err(e) => {
                tracing::warn!(block = %block_id, error = %e, "could not rejoin chain");
                None
            }
        }
    }

    /// The pipe closest to `point`, if it is within `max_distance`
    pub fn nearest_pipe(
        &self,
        point: Point,
        max_distance: f32,
        geometry: &dyn PipeGeometry,
    ) -> Option<PipeId> {
        self.pipes
            .keys()
            .filter_map(|&id| {
                let curve = self.pipe_curve(id, geometry)?;
                polyline_distance(point, &curve).map(|d| (id, d))
            })
            .filter(|(_, d)| *d <= max_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Polyline of a pipe as produced by `geometry`
    pub fn pipe_curve(&self, pipe_id: PipeId, geometry: &dyn PipeGeometry) -> Option<Vec<Point>> {
        let pipe = self.pipes.get(&pipe_id)?;
        let source = self.blocks.get(&pipe.source)?;
        let target = self.blocks.get(&pipe.target)?;
        Some(geometry.pipe_curve(source, target))
    }

    /// Mark one pipe as hovered (and optionally highlighted as a drop
    /// target), clearing the flags on every other pipe.
    pub fn set_hovered_pipe(&mut self, pipe_id: Option<PipeId>, highlight: bool) {
        for (id, pipe) in self.pipes.iter_mut() {
            let hovered = Some(*id) == pipe_id;
            pipe.hovered = hovered;
            pipe.highlighted = hovered && highlight;
        }
    }

    /// The currently hovered pipe
    pub fn hovered_pipe(&self) -> Option<PipeId> {
        self.pipes.values().find(|p| p.hovered).map(|p| p.id)
    }

    /// Clear hover and highlight flags on every pipe
    pub fn clear_highlights(&mut self) {
        self.set_hovered_pipe(None, false);
    }

    /// Scan the adjacency index and socket flags, dropping anything that
    /// does not match the pipe set. Each fix is logged and returned.
    pub fn repair(&mut self) -> Vec<DanglingReference> {
        let mut faults = Vec::new();

        // Index entries for blocks that left the layer
        let blocks = &self.blocks;
        self.block_to_pipes.retain(|block_id, _| {
            let known = blocks.contains_key(block_id);
            if !known {
                faults.push(DanglingReference::UnknownBlockEntry(*block_id));
            }
            known
        });
        for block_id in self.blocks.keys() {
            self.block_to_pipes.entry(*block_id).or_default();
        }

        // Pipes whose endpoints are gone
        self.pipes.retain(|pipe_id, pipe| {
            for endpoint in [pipe.source, pipe.target] {
                if !blocks.contains_key(&endpoint) {
                    faults.push(DanglingReference::OrphanedPipe {
                        pipe: *pipe_id,
                        missing: endpoint,
                    });
                    return false;
                }
            }
            true
        });

        // Index entries naming pipes that no longer exist or do not touch the block
        let pipes = &self.pipes;
        for (block_id, list) in self.block_to_pipes.iter_mut() {
            list.retain(|pipe_id| {
                let valid = pipes.get(pipe_id).is_some_and(|p| p.involves_block(*block_id));
                if !valid {
                    faults.push(DanglingReference::MissingPipe {
                        block: *block_id,
                        pipe: *pipe_id,
                    });
                }
                valid
            });
        }

        // Pipes missing from an endpoint's index entry
        for pipe in self.pipes.values() {
            for endpoint in [pipe.source, pipe.target] {
                if let Some(list) = self.block_to_pipes.get_mut(&endpoint) {
                    if !list.contains(&pipe.id) {
                        list.push(pipe.id);
                        faults.push(DanglingReference::UnindexedPipe {
                            block: endpoint,
                            pipe: pipe.id,
                        });
                    }
                }
            }
        }

        // Socket flags must mirror the pipe set
        for block in self.blocks.values_mut() {
            let id = block.id;
            let has_in = self.pipes.values().any(|p| p.target == id);
            let has_out = self.pipes.values().any(|p| p.source == id);
            for (direction, expected, actual) in [
                (SocketDirection::Input, has_in, block.input_connected()),
                (SocketDirection::Output, has_out, block.output_connected()),
            ] {
                if expected != actual {
                    block.set_socket_connected(direction, expected);
                    faults.push(DanglingReference::StaleSocketFlag {
                        block: id,
                        direction,
                    });
                }
            }
        }

        for fault in &faults {
            tracing::error!(%fault, "repaired connection graph");
        }
        faults
    }

    fn attach(&mut self, pipe: Pipe) -> PipeId {
        let id = pipe.id;
        if let Some(block) = self.blocks.get_mut(&pipe.source) {
            block.set_socket_connected(SocketDirection::Output, true);
        }
        if let Some(block) = self.blocks.get_mut(&pipe.target) {
            block.set_socket_connected(SocketDirection::Input, true);
        }
        self.block_to_pipes.entry(pipe.source).or_default().push(id);
        self.block_to_pipes.entry(pipe.target).or_default().push(id);
        self.pipes.insert(id, pipe);
        id
    }

    fn detach(&mut self, pipe_id: PipeId) -> Option<DetachedPipe> {
        let (index, _, pipe) = self.pipes.shift_remove_full(&pipe_id)?;

        if let Some(block) = self.blocks.get_mut(&pipe.source) {
            block.set_socket_connected(SocketDirection::Output, false);
        }
        if let Some(block) = self.blocks.get_mut(&pipe.target) {
            block.set_socket_connected(SocketDirection::Input, false);
        }
        let source_slot = self.unindex(pipe.source, pipe_id);
        let target_slot = self.unindex(pipe.target, pipe_id);

        Some(DetachedPipe {
            pipe,
            index,
            source_slot,
            target_slot,
        })
    }

    fn restore(&mut self, detached: DetachedPipe) {
        let DetachedPipe {
            pipe,
            index,
            source_slot,
            target_slot,
        } = detached;

        if let Some(block) = self.blocks.get_mut(&pipe.source) {
            block.set_socket_connected(SocketDirection::Output, true);
        }
        if let Some(block) = self.blocks.get_mut(&pipe.target) {
            block.set_socket_connected(SocketDirection::Input, true);
        }
        self.reindex(pipe.source, pipe.id, source_slot);
        self.reindex(pipe.target, pipe.id, target_slot);

        let index = index.min(self.pipes.len());
        self.pipes.shift_insert(index, pipe.id, pipe);
    }

    fn unindex(&mut self, block_id: BlockId, pipe_id: PipeId) -> Option<usize> {
        let list = self.block_to_pipes.get_mut(&block_id)?;
        let slot = list.iter().position(|id| *id == pipe_id)?;
        list.remove(slot);
        Some(slot)
    }

    fn reindex(&mut self, block_id: BlockId, pipe_id: PipeId, slot: Option<usize>) {
        let list = self.block_to_pipes.entry(block_id).or_default();
        match slot {
            Some(slot) if slot <= list.len() => list.insert(slot, pipe_id),
            _ => list.push(pipe_id),
        }
    }
}

/// Error when creating a pipe
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// Source and target are the same block
    #[error("Cannot connect block {0} to itself")]
    SelfConnection(BlockId),

    /// Endpoint is not in the block layer (missing, or sitting in the palette)
    #[error("Block {0} is not in the graph layer")]
    NotInGraph(BlockId),

    /// Endpoint lacks the needed socket
    #[error("Block {block} has no {direction:?} socket")]
    InvalidSocket {
        /// Offending block
        block: BlockId,
        /// Missing socket
        direction: SocketDirection,
    },

    /// Socket already carries a pipe
    #[error("{direction:?} socket of block {block} is already connected")]
    AlreadyConnected {
        /// Offending block
        block: BlockId,
        /// Occupied socket
        direction: SocketDirection,
    },

    /// The pipe would close a loop
    #[error("Connecting {from} -> {to} would create a cycle")]
    WouldCycle {
        /// Requested source
        from: BlockId,
        /// Requested target
        to: BlockId,
    },
}

/// Which half of a splice failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceStage {
    /// Old source into the new block
    Upstream,
    /// New block into the old target
    Downstream,
}

impl fmt::Display for SpliceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream => f.write_str("upstream"),
            Self::Downstream => f.write_str("downstream"),
        }
    }
}

/// Error when splicing a block into a pipe. The graph is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InsertError {
    /// The pipe no longer exists
    #[error("Pipe not found: {0}")]
    PipeNotFound(PipeId),

    /// A block involved is not in the graph layer
    #[error("Splice endpoint missing: {0}")]
    EndpointMissing(BlockId),

    /// The block is already one of the pipe's endpoints
    #[error("Block {0} is an endpoint of the pipe")]
    SelfInsertion(BlockId),

    /// One of the new pipes could not be made; the original was restored
    #[error("Splice failed at {stage} pipe and was rolled back: {cause}")]
    PartialFailureRolledBack {
        /// Which new pipe failed
        stage: SpliceStage,
        /// Why
        #[source]
        cause: ConnectError,
    },
}

/// Internal consistency fault found by [`ConnectionGraph::repair`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DanglingReference {
    /// Index entry for a block not in the layer
    #[error("Index entry for unknown block {0}")]
    UnknownBlockEntry(BlockId),

    /// Pipe whose endpoint left the layer
    #[error("Pipe {pipe} references missing block {missing}")]
    OrphanedPipe {
        /// Dropped pipe
        pipe: PipeId,
        /// Missing endpoint
        missing: BlockId,
    },

    /// Index entry naming a pipe that does not exist or does not touch the block
    #[error("Block {block} indexes missing pipe {pipe}")]
    MissingPipe {
        /// Block whose entry was wrong
        block: BlockId,
        /// Dropped pipe ID
        pipe: PipeId,
    },

    /// Pipe absent from an endpoint's index entry
    #[error("Pipe {pipe} was not indexed under block {block}")]
    UnindexedPipe {
        /// Block whose entry was missing the pipe
        block: BlockId,
        /// Re-indexed pipe
        pipe: PipeId,
    },

    /// Socket flag out of sync with the pipe set
    #[error("{direction:?} socket flag of block {block} was stale")]
    StaleSocketFlag {
        /// Block
        block: BlockId,
        /// Socket
        direction: SocketDirection,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockRegistry;
    use crate::geometry::StraightGeometry;
    use crate::interaction::{InteractionMachine, InteractionState};

    fn add(graph: &mut ConnectionGraph, template: &str, label: &str, x: f32) -> BlockId {
        let registry = BlockRegistry::with_builtins();
        let block = registry
            .create_block(template, label)
            .unwrap()
            .with_position([x, 0.0]);
        graph.add_block(block)
    }

    /// Input -> Output plus a free `add` block
    fn simple() -> (ConnectionGraph, BlockId, BlockId, BlockId, PipeId) {
        let mut graph = ConnectionGraph::new();
        let input = add(&mut graph, "input", "input0", 0.0);
        let output = add(&mut graph, "output", "output0", 200.0);
        let free = add(&mut graph, "add", "add0", 100.0);
        let pipe = graph.connect(input, output).unwrap();
        (graph, input, output, free, pipe)
    }

    #[test]
    fn test_connect_sets_flags() {
        let (graph, input, output, _, pipe) = simple();
        assert!(graph.block(input).unwrap().output_connected());
        assert!(graph.block(output).unwrap().input_connected());
        assert_eq!(graph.pipes_for(input).count(), 1);
        assert_eq!(graph.pipes_for(output).count(), 1);
        assert_eq!(graph.next_hop(input), Some((output, pipe)));
        assert_eq!(graph.next_hop(output), None);
    }

    #[test]
    fn test_connect_rejections() {
        let (mut graph, input, output, free, _) = simple();

        assert_eq!(graph.connect(free, free), Err(ConnectError::SelfConnection(free)));
        assert!(matches!(
            graph.connect(output, free),
            Err(ConnectError::InvalidSocket { direction: SocketDirection::Output, .. })
        ));
        assert!(matches!(
            graph.connect(free, input),
            Err(ConnectError::InvalidSocket { direction: SocketDirection::Input, .. })
        ));
        assert!(matches!(
            graph.connect(input, free),
            Err(ConnectError::AlreadyConnected { direction: SocketDirection::Output, .. })
        ));
        assert!(matches!(
            graph.connect(free, output),
            Err(ConnectError::AlreadyConnected { direction: SocketDirection::Input, .. })
        ));

        let outsider = BlockId::new();
        assert_eq!(graph.connect(outsider, free), Err(ConnectError::NotInGraph(outsider)));
        assert_eq!(graph.pipe_count(), 1);
    }

    #[test]
    fn test_connect_rejects_cycles() {
        let mut graph = ConnectionGraph::new();
        let a = add(&mut graph, "add", "a", 0.0);
        let b = add(&mut graph, "add", "b", 1.0);
        let c = add(&mut graph, "add", "c", 2.0);
        graph.connect(a, b).unwrap();
        graph.connect(b, c).unwrap();
        assert_eq!(graph.connect(c, a), Err(ConnectError::WouldCycle { from: c, to: a }));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let (mut graph, input, output, _, _) = simple();
        let removed = graph.disconnect(input);
        assert_eq!(removed.len(), 1);
        assert!(!graph.block(input).unwrap().output_connected());
        assert!(!graph.block(output).unwrap().input_connected());

        let snapshot = graph.clone();
        assert!(graph.disconnect(input).is_empty());
        assert_eq!(graph, snapshot);
    }

    #[test]
    fn test_insert_into_pipe() {
        let (mut graph, input, output, free, pipe) = simple();
        graph.block_mut(free).unwrap().interaction_mut().send(InteractionEvent::Interact);

        let splice = graph.insert_into_pipe(free, pipe).unwrap();
        assert!(graph.pipe(pipe).is_none());
        assert_eq!(graph.pipe_count(), 2);
        assert_eq!(graph.next_hop(input), Some((free, splice.upstream)));
        assert_eq!(graph.next_hop(free), Some((output, splice.downstream)));
        assert_eq!(splice.transition.map(|t| t.to), Some(InteractionState::Connected));
        assert_eq!(graph.block(free).unwrap().state(), InteractionState::Connected);
    }

    #[test]
    fn test_insert_rolls_back_on_downstream_failure() {
        let (mut graph, _, _, _, pipe) = simple();
        // A second output block has an input socket but no output socket
        let sink = add(&mut graph, "output", "output1", 100.0);
        let before = graph.clone();

        let err = graph.insert_into_pipe(sink, pipe).unwrap_err();
        assert!(matches!(
            err,
            InsertError::PartialFailureRolledBack { stage: SpliceStage::Downstream, .. }
        ));
        assert_eq!(graph, before);
    }

    #[test]
    fn test_insert_rolls_back_on_upstream_failure() {
        let (mut graph, _, _, _, pipe) = simple();
        let source = add(&mut graph, "input", "input1", 100.0);
        let before = graph.clone();

        let err = graph.insert_into_pipe(source, pipe).unwrap_err();
        assert!(matches!(
            err,
            InsertError::PartialFailureRolledBack { stage: SpliceStage::Upstream, .. }
        ));
        assert_eq!(graph, before);
    }

    #[test]
    fn test_insert_validation() {
        let (mut graph, input, _, free, pipe) = simple();
        assert_eq!(graph.insert_into_pipe(input, pipe), Err(InsertError::SelfInsertion(input)));

        let missing = PipeId::new();
        assert_eq!(graph.insert_into_pipe(free, missing), Err(InsertError::PipeNotFound(missing)));

        let outsider = BlockId::new();
        assert_eq!(graph.insert_into_pipe(outsider, pipe), Err(InsertError::EndpointMissing(outsider)));
    }

    #[test]
    fn test_remove_from_chain_rejoins() {
        let (mut graph, input, output, free, pipe) = simple();
        graph.insert_into_pipe(free, pipe).unwrap();

        let bridge = graph.remove_from_chain(free).unwrap();
        assert_eq!(graph.next_hop(input), Some((output, bridge)));
        assert!(!graph.is_connected(free));
        assert!(!graph.block(free).unwrap().has_connections());
        assert_eq!(graph.pipe_count(), 1);
    }

    #[test]
    fn test_remove_from_chain_degrades_to_disconnect() {
        let (mut graph, input, output, _, _) = simple();
        assert_eq!(graph.remove_from_chain(input), None);
        assert_eq!(graph.pipe_count(), 0);
        assert!(!graph.block(output).unwrap().input_connected());
    }

    #[test]
    fn test_take_block_detaches() {
        let (mut graph, input, output, _, _) = simple();
        let taken = graph.take_block(output).unwrap();
        assert!(!taken.has_connections());
        assert_eq!(graph.pipe_count(), 0);
        assert!(!graph.block(input).unwrap().output_connected());
        assert!(graph.take_block(output).is_none());
    }

    #[test]
    fn test_nearest_pipe() {
        let (graph, _, _, _, pipe) = simple();
        let geometry = StraightGeometry;
        assert_eq!(graph.nearest_pipe([100.0, 10.0], 50.0, &geometry), Some(pipe));
        assert_eq!(graph.nearest_pipe([100.0, 80.0], 50.0, &geometry), None);
    }

    #[test]
    fn test_hover_flags() {
        let (mut graph, _, _, _, pipe) = simple();
        graph.set_hovered_pipe(Some(pipe), true);
        assert_eq!(graph.hovered_pipe(), Some(pipe));
        assert!(graph.pipe(pipe).unwrap().highlighted);

        graph.clear_highlights();
        assert_eq!(graph.hovered_pipe(), None);
        assert!(!graph.pipe(pipe).unwrap().highlighted);
    }

    #[test]
    fn test_repair_drops_dangling_entries() {
        let (mut graph, input, output, _, pipe) = simple();
        // Corrupt the index behind the graph's back
        graph.pipes.shift_remove(&pipe);
        let ghost = BlockId::new();
        graph.block_to_pipes.insert(ghost, Vec::new());

        let faults = graph.repair();
        assert!(faults.contains(&DanglingReference::UnknownBlockEntry(ghost)));
        assert!(faults.contains(&DanglingReference::MissingPipe { block: input, pipe }));
        assert!(faults.contains(&DanglingReference::MissingPipe { block: output, pipe }));
        assert!(!graph.block(input).unwrap().output_connected());
        assert!(!graph.block(output).unwrap().input_connected());

        // A clean graph needs no repairs
        assert!(graph.repair().is_empty());
    }

    #[test]
    fn test_add_block_clears_stale_flags() {
        let registry = BlockRegistry::with_builtins();
        let mut block = registry.create_block("add", "add0").unwrap();
        block.set_socket_connected(SocketDirection::Input, true);
        *block.interaction_mut() = InteractionMachine::with_state(InteractionState::Placed);

        let mut graph = ConnectionGraph::new();
        let id = graph.add_block(block);
        assert!(!graph.block(id).unwrap().has_connections());
    }
}
