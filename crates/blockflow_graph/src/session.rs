// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session: the owning context for one editing/simulation run.
//!
//! A [`Session`] owns the template registry, the palette, the connection
//! graph, the traversal engine and the event buffer. Gestures arrive as
//! method calls ([`Session::interact`], [`Session::drag_to`],
//! [`Session::return_to_palette`]); each one validates against the block's
//! interaction state, mutates the containers and the graph, and records the
//! resulting transition.

use crate::block::{Block, BlockId, BlockKind, BlockRegistry};
use crate::events::{EventSink, FlowEvent};
use crate::geometry::{polyline_distance, PipeGeometry, Point};
use crate::graph::{ConnectError, ConnectionGraph};
use crate::interaction::{InteractionEvent, InteractionMachine, InteractionState, Transition};
use crate::palette::Palette;
use crate::pipe::PipeId;
use crate::settings::FlowSettings;
use crate::traversal::{SpawnError, TokenId, TraversalEngine};
use indexmap::IndexMap;

/// Owning context binding registry, palette, graph and traversal engine
pub struct Session {
    registry: BlockRegistry,
    palette: Palette,
    graph: ConnectionGraph,
    engine: TraversalEngine,
    geometry: Box<dyn PipeGeometry>,
    settings: FlowSettings,
    events: Vec<FlowEvent>,
    /// Block currently following the pointer
    dragged: Option<BlockId>,
    /// Pinned source block, once bootstrapped
    source: Option<BlockId>,
    /// Pinned sink block, once bootstrapped
    sink: Option<BlockId>,
    /// Next label number per template
    label_counters: IndexMap<String, usize>,
}

impl Session {
    /// Create a session with the given templates and settings
    pub fn new(registry: BlockRegistry, settings: FlowSettings) -> Self {
        Self {
            registry,
            palette: Palette::new(),
            graph: ConnectionGraph::new(),
            engine: TraversalEngine::new(settings.traversal),
            geometry: Box::new(settings.pipes.geometry()),
            settings,
            events: Vec::new(),
            dragged: None,
            source: None,
            sink: None,
            label_counters: IndexMap::new(),
        }
    }

    /// Replace the pipe geometry
    pub fn with_geometry(mut self, geometry: impl PipeGeometry + 'static) -> Self {
        self.geometry = Box::new(geometry);
        self
    }

    /// Template registry
    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// Palette contents
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Connection graph
    pub fn graph(&self) -> &ConnectionGraph {
        &self.graph
    }

    /// Traversal engine
    pub fn engine(&self) -> &TraversalEngine {
        &self.engine
    }

    /// Settings
    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    /// Pipe geometry in use
    pub fn geometry(&self) -> &dyn PipeGeometry {
        self.geometry.as_ref()
    }

    /// Block currently being dragged
    pub fn dragged(&self) -> Option<BlockId> {
        self.dragged
    }

    /// Pinned source block
    pub fn source(&self) -> Option<BlockId> {
        self.source
    }

    /// Pinned sink block
    pub fn sink(&self) -> Option<BlockId> {
        self.sink
    }

    /// Get a block from either container
    pub fn block(&self, block_id: BlockId) -> Option<&Block> {
        self.graph.block(block_id).or_else(|| self.palette.get(block_id))
    }

    /// Find a block by label in either container
    pub fn find_block(&self, label: &str) -> Option<BlockId> {
        self.graph
            .find_by_label(label)
            .or_else(|| self.palette.find_by_label(label))
            .map(|b| b.id)
    }

    /// Polyline of a pipe under the session's geometry
    pub fn pipe_curve(&self, pipe_id: PipeId) -> Option<Vec<Point>> {
        self.graph.pipe_curve(pipe_id, self.geometry.as_ref())
    }

    /// Events recorded so far, without draining them
    pub fn events(&self) -> &[FlowEvent] {
        &self.events
    }

    /// Hand all recorded events to the caller
    pub fn drain_events(&mut self) -> Vec<FlowEvent> {
        std::mem::take(&mut self.events)
    }

    fn create(&mut self, template: &str) -> Result<Block, SessionError> {
        let template = self
            .registry
            .get(template)
            .ok_or_else(|| SessionError::UnknownTemplate(template.to_string()))?;
        let counter = self.label_counters.entry(template.id.clone()).or_insert(0);
        let label = format!("{}{}", template.id, counter);
        *counter += 1;
        Ok(Block::new(template, label))
    }

    /// Put one block of each listed template into the palette
    pub fn stock_palette<S: AsRef<str>>(
        &mut self,
        templates: &[S],
    ) -> Result<Vec<BlockId>, SessionError> {
        templates
            .iter()
            .map(|t| self.spawn_in_palette(t.as_ref()))
            .collect()
    }

    /// Create a block in the palette
    pub fn spawn_in_palette(&mut self, template: &str) -> Result<BlockId, SessionError> {
        let block = self.create(template)?;
        tracing::debug!(block = %block.id, label = %block.label, "block added to palette");
        Ok(self.palette.insert(block))
    }

    /// Create a pinned block straight into the graph layer
    pub fn spawn_into_graph(
        &mut self,
        template: &str,
        position: Point,
    ) -> Result<BlockId, SessionError> {
        let mut block = self.create(template)?.with_position(position);
        block.pinned = true;
        *block.interaction_mut() = InteractionMachine::with_state(InteractionState::Placed);
        tracing::debug!(block = %block.id, label = %block.label, "pinned block placed");
        Ok(self.graph.add_block(block))
    }

    /// Place the pinned Input and Output blocks and connect them
    pub fn bootstrap(
        &mut self,
        input_position: Point,
        output_position: Point,
    ) -> Result<(BlockId, BlockId), SessionError> {
        let input = self.spawn_into_graph("input", input_position)?;
        let output = self.spawn_into_graph("output", output_position)?;
        self.graph.connect(input, output)?;
        self.source = Some(input);
        self.sink = Some(output);
        tracing::info!(%input, %output, "session bootstrapped");
        Ok((input, output))
    }

    /// Primary click on a block at `point`: pick up, drop, or splice.
    ///
    /// Returns the resulting transition, or `None` if the gesture was
    /// ignored (pinned block, another block already dragged, or an event the
    /// block's state does not accept).
    pub fn interact(
        &mut self,
        block_id: BlockId,
        point: Point,
    ) -> Result<Option<Transition>, SessionError> {
        let Some(block) = self.block(block_id) else {
            return Err(SessionError::BlockNotFound(block_id));
        };
        if block.pinned {
            tracing::debug!(block = %block_id, "ignoring gesture on pinned block");
            return Ok(None);
        }
        if self.dragged.is_some_and(|d| d != block_id) {
            tracing::debug!(block = %block_id, "another block is being dragged");
            return Ok(None);
        }

        let transition = match block.state() {
            InteractionState::InToolbar => self.pick_from_palette(block_id, point),
            InteractionState::Dragging => self.drop_free(block_id, point),
            InteractionState::Placed | InteractionState::Connected => {
                let transition = self.send(block_id, InteractionEvent::Interact);
                self.move_block(block_id, point);
                self.dragged = Some(block_id);
                transition
            }
            InteractionState::ConnectedAndDragging => self.drop_connected(block_id, point),
        };

        self.record(block_id, transition);
        Ok(transition)
    }

    fn pick_from_palette(&mut self, block_id: BlockId, point: Point) -> Option<Transition> {
        let mut block = self.palette.take(block_id)?.with_position(point);
        let transition = block.interaction_mut().send(InteractionEvent::Interact);
        self.graph.add_block(block);
        self.dragged = Some(block_id);
        tracing::debug!(block = %block_id, "picked up from palette");
        transition
    }

    fn drop_free(&mut self, block_id: BlockId, point: Point) -> Option<Transition> {
        self.move_block(block_id, point);
        self.dragged = None;
        self.graph.clear_highlights();

        let hover = self.settings.interaction.hover_distance;
        if let Some(pipe) = self.graph.nearest_pipe(point, hover, self.geometry.as_ref()) {
            match self.graph.insert_into_pipe(block_id, pipe) {
                Ok(splice) => {
                    tracing::info!(block = %block_id, "block connected");
                    return splice.transition;
                }
                Err(e) => tracing::debug!(block = %block_id, error = %e, "drop without connecting"),
            }
        }
        self.send(block_id, InteractionEvent::Interact)
    }

    fn drop_connected(&mut self, block_id: BlockId, point: Point) -> Option<Transition> {
        self.move_block(block_id, point);
        self.graph.clear_highlights();
        self.dragged = None;

        // Neighbours were removed underneath it; let it splice like a free block
        if self.graph.pipes_for(block_id).next().is_none() {
            let hover = self.settings.interaction.hover_distance;
            if let Some(pipe) = self.graph.nearest_pipe(point, hover, self.geometry.as_ref()) {
                match self.graph.insert_into_pipe(block_id, pipe) {
                    Ok(_) => tracing::info!(block = %block_id, "orphaned block reconnected"),
                    Err(e) => tracing::debug!(block = %block_id, error = %e, "drop without connecting"),
                }
            }
        }
        self.send(block_id, InteractionEvent::Interact)
    }

    /// Move the dragged block to `point` and refresh pipe hover flags
    pub fn drag_to(&mut self, point: Point) -> Option<PipeId> {
        let block_id = self.dragged?;
        self.move_block(block_id, point);
        let state = self.graph.block(block_id)?.state();

        let geometry = self.geometry.as_ref();
        let hovered = if state.is_connected() {
            // A connected block drags its pipes along; only its own pipes can be hovered
            let radius = self.settings.interaction.connected_distance;
            self.graph
                .pipes_for(block_id)
                .filter_map(|p| {
                    let curve = self.graph.pipe_curve(p.id, geometry)?;
                    polyline_distance(point, &curve).map(|d| (p.id, d))
                })
                .filter(|(_, d)| *d <= radius)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(id, _)| id)
        } else {
            let radius = self.settings.interaction.hover_distance;
            self.graph.nearest_pipe(point, radius, geometry)
        };

        self.graph.set_hovered_pipe(hovered, !state.is_connected());
        hovered
    }

    /// Send a block back to the palette
    pub fn return_to_palette(&mut self, block_id: BlockId) -> Result<Option<Transition>, SessionError> {
        if self.palette.contains(block_id) {
            return Ok(None);
        }
        let block = self.graph.block(block_id).ok_or(SessionError::BlockNotFound(block_id))?;
        if block.pinned {
            tracing::debug!(block = %block_id, "ignoring return of pinned block");
            return Ok(None);
        }

        if self.settings.interaction.heal_chain_on_return {
            self.graph.remove_from_chain(block_id);
        } else {
            self.graph.disconnect(block_id);
        }
        self.engine.evict(block_id, &mut self.events);

        let Some(mut block) = self.graph.take_block(block_id) else {
            return Err(SessionError::BlockNotFound(block_id));
        };
        let transition = block.interaction_mut().send(InteractionEvent::ReturnToPalette);
        self.palette.insert(block);
        if self.dragged == Some(block_id) {
            self.dragged = None;
        }
        self.graph.clear_highlights();
        tracing::debug!(block = %block_id, "returned to palette");

        self.record(block_id, transition);
        Ok(transition)
    }

    /// Delete a block from whichever container holds it.
    ///
    /// A block deleted from the middle of a chain is healed out of it the
    /// same way [`Session::return_to_palette`] does.
    pub fn remove_block(&mut self, block_id: BlockId) -> Result<Block, SessionError> {
        if self.graph.contains_block(block_id) {
            if self.settings.interaction.heal_chain_on_return {
                self.graph.remove_from_chain(block_id);
            } else {
                self.graph.disconnect(block_id);
            }
        }
        let block = match self.graph.take_block(block_id) {
            Some(block) => {
                self.engine.evict(block_id, &mut self.events);
                block
            }
            None => self
                .palette
                .take(block_id)
                .ok_or(SessionError::BlockNotFound(block_id))?,
        };

        if self.dragged == Some(block_id) {
            self.dragged = None;
        }
        if self.source == Some(block_id) {
            self.source = None;
        }
        if self.sink == Some(block_id) {
            self.sink = None;
        }
        tracing::info!(block = %block_id, label = %block.label, "block removed");
        Ok(block)
    }

    /// Set the value a source block emits
    pub fn set_value(&mut self, block_id: BlockId, value: f32) -> Result<(), SessionError> {
        let block = self
            .graph
            .block_mut(block_id)
            .ok_or(SessionError::BlockNotFound(block_id))?;
        if block.kind != BlockKind::Input {
            return Err(SessionError::Spawn(SpawnError::NotASource(block_id)));
        }
        block.value = value;
        Ok(())
    }

    /// Spawn a token on a source block
    pub fn trigger(&mut self, source: BlockId) -> Result<TokenId, SessionError> {
        let token = self
            .engine
            .spawn(&self.graph, self.geometry.as_ref(), source, &mut self.events)?;
        Ok(token)
    }

    /// Spawn a token on the pinned source block
    pub fn trigger_source(&mut self) -> Result<TokenId, SessionError> {
        let source = self.source.ok_or(SessionError::NoSource)?;
        self.trigger(source)
    }

    /// Destroy every token in flight
    pub fn clear_tokens(&mut self) -> usize {
        let cleared = self.engine.clear(&mut self.events);
        if cleared > 0 {
            tracing::info!(count = cleared, "tokens cleared");
        }
        cleared
    }

    /// Advance the simulation by `dt` seconds
    pub fn tick(&mut self, dt: f32) {
        self.graph.repair();
        self.engine
            .tick(&self.graph, self.geometry.as_ref(), dt, &mut self.events);
    }

    fn move_block(&mut self, block_id: BlockId, point: Point) {
        if let Some(block) = self.graph.block_mut(block_id) {
            block.position = point;
        }
    }

    fn send(&mut self, block_id: BlockId, event: InteractionEvent) -> Option<Transition> {
        self.graph
            .block_mut(block_id)
            .and_then(|b| b.interaction_mut().send(event))
    }

    fn record(&mut self, block_id: BlockId, transition: Option<Transition>) {
        if let Some(t) = transition {
            tracing::debug!(block = %block_id, from = %t.from, to = %t.to, "state changed");
            self.events.emit(FlowEvent::StateChanged {
                block: block_id,
                from: t.from,
                to: t.to,
            });
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(BlockRegistry::with_builtins(), FlowSettings::default())
    }
}

/// Error raised by session operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No template with this ID is registered
    #[error("Unknown block template: {0}")]
    UnknownTemplate(String),

    /// No block with this ID in the palette or the graph
    #[error("Block not found: {0}")]
    BlockNotFound(BlockId),

    /// The session has not been bootstrapped
    #[error("No source block")]
    NoSource,

    /// Token spawn failed
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// Pipe creation failed
    #[error(transparent)]
    Connect(#[from] ConnectError),
}
