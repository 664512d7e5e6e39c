// SPDX-License-Identifier: MIT OR Apache-2.0
//! Block/pipe dataflow graph for `BlockFlow`.
//!
//! This crate provides the simulation core:
//! - Blocks with optional input/output sockets and value transforms
//! - The connection graph (connect, disconnect, splice in and out)
//! - Per-block interaction state machine for palette/drag gestures
//! - Token traversal along pipes, one hop per dispatch
//!
//! ## Architecture
//!
//! A [`Session`] owns everything: the [`BlockRegistry`], the [`Palette`],
//! the [`ConnectionGraph`] and the [`TraversalEngine`]. Gestures mutate the
//! graph; the engine only reads it, looking up each hop at dispatch time.
//! Observers collect [`FlowEvent`]s from the session.

pub mod block;
pub mod events;
pub mod geometry;
pub mod graph;
pub mod interaction;
pub mod palette;
pub mod pipe;
pub mod session;
pub mod settings;
pub mod socket;
pub mod traversal;

pub use block::{Block, BlockId, BlockKind, BlockRegistry, BlockTemplate, Transform};
pub use events::{EventSink, FlowEvent};
pub use geometry::{BezierGeometry, PipeGeometry, Point, StraightGeometry};
pub use graph::{ConnectError, ConnectionGraph, DanglingReference, InsertError, Splice, SpliceStage};
pub use interaction::{InteractionEvent, InteractionMachine, InteractionState, Transition};
pub use palette::Palette;
pub use pipe::{Pipe, PipeId};
pub use session::{Session, SessionError};
pub use settings::{FlowSettings, InteractionSettings, PipeSettings, TraversalSettings};
pub use socket::{Socket, SocketDirection};
pub use traversal::{SpawnError, Token, TokenFate, TokenId, TraversalEngine};
