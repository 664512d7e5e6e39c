// SPDX-License-Identifier: MIT OR Apache-2.0
//! Block definitions and the template registry.

use crate::geometry::Point;
use crate::interaction::{InteractionMachine, InteractionState};
use crate::socket::{Socket, SocketDirection};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Value a source block emits when its template does not name one
pub const DEFAULT_INPUT_VALUE: f32 = 1.0;

/// Unique identifier for a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub Uuid);

impl BlockId {
    /// Create a new random block ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Block kind. Fixes which sockets a block has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    /// Token source, output socket only
    Input,
    /// Token sink, input socket only
    Output,
    /// Transforming block with both sockets
    Operator,
}

impl BlockKind {
    /// Whether blocks of this kind have an input socket
    pub fn has_input(self) -> bool {
        matches!(self, Self::Output | Self::Operator)
    }

    /// Whether blocks of this kind have an output socket
    pub fn has_output(self) -> bool {
        matches!(self, Self::Input | Self::Operator)
    }
}

/// Pure value transformation applied when a token arrives at a block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Transform {
    /// Pass the value through
    #[default]
    Identity,
    /// `value + c`
    Add(f32),
    /// `value - c`
    Subtract(f32),
    /// `value * c`
    Multiply(f32),
    /// `value / c`; a zero divisor leaves the value unchanged
    Divide(f32),
    /// `-value`
    Negate,
    /// `|value|`
    Abs,
    /// `value * value`
    Square,
    /// Clamp into `[min, max]`
    Clamp {
        /// Lower bound
        min: f32,
        /// Upper bound
        max: f32,
    },
}

impl Transform {
    /// Apply the transform to a value
    pub fn apply(&self, value: f32) -> f32 {
        match *self {
            Self::Identity => value,
            Self::Add(c) => value + c,
            Self::Subtract(c) => value - c,
            Self::Multiply(c) => value * c,
            Self::Divide(c) => {
                if c == 0.0 {
                    value
                } else {
                    value / c
                }
            }
            Self::Negate => -value,
            Self::Abs => value.abs(),
            Self::Square => value * value,
            Self::Clamp { min, max } => value.max(min).min(max),
        }
    }
}

/// Block template definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockTemplate {
    /// Unique template identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Kind
    pub kind: BlockKind,
    /// Transform applied on token arrival
    #[serde(default)]
    pub transform: Transform,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Emitted value for source blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<f32>,
}

impl BlockTemplate {
    /// Create a new template
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: BlockKind,
        transform: Transform,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            transform,
            description: String::new(),
            default_value: None,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the emitted value (source blocks)
    pub fn with_default_value(mut self, value: f32) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// A block instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Unique instance ID
    pub id: BlockId,
    /// Template ID
    pub template: String,
    /// Human readable label, unique within a session
    pub label: String,
    /// Kind
    pub kind: BlockKind,
    /// Transform applied on token arrival
    pub transform: Transform,
    /// Value emitted by source blocks
    pub value: f32,
    /// Position in the block layer
    pub position: Point,
    /// Pinned blocks ignore gestures (the fixed source and sink)
    pub pinned: bool,
    input: Option<Socket>,
    output: Option<Socket>,
    interaction: InteractionMachine,
}

impl Block {
    /// Create a new block from a template
    pub fn new(template: &BlockTemplate, label: impl Into<String>) -> Self {
        let kind = template.kind;
        Self {
            id: BlockId::new(),
            template: template.id.clone(),
            label: label.into(),
            kind,
            transform: match kind {
                BlockKind::Output => Transform::Identity,
                _ => template.transform,
            },
            value: template.default_value.unwrap_or(DEFAULT_INPUT_VALUE),
            position: [0.0, 0.0],
            pinned: false,
            input: kind.has_input().then(Socket::input),
            output: kind.has_output().then(Socket::output),
            interaction: InteractionMachine::new(),
        }
    }

    /// Set the position
    pub fn with_position(mut self, position: Point) -> Self {
        self.position = position;
        self
    }

    /// Whether the block has an input socket
    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    /// Whether the block has an output socket
    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// Whether a pipe ends on the input socket
    pub fn input_connected(&self) -> bool {
        self.input.is_some_and(|s| s.is_connected())
    }

    /// Whether a pipe starts on the output socket
    pub fn output_connected(&self) -> bool {
        self.output.is_some_and(|s| s.is_connected())
    }

    /// Whether any socket is occupied
    pub fn has_connections(&self) -> bool {
        self.input_connected() || self.output_connected()
    }

    /// Run the block's transform on a token value
    pub fn process(&self, value: f32) -> f32 {
        self.transform.apply(value)
    }

    /// Current interaction state
    pub fn state(&self) -> InteractionState {
        self.interaction.state()
    }

    pub(crate) fn interaction_mut(&mut self) -> &mut InteractionMachine {
        &mut self.interaction
    }

    /// Flip a socket's connection flag. No-op if the socket does not exist.
    pub(crate) fn set_socket_connected(&mut self, direction: SocketDirection, connected: bool) {
        let socket = match direction {
            SocketDirection::Input => self.input.as_mut(),
            SocketDirection::Output => self.output.as_mut(),
        };
        if let Some(socket) = socket {
            socket.set_connected(connected);
        }
    }
}

/// Registry of available block templates
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    /// Registered templates by ID
    templates: IndexMap<String, BlockTemplate>,
}

impl BlockRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            templates: IndexMap::new(),
        }
    }

    /// Create a registry holding the built-in templates
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            BlockTemplate::new("input", "Input", BlockKind::Input, Transform::Identity)
                .with_description("Emits a token carrying its value")
                .with_default_value(DEFAULT_INPUT_VALUE),
        );
        registry.register(
            BlockTemplate::new("output", "Output", BlockKind::Output, Transform::Identity)
                .with_description("Displays the value of arriving tokens"),
        );
        registry.register(
            BlockTemplate::new("add", "Add Block", BlockKind::Operator, Transform::Add(1.0))
                .with_description("Adds a value to token"),
        );
        registry.register(
            BlockTemplate::new(
                "multiply",
                "Multiply Block",
                BlockKind::Operator,
                Transform::Multiply(2.0),
            )
            .with_description("Multiplies token value"),
        );
        registry
    }

    /// Register a template, replacing one with the same ID
    pub fn register(&mut self, template: BlockTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    /// Get a template by ID
    pub fn get(&self, id: &str) -> Option<&BlockTemplate> {
        self.templates.get(id)
    }

    /// Create a block from a template ID
    pub fn create_block(&self, template_id: &str, label: impl Into<String>) -> Option<Block> {
        self.get(template_id).map(|t| Block::new(t, label))
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sockets_follow_kind() {
        let registry = BlockRegistry::with_builtins();
        let input = registry.create_block("input", "input0").unwrap();
        let output = registry.create_block("output", "output0").unwrap();
        let add = registry.create_block("add", "add0").unwrap();

        assert!(!input.has_input() && input.has_output());
        assert!(output.has_input() && !output.has_output());
        assert!(add.has_input() && add.has_output());
        assert!(!add.has_connections());
    }

    #[test]
    fn test_output_blocks_are_identity() {
        let template = BlockTemplate::new("sink", "Sink", BlockKind::Output, Transform::Multiply(3.0));
        let block = Block::new(&template, "sink0");
        assert_eq!(block.process(4.0), 4.0);
    }

    #[test]
    fn test_transforms() {
        assert_eq!(Transform::Add(1.0).apply(1.0), 2.0);
        assert_eq!(Transform::Subtract(0.5).apply(1.0), 0.5);
        assert_eq!(Transform::Multiply(2.0).apply(3.0), 6.0);
        assert_eq!(Transform::Divide(2.0).apply(3.0), 1.5);
        assert_eq!(Transform::Divide(0.0).apply(3.0), 3.0);
        assert_eq!(Transform::Negate.apply(3.0), -3.0);
        assert_eq!(Transform::Abs.apply(-3.0), 3.0);
        assert_eq!(Transform::Square.apply(-3.0), 9.0);
        assert_eq!(Transform::Clamp { min: 0.0, max: 1.0 }.apply(7.0), 1.0);
    }

    #[test]
    fn test_socket_flags() {
        let registry = BlockRegistry::with_builtins();
        let mut block = registry.create_block("add", "add0").unwrap();
        block.set_socket_connected(SocketDirection::Output, true);
        assert!(block.output_connected());
        assert!(!block.input_connected());

        // Input blocks have no input socket to flip
        let mut input = registry.create_block("input", "input0").unwrap();
        input.set_socket_connected(SocketDirection::Input, true);
        assert!(!input.input_connected());
    }

    #[test]
    fn test_default_value() {
        let registry = BlockRegistry::with_builtins();
        let input = registry.create_block("input", "input0").unwrap();
        assert_eq!(input.value, DEFAULT_INPUT_VALUE);

        let template = BlockTemplate::new("five", "Five", BlockKind::Input, Transform::Identity)
            .with_default_value(5.0);
        assert_eq!(Block::new(&template, "five0").value, 5.0);
        assert!(registry.create_block("missing", "x").is_none());
    }
}
