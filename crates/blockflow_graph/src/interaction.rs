// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-block interaction state machine.
//!
//! The machine only records where a block is in its palette/graph
//! lifecycle. Side effects (moving the block between containers,
//! splicing it into pipes) are carried out by the [`Session`] that owns
//! the block, which then feeds the matching event here.
//!
//! [`Session`]: crate::session::Session

use serde::{Deserialize, Serialize};
use std::fmt;

/// Interaction state of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InteractionState {
    /// Sitting in the palette
    #[default]
    InToolbar,
    /// Picked up, not part of the graph
    Dragging,
    /// Dropped in the block layer without connections
    Placed,
    /// Spliced into the pipe chain
    Connected,
    /// Spliced into the pipe chain and being moved
    ConnectedAndDragging,
}

impl InteractionState {
    /// Every state, in declaration order
    pub const ALL: [InteractionState; 5] = [
        Self::InToolbar,
        Self::Dragging,
        Self::Placed,
        Self::Connected,
        Self::ConnectedAndDragging,
    ];

    /// Check if the block participates in the pipe chain
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::ConnectedAndDragging)
    }
}

impl fmt::Display for InteractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InToolbar => "InToolbar",
            Self::Dragging => "Dragging",
            Self::Placed => "Placed",
            Self::Connected => "Connected",
            Self::ConnectedAndDragging => "ConnectedAndDragging",
        };
        f.write_str(name)
    }
}

/// Abstract gesture produced by the input layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionEvent {
    /// Primary click: pick up or drop
    Interact,
    /// Send the block back to the palette
    ReturnToPalette,
    /// The block was spliced into the pipe it hovered
    EnterPipeHover,
    /// The pointer left a pipe
    ExitPipeHover,
}

impl InteractionEvent {
    /// Every event, in declaration order
    pub const ALL: [InteractionEvent; 4] = [
        Self::Interact,
        Self::ReturnToPalette,
        Self::EnterPipeHover,
        Self::ExitPipeHover,
    ];
}

/// Transition table. `None` means the event is ignored in that state.
pub fn next_state(state: InteractionState, event: InteractionEvent) -> Option<InteractionState> {
    use InteractionEvent as E;
    use InteractionState as S;

    match (state, event) {
        (S::InToolbar, E::Interact) => Some(S::Dragging),
        (S::Dragging, E::Interact) => Some(S::Placed),
        (S::Dragging, E::EnterPipeHover) => Some(S::Connected),
        (S::Placed, E::Interact) => Some(S::Dragging),
        (S::Connected, E::Interact) => Some(S::ConnectedAndDragging),
        (S::ConnectedAndDragging, E::Interact) => Some(S::Connected),
        (S::Dragging | S::Placed | S::Connected | S::ConnectedAndDragging, E::ReturnToPalette) => {
            Some(S::InToolbar)
        }
        _ => None,
    }
}

/// A state change produced by [`InteractionMachine::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the event
    pub from: InteractionState,
    /// State after the event
    pub to: InteractionState,
    /// Event that caused it
    pub event: InteractionEvent,
}

/// Interaction state machine for one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InteractionMachine {
    state: InteractionState,
}

impl InteractionMachine {
    /// Create a machine in the initial `InToolbar` state
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a machine already in a given state (blocks spawned straight
    /// into the block layer start as `Placed`)
    pub fn with_state(state: InteractionState) -> Self {
        Self { state }
    }

    /// Current state
    pub fn state(&self) -> InteractionState {
        self.state
    }

    /// Feed an event. Returns the transition if the state changed.
    pub fn send(&mut self, event: InteractionEvent) -> Option<Transition> {
        let to = next_state(self.state, event)?;
        let from = self.state;
        self.state = to;
        tracing::trace!(%from, %to, ?event, "interaction transition");
        Some(Transition { from, to, event })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InteractionEvent as E;
    use InteractionState as S;

    #[test]
    fn test_initial_state() {
        assert_eq!(InteractionMachine::new().state(), S::InToolbar);
    }

    #[test]
    fn test_pick_place_cycle() {
        let mut machine = InteractionMachine::new();
        assert_eq!(machine.send(E::Interact).map(|t| t.to), Some(S::Dragging));
        assert_eq!(machine.send(E::Interact).map(|t| t.to), Some(S::Placed));
        assert_eq!(machine.send(E::Interact).map(|t| t.to), Some(S::Dragging));
        assert_eq!(machine.send(E::ReturnToPalette).map(|t| t.to), Some(S::InToolbar));
    }

    #[test]
    fn test_connected_cycle() {
        let mut machine = InteractionMachine::with_state(S::Dragging);
        let transition = machine.send(E::EnterPipeHover).unwrap();
        assert_eq!(transition.from, S::Dragging);
        assert_eq!(transition.to, S::Connected);

        assert_eq!(machine.send(E::Interact).map(|t| t.to), Some(S::ConnectedAndDragging));
        assert_eq!(machine.send(E::Interact).map(|t| t.to), Some(S::Connected));
        assert_eq!(machine.send(E::ReturnToPalette).map(|t| t.to), Some(S::InToolbar));
    }

    #[test]
    fn test_listed_transitions() {
        let listed = [
            (S::InToolbar, E::Interact, S::Dragging),
            (S::Dragging, E::Interact, S::Placed),
            (S::Dragging, E::ReturnToPalette, S::InToolbar),
            (S::Dragging, E::EnterPipeHover, S::Connected),
            (S::Placed, E::Interact, S::Dragging),
            (S::Placed, E::ReturnToPalette, S::InToolbar),
            (S::Connected, E::Interact, S::ConnectedAndDragging),
            (S::Connected, E::ReturnToPalette, S::InToolbar),
            (S::ConnectedAndDragging, E::Interact, S::Connected),
            (S::ConnectedAndDragging, E::ReturnToPalette, S::InToolbar),
        ];

        for state in S::ALL {
            for event in E::ALL {
                let expected = listed
                    .iter()
                    .find(|(s, e, _)| *s == state && *e == event)
                    .map(|(_, _, to)| *to);

                let mut machine = InteractionMachine::with_state(state);
                let transition = machine.send(event);
                match expected {
                    Some(to) => {
                        assert_eq!(transition.map(|t| t.to), Some(to), "{state} + {event:?}");
                        assert_eq!(machine.state(), to);
                    }
                    None => {
                        assert!(transition.is_none(), "{state} + {event:?} should be ignored");
                        assert_eq!(machine.state(), state);
                    }
                }
            }
        }
    }

    #[test]
    fn test_state_queries() {
        assert!(S::ConnectedAndDragging.is_connected());
        assert!(S::Connected.is_connected());
        assert!(!S::Placed.is_connected());
        assert!(!S::Dragging.is_connected());
    }
}
