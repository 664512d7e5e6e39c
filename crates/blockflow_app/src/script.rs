// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scenario scripts: gestures and waits played against a session.

use blockflow_graph::Point;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One scripted action. Blocks are addressed by label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptStep {
    /// Let simulated time pass
    Wait {
        /// Seconds of simulated time
        seconds: f64,
    },
    /// Click a block at a point (pick up, drop, splice)
    Interact {
        /// Block label
        block: String,
        /// Pointer position
        at: Point,
    },
    /// Move the pointer while dragging
    DragTo {
        /// Pointer position
        at: Point,
    },
    /// Send a block back to the palette
    Return {
        /// Block label
        block: String,
    },
    /// Spawn a token on the input block
    Trigger,
    /// Set the value the input block emits
    SetInput {
        /// New value
        value: f32,
    },
    /// Delete a block
    Remove {
        /// Block label
        block: String,
    },
    /// Destroy every token in flight
    ClearTokens,
}

impl ScriptStep {
    /// Default scenario: drop `add0` and `multiply0` onto the pipe and
    /// send a token through, then pull `add0` back out and send another.
    pub fn demo() -> Vec<ScriptStep> {
        vec![
            Self::Interact {
                block: "add0".into(),
                at: [350.0, 100.0],
            },
            Self::DragTo { at: [350.0, 280.0] },
            Self::Interact {
                block: "add0".into(),
                at: [350.0, 300.0],
            },
            Self::Interact {
                block: "multiply0".into(),
                at: [650.0, 100.0],
            },
            Self::DragTo { at: [650.0, 290.0] },
            Self::Interact {
                block: "multiply0".into(),
                at: [650.0, 300.0],
            },
            Self::SetInput { value: 3.0 },
            Self::Trigger,
            Self::Wait { seconds: 2.0 },
            Self::Return {
                block: "add0".into(),
            },
            Self::Trigger,
        ]
    }
}

impl fmt::Display for ScriptStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wait { seconds } => write!(f, "wait {seconds}s"),
            Self::Interact { block, at } => write!(f, "interact {block} at ({}, {})", at[0], at[1]),
            Self::DragTo { at } => write!(f, "drag to ({}, {})", at[0], at[1]),
            Self::Return { block } => write!(f, "return {block}"),
            Self::Trigger => f.write_str("trigger"),
            Self::SetInput { value } => write!(f, "set input {value}"),
            Self::Remove { block } => write!(f, "remove {block}"),
            Self::ClearTokens => f.write_str("clear tokens"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_steps() {
        let steps: Vec<ScriptStep> = ron::from_str(
            "[Interact(block: \"add0\", at: (10.0, 20.0)), Wait(seconds: 1.5), Trigger, ClearTokens]",
        )
        .unwrap();
        assert_eq!(
            steps,
            vec![
                ScriptStep::Interact {
                    block: "add0".into(),
                    at: [10.0, 20.0]
                },
                ScriptStep::Wait { seconds: 1.5 },
                ScriptStep::Trigger,
                ScriptStep::ClearTokens,
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ScriptStep::DragTo { at: [1.0, 2.5] }.to_string(), "drag to (1, 2.5)");
        assert_eq!(ScriptStep::ClearTokens.to_string(), "clear tokens");
    }
}
