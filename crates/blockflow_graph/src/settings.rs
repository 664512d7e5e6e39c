// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tunables for interaction, traversal and pipe geometry.

use crate::geometry::{BezierGeometry, DEFAULT_CURVE_RESOLUTION, DEFAULT_SOCKET_OFFSET};
use serde::{Deserialize, Serialize};

/// All flow tunables
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowSettings {
    /// Gesture handling
    #[serde(default)]
    pub interaction: InteractionSettings,
    /// Token movement
    #[serde(default)]
    pub traversal: TraversalSettings,
    /// Pipe curves
    #[serde(default)]
    pub pipes: PipeSettings,
}

/// Gesture handling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionSettings {
    /// Max distance from a dragged block to a pipe for it to count as hovered
    pub hover_distance: f32,
    /// Max distance for a drop to splice the block into a pipe
    pub connected_distance: f32,
    /// When a connected block returns to the palette, join its neighbours
    pub heal_chain_on_return: bool,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            hover_distance: 100.0,
            connected_distance: 300.0,
            heal_chain_on_return: true,
        }
    }
}

/// Token movement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalSettings {
    /// Speed along a pipe, in layer units per second
    pub move_speed: f32,
    /// Upper bound on the time spent on one pipe, in seconds
    pub max_hop_duration: f32,
}

impl Default for TraversalSettings {
    fn default() -> Self {
        Self {
            move_speed: 300.0,
            max_hop_duration: 0.5,
        }
    }
}

impl TraversalSettings {
    /// Time to travel a pipe of the given length
    pub fn hop_duration(&self, length: f32) -> f32 {
        let by_speed = if self.move_speed > 0.0 {
            length / self.move_speed
        } else {
            self.max_hop_duration
        };
        by_speed.min(self.max_hop_duration).max(0.0)
    }
}

/// Pipe curves
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipeSettings {
    /// Segments per curve
    pub resolution: usize,
    /// Horizontal offset from block center to socket
    pub socket_offset: f32,
}

impl Default for PipeSettings {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_CURVE_RESOLUTION,
            socket_offset: DEFAULT_SOCKET_OFFSET,
        }
    }
}

impl PipeSettings {
    /// Bezier geometry with these settings
    pub fn geometry(&self) -> BezierGeometry {
        BezierGeometry {
            resolution: self.resolution,
            socket_offset: self.socket_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_duration() {
        let traversal = TraversalSettings::default();
        assert_eq!(traversal.hop_duration(30.0), 0.1);
        assert_eq!(traversal.hop_duration(3000.0), 0.5);
        assert_eq!(traversal.hop_duration(0.0), 0.0);

        let stalled = TraversalSettings {
            move_speed: 0.0,
            ..TraversalSettings::default()
        };
        assert_eq!(stalled.hop_duration(30.0), 0.5);
    }

    #[test]
    fn test_partial_ron() {
        let settings: FlowSettings = ron::from_str("(traversal: (move_speed: 600.0))").unwrap();
        assert_eq!(settings.traversal.move_speed, 600.0);
        assert_eq!(settings.traversal.max_hop_duration, 0.5);
        assert_eq!(settings.interaction, InteractionSettings::default());
    }
}
