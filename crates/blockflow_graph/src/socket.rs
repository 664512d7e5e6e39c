// SPDX-License-Identifier: MIT OR Apache-2.0
//! Socket definitions for block inputs/outputs.

use serde::{Deserialize, Serialize};

/// Socket direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketDirection {
    /// Input socket (a pipe ends here)
    Input,
    /// Output socket (a pipe starts here)
    Output,
}

impl SocketDirection {
    /// The direction a pipe must have on its other end
    pub fn opposite(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

/// A socket on a block.
///
/// Each socket carries at most one pipe; `connected` mirrors whether the
/// connection graph currently holds a pipe ending on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Socket {
    /// Socket direction
    pub direction: SocketDirection,
    connected: bool,
}

impl Socket {
    /// Create a new input socket
    pub fn input() -> Self {
        Self {
            direction: SocketDirection::Input,
            connected: false,
        }
    }

    /// Create a new output socket
    pub fn output() -> Self {
        Self {
            direction: SocketDirection::Output,
            connected: false,
        }
    }

    /// Whether a pipe currently occupies this socket
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether a new pipe may be attached
    pub fn is_free(&self) -> bool {
        !self.connected
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sockets_are_free() {
        assert!(Socket::input().is_free());
        assert!(Socket::output().is_free());
        assert_eq!(Socket::input().direction.opposite(), SocketDirection::Output);
    }

    #[test]
    fn test_connected_flag() {
        let mut socket = Socket::output();
        socket.set_connected(true);
        assert!(socket.is_connected());
        assert!(!socket.is_free());
    }
}
