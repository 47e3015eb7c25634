// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of a session.
///
/// `Disconnected -> Connecting -> Connected`, back to `Disconnected` on
/// transport failure or shutdown. `Disposed` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disposed,
}

impl ConnectionStatus {
    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        match (self, next) {
            (Disposed, _) => false,
            (_, Disposed) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Connected) | (Connecting, Disconnected) => true,
            (Connected, Disconnected) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionStatus::Disposed
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Disposed => "Disposed",
        };
        f.write_str(name)
    }
}
