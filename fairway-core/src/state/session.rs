//! Launch monitor session state machine.
//!
//! Provides a `SessionPhase` enum that models the lifecycle of one
//! device connection, with validated transitions that return
//! `Result` instead of panicking.

use std::time::Instant;

use crate::error::BridgeError;

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of a launch monitor connection.
///
/// ```text
///  AwaitingHandshake ──► Authenticated ──► Armed ◄──► ProcessingShot
///          │                   │             │               │
///          ▼                   ▼             ▼               ▼
///          └─────────────► Disconnected ◄────┴───────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// TCP link is up; waiting for the device handshake.
    #[default]
    AwaitingHandshake,

    /// Challenge answered; the device may send data and shots.
    Authenticated {
        /// When authentication completed.
        since: Instant,
    },

    /// Ready for the next shot.
    Armed,

    /// A shot was received; waiting to re-arm the device.
    ProcessingShot,

    /// Terminal. The session is never reused.
    Disconnected,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingHandshake => write!(f, "AwaitingHandshake"),
            Self::Authenticated { .. } => write!(f, "Authenticated"),
            Self::Armed => write!(f, "Armed"),
            Self::ProcessingShot => write!(f, "ProcessingShot"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

impl SessionPhase {
    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Authenticated`.
    ///
    /// Valid from: `AwaitingHandshake`, `Authenticated` (repeated challenge).
    pub fn authenticate(&mut self) -> Result<(), BridgeError> {
        match self {
            Self::AwaitingHandshake | Self::Authenticated { .. } => {
                *self = Self::Authenticated {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(BridgeError::ProtocolViolation(
                "cannot authenticate: session already armed or closed",
            )),
        }
    }

    /// Transition to `ProcessingShot`.
    ///
    /// Valid from: `Authenticated`, `Armed`, `ProcessingShot` (a new
    /// shot before the previous re-arm).
    pub fn begin_shot(&mut self) -> Result<(), BridgeError> {
        match self {
            Self::Authenticated { .. } | Self::Armed | Self::ProcessingShot => {
                *self = Self::ProcessingShot;
                Ok(())
            }
            Self::AwaitingHandshake => Err(BridgeError::ProtocolViolation(
                "shot received before authentication",
            )),
            Self::Disconnected => Err(BridgeError::ProtocolViolation(
                "shot received on a closed session",
            )),
        }
    }

    /// Transition to `Armed`.
    ///
    /// Valid from: `ProcessingShot`.
    pub fn arm(&mut self) -> Result<(), BridgeError> {
        match self {
            Self::ProcessingShot => {
                *self = Self::Armed;
                Ok(())
            }
            _ => Err(BridgeError::ProtocolViolation(
                "cannot arm: no shot in progress",
            )),
        }
    }

    /// Force the terminal state regardless of the current phase.
    pub fn disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────
