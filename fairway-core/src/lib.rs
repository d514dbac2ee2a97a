//! # fairway-core
//!
//! Core library for the Fairway shot bridge.
//!
//! This crate contains:
//! - **Codec**: `JsonFrameCodec`, brace-balanced JSON framing for `tokio_util`
//! - **Monitor**: the launch monitor server and per-connection session
//! - **Simulator**: `SimulatorClient`, the numbered outbound shot connection
//! - **Adjust**: modifier tables and the shared `ModifierHandle`
//! - **Dispatch**: `ShotDispatcher`, concurrent fan-out to every consumer
//! - **Storage**: `CsvShotStore`, the append-only shot log
//! - **State**: the launch monitor session state machine
//! - **Error**: `BridgeError`, a `thiserror`-based error hierarchy

pub mod adjust;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod monitor;
pub mod shot;
pub mod simulator;
pub mod state;
pub mod storage;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use adjust::{ModifierHandle, ModifierSnapshot, ModifierTable, adjust};
pub use codec::{JsonFrameCodec, MAX_FRAME_SIZE};
pub use dispatch::{
    CaptureController, CaptureReport, DispatchOptions, DispatchReport, ShotDispatcher,
    ShotHandler, ShotSink, ShotStore,
};
pub use error::BridgeError;
pub use monitor::{LaunchMonitorServer, LaunchMonitorSession, SessionConfig, SessionEnd};
pub use shot::{BallData, ClubData, ClubType, ShotOptions, StandardizedShot};
pub use simulator::{SimulatorClient, SimulatorOptions};
pub use state::SessionPhase;
pub use storage::{CsvShotStore, ShotId, ShotRecord};
