//! Shot fan-out.
//!
//! The [`ShotDispatcher`] receives one completed shot from a launch
//! monitor session and hands it to three independent consumers:
//!
//! 1. the simulator ([`ShotSink`]),
//! 2. the shot log ([`ShotStore`]),
//! 3. an optional camera ([`CaptureController`]).
//!
//! The consumers run concurrently. A failure in one is logged and
//! never prevents or delays the others.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::adjust::{ModifierHandle, adjust};
use crate::error::BridgeError;
use crate::shot::StandardizedShot;
use crate::storage::ShotRecord;

// ── Collaborator interfaces ──────────────────────────────────────

/// Receives completed shots from a launch monitor session.
#[async_trait]
pub trait ShotHandler: Send + Sync {
    async fn on_shot(&self, shot: StandardizedShot);
}

/// Forwards shots to a simulator.
#[async_trait]
pub trait ShotSink: Send + Sync {
    async fn send_shot(&self, shot: &StandardizedShot) -> Result<(), BridgeError>;
}

/// Durable, append-only shot log.
#[async_trait]
pub trait ShotStore: Send + Sync {
    async fn append(&self, record: &ShotRecord) -> Result<(), BridgeError>;
}

/// Video capture device driven around each shot.
#[async_trait]
pub trait CaptureController: Send + Sync {
    async fn start_capture(&self) -> Result<(), BridgeError>;
    async fn stop_capture(&self) -> Result<(), BridgeError>;
    async fn save_last_recording(&self) -> Result<(), BridgeError>;
    async fn delete_last_recording(&self) -> Result<(), BridgeError>;
}

// ── Options / report ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Send adjusted club data to the simulator. When `false` the
    /// simulator receives the raw club data while the log still
    /// records the adjusted values.
    pub send_adjusted_club: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            send_adjusted_club: true,
        }
    }
}

/// Capture outcome for one shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureReport {
    pub stopped: bool,
    pub saved: bool,
}

/// What happened to each consumer for one shot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Modifier table version used for the adjustment.
    pub modifiers_version: u64,
    pub simulator_sent: bool,
    pub stored: bool,
    /// `None` when no capture controller is configured.
    pub capture: Option<CaptureReport>,
}

// ── ShotDispatcher ───────────────────────────────────────────────

pub struct ShotDispatcher {
    simulator: Arc<dyn ShotSink>,
    storage: Arc<dyn ShotStore>,
    capture: Option<Arc<dyn CaptureController>>,
    modifiers: ModifierHandle,
    options: DispatchOptions,
}

impl ShotDispatcher {
    pub fn new(
        simulator: Arc<dyn ShotSink>,
        storage: Arc<dyn ShotStore>,
        modifiers: ModifierHandle,
    ) -> Self {
        Self {
            simulator,
            storage,
            capture: None,
            modifiers,
            options: DispatchOptions::default(),
        }
    }

    pub fn with_capture(mut self, capture: Arc<dyn CaptureController>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Fan one shot out to every consumer.
    pub async fn dispatch(&self, shot: StandardizedShot) -> DispatchReport {
        let snapshot = self.modifiers.snapshot();
        let adjusted = adjust(&shot, &snapshot.table);

        info!(
            version = snapshot.version,
            speed = format_args!("{:.2} -> {:.2}", shot.ball.speed, adjusted.ball.speed),
            spin_axis = format_args!("{:.2} -> {:.2}", shot.ball.spin_axis, adjusted.ball.spin_axis),
            total_spin = format_args!("{:.2} -> {:.2}", shot.ball.total_spin, adjusted.ball.total_spin),
            hla = format_args!("{:.2} -> {:.2}", shot.ball.hla, adjusted.ball.hla),
            vla = format_args!("{:.2} -> {:.2}", shot.ball.vla, adjusted.ball.vla),
            "ball data adjusted"
        );
        info!(
            speed = format_args!("{:.2} -> {:.2}", shot.club.speed, adjusted.club.speed),
            face = format_args!("{:.2} -> {:.2}", shot.club.face_to_target, adjusted.club.face_to_target),
            path = format_args!("{:.2} -> {:.2}", shot.club.path, adjusted.club.path),
            "club data adjusted"
        );

        let outgoing = StandardizedShot {
            ball: adjusted.ball,
            club: if self.options.send_adjusted_club {
                adjusted.club
            } else {
                shot.club
            },
            options: shot.options.clone(),
        };
        let club_type = shot.club_type().cloned().unwrap_or_default();
        let record = ShotRecord::new(
            club_type,
            shot.ball,
            shot.club,
            adjusted.ball,
            adjusted.club,
        );

        let (simulator_sent, stored, capture) = tokio::join!(
            self.forward(&outgoing),
            self.store(&record),
            self.capture_sequence(),
        );

        DispatchReport {
            modifiers_version: snapshot.version,
            simulator_sent,
            stored,
            capture,
        }
    }

    async fn forward(&self, shot: &StandardizedShot) -> bool {
        match self.simulator.send_shot(shot).await {
            Ok(()) => {
                info!("shot sent to simulator");
                true
            }
            Err(e) => {
                error!("sending shot to simulator: {e}");
                false
            }
        }
    }

    async fn store(&self, record: &ShotRecord) -> bool {
        match self.storage.append(record).await {
            Ok(()) => {
                info!(id = %record.id, "shot saved");
                true
            }
            Err(e) => {
                error!(id = %record.id, "saving shot: {e}");
                false
            }
        }
    }

    /// Stop then save, in that order; save runs even if stop failed.
    async fn capture_sequence(&self) -> Option<CaptureReport> {
        let capture = self.capture.as_ref()?;

        let stopped = match capture.stop_capture().await {
            Ok(()) => true,
            Err(e) => {
                error!("stopping capture: {e}");
                false
            }
        };
        let saved = match capture.save_last_recording().await {
            Ok(()) => {
                info!("recording saved");
                true
            }
            Err(e) => {
                error!("saving recording: {e}");
                false
            }
        };
        Some(CaptureReport { stopped, saved })
    }
}

#[async_trait]
impl ShotHandler for ShotDispatcher {
    async fn on_shot(&self, shot: StandardizedShot) {
        info!(club_type = ?shot.club_type(), "dispatching shot");
        let report = self.dispatch(shot).await;
        info!(?report, "shot dispatched");
    }
}
