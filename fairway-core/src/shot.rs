//! Device-agnostic shot representation.
//!
//! Every launch monitor format converts into a [`StandardizedShot`],
//! and every simulator format is produced from one.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── ClubType ─────────────────────────────────────────────────────

/// Club names understood by the launch monitor and simulator.
pub const KNOWN_CLUB_TYPES: [&str; 23] = [
    "Driver",
    "3Wood",
    "5Wood",
    "7Wood",
    "2Hybrid",
    "3Hybrid",
    "4Hybrid",
    "5Hybrid",
    "6Hybrid",
    "1Iron",
    "2Iron",
    "3Iron",
    "4Iron",
    "5Iron",
    "6Iron",
    "7Iron",
    "8Iron",
    "9Iron",
    "PitchingWedge",
    "GapWedge",
    "SandWedge",
    "LobWedge",
    "Putter",
];

/// Club selected on the device, stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClubType(String);

impl ClubType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the name is one of [`KNOWN_CLUB_TYPES`].
    pub fn is_known(&self) -> bool {
        KNOWN_CLUB_TYPES.contains(&self.0.as_str())
    }
}

impl Default for ClubType {
    fn default() -> Self {
        Self::new("7Iron")
    }
}

impl fmt::Display for ClubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── BallData ─────────────────────────────────────────────────────

/// Ball launch measurements.
///
/// Speeds are in mph, angles in degrees, spin in rpm.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BallData {
    pub speed: f64,
    pub spin_axis: f64,
    pub total_spin: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back_spin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side_spin: Option<f64>,
    /// Horizontal launch angle.
    #[serde(rename = "HLA")]
    pub hla: f64,
    /// Vertical launch angle.
    #[serde(rename = "VLA")]
    pub vla: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carry_distance: Option<f64>,
}

// ── ClubData ─────────────────────────────────────────────────────

/// Club delivery measurements at impact.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClubData {
    pub speed: f64,
    pub angle_of_attack: f64,
    pub face_to_target: f64,
    pub lie: f64,
    pub loft: f64,
    pub path: f64,
    pub speed_at_impact: f64,
    pub vertical_face_impact: f64,
    pub horizontal_face_impact: f64,
    pub closure_rate: f64,
}

// ── ShotOptions ──────────────────────────────────────────────────

/// Metadata travelling with a shot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShotOptions {
    pub contains_ball_data: bool,
    pub contains_club_data: bool,
    pub launch_monitor_is_ready: bool,
    pub launch_monitor_ball_detected: bool,
    #[serde(rename = "IsHeartBeat")]
    pub is_heartbeat: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub club_type: Option<ClubType>,
}

// ── StandardizedShot ─────────────────────────────────────────────

/// One swing, in the canonical form shared by every device.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StandardizedShot {
    pub ball: BallData,
    pub club: ClubData,
    pub options: ShotOptions,
}

impl StandardizedShot {
    /// A real shot carrying both ball and club measurements.
    ///
    /// The device is mid-cycle when it reports a shot, so the ready flag
    /// stays clear; only heartbeats advertise readiness.
    pub fn measured(ball: BallData, club: ClubData, club_type: ClubType) -> Self {
        Self {
            ball,
            club,
            options: ShotOptions {
                contains_ball_data: true,
                contains_club_data: true,
                launch_monitor_is_ready: false,
                launch_monitor_ball_detected: true,
                is_heartbeat: false,
                club_type: Some(club_type),
            },
        }
    }

    /// Keep-alive message: all telemetry zeroed.
    pub fn heartbeat() -> Self {
        Self {
            ball: BallData::default(),
            club: ClubData::default(),
            options: ShotOptions {
                contains_ball_data: false,
                contains_club_data: false,
                launch_monitor_is_ready: true,
                launch_monitor_ball_detected: true,
                is_heartbeat: true,
                club_type: None,
            },
        }
    }

    pub fn club_type(&self) -> Option<&ClubType> {
        self.options.club_type.as_ref()
    }
}
