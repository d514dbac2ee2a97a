//! Launch monitor wire messages.
//!
//! Incoming frames are JSON objects tagged by a `Type` field. Replies
//! are fixed-shape objects the device expects after each request.

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::shot::{BallData, ClubData, ClubType};

/// Challenge string the device expects in the handshake reply.
pub const HANDSHAKE_CHALLENGE: &str =
    "gQW3om37uK4OOU4FXQH9GWgljxOrNcL5MvubVHAtQC0x6Z1AwJTgAIKyamJJMzm9";

// ── Device payloads ──────────────────────────────────────────────

/// Ball measurements as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct DeviceBallData {
    pub ball_speed: f64,
    pub spin_axis: f64,
    pub total_spin: f64,
    pub launch_direction: f64,
    pub launch_angle: f64,
}

impl DeviceBallData {
    /// Rewrite a 0..360° spin axis into the signed ±90° convention.
    ///
    /// Values above 90° wrap to negative, then the sign flips so that
    /// a draw (350°) becomes positive.
    pub fn with_signed_spin_axis(mut self) -> Self {
        let mut axis = self.spin_axis;
        if axis > 90.0 {
            axis -= 360.0;
        }
        self.spin_axis = -axis;
        self
    }

    pub fn to_standard(&self) -> BallData {
        BallData {
            speed: self.ball_speed,
            spin_axis: self.spin_axis,
            total_spin: self.total_spin,
            hla: self.launch_direction,
            vla: self.launch_angle,
            ..Default::default()
        }
    }
}

/// Club measurements as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct DeviceClubData {
    pub club_head_speed: f64,
    pub club_angle_face: f64,
    pub club_angle_path: f64,
}

impl DeviceClubData {
    pub fn to_standard(&self) -> ClubData {
        ClubData {
            speed: self.club_head_speed,
            face_to_target: self.club_angle_face,
            path: self.club_angle_path,
            ..Default::default()
        }
    }
}

// ── RawTelemetryMessage ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(default)]
    ball_data: Option<DeviceBallData>,
    #[serde(default)]
    club_data: Option<DeviceClubData>,
    #[serde(default)]
    club_type: Option<ClubType>,
}

/// One decoded device message.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTelemetryMessage {
    Handshake,
    Challenge,
    Close,
    Pong,
    SetClubType(Option<ClubType>),
    SetBallData(Option<DeviceBallData>),
    SetClubData(Option<DeviceClubData>),
    SendShot,
    /// Any `Type` this bridge does not handle.
    Unrecognized(String),
}

impl RawTelemetryMessage {
    /// Decode one frame.
    pub fn parse(frame: &[u8]) -> Result<Self, BridgeError> {
        let envelope: Envelope = serde_json::from_slice(frame)?;
        Ok(match envelope.kind.as_str() {
            "Handshake" => Self::Handshake,
            "Challenge" => Self::Challenge,
            "Close" => Self::Close,
            "Pong" => Self::Pong,
            "SetClubType" => Self::SetClubType(envelope.club_type),
            "SetBallData" => Self::SetBallData(envelope.ball_data),
            "SetClubData" => Self::SetClubData(envelope.club_data),
            "SendShot" => Self::SendShot,
            _ => Self::Unrecognized(envelope.kind),
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Handshake => "Handshake",
            Self::Challenge => "Challenge",
            Self::Close => "Close",
            Self::Pong => "Pong",
            Self::SetClubType(_) => "SetClubType",
            Self::SetBallData(_) => "SetBallData",
            Self::SetClubData(_) => "SetClubData",
            Self::SendShot => "SendShot",
            Self::Unrecognized(kind) => kind,
        }
    }
}

// ── Replies ──────────────────────────────────────────────────────

/// Commands sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimCommand {
    Ping,
    Disarm,
    Arm,
    ShotComplete,
}

/// Messages written to the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "Type")]
pub enum DeviceReply {
    #[serde(rename_all = "PascalCase")]
    Handshake {
        challenge: &'static str,
        #[serde(rename = "E6Version")]
        e6_version: &'static str,
        protocol_version: &'static str,
        required_protocol_version: &'static str,
    },
    #[serde(rename_all = "PascalCase")]
    Authentication { success: &'static str },
    #[serde(rename = "ACK", rename_all = "PascalCase")]
    Ack {
        details: &'static str,
        sub_type: String,
    },
    #[serde(rename_all = "PascalCase")]
    SimCommand {
        sub_type: SimCommand,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

impl DeviceReply {
    pub fn handshake() -> Self {
        Self::Handshake {
            challenge: HANDSHAKE_CHALLENGE,
            e6_version: "2, 0, 0, 0",
            protocol_version: "1.0.0.5",
            required_protocol_version: "1.0.0.0",
        }
    }

    pub fn authenticated() -> Self {
        Self::Authentication { success: "true" }
    }

    pub fn ack(sub_type: &str) -> Self {
        Self::Ack {
            details: "Success.",
            sub_type: sub_type.to_string(),
        }
    }

    pub fn command(sub_type: SimCommand) -> Self {
        Self::SimCommand {
            sub_type,
            details: None,
        }
    }

    /// Fixed example telemetry the device shows after a shot.
    pub fn shot_complete() -> Self {
        let details = serde_json::json!({
            "Apex": 62.2087860107422,
            "BallData": {
                "BackSpin": 4690.28662109375,
                "BallSpeed": 151.587356567383,
                "LaunchAngle": 17.7735958099365,
                "LaunchDirection": -5.00650501251221,
                "SideSpin": -542.832092285156,
                "SpinAxis": 353.398223876953,
                "TotalSpin": 4721.59423828125
            },
            "BallInHole": false,
            "BallLocation": "Fringe",
            "CarryDeviationAngle": 357.429321289063,
            "CarryDeviationFeet": -19.5566101074219,
            "CarryDistance": 436.027191162109,
            "ClubData": {
                "ClubAngleFace": -2.42121529579163,
                "ClubAnglePath": -10.2835702896118,
                "ClubHeadSpeed": 110.317367553711,
                "ClubHeadSpeedMPH": 75.2163848876953,
                "ClubType": "7Iron",
                "SmashFactor": 1.37410235404968
            },
            "DistanceToPin": 122.404106140137,
            "TotalDeviationAngle": 356.053466796875,
            "TotalDeviationFeet": -32.0723648071289,
            "TotalDistance": 465.995697021484
        });
        Self::SimCommand {
            sub_type: SimCommand::ShotComplete,
            details: Some(details),
        }
    }
}
