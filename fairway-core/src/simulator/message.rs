//! Simulator wire messages.

use serde::{Deserialize, Serialize};

use crate::shot::{BallData, ClubData, ShotOptions, StandardizedShot};

/// One shot (or heartbeat) as the simulator expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShotMessage {
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    pub units: String,
    pub shot_number: i32,
    #[serde(rename = "APIversion")]
    pub api_version: String,
    pub ball_data: BallData,
    pub club_data: ClubData,
    pub shot_data_options: ShotOptions,
}

impl ShotMessage {
    pub fn new(shot: &StandardizedShot, shot_number: i32, identity: &DeviceIdentity) -> Self {
        Self {
            device_id: identity.device_id.clone(),
            units: identity.units.clone(),
            shot_number,
            api_version: identity.api_version.clone(),
            ball_data: shot.ball,
            club_data: shot.club,
            shot_data_options: shot.options.clone(),
        }
    }
}

/// Fields identifying this bridge to the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub units: String,
    pub api_version: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            device_id: "GSPro LM 1.1".into(),
            units: "Yards".into(),
            api_version: "1".into(),
        }
    }
}

/// Player context reported back by the simulator.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PlayerInfo {
    pub handed: String,
    pub club: String,
    pub distance_to_target: f64,
    pub surface: String,
}

/// Simulator reply to a shot or heartbeat.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SimulatorResponse {
    pub code: i32,
    pub message: String,
    pub player: Option<PlayerInfo>,
}

impl SimulatorResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}
