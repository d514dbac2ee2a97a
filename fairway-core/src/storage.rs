//! Append-only shot log.
//!
//! Each shot becomes one CSV row holding the raw and adjusted values.
//! The header is written once, when the file is created empty.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::dispatch::ShotStore;
use crate::error::BridgeError;
use crate::shot::{BallData, ClubData, ClubType};

// ── ShotId ───────────────────────────────────────────────────────

/// Random (version 4) UUID identifying one shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShotId([u8; 16]);

impl ShotId {
    pub fn generate() -> Self {
        let mut bytes: [u8; 16] = rand::random();
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Self(bytes)
    }
}

impl fmt::Display for ShotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

// ── ShotRecord ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ShotRecord {
    pub timestamp: DateTime<Utc>,
    pub id: ShotId,
    pub club_type: ClubType,
    pub ball: BallData,
    pub club: ClubData,
    pub adjusted_ball: BallData,
    pub adjusted_club: ClubData,
}

impl ShotRecord {
    /// Stamp a new record with the current time and a fresh id.
    pub fn new(
        club_type: ClubType,
        ball: BallData,
        club: ClubData,
        adjusted_ball: BallData,
        adjusted_club: ClubData,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            id: ShotId::generate(),
            club_type,
            ball,
            club,
            adjusted_ball,
            adjusted_club,
        }
    }

    /// Column names, in row order.
    pub fn header() -> Vec<String> {
        let ball = [
            "Speed",
            "SpinAxis",
            "TotalSpin",
            "BackSpin",
            "SideSpin",
            "HLA",
            "VLA",
            "CarryDistance",
        ];
        let club = [
            "Speed",
            "SpeedAtImpact",
            "Path",
            "AngleOfAttack",
            "ClosureRate",
            "Lie",
            "Loft",
            "FaceToTarget",
            "VerticalFaceImpact",
            "HorizontalFaceImpact",
        ];

        let mut cols: Vec<String> = vec!["Timestamp".into(), "ShotUUID".into(), "ClubType".into()];
        // Raw block first, then the adjusted block.
        for prefix in ["", "Adj"] {
            cols.extend(ball.iter().map(|c| format!("{prefix}Ball{c}")));
            cols.extend(club.iter().map(|c| format!("{prefix}Club{c}")));
        }
        cols
    }

    /// Cell values, in [`header`](Self::header) order.
    pub fn row(&self) -> Vec<String> {
        let mut cells = vec![
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.id.to_string(),
            self.club_type.to_string(),
        ];
        for (ball, club) in [
            (&self.ball, &self.club),
            (&self.adjusted_ball, &self.adjusted_club),
        ] {
            cells.extend([
                ball.speed.to_string(),
                ball.spin_axis.to_string(),
                ball.total_spin.to_string(),
                optional(ball.back_spin),
                optional(ball.side_spin),
                ball.hla.to_string(),
                ball.vla.to_string(),
                optional(ball.carry_distance),
            ]);
            cells.extend([
                club.speed.to_string(),
                club.speed_at_impact.to_string(),
                club.path.to_string(),
                club.angle_of_attack.to_string(),
                club.closure_rate.to_string(),
                club.lie.to_string(),
                club.loft.to_string(),
                club.face_to_target.to_string(),
                club.vertical_face_impact.to_string(),
                club.horizontal_face_impact.to_string(),
            ]);
        }
        cells
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Join cells into one CSV line, quoting where needed.
fn csv_line(cells: &[String]) -> String {
    let mut line = cells
        .iter()
        .map(|cell| {
            if cell.contains([',', '"', '\n', '\r']) {
                format!("\"{}\"", cell.replace('"', "\"\""))
            } else {
                cell.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

// ── CsvShotStore ─────────────────────────────────────────────────

/// [`ShotStore`] backed by a CSV file opened in append mode.
pub struct CsvShotStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl CsvShotStore {
    /// Open (or create) the log at `path`.
    ///
    /// Failure here is a startup error: the bridge cannot run without
    /// its shot log.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        if file.metadata().await?.len() == 0 {
            file.write_all(csv_line(&ShotRecord::header()).as_bytes())
                .await?;
            file.flush().await?;
            tracing::info!(path = %path.display(), "created shot log");
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ShotStore for CsvShotStore {
    async fn append(&self, record: &ShotRecord) -> Result<(), BridgeError> {
        let line = csv_line(&record.row());
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| BridgeError::Storage(format!("{}: {e}", self.path.display())))?;
        file.flush()
            .await
            .map_err(|e| BridgeError::Storage(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }
}
