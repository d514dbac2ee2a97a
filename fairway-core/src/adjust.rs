//! Live-tunable multipliers applied to shots before forwarding.
//!
//! [`adjust`] is a pure function. The table it reads lives behind a
//! [`ModifierHandle`], which the administrative surface replaces
//! wholesale while the dispatcher keeps reading it.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::shot::{BallData, ClubData, StandardizedShot};

// ── Modifier tables ──────────────────────────────────────────────

/// Multipliers for [`BallData`]. Missing fields deserialize as `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct BallModifiers {
    pub speed: f64,
    pub spin_axis: f64,
    pub total_spin: f64,
    pub back_spin: f64,
    pub side_spin: f64,
    #[serde(rename = "HLA")]
    pub hla: f64,
    #[serde(rename = "VLA")]
    pub vla: f64,
    pub carry_distance: f64,
}

impl BallModifiers {
    pub fn uniform(factor: f64) -> Self {
        Self {
            speed: factor,
            spin_axis: factor,
            total_spin: factor,
            back_spin: factor,
            side_spin: factor,
            hla: factor,
            vla: factor,
            carry_distance: factor,
        }
    }
}

impl Default for BallModifiers {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

/// Multipliers for [`ClubData`]. Missing fields deserialize as `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ClubModifiers {
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

impl ClubModifiers {
    pub fn uniform(factor: f64) -> Self {
        Self {
            speed: factor,
            angle_of_attack: factor,
            face_to_target: factor,
            lie: factor,
            loft: factor,
            path: factor,
            speed_at_impact: factor,
            vertical_face_impact: factor,
            horizontal_face_impact: factor,
            closure_rate: factor,
        }
    }
}

impl Default for ClubModifiers {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

/// The full multiplier set. `Default` is the identity table.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierTable {
    pub ball_data: BallModifiers,
    pub club_data: ClubModifiers,
}

impl ModifierTable {
    pub fn uniform(factor: f64) -> Self {
        Self {
            ball_data: BallModifiers::uniform(factor),
            club_data: ClubModifiers::uniform(factor),
        }
    }
}

// ── Adjustment ───────────────────────────────────────────────────

impl BallData {
    pub fn adjusted(&self, m: &BallModifiers) -> BallData {
        BallData {
            speed: self.speed * m.speed,
            spin_axis: self.spin_axis * m.spin_axis,
            total_spin: self.total_spin * m.total_spin,
            back_spin: self.back_spin.map(|v| v * m.back_spin),
            side_spin: self.side_spin.map(|v| v * m.side_spin),
            hla: self.hla * m.hla,
            vla: self.vla * m.vla,
            carry_distance: self.carry_distance.map(|v| v * m.carry_distance),
        }
    }
}

impl ClubData {
    pub fn adjusted(&self, m: &ClubModifiers) -> ClubData {
        ClubData {
            speed: self.speed * m.speed,
            angle_of_attack: self.angle_of_attack * m.angle_of_attack,
            face_to_target: self.face_to_target * m.face_to_target,
            lie: self.lie * m.lie,
            loft: self.loft * m.loft,
            path: self.path * m.path,
            speed_at_impact: self.speed_at_impact * m.speed_at_impact,
            vertical_face_impact: self.vertical_face_impact * m.vertical_face_impact,
            horizontal_face_impact: self.horizontal_face_impact * m.horizontal_face_impact,
            closure_rate: self.closure_rate * m.closure_rate,
        }
    }
}

/// Multiply every numeric field of `shot` by its entry in `table`.
///
/// Metadata is copied unchanged.
pub fn adjust(shot: &StandardizedShot, table: &ModifierTable) -> StandardizedShot {
    StandardizedShot {
        ball: shot.ball.adjusted(&table.ball_data),
        club: shot.club.adjusted(&table.club_data),
        options: shot.options.clone(),
    }
}

// ── ModifierHandle ───────────────────────────────────────────────

/// A consistent view of the table at one version.
#[derive(Debug, Clone)]
pub struct ModifierSnapshot {
    pub version: u64,
    pub table: Arc<ModifierTable>,
}

#[derive(Debug)]
struct Versioned {
    version: u64,
    table: Arc<ModifierTable>,
}

/// Shared, versioned access to the live [`ModifierTable`].
///
/// Readers clone an `Arc` under the read lock; writers swap the `Arc`
/// under the write lock, so a reader only ever sees a whole table.
#[derive(Debug, Clone)]
pub struct ModifierHandle {
    inner: Arc<RwLock<Versioned>>,
}

impl Default for ModifierHandle {
    fn default() -> Self {
        Self::new(ModifierTable::default())
    }
}

impl ModifierHandle {
    pub fn new(table: ModifierTable) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Versioned {
                version: 0,
                table: Arc::new(table),
            })),
        }
    }

    pub fn snapshot(&self) -> ModifierSnapshot {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        ModifierSnapshot {
            version: guard.version,
            table: Arc::clone(&guard.table),
        }
    }

    /// Install `table` and return its version.
    pub fn replace(&self, table: ModifierTable) -> u64 {
        let table = Arc::new(table);
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.version += 1;
        guard.table = table;
        tracing::info!(version = guard.version, "modifier table replaced");
        guard.version
    }

    /// Go back to the identity table.
    pub fn reset(&self) -> u64 {
        self.replace(ModifierTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shot::ClubType;

    fn sample_shot() -> StandardizedShot {
        StandardizedShot::measured(
            BallData {
                speed: 150.0,
                spin_axis: -10.0,
                total_spin: 3000.0,
                back_spin: Some(2900.0),
                side_spin: None,
                hla: -2.0,
                vla: 18.0,
                carry_distance: Some(250.0),
            },
            ClubData {
                speed: 105.0,
                angle_of_attack: -1.5,
                face_to_target: 0.5,
                lie: 1.0,
                loft: 12.0,
                path: 2.0,
                speed_at_impact: 104.0,
                vertical_face_impact: 0.1,
                horizontal_face_impact: -0.2,
                closure_rate: 2400.0,
            },
            ClubType::new("Driver"),
        )
    }

    #[test]
    fn identity_table_is_noop() {
        let shot = sample_shot();
        assert_eq!(adjust(&shot, &ModifierTable::default()), shot);
    }

    #[test]
    fn doubling_table_doubles_every_field() {
        let shot = sample_shot();
        let out = adjust(&shot, &ModifierTable::uniform(2.0));
        assert_eq!(out.ball.speed, 300.0);
        assert_eq!(out.ball.spin_axis, -20.0);
        assert_eq!(out.ball.total_spin, 6000.0);
        assert_eq!(out.ball.back_spin, Some(5800.0));
        assert_eq!(out.ball.side_spin, None);
        assert_eq!(out.ball.hla, -4.0);
        assert_eq!(out.ball.vla, 36.0);
        assert_eq!(out.ball.carry_distance, Some(500.0));
        assert_eq!(out.club.speed, 210.0);
        assert_eq!(out.club.angle_of_attack, -3.0);
        assert_eq!(out.club.closure_rate, 4800.0);
        assert_eq!(out.club.horizontal_face_impact, -0.4);
        assert_eq!(out.options, shot.options);
    }

    #[test]
    fn repeated_calls_are_independent() {
        let shot = sample_shot();
        let table = ModifierTable::uniform(2.0);
        let first = adjust(&shot, &table);
        let second = adjust(&shot, &table);
        assert_eq!(first, second);
        assert_eq!(shot.ball.speed, 150.0);
    }

    #[test]
    fn missing_multipliers_default_to_one() {
        let table: ModifierTable =
            serde_json::from_str(r#"{"ball_data":{"Speed":1.1}}"#).unwrap();
        assert_eq!(table.ball_data.speed, 1.1);
        assert_eq!(table.ball_data.vla, 1.0);
        assert_eq!(table.club_data, ClubModifiers::default());
    }

    #[test]
    fn handle_replace_bumps_version() {
        let handle = ModifierHandle::default();
        assert_eq!(handle.snapshot().version, 0);
        assert_eq!(handle.replace(ModifierTable::uniform(1.5)), 1);
        let snap = handle.snapshot();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.table.ball_data.speed, 1.5);
        assert_eq!(handle.reset(), 2);
        assert_eq!(*handle.snapshot().table, ModifierTable::default());
    }

    #[test]
    fn replace_is_never_torn() {
        let handle = ModifierHandle::default();
        let writer = {
            let handle = handle.clone();
            std::thread::spawn(move || {
                for i in 0..2000 {
                    let factor = if i % 2 == 0 { 2.0 } else { 1.0 };
                    handle.replace(ModifierTable::uniform(factor));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                std::thread::spawn(move || {
                    for _ in 0..2000 {
                        let snap = handle.snapshot();
                        let expected = snap.table.ball_data.speed;
                        assert_eq!(*snap.table, ModifierTable::uniform(expected));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
