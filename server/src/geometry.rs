//! Static map geometry
//!
//! The replication core only reads geometry: vent positions for vent-use
//! checks and spawn points for spawn validation. `GeometryLookup` is the seam;
//! `MapGeometry` is the JSON-backed implementation the server binary loads.

use serde::{Deserialize, Serialize};
use shared::{PlayerId, Vector2};
use std::path::Path;

use crate::error::ServerError;

/// Offset from a player's logical position to its physics collider
pub const COLLIDER_OFFSET: Vector2 = Vector2::new(0.0, -0.4);

/// Height adjustment added to every radial spawn position
const SPAWN_HEIGHT_OFFSET: Vector2 = Vector2::new(0.0, 0.3636);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MapKind {
    Skeld,
    MiraHq,
    Polus,
    /// Uses the staged spawn handshake instead of radial spawns
    Airship,
    Fungle,
}

impl MapKind {
    pub fn has_staged_spawn(&self) -> bool {
        matches!(self, MapKind::Airship)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vent {
    pub id: u32,
    pub name: String,
    pub position: Vector2,
}

/// Spawn data for maps where players pick their spawn point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedSpawn {
    /// Where every player is parked before choosing a spawn point
    pub pre_spawn: Vector2,
    /// Spawn points a player may choose from
    pub spawn_points: Vec<Vector2>,
}

/// Read-only queries against the active map
pub trait GeometryLookup: Send + Sync {
    /// Expected spawn position for a player, None when the map has no fixed spawn
    fn spawn_location(
        &self,
        player_id: PlayerId,
        player_count: usize,
        initial_spawn: bool,
    ) -> Option<Vector2>;

    fn pre_spawn_location(&self) -> Option<Vector2>;

    fn spawn_locations(&self) -> &[Vector2];

    fn vents(&self) -> &[Vent];

    fn vent(&self, id: u32) -> Option<&Vent> {
        self.vents().iter().find(|vent| vent.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapGeometry {
    pub map: MapKind,
    pub initial_spawn_center: Vector2,
    pub meeting_spawn_center: Vector2,
    pub spawn_radius: f32,
    pub vents: Vec<Vent>,
    #[serde(default)]
    pub staged_spawn: Option<StagedSpawn>,
}

impl MapGeometry {
    pub fn from_json(json: &str) -> Result<Self, ServerError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

impl GeometryLookup for MapGeometry {
    /// Players are placed on a circle around the spawn centre, each rotated
    /// by an equal share of the full turn according to their slot.
    fn spawn_location(
        &self,
        player_id: PlayerId,
        player_count: usize,
        initial_spawn: bool,
    ) -> Option<Vector2> {
        if self.staged_spawn.is_some() || player_count == 0 {
            return None;
        }

        let step = 360.0 / player_count as f32;
        let angle = (player_id as f32 - 1.0) * step;
        let offset = Vector2::UP.rotate(angle) * self.spawn_radius;

        let center = if initial_spawn {
            self.initial_spawn_center
        } else {
            self.meeting_spawn_center
        };

        Some(center + offset + SPAWN_HEIGHT_OFFSET)
    }

    fn pre_spawn_location(&self) -> Option<Vector2> {
        self.staged_spawn.as_ref().map(|staged| staged.pre_spawn)
    }

    fn spawn_locations(&self) -> &[Vector2] {
        self.staged_spawn
            .as_ref()
            .map(|staged| staged.spawn_points.as_slice())
            .unwrap_or(&[])
    }

    fn vents(&self) -> &[Vent] {
        &self.vents
    }
}
