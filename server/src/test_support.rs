//! Shared fixture for component tests

use crate::component::ObjectContext;
use crate::config::AntiCheatConfig;
use crate::connection::ConnectionTable;
use crate::events::{EventPool, MovementEvent, RecordingEventBus};
use crate::geometry::{GeometryLookup, MapGeometry, MapKind};
use crate::session::{GameId, GameSession, RoleKind};
use crate::validator::CheatValidator;
use shared::{ClientId, MessageReader, MessageWriter, PlayerId, Vector2};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Radial-spawn map with two vents
pub const SKELD_JSON: &str = r#"{
    "map": "skeld",
    "initial_spawn_center": { "x": -1.0, "y": 1.0 },
    "meeting_spawn_center": { "x": -1.0, "y": -2.0 },
    "spawn_radius": 1.5,
    "vents": [
        { "id": 0, "name": "Admin", "position": { "x": 2.0, "y": -10.0 } },
        { "id": 1, "name": "Navigation", "position": { "x": 16.0, "y": -4.0 } }
    ]
}"#;

/// Staged-spawn map
pub const AIRSHIP_JSON: &str = r#"{
    "map": "airship",
    "initial_spawn_center": { "x": 0.0, "y": 0.0 },
    "meeting_spawn_center": { "x": 0.0, "y": 0.0 },
    "spawn_radius": 0.0,
    "vents": [
        { "id": 0, "name": "Vault", "position": { "x": -12.5, "y": 8.0 } }
    ],
    "staged_spawn": {
        "pre_spawn": { "x": -25.0, "y": 40.0 },
        "spawn_points": [
            { "x": -0.5, "y": 8.5 },
            { "x": -0.5, "y": -1.0 }
        ]
    }
}"#;

/// Logical position whose collider sits on the vent at `vent`
pub fn above_vent(vent: Vector2) -> Vector2 {
    Vector2::new(vent.x, vent.y + 0.4)
}

pub struct Fixture {
    pub session: GameSession,
    pub validator: CheatValidator,
    pub events: RecordingEventBus,
    pub movement_pool: EventPool<MovementEvent>,
    pub clients: Vec<ClientId>,
}

impl Fixture {
    /// Fixture with reports recorded but never enforced
    pub async fn new(map_json: Option<&str>, client_count: usize) -> Self {
        Self::with_policy(
            map_json,
            client_count,
            AntiCheatConfig {
                enforce: false,
                max_violations: 1,
            },
        )
        .await
    }

    pub async fn with_policy(
        map_json: Option<&str>,
        client_count: usize,
        policy: AntiCheatConfig,
    ) -> Self {
        let geometry = map_json.map(|json| MapGeometry::from_json(json).unwrap());
        let map = geometry
            .as_ref()
            .map(|geometry| geometry.map)
            .unwrap_or(MapKind::Skeld);
        let geometry = geometry.map(|geometry| Arc::new(geometry) as Arc<dyn GeometryLookup>);

        let table = Arc::new(RwLock::new(ConnectionTable::new(16, policy)));
        let mut clients = Vec::new();
        {
            let mut table = table.write().await;
            for port in 0..client_count {
                let addr = format!("127.0.0.1:{}", 7000 + port).parse().unwrap();
                clients.push(table.add_client(addr).unwrap());
            }
        }

        Self {
            session: GameSession::new(GameId(1), map, geometry),
            validator: CheatValidator::new(table),
            events: RecordingEventBus::new(),
            movement_pool: EventPool::new(8),
            clients,
        }
    }

    pub fn ctx(&self) -> ObjectContext<'_, RecordingEventBus> {
        ObjectContext {
            session: &self.session,
            validator: &self.validator,
            events: &self.events,
            movement_pool: &self.movement_pool,
        }
    }

    /// Adds a roster entry for the client with the given role
    pub async fn add_player(&self, client_id: ClientId, role: RoleKind) -> PlayerId {
        let player_id = self.session.add_player(client_id).await.unwrap();
        self.session.set_role(player_id, role).await;
        player_id
    }

    pub async fn violations(&self, client_id: ClientId) -> usize {
        self.validator
            .connections()
            .read()
            .await
            .violation_count(client_id)
    }
}

/// Delta frame body: first sequence id, sample count, samples
pub fn delta_frame(sequence_id: u16, samples: &[Vector2]) -> MessageReader {
    let mut writer = MessageWriter::new();
    writer.write_u16(sequence_id);
    writer.write_packed_u32(samples.len() as u32);
    for sample in samples {
        writer.write_vector2(*sample);
    }
    writer.into_reader()
}

/// Initial state frame body: sequence id, position
pub fn initial_frame(sequence_id: u16, position: Vector2) -> MessageReader {
    let mut writer = MessageWriter::new();
    writer.write_u16(sequence_id);
    writer.write_vector2(position);
    writer.into_reader()
}

/// SnapTo call body: position, minimum sequence id
pub fn snap_to(position: Vector2, min_sequence_id: u16) -> MessageReader {
    let mut writer = MessageWriter::new();
    writer.write_vector2(position);
    writer.write_u16(min_sequence_id);
    writer.into_reader()
}

/// EnterVent or ExitVent call body
pub fn vent_call(vent_id: u32) -> MessageReader {
    let mut writer = MessageWriter::new();
    writer.write_packed_u32(vent_id);
    writer.into_reader()
}
