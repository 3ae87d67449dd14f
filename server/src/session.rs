//! Per-game session state the replication core reads
//!
//! Holds the active map, its geometry (when loaded) and the player roster.
//! Roles and liveness are written by game logic outside this crate; the
//! core only reads them to decide vent capability and spawn positions.

use crate::geometry::{GeometryLookup, MapKind};
use log::info;
use shared::{ClientId, PlayerId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Identifier of a game instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GameId(pub u32);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "game-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Crewmate,
    Impostor,
    Scientist,
    Engineer,
    GuardianAngel,
    Shapeshifter,
}

impl RoleKind {
    pub fn can_vent(&self) -> bool {
        matches!(
            self,
            RoleKind::Impostor | RoleKind::Shapeshifter | RoleKind::Engineer
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub client_id: ClientId,
    pub role: RoleKind,
    pub is_dead: bool,
}

impl PlayerInfo {
    pub fn new(player_id: PlayerId, client_id: ClientId) -> Self {
        Self {
            player_id,
            client_id,
            role: RoleKind::Crewmate,
            is_dead: false,
        }
    }

    pub fn can_vent(&self) -> bool {
        !self.is_dead && self.role.can_vent()
    }
}

pub struct GameSession {
    pub game_id: GameId,
    pub map: MapKind,
    geometry: Option<Arc<dyn GeometryLookup>>,
    players: RwLock<HashMap<PlayerId, PlayerInfo>>,
}

impl GameSession {
    pub fn new(game_id: GameId, map: MapKind, geometry: Option<Arc<dyn GeometryLookup>>) -> Self {
        Self {
            game_id,
            map,
            geometry,
            players: RwLock::new(HashMap::new()),
        }
    }

    pub fn geometry(&self) -> Option<&dyn GeometryLookup> {
        self.geometry.as_deref()
    }

    /// Adds a player in the lowest free slot
    pub async fn add_player(&self, client_id: ClientId) -> Option<PlayerId> {
        let mut players = self.players.write().await;
        let player_id = (0..=PlayerId::MAX).find(|id| !players.contains_key(id))?;

        players.insert(player_id, PlayerInfo::new(player_id, client_id));
        info!(
            "{}: client {} joined as player {}",
            self.game_id, client_id, player_id
        );
        Some(player_id)
    }

    /// Removes every player belonging to the client
    pub async fn remove_client(&self, client_id: ClientId) -> Vec<PlayerId> {
        let mut players = self.players.write().await;
        let removed: Vec<PlayerId> = players
            .values()
            .filter(|player| player.client_id == client_id)
            .map(|player| player.player_id)
            .collect();

        for player_id in &removed {
            players.remove(player_id);
        }
        removed
    }

    pub async fn player_info(&self, player_id: PlayerId) -> Option<PlayerInfo> {
        self.players.read().await.get(&player_id).cloned()
    }

    pub async fn player_count(&self) -> usize {
        self.players.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn lock_roster(
        &self,
    ) -> tokio::sync::RwLockWriteGuard<'_, HashMap<PlayerId, PlayerInfo>> {
        self.players.write().await
    }

    pub async fn set_role(&self, player_id: PlayerId, role: RoleKind) -> bool {
        match self.players.write().await.get_mut(&player_id) {
            Some(player) => {
                player.role = role;
                true
            }
            None => false,
        }
    }

    pub async fn set_dead(&self, player_id: PlayerId, is_dead: bool) -> bool {
        match self.players.write().await.get_mut(&player_id) {
            Some(player) => {
                player.is_dead = is_dead;
                true
            }
            None => false,
        }
    }
}
