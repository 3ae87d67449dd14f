//! Player position replication
//!
//! The owning client streams its position as sequence-tagged samples over an
//! unreliable channel. The server keeps the newest accepted sample, drops
//! duplicates and stale reorders, and publishes a movement event for each
//! sample it applies.
//!
//! Teleports arrive as `SnapTo` calls and are validated before they apply:
//! - the first snap after a spawn must land on the expected spawn point
//! - on staged-spawn maps the client walks a short handshake: staging point
//!   first, then one of the map's spawn points
//! - any other snap must land on a vent the player is allowed to use

use crate::component::{NetComponent, ObjectContext, RpcOutcome};
use crate::connection::{CheatCategory, CheatContext};
use crate::events::{EventBus, GameEvent, VentAction, VentEvent};
use crate::geometry::COLLIDER_OFFSET;
use log::{debug, info};
use shared::sequence::{self, is_newer};
use shared::{ClientId, MessageReader, MessageWriter, NetId, PlayerId, RpcCall, Vector2, WireError};

/// Encoded size of one position sample
const SAMPLE_BYTES: usize = 8;

/// Where the player is in the current spawn cycle
///
/// Transitions only move forward; a new cycle starts from `SnapPending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpawnState {
    /// Pre-spawn, and the next SnapTo is checked against the spawn point
    SnapPending,
    /// Pre-spawn with the spawn snap already used
    PreSpawn,
    /// Parked at the staging point, choosing a spawn point
    SelectingSpawn,
    Spawned,
}

impl SpawnState {
    pub fn is_pre_spawn(&self) -> bool {
        matches!(self, SpawnState::SnapPending | SpawnState::PreSpawn)
    }

    /// Consumes the one-shot spawn snap permission, if held
    fn take_snap_permission(&mut self) -> bool {
        if *self == SpawnState::SnapPending {
            *self = SpawnState::PreSpawn;
            true
        } else {
            false
        }
    }

    fn advance(&mut self, next: SpawnState) {
        if next > *self {
            *self = next;
        }
    }
}

pub struct TransformComponent {
    net_id: NetId,
    owner: ClientId,
    player_id: PlayerId,
    position: Vector2,
    last_sequence_id: u16,
    spawn_state: SpawnState,
    initial_spawn: bool,
    dirty: bool,
}

impl TransformComponent {
    pub fn new(net_id: NetId, owner: ClientId, player_id: PlayerId) -> Self {
        Self {
            net_id,
            owner,
            player_id,
            position: Vector2::ZERO,
            last_sequence_id: 0,
            spawn_state: SpawnState::PreSpawn,
            initial_spawn: false,
            dirty: false,
        }
    }

    pub fn position(&self) -> Vector2 {
        self.position
    }

    pub fn last_sequence_id(&self) -> u16 {
        self.last_sequence_id
    }

    pub fn spawn_state(&self) -> SpawnState {
        self.spawn_state
    }

    pub fn spawn_snap_allowed(&self) -> bool {
        self.spawn_state == SpawnState::SnapPending
    }

    pub fn initial_spawn(&self) -> bool {
        self.initial_spawn
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Starts a new spawn cycle; the next SnapTo is held to the spawn point
    pub fn on_player_spawn(&mut self, initial_spawn: bool) {
        info!(
            "Player {} (net id {}) spawning ({})",
            self.player_id,
            self.net_id,
            if initial_spawn { "initial" } else { "respawn" }
        );
        self.initial_spawn = initial_spawn;
        self.spawn_state = SpawnState::SnapPending;
    }

    async fn apply_position<B: EventBus>(
        &mut self,
        ctx: &ObjectContext<'_, B>,
        sender: ClientId,
        position: Vector2,
    ) {
        self.position = position;
        self.dirty = true;

        let mut event = ctx.movement_pool.acquire();
        event.fill(
            ctx.session.game_id,
            sender,
            self.net_id,
            self.player_id,
            position,
        );
        ctx.events.publish(GameEvent::PlayerMovement(&event)).await;
    }

    /// Applies a validated snap unless a newer sample already superseded it
    async fn apply_snap<B: EventBus>(
        &mut self,
        ctx: &ObjectContext<'_, B>,
        sender: ClientId,
        position: Vector2,
        min_sequence_id: u16,
    ) -> RpcOutcome {
        if !is_newer(min_sequence_id, self.last_sequence_id) {
            debug!(
                "Snap for net id {} superseded (seq {} <= {})",
                self.net_id, min_sequence_id, self.last_sequence_id
            );
            return RpcOutcome::Accepted;
        }

        self.last_sequence_id = min_sequence_id;
        self.apply_position(ctx, sender, position).await;
        RpcOutcome::Accepted
    }

    async fn expected_spawn<B: EventBus>(&self, ctx: &ObjectContext<'_, B>) -> Option<Vector2> {
        let geometry = ctx.session.geometry()?;
        let player_count = ctx.session.player_count().await;
        geometry.spawn_location(self.player_id, player_count, self.initial_spawn)
    }

    /// Advances the staged spawn handshake if `position` is the next step
    fn try_spawn_handshake<B: EventBus>(
        &mut self,
        ctx: &ObjectContext<'_, B>,
        position: Vector2,
    ) -> bool {
        if !ctx.session.map.has_staged_spawn() {
            return false;
        }
        let Some(geometry) = ctx.session.geometry() else {
            return false;
        };

        if self.spawn_state.is_pre_spawn() {
            let at_staging = geometry
                .pre_spawn_location()
                .map(|staging| position.approximately(&staging))
                .unwrap_or(false);

            if at_staging {
                info!("Player {} reached the staging point", self.player_id);
                self.spawn_state.advance(SpawnState::SelectingSpawn);
                return true;
            }
        } else if self.spawn_state == SpawnState::SelectingSpawn {
            let at_spawn_point = geometry
                .spawn_locations()
                .iter()
                .any(|spawn| position.approximately(spawn));

            if at_spawn_point {
                info!("Player {} picked a spawn point", self.player_id);
                self.spawn_state.advance(SpawnState::Spawned);
                return true;
            }
        }

        false
    }

    async fn handle_snap_to<B: EventBus>(
        &mut self,
        ctx: &ObjectContext<'_, B>,
        sender: ClientId,
        reader: &mut MessageReader,
    ) -> Result<RpcOutcome, WireError> {
        let context = CheatContext::Rpc(RpcCall::SnapTo);

        if !ctx.validator.validate_ownership(context, sender, self.owner).await {
            return Ok(RpcOutcome::Rejected);
        }

        let position = reader.read_vector2()?;
        let min_sequence_id = reader.read_u16()?;

        if self.spawn_state == SpawnState::SnapPending {
            let expected = self.expected_spawn(ctx).await;
            self.spawn_state.take_snap_permission();

            if let Some(expected) = expected {
                if !position.approximately(&expected) {
                    ctx.validator
                        .report_cheat(
                            context,
                            sender,
                            CheatCategory::Position,
                            "Failed spawn snap check",
                        )
                        .await;
                    return Ok(RpcOutcome::Rejected);
                }

                return Ok(self.apply_snap(ctx, sender, position, min_sequence_id).await);
            }
        }

        if self.try_spawn_handshake(ctx, position) {
            return Ok(self.apply_snap(ctx, sender, position, min_sequence_id).await);
        }

        let Some(actor) = ctx.session.player_info(self.player_id).await else {
            debug!("Snap for net id {} has no player info", self.net_id);
            return Ok(RpcOutcome::Rejected);
        };

        if !ctx.validator.validate_can_vent(context, sender, &actor).await {
            return Ok(RpcOutcome::Rejected);
        }

        let Some(geometry) = ctx.session.geometry() else {
            ctx.validator
                .report_cheat(
                    context,
                    sender,
                    CheatCategory::MissingGeometry,
                    "Snap with no map data to check vents against",
                )
                .await;
            return Ok(RpcOutcome::Rejected);
        };

        let collider = position + COLLIDER_OFFSET;
        let Some(vent) = geometry
            .vents()
            .iter()
            .find(|vent| vent.position.approximately(&collider))
            .cloned()
        else {
            ctx.validator
                .report_cheat(context, sender, CheatCategory::Position, "Failed vent check")
                .await;
            return Ok(RpcOutcome::Rejected);
        };

        let vent_event = VentEvent {
            game: ctx.session.game_id,
            sender,
            actor: self.net_id,
            player: self.player_id,
            vent,
            action: VentAction::Snap,
        };
        ctx.events.publish(GameEvent::PlayerVent(&vent_event)).await;

        Ok(self.apply_snap(ctx, sender, position, min_sequence_id).await)
    }
}

impl NetComponent for TransformComponent {
    fn net_id(&self) -> NetId {
        self.net_id
    }

    fn owner(&self) -> ClientId {
        self.owner
    }

    /// No position history is kept, so a delta always carries one sample
    fn serialize(&self, writer: &mut MessageWriter, initial_state: bool) -> bool {
        writer.write_u16(self.last_sequence_id);
        if !initial_state {
            writer.write_packed_u32(1);
        }
        writer.write_vector2(self.position);
        true
    }

    async fn deserialize<B: EventBus>(
        &mut self,
        ctx: &ObjectContext<'_, B>,
        sender: ClientId,
        target: Option<ClientId>,
        reader: &mut MessageReader,
        initial_state: bool,
    ) -> Result<(), WireError> {
        let sequence_id = reader.read_u16()?;

        if initial_state {
            let position = reader.read_vector2()?;
            self.last_sequence_id = sequence_id;
            self.position = position;
            self.dirty = true;
            return Ok(());
        }

        let context = CheatContext::Deserialize;
        if !ctx.validator.validate_ownership(context, sender, self.owner).await {
            return Ok(());
        }
        if !ctx.validator.validate_broadcast(context, sender, target).await {
            return Ok(());
        }

        let count = reader.read_packed_u32()? as usize;
        if count.saturating_mul(SAMPLE_BYTES) > reader.remaining() {
            return Err(WireError::UnexpectedEof {
                needed: count.saturating_mul(SAMPLE_BYTES),
                remaining: reader.remaining(),
            });
        }

        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            samples.push(reader.read_vector2()?);
        }

        for (index, position) in samples.into_iter().enumerate() {
            let sample_sequence = sequence::offset(sequence_id, index);
            if !is_newer(sample_sequence, self.last_sequence_id) {
                debug!(
                    "Dropping stale sample {} for net id {} (last {})",
                    sample_sequence, self.net_id, self.last_sequence_id
                );
                continue;
            }

            self.last_sequence_id = sample_sequence;
            self.apply_position(ctx, sender, position).await;
        }

        Ok(())
    }

    async fn handle_rpc<B: EventBus>(
        &mut self,
        ctx: &ObjectContext<'_, B>,
        sender: ClientId,
        _target: Option<ClientId>,
        call: RpcCall,
        reader: &mut MessageReader,
    ) -> Result<RpcOutcome, WireError> {
        match call {
            RpcCall::SnapTo => self.handle_snap_to(ctx, sender, reader).await,
            other => Ok(RpcOutcome::Unhandled(other)),
        }
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}
