//! Player physics: vent enter/exit calls
//!
//! Carries no replicated state of its own; it only validates vent use by id.

use crate::component::{NetComponent, ObjectContext, RpcOutcome};
use crate::connection::{CheatCategory, CheatContext};
use crate::events::{EventBus, GameEvent, VentAction, VentEvent};
use log::debug;
use shared::{ClientId, MessageReader, MessageWriter, NetId, PlayerId, RpcCall, WireError};

pub struct PlayerPhysicsComponent {
    net_id: NetId,
    owner: ClientId,
    player_id: PlayerId,
    /// Vent the player is currently hiding in
    in_vent: Option<u32>,
}

impl PlayerPhysicsComponent {
    pub fn new(net_id: NetId, owner: ClientId, player_id: PlayerId) -> Self {
        Self {
            net_id,
            owner,
            player_id,
            in_vent: None,
        }
    }

    pub fn in_vent(&self) -> Option<u32> {
        self.in_vent
    }

    async fn handle_vent<B: EventBus>(
        &mut self,
        ctx: &ObjectContext<'_, B>,
        sender: ClientId,
        call: RpcCall,
        reader: &mut MessageReader,
    ) -> Result<RpcOutcome, WireError> {
        let context = CheatContext::Rpc(call);

        if !ctx.validator.validate_ownership(context, sender, self.owner).await {
            return Ok(RpcOutcome::Rejected);
        }

        let vent_id = reader.read_packed_u32()?;

        let Some(actor) = ctx.session.player_info(self.player_id).await else {
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
                    "Vent use with no map data",
                )
                .await;
            return Ok(RpcOutcome::Rejected);
        };

        let Some(vent) = geometry.vent(vent_id).cloned() else {
            ctx.validator
                .report_cheat(context, sender, CheatCategory::Position, "Unknown vent id")
                .await;
            return Ok(RpcOutcome::Rejected);
        };

        let action = if call == RpcCall::EnterVent {
            self.in_vent = Some(vent.id);
            VentAction::Enter
        } else {
            if self.in_vent != Some(vent.id) {
                debug!(
                    "Player {} exiting vent {} without entering it",
                    self.player_id, vent.id
                );
            }
            self.in_vent = None;
            VentAction::Exit
        };

        let event = VentEvent {
            game: ctx.session.game_id,
            sender,
            actor: self.net_id,
            player: self.player_id,
            vent,
            action,
        };
        ctx.events.publish(GameEvent::PlayerVent(&event)).await;

        Ok(RpcOutcome::Accepted)
    }
}

impl NetComponent for PlayerPhysicsComponent {
    fn net_id(&self) -> NetId {
        self.net_id
    }

    fn owner(&self) -> ClientId {
        self.owner
    }

    fn serialize(&self, _writer: &mut MessageWriter, _initial_state: bool) -> bool {
        false
    }

    async fn deserialize<B: EventBus>(
        &mut self,
        _ctx: &ObjectContext<'_, B>,
        _sender: ClientId,
        _target: Option<ClientId>,
        _reader: &mut MessageReader,
        _initial_state: bool,
    ) -> Result<(), WireError> {
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
            RpcCall::EnterVent | RpcCall::ExitVent => {
                self.handle_vent(ctx, sender, call, reader).await
            }
            other => Ok(RpcOutcome::Unhandled(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventRecord;
    use crate::session::RoleKind;
    use crate::test_support::{vent_call, Fixture, SKELD_JSON};

    async fn call(
        physics: &mut PlayerPhysicsComponent,
        fixture: &Fixture,
        sender: ClientId,
        rpc: RpcCall,
        vent_id: u32,
    ) -> RpcOutcome {
        physics
            .handle_rpc(&fixture.ctx(), sender, None, rpc, &mut vent_call(vent_id))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_enter_and_exit_vent() {
        let fixture = Fixture::new(Some(SKELD_JSON), 1).await;
        let owner = fixture.clients[0];
        let player_id = fixture.add_player(owner, RoleKind::Engineer).await;
        let mut physics = PlayerPhysicsComponent::new(20, owner, player_id);

        assert_eq!(call(&mut physics, &fixture, owner, RpcCall::EnterVent, 1).await, RpcOutcome::Accepted);
        assert_eq!(physics.in_vent(), Some(1));

        assert_eq!(call(&mut physics, &fixture, owner, RpcCall::ExitVent, 1).await, RpcOutcome::Accepted);
        assert_eq!(physics.in_vent(), None);

        let actions: Vec<VentAction> = fixture
            .events
            .records()
            .into_iter()
            .filter_map(|record| match record {
                EventRecord::Vent(vent) => Some(vent.action),
                _ => None,
            })
            .collect();
        assert_eq!(actions, vec![VentAction::Enter, VentAction::Exit]);
    }

    #[tokio::test]
    async fn test_vent_rejections() {
        let fixture = Fixture::new(Some(SKELD_JSON), 2).await;
        let owner = fixture.clients[0];
        let player_id = fixture.add_player(owner, RoleKind::Crewmate).await;
        let mut physics = PlayerPhysicsComponent::new(20, owner, player_id);

        // Role cannot vent: rejected, not reported
        assert_eq!(call(&mut physics, &fixture, owner, RpcCall::EnterVent, 0).await, RpcOutcome::Rejected);
        assert_eq!(fixture.violations(owner).await, 0);

        fixture.session.set_role(player_id, RoleKind::Impostor).await;

        // Someone else's player
        let other = fixture.clients[1];
        assert_eq!(call(&mut physics, &fixture, other, RpcCall::EnterVent, 0).await, RpcOutcome::Rejected);

        // No such vent on this map
        assert_eq!(call(&mut physics, &fixture, owner, RpcCall::EnterVent, 9).await, RpcOutcome::Rejected);
        assert_eq!(fixture.violations(owner).await, 1);

        // Dead players stay out of vents
        fixture.session.set_dead(player_id, true).await;
        assert_eq!(call(&mut physics, &fixture, owner, RpcCall::EnterVent, 0).await, RpcOutcome::Rejected);

        assert_eq!(physics.in_vent(), None);
        assert!(fixture.events.records().is_empty());
    }

    #[tokio::test]
    async fn test_vent_without_geometry() {
        let fixture = Fixture::new(None, 1).await;
        let owner = fixture.clients[0];
        let player_id = fixture.add_player(owner, RoleKind::Shapeshifter).await;
        let mut physics = PlayerPhysicsComponent::new(20, owner, player_id);

        assert_eq!(call(&mut physics, &fixture, owner, RpcCall::EnterVent, 0).await, RpcOutcome::Rejected);
        assert_eq!(fixture.violations(owner).await, 1);
    }

    #[tokio::test]
    async fn test_state_and_other_calls() {
        let fixture = Fixture::new(Some(SKELD_JSON), 1).await;
        let owner = fixture.clients[0];
        let mut physics = PlayerPhysicsComponent::new(20, owner, 0);

        let mut writer = MessageWriter::new();
        assert!(!physics.serialize(&mut writer, true));
        assert!(writer.is_empty());

        assert_eq!(
            call(&mut physics, &fixture, owner, RpcCall::SnapTo, 0).await,
            RpcOutcome::Unhandled(RpcCall::SnapTo)
        );
    }
}
