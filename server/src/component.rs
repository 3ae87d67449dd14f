//! The contract every replicated object component implements
//!
//! A component turns inbound bytes into state changes and its state back into
//! bytes. Inbound data arrives in two shapes:
//! - state frames (`deserialize`), either the object's initial snapshot or a
//!   delta pushed by the owning client
//! - remote calls (`handle_rpc`), tagged with an `RpcCall`
//!
//! A call the component does not implement comes back as
//! `RpcOutcome::Unhandled`. That is a protocol desync (version mismatch or a
//! client addressing the wrong object); the game layer logs it and decides
//! what happens to the connection.

use crate::events::{EventBus, EventPool, MovementEvent};
use crate::physics::PlayerPhysicsComponent;
use crate::session::GameSession;
use crate::transform::TransformComponent;
use crate::validator::CheatValidator;
use shared::{ClientId, MessageReader, MessageWriter, NetId, RpcCall, WireError};

/// Result of dispatching a remote call to a component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcOutcome {
    /// The call passed validation; any state change it implies has been made
    Accepted,
    /// Validation failed; nothing changed
    Rejected,
    /// The component does not implement this call
    Unhandled(RpcCall),
}

/// Shared collaborators a component needs while handling one message
pub struct ObjectContext<'a, B: EventBus> {
    pub session: &'a GameSession,
    pub validator: &'a CheatValidator,
    pub events: &'a B,
    pub movement_pool: &'a EventPool<MovementEvent>,
}

#[allow(async_fn_in_trait)]
pub trait NetComponent {
    fn net_id(&self) -> NetId;

    /// Client that controls this object
    fn owner(&self) -> ClientId;

    /// Writes the component state; returns false if nothing was written
    fn serialize(&self, writer: &mut MessageWriter, initial_state: bool) -> bool;

    async fn deserialize<B: EventBus>(
        &mut self,
        ctx: &ObjectContext<'_, B>,
        sender: ClientId,
        target: Option<ClientId>,
        reader: &mut MessageReader,
        initial_state: bool,
    ) -> Result<(), WireError>;

    async fn handle_rpc<B: EventBus>(
        &mut self,
        _ctx: &ObjectContext<'_, B>,
        _sender: ClientId,
        _target: Option<ClientId>,
        call: RpcCall,
        _reader: &mut MessageReader,
    ) -> Result<RpcOutcome, WireError> {
        Ok(RpcOutcome::Unhandled(call))
    }

    /// True if state changed since the last broadcast
    fn is_dirty(&self) -> bool {
        false
    }

    fn clear_dirty(&mut self) {}
}

/// Every component kind the server replicates
pub enum Component {
    Transform(TransformComponent),
    Physics(PlayerPhysicsComponent),
}

impl Component {
    pub fn as_transform(&self) -> Option<&TransformComponent> {
        match self {
            Component::Transform(transform) => Some(transform),
            _ => None,
        }
    }

    pub fn as_transform_mut(&mut self) -> Option<&mut TransformComponent> {
        match self {
            Component::Transform(transform) => Some(transform),
            _ => None,
        }
    }
}

impl NetComponent for Component {
    fn net_id(&self) -> NetId {
        match self {
            Component::Transform(inner) => inner.net_id(),
            Component::Physics(inner) => inner.net_id(),
        }
    }

    fn owner(&self) -> ClientId {
        match self {
            Component::Transform(inner) => inner.owner(),
            Component::Physics(inner) => inner.owner(),
        }
    }

    fn serialize(&self, writer: &mut MessageWriter, initial_state: bool) -> bool {
        match self {
            Component::Transform(inner) => inner.serialize(writer, initial_state),
            Component::Physics(inner) => inner.serialize(writer, initial_state),
        }
    }

    async fn deserialize<B: EventBus>(
        &mut self,
        ctx: &ObjectContext<'_, B>,
        sender: ClientId,
        target: Option<ClientId>,
        reader: &mut MessageReader,
        initial_state: bool,
    ) -> Result<(), WireError> {
        match self {
            Component::Transform(inner) => {
                inner
                    .deserialize(ctx, sender, target, reader, initial_state)
                    .await
            }
            Component::Physics(inner) => {
                inner
                    .deserialize(ctx, sender, target, reader, initial_state)
                    .await
            }
        }
    }

    async fn handle_rpc<B: EventBus>(
        &mut self,
        ctx: &ObjectContext<'_, B>,
        sender: ClientId,
        target: Option<ClientId>,
        call: RpcCall,
        reader: &mut MessageReader,
    ) -> Result<RpcOutcome, WireError> {
        match self {
            Component::Transform(inner) => inner.handle_rpc(ctx, sender, target, call, reader).await,
            Component::Physics(inner) => inner.handle_rpc(ctx, sender, target, call, reader).await,
        }
    }

    fn is_dirty(&self) -> bool {
        match self {
            Component::Transform(inner) => inner.is_dirty(),
            Component::Physics(inner) => inner.is_dirty(),
        }
    }

    fn clear_dirty(&mut self) {
        match self {
            Component::Transform(inner) => inner.clear_dirty(),
            Component::Physics(inner) => inner.clear_dirty(),
        }
    }
}
