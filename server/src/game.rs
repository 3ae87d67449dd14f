//! A game instance's replicated objects and message routing
//!
//! Every object sits behind its own async mutex: handlers for one object run
//! one at a time, while handlers for different objects may interleave at
//! their suspension points (validator lookups, event publication).

use crate::component::{Component, NetComponent, ObjectContext, RpcOutcome};
use crate::connection::{CheatCategory, CheatContext};
use crate::error::ServerError;
use crate::events::{EventBus, EventPool, MovementEvent};
use crate::physics::PlayerPhysicsComponent;
use crate::session::GameSession;
use crate::transform::TransformComponent;
use crate::validator::CheatValidator;
use bytes::Bytes;
use log::{debug, error, info};
use shared::{ClientId, MessageReader, MessageWriter, NetId, PlayerId, RpcCall};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Idle movement events kept for reuse
const MOVEMENT_POOL_SIZE: usize = 32;

pub type ObjectHandle = Arc<Mutex<Component>>;

/// Net ids created for a joining player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerObjects {
    pub player_id: PlayerId,
    pub transform_id: NetId,
    pub physics_id: NetId,
}

/// Serialized state of an object whose state changed since the last tick
#[derive(Debug, Clone)]
pub struct DirtyObject {
    pub net_id: NetId,
    pub owner: ClientId,
    pub payload: Bytes,
}

pub struct Game<B: EventBus> {
    session: GameSession,
    validator: CheatValidator,
    events: B,
    movement_pool: EventPool<MovementEvent>,
    objects: RwLock<HashMap<NetId, ObjectHandle>>,
    next_net_id: AtomicU32,
}

impl<B: EventBus> Game<B> {
    pub fn new(session: GameSession, validator: CheatValidator, events: B) -> Self {
        Self {
            session,
            validator,
            events,
            movement_pool: EventPool::new(MOVEMENT_POOL_SIZE),
            objects: RwLock::new(HashMap::new()),
            next_net_id: AtomicU32::new(1),
        }
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn validator(&self) -> &CheatValidator {
        &self.validator
    }

    pub fn events(&self) -> &B {
        &self.events
    }

    pub fn movement_pool(&self) -> &EventPool<MovementEvent> {
        &self.movement_pool
    }

    fn context(&self) -> ObjectContext<'_, B> {
        ObjectContext {
            session: &self.session,
            validator: &self.validator,
            events: &self.events,
            movement_pool: &self.movement_pool,
        }
    }

    fn allocate_net_id(&self) -> NetId {
        self.next_net_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn object(&self, net_id: NetId) -> Option<ObjectHandle> {
        self.objects.read().await.get(&net_id).cloned()
    }

    async fn require_object(&self, net_id: NetId) -> Result<ObjectHandle, ServerError> {
        self.object(net_id)
            .await
            .ok_or(ServerError::UnknownObject(net_id))
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Adds the client to the roster and creates its player objects
    pub async fn spawn_player(&self, client_id: ClientId) -> Option<PlayerObjects> {
        let player_id = self.session.add_player(client_id).await?;

        let transform_id = self.allocate_net_id();
        let physics_id = self.allocate_net_id();

        let mut objects = self.objects.write().await;
        objects.insert(
            transform_id,
            Arc::new(Mutex::new(Component::Transform(TransformComponent::new(
                transform_id,
                client_id,
                player_id,
            )))),
        );
        objects.insert(
            physics_id,
            Arc::new(Mutex::new(Component::Physics(PlayerPhysicsComponent::new(
                physics_id, client_id, player_id,
            )))),
        );

        info!(
            "Spawned player {} for client {} (transform {}, physics {})",
            player_id, client_id, transform_id, physics_id
        );

        Some(PlayerObjects {
            player_id,
            transform_id,
            physics_id,
        })
    }

    /// Removes the client's players and every object it owns
    pub async fn despawn_client(&self, client_id: ClientId) {
        self.session.remove_client(client_id).await;

        let handles: Vec<(NetId, ObjectHandle)> = self
            .objects
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect();

        let mut owned = Vec::new();
        for (net_id, handle) in handles {
            if handle.lock().await.owner() == client_id {
                owned.push(net_id);
            }
        }

        let mut objects = self.objects.write().await;
        for net_id in &owned {
            objects.remove(net_id);
        }
        debug!("Despawned {} object(s) of client {}", owned.len(), client_id);
    }

    /// Starts a new spawn cycle on a transform
    pub async fn on_player_spawn(&self, net_id: NetId, initial_spawn: bool) -> Result<(), ServerError> {
        let handle = self.require_object(net_id).await?;
        let mut component = handle.lock().await;

        match component.as_transform_mut() {
            Some(transform) => {
                transform.on_player_spawn(initial_spawn);
                Ok(())
            }
            None => Err(ServerError::UnknownObject(net_id)),
        }
    }

    /// Routes a state frame to the addressed object
    pub async fn handle_data(
        &self,
        sender: ClientId,
        target: Option<ClientId>,
        net_id: NetId,
        payload: impl Into<Bytes>,
        initial_state: bool,
    ) -> Result<(), ServerError> {
        let handle = self.require_object(net_id).await?;
        let mut reader = MessageReader::new(payload);
        let ctx = self.context();

        let mut component = handle.lock().await;
        component
            .deserialize(&ctx, sender, target, &mut reader, initial_state)
            .await?;
        Ok(())
    }

    /// Routes a remote call to the addressed object
    ///
    /// An unhandled call is logged and reported to the sender's connection;
    /// the policy there decides whether the client stays.
    pub async fn handle_rpc(
        &self,
        sender: ClientId,
        target: Option<ClientId>,
        net_id: NetId,
        call: RpcCall,
        payload: impl Into<Bytes>,
    ) -> Result<RpcOutcome, ServerError> {
        let handle = self.require_object(net_id).await?;
        let mut reader = MessageReader::new(payload);
        let ctx = self.context();

        let outcome = {
            let mut component = handle.lock().await;
            component
                .handle_rpc(&ctx, sender, target, call, &mut reader)
                .await?
        };

        if let RpcOutcome::Unhandled(call) = outcome {
            error!(
                "Protocol desync: client {} sent unhandled call {} to net id {}",
                sender, call, net_id
            );
            self.validator
                .report_cheat(
                    CheatContext::Rpc(call),
                    sender,
                    CheatCategory::Protocol,
                    "Unhandled remote call",
                )
                .await;
        }

        Ok(outcome)
    }

    pub async fn serialize_object(
        &self,
        net_id: NetId,
        initial_state: bool,
    ) -> Result<Option<Bytes>, ServerError> {
        let handle = self.require_object(net_id).await?;
        let component = handle.lock().await;

        let mut writer = MessageWriter::new();
        if component.serialize(&mut writer, initial_state) {
            Ok(Some(writer.freeze()))
        } else {
            Ok(None)
        }
    }

    /// Full state of every object that serializes any, for a joining client
    pub async fn snapshot(&self) -> Vec<(NetId, Bytes)> {
        let handles: Vec<(NetId, ObjectHandle)> = self
            .objects
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect();

        let mut snapshot = Vec::new();
        for (net_id, handle) in handles {
            let mut writer = MessageWriter::new();
            if handle.lock().await.serialize(&mut writer, true) {
                snapshot.push((net_id, writer.freeze()));
            }
        }
        snapshot
    }

    /// Delta state of every changed object, clearing the changed flag
    pub async fn take_dirty(&self) -> Vec<DirtyObject> {
        let handles: Vec<ObjectHandle> = self.objects.read().await.values().cloned().collect();

        let mut dirty = Vec::new();
        for handle in handles {
            let mut component = handle.lock().await;
            if !component.is_dirty() {
                continue;
            }

            let mut writer = MessageWriter::new();
            if component.serialize(&mut writer, false) {
                dirty.push(DirtyObject {
                    net_id: component.net_id(),
                    owner: component.owner(),
                    payload: writer.freeze(),
                });
            }
            component.clear_dirty();
        }
        dirty
    }
}
