//! Events published after accepted state changes
//!
//! Movement events are drawn from an `EventPool`, filled, published and
//! returned when the `Pooled` guard drops, so a slot is released on every
//! exit path, including a cancelled publish. Subscribers only ever see a
//! borrowed event; anything that outlives the publish call takes an owned
//! `EventRecord`.

use crate::geometry::Vent;
use crate::session::GameId;
use log::debug;
use shared::{ClientId, NetId, PlayerId, Vector2};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Items that can be recycled through an `EventPool`
pub trait Poolable: Default {
    /// Clears every field so no state leaks into the next checkout
    fn reset(&mut self);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovementEvent {
    pub game: Option<GameId>,
    pub sender: Option<ClientId>,
    pub actor: Option<NetId>,
    pub player: Option<PlayerId>,
    pub position: Vector2,
}

impl MovementEvent {
    pub fn fill(
        &mut self,
        game: GameId,
        sender: ClientId,
        actor: NetId,
        player: PlayerId,
        position: Vector2,
    ) {
        self.game = Some(game);
        self.sender = Some(sender);
        self.actor = Some(actor);
        self.player = Some(player);
        self.position = position;
    }
}

impl Poolable for MovementEvent {
    fn reset(&mut self) {
        *self = MovementEvent::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VentAction {
    /// Player moved onto a vent with a SnapTo
    Snap,
    Enter,
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VentEvent {
    pub game: GameId,
    pub sender: ClientId,
    pub actor: NetId,
    pub player: PlayerId,
    pub vent: Vent,
    pub action: VentAction,
}

/// Borrowed view handed to subscribers
#[derive(Debug, Clone, Copy)]
pub enum GameEvent<'a> {
    PlayerMovement(&'a MovementEvent),
    PlayerVent(&'a VentEvent),
}

/// Owned copy of an event for subscribers that keep it
#[derive(Debug, Clone, PartialEq)]
pub enum EventRecord {
    Movement(MovementEvent),
    Vent(VentEvent),
}

impl From<GameEvent<'_>> for EventRecord {
    fn from(event: GameEvent<'_>) -> Self {
        match event {
            GameEvent::PlayerMovement(movement) => EventRecord::Movement(movement.clone()),
            GameEvent::PlayerVent(vent) => EventRecord::Vent(vent.clone()),
        }
    }
}

/// Downstream consumer of object events
///
/// `publish` completes once subscribers are done with the event.
#[allow(async_fn_in_trait)]
pub trait EventBus {
    async fn publish(&self, event: GameEvent<'_>);
}

/// Discards every event
pub struct NullEventBus;

impl EventBus for NullEventBus {
    async fn publish(&self, _event: GameEvent<'_>) {}
}

/// Forwards events over a bounded channel; publishing waits for capacity
#[derive(Clone)]
pub struct ChannelEventBus {
    sender: mpsc::Sender<EventRecord>,
}

impl ChannelEventBus {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EventRecord>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

impl EventBus for ChannelEventBus {
    async fn publish(&self, event: GameEvent<'_>) {
        if self.sender.send(EventRecord::from(event)).await.is_err() {
            debug!("Event channel closed, dropping event");
        }
    }
}

/// Keeps every published event, for inspection in tests and tools
#[derive(Default)]
pub struct RecordingEventBus {
    records: Mutex<Vec<EventRecord>>,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn take(&self) -> Vec<EventRecord> {
        std::mem::take(
            &mut *self
                .records
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    pub fn movement_count(&self) -> usize {
        self.records()
            .iter()
            .filter(|record| matches!(record, EventRecord::Movement(_)))
            .count()
    }
}

impl EventBus for RecordingEventBus {
    async fn publish(&self, event: GameEvent<'_>) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(EventRecord::from(event));
    }
}

/// Free-list of reusable events
pub struct EventPool<T: Poolable> {
    free: Mutex<Vec<T>>,
    max_idle: usize,
    checked_out: AtomicUsize,
}

impl<T: Poolable> EventPool<T> {
    pub fn new(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
            checked_out: AtomicUsize::new(0),
        }
    }

    /// Checks out a cleared event; it returns to the pool when the guard drops
    pub fn acquire(&self) -> Pooled<'_, T> {
        let item = self
            .free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
            .unwrap_or_default();

        self.checked_out.fetch_add(1, Ordering::AcqRel);
        Pooled { pool: self, item }
    }

    /// Number of events currently checked out
    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::Acquire)
    }

    pub fn idle(&self) -> usize {
        self.free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn release(&self, mut item: T) {
        item.reset();
        self.checked_out.fetch_sub(1, Ordering::AcqRel);

        let mut free = self
            .free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if free.len() < self.max_idle {
            free.push(item);
        }
    }
}

/// Scoped checkout from an `EventPool`
pub struct Pooled<'a, T: Poolable> {
    pool: &'a EventPool<T>,
    item: T,
}

impl<T: Poolable> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T: Poolable> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.item
    }
}

impl<T: Poolable> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.item));
    }
}
