//! Client connection tracking and cheat-report enforcement
//!
//! This module owns the server's view of who is connected:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - Capacity limits and address lookup for inbound packets
//! - The cheat-report policy: every report is recorded against the sender,
//!   and the configured policy decides whether the connection is dropped
//!
//! Whether a reported action is applied is never decided here. Callers
//! always reject the action; the report only decides the connection's fate.

use crate::config::AntiCheatConfig;
use log::{info, warn};
use shared::{ClientId, RpcCall};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// How many recent violations are kept per client for diagnostics
pub const RECENT_VIOLATIONS: usize = 16;

/// What the client was doing when a check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheatContext {
    Deserialize,
    Rpc(RpcCall),
}

impl fmt::Display for CheatContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheatContext::Deserialize => write!(f, "Deserialize"),
            CheatContext::Rpc(call) => write!(f, "Rpc({})", call),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheatCategory {
    /// Call the protocol does not define for the addressed object
    Protocol,
    /// Position that does not match map geometry
    Position,
    /// Movement with no map data to check it against
    MissingGeometry,
}

/// Outcome of reporting a violation
///
/// `violation_recorded` is always true for a connected client. Enforcement
/// depends on policy and never implies the reported action may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheatReport {
    pub violation_recorded: bool,
    pub connection_enforced: bool,
}

impl CheatReport {
    fn ignored() -> Self {
        Self {
            violation_recorded: false,
            connection_enforced: false,
        }
    }
}

/// A recorded violation
#[derive(Debug, Clone)]
pub struct Violation {
    pub context: CheatContext,
    pub category: CheatCategory,
    pub reason: String,
    pub at: Instant,
}

/// A connected client
#[derive(Debug)]
pub struct ClientConnection {
    /// Unique client identifier assigned by the server
    pub id: ClientId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Total violations reported against this client
    pub violation_count: u32,
    /// The most recent violations, oldest first, capped at `RECENT_VIOLATIONS`
    pub recent_violations: VecDeque<Violation>,
    /// Set once enforcement has removed the client from play
    pub kicked: bool,
}

impl ClientConnection {
    pub fn new(id: ClientId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            violation_count: 0,
            recent_violations: VecDeque::with_capacity(RECENT_VIOLATIONS),
            kicked: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    fn record(&mut self, violation: Violation) -> u32 {
        self.violation_count = self.violation_count.saturating_add(1);
        if self.recent_violations.len() == RECENT_VIOLATIONS {
            self.recent_violations.pop_front();
        }
        self.recent_violations.push_back(violation);
        self.violation_count
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Registry of connected clients plus the enforcement policy
pub struct ConnectionTable {
    clients: HashMap<ClientId, ClientConnection>,
    next_client_id: ClientId,
    max_clients: usize,
    policy: AntiCheatConfig,
    /// Clients removed by enforcement, waiting for a disconnect notice
    pending_disconnects: Vec<(ClientId, SocketAddr, String)>,
}

impl ConnectionTable {
    pub fn new(max_clients: usize, policy: AntiCheatConfig) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            policy,
            pending_disconnects: Vec::new(),
        }
    }

    /// Returns None if the server is at capacity
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ClientId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, ClientConnection::new(client_id, addr));

        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: ClientId) -> bool {
        if let Some(client) = self.clients.remove(&client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn get(&self, client_id: ClientId) -> Option<&ClientConnection> {
        self.clients.get(&client_id)
    }

    /// True if the client is connected and has not been kicked
    pub fn is_active(&self, client_id: ClientId) -> bool {
        self.clients
            .get(&client_id)
            .map(|client| !client.kicked)
            .unwrap_or(false)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ClientId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn touch(&mut self, client_id: ClientId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
        }
    }

    /// Records a violation and applies the enforcement policy
    pub fn report_cheat(
        &mut self,
        client_id: ClientId,
        context: CheatContext,
        category: CheatCategory,
        reason: &str,
    ) -> CheatReport {
        let policy = self.policy;
        let Some(client) = self.clients.get_mut(&client_id) else {
            warn!(
                "Cheat report for unknown client {} ({}, {:?}): {}",
                client_id, context, category, reason
            );
            return CheatReport::ignored();
        };

        let count = client.record(Violation {
            context,
            category,
            reason: reason.to_string(),
            at: Instant::now(),
        });
        let enforce = policy.enforce && !client.kicked && count >= policy.max_violations;

        warn!(
            "Client {} reported for cheating ({}, {:?}): {} [{} violation(s){}]",
            client_id,
            context,
            category,
            reason,
            count,
            if enforce { ", disconnecting" } else { "" }
        );

        if enforce {
            client.kicked = true;
            self.pending_disconnects
                .push((client_id, client.addr, format!("Cheat detected: {}", reason)));
        }

        CheatReport {
            violation_recorded: true,
            connection_enforced: enforce,
        }
    }

    pub fn violation_count(&self, client_id: ClientId) -> usize {
        self.clients
            .get(&client_id)
            .map(|client| client.violation_count as usize)
            .unwrap_or(0)
    }

    /// Drains clients removed by enforcement, dropping them from the table
    pub fn take_pending_disconnects(&mut self) -> Vec<(ClientId, SocketAddr, String)> {
        let pending = std::mem::take(&mut self.pending_disconnects);
        for (client_id, _, _) in &pending {
            self.clients.remove(client_id);
        }
        pending
    }

    /// Removes and returns clients silent for longer than `timeout`
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<ClientId> {
        let timed_out: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(*client_id);
        }

        timed_out
    }

    pub fn client_addrs(&self) -> Vec<(ClientId, SocketAddr)> {
        self.clients
            .iter()
            .filter(|(_, client)| !client.kicked)
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
