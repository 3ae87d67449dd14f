//! Authorization checks and cheat reporting for inbound object traffic
//!
//! Each check consults the connection table, so it may suspend while the
//! table is locked. A failed check is an authorization failure: the caller
//! discards the frame or call without touching state. Failed checks are not
//! reported as cheats, since stale ownership is a normal race around
//! reconnects and object hand-offs. Geometry and handshake mismatches are
//! reported through `report_cheat`.

use crate::connection::{CheatCategory, CheatContext, CheatReport, ConnectionTable};
use crate::session::PlayerInfo;
use log::debug;
use shared::ClientId;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct CheatValidator {
    connections: Arc<RwLock<ConnectionTable>>,
}

impl CheatValidator {
    pub fn new(connections: Arc<RwLock<ConnectionTable>>) -> Self {
        Self { connections }
    }

    pub fn connections(&self) -> &Arc<RwLock<ConnectionTable>> {
        &self.connections
    }

    /// Fails unless `sender` is connected and controls the object
    pub async fn validate_ownership(
        &self,
        context: CheatContext,
        sender: ClientId,
        owner: ClientId,
    ) -> bool {
        if !self.connections.read().await.is_active(sender) {
            debug!("{}: sender {} is not an active connection", context, sender);
            return false;
        }

        if sender != owner {
            debug!(
                "{}: sender {} does not own object (owner {})",
                context, sender, owner
            );
            return false;
        }

        true
    }

    /// Fails unless the update may propagate from `sender` to `target`
    ///
    /// Object state is replicated to everyone, so only untargeted updates
    /// pass. A target must at least be a live connection to be considered.
    pub async fn validate_broadcast(
        &self,
        context: CheatContext,
        sender: ClientId,
        target: Option<ClientId>,
    ) -> bool {
        let Some(target) = target else {
            return true;
        };

        let connected = self.connections.read().await.is_active(target);
        debug!(
            "{}: sender {} tried to send to {} only (target {})",
            context,
            sender,
            target,
            if connected { "connected" } else { "unknown" }
        );
        false
    }

    /// Fails unless the actor's role and state allow venting
    pub async fn validate_can_vent(
        &self,
        context: CheatContext,
        sender: ClientId,
        actor: &PlayerInfo,
    ) -> bool {
        if !self.connections.read().await.is_active(sender) {
            return false;
        }

        if !actor.can_vent() {
            debug!(
                "{}: player {} ({:?}, dead: {}) cannot vent",
                context, actor.player_id, actor.role, actor.is_dead
            );
            return false;
        }

        true
    }

    pub async fn report_cheat(
        &self,
        context: CheatContext,
        sender: ClientId,
        category: CheatCategory,
        reason: &str,
    ) -> CheatReport {
        self.connections
            .write()
            .await
            .report_cheat(sender, context, category, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AntiCheatConfig;
    use crate::session::RoleKind;
    use shared::RpcCall;

    async fn validator_with_clients(count: usize) -> (CheatValidator, Vec<ClientId>) {
        let table = Arc::new(RwLock::new(ConnectionTable::new(
            8,
            AntiCheatConfig::default(),
        )));

        let mut ids = Vec::new();
        {
            let mut table = table.write().await;
            for port in 0..count {
                let addr = format!("127.0.0.1:{}", 9000 + port).parse().unwrap();
                ids.push(table.add_client(addr).unwrap());
            }
        }

        (CheatValidator::new(table), ids)
    }

    const SNAP: CheatContext = CheatContext::Rpc(RpcCall::SnapTo);

    #[tokio::test]
    async fn test_ownership() {
        let (validator, ids) = validator_with_clients(2).await;

        assert!(validator.validate_ownership(SNAP, ids[0], ids[0]).await);
        assert!(!validator.validate_ownership(SNAP, ids[1], ids[0]).await);
        assert!(!validator.validate_ownership(SNAP, 77, 77).await);
    }

    #[tokio::test]
    async fn test_broadcast() {
        let (validator, ids) = validator_with_clients(2).await;

        assert!(validator.validate_broadcast(SNAP, ids[0], None).await);
        assert!(!validator.validate_broadcast(SNAP, ids[0], Some(ids[1])).await);
    }

    #[tokio::test]
    async fn test_can_vent() {
        let (validator, ids) = validator_with_clients(1).await;
        let mut actor = PlayerInfo::new(0, ids[0]);

        assert!(!validator.validate_can_vent(SNAP, ids[0], &actor).await);

        actor.role = RoleKind::Impostor;
        assert!(validator.validate_can_vent(SNAP, ids[0], &actor).await);
    }

    #[tokio::test]
    async fn test_report_disables_sender() {
        let (validator, ids) = validator_with_clients(1).await;

        let report = validator
            .report_cheat(SNAP, ids[0], CheatCategory::Position, "bad snap")
            .await;
        assert!(report.connection_enforced);

        // A kicked client no longer passes ownership
        assert!(!validator.validate_ownership(SNAP, ids[0], ids[0]).await);
    }
}
