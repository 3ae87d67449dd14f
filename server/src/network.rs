//! UDP harness: receives packets, routes object traffic into the game and
//! broadcasts replicated state

use crate::config::ServerConfig;
use crate::connection::ConnectionTable;
use crate::error::ServerError;
use crate::events::{ChannelEventBus, EventRecord};
use crate::game::Game;
use crate::geometry::{GeometryLookup, MapGeometry};
use crate::session::{GameId, GameSession};
use crate::validator::CheatValidator;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ClientId, Packet, RpcCall, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Bound on events waiting for the event consumer
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: ClientId },
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<ClientId>,
    },
}

/// Main server coordinating networking and replication
pub struct Server {
    socket: Arc<UdpSocket>,
    connections: Arc<RwLock<ConnectionTable>>,
    game: Game<ChannelEventBus>,
    tick_duration: Duration,
    client_timeout: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
    event_rx: Option<mpsc::Receiver<EventRecord>>,
}

impl Server {
    pub async fn new(
        config: &ServerConfig,
        geometry: Option<MapGeometry>,
    ) -> Result<Self, ServerError> {
        let addr = config.bind_address();
        let socket = Arc::new(UdpSocket::bind(&addr).await?);
        info!("Server listening on {}", addr);

        let connections = Arc::new(RwLock::new(ConnectionTable::new(
            config.max_clients,
            config.anti_cheat(),
        )));

        let geometry = geometry.map(|geometry| Arc::new(geometry) as Arc<dyn GeometryLookup>);
        if geometry.is_none() {
            warn!("No map data loaded: vent snaps will be rejected");
        }

        let session = GameSession::new(GameId(1), config.map, geometry);
        let validator = CheatValidator::new(Arc::clone(&connections));
        let (events, event_rx) = ChannelEventBus::new(EVENT_CHANNEL_CAPACITY);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            connections,
            game: Game::new(session, validator, events),
            tick_duration: config.tick_duration(),
            client_timeout: config.client_timeout(),
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
            event_rx: Some(event_rx),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };
        let socket = Arc::clone(&self.socket);
        let connections = Arc::clone(&self.connections);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = connections.read().await.client_addrs();

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let connections = Arc::clone(&self.connections);
        let server_tx = self.server_tx.clone();
        let timeout = self.client_timeout;

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = connections.write().await.check_timeouts(timeout);

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    /// Spawns task standing in for event subscribers
    fn spawn_event_consumer(&mut self) {
        let Some(mut event_rx) = self.event_rx.take() else {
            return;
        };

        tokio::spawn(async move {
            while let Some(record) = event_rx.recv().await {
                match record {
                    EventRecord::Movement(movement) => debug!(
                        "Movement: player {:?} (net id {:?}) -> ({:.2}, {:.2})",
                        movement.player, movement.actor, movement.position.x, movement.position.y
                    ),
                    EventRecord::Vent(vent) => info!(
                        "Vent {:?}: player {} at {} ({})",
                        vent.action, vent.player, vent.vent.name, vent.vent.id
                    ),
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<ClientId>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    async fn client_for(&self, addr: SocketAddr) -> Option<ClientId> {
        let mut connections = self.connections.write().await;
        let client_id = connections.find_client_by_addr(addr)?;
        connections.touch(client_id);
        Some(client_id)
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            self.send_packet(
                Packet::Disconnected {
                    reason: "Protocol version mismatch".to_string(),
                },
                addr,
            );
            return;
        }

        // Remove existing connection if present
        let existing = self.connections.read().await.find_client_by_addr(addr);
        if let Some(existing_id) = existing {
            info!("Removing existing client {} from {}", existing_id, addr);
            self.connections.write().await.remove_client(existing_id);
            self.game.despawn_client(existing_id).await;
        }

        let Some(client_id) = self.connections.write().await.add_client(addr) else {
            self.send_packet(
                Packet::Disconnected {
                    reason: "Server full".to_string(),
                },
                addr,
            );
            return;
        };

        let Some(objects) = self.game.spawn_player(client_id).await else {
            self.connections.write().await.remove_client(client_id);
            self.send_packet(
                Packet::Disconnected {
                    reason: "Game full".to_string(),
                },
                addr,
            );
            return;
        };

        if let Err(e) = self.game.on_player_spawn(objects.transform_id, true).await {
            error!("Failed to start spawn for client {}: {}", client_id, e);
        }

        self.send_packet(
            Packet::Connected {
                client_id,
                player_id: objects.player_id,
                transform_id: objects.transform_id,
                physics_id: objects.physics_id,
            },
            addr,
        );

        for (net_id, payload) in self.game.snapshot().await {
            self.send_packet(
                Packet::ObjectData {
                    net_id,
                    target: None,
                    initial_state: true,
                    payload: payload.to_vec(),
                },
                addr,
            );
        }
    }

    /// Processes incoming packets and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                self.handle_connect(client_version, addr).await;
            }

            Packet::ObjectData {
                net_id,
                target,
                initial_state,
                payload,
            } => {
                let Some(client_id) = self.client_for(addr).await else {
                    return;
                };

                // Initial state is trusted, so only the server may produce it
                if initial_state {
                    warn!(
                        "Client {} sent initial state for net id {}, ignoring",
                        client_id, net_id
                    );
                    return;
                }

                if let Err(e) = self
                    .game
                    .handle_data(client_id, target, net_id, payload, false)
                    .await
                {
                    warn!("Dropped data for net id {} from client {}: {}", net_id, client_id, e);
                }
            }

            Packet::ObjectRpc {
                net_id,
                target,
                call,
                payload,
            } => {
                let Some(client_id) = self.client_for(addr).await else {
                    return;
                };
                let call = RpcCall::from(call);

                match self
                    .game
                    .handle_rpc(client_id, target, net_id, call, payload)
                    .await
                {
                    Ok(outcome) => debug!(
                        "{} from client {} on net id {}: {:?}",
                        call, client_id, net_id, outcome
                    ),
                    Err(e) => warn!(
                        "Dropped {} for net id {} from client {}: {}",
                        call, net_id, client_id, e
                    ),
                }
            }

            Packet::Disconnect => {
                let client_id = self.connections.read().await.find_client_by_addr(addr);

                if let Some(client_id) = client_id {
                    self.connections.write().await.remove_client(client_id);
                    self.game.despawn_client(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Broadcasts changed objects and applies enforced disconnects
    async fn tick(&mut self) {
        for dirty in self.game.take_dirty().await {
            self.broadcast_packet(
                Packet::ObjectData {
                    net_id: dirty.net_id,
                    target: None,
                    initial_state: false,
                    payload: dirty.payload.to_vec(),
                },
                Some(dirty.owner),
            );
        }

        let kicked = self.connections.write().await.take_pending_disconnects();
        for (client_id, addr, reason) in kicked {
            info!("Disconnecting client {}: {}", client_id, reason);
            self.send_packet(Packet::Disconnected { reason }, addr);
            self.game.despawn_client(client_id).await;
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();
        self.spawn_event_consumer();

        let mut tick_interval = interval(self.tick_duration);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.game.despawn_client(client_id).await;
                        },
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.tick().await;
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_client_timeout_message() {
        let msg = ServerMessage::ClientTimeout { client_id: 42 };

        match msg {
            ServerMessage::ClientTimeout { client_id } => assert_eq!(client_id, 42),
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_game_message_broadcast() {
        let packet = Packet::ObjectData {
            net_id: 3,
            target: None,
            initial_state: false,
            payload: vec![1, 2, 3],
        };

        let msg = GameMessage::BroadcastPacket {
            packet,
            exclude: Some(5),
        };

        match msg {
            GameMessage::BroadcastPacket { packet, exclude } => {
                assert_eq!(exclude, Some(5));
                match packet {
                    Packet::ObjectData { net_id, .. } => assert_eq!(net_id, 3),
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        let msg = ServerMessage::PacketReceived {
            packet: Packet::Connect {
                client_version: PROTOCOL_VERSION,
            },
            addr,
        };
        assert!(tx.send(msg).is_ok());

        match rx.try_recv() {
            Ok(ServerMessage::PacketReceived { packet, addr: a }) => {
                assert_eq!(a, addr);
                assert!(matches!(packet, Packet::Connect { client_version } if client_version == PROTOCOL_VERSION));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[tokio::test]
    async fn test_server_binds_ephemeral_port() {
        let config = <ServerConfig as clap::Parser>::parse_from(["server", "--port", "0"]);
        let server = Server::new(&config, None).await.unwrap();

        assert!(server.socket.local_addr().unwrap().port() != 0);
        assert!(server.connections.read().await.is_empty());
        assert_eq!(server.game.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_connect_spawns_player() {
        let config = <ServerConfig as clap::Parser>::parse_from(["server", "--port", "0"]);
        let mut server = Server::new(&config, None).await.unwrap();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 40000);

        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                addr,
            )
            .await;

        assert_eq!(server.connections.read().await.len(), 1);
        assert_eq!(server.game.object_count().await, 2);

        server.handle_packet(Packet::Disconnect, addr).await;
        assert!(server.connections.read().await.is_empty());
        assert_eq!(server.game.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_connect_rejects_wrong_version() {
        let config = <ServerConfig as clap::Parser>::parse_from(["server", "--port", "0"]);
        let mut server = Server::new(&config, None).await.unwrap();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 40001);

        server
            .handle_packet(Packet::Connect { client_version: 999 }, addr)
            .await;

        assert!(server.connections.read().await.is_empty());
    }
}
