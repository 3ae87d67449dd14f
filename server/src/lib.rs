//! # Replication Server Library
//!
//! This library provides the server side of a networked object replication
//! layer for a multiplayer social-deduction game. Clients own the objects that
//! represent their players and stream state for them; the server validates
//! every inbound frame and call, keeps the accepted state, and fans it out to
//! everyone else.
//!
//! ## Core Responsibilities
//!
//! ### Position Replication
//! Player positions arrive as sequence-tagged samples over an unreliable
//! channel. Sequence ids are 16-bit and wrap, so ordering uses a half-range
//! window: of two distinct ids, exactly one is newer. Duplicates and stale
//! reorders are dropped without touching state.
//!
//! ### Teleport Validation
//! A `SnapTo` call moves a player instantly. The server only accepts it when
//! it lands somewhere the player may legally be:
//! - the expected spawn point, once per spawn
//! - the next step of a staged spawn handshake on maps that use one
//! - a vent, for roles that may vent
//!
//! ### Anti-Cheat Reporting
//! Authorization failures (wrong owner, targeted frames) are discarded
//! quietly. Geometry mismatches are reported against the sender's connection,
//! whose policy decides whether the client is disconnected.
//!
//! ### Event Publication
//! Every accepted movement publishes a movement event; vent use publishes a
//! vent event. Movement events come from a pool and return to it however the
//! handler exits.
//!
//! ## Architecture Design
//!
//! ### Per-Object Serialization
//! Each replicated object sits behind its own async mutex. Messages for one
//! object are handled one at a time; messages for different objects may
//! interleave at suspension points such as validator lookups.
//!
//! ### UDP-Based Communication
//! The binary uses a UDP socket with `bincode` envelopes. Object payloads
//! inside the envelopes use a compact little-endian encoding with packed
//! integers, read and written through `shared::wire`.
//!
//! ## Module Organization
//!
//! ### Component Modules (`component`, `transform`, `physics`)
//! The `NetComponent` contract and the two player components:
//! - `TransformComponent`: position samples, snaps and the spawn handshake
//! - `PlayerPhysicsComponent`: vent enter and exit calls
//!
//! ### Validation Modules (`validator`, `connection`)
//! Ownership, broadcast and vent capability checks, plus the connection
//! table that records violations and applies the enforcement policy.
//!
//! ### Game Modules (`game`, `session`, `geometry`, `events`)
//! Object registry and message routing, the player roster, static map data
//! and the event bus with its pool.
//!
//! ### Network Module (`network`)
//! The UDP harness: receiver, sender and timeout tasks around a tick loop
//! that broadcasts changed objects.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::parse_from(["server", "--port", "8080"]);
//!
//!     // No map data: vent snaps are rejected, spawn snaps fall through
//!     let mut server = Server::new(&config, None).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod component;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod game;
pub mod geometry;
pub mod network;
pub mod physics;
pub mod session;
pub mod transform;
pub mod validator;

#[cfg(test)]
mod test_support;
