//! # Survival Server Library
//!
//! This library provides the authoritative server core for a real-time
//! multiplayer survival game. It owns all player state, speaks the binary
//! wire protocol defined in the `shared` crate and keeps every connected
//! client's view of the world consistent.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! Positions, vitals and inventories live only on the server. Clients send
//! requests (movement, item use, item moves) and receive the resulting state.
//!
//! ### Connection Lifecycle
//! Every client walks through a small handshake:
//! - ConnectionRequest registers a player and is answered with its id and
//!   spawn position
//! - ClientReady delivers the inventory, the players already in the world,
//!   and announces the newcomer to everyone else
//! - Heartbeats and movement keep the player alive; silence gets it evicted
//!
//! ### Survival Simulation
//! Hunger, thirst and temperature decay on a fixed period and hurt the
//! player when they get critical. Deaths are announced to every client.
//!
//! ## Architecture Design
//!
//! ### Task Per Connection
//! The listener spawns a reader task (the protocol state machine) and a
//! writer task per client. Two periodic tasks run the stats simulation and
//! the timeout monitor.
//!
//! ### Single Registry
//! The [`registry::PlayerRegistry`] is the only shared mutable state. Its
//! lock is never held across socket I/O; everything else works on copies.
//!
//! ### Outbound Queues
//! Messages are enqueued per client with one of three reliability classes
//! (see [`peer`]). A stalled client only ever fills its own queue.
//!
//! ## Module Organization
//!
//! - `network`: TCP listener, task wiring and graceful shutdown
//! - `connection`: per-client protocol state machine
//! - `peer`: outbound queues and the writer task
//! - `registry`, `player`: authoritative player table
//! - `broadcast`: fan-out to connected clients
//! - `stats`: survival stats simulation
//! - `inventory`, `catalog`: slot inventory and item definitions
//! - `monitor`: heartbeat timeout eviction
//! - `context`: shared state and the common disconnect path
//! - `config`, `error`: configuration and startup errors
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::catalog::ItemCatalog;
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:7777".to_string(),
//!         ..ServerConfig::default()
//!     };
//!     let server = Server::bind(config, ItemCatalog::default()).await?;
//!
//!     let shutdown = server.shutdown_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.shutdown();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod inventory;
pub mod monitor;
pub mod network;
pub mod peer;
pub mod player;
pub mod registry;
pub mod stats;

#[cfg(test)]
mod testing;
