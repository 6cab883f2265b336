//! # pomosync-server
//!
//! Axum HTTP + WebSocket session hub.
//!
//! - [`registry`]: process-wide session map with create/attach/remove-if-empty
//! - [`session`]: per-session handle and single-writer dispatcher task
//! - [`client`]: attached participant with its bounded outbound queue
//! - [`websocket`]: upgrade handlers and the per-connection read/write loop
//! - [`identity`]: display-name lookup collaborator
//! - [`server`]: router, listener, and plain HTTP endpoints
//! - [`health`], [`metrics`], [`shutdown`]: operational surface

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod health;
pub mod identity;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use registry::SessionRegistry;
pub use server::HubServer;
