//! Gateway: WebSocket relay, connection registry and HTTP admin API.
//!
//! Lifecycle:
//! 1. Load config, open the message store
//! 2. Build the notification sink and spawn its worker
//! 3. Bind the HTTP server (health, metrics, `/api/*`)
//! 4. Attach the WebSocket upgrade handler at `/ws`
//!
//! Storage lives in `hotline-store`; nothing in this crate touches SQL.

pub mod broadcast;
pub mod error;
pub mod http;
pub mod notifications;
pub mod relay;
pub mod server;
pub mod state;
pub mod ws;

pub use {
    notifications::{NotificationWorker, Notifier},
    relay::ChatRelay,
    server::{AppState, build_gateway_app, start_gateway},
    state::{ConnectionRegistry, RelayStats},
};
