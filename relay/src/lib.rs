//! # cipher-relay
//!
//! Best-effort relay for end-to-end encrypted messages.
//!
//! This crate implements a relay server that:
//! - Accepts long-lived WebSocket connections from clients
//! - Routes opaque ciphertext messages between connected users
//! - Durably queues messages for offline recipients and replays the
//!   backlog, in order, when they reconnect
//! - Never sees plaintext (the relay is a "dumb pipe")
//!
//! ## Architecture
//!
//! ```text
//! Client A ──┐                      ┌── Client B
//!            │      WebSocket       │
//!            ├─────────────────────►│
//!            │                      │
//!        ┌───┴──────────────────────┴───┐
//!        │         cipher-relay         │
//!        │  sessions ─► dispatcher ─►───┤── live write
//!        │                 │            │
//!        │                 ▼            │
//!        │  ┌─────────────────────┐     │
//!        │  │  SQLite (offline)   │     │
//!        │  └─────────────────────┘     │
//!        └──────────────────────────────┘
//! ```
//!
//! Each connection runs its own read loop and hands inbound messages to a
//! single dispatcher task over a bounded channel. The dispatcher is the only
//! component that decides between a live write and an offline enqueue, and
//! the only producer onto a connection's outbound queue besides that
//! connection's own replay step.
//!
//! Delivery is best-effort: there are no acknowledgments and no retries. A
//! failed delivery attempt is logged and the message is dropped.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod registry;
pub mod server;
pub mod session;
pub mod store;
