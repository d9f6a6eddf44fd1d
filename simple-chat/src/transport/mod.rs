//! TCP plumbing underneath the chat core.
//!
//! The transport owns sockets and tasks and reports what happens on them as
//! events over channels; it never decides what a payload means. The chat
//! core consumes those events on a single task and calls back into the
//! transport to broadcast or close connections.

pub mod client;
pub mod server;

pub use client::{ClientConnection, ClientEvent};
pub use server::{ConnectionId, ConnectionInfo, ServerEvent, ServerTransport};
