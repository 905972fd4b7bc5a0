//! Group Messaging Relay Library
//!
//! A WebSocket relay that assigns identifiers and fans out registration,
//! group and chat events to every connected client. Each client keeps a
//! reconciled mirror of the groups it belongs to.
//!
//! # Features
//! - Sequential client and group id allocation
//! - Registration toggle (announce availability / leave)
//! - Group creation and editing, broadcast to every connection
//! - Chat messages with opaque binary attachments
//! - Client-side reconciliation into a filtered local view
//! - Graceful shutdown closing every active connection
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `RelayServer` is the central actor owning connections, registrations and counters
//! - Each connection has a `handler` task communicating with the server
//! - No locks needed on the server - all state access goes through message passing
//! - Clients use a `Session`, which feeds a `Reconciler` from a reader task
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use group_relay::{serve, Session};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8000").await.unwrap();
//!     tokio::spawn(serve(listener, 256, std::future::pending()));
//!
//!     let session = Session::connect("ws://127.0.0.1:8000", ()).await.unwrap();
//!     session.request_register().unwrap();
//!     session.request_create_group("Team", []).unwrap();
//! }
//! ```

pub mod allocator;
pub mod client;
pub mod config;
pub mod error;
pub mod group;
pub mod handler;
pub mod listener;
pub mod message;
pub mod reconciler;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use allocator::IdAllocator;
pub use client::Client;
pub use config::{ClientConfig, ServerConfig};
pub use error::{AppError, SendError};
pub use group::{ChatMessage, Group};
pub use handler::handle_connection;
pub use listener::serve;
pub use message::{ClientMessage, ServerMessage};
pub use reconciler::{Delta, Reconciler};
pub use server::{RelayServer, ServerCommand};
pub use session::{Session, SessionObserver};
pub use types::{ClientId, GroupId};
