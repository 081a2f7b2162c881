//! Peer-to-peer networking
//!
//! Newline-delimited JSON over TCP. Every connection is a long-lived
//! session that both answers queries and receives gossip; all of them feed
//! the same ledger through `handle_message`.

pub mod message;
pub mod peer;
pub mod server;
pub mod sync;

pub use message::Message;
pub use peer::{Peer, PeerRegistry, PeerState};
pub use server::Server;
pub use sync::handle_message;
