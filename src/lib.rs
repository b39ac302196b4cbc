//! # A single-room chat served over a call/reply protocol.
//!
//! One server holds the chat history in memory. Clients connect over TCP and make calls to
//! `ChatService.SendMessage(sender, message)`. Every call either appends `[sender]: message` to
//! the history or, when the message is the fetch sentinel, only reads it. Either way the reply is
//! the whole history. The server never sends anything a client did not ask for.
//!
//! In the terminal client a user can:
//!
//! 1. Post a message by typing it,
//! 2. Refresh the history with an empty line or `/history`,
//! 3. Leave with `exit` or Ctrl+C.
//!
//! TODO: Connection tasks are unbounded. Cap them with a semaphore if the server ever faces more
//! than a handful of clients.
//!
//! Architecture:
//!
//! ```text
//!  TcpListener
//!     v
//! +-----------+              +-------------+             +----------+             +--------------+
//! | TcpStream |<-FrameCodec->| PeerChannel |-> Registry ->| Service  |-> submit ->| HistoryStore |
//! +-----------+              +-------------+             +----------+             |  (one lock)  |
//! | TcpStream |<-FrameCodec->| PeerChannel |-> Registry ->| Service  |-> submit ->|              |
//! +-----------+              +-------------+             +----------+             +--------------+
//!       ^
//!   FrameCodec
//!       v
//! +-----------+   +------------+
//! | RpcClient |<--| Session    |<- stdin
//! +-----------+   +------------+-> stdout
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod message;
pub mod peer;
pub mod server;
pub mod service;
pub mod terminal;

/// Message text that reads the history without posting.
pub const FETCH_SENTINEL: &str = "/FETCH_HISTORY";

pub use client::{ChatClient, RpcClient};
pub use error::{ClientError, ProtocolError, RpcError};
pub use history::HistoryStore;
pub use server::{Connections, Server};
pub use service::{ChatService, HistoryReply, Registry, SendMessageArgs};
