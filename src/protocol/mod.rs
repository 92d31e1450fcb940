//! Client-server communication protocol.
//!
//! This module defines the communication protocol used between sdsql clients
//! and servers: the binary codec, message framing, transport plumbing, and
//! the server and client endpoints built on top of them.
//!
//! # Overview
//!
//! Every exchange on the wire is one framed message. A frame starts with a
//! fixed 9-byte header carrying a magic number, the message type, and the
//! exact payload length; the payload follows, encoded per message kind.
//! All multi-byte integers are big-endian, and strings carry a `u32` length
//! prefix.
//!
//! # Key Components
//!
//! - [`codec`]: low-level [`Serializer`](codec::Serializer) /
//!   [`Deserializer`](codec::Deserializer) pair with bounds-checked reads.
//! - [`message`]: the [`Message`] sum type, header handling, and the
//!   type-byte factory.
//! - [`query`]: structured [`QueryRequest`]/[`QueryResponse`] payloads.
//! - [`transport`]: [`MessageStream`], exact-length frame reads and writes
//!   over any `Read + Write` stream.
//! - [`server`]: the accept loop, session dispatch, and query execution.
//! - [`client`]: [`DbClient`], the blocking client connection.
//!
//! # See Also
//!
//! - [`engine`](crate::engine): executes the queries the protocol carries.
//! - [`auth`](crate::auth): validates logins and session tokens.

pub mod client;
pub mod codec;
pub mod message;
pub mod query;
pub mod server;
mod thread;
pub mod transport;

use thread::ThreadPool;

pub use client::DbClient;
pub use message::Message;
pub use query::{QueryRequest, QueryResponse};
pub use server::DbServer;
pub use transport::MessageStream;
