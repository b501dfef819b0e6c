//! # palaver-proto
//!
//! Wire protocol library for the Palaver collaboration platform.
//!
//! The protocol is a persistent duplex stream of length-prefixed JSON
//! frames. Clients send *invocations* (`{"method": ..., "args": [...]}`),
//! the server pushes *events* (`{"name": ..., "args": [...]}`). Binary
//! payloads (voice, screen frames) ride inside arguments as base64
//! strings.
//!
//! ## Features
//!
//! - Frame envelopes with positional-argument accessors
//! - A `u32`-length-prefixed JSON codec with a hard frame-size cap
//! - Shared DTOs for both server and client builds
//! - Optional Tokio integration for async framing
//!
//! ## Quick start
//!
//! ```rust
//! use palaver_proto::{args, ClientFrame, ServerFrame};
//!
//! let invocation = ClientFrame::new("SendMessage", args!["hello", "general"]);
//! assert_eq!(invocation.str_arg(0), Some("hello"));
//!
//! let event = ServerFrame::event("Pong", args![1_700_000_000_i64]);
//! assert_eq!(event.name, "Pong");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod dto;
pub mod error;
pub mod message;
pub mod names;
pub mod payload;

#[cfg(feature = "tokio")]
pub mod transport;

pub use dto::*;
pub use error::WireError;
pub use message::{ClientFrame, ServerFrame};
pub use payload::{decode_payload, encode_payload};

#[cfg(feature = "tokio")]
pub use transport::{FrameCodec, MAX_FRAME_BYTES};
