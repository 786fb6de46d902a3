//! Messaging channel runner.
//!
//! This crate pumps a phone-number messaging bridge into the conversation
//! engine and delivers the rendered reply segments back out:
//! - **Transport** (`transport`) - connect/read/send seam plus the
//!   reconnect policy
//! - **Identity** (`identity`) - sender normalization and the allow list
//! - **Runner** (`runner`) - the pump: admission, handler, ordered delivery
//!
//! # Architecture
//!
//! ```text
//! Bridge → ChannelRunner → ChannelHandler → reply segments → Bridge
//!              ↓ (allow list)
//!           dropped
//! ```
//!
//! The crate deliberately knows nothing about the completion service; the
//! server wires a `ChannelHandler` adapter over its orchestrator. Delivery
//! to one sender is strictly ordered, and only senders on the allow list
//! are admitted at all.

pub mod identity;
pub mod runner;
pub mod transport;

pub use identity::{normalize_sender, SenderAllowList};
pub use runner::{ChannelHandler, ChannelRunner};
pub use transport::{
    ChannelTransport, InboundMessage, NoopTransport, ReconnectPolicy, TransportError,
};
