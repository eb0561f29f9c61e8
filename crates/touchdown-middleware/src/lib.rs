//! `touchdown-middleware` – pose and alert transport.
//!
//! Routes pose snapshots from the simulator (or a real link-state feed) to
//! the ground detector, and contact alerts back out, without caring about the
//! data's meaning.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
