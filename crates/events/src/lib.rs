//! Waitline event bus.
//!
//! This crate provides the in-process publish/subscribe hub the queue engine
//! pushes state changes through:
//!
//! - [`EventBus`] — fan-out hub backed by `tokio::sync::broadcast`.
//! - [`QueueEvent`] — the canonical queue-entry change envelope.
//!
//! It sits at the bottom of the workspace dependency graph so the entry store
//! can publish while holding its per-queue lock, preserving state-change
//! order on the wire.

pub mod bus;

pub use bus::{EventBus, QueueEvent, QueueEventKind, RemovalReason};
