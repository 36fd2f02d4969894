//! Headless client-session agent.
//!
//! The browser-side counterpart of the queue engine, as a Rust library:
//! persists the session token and last snapshot, recovers the session after
//! a reload or crash, keeps a live channel open with reconnection, and
//! mirrors every update to sibling tabs through a local broadcast.

pub mod agent;
pub mod mirror;
pub mod store;

pub use agent::{AgentError, ClientSnapshot, Confirmation, Recovery, SessionAgent};
pub use mirror::{TabEvent, TabMirror};
pub use store::{FileStore, MemoryStore, StateStore};
