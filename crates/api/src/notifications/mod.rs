//! Event-to-connection notification dispatch.

pub mod dispatcher;

pub use dispatcher::NotificationDispatcher;
