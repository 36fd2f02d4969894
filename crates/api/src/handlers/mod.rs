//! Request handlers, grouped by audience.

pub mod dashboard;
pub mod merchant;
pub mod queue;
pub mod session;
