//! Long-running background tasks.

pub mod sweeper;

pub use sweeper::Sweeper;
