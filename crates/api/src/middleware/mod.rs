//! Request extractors applied by handlers.

pub mod auth;
