//! Route handlers for the HTTP API.

pub mod auth;
pub mod health;
pub mod queue;
pub mod stream;
pub mod streaming_helpers;
pub mod videos;
