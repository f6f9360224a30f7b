//! vf-db: database access and persistence layer.
//!
//! This crate provides SQLite-backed storage with connection pooling,
//! embedded migrations, typed models, and query modules for users, videos,
//! queued jobs and the refresh-token blacklist.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
