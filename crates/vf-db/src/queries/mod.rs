//! Database query modules.

pub mod jobs;
pub mod token_blacklist;
pub mod users;
pub mod videos;
