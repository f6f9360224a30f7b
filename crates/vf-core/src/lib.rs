//! vf-core: shared types, IDs, errors, configuration, and catalog enums.
//!
//! This crate is the foundational dependency for all other vf-* crates,
//! providing type-safe identifiers, a unified error type, the video catalog
//! vocabulary (categories, HLS renditions, queue names), and application
//! configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result, TokenRejection};
pub use ids::*;
pub use media::*;
