//! dvx-core: shared types for dovimux.
//!
//! This crate is the foundational dependency for the other dvx-* crates,
//! providing type-safe identifiers, a unified error type, the media-catalog
//! data model, and application configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use config::Config;
pub use error::{Error, Result};
pub use ids::*;
pub use media::*;
