//! Shared types

pub mod error;

pub use error::{LandscapeError, Result};
