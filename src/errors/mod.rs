//! # Error Handling
//!
//! Error types shared by every resolver component.

mod types;

pub use types::{ResolverError, Result};
