//! Common utilities and types shared across storebridge crates.
//!
//! This module provides the error taxonomy and the small value types
//! (queries, operation names) that every other crate builds on.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Operation, Query, WILDCARD_OPEN};
