//! # ferry-core
//!
//! Core abstractions for the Ferry transfer orchestration daemon.
//!
//! This crate provides the foundational types shared across all Ferry
//! components:
//!
//! - **Identifiers**: Strongly-typed, ULID-backed task IDs
//! - **Secrets**: Credential wrapper that never leaks into logs or views
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span constructors
//!
//! ## Crate Boundary
//!
//! `ferry-core` is the only crate allowed to define shared primitives.
//! The orchestration engine (`ferry-engine`) builds on these types but
//! never redefines them.
//!
//! ## Example
//!
//! ```rust
//! use ferry_core::prelude::*;
//!
//! let id = TaskId::generate();
//! let token = Secret::new("oauth-token");
//! assert_eq!(format!("{token:?}"), "Secret(****)");
//! # let _ = id;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;
pub mod secret;

pub use error::{Error, Result};
pub use id::TaskId;
pub use secret::Secret;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::TaskId;
    pub use crate::secret::Secret;
}
