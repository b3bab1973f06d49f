//! # idstore Testkit
//!
//! Test utilities for idstore.
//!
//! This crate provides:
//! - Store fixtures for every engine mode, with temporary journal files
//! - Sample identity-domain entities
//! - Property-based test generators using proptest
//! - Contention helpers for retry and flush tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use idstore_testkit::prelude::*;
//!
//! #[test]
//! fn groups_are_unique() {
//!     let store = TestStore::memory();
//!     let groups = store.named_dao::<Group>();
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod entities;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::entities::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use entities::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
