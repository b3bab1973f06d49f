//! # idstore Codec
//!
//! CBOR encoding for idstore entities and internal records.
//!
//! Entities are stored as opaque payloads. Every payload is a small
//! envelope around the serde representation of the entity:
//!
//! ```text
//! { "v": 1, "t": "<entity type>", "body": <entity> }
//! ```
//!
//! The envelope lets a table refuse rows written for another entity type
//! and lets future format revisions be detected instead of misread.
//!
//! ## Usage
//!
//! ```
//! use idstore_codec::{EntityCodec, NamedEntity};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Group {
//!     path: String,
//! }
//!
//! impl EntityCodec for Group {
//!     const ENTITY_TYPE: &'static str = "group";
//! }
//!
//! impl NamedEntity for Group {
//!     fn name(&self) -> &str {
//!         &self.path
//!     }
//! }
//!
//! let group = Group { path: "/staff".into() };
//! let bytes = group.encode().unwrap();
//! assert_eq!(Group::decode(&bytes).unwrap(), group);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod entity;
mod error;

pub use cbor::{from_cbor, to_cbor};
pub use entity::{EntityCodec, NamedEntity, ENVELOPE_VERSION};
pub use error::{CodecError, CodecResult};
