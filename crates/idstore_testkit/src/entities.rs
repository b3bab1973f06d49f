//! Sample identity-domain entities.

use idstore_codec::{EntityCodec, NamedEntity};
use serde::{Deserialize, Serialize};

/// Definition of an identity attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeType {
    /// Unique attribute name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Behavior flags.
    pub flags: u32,
    /// Value syntax identifier.
    pub syntax: String,
}

impl AttributeType {
    /// Creates a string attribute type.
    pub fn new(name: impl Into<String>, flags: u32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            flags,
            syntax: "string".to_string(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl EntityCodec for AttributeType {
    const ENTITY_TYPE: &'static str = "attribute_type";
}

impl NamedEntity for AttributeType {
    fn name(&self) -> &str {
        &self.name
    }
}

/// A node of the group tree, named by its path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Path such as `/staff/admins`.
    pub path: String,
    /// Human-readable description.
    pub description: String,
    /// Attribute statements attached to the group.
    pub statements: Vec<String>,
}

impl Group {
    /// Creates an empty group.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            description: String::new(),
            statements: Vec::new(),
        }
    }
}

impl EntityCodec for Group {
    const ENTITY_TYPE: &'static str = "group";
}

impl NamedEntity for Group {
    fn name(&self) -> &str {
        &self.path
    }
}

/// Lifecycle state of an identity. Keyed only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInformation {
    /// Lifecycle state, e.g. `valid` or `disabled`.
    pub state: String,
    /// Scheduled removal time, milliseconds since the epoch.
    pub removal_at: Option<u64>,
}

impl EntityInformation {
    /// Creates a record in the given state.
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            removal_at: None,
        }
    }
}

impl EntityCodec for EntityInformation {
    const ENTITY_TYPE: &'static str = "entity_information";
}

/// A shared counter, used by contention tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    /// Current value.
    pub value: u64,
}

impl EntityCodec for Counter {
    const ENTITY_TYPE: &'static str = "counter";
}

/// Entity with an arbitrary blob, used by size-limit tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    /// Blob contents.
    #[serde(with = "serde_bytes_compat")]
    pub data: Vec<u8>,
}

impl EntityCodec for Blob {
    const ENTITY_TYPE: &'static str = "blob";
}

/// Serializes a byte vector as a CBOR byte string rather than an array.
mod serde_bytes_compat {
    use serde::de::{Deserializer, Error, Visitor};
    use serde::Serializer;
    use std::fmt;

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(data)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        struct BytesVisitor;

        impl<'de> Visitor<'de> for BytesVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte string")
            }

            fn visit_bytes<E: Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E: Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
                Ok(v)
            }
        }

        deserializer.deserialize_bytes(BytesVisitor)
    }
}
