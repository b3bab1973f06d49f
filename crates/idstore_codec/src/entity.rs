//! Entity encoding traits.

use crate::cbor::{from_cbor, to_cbor};
use crate::error::{CodecError, CodecResult};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    v: u8,
    t: &'a str,
    body: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    v: u8,
    t: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    body: T,
}

/// An entity that can be stored by a DAO.
///
/// `ENTITY_TYPE` names the table the entity lives in. It must be stable:
/// renaming it orphans every stored row.
///
/// The default `encode`/`decode` go through serde. Implementors normally
/// only supply the constant.
pub trait EntityCodec: Serialize + DeserializeOwned + Sized {
    /// Stable identity of the entity type (and of its table).
    const ENTITY_TYPE: &'static str;

    /// Encodes the entity into a stored payload.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::EncodingFailed`] if serialization fails.
    fn encode(&self) -> CodecResult<Bytes> {
        let envelope = EnvelopeRef {
            v: ENVELOPE_VERSION,
            t: Self::ENTITY_TYPE,
            body: self,
        };
        to_cbor(&envelope).map(Bytes::from)
    }

    /// Decodes an entity from a stored payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed, has an unknown
    /// envelope version, or was written for another entity type.
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let header: EnvelopeHeader = from_cbor(bytes)?;
        if header.v != ENVELOPE_VERSION {
            return Err(CodecError::UnsupportedVersion(header.v));
        }
        if header.t != Self::ENTITY_TYPE {
            return Err(CodecError::EntityTypeMismatch {
                expected: Self::ENTITY_TYPE.to_string(),
                found: header.t,
            });
        }
        let envelope: Envelope<Self> = from_cbor(bytes)?;
        Ok(envelope.body)
    }
}

/// An entity with a unique, human-readable name.
pub trait NamedEntity: EntityCodec {
    /// Returns the entity's name.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Attribute {
        name: String,
        flags: u32,
        description: Option<String>,
    }

    impl EntityCodec for Attribute {
        const ENTITY_TYPE: &'static str = "attribute";
    }

    impl NamedEntity for Attribute {
        fn name(&self) -> &str {
            &self.name
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Other {
        name: String,
        flags: u32,
        description: Option<String>,
    }

    impl EntityCodec for Other {
        const ENTITY_TYPE: &'static str = "other";
    }

    fn attribute(name: &str) -> Attribute {
        Attribute {
            name: name.into(),
            flags: 8,
            description: Some("desc".into()),
        }
    }

    #[test]
    fn encode_decode_entity() {
        let attr = attribute("attr1");
        let bytes = attr.encode().unwrap();
        assert_eq!(Attribute::decode(&bytes).unwrap(), attr);
        assert_eq!(attr.name(), "attr1");
    }

    #[test]
    fn decode_rejects_other_entity_type() {
        let bytes = attribute("x").encode().unwrap();
        let err = Other::decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            CodecError::EntityTypeMismatch {
                expected: "other".into(),
                found: "attribute".into(),
            }
        );
    }

    #[test]
    fn decode_rejects_future_version() {
        let envelope = EnvelopeRef {
            v: ENVELOPE_VERSION + 1,
            t: Attribute::ENTITY_TYPE,
            body: &attribute("x"),
        };
        let bytes = to_cbor(&envelope).unwrap();
        assert_eq!(
            Attribute::decode(&bytes).unwrap_err(),
            CodecError::UnsupportedVersion(ENVELOPE_VERSION + 1)
        );
    }

    #[test]
    fn decode_rejects_bare_body() {
        let bytes = to_cbor(&attribute("x")).unwrap();
        assert!(Attribute::decode(&bytes).is_err());
    }

    proptest! {
        #[test]
        fn any_attribute_survives(
            name in "[a-zA-Z0-9_.-]{1,32}",
            flags in any::<u32>(),
            description in proptest::option::of(".{0,64}"),
        ) {
            let attr = Attribute { name, flags, description };
            let bytes = attr.encode().unwrap();
            prop_assert_eq!(Attribute::decode(&bytes).unwrap(), attr);
        }
    }
}
