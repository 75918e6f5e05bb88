// src/codec/json.rs

//! JSON wire format for polyglot consumers.
//!
//! ```json
//! {
//!   "v": 1,
//!   "id": "5f0c...",
//!   "data": "aGVsbG8=",
//!   "ordering_key": "order-42",
//!   "attributes": { "topic": "orders.created" },
//!   "delivery_attempt": 2,
//!   "size": 5
//! }
//! ```
//!
//! `data` is standard base64. `ordering_key`, `attributes` and
//! `delivery_attempt` are omitted when empty.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Codec, Error, Message, MessageParts, Result};

/// Wire version written and accepted by [`JsonCodec`].
pub const JSON_WIRE_VERSION: u8 = 1;

/// Versioned JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Serialize, Deserialize)]
struct WireMessage {
    v: u8,
    id: String,
    #[serde(with = "data_serde")]
    data: Vec<u8>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    ordering_key: String,
    // BTreeMap keeps the output stable
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "unique_attributes"
    )]
    attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delivery_attempt: Option<u32>,
    size: usize,
}

mod data_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Attribute object that rejects a repeated key instead of keeping the
/// last value.
fn unique_attributes<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{Error as _, MapAccess, Visitor};
    use std::fmt;

    struct UniqueAttributes;

    impl<'de> Visitor<'de> for UniqueAttributes {
        type Value = BTreeMap<String, String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object of string attributes")
        }

        fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut attributes = BTreeMap::new();
            while let Some((key, value)) = access.next_entry::<String, String>()? {
                if attributes.contains_key(&key) {
                    return Err(A::Error::custom(format!("duplicate attribute {key:?}")));
                }
                attributes.insert(key, value);
            }
            Ok(attributes)
        }
    }

    deserializer.deserialize_map(UniqueAttributes)
}

/// Only the version, so a mismatch is reported as such even when the rest
/// of the document has a different shape.
#[derive(Deserialize)]
struct VersionProbe {
    v: u8,
}

impl Codec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<Bytes> {
        // ---
        let wire = WireMessage {
            v: JSON_WIRE_VERSION,
            id: message.id().to_string(),
            data: message.data().to_vec(),
            ordering_key: message.ordering_key().to_string(),
            attributes: message
                .attributes()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            delivery_attempt: message.delivery_attempt(),
            size: message.size(),
        };

        serde_json::to_vec(&wire)
            .map(Bytes::from)
            .map_err(|e| Error::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message> {
        // ---
        let probe: VersionProbe =
            serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))?;
        if probe.v != JSON_WIRE_VERSION {
            return Err(Error::Decode(format!(
                "unsupported wire version {}, expected {JSON_WIRE_VERSION}",
                probe.v
            )));
        }

        let wire: WireMessage =
            serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))?;

        Ok(Message::from_parts(MessageParts {
            id: wire.id,
            data: Bytes::from(wire.data),
            ordering_key: wire.ordering_key,
            attributes: wire.attributes.into_iter().collect(),
            delivery_attempt: wire.delivery_attempt,
            size: wire.size,
        }))
    }

    fn version(&self) -> u8 {
        JSON_WIRE_VERSION
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}
