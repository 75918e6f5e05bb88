//! Wire codecs.
//!
//! A codec turns a [`Message`] into self-describing, versioned bytes and
//! back. Codecs are stateless values; there is no ambient encoder. Only the
//! persistent fields cross the wire: id, data, ordering key, attributes,
//! delivery attempt and size. The bound completion and resolution flag
//! stay in the process that owns the message.
//!
//! Both operations are atomic: a decode either yields a whole message or an
//! [`Error::Decode`](crate::Error::Decode), never a partial one.

mod binary;
mod json;

use std::sync::Arc;

use bytes::Bytes;

use crate::{Message, Result};

pub use binary::{BinaryCodec, BINARY_WIRE_VERSION};
pub use json::{JsonCodec, JSON_WIRE_VERSION};

/// Serializer/deserializer for the message wire format.
pub trait Codec: Send + Sync {
    /// Encode every persistent field of `message`.
    fn encode(&self, message: &Message) -> Result<Bytes>;

    /// Rebuild a message. Fails on malformed input or a version mismatch.
    ///
    /// The returned message is unresolved and has no completion bound.
    fn decode(&self, bytes: &[u8]) -> Result<Message>;

    /// Wire format version written by `encode` and required by `decode`.
    fn version(&self) -> u8;

    /// MIME type describing the encoded bytes.
    fn content_type(&self) -> &'static str;
}

/// Shared codec pointer.
pub type CodecPtr = Arc<dyn Codec>;

/// The codec used when none is configured.
pub fn default_codec() -> CodecPtr {
    // ---
    Arc::new(BinaryCodec)
}

/// Codec matching a content type, if one is built in.
pub fn codec_for_content_type(content_type: &str) -> Option<CodecPtr> {
    // ---
    match content_type {
        t if t == BinaryCodec.content_type() => Some(Arc::new(BinaryCodec)),
        t if t == JsonCodec.content_type() => Some(Arc::new(JsonCodec)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    use crate::SequentialIdGenerator;

    /// Messages covering the shapes a codec has to carry: non-ASCII keys
    /// and values, empty values, many attributes, with and without a
    /// delivery attempt.
    fn generated_messages() -> Vec<Message> {
        // ---
        let ids = SequentialIdGenerator::new("gen");
        let ordering_keys = ["", "order-42", "clé-ß", "順序キー", "🦀-key"];

        (0..64usize)
            .map(|i| {
                let data: Vec<u8> = (0..i * 7).map(|b| (b * 31 + i) as u8).collect();
                let key = ordering_keys[i % ordering_keys.len()];
                let mut m = Message::new_with_ordering_key_with(&ids, data, key);

                let attr_count = if i == 63 { 300 } else { i % 11 };
                for j in 0..attr_count {
                    let value = match j % 3 {
                        0 => String::new(),
                        1 => format!("värde-{j}-✓"),
                        _ => format!("v{j}"),
                    };
                    m.set_attribute(format!("attr-{j}-ü"), value);
                }
                if i % 4 == 0 {
                    m.set_topic(format!("topic.{i}"));
                }

                if i % 2 == 1 {
                    m.with_delivery_attempt(i as u32)
                } else {
                    m
                }
            })
            .collect()
    }

    #[test]
    fn test_every_codec_round_trips_generated_messages() {
        // ---
        let codecs: [CodecPtr; 2] = [Arc::new(BinaryCodec), Arc::new(JsonCodec)];
        let messages = generated_messages();

        for codec in &codecs {
            for m in &messages {
                let bytes = codec.encode(m).unwrap();
                let decoded = codec.decode(&bytes).unwrap();
                assert_eq!(&decoded, m, "{} lost fields", codec.content_type());
                assert_eq!(decoded.delivery_attempt(), m.delivery_attempt());
            }
        }
    }

    #[test]
    fn test_lookup_by_content_type() {
        // ---
        let json = codec_for_content_type(JsonCodec.content_type()).unwrap();
        assert_eq!(json.content_type(), JsonCodec.content_type());

        let binary = codec_for_content_type(BinaryCodec.content_type()).unwrap();
        assert_eq!(binary.version(), BINARY_WIRE_VERSION);

        assert!(codec_for_content_type("text/plain").is_none());
    }
}
