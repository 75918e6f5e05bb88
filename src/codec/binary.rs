// src/codec/binary.rs

//! Compact binary wire format, version 1.
//!
//! All integers are big-endian. Strings are UTF-8 with a length prefix.
//!
//! ```text
//! +-------+---------+-------+
//! | "WM"  | version | flags |          2 + 1 + 1 bytes
//! +-------+---------+-------+
//! | id            u16 len + utf8     |
//! | ordering key  u16 len + utf8     |
//! | data          u32 len + bytes    |
//! | attr count    u16                |
//! |   key         u16 len + utf8     |  repeated, sorted by key
//! |   value       u32 len + utf8     |
//! | delivery attempt  u32            |  only if flags bit 0 is set
//! | size          u64                |
//! +----------------------------------+
//! ```
//!
//! Any other flag bit, trailing bytes, duplicate attribute keys or a
//! version other than [`BINARY_WIRE_VERSION`] are decode errors.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Attributes, Codec, Error, Message, MessageParts, Result};

/// Wire version written and accepted by [`BinaryCodec`].
pub const BINARY_WIRE_VERSION: u8 = 1;

const MAGIC: &[u8; 2] = b"WM";
const FLAG_DELIVERY_ATTEMPT: u8 = 0b0000_0001;
const KNOWN_FLAGS: u8 = FLAG_DELIVERY_ATTEMPT;

// magic + version + flags + id len + key len + data len + attr count + size
const FIXED_LEN: usize = 2 + 1 + 1 + 2 + 2 + 4 + 2 + 8;

/// The default codec: versioned, length-prefixed binary.
///
/// Attributes are written in key order, so two equal messages always
/// encode to identical bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn encode(&self, message: &Message) -> Result<Bytes> {
        // ---
        let mut attributes: Vec<(&String, &String)> = message.attributes().iter().collect();
        attributes.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let attr_count = u16::try_from(attributes.len()).map_err(|_| {
            Error::Encode(format!(
                "{} attributes, limit is {}",
                attributes.len(),
                u16::MAX
            ))
        })?;

        let attr_len: usize = attributes
            .iter()
            .map(|(k, v)| 2 + k.len() + 4 + v.len())
            .sum();

        let mut buf = BytesMut::with_capacity(
            FIXED_LEN
                + message.id().len()
                + message.ordering_key().len()
                + message.data().len()
                + attr_len
                + 4,
        );

        let mut flags = 0u8;
        if message.delivery_attempt().is_some() {
            flags |= FLAG_DELIVERY_ATTEMPT;
        }

        buf.put_slice(MAGIC);
        buf.put_u8(BINARY_WIRE_VERSION);
        buf.put_u8(flags);

        put_str16(&mut buf, "id", message.id())?;
        put_str16(&mut buf, "ordering key", message.ordering_key())?;
        put_bytes32(&mut buf, "data", message.data())?;

        buf.put_u16(attr_count);
        for (key, value) in attributes {
            put_str16(&mut buf, "attribute key", key)?;
            put_bytes32(&mut buf, "attribute value", value.as_bytes())?;
        }

        if let Some(attempt) = message.delivery_attempt() {
            buf.put_u32(attempt);
        }

        buf.put_u64(message.size() as u64);

        Ok(buf.freeze())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message> {
        // ---
        let mut reader = Reader { buf: bytes };

        let magic = reader.take(MAGIC.len(), "magic")?;
        if magic != MAGIC {
            return Err(Error::Decode(format!("bad magic {magic:02x?}")));
        }

        let version = reader.u8("version")?;
        if version != BINARY_WIRE_VERSION {
            return Err(Error::Decode(format!(
                "unsupported wire version {version}, expected {BINARY_WIRE_VERSION}"
            )));
        }

        let flags = reader.u8("flags")?;
        if flags & !KNOWN_FLAGS != 0 {
            return Err(Error::Decode(format!("unknown flags {flags:#010b}")));
        }

        let id = reader.str16("id")?;
        let ordering_key = reader.str16("ordering key")?;
        let data = reader.bytes32("data")?;

        let attr_count = reader.u16("attribute count")?;
        let mut attributes = Attributes::with_capacity(attr_count as usize);
        for _ in 0..attr_count {
            let key = reader.str16("attribute key")?;
            let value = reader.str32("attribute value")?;
            if attributes.contains_key(&key) {
                return Err(Error::Decode(format!("duplicate attribute {key:?}")));
            }
            attributes.insert(key, value);
        }

        let delivery_attempt = if flags & FLAG_DELIVERY_ATTEMPT != 0 {
            Some(reader.u32("delivery attempt")?)
        } else {
            None
        };

        let size = reader.u64("size")?;
        let size = usize::try_from(size)
            .map_err(|_| Error::Decode(format!("size {size} does not fit this platform")))?;

        if reader.buf.has_remaining() {
            return Err(Error::Decode(format!(
                "{} trailing bytes",
                reader.buf.remaining()
            )));
        }

        Ok(Message::from_parts(MessageParts {
            id,
            data,
            ordering_key,
            attributes,
            delivery_attempt,
            size,
        }))
    }

    fn version(&self) -> u8 {
        BINARY_WIRE_VERSION
    }

    fn content_type(&self) -> &'static str {
        "application/x-whisper-message"
    }
}

fn put_str16(buf: &mut BytesMut, field: &str, value: &str) -> Result<()> {
    // ---
    let len = u16::try_from(value.len()).map_err(|_| {
        Error::Encode(format!(
            "{field} is {} bytes, limit is {}",
            value.len(),
            u16::MAX
        ))
    })?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn put_bytes32(buf: &mut BytesMut, field: &str, value: &[u8]) -> Result<()> {
    // ---
    let len = u32::try_from(value.len()).map_err(|_| {
        Error::Encode(format!(
            "{field} is {} bytes, limit is {}",
            value.len(),
            u32::MAX
        ))
    })?;
    buf.put_u32(len);
    buf.put_slice(value);
    Ok(())
}

/// Bounds-checked cursor; `Buf` getters panic on short input.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    // ---
    fn need(&self, len: usize, field: &str) -> Result<()> {
        // ---
        if self.buf.remaining() < len {
            return Err(Error::Decode(format!(
                "truncated {field}: need {len} bytes, have {}",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        // ---
        self.need(len, field)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self, field: &str) -> Result<u8> {
        self.need(1, field)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self, field: &str) -> Result<u16> {
        self.need(2, field)?;
        Ok(self.buf.get_u16())
    }

    fn u32(&mut self, field: &str) -> Result<u32> {
        self.need(4, field)?;
        Ok(self.buf.get_u32())
    }

    fn u64(&mut self, field: &str) -> Result<u64> {
        self.need(8, field)?;
        Ok(self.buf.get_u64())
    }

    fn str16(&mut self, field: &str) -> Result<String> {
        // ---
        let len = self.u16(field)? as usize;
        let raw = self.take(len, field)?;
        utf8(raw, field)
    }

    fn str32(&mut self, field: &str) -> Result<String> {
        // ---
        let len = self.u32(field)? as usize;
        let raw = self.take(len, field)?;
        utf8(raw, field)
    }

    fn bytes32(&mut self, field: &str) -> Result<Bytes> {
        // ---
        let len = self.u32(field)? as usize;
        let raw = self.take(len, field)?;
        Ok(Bytes::copy_from_slice(raw))
    }
}

fn utf8(raw: &[u8], field: &str) -> Result<String> {
    // ---
    String::from_utf8(raw.to_vec()).map_err(|e| Error::Decode(format!("{field}: {e}")))
}
