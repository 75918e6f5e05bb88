//! Transport-agnostic message envelope and publish abstraction for pub/sub
//! messaging.
//!
//! Producers build immutable, uniquely identified [`Message`]s and hand them
//! to a [`Sender`], which encodes them with a versioned [`Codec`] and
//! forwards the bytes to any [`Transport`]. Consumers decode the bytes back
//! into a `Message`, bind a [`Completion`], and resolve it exactly once with
//! [`Message::ack`] or [`Message::nack`], whichever transport delivered it.
//!
//! ```
//! use whisper::{BinaryCodec, Codec, MemoryTransport, Message, Sender};
//!
//! # async fn example() -> whisper::Result<()> {
//! let transport = MemoryTransport::isolated("demo");
//! let mut inbox = transport.subscribe("orders.created").await?;
//!
//! let sender = Sender::with_transport(transport.clone());
//! let message = Message::new_with_ordering_key(&b"order #42"[..], "order-42")
//!     .with_topic("orders.created");
//! sender.send(&message).await?;
//!
//! let bytes = inbox.inbox.recv().await.unwrap();
//! let received = BinaryCodec.decode(&bytes)?;
//! assert_eq!(received.ordering_key(), "order-42");
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod codec;
mod delivery;
mod domain;
mod id;
mod macros;
mod sender;
mod sender_builder;
mod transport;

mod error;

pub use codec::{
    //
    codec_for_content_type,
    default_codec,
    BinaryCodec,
    Codec,
    CodecPtr,
    JsonCodec,
    BINARY_WIRE_VERSION,
    JSON_WIRE_VERSION,
};
pub use delivery::{decode_delivery, Receiver};
pub use error::{Error, Result};
pub use id::{IdGenerator, SequentialIdGenerator, UuidGenerator};
pub use sender::{Sender, SenderState};
pub use sender_builder::SenderBuilder;

pub use transport::{
    //
    create_memory_transport,
    create_transport,
    MemoryHub,
    MemoryTransport,
    SubscriptionHandle,
};

#[cfg(feature = "transport_nats")]
pub use transport::{create_nats_transport, NatsTransport};

// --- public re-exports
pub use domain::{
    //
    Address,
    Attributes,
    Completion,
    Message,
    MessageParts,
    Transport,
    TransportConfig,
    TransportPtr,
    DEFAULT_TOPIC,
    TOPIC_ATTRIBUTE,
};
