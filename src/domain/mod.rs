//! Domain layer public interface.
//!
//! The message envelope and the transport contract. Nothing here depends on
//! a concrete broker, wire format or client library.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod message;
mod transport;

// --- Message domain re-exports ---

pub use message::{
    //
    Attributes,
    Completion,
    Message,
    MessageParts,
    DEFAULT_TOPIC,
    TOPIC_ATTRIBUTE,
};

// --- Transport domain re-exports ---

pub use transport::{
    //
    Address,
    Transport,
    TransportConfig,
    TransportPtr,
};
