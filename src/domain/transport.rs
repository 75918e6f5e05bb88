// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! A transport is the external, broker-specific client that actually moves
//! bytes. The rest of the crate only ever needs two primitives from it:
//! publish opaque bytes to a named destination, and close the connection.
//! Encoding, identity and acknowledgment all live above this line.
//!
//! Concrete implementations live under `src/transport/`.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::Result;

/// A publish destination.
///
/// Interpretation is transport-specific (NATS subject, MQTT topic, queue
/// name); at this level it is an opaque identifier. Cheap to clone and
/// safe to share across threads.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address(pub Arc<str>);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T> From<T> for Address
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        Address(value.into())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection settings handed to transport factories.
///
/// Opaque to the core: the URI and options are passed through untouched to
/// whichever transport is selected.
///
/// ```
/// use whisper::TransportConfig;
///
/// let config = TransportConfig::with_uri("nats://localhost:4222")
///     .option("name", "order-service")
///     .option("connect_timeout_ms", "2000");
/// assert_eq!(config.option_value("name"), Some("order-service"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportConfig {
    /// Broker URI (e.g. `"nats://localhost:4222"`, `"memory://"`).
    pub uri: String,

    /// Explicit transport selection (`"memory"`, `"nats"`).
    ///
    /// When `None` the URI scheme decides.
    pub transport_type: Option<String>,

    /// Transport-specific options, in the order they were given.
    pub options: Vec<(String, String)>,
}

impl TransportConfig {
    /// Config for a broker at `uri`.
    pub fn with_uri(uri: impl Into<String>) -> Self {
        // ---
        Self {
            uri: uri.into(),
            transport_type: None,
            options: Vec::new(),
        }
    }

    /// Config for the in-process memory transport.
    pub fn memory() -> Self {
        // ---
        Self {
            uri: "memory://".into(),
            transport_type: Some("memory".into()),
            options: Vec::new(),
        }
    }

    /// Append a transport-specific option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        // ---
        self.options.push((key.into(), value.into()));
        self
    }

    pub fn transport_type(mut self, transport_type: impl Into<String>) -> Self {
        // ---
        self.transport_type = Some(transport_type.into());
        self
    }

    /// Last value given for `key`, if any.
    pub fn option_value(&self, key: &str) -> Option<&str> {
        // ---
        self.options
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// URI scheme, e.g. `"nats"` for `"nats://host:4222"`.
    pub fn scheme(&self) -> Option<&str> {
        // ---
        self.uri.split_once("://").map(|(scheme, _)| scheme)
    }
}

/// Transport abstraction.
///
/// The minimal contract a broker binding must satisfy. Implementations
/// must be safe for concurrent `publish` calls from multiple tasks, either
/// because the underlying client is, or by serializing internally; each
/// implementation documents which.
///
/// `publish` is responsible for honoring cancellation: when the caller's
/// future is dropped mid-publish the outcome is unknown and must not be
/// reported as success.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Treat the methods as normal `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Publish opaque bytes to `destination`.
    async fn publish(&self, destination: &Address, payload: Bytes) -> Result<()>;

    /// Close the connection and release its resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// `.clone()` only bumps a reference count; clones share one connection.
pub type TransportPtr = Arc<dyn Transport>;
