//! Transport implementations.
//!
//! Concrete implementations of the domain-level `Transport` trait. The
//! memory transport is always available; broker bindings sit behind
//! feature flags.
//!
//! Domain code must not depend on transport-specific types.

mod memory;

#[cfg(feature = "transport_nats")]
mod nats;

pub use memory::{create_memory_transport, MemoryHub, MemoryTransport, SubscriptionHandle};

#[cfg(feature = "transport_nats")]
pub use nats::{create_nats_transport, NatsTransport};

use crate::macros::log_debug;
use crate::{Error, Result, TransportConfig, TransportPtr};

/// Open the transport described by `config`.
///
/// An explicit `transport_type` wins; otherwise the URI scheme decides.
/// Recognised values: `memory`, `nats` (also `tls` as a NATS scheme).
///
/// # Errors
///
/// [`Error::MissingConfig`] when neither a type nor a scheme is present,
/// [`Error::UnsupportedTransport`] for unknown or disabled transports, and
/// whatever the chosen transport reports while connecting.
pub async fn create_transport(config: &TransportConfig) -> Result<TransportPtr> {
    // ---
    let kind = config
        .transport_type
        .as_deref()
        .or_else(|| config.scheme())
        .ok_or_else(|| Error::MissingConfig("transport_type or a uri scheme".into()))?;

    log_debug!("creating {kind} transport for {:?}", config.uri);

    match kind {
        "memory" => create_memory_transport(config).await,

        #[cfg(feature = "transport_nats")]
        "nats" | "tls" => create_nats_transport(config).await,

        #[cfg(not(feature = "transport_nats"))]
        "nats" | "tls" => Err(Error::UnsupportedTransport(format!(
            "{kind} (enable the transport_nats feature)"
        ))),

        other => Err(Error::UnsupportedTransport(format!(
            "{other}, valid values: memory, nats"
        ))),
    }
}
