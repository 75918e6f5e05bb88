//! Sender builder.
//!
//! Fluent construction of a [`Sender`] with validation at `build()`.

use std::time::Duration;

use crate::codec::{default_codec, CodecPtr};
use crate::{create_transport, Error, Result, Sender, TransportConfig, TransportPtr};

/// Builder for [`Sender`].
///
/// Either describe a connection to open (`uri`, `transport_type`,
/// `option`) or hand in an existing one with `transport`, not both.
///
/// # Examples
///
/// ## Opening a connection
/// ```no_run
/// use whisper::SenderBuilder;
/// use std::time::Duration;
///
/// # async fn example() -> whisper::Result<()> {
/// let sender = SenderBuilder::new()
///     .uri("nats://localhost:4222")
///     .option("name", "billing")
///     .send_timeout(Duration::from_secs(2))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Sharing an existing connection
/// ```
/// use whisper::{MemoryTransport, SenderBuilder};
///
/// # async fn example() -> whisper::Result<()> {
/// let transport = MemoryTransport::isolated("shared");
/// let sender = SenderBuilder::new().transport(transport).build().await?;
/// assert!(!sender.owns_transport());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SenderBuilder {
    uri: Option<String>,
    transport_type: Option<String>,
    options: Vec<(String, String)>,
    transport: Option<TransportPtr>,
    codec: Option<CodecPtr>,
    send_timeout: Option<Duration>,
}

impl SenderBuilder {
    /// Create a new sender builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker URI, e.g. `"nats://localhost:4222"` or `"memory://"`.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Explicit transport type (`"memory"`, `"nats"`).
    ///
    /// If not specified, the URI scheme decides.
    pub fn transport_type(mut self, transport_type: impl Into<String>) -> Self {
        self.transport_type = Some(transport_type.into());
        self
    }

    /// Transport-specific option, passed through untouched.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    /// Use an already-open connection. The built sender will not close it.
    pub fn transport(mut self, transport: TransportPtr) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Codec for outgoing messages. Defaults to [`BinaryCodec`](crate::BinaryCodec).
    pub fn codec(mut self, codec: CodecPtr) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Deadline applied to every [`Sender::send`].
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Build the sender (consumes self).
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - neither a connection description nor a transport was given
    /// - both were given
    /// - the send timeout is zero
    /// - opening the transport fails
    pub async fn build(self) -> Result<Sender> {
        // ---
        if self.send_timeout == Some(Duration::ZERO) {
            return Err(Error::ConfigConflict("send_timeout must be non-zero".into()));
        }

        let codec = self.codec.unwrap_or_else(default_codec);
        let describes_connection =
            self.uri.is_some() || self.transport_type.is_some() || !self.options.is_empty();

        if let Some(transport) = self.transport {
            if describes_connection {
                return Err(Error::ConfigConflict(
                    "Cannot use both an existing transport and connection settings".into(),
                ));
            }
            return Ok(Sender::from_parts(transport, codec, false, self.send_timeout));
        }

        let config = match (self.uri, self.transport_type) {
            (Some(uri), transport_type) => TransportConfig {
                uri,
                transport_type,
                options: self.options,
            },
            (None, Some(transport_type)) if transport_type == "memory" => TransportConfig {
                uri: "memory://".into(),
                transport_type: Some(transport_type),
                options: self.options,
            },
            _ => return Err(Error::MissingConfig("uri".into())),
        };

        let transport = create_transport(&config).await?;
        Ok(Sender::from_parts(transport, codec, true, self.send_timeout))
    }
}
