//! NATS transport implementation based on `async-nats`.
//!
//! Adapts a core NATS client connection to the domain-level `Transport`
//! trait. Destinations map one-to-one onto NATS subjects.
//!
//! ## Concurrency
//!
//! `async_nats::Client` is a cheap handle onto a single connection task and
//! supports concurrent publishes from any number of tasks. The transport
//! clones the handle out of its lock before publishing, so concurrent
//! `send` calls never wait on each other here.
//!
//! ## Delivery
//!
//! Each publish is followed by a flush so that connection failures surface
//! to the caller of `send` rather than being lost in the client's buffer.
//! A caller that times out or cancels between the publish and the flush
//! gets `Timeout`/`Canceled`; the message may still reach the broker.
//!
//! ## Options
//!
//! | option               | meaning                                  |
//! |----------------------|------------------------------------------|
//! | `token`              | token authentication                     |
//! | `user` + `password`  | user/password authentication             |
//! | `name`               | client name reported to the server       |
//! | `connect_timeout_ms` | connection timeout in milliseconds       |
//!
//! Reconnect behaviour is whatever `async-nats` does by default.

use std::time::Duration;

use async_nats::{Client, ConnectOptions};
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::macros::{log_debug, log_error, log_info};
use crate::{Address, Error, Result, Transport, TransportConfig, TransportPtr};

/// Transport backed by one NATS connection.
pub struct NatsTransport {
    // ---
    url: String,
    client: RwLock<Option<Client>>,
}

impl NatsTransport {
    /// Connect to the server at `config.uri`.
    ///
    /// # Errors
    ///
    /// [`Error::Connection`] if the server cannot be reached; there is no
    /// retry at construction time. [`Error::MissingConfig`] for a malformed
    /// `connect_timeout_ms` option.
    pub async fn connect(config: &TransportConfig) -> Result<Self> {
        // ---
        let options = build_connect_options(config)?;

        log_debug!("connecting to NATS at {}", config.uri);

        let client = options
            .connect(config.uri.as_str())
            .await
            .map_err(|e| Error::Connection(format!("{}: {e}", config.uri)))?;

        log_info!("connected to NATS at {}", config.uri);

        Ok(Self {
            url: config.uri.clone(),
            client: RwLock::new(Some(client)),
        })
    }

    async fn client(&self) -> Result<Client> {
        // ---
        self.client.read().await.clone().ok_or(Error::Closed)
    }
}

#[async_trait::async_trait]
impl Transport for NatsTransport {
    // ---

    async fn publish(&self, destination: &Address, payload: Bytes) -> Result<()> {
        // ---
        let client = self.client().await?;

        client
            .publish(destination.to_string(), payload)
            .await
            .map_err(|e| Error::Transport(format!("publish to {destination}: {e}")))?;

        client
            .flush()
            .await
            .map_err(|e| Error::Connection(format!("flush after publish to {destination}: {e}")))
    }

    /// Flush pending publishes and release the connection.
    ///
    /// A second call finds no client and returns `Ok(())`.
    async fn close(&self) -> Result<()> {
        // ---
        let Some(client) = self.client.write().await.take() else {
            return Ok(());
        };

        log_debug!("closing NATS connection to {}", self.url);

        client.flush().await.map_err(|e| {
            log_error!("flush on close of {} failed: {e}", self.url);
            Error::Connection(format!("flush on close: {e}"))
        })
    }
}

fn build_connect_options(config: &TransportConfig) -> Result<ConnectOptions> {
    // ---
    let mut options = if let Some(token) = config.option_value("token") {
        ConnectOptions::with_token(token.to_string())
    } else if let (Some(user), Some(pass)) =
        (config.option_value("user"), config.option_value("password"))
    {
        ConnectOptions::with_user_and_password(user.to_string(), pass.to_string())
    } else {
        ConnectOptions::new()
    };

    if let Some(name) = config.option_value("name") {
        options = options.name(name);
    }

    if let Some(ms) = config.option_value("connect_timeout_ms") {
        let ms: u64 = ms
            .parse()
            .map_err(|_| Error::MissingConfig(format!("connect_timeout_ms: invalid value {ms:?}")))?;
        options = options.connection_timeout(Duration::from_millis(ms));
    }

    Ok(options)
}

/// Create a NATS transport from `config`.
pub async fn create_nats_transport(config: &TransportConfig) -> Result<TransportPtr> {
    // ---
    let transport: TransportPtr = std::sync::Arc::new(NatsTransport::connect(config).await?);
    Ok(transport)
}
