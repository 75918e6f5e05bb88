//! Transport-agnostic publish contract.
//!
//! A [`Sender`] takes a [`Message`], asks it for its destination, encodes it
//! with a [`Codec`](crate::Codec) and hands the bytes to a
//! [`Transport`](crate::Transport). It never retries and never mutates the
//! message, so a failed send can simply be repeated by the caller.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use crate::codec::{default_codec, CodecPtr};
use crate::macros::{log_debug, log_warn};
use crate::{create_transport, Error, Message, Result, TransportConfig, TransportPtr};

/// Lifecycle of a [`Sender`].
///
/// `Unopened -> Open -> Closed`. A `Sender` value is only handed out once
/// its transport is attached, so `Unopened` describes a
/// [`SenderBuilder`](crate::SenderBuilder) that has not been built yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SenderState {
    // ---
    /// No transport attached yet.
    Unopened = 0,

    /// Accepting `send` calls.
    Open = 1,

    /// `close` has been called; every `send` fails with [`Error::Closed`].
    Closed = 2,
}

impl SenderState {
    fn from_u8(value: u8) -> Self {
        // ---
        match value {
            1 => SenderState::Open,
            2 => SenderState::Closed,
            _ => SenderState::Unopened,
        }
    }
}

/// Publishes messages through one transport connection.
///
/// `send` takes `&self`, so a sender can be shared (e.g. behind an `Arc`)
/// by many concurrent callers; concurrency safety of the publish itself is
/// the transport's contract.
pub struct Sender {
    // ---
    transport: TransportPtr,
    codec: CodecPtr,

    /// True when this sender opened the connection and must close it.
    owns_transport: bool,

    send_timeout: Option<Duration>,
    state: AtomicU8,
}

impl Sender {
    /// Open the transport described by `config` and own it.
    ///
    /// # Errors
    ///
    /// Connection failures are returned as-is ([`Error::Connection`] for
    /// unreachable brokers). There is no retry at construction time.
    pub async fn connect(config: &TransportConfig) -> Result<Self> {
        // ---
        let transport = create_transport(config).await?;
        log_debug!("sender connected via {:?}", config.uri);
        Ok(Self::from_parts(transport, default_codec(), true, None))
    }

    /// Wrap an already-open connection.
    ///
    /// The sender does not own it: [`close`](Self::close) stops this sender
    /// but leaves the transport open for its other users.
    pub fn with_transport(transport: TransportPtr) -> Self {
        // ---
        Self::from_parts(transport, default_codec(), false, None)
    }

    pub(crate) fn from_parts(
        transport: TransportPtr,
        codec: CodecPtr,
        owns_transport: bool,
        send_timeout: Option<Duration>,
    ) -> Self {
        // ---
        Self {
            transport,
            codec,
            owns_transport,
            send_timeout,
            state: AtomicU8::new(SenderState::Open as u8),
        }
    }

    /// Replace the codec used for subsequent sends.
    pub fn with_codec(mut self, codec: CodecPtr) -> Self {
        // ---
        self.codec = codec;
        self
    }

    pub fn state(&self) -> SenderState {
        SenderState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn owns_transport(&self) -> bool {
        self.owns_transport
    }

    pub fn codec(&self) -> &CodecPtr {
        &self.codec
    }

    /// Default deadline applied by [`send`](Self::send), if any.
    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout
    }

    /// Publish `message` to its destination.
    ///
    /// Applies the configured send timeout when there is one.
    ///
    /// # Errors
    ///
    /// - [`Error::Closed`] after [`close`](Self::close)
    /// - [`Error::Encode`] if the codec rejects the message
    /// - [`Error::Timeout`] if the configured timeout elapses
    /// - anything the transport's `publish` reports, unchanged
    pub async fn send(&self, message: &Message) -> Result<()> {
        // ---
        match self.send_timeout {
            Some(timeout) => self.send_with_timeout(message, timeout).await,
            None => self.publish(message).await,
        }
    }

    /// Publish with an explicit deadline.
    ///
    /// On [`Error::Timeout`] the publish was abandoned mid-flight: the broker
    /// may or may not have the message.
    pub async fn send_with_timeout(&self, message: &Message, timeout: Duration) -> Result<()> {
        // ---
        tokio::time::timeout(timeout, self.publish(message))
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// Publish unless `cancel` completes first.
    ///
    /// A cancel signal that is already complete wins without publishing.
    /// On [`Error::Canceled`] the delivery outcome is unknown, as with a
    /// timeout.
    pub async fn send_until<F>(&self, message: &Message, cancel: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        // ---
        tokio::select! {
            biased;
            _ = cancel => Err(Error::Canceled),
            res = self.publish(message) => res,
        }
    }

    async fn publish(&self, message: &Message) -> Result<()> {
        // ---
        if self.state() != SenderState::Open {
            return Err(Error::Closed);
        }

        let destination = message.destination();
        let payload = self.codec.encode(message)?;

        self.transport.publish(&destination, payload).await
    }

    /// Stop accepting sends and release the connection if owned.
    ///
    /// Idempotent: only the first call does anything, later calls return
    /// `Ok(())` without touching the transport.
    pub async fn close(&self) -> Result<()> {
        // ---
        let was_open = self
            .state
            .compare_exchange(
                SenderState::Open as u8,
                SenderState::Closed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if !was_open {
            return Ok(());
        }

        if self.owns_transport {
            log_debug!("sender closing owned transport");
            let res = self.transport.close().await;
            if let Err(e) = &res {
                log_warn!("closing owned transport failed: {e}");
            }
            res
        } else {
            log_debug!("sender closed; borrowed transport left open");
            Ok(())
        }
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.debug_struct("Sender")
            .field("state", &self.state())
            .field("owns_transport", &self.owns_transport)
            .field("codec", &self.codec.content_type())
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}
