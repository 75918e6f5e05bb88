//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` trait. It is intended primarily for testing, local execution,
//! and as a reference for transport semantics.
//!
//! ## Reference Semantics
//!
//! - A subscription matches a destination when their strings are equal.
//! - Once `subscribe()` returns, subsequent matching publishes are
//!   deliverable to its inbox.
//! - Delivery is deterministic within a single process; nothing is dropped
//!   because of timing or background IO.
//! - `publish` after `close` fails with [`Error::Closed`].
//! - Concurrent `publish` calls are safe: the hub is behind an async
//!   `RwLock` and each subscriber has its own channel.
//! - A full inbox only holds up publishes to that inbox's destination. The
//!   hub lock is released before any delivery waits.
//!
//! ## Non-Goals
//!
//! Persistence, redelivery, and emulation of any specific broker's failure
//! modes. Publish failures can be injected with
//! [`MemoryTransport::fail_next_publish`] instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};

use crate::macros::{log_debug, log_info};
use crate::{Address, Error, Result, Transport, TransportConfig, TransportPtr};

const DEFAULT_INBOX_CAPACITY: usize = 64;

/// Receiving side of a memory subscription.
///
/// Dropping the handle unsubscribes; the hub prunes the closed channel on
/// the next publish.
pub struct SubscriptionHandle {
    // ---
    /// Raw encoded messages published to the subscribed destination.
    pub inbox: mpsc::Receiver<Bytes>,
}

type Subscribers = Vec<(Arc<str>, mpsc::Sender<Bytes>)>;

/// Shared message bus for the in-memory transport.
///
/// All `MemoryTransport`s sharing a hub see each other's publishes, the
/// way nodes connected to one broker would. Construct one per test for
/// isolation.
pub struct MemoryHub {
    // ---
    subscriptions: RwLock<HashMap<Address, Subscribers>>,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        // ---
        Arc::new(Self::default())
    }

    async fn publish(&self, transport_id: &str, destination: &Address, payload: Bytes) {
        // ---
        let senders: Vec<mpsc::Sender<Bytes>> = {
            let mut subs = self.subscriptions.write().await;

            let Some(senders) = subs.get_mut(destination) else {
                log_debug!("{transport_id}: no subscribers for {destination}");
                return;
            };

            senders.retain(|(_, tx)| !tx.is_closed());
            senders.iter().map(|(_, tx)| tx.clone()).collect()
        };

        // No hub lock while waiting on a full inbox.
        for tx in &senders {
            // A send failure means the handle was dropped mid-publish.
            if tx.send(payload.clone()).await.is_err() {
                log_info!("{transport_id}: subscriber to {destination} went away");
            }
        }
    }

    async fn subscribe(
        &self,
        transport_id: &Arc<str>,
        destination: Address,
        capacity: usize,
    ) -> SubscriptionHandle {
        // ---
        log_debug!("{transport_id}: subscribe to {destination}");

        let (tx, rx) = mpsc::channel(capacity);

        let mut subs = self.subscriptions.write().await;
        subs.entry(destination)
            .or_default()
            .push((transport_id.clone(), tx));

        SubscriptionHandle { inbox: rx }
    }

    /// Drop every subscription registered through `transport_id`.
    async fn detach(&self, transport_id: &str) {
        // ---
        let mut subs = self.subscriptions.write().await;
        for senders in subs.values_mut() {
            senders.retain(|(owner, _)| owner.as_ref() != transport_id);
        }
        subs.retain(|_, senders| !senders.is_empty());
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        // ---
        Self {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }
}

/// Process-global hub used by [`create_memory_transport`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

/// Acquire mutex guard, ignoring poisoning
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-memory transport.
///
/// Besides delivering to hub subscribers it keeps a log of every accepted
/// publish and counts `close` calls, which makes it the fake transport of
/// choice in tests.
pub struct MemoryTransport {
    // ---
    transport_id: Arc<str>,
    hub: Arc<MemoryHub>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    published: Mutex<Vec<(Address, Bytes)>>,
    fail_next: Mutex<Option<Error>>,
}

impl MemoryTransport {
    /// Create a transport attached to `hub`.
    pub fn new(transport_id: impl Into<Arc<str>>, hub: Arc<MemoryHub>) -> Arc<Self> {
        // ---
        let transport_id = transport_id.into();
        log_debug!("{transport_id}: create memory transport");

        Arc::new(Self {
            transport_id,
            hub,
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
        })
    }

    /// Create a transport with a private hub of its own.
    pub fn isolated(transport_id: impl Into<Arc<str>>) -> Arc<Self> {
        // ---
        Self::new(transport_id, MemoryHub::new())
    }

    pub fn transport_id(&self) -> &str {
        &self.transport_id
    }

    /// Subscribe to `destination` on the shared hub.
    pub async fn subscribe(&self, destination: impl Into<Address>) -> Result<SubscriptionHandle> {
        // ---
        self.subscribe_with_capacity(destination, DEFAULT_INBOX_CAPACITY)
            .await
    }

    /// Subscribe with an explicit inbox capacity.
    ///
    /// A full inbox makes publishers wait.
    pub async fn subscribe_with_capacity(
        &self,
        destination: impl Into<Address>,
        capacity: usize,
    ) -> Result<SubscriptionHandle> {
        // ---
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(self
            .hub
            .subscribe(&self.transport_id, destination.into(), capacity.max(1))
            .await)
    }

    /// Every publish accepted so far, in order.
    pub fn published(&self) -> Vec<(Address, Bytes)> {
        // ---
        lock_ignore_poison(&self.published).clone()
    }

    /// How many times `close` has been called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Make the next `publish` fail with `err` without delivering anything.
    pub fn fail_next_publish(&self, err: Error) {
        // ---
        *lock_ignore_poison(&self.fail_next) = Some(err);
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---

    /// Deliver `payload` to every subscription on `destination`.
    async fn publish(&self, destination: &Address, payload: Bytes) -> Result<()> {
        // ---
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let injected = lock_ignore_poison(&self.fail_next).take();
        if let Some(err) = injected {
            return Err(err);
        }

        lock_ignore_poison(&self.published).push((destination.clone(), payload.clone()));

        self.hub
            .publish(&self.transport_id, destination, payload)
            .await;
        Ok(())
    }

    /// Close the transport.
    ///
    /// Drops the subscriptions made through this transport only; other
    /// transports on the same hub keep theirs.
    async fn close(&self) -> Result<()> {
        // ---
        self.close_calls.fetch_add(1, Ordering::AcqRel);

        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        log_debug!("{}: closing transport...", self.transport_id);
        self.hub.detach(&self.transport_id).await;
        Ok(())
    }
}

/// Create a memory transport on the process-global hub.
///
/// All transports created this way share one bus. The `name` option, if
/// present, becomes the transport id used in logs.
///
/// # Errors
///
/// Currently infallible.
pub async fn create_memory_transport(config: &TransportConfig) -> Result<TransportPtr> {
    // ---
    let transport_id = config.option_value("name").unwrap_or("memory");
    let transport: TransportPtr = MemoryTransport::new(transport_id, global_hub());
    Ok(transport)
}
