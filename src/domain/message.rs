// src/domain/message.rs

//! Message envelope and its acknowledgment lifecycle.
//!
//! A [`Message`] is created by a producer, optionally decorated with
//! attributes, handed to a [`Sender`](crate::Sender), turned into opaque
//! bytes by a [`Codec`](crate::Codec), and rebuilt on the consumer side.
//! The consumer framework then binds a [`Completion`] and application code
//! resolves the message exactly once with [`Message::ack`] or
//! [`Message::nack`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::{Address, IdGenerator, UuidGenerator};

/// Message attributes: key-unique metadata describing codec, origin and
/// routing. Iteration order is not part of the contract.
pub type Attributes = HashMap<String, String>;

/// Attribute holding the destination topic of a message.
pub const TOPIC_ATTRIBUTE: &str = "topic";

/// Destination used when a message carries no [`TOPIC_ATTRIBUTE`].
pub const DEFAULT_TOPIC: &str = "default";

/// Capability that reports the outcome of a delivered message back to the
/// consumer framework (and from there to the broker).
///
/// Bound to a [`Message`] at the consumer boundary. Called at most once per
/// message with the message id and `true` for ack, `false` for nack.
/// Failures in downstream work (e.g. telling the broker) are handled inside
/// `resolve`; there is no channel to report them back through `ack()`.
///
/// Any `Fn(&str, bool) + Send + Sync` closure is a `Completion`.
pub trait Completion: Send + Sync {
    /// Report the outcome for message `id`.
    fn resolve(&self, id: &str, ack: bool);
}

impl<F> Completion for F
where
    F: Fn(&str, bool) + Send + Sync,
{
    fn resolve(&self, id: &str, ack: bool) {
        // ---
        self(id, ack)
    }
}

/// Persistent fields of a [`Message`], used by codecs to rebuild one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageParts {
    pub id: String,
    pub data: Bytes,
    pub ordering_key: String,
    pub attributes: Attributes,
    pub delivery_attempt: Option<u32>,
    pub size: usize,
}

/// The unit of transport between producers and consumers.
///
/// Identity and payload are fixed at construction. Attributes may be
/// changed until the message is handed to a sender. The resolution flag and
/// bound completion are process-local and never cross the wire.
///
/// Equality compares persistent fields only.
pub struct Message {
    // ---
    id: String,
    data: Bytes,

    /// Messages sharing a non-empty key are consumed in production order.
    /// Upholding that is the consumer-side transport's job; the message
    /// only carries the key.
    ordering_key: String,

    attributes: Attributes,

    /// Set only when redelivery tracking is enabled on the consumer side.
    /// Starts at 1, incremented by the transport on each redelivery.
    delivery_attempt: Option<u32>,

    /// Informational; not authoritative for wire length.
    size: usize,

    resolved: AtomicBool,
    completion: Option<Arc<dyn Completion>>,
}

impl Message {
    // ---

    /// Create a message with a fresh random id and no ordering key.
    pub fn new(data: impl Into<Bytes>) -> Self {
        // ---
        Self::new_with(&UuidGenerator, data)
    }

    /// Create a message with a fresh random id and the given ordering key.
    pub fn new_with_ordering_key(data: impl Into<Bytes>, key: impl Into<String>) -> Self {
        // ---
        Self::new_with_ordering_key_with(&UuidGenerator, data, key)
    }

    /// Create a message whose id comes from `ids`.
    pub fn new_with(ids: &dyn IdGenerator, data: impl Into<Bytes>) -> Self {
        // ---
        Self::new_with_ordering_key_with(ids, data, String::new())
    }

    /// Create a message with an ordering key and an id from `ids`.
    pub fn new_with_ordering_key_with(
        ids: &dyn IdGenerator,
        data: impl Into<Bytes>,
        key: impl Into<String>,
    ) -> Self {
        // ---
        let data = data.into();
        let size = data.len();

        Self::from_parts(MessageParts {
            id: ids.next(),
            data,
            ordering_key: key.into(),
            attributes: Attributes::new(),
            delivery_attempt: None,
            size,
        })
    }

    /// Rebuild a message from decoded fields.
    ///
    /// The result is unresolved and has no completion bound.
    pub fn from_parts(parts: MessageParts) -> Self {
        // ---
        Self {
            id: parts.id,
            data: parts.data,
            ordering_key: parts.ordering_key,
            attributes: parts.attributes,
            delivery_attempt: parts.delivery_attempt,
            size: parts.size,
            resolved: AtomicBool::new(false),
            completion: None,
        }
    }

    /// Copy out the persistent fields.
    pub fn to_parts(&self) -> MessageParts {
        // ---
        MessageParts {
            id: self.id.clone(),
            data: self.data.clone(),
            ordering_key: self.ordering_key.clone(),
            attributes: self.attributes.clone(),
            delivery_attempt: self.delivery_attempt,
            size: self.size,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The ordering key; empty when the message is unordered.
    pub fn ordering_key(&self) -> &str {
        &self.ordering_key
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn delivery_attempt(&self) -> Option<u32> {
        self.delivery_attempt
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Insert or replace an attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        // ---
        self.attributes.insert(key.into(), value.into());
    }

    /// Builder form of [`set_attribute`](Self::set_attribute).
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        // ---
        self.set_attribute(key, value);
        self
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<String> {
        self.attributes.remove(key)
    }

    /// Route the message to `topic`.
    pub fn set_topic(&mut self, topic: impl Into<String>) {
        // ---
        self.set_attribute(TOPIC_ATTRIBUTE, topic);
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        // ---
        self.set_topic(topic);
        self
    }

    /// The explicitly set topic, if any.
    pub fn topic(&self) -> Option<&str> {
        self.attribute(TOPIC_ATTRIBUTE)
    }

    /// Where this message is published.
    ///
    /// Answered from the message's own attributes: the topic attribute when
    /// present and non-empty, [`DEFAULT_TOPIC`] otherwise.
    pub fn destination(&self) -> Address {
        // ---
        match self.topic() {
            Some(topic) if !topic.is_empty() => Address::from(topic),
            _ => Address::from(DEFAULT_TOPIC),
        }
    }

    /// Record the delivery attempt reported by the transport.
    ///
    /// Only meant for transports rebuilding a redelivered message; the
    /// message itself never changes this value.
    pub fn with_delivery_attempt(mut self, attempt: u32) -> Self {
        // ---
        self.delivery_attempt = Some(attempt);
        self
    }

    /// Bind the completion used by [`ack`](Self::ack) and [`nack`](Self::nack).
    ///
    /// Called by the consumer framework after decoding. Producer-side
    /// messages never have one.
    pub fn bind_completion(&mut self, completion: Arc<dyn Completion>) {
        // ---
        self.completion = Some(completion);
    }

    pub fn with_completion(mut self, completion: Arc<dyn Completion>) -> Self {
        // ---
        self.bind_completion(completion);
        self
    }

    pub fn has_completion(&self) -> bool {
        self.completion.is_some()
    }

    /// True once `ack` or `nack` has taken effect.
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    /// Mark the message as successfully processed.
    ///
    /// The first `ack` or `nack` on a message with a bound completion
    /// invokes it with `(id, true)`. Every later call is a no-op. Without a
    /// bound completion this does nothing.
    pub fn ack(&self) {
        // ---
        self.done(true);
    }

    /// Mark the message as failed or rejected.
    ///
    /// Same rules as [`ack`](Self::ack); the completion sees `(id, false)`.
    pub fn nack(&self) {
        // ---
        self.done(false);
    }

    fn done(&self, ack: bool) {
        // ---
        let Some(completion) = self.completion.as_ref() else {
            return;
        };

        // Only the caller that flips the flag resolves.
        if self
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        completion.resolve(&self.id, ack);
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        // ---
        self.id == other.id
            && self.data == other.data
            && self.ordering_key == other.ordering_key
            && self.attributes == other.attributes
            && self.delivery_attempt == other.delivery_attempt
            && self.size == other.size
    }
}

impl Eq for Message {}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("data", &self.data)
            .field("ordering_key", &self.ordering_key)
            .field("attributes", &self.attributes)
            .field("delivery_attempt", &self.delivery_attempt)
            .field("size", &self.size)
            .field("resolved", &self.is_resolved())
            .field("has_completion", &self.has_completion())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::SequentialIdGenerator;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every resolution it sees.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl Completion for Recorder {
        fn resolve(&self, id: &str, ack: bool) {
            self.calls.lock().unwrap().push((id.to_string(), ack));
        }
    }

    fn bound(message: Message) -> (Message, Arc<Recorder>) {
        // ---
        let recorder = Arc::new(Recorder::default());
        let message = message.with_completion(recorder.clone());
        (message, recorder)
    }

    #[test]
    fn test_new_assigns_unique_ids() {
        // ---
        let ids: HashSet<String> = (0..10_000)
            .map(|_| Message::new(&b"x"[..]).id().to_string())
            .collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_new_defaults() {
        // ---
        let m = Message::new(&b"hello"[..]);
        assert_eq!(m.data().as_ref(), b"hello");
        assert_eq!(m.ordering_key(), "");
        assert!(m.attributes().is_empty());
        assert_eq!(m.delivery_attempt(), None);
        assert_eq!(m.size(), 5);
        assert!(!m.has_completion());
        assert!(!m.is_resolved());
    }

    #[test]
    fn test_injected_generator() {
        // ---
        let ids = SequentialIdGenerator::new("t");
        let a = Message::new_with(&ids, &b"a"[..]);
        let b = Message::new_with_ordering_key_with(&ids, &b"b"[..], "order-42");
        assert_eq!(a.id(), "t-1");
        assert_eq!(b.id(), "t-2");
        assert_eq!(b.ordering_key(), "order-42");
    }

    #[test]
    fn test_ack_twice_resolves_once() {
        // ---
        let (m, recorder) = bound(Message::new(&b"x"[..]));
        m.ack();
        m.ack();

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[(m.id().to_string(), true)]);
        assert!(m.is_resolved());
    }

    #[test]
    fn test_nack_after_ack_is_noop() {
        // ---
        let (m, recorder) = bound(Message::new(&b"x"[..]));
        m.ack();
        m.nack();

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1);
    }

    #[test]
    fn test_ack_after_nack_is_noop() {
        // ---
        let (m, recorder) = bound(Message::new(&b"x"[..]));
        m.nack();
        m.ack();

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[(m.id().to_string(), false)]);
    }

    #[test]
    fn test_resolve_without_completion_is_noop() {
        // ---
        let m = Message::new(&b"x"[..]);
        m.ack();
        m.nack();
        assert!(!m.is_resolved());
    }

    #[test]
    fn test_concurrent_ack_resolves_once() {
        // ---
        let (m, recorder) = bound(Message::new(&b"x"[..]));
        let m = Arc::new(m);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let m = m.clone();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        m.ack();
                    } else {
                        m.nack();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_closure_completion() {
        // ---
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let m = Message::new(&b"x"[..]).with_completion(Arc::new(move |id: &str, ack: bool| {
            *sink.lock().unwrap() = Some((id.to_string(), ack));
        }));

        m.nack();
        assert_eq!(*seen.lock().unwrap(), Some((m.id().to_string(), false)));
    }

    #[test]
    fn test_destination_from_topic() {
        // ---
        let m = Message::new(&b"x"[..]).with_topic("orders.created");
        assert_eq!(m.destination(), Address::from("orders.created"));
        assert_eq!(m.attribute(TOPIC_ATTRIBUTE), Some("orders.created"));
    }

    #[test]
    fn test_destination_defaults() {
        // ---
        let m = Message::new(&b"x"[..]);
        assert_eq!(m.destination(), Address::from(DEFAULT_TOPIC));

        let m = m.with_topic("");
        assert_eq!(m.destination(), Address::from(DEFAULT_TOPIC));
    }

    #[test]
    fn test_attributes_are_key_unique() {
        // ---
        let mut m = Message::new(&b"x"[..]).with_attribute("codec", "json");
        m.set_attribute("codec", "bin");
        assert_eq!(m.attributes().len(), 1);
        assert_eq!(m.attribute("codec"), Some("bin"));
        assert_eq!(m.remove_attribute("codec"), Some("bin".to_string()));
        assert!(m.attributes().is_empty());
    }

    #[test]
    fn test_equality_ignores_resolution() {
        // ---
        let ids = SequentialIdGenerator::new("eq");
        let a = Message::new_with(&ids, &b"x"[..]);
        let (b, _recorder) = bound(Message::from_parts(a.to_parts()));
        b.ack();
        assert_eq!(a, b);
    }

    #[test]
    fn test_debug_omits_completion() {
        // ---
        let (m, _recorder) = bound(Message::new(&b"x"[..]));
        let text = format!("{m:?}");
        assert!(text.contains("has_completion: true"));
        assert!(!text.contains("Recorder"));
    }
}
