// tests/integration.rs

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use whisper::{
    //
    Address,
    BinaryCodec,
    Codec,
    Completion,
    Error,
    MemoryHub,
    MemoryTransport,
    Message,
    Receiver,
    Result,
    Sender,
    SenderBuilder,
    SenderState,
    Transport,
    TransportConfig,
};

/// Completion that remembers every resolution it was asked for.
#[derive(Default)]
struct AckLog {
    calls: Mutex<Vec<(String, bool)>>,
}

impl Completion for AckLog {
    fn resolve(&self, id: &str, ack: bool) {
        self.calls.lock().unwrap().push((id.to_string(), ack));
    }
}

/// Transport whose publish never finishes on its own.
struct StalledTransport {
    started: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait::async_trait]
impl Transport for StalledTransport {
    async fn publish(&self, _destination: &Address, _payload: Bytes) -> Result<()> {
        // ---
        let started = self.started.lock().unwrap().take();
        if let Some(tx) = started {
            let _ = tx.send(());
        }
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_basic_publish() -> Result<()> {
    // ---
    init_logging();

    let transport = MemoryTransport::isolated("basic");
    let sender = Sender::with_transport(transport.clone());

    let m = Message::new(&b"hello"[..]);
    sender.send(&m).await?;

    let published = transport.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, m.destination());
    assert_eq!(published[0].1, BinaryCodec.encode(&m)?);
    Ok(())
}

#[tokio::test]
async fn test_closed_sender_rejects_send() -> Result<()> {
    // ---
    init_logging();

    let transport = MemoryTransport::isolated("closed");
    let sender = SenderBuilder::new()
        .transport(transport.clone())
        .build()
        .await?;

    let m = Message::new(&b"hello"[..]);
    sender.close().await?;

    assert_eq!(sender.send(&m).await, Err(Error::Closed));
    assert!(transport.published().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_ordering_key_passthrough() -> Result<()> {
    // ---
    let m = Message::new_with_ordering_key(&b"data"[..], "order-42");
    let decoded = BinaryCodec.decode(&BinaryCodec.encode(&m)?)?;
    assert_eq!(decoded.ordering_key(), "order-42");
    Ok(())
}

#[tokio::test]
async fn test_double_close_owned_transport() -> Result<()> {
    // ---
    init_logging();

    let sender = Sender::connect(&TransportConfig::memory().option("name", "double-close")).await?;
    assert!(sender.owns_transport());

    assert_eq!(sender.close().await, Ok(()));
    assert_eq!(sender.close().await, Ok(()));
    assert_eq!(sender.state(), SenderState::Closed);
    Ok(())
}

#[tokio::test]
async fn test_ids_are_unique() {
    // ---
    let ids: HashSet<String> = (0..10_000)
        .map(|_| Message::new(Bytes::new()).id().to_string())
        .collect();
    assert_eq!(ids.len(), 10_000);
}

#[tokio::test]
async fn test_publish_receive_ack_end_to_end() -> Result<()> {
    // ---
    init_logging();

    // ---
    // Arrange
    // ---
    let hub = MemoryHub::new();
    let producer = MemoryTransport::new("producer", hub.clone());
    let consumer = MemoryTransport::new("consumer", hub.clone());

    let acks = Arc::new(AckLog::default());
    let handle = consumer.subscribe("orders.created").await?;
    let mut receiver = Receiver::new(handle, whisper::default_codec(), acks.clone());

    let sender = Sender::with_transport(producer.clone());

    let m = Message::new_with_ordering_key(&b"order #42"[..], "order-42")
        .with_topic("orders.created")
        .with_attribute("origin", "billing");

    // ---
    // Act
    // ---
    sender.send(&m).await?;

    let received = tokio::time::timeout(Duration::from_millis(100), receiver.recv())
        .await
        .expect("timed out waiting for message")
        .expect("subscription closed unexpectedly")?;

    received.ack();
    received.ack();
    received.nack();

    // ---
    // Assert
    // ---
    assert_eq!(received, m);
    assert_eq!(received.attribute("origin"), Some("billing"));
    assert_eq!(
        acks.calls.lock().unwrap().as_slice(),
        &[(m.id().to_string(), true)]
    );

    // the producer-side original was never handed to a consumer
    m.ack();
    assert!(!m.is_resolved());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_sends_share_one_transport() -> Result<()> {
    // ---
    init_logging();

    let transport = MemoryTransport::isolated("concurrent");
    let sender = Arc::new(Sender::with_transport(transport.clone()));

    let mut handles = Vec::new();
    for i in 0..32 {
        // ---
        let sender = sender.clone();
        handles.push(tokio::spawn(async move {
            let m = Message::new(format!("payload-{i}").into_bytes()).with_topic("fan.in");
            sender.send(&m).await.map(|_| m.id().to_string())
        }));
    }

    let mut sent = HashSet::new();
    for handle in handles {
        sent.insert(handle.await.expect("send task panicked")?);
    }

    let published: HashSet<String> = transport
        .published()
        .iter()
        .map(|(_, bytes)| BinaryCodec.decode(bytes).map(|m| m.id().to_string()))
        .collect::<Result<_>>()?;

    assert_eq!(sent.len(), 32);
    assert_eq!(published, sent);
    Ok(())
}

#[tokio::test]
async fn test_send_timeout_reports_timeout() {
    // ---
    let transport = Arc::new(StalledTransport {
        started: Mutex::new(None),
    });
    let sender = Sender::with_transport(transport);

    let m = Message::new(&b"slow"[..]);
    let res = sender
        .send_with_timeout(&m, Duration::from_millis(20))
        .await;

    assert_eq!(res, Err(Error::Timeout));
}

#[tokio::test]
async fn test_configured_timeout_applies_to_send() {
    // ---
    let transport = Arc::new(StalledTransport {
        started: Mutex::new(None),
    });
    let sender = SenderBuilder::new()
        .transport(transport)
        .send_timeout(Duration::from_millis(20))
        .build()
        .await
        .unwrap();

    let res = sender.send(&Message::new(&b"slow"[..])).await;
    assert_eq!(res, Err(Error::Timeout));
}

#[tokio::test]
async fn test_cancel_mid_publish_reports_canceled() {
    // ---
    let (started_tx, started_rx) = oneshot::channel();
    let transport = Arc::new(StalledTransport {
        started: Mutex::new(Some(started_tx)),
    });
    let sender = Sender::with_transport(transport);

    let m = Message::new(&b"slow"[..]);
    let cancel = async {
        let _ = started_rx.await;
    };

    assert_eq!(sender.send_until(&m, cancel).await, Err(Error::Canceled));
}

#[tokio::test]
async fn test_undecodable_delivery_does_not_end_stream() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let transport = MemoryTransport::new("mixed", hub);
    let acks = Arc::new(AckLog::default());

    let handle = transport.subscribe("mixed").await?;
    let mut receiver = Receiver::new(handle, whisper::default_codec(), acks.clone());

    let dest = Address::from("mixed");
    transport
        .publish(&dest, Bytes::from_static(b"not a message"))
        .await?;
    let good = Message::new(&b"ok"[..]).with_topic("mixed");
    transport
        .publish(&dest, BinaryCodec.encode(&good)?)
        .await?;

    assert!(matches!(receiver.recv().await, Some(Err(Error::Decode(_)))));

    let received = receiver.recv().await.expect("stream ended")?;
    received.nack();

    assert_eq!(
        acks.calls.lock().unwrap().as_slice(),
        &[(good.id().to_string(), false)]
    );
    Ok(())
}

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;
    use tracing_subscriber::EnvFilter;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    pub fn init() {}
}

pub fn init_logging() {
    imp::init();
}
