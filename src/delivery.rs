//! Consumer-side glue: turning received bytes back into resolvable messages.

use std::sync::Arc;

use crate::codec::CodecPtr;
use crate::macros::log_warn;
use crate::{Codec, Completion, Message, Result, SubscriptionHandle};

/// Decode `bytes` and bind `completion` in one step.
///
/// Either a fully decoded message with its completion bound comes back, or
/// an error and nothing else; the completion is never invoked here.
pub fn decode_delivery(
    codec: &dyn Codec,
    bytes: &[u8],
    completion: Arc<dyn Completion>,
) -> Result<Message> {
    // ---
    let mut message = codec.decode(bytes)?;
    message.bind_completion(completion);
    Ok(message)
}

/// Yields decoded messages from a memory subscription, each bound to the
/// same completion.
pub struct Receiver {
    // ---
    handle: SubscriptionHandle,
    codec: CodecPtr,
    completion: Arc<dyn Completion>,
}

impl Receiver {
    pub fn new(handle: SubscriptionHandle, codec: CodecPtr, completion: Arc<dyn Completion>) -> Self {
        // ---
        Self {
            handle,
            codec,
            completion,
        }
    }

    /// Wait for the next message.
    ///
    /// `None` once the subscription is gone. A payload that fails to decode
    /// comes back as `Some(Err(..))` and the stream carries on.
    pub async fn recv(&mut self) -> Option<Result<Message>> {
        // ---
        let bytes = self.handle.inbox.recv().await?;
        let res = decode_delivery(self.codec.as_ref(), &bytes, self.completion.clone());
        if let Err(e) = &res {
            log_warn!("undecodable delivery ({} bytes): {e}", bytes.len());
        }
        Some(res)
    }
}
