//! Producer - 検証済みエンベロープを topic に publish する
//!
//! バスが耐久的に受理するまで待ちます（ビジネスロジックの完了は待たない）。

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{Envelope, PublishError};
use crate::ports::{Ack, MessageBus};

#[derive(Clone)]
pub struct Producer {
    bus: Arc<dyn MessageBus>,
}

impl Producer {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    pub async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<Ack, PublishError> {
        let key = partition_key(envelope);
        let bytes = envelope.to_bytes()?;
        let ack = self.bus.publish(topic, key, bytes).await?;
        debug!(
            topic,
            partition = ack.partition,
            offset = ack.offset,
            event_type = %envelope.event_type(),
            request_id = %envelope.request_id(),
            "published"
        );
        Ok(ack)
    }

    /// Publish `envelopes` to `topic` in order, each keyed by its own `partition_key`.
    ///
    /// 1 件の失敗で残りを止めません。結果は入力と同じ順で 1 件ずつ返します。
    pub async fn publish_batch(
        &self,
        topic: &str,
        envelopes: &[Envelope],
    ) -> Vec<Result<Ack, PublishError>> {
        let mut results = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            results.push(self.publish(topic, envelope).await);
        }
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(topic, total = envelopes.len(), failed, "batch publish partially failed");
        }
        results
    }
}

/// `request_id`, or `origin_id` when the payload carries none.
pub fn partition_key(envelope: &Envelope) -> &str {
    let request_id = envelope.request_id();
    if request_id.is_blank() {
        envelope.origin_id()
    } else {
        request_id.as_str()
    }
}
