//! Submitter - 同期的な受付境界
//!
//! リクエスト本体を検証し、エンベロープにして request topic に publish したら
//! すぐに `Accepted` を返します。生成処理の完了は待ちません。

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::info;

use crate::app::envelope_factory::EnvelopeFactory;
use crate::app::producer::Producer;
use crate::app::router::TopicRouter;
use crate::domain::{
    EnvelopeId, EventData, EventType, Metadata, PublishError, RequestId, SchemaError,
};
use crate::typed::GenerationRequest;

/// The request was validated and durably queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub request_id: RequestId,
    pub event_id: EnvelopeId,
    pub topic: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid request: {0}")]
    Invalid(#[from] SchemaError),

    #[error("'{0}' is not a request type")]
    NotARequest(EventType),

    #[error("request could not be queued: {0}")]
    Unavailable(#[from] PublishError),
}

#[derive(Clone)]
pub struct Submitter {
    producer: Producer,
    envelopes: Arc<EnvelopeFactory>,
    router: Arc<TopicRouter>,
}

impl Submitter {
    pub fn new(producer: Producer, envelopes: Arc<EnvelopeFactory>, router: Arc<TopicRouter>) -> Self {
        Self {
            producer,
            envelopes,
            router,
        }
    }

    /// Submit a typed request on behalf of `origin_id`.
    pub async fn submit<R: GenerationRequest>(
        &self,
        request: R,
        origin_id: &str,
        metadata: Metadata,
    ) -> Result<Accepted, SubmitError> {
        self.submit_data(R::EVENT_TYPE, request.into_event_data(), origin_id, metadata)
            .await
    }

    /// Submit a raw JSON request body, as received from an API caller.
    ///
    /// Timestamps are stamped here; callers do not send them.
    pub async fn submit_json(
        &self,
        event_type: EventType,
        mut body: Value,
        origin_id: &str,
        metadata: Metadata,
    ) -> Result<Accepted, SubmitError> {
        if !event_type.is_request() {
            return Err(SubmitError::NotARequest(event_type));
        }
        if let Value::Object(fields) = &mut body {
            let now = Value::String(Utc::now().to_rfc3339());
            fields.entry("created_at").or_insert_with(|| now.clone());
            fields.entry("updated_at").or_insert(now);
        }
        let data = EventData::decode(event_type, body)?;
        self.submit_data(event_type, data, origin_id, metadata).await
    }

    async fn submit_data(
        &self,
        event_type: EventType,
        data: EventData,
        origin_id: &str,
        metadata: Metadata,
    ) -> Result<Accepted, SubmitError> {
        if !event_type.is_request() {
            return Err(SubmitError::NotARequest(event_type));
        }
        let envelope = self
            .envelopes
            .build_envelope(event_type, data, origin_id, metadata)?;
        let topic = self.router.topic(event_type);
        self.producer.publish(topic, &envelope).await?;

        info!(
            request_id = %envelope.request_id(),
            event_id = %envelope.event_id(),
            event_type = %event_type,
            topic,
            "request accepted"
        );
        Ok(Accepted {
            request_id: envelope.request_id().clone(),
            event_id: envelope.event_id().clone(),
            topic: topic.to_string(),
        })
    }
}
