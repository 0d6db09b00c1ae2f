//! EnvelopeFactory - 新しい event_id と現在時刻でエンベロープを組み立てる

use std::sync::Arc;

use crate::domain::{Envelope, EventData, EventType, Metadata, Schema, SchemaError};
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};

pub struct EnvelopeFactory {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl EnvelopeFactory {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { clock, ids }
    }

    /// Fresh `event_id`, timestamps from the clock, payload checked against
    /// the schema registered for `event_type`.
    pub fn build_envelope(
        &self,
        event_type: EventType,
        payload: EventData,
        origin_id: impl Into<String>,
        metadata: Metadata,
    ) -> Result<Envelope, SchemaError> {
        Envelope::build(
            self.ids.generate_event_id(),
            self.clock.now(),
            event_type,
            payload,
            origin_id,
            metadata,
        )
    }

    /// Typed shorthand: the event type comes from the payload's schema.
    pub fn build<S: Schema>(
        &self,
        payload: S,
        origin_id: impl Into<String>,
        metadata: Metadata,
    ) -> Result<Envelope, SchemaError> {
        self.build_envelope(S::EVENT_TYPE, payload.into_event_data(), origin_id, metadata)
    }
}

impl Default for EnvelopeFactory {
    fn default() -> Self {
        Self::new(
            Arc::new(SystemClock),
            Arc::new(UlidGenerator::new(SystemClock)),
        )
    }
}
