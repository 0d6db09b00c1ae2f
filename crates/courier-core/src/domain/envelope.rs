//! Envelope - すべてのリクエスト/レスポンスを包むワイヤ上のレコード
//!
//! Wire format (UTF-8 JSON):
//!
//! ```text
//! { "eventId": "...", "eventType": "...", "eventData": {...}, "userId": "...", "metadata": {...} }
//! ```
//!
//! `Envelope` は検証済みの型付き表現、`WireEnvelope` はバスとの境界でだけ使う生の形です。
//! bytes ↔ Envelope の変換は必ず `to_bytes` / `validate_envelope` を通ります。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::SchemaError;
use super::event_type::EventType;
use super::ids::{EnvelopeId, EventId, RequestId};
use super::payload::{Metadata, REQUEST_ID_KEY, Timestamps};
use super::schema::EventData;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    event_id: String,
    event_type: String,
    event_data: serde_json::Value,
    user_id: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

/// A validated envelope. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    event_id: EnvelopeId,
    event_type: EventType,
    event_data: EventData,
    origin_id: String,
    metadata: Metadata,
}

impl Envelope {
    /// Build a new envelope around `payload`.
    ///
    /// Stamps `created_at`/`updated_at` with `now`, copies the payload's
    /// `request_id` into `metadata`, and validates everything against the
    /// schema registered for `event_type`.
    pub fn build(
        event_id: EventId,
        now: DateTime<Utc>,
        event_type: EventType,
        mut payload: EventData,
        origin_id: impl Into<String>,
        metadata: Metadata,
    ) -> Result<Self, SchemaError> {
        if payload.event_type() != event_type {
            return Err(SchemaError::TypeMismatch {
                expected: event_type,
                actual: payload.event_type(),
            });
        }
        let origin_id = origin_id.into();
        if origin_id.trim().is_empty() {
            return Err(SchemaError::EmptyField("userId"));
        }
        payload.validate()?;
        payload.stamp(Timestamps::at(now));

        let metadata = correlate(metadata, payload.request_id())?;
        Ok(Self {
            event_id: EnvelopeId::Generated(event_id),
            event_type,
            event_data: payload,
            origin_id,
            metadata,
        })
    }

    pub fn event_id(&self) -> &EnvelopeId {
        &self.event_id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn event_data(&self) -> &EventData {
        &self.event_data
    }

    pub fn into_event_data(self) -> EventData {
        self.event_data
    }

    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn request_id(&self) -> &RequestId {
        self.event_data.request_id()
    }

    /// Encode for the bus. Payloads go through `EventData::to_value`, never a
    /// generic serializer over arbitrary values.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SchemaError> {
        let wire = WireEnvelope {
            event_id: self.event_id.to_wire(),
            event_type: self.event_type.as_str().to_string(),
            event_data: self.event_data.to_value()?,
            user_id: self.origin_id.clone(),
            metadata: Some(self.metadata.clone()),
        };
        serde_json::to_vec(&wire).map_err(|e| SchemaError::Malformed(e.to_string()))
    }
}

/// Deserialize and validate an inbound bus record.
///
/// Malformed JSON, unknown `eventType`, payloads that do not fit their schema and
/// metadata that disagrees with the payload's `request_id` all stop here.
pub fn validate_envelope(raw: &[u8]) -> Result<Envelope, SchemaError> {
    let wire: WireEnvelope =
        serde_json::from_slice(raw).map_err(|e| SchemaError::Malformed(e.to_string()))?;

    let event_id =
        EnvelopeId::from_wire(wire.event_id).ok_or(SchemaError::EmptyField("eventId"))?;

    if wire.event_type.trim().is_empty() {
        return Err(SchemaError::EmptyField("eventType"));
    }
    let event_type: EventType = wire.event_type.parse()?;

    if wire.user_id.trim().is_empty() {
        return Err(SchemaError::EmptyField("userId"));
    }

    let event_data = EventData::decode(event_type, wire.event_data)?;

    let metadata = wire.metadata.unwrap_or_default();
    match metadata.get(REQUEST_ID_KEY) {
        None => return Err(SchemaError::EmptyField("metadata.request_id")),
        Some(v) if v.as_str() != Some(event_data.request_id().as_str()) => {
            return Err(SchemaError::CorrelationMismatch {
                metadata: v.to_string(),
                payload: event_data.request_id().to_string(),
            });
        }
        Some(_) => {}
    }

    Ok(Envelope {
        event_id,
        event_type,
        event_data,
        origin_id: wire.user_id,
        metadata,
    })
}

fn correlate(mut metadata: Metadata, request_id: &RequestId) -> Result<Metadata, SchemaError> {
    match metadata.get(REQUEST_ID_KEY) {
        Some(existing) if existing.as_str() != Some(request_id.as_str()) => {
            Err(SchemaError::CorrelationMismatch {
                metadata: existing.to_string(),
                payload: request_id.to_string(),
            })
        }
        Some(_) => Ok(metadata),
        None => {
            metadata.insert(
                REQUEST_ID_KEY.to_string(),
                serde_json::Value::String(request_id.to_string()),
            );
            Ok(metadata)
        }
    }
}
