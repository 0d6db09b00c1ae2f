//! Schema registry - event_type → payload 型の対応
//!
//! `Schema` trait が型と `EventType` を静的に結び付け、`EventData` が閉じた和型として
//! 全ペイロードを表します。`EventData::decode` がレジストリの実体で、
//! 未知のタグや形の合わないペイロードはここで `SchemaError` になります。

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::errors::SchemaError;
use super::event_type::EventType;
use super::ids::RequestId;
use super::learning_path::{LearningPathRequest, LearningPathResponse};
use super::payload::{Metadata, Timestamps};
use super::question::{QuestionGenerationRequest, QuestionGenerationResponse};

/// A payload type bound to exactly one `EventType`.
pub trait Schema: Serialize + DeserializeOwned + Send + Sync + 'static {
    const EVENT_TYPE: EventType;

    fn validate(&self) -> Result<(), SchemaError>;

    fn request_id(&self) -> &RequestId;

    fn payload_metadata(&self) -> Option<&Metadata>;

    fn into_event_data(self) -> EventData;

    fn from_event_data(data: EventData) -> Result<Self, SchemaError>;
}

macro_rules! impl_schema {
    ($ty:ident, $variant:ident) => {
        impl Schema for $ty {
            const EVENT_TYPE: EventType = EventType::$variant;

            fn validate(&self) -> Result<(), SchemaError> {
                $ty::validate(self)
            }

            fn request_id(&self) -> &RequestId {
                &self.request_id
            }

            fn payload_metadata(&self) -> Option<&Metadata> {
                self.metadata.as_ref()
            }

            fn into_event_data(self) -> EventData {
                EventData::$variant(self)
            }

            fn from_event_data(data: EventData) -> Result<Self, SchemaError> {
                match data {
                    EventData::$variant(inner) => Ok(inner),
                    other => Err(SchemaError::TypeMismatch {
                        expected: EventType::$variant,
                        actual: other.event_type(),
                    }),
                }
            }
        }
    };
}

impl_schema!(LearningPathRequest, LearningPathRequest);
impl_schema!(LearningPathResponse, LearningPathResponse);
impl_schema!(QuestionGenerationRequest, QuestionGenerationRequest);
impl_schema!(QuestionGenerationResponse, QuestionGenerationResponse);

/// Closed sum of every payload the orchestration layer knows.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    LearningPathRequest(LearningPathRequest),
    LearningPathResponse(LearningPathResponse),
    QuestionGenerationRequest(QuestionGenerationRequest),
    QuestionGenerationResponse(QuestionGenerationResponse),
}

impl EventData {
    pub fn event_type(&self) -> EventType {
        match self {
            EventData::LearningPathRequest(_) => EventType::LearningPathRequest,
            EventData::LearningPathResponse(_) => EventType::LearningPathResponse,
            EventData::QuestionGenerationRequest(_) => EventType::QuestionGenerationRequest,
            EventData::QuestionGenerationResponse(_) => EventType::QuestionGenerationResponse,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        match self {
            EventData::LearningPathRequest(p) => p.request_id(),
            EventData::LearningPathResponse(p) => p.request_id(),
            EventData::QuestionGenerationRequest(p) => p.request_id(),
            EventData::QuestionGenerationResponse(p) => p.request_id(),
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        match self {
            EventData::LearningPathRequest(p) => p.validate(),
            EventData::LearningPathResponse(p) => p.validate(),
            EventData::QuestionGenerationRequest(p) => p.validate(),
            EventData::QuestionGenerationResponse(p) => p.validate(),
        }
    }

    pub fn timestamps(&self) -> &Timestamps {
        match self {
            EventData::LearningPathRequest(p) => &p.timestamps,
            EventData::LearningPathResponse(p) => &p.timestamps,
            EventData::QuestionGenerationRequest(p) => &p.timestamps,
            EventData::QuestionGenerationResponse(p) => &p.timestamps,
        }
    }

    pub(crate) fn stamp(&mut self, timestamps: Timestamps) {
        match self {
            EventData::LearningPathRequest(p) => p.timestamps = timestamps,
            EventData::LearningPathResponse(p) => p.timestamps = timestamps,
            EventData::QuestionGenerationRequest(p) => p.timestamps = timestamps,
            EventData::QuestionGenerationResponse(p) => p.timestamps = timestamps,
        }
    }

    /// JSON-safe encoding of the payload. The only path to the wire.
    pub fn to_value(&self) -> Result<serde_json::Value, SchemaError> {
        let encoded = match self {
            EventData::LearningPathRequest(p) => serde_json::to_value(p),
            EventData::LearningPathResponse(p) => serde_json::to_value(p),
            EventData::QuestionGenerationRequest(p) => serde_json::to_value(p),
            EventData::QuestionGenerationResponse(p) => serde_json::to_value(p),
        };
        encoded.map_err(|e| SchemaError::InvalidPayload {
            event_type: self.event_type(),
            reason: e.to_string(),
        })
    }

    /// Decode and validate a raw payload against the schema registered for `event_type`.
    pub fn decode(event_type: EventType, value: serde_json::Value) -> Result<Self, SchemaError> {
        let data = match event_type {
            EventType::LearningPathRequest => decode_as::<LearningPathRequest>(value)?,
            EventType::LearningPathResponse => decode_as::<LearningPathResponse>(value)?,
            EventType::QuestionGenerationRequest => decode_as::<QuestionGenerationRequest>(value)?,
            EventType::QuestionGenerationResponse => {
                decode_as::<QuestionGenerationResponse>(value)?
            }
        };
        data.validate()?;
        Ok(data)
    }
}

fn decode_as<T: Schema>(value: serde_json::Value) -> Result<EventData, SchemaError> {
    serde_json::from_value::<T>(value)
        .map(T::into_event_data)
        .map_err(|e| SchemaError::InvalidPayload {
            event_type: T::EVENT_TYPE,
            reason: e.to_string(),
        })
}
