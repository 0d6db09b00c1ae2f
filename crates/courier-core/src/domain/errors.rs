//! Errors - エラー型と分類
//!
//! 懸念ごとに thiserror の enum を分け、`ErrorKind` で運用上の分類を揃えます。
//!
//! - Permanent: 何度やっても同じ結果（スキーマ違反）。再投入しない。
//! - Recoverable: handler 内で回復し、`failed` レスポンスとして返す。
//! - Infrastructure: バス障害など。ログに残して処理ループは継続。

use thiserror::Error;

use super::event_type::EventType;

/// ErrorKind は実行エラーの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Permanent,
    Recoverable,
    Infrastructure,
}

/// Envelope or payload does not match its schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("unknown event type '{0}'")]
    UnknownEventType(String),

    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("field '{field}' out of bounds: {actual} not in [{min}, {max}]")]
    OutOfBounds {
        field: &'static str,
        min: i64,
        max: i64,
        actual: i64,
    },

    #[error("invalid payload for {event_type}: {reason}")]
    InvalidPayload { event_type: EventType, reason: String },

    #[error("payload of type {actual} does not belong to event type {expected}")]
    TypeMismatch {
        expected: EventType,
        actual: EventType,
    },

    #[error("metadata request_id '{metadata}' does not match payload request_id '{payload}'")]
    CorrelationMismatch { metadata: String, payload: String },
}

impl SchemaError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Permanent
    }
}

/// Message bus failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BusError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),

    #[error("subscription closed")]
    Closed,
}

impl BusError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Infrastructure
    }
}

/// Failures of the external generation collaborator.
///
/// Every variant ends up as a `failed` response; none of them stop the consumer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("generation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("generation service error: {0}")]
    Service(String),

    #[error("generated output is invalid: {0}")]
    InvalidOutput(String),

    #[error("generator initialization failed: {0}")]
    Init(String),
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Recoverable
    }
}

/// Producer failure: the envelope could not be encoded or the bus refused it.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("envelope encoding failed: {0}")]
    Encode(#[from] SchemaError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl PublishError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PublishError::Encode(e) => e.kind(),
            PublishError::Bus(e) => e.kind(),
        }
    }
}

/// Anything that escapes a handler. Caught and logged at the dispatch boundary.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("response publish to '{topic}' failed")]
    Publish {
        topic: String,
        #[source]
        source: PublishError,
    },

    #[error("ledger error: {0}")]
    Ledger(String),
}

impl HandlerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandlerError::Schema(e) => e.kind(),
            HandlerError::Publish { source, .. } => source.kind(),
            HandlerError::Ledger(_) => ErrorKind::Infrastructure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_follow_taxonomy() {
        assert_eq!(SchemaError::EmptyField("topic").kind(), ErrorKind::Permanent);
        assert_eq!(BusError::Closed.kind(), ErrorKind::Infrastructure);
        assert_eq!(
            GenerationError::Service("boom".into()).kind(),
            ErrorKind::Recoverable
        );
        assert_eq!(
            HandlerError::Publish {
                topic: "question.generation.response".into(),
                source: PublishError::from(BusError::Unavailable("down".into())),
            }
            .kind(),
            ErrorKind::Infrastructure
        );
    }

    #[test]
    fn out_of_bounds_message_names_the_field() {
        let err = SchemaError::OutOfBounds {
            field: "num_questions",
            min: 1,
            max: 50,
            actual: 500,
        };
        let msg = err.to_string();
        assert!(msg.contains("num_questions"));
        assert!(msg.contains("500"));
    }
}
