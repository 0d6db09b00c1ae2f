//! Domain model (ids, event types, payloads, envelope, errors).
//!
//! ここはバスやランタイムを知らない純粋な層です。
//! ワイヤ形式とスキーマ検証はすべてこの中で完結します。

pub mod envelope;
pub mod errors;
pub mod event_type;
pub mod ids;
pub mod learning_path;
pub mod payload;
pub mod question;
pub mod schema;

pub use envelope::{Envelope, validate_envelope};
pub use errors::{
    BusError, ErrorKind, GenerationError, HandlerError, PublishError, SchemaError,
};
pub use event_type::EventType;
pub use ids::{ConsumerId, EnvelopeId, EventId, RequestId};
pub use learning_path::{
    LearningPath, LearningPathOutcome, LearningPathRequest, LearningPathResponse, LearningStep,
};
pub use payload::{Difficulty, Metadata, REQUEST_ID_KEY, ResponseStatus, Timestamps};
pub use question::{
    Question, QuestionGenerationRequest, QuestionGenerationResponse, QuestionOption,
    QuestionOutcome, QuestionSet,
};
pub use schema::{EventData, Schema};
