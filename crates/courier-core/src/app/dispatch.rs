//! Dispatcher - バスのレコード 1 件を検証して handler に渡す
//!
//! handler の境界を越えたエラーはここで止めてログに残します。
//! 戻り値に関わらず、呼び出し側はレコードをコミットしてよい状態になります。

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::{ErrorKind, HandlerError, ResponseStatus, validate_envelope};
use crate::observability::ConsumerStats;
use crate::ports::BusRecord;
use crate::typed::{Handled, HandlerRegistry};

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Failed schema validation or had no handler. Dropped without a response.
    Rejected,
    Responded(ResponseStatus),
    Duplicate,
    /// The handler returned an error; it was logged here.
    Escaped(ErrorKind),
}

pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    stats: Arc<ConsumerStats>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, stats: Arc<ConsumerStats>) -> Self {
        Self { registry, stats }
    }

    pub fn stats(&self) -> &Arc<ConsumerStats> {
        &self.stats
    }

    pub async fn dispatch(&self, record: &BusRecord) -> Dispatched {
        self.stats.record_received();

        let envelope = match validate_envelope(&record.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "rejected record failed schema validation"
                );
                self.stats.record_rejected();
                return Dispatched::Rejected;
            }
        };

        let event_type = envelope.event_type();
        let request_id = envelope.request_id().clone();
        let Some(handler) = self.registry.get(event_type) else {
            warn!(
                topic = %record.topic,
                request_id = %request_id,
                event_type = %event_type,
                "rejected record has no handler"
            );
            self.stats.record_rejected();
            return Dispatched::Rejected;
        };

        match handler.handle(envelope).await {
            Ok(Handled::Responded { status, .. }) => {
                match status {
                    ResponseStatus::Completed => self.stats.record_completed(),
                    ResponseStatus::Failed => self.stats.record_failed(),
                }
                Dispatched::Responded(status)
            }
            Ok(Handled::Duplicate) => {
                info!(
                    request_id = %request_id,
                    event_type = %event_type,
                    "skipped redelivered request"
                );
                self.stats.record_duplicate();
                Dispatched::Duplicate
            }
            Err(HandlerError::Publish { topic, source }) => {
                error!(
                    request_id = %request_id,
                    event_type = %event_type,
                    topic = %topic,
                    error = %source,
                    "lost work: response computed but not published"
                );
                self.stats.record_lost();
                Dispatched::Escaped(source.kind())
            }
            Err(e) => {
                error!(
                    request_id = %request_id,
                    event_type = %event_type,
                    error = %error_chain(&e),
                    kind = ?e.kind(),
                    "handler error"
                );
                Dispatched::Escaped(e.kind())
            }
        }
    }
}

/// `outer: inner: root` rendering of an error and its sources.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        out.push_str(": ");
        out.push_str(&e.to_string());
        source = e.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Envelope, SchemaError};
    use async_trait::async_trait;
    use serde_json::json;
    use ulid::Ulid;

    enum Answer {
        Handled(Handled),
        SchemaError,
        Unreachable,
    }

    #[async_trait]
    impl crate::typed::DynHandler for Answer {
        fn event_type(&self) -> crate::domain::EventType {
            crate::domain::EventType::QuestionGenerationRequest
        }

        async fn handle(&self, _envelope: Envelope) -> Result<Handled, HandlerError> {
            match self {
                Answer::Handled(h) => Ok(h.clone()),
                Answer::SchemaError => Err(HandlerError::Schema(SchemaError::EmptyField("topic"))),
                Answer::Unreachable => panic!("handler must not run"),
            }
        }
    }

    fn dispatcher(answer: Answer) -> Dispatcher {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(answer)).unwrap();
        Dispatcher::new(Arc::new(registry), Arc::new(ConsumerStats::new()))
    }

    fn record(payload: serde_json::Value) -> BusRecord {
        BusRecord {
            topic: "question.generation.request".into(),
            partition: 0,
            offset: 0,
            key: "r1".into(),
            payload: payload.to_string().into_bytes(),
        }
    }

    fn valid(event_type: &str, data: serde_json::Value) -> serde_json::Value {
        json!({
            "eventId": Ulid::new().to_string(),
            "eventType": event_type,
            "eventData": data,
            "userId": "user_456",
            "metadata": { "request_id": "r1" }
        })
    }

    fn question_data(n: u32) -> serde_json::Value {
        json!({
            "request_id": "r1",
            "topic": "Loops",
            "num_questions": n,
            "created_at": "2025-10-08T10:00:00Z",
            "updated_at": "2025-10-08T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_out_of_bounds_request_never_reaches_handler() {
        let d = dispatcher(Answer::Unreachable);
        let out = d
            .dispatch(&record(valid("question.generation.request", question_data(500))))
            .await;
        assert_eq!(out, Dispatched::Rejected);
        assert_eq!(d.stats().snapshot().rejected, 1);
    }

    #[tokio::test]
    async fn test_unregistered_type_is_rejected() {
        let d = dispatcher(Answer::Handled(Handled::Duplicate));
        let data = json!({
            "request_id": "r1",
            "user_id": "u",
            "goal": "Learn Rust",
            "created_at": "2025-10-08T10:00:00Z",
            "updated_at": "2025-10-08T10:00:00Z"
        });
        let out = d.dispatch(&record(valid("learning_path.request", data))).await;
        assert_eq!(out, Dispatched::Rejected);
    }

    #[tokio::test]
    async fn test_duplicate_is_counted() {
        let d = dispatcher(Answer::Handled(Handled::Duplicate));
        let out = d
            .dispatch(&record(valid("question.generation.request", question_data(3))))
            .await;
        assert_eq!(out, Dispatched::Duplicate);
        assert_eq!(d.stats().snapshot().duplicates, 1);
    }

    #[tokio::test]
    async fn test_escaped_errors_are_contained() {
        let d = dispatcher(Answer::SchemaError);
        let out = d
            .dispatch(&record(valid("question.generation.request", question_data(3))))
            .await;
        assert_eq!(out, Dispatched::Escaped(ErrorKind::Permanent));
        assert_eq!(d.stats().snapshot().received, 1);
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let err = HandlerError::Publish {
            topic: "t".into(),
            source: crate::domain::PublishError::Bus(crate::domain::BusError::Closed),
        };
        let chain = error_chain(&err);
        assert!(chain.starts_with("response publish to 't' failed"));
        assert!(chain.ends_with("subscription closed"));
    }
}
