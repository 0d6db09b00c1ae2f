mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rstest::rstest;
use serde_json::json;

use common::{MockPaths, question};
use courier_core::app::EnvelopeFactory;
use courier_core::domain::{
    Difficulty, EventData, LearningPathRequest, LearningPathResponse, Metadata,
    QuestionGenerationRequest, QuestionGenerationResponse, QuestionSet, SchemaError,
    validate_envelope,
};
use courier_core::ports::{FixedClock, Generator, SystemClock, UlidGenerator};

fn factory() -> EnvelopeFactory {
    // sub-second precision must survive the wire
    let at = Utc.with_ymd_and_hms(2025, 10, 8, 10, 0, 0).unwrap() + chrono::Duration::microseconds(123_456);
    EnvelopeFactory::new(
        Arc::new(FixedClock::new(at)),
        Arc::new(UlidGenerator::new(SystemClock)),
    )
}

fn question_request() -> QuestionGenerationRequest {
    QuestionGenerationRequest::new("r1", "Loops")
        .with_num_questions(2)
        .with_difficulty(Difficulty::Hard)
        .with_question_types(vec!["multiple_choice".into(), "short_answer".into()])
        .with_user_id("user_456")
        .with_content_id("content-9")
}

fn path_request() -> LearningPathRequest {
    let mut prefs = Metadata::new();
    prefs.insert("style".to_string(), json!("video"));
    LearningPathRequest::new("lp-1", "user_456", "Ship a Rust service")
        .with_current_level("intermediate")
        .with_available_time("5h/week")
        .with_preferences(prefs)
}

async fn path_response() -> LearningPathResponse {
    let req = path_request();
    let path = MockPaths.generate(&req).await.unwrap();
    LearningPathResponse::completed(&req, path)
}

fn question_response() -> QuestionGenerationResponse {
    let set = QuestionSet {
        topic: "Loops".to_string(),
        total_questions: 2,
        questions: vec![question(1, "Loops"), question(2, "Loops")],
    };
    QuestionGenerationResponse::completed(&question_request(), set)
}

#[rstest]
#[case::question_request(EventData::QuestionGenerationRequest(question_request()))]
#[case::question_completed(EventData::QuestionGenerationResponse(question_response()))]
#[case::question_failed(EventData::QuestionGenerationResponse(
    QuestionGenerationResponse::failed(&question_request(), "model unavailable")
))]
#[case::path_request(EventData::LearningPathRequest(path_request()))]
#[case::path_failed(EventData::LearningPathResponse(
    LearningPathResponse::failed(&path_request(), "model unavailable")
))]
fn envelope_survives_the_wire(#[case] data: EventData) {
    let mut metadata = Metadata::new();
    metadata.insert("trace_id".to_string(), json!("t-1"));

    let built = factory()
        .build_envelope(data.event_type(), data, "user_456", metadata)
        .unwrap();
    let decoded = validate_envelope(&built.to_bytes().unwrap()).unwrap();

    assert_eq!(decoded, built);
    assert_eq!(decoded.event_data().timestamps(), built.event_data().timestamps());
}

#[tokio::test]
async fn completed_learning_path_survives_the_wire() {
    let data = EventData::LearningPathResponse(path_response().await);
    let built = factory()
        .build_envelope(data.event_type(), data, "ai-service", Metadata::new())
        .unwrap();
    let decoded = validate_envelope(&built.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded, built);
}

#[rstest]
#[case::not_json(b"{not json".to_vec())]
#[case::unknown_type(json_bytes("video.request"))]
fn garbage_is_rejected(#[case] raw: Vec<u8>) {
    assert!(validate_envelope(&raw).is_err());
}

#[test]
fn unknown_event_type_is_named_in_the_error() {
    let err = validate_envelope(&json_bytes("video.request")).unwrap_err();
    assert!(matches!(err, SchemaError::UnknownEventType(ref t) if t == "video.request"), "{err}");
}

fn json_bytes(event_type: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "eventId": ulid::Ulid::new().to_string(),
        "eventType": event_type,
        "eventData": { "request_id": "r1" },
        "userId": "user_456",
        "metadata": { "request_id": "r1" }
    }))
    .unwrap()
}
