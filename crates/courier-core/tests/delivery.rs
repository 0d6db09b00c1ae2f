//! 配送の性質: 再配送・順序・停止・遅延初期化・publish 失敗

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use courier_core::app::{ConsumerState, EnvelopeFactory};
use courier_core::domain::{
    EventType, LearningPathRequest, Metadata, QuestionGenerationRequest, QuestionOutcome,
    ResponseStatus,
};
use courier_core::impls::InMemoryBus;
use courier_core::ports::MessageBus;

#[tokio::test]
async fn redelivered_request_produces_one_response() {
    let bus = Arc::new(InMemoryBus::new());
    let questions = Arc::new(MockQuestions::default());
    let app = app(bus.clone(), questions.clone());
    let service = app.start();

    app.submitter()
        .submit(QuestionGenerationRequest::new("r1", "Loops"), "user_456", Metadata::new())
        .await
        .unwrap();
    wait_for_records(&bus, QUESTION_RESPONSES, 1).await;

    // the broker hands the same record out again
    let original = bus.records(QUESTION_REQUESTS).await.remove(0);
    bus.publish(QUESTION_REQUESTS, &original.key, original.payload)
        .await
        .unwrap();
    wait_until_drained(&bus, QUESTION_REQUESTS, QUESTION_GROUP).await;

    assert_eq!(bus.records(QUESTION_RESPONSES).await.len(), 1);
    assert_eq!(questions.calls().await, vec!["r1"]);
    let stats = service.stats(EventType::QuestionGenerationRequest).unwrap();
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.published(), 1);
    service.shutdown_and_join().await;
}

#[tokio::test]
async fn uncommitted_record_is_picked_up_by_the_next_service() {
    let bus = Arc::new(InMemoryBus::new());
    let config = common::fast_config();
    let config = courier_core::app::Config {
        shutdown_grace: Duration::from_millis(50),
        ..config
    };
    let slow = Arc::new(MockQuestions::slow(Duration::from_secs(10)));
    let first = app_with(bus.clone(), config, prebuilt(slow.clone()));
    let service = first.start();

    first
        .submitter()
        .submit(QuestionGenerationRequest::new("r1", "Loops"), "user_456", Metadata::new())
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while slow.calls().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    // grace が切れて中断される。commit されないまま
    service.shutdown_and_join().await;
    assert!(bus.records(QUESTION_RESPONSES).await.is_empty());

    let second = app(bus.clone(), Arc::new(MockQuestions::default()));
    let service = second.start();
    let responses = wait_for_records(&bus, QUESTION_RESPONSES, 1).await;
    assert_eq!(question_response(&responses[0]).request_id.as_str(), "r1");
    service.shutdown_and_join().await;
}

#[tokio::test]
async fn records_sharing_a_key_are_handled_in_publish_order() {
    let bus = Arc::new(InMemoryBus::new());
    let questions = Arc::new(MockQuestions::slow(Duration::from_millis(20)));
    let app = app(bus.clone(), questions.clone());
    let service = app.start();

    let factory = EnvelopeFactory::default();
    let mut expected = Vec::new();
    for n in 0..6 {
        let id = format!("o{n}");
        let key = if n % 2 == 0 { "user-even" } else { "user-odd" };
        let envelope = factory
            .build(QuestionGenerationRequest::new(id.as_str(), "Loops"), "user_456", Metadata::new())
            .unwrap();
        bus.publish(QUESTION_REQUESTS, key, envelope.to_bytes().unwrap())
            .await
            .unwrap();
        if key == "user-even" {
            expected.push(id);
        }
    }
    wait_for_records(&bus, QUESTION_RESPONSES, 6).await;

    let even: Vec<String> = questions
        .calls()
        .await
        .into_iter()
        .filter(|id| expected.contains(id))
        .collect();
    assert_eq!(even, expected);
    service.shutdown_and_join().await;
}

#[tokio::test]
async fn shutdown_finishes_in_flight_work_and_stops_consuming() {
    let bus = Arc::new(InMemoryBus::new());
    let questions = Arc::new(MockQuestions::slow(Duration::from_millis(200)));
    let app = app(bus.clone(), questions.clone());
    let service = app.start();
    let submitter = app.submitter();

    submitter
        .submit(QuestionGenerationRequest::new("r1", "Loops"), "user_456", Metadata::new())
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while questions.calls().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let consumers = service.consumers();
    service.shutdown_and_join().await;
    assert_eq!(consumers.len(), 2);

    let responses = envelopes(&bus, QUESTION_RESPONSES).await;
    assert_eq!(responses.len(), 1);
    assert_eq!(question_response(&responses[0]).status(), ResponseStatus::Completed);

    // 停止後の受付は成功するが、処理はされない
    submitter
        .submit(QuestionGenerationRequest::new("r2", "Loops"), "user_456", Metadata::new())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(questions.calls().await, vec!["r1"]);
}

#[tokio::test]
async fn consumers_report_their_lifecycle() {
    let bus = Arc::new(InMemoryBus::new());
    let app = app(bus, Arc::new(MockQuestions::default()));
    let service = app.start();
    service.wait_until_polling().await;

    let active = service.active_consumers();
    let mut topics: Vec<&str> = active.iter().map(|c| c.topic.as_str()).collect();
    topics.sort();
    assert_eq!(topics, vec![PATH_REQUESTS, QUESTION_REQUESTS]);
    assert!(active.iter().all(|c| c.state == ConsumerState::Polling));

    service.request_shutdown();
    service.shutdown_and_join().await;
}

#[tokio::test]
async fn unsubscribing_one_consumer_leaves_the_others_running() {
    let bus = Arc::new(InMemoryBus::new());
    let questions = Arc::new(MockQuestions::default());
    let app = app(bus.clone(), questions.clone());
    let mut service = app.start();
    service.wait_until_polling().await;

    let question_consumer = service
        .consumers()
        .into_iter()
        .find(|c| c.event_type == EventType::QuestionGenerationRequest)
        .unwrap();
    assert!(service.unsubscribe(question_consumer.id).await);
    assert!(!service.unsubscribe(question_consumer.id).await);

    let remaining = service.consumers();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].topic, PATH_REQUESTS);

    let submitter = app.submitter();
    submitter
        .submit(QuestionGenerationRequest::new("r1", "Loops"), "user_456", Metadata::new())
        .await
        .unwrap();
    submitter
        .submit(
            LearningPathRequest::new("lp-1", "user_456", "Learn Rust"),
            "user_456",
            Metadata::new(),
        )
        .await
        .unwrap();

    wait_for_records(&bus, PATH_RESPONSES, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(questions.calls().await.is_empty());
    assert!(bus.records(QUESTION_RESPONSES).await.is_empty());
    service.shutdown_and_join().await;
}

#[tokio::test]
async fn lazy_init_failure_fails_the_request_and_is_retried_next_time() {
    let bus = Arc::new(InMemoryBus::with_partitions(1));
    let questions = Arc::new(MockQuestions::default());
    let factory = Arc::new(FlakyFactory::new(1, questions.clone()));
    let app = app_with(bus.clone(), fast_config(), factory.clone());
    let service = app.start();
    let submitter = app.submitter();

    for id in ["r1", "r2"] {
        submitter
            .submit(QuestionGenerationRequest::new(id, "Loops"), "user_456", Metadata::new())
            .await
            .unwrap();
    }
    let responses = wait_for_records(&bus, QUESTION_RESPONSES, 2).await;

    let first = question_response(&responses[0]);
    let QuestionOutcome::Failed { error } = &first.outcome else {
        panic!("expected failed");
    };
    assert!(error.contains("initialization failed"), "{error}");
    assert_eq!(question_response(&responses[1]).status(), ResponseStatus::Completed);

    assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    assert_eq!(questions.calls().await, vec!["r2"]);
    service.shutdown_and_join().await;
}

#[tokio::test]
async fn response_publish_failure_is_counted_as_lost_and_loop_continues() {
    let bus = Arc::new(InMemoryBus::with_partitions(1));
    let app = app(bus.clone(), Arc::new(MockQuestions::default()));
    let service = app.start();
    let submitter = app.submitter();

    bus.fail_publishes(QUESTION_RESPONSES).await;
    submitter
        .submit(QuestionGenerationRequest::new("r1", "Loops"), "user_456", Metadata::new())
        .await
        .unwrap();
    wait_until_drained(&bus, QUESTION_REQUESTS, QUESTION_GROUP).await;

    let stats = service.stats(EventType::QuestionGenerationRequest).unwrap();
    assert_eq!(stats.lost, 1);
    assert!(bus.records(QUESTION_RESPONSES).await.is_empty());

    bus.restore(QUESTION_RESPONSES).await;
    submitter
        .submit(QuestionGenerationRequest::new("r2", "Loops"), "user_456", Metadata::new())
        .await
        .unwrap();
    let responses = wait_for_records(&bus, QUESTION_RESPONSES, 1).await;
    assert_eq!(question_response(&responses[0]).request_id.as_str(), "r2");
    service.shutdown_and_join().await;
}
