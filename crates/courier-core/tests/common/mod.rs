//! 結合テスト共通のモック generator とヘルパー
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use courier_core::app::{App, AppBuilder, Config};
use courier_core::domain::{
    Difficulty, Envelope, EventData, GenerationError, LearningPath, LearningPathRequest,
    LearningStep, Question, QuestionGenerationRequest, QuestionGenerationResponse, QuestionSet,
    validate_envelope,
};
use courier_core::impls::InMemoryBus;
use courier_core::ports::{Generator, GeneratorFactory, Prebuilt};

pub const QUESTION_REQUESTS: &str = "question.generation.request";
pub const QUESTION_RESPONSES: &str = "question.generation.response";
pub const PATH_REQUESTS: &str = "learning_path.request";
pub const PATH_RESPONSES: &str = "learning_path.response";
pub const QUESTION_GROUP: &str = "ai-service-question-generator-consumer";

pub fn fast_config() -> Config {
    Config {
        poll_interval: Duration::from_millis(20),
        generation_timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_secs(2),
        ..Config::default()
    }
}

pub fn question(id: u32, topic: &str) -> Question {
    Question {
        question_id: id,
        question_type: "multiple_choice".to_string(),
        question_text: format!("{topic} question {id}"),
        options: None,
        correct_answer: "A".to_string(),
        explanation: "because".to_string(),
        difficulty: Difficulty::Easy,
        concepts: vec![topic.to_lowercase()],
    }
}

/// Question generator mock: records call order, fails for scripted request ids.
#[derive(Default)]
pub struct MockQuestions {
    pub calls: Mutex<Vec<String>>,
    pub fail_for: HashSet<String>,
    pub delay: Duration,
}

impl MockQuestions {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            fail_for: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl Generator<QuestionGenerationRequest> for MockQuestions {
    async fn generate(
        &self,
        request: &QuestionGenerationRequest,
    ) -> Result<QuestionSet, GenerationError> {
        self.calls
            .lock()
            .await
            .push(request.request_id.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_for.contains(request.request_id.as_str()) {
            return Err(GenerationError::Service("upstream model error".to_string()));
        }
        Ok(QuestionSet {
            topic: request.topic.clone(),
            total_questions: request.num_questions,
            questions: (1..=request.num_questions)
                .map(|n| question(n, &request.topic))
                .collect(),
        })
    }
}

#[derive(Default)]
pub struct MockPaths;

#[async_trait]
impl Generator<LearningPathRequest> for MockPaths {
    async fn generate(&self, request: &LearningPathRequest) -> Result<LearningPath, GenerationError> {
        Ok(LearningPath {
            goal: request.goal.clone(),
            difficulty_level: request.current_level.clone(),
            total_duration: "2 weeks".to_string(),
            steps: (1..=2)
                .map(|n| LearningStep {
                    step_number: n,
                    title: format!("Step {n}"),
                    description: "read and practice".to_string(),
                    estimated_duration: "1 week".to_string(),
                    resources: vec![],
                    prerequisites: vec![],
                })
                .collect(),
        })
    }
}

/// Factory whose first `failures` builds fail.
pub struct FlakyFactory {
    pub builds: AtomicU32,
    failures: u32,
    generator: Arc<MockQuestions>,
}

impl FlakyFactory {
    pub fn new(failures: u32, generator: Arc<MockQuestions>) -> Self {
        Self {
            builds: AtomicU32::new(0),
            failures,
            generator,
        }
    }
}

#[async_trait]
impl GeneratorFactory<QuestionGenerationRequest> for FlakyFactory {
    async fn build(&self) -> Result<Arc<dyn Generator<QuestionGenerationRequest>>, GenerationError> {
        let n = self.builds.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(GenerationError::Service("credentials not found".to_string()));
        }
        Ok(self.generator.clone())
    }
}

pub fn prebuilt<R, G>(generator: Arc<G>) -> Arc<dyn GeneratorFactory<R>>
where
    R: courier_core::typed::GenerationRequest,
    G: Generator<R> + 'static,
{
    Arc::new(Prebuilt::<R>::new(generator))
}

/// App with both request types registered.
pub fn app(bus: Arc<InMemoryBus>, questions: Arc<MockQuestions>) -> App {
    app_with(bus, fast_config(), prebuilt(questions))
}

pub fn app_with(
    bus: Arc<InMemoryBus>,
    config: Config,
    questions: Arc<dyn GeneratorFactory<QuestionGenerationRequest>>,
) -> App {
    AppBuilder::new(config, bus)
        .register::<QuestionGenerationRequest>(questions)
        .unwrap()
        .register::<LearningPathRequest>(prebuilt(Arc::new(MockPaths)))
        .unwrap()
        .build()
        .unwrap()
}

/// Decoded envelopes currently on `topic`.
pub async fn envelopes(bus: &InMemoryBus, topic: &str) -> Vec<Envelope> {
    bus.records(topic)
        .await
        .iter()
        .map(|r| validate_envelope(&r.payload).unwrap())
        .collect()
}

/// Wait until `topic` holds at least `n` records.
pub async fn wait_for_records(bus: &InMemoryBus, topic: &str, n: usize) -> Vec<Envelope> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if bus.records(topic).await.len() >= n {
                return envelopes(bus, topic).await;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {n} records on {topic}"))
}

/// Wait until every partition of `topic` is committed up to its end.
pub async fn wait_until_drained(bus: &InMemoryBus, topic: &str, group_id: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let records = bus.records(topic).await;
            let committed = bus.committed(topic, group_id).await;
            let done = (0..bus.partitions()).all(|p| {
                let end = records.iter().filter(|r| r.partition == p).count() as u64;
                committed.get(p as usize).copied().unwrap_or(0) >= end
            });
            if done {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {group_id} to drain {topic}"));
}

pub fn question_response(envelope: &Envelope) -> &QuestionGenerationResponse {
    match envelope.event_data() {
        EventData::QuestionGenerationResponse(resp) => resp,
        other => panic!("unexpected payload {:?}", other.event_type()),
    }
}
