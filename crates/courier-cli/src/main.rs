use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use courier_core::app::{AppBuilder, Config, Correlator, SubmitError};
use courier_core::domain::{
    Difficulty, EventData, EventType, GenerationError, LearningPath, LearningPathRequest,
    LearningStep, Metadata, Question, QuestionGenerationRequest, QuestionOption, QuestionSet,
    RequestId,
};
use courier_core::impls::InMemoryBus;
use courier_core::observability::init_tracing;
use courier_core::ports::{Generator, GeneratorFactory, MessageBus};
use courier_core::typed::GenerationRequest;

/// 台本どおりに問題を返す generator（request_id が "r3" のときだけ失敗）
#[derive(Default)]
struct ScriptedQuestions;

#[async_trait]
impl Generator<QuestionGenerationRequest> for ScriptedQuestions {
    async fn generate(
        &self,
        request: &QuestionGenerationRequest,
    ) -> Result<QuestionSet, GenerationError> {
        if request.request_id.as_str() == "r3" {
            return Err(GenerationError::Service("model endpoint returned 503".into()));
        }
        sleep(Duration::from_millis(50)).await;
        let questions = (1..=request.num_questions)
            .map(|n| Question {
                question_id: n,
                question_type: "multiple_choice".to_string(),
                question_text: format!("{} #{n}: what is printed?", request.topic),
                options: Some(vec![
                    QuestionOption {
                        option_id: "A".to_string(),
                        text: "nothing".to_string(),
                        is_correct: true,
                    },
                    QuestionOption {
                        option_id: "B".to_string(),
                        text: "an error".to_string(),
                        is_correct: false,
                    },
                ]),
                correct_answer: "A".to_string(),
                explanation: "The body never runs.".to_string(),
                difficulty: request.difficulty,
                concepts: vec![request.topic.to_lowercase()],
            })
            .collect();
        Ok(QuestionSet {
            topic: request.topic.clone(),
            total_questions: request.num_questions,
            questions,
        })
    }
}

#[derive(Default)]
struct ScriptedPaths;

#[async_trait]
impl Generator<LearningPathRequest> for ScriptedPaths {
    async fn generate(&self, request: &LearningPathRequest) -> Result<LearningPath, GenerationError> {
        let steps: Vec<LearningStep> = ["Basics", "Practice", "Project"]
            .iter()
            .enumerate()
            .map(|(i, title)| LearningStep {
                step_number: i as u32 + 1,
                title: title.to_string(),
                description: format!("{title} for {}", request.goal),
                estimated_duration: "1 week".to_string(),
                resources: vec!["official docs".to_string()],
                prerequisites: vec![],
            })
            .collect();
        Ok(LearningPath {
            goal: request.goal.clone(),
            difficulty_level: request.current_level.clone(),
            total_duration: format!("{} weeks", steps.len()),
            steps,
        })
    }
}

/// 初回のリクエストで client を組み立てる factory（組み立て回数を数える）
struct CountingFactory<G> {
    builds: AtomicU32,
    _client: PhantomData<fn() -> G>,
}

impl<G> CountingFactory<G> {
    fn new() -> Self {
        Self {
            builds: AtomicU32::new(0),
            _client: PhantomData,
        }
    }
}

#[async_trait]
impl<R, G> GeneratorFactory<R> for CountingFactory<G>
where
    R: GenerationRequest,
    G: Generator<R> + Default + 'static,
{
    async fn build(&self) -> Result<Arc<dyn Generator<R>>, GenerationError> {
        let n = self.builds.fetch_add(1, Ordering::Relaxed) + 1;
        info!(builds = n, "generator client constructed");
        Ok(Arc::new(G::default()))
    }
}

fn meta(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

async fn run_scenarios(
    bus: Arc<InMemoryBus>,
    config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = AppBuilder::new(config, bus.clone())
        .register::<QuestionGenerationRequest>(Arc::new(CountingFactory::<ScriptedQuestions>::new()))?
        .register::<LearningPathRequest>(Arc::new(CountingFactory::<ScriptedPaths>::new()))?
        .expect_types(&[
            EventType::QuestionGenerationRequest,
            EventType::LearningPathRequest,
        ])
        .build()?;

    let router = app.router();
    let correlator = Correlator::start(
        bus.clone(),
        &[
            router.topic(EventType::QuestionGenerationResponse),
            router.topic(EventType::LearningPathResponse),
        ],
        "courier-cli-correlator",
    )
    .await?;

    let service = app.start();
    service.wait_until_polling().await;
    for c in service.active_consumers() {
        println!("consumer: {} {} group={} state={:?}", c.id, c.topic, c.group_id, c.state);
    }

    let submitter = app.submitter();

    // (A) 正常系: 3 問を生成
    let a = submitter
        .submit(
            QuestionGenerationRequest::new("r1", "Loops")
                .with_num_questions(3)
                .with_difficulty(Difficulty::Easy),
            "user_456",
            meta(&[("trace", "demo-a")]),
        )
        .await?;
    println!("accepted: request_id={} topic={}", a.request_id, a.topic);

    // (B) 範囲外: 受付境界で拒否され、レスポンスは出ない
    match submitter
        .submit_json(
            EventType::QuestionGenerationRequest,
            json!({ "request_id": "r2", "num_questions": 500 }),
            "user_456",
            Metadata::new(),
        )
        .await
    {
        Err(SubmitError::Invalid(e)) => println!("rejected: request_id=r2 reason={e}"),
        Err(e) => return Err(e.into()),
        Ok(accepted) => warn!(request_id = %accepted.request_id, "out-of-range request was accepted"),
    }
    // 受付境界を通らずにバスへ直接入ってきた不正レコードも、ループ側で拒否される
    let garbage = serde_json::to_vec(&json!({
        "eventId": "not-a-ulid",
        "eventType": "question.generation.request",
        "eventData": { "request_id": "r2", "num_questions": 500 },
        "userId": "user_456",
        "metadata": { "request_id": "r2" }
    }))?;
    bus.publish(router.topic(EventType::QuestionGenerationRequest), "r2", garbage)
        .await?;

    // (C) generator の失敗は failed レスポンスになり、ループは止まらない
    let c = submitter
        .submit(QuestionGenerationRequest::new("r3", "Recursion"), "user_456", Metadata::new())
        .await?;
    let lp = submitter
        .submit(
            LearningPathRequest::new("lp-1", "user_456", "Learn Rust async"),
            "user_456",
            Metadata::new(),
        )
        .await?;

    for id in [&a.request_id, &c.request_id, &lp.request_id] {
        let envelope = correlator.wait_for(id, Duration::from_secs(5)).await?;
        match envelope.event_data() {
            EventData::QuestionGenerationResponse(resp) => {
                println!("response: request_id={} status={:?}", resp.request_id, resp.status());
                println!("  {}", serde_json::to_string(&resp.outcome)?);
            }
            EventData::LearningPathResponse(resp) => {
                println!("response: request_id={} status={:?}", resp.request_id, resp.status());
                println!("  {}", serde_json::to_string(&resp.outcome)?);
            }
            other => warn!(event_type = %other.event_type(), "unexpected response payload"),
        }
        println!("  metadata: {}", serde_json::to_string(envelope.metadata())?);
    }

    let r2 = RequestId::new("r2");
    if let Err(e) = correlator.wait_for(&r2, Duration::from_millis(500)).await {
        println!("no response for r2: {e}");
    }

    if let Some(stats) = service.stats(EventType::QuestionGenerationRequest) {
        println!("question consumer stats: {stats:?}");
    }
    if let Some(stats) = service.stats(EventType::LearningPathRequest) {
        println!("learning path consumer stats: {stats:?}");
    }

    service.shutdown_and_join().await;
    correlator.stop().await;
    Ok(())
}

/// `dir` の `.env.<COURIER_ENV>` と `.env` を読み込んで Config を組み立てる
///
/// 優先順位: 実際の環境変数 > `.env.<env>` > `.env`。ファイルが無ければ読み飛ばす。
fn load_config<F>(dir: &Path, lookup: F) -> Result<Config, Box<dyn Error>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut files = Vec::new();
    if let Some(env) = lookup("COURIER_ENV") {
        files.push(dir.join(format!(".env.{env}")));
    }
    files.push(dir.join(".env"));

    let mut from_files: HashMap<String, String> = HashMap::new();
    for path in files {
        let Ok(iter) = dotenvy::from_path_iter(&path) else {
            continue;
        };
        for item in iter {
            let (key, value) = item?;
            from_files.entry(key).or_insert(value);
        }
    }
    Ok(Config::from_lookup(|key| {
        lookup(key).or_else(|| from_files.get(key).cloned())
    })?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = load_config(Path::new("."), |key| std::env::var(key).ok())?;
    init_tracing(config.log_format);

    let bus = Arc::new(InMemoryBus::with_partitions(config.partitions));

    tokio::select! {
        result = run_scenarios(bus, config) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("courier-cli-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_env_files_fill_in_missing_settings() {
        let dir = scratch_dir("env-files");
        fs::write(
            dir.join(".env"),
            "COURIER_SERVICE_ID=from-dotenv\nCOURIER_PARTITIONS=7\nCOURIER_MAX_IN_FLIGHT=2\n",
        )
        .unwrap();
        fs::write(dir.join(".env.staging"), "COURIER_PARTITIONS=9\n").unwrap();

        let process: HashMap<&str, &str> =
            HashMap::from([("COURIER_ENV", "staging"), ("COURIER_MAX_IN_FLIGHT", "4")]);
        let config = load_config(&dir, |key| process.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.service_id, "from-dotenv");
        assert_eq!(config.partitions, 9);
        assert_eq!(config.max_in_flight, 4);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_missing_env_files_fall_back_to_defaults() {
        let dir = scratch_dir("no-env-files");
        let config = load_config(&dir, |_| None).unwrap();
        assert_eq!(config, Config::default());
        fs::remove_dir_all(dir).unwrap();
    }
}
