//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;

use tracing::info;

use crate::app::config::Config;
use crate::app::consumer::{ConsumerHandle, ConsumerSettings};
use crate::app::dispatch::Dispatcher;
use crate::app::envelope_factory::EnvelopeFactory;
use crate::app::producer::Producer;
use crate::app::router::TopicRouter;
use crate::app::service::ServiceHandle;
use crate::app::submit::Submitter;
use crate::domain::EventType;
use crate::impls::InMemoryLedger;
use crate::observability::ConsumerStats;
use crate::ports::generator::GeneratorFactory;
use crate::ports::{Clock, IdGenerator, Ledger, MessageBus, SystemClock, UlidGenerator};
use crate::typed::{
    DynHandler, GenerationRequest, HandlerContext, HandlerRegistry, RegistryError, RequestHandler,
};

type HandlerCtor = Box<dyn FnOnce(HandlerContext) -> Arc<dyn DynHandler> + Send>;

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(config, bus)
///     .register::<QuestionGenerationRequest>(question_factory)?
///     .expect_types(&[EventType::QuestionGenerationRequest])
///     .build()?;
/// let service = app.start();
/// ```
///
/// # Fail-fast 設計
/// - expect_types() で期待される request type を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
pub struct AppBuilder {
    config: Config,
    bus: Arc<dyn MessageBus>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    handlers: Vec<(EventType, HandlerCtor)>,
    expected_types: Option<Vec<EventType>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing handlers for {0:?}; these request types were expected but not registered")]
    MissingEventTypes(Vec<EventType>),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl AppBuilder {
    pub fn new(config: Config, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            config,
            bus,
            ledger: Arc::new(InMemoryLedger::new()),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            handlers: Vec::new(),
            expected_types: None,
        }
    }

    pub fn ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Register the handler for request type `R`, backed by a generator built on first use.
    pub fn register<R: GenerationRequest>(
        mut self,
        factory: Arc<dyn GeneratorFactory<R>>,
    ) -> Result<Self, RegistryError> {
        if self.handlers.iter().any(|(t, _)| *t == R::EVENT_TYPE) {
            return Err(RegistryError::AlreadyRegistered(R::EVENT_TYPE));
        }
        let ctor: HandlerCtor = Box::new(move |ctx: HandlerContext| -> Arc<dyn DynHandler> {
            Arc::new(RequestHandler::<R>::new(ctx, factory))
        });
        self.handlers.push((R::EVENT_TYPE, ctor));
        Ok(self)
    }

    /// 期待される request type のリストを設定
    pub fn expect_types(mut self, event_types: &[EventType]) -> Self {
        self.expected_types = Some(event_types.to_vec());
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        if let Some(expected) = &self.expected_types {
            let missing: Vec<EventType> = expected
                .iter()
                .filter(|t| !self.handlers.iter().any(|(r, _)| r == *t))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingEventTypes(missing));
            }
        }

        let router = Arc::new(TopicRouter::from_config(&self.config));
        let producer = Producer::new(Arc::clone(&self.bus));
        let envelopes = Arc::new(EnvelopeFactory::new(
            Arc::clone(&self.clock),
            Arc::clone(&self.ids),
        ));
        let ctx = HandlerContext {
            producer: producer.clone(),
            envelopes: Arc::clone(&envelopes),
            ledger: self.ledger,
            router: Arc::clone(&router),
            service_id: self.config.service_id.clone(),
            generation_timeout: self.config.generation_timeout,
        };

        let mut registry = HandlerRegistry::new();
        for (_, ctor) in self.handlers {
            registry.register(ctor(ctx.clone()))?;
        }

        Ok(App {
            config: self.config,
            bus: self.bus,
            ids: self.ids,
            registry: Arc::new(registry),
            router,
            producer,
            envelopes,
        })
    }
}

/// App は組み立て済みのサービス
///
/// `start()` で request type ごとに 1 つのディスパッチループを起動します。
pub struct App {
    config: Config,
    bus: Arc<dyn MessageBus>,
    ids: Arc<dyn IdGenerator>,
    registry: Arc<HandlerRegistry>,
    router: Arc<TopicRouter>,
    producer: Producer,
    envelopes: Arc<EnvelopeFactory>,
}

impl App {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    pub fn registered_types(&self) -> Vec<EventType> {
        self.registry.registered_types()
    }

    /// Synchronous submission boundary for callers of this service.
    pub fn submitter(&self) -> Submitter {
        Submitter::new(
            self.producer.clone(),
            Arc::clone(&self.envelopes),
            Arc::clone(&self.router),
        )
    }

    /// Spawn one consumer per registered request type.
    pub fn start(&self) -> ServiceHandle {
        let mut consumers = Vec::new();
        for event_type in self.registry.registered_types() {
            let Some(group_id) = self.router.group_id(event_type) else {
                continue;
            };
            let settings = ConsumerSettings {
                topic: self.router.topic(event_type).to_string(),
                group_id: group_id.to_string(),
                max_in_flight: self.config.max_in_flight,
                poll_interval: self.config.poll_interval,
                shutdown_grace: self.config.shutdown_grace,
            };
            let dispatcher = Dispatcher::new(
                Arc::clone(&self.registry),
                Arc::new(ConsumerStats::new()),
            );
            let handle = ConsumerHandle::spawn(
                self.ids.generate_consumer_id(),
                Arc::clone(&self.bus),
                dispatcher,
                settings,
            );
            consumers.push((event_type, handle));
        }
        info!(
            service_id = %self.config.service_id,
            consumers = consumers.len(),
            "service started"
        );
        ServiceHandle::new(consumers)
    }
}
