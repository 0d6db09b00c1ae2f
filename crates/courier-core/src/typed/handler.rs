//! Handler - リクエスト 1 件を処理してレスポンスを publish する
//!
//! # 学習ポイント
//! - ジェネリックな `RequestHandler<R>` と object-safe な `DynHandler`
//! - Type erasure パターン (`RequestHandler<R>` → `Arc<dyn DynHandler>`)
//!
//! # 処理の流れ
//! 1. 型付きペイロードを取り出して再検証
//! 2. 冪等性台帳で再配送を検出
//! 3. コラボレーターを呼ぶ（タイムアウト付き）
//! 4. 成功なら `completed`、失敗なら `failed` を組み立てる
//! 5. 対応する response topic に publish し、台帳に記録する
//!
//! コラボレーターの失敗は `failed` レスポンスになり、handler の外には出ません。
//! 外に出るのは publish 失敗などインフラ側のエラーだけです。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::app::envelope_factory::EnvelopeFactory;
use crate::app::producer::Producer;
use crate::app::router::TopicRouter;
use crate::domain::{
    Envelope, EventType, GenerationError, HandlerError, Metadata, REQUEST_ID_KEY, ResponseStatus,
    Schema,
};
use crate::ports::generator::GeneratorFactory;
use crate::ports::{Ack, Ledger};
use crate::typed::GenerationRequest;
use crate::typed::lazy::LazyGenerator;

/// Metadata key naming the service that produced a response.
pub const SOURCE_KEY: &str = "source";

/// Metadata flag set on `failed` responses.
pub const ERROR_KEY: &str = "error";

/// What a handler did with one request.
#[derive(Debug, Clone)]
pub enum Handled {
    /// A terminal response was published.
    Responded {
        status: ResponseStatus,
        response: Envelope,
        ack: Ack,
    },
    /// Redelivery of a request that already has a published response.
    Duplicate,
}

/// DynHandler は object-safe な handler の抽象化
///
/// `HashMap<EventType, Arc<dyn DynHandler>>` に格納するための型です。
#[async_trait]
pub trait DynHandler: Send + Sync {
    /// The request type this handler accepts.
    fn event_type(&self) -> EventType;

    async fn handle(&self, envelope: Envelope) -> Result<Handled, HandlerError>;
}

/// Collaborators shared by every handler of one service.
#[derive(Clone)]
pub struct HandlerContext {
    pub producer: Producer,
    pub envelopes: Arc<EnvelopeFactory>,
    pub ledger: Arc<dyn Ledger>,
    pub router: Arc<TopicRouter>,
    /// Origin id of response envelopes.
    pub service_id: String,
    pub generation_timeout: Duration,
}

/// Handler for one request type. Owns its lazily constructed generator.
pub struct RequestHandler<R: GenerationRequest> {
    ctx: HandlerContext,
    generator: LazyGenerator<R>,
}

impl<R: GenerationRequest> RequestHandler<R> {
    pub fn new(ctx: HandlerContext, factory: Arc<dyn GeneratorFactory<R>>) -> Self {
        Self {
            ctx,
            generator: LazyGenerator::new(factory),
        }
    }

    pub fn generator_initialized(&self) -> bool {
        self.generator.is_initialized()
    }

    async fn generate(&self, request: &R) -> Result<R::Artifact, GenerationError> {
        let generator = self.generator.get().await?;
        let timeout = self.ctx.generation_timeout;
        let artifact = tokio::time::timeout(timeout, generator.generate(request))
            .await
            .map_err(|_| GenerationError::Timeout(timeout))??;
        request
            .check_artifact(&artifact)
            .map_err(GenerationError::InvalidOutput)?;
        Ok(artifact)
    }

    /// `completed` when the artifact fits the response schema, `failed` otherwise.
    fn respond(&self, request: &R, generated: Result<R::Artifact, GenerationError>) -> (ResponseStatus, R::Response) {
        let error = match generated {
            Ok(artifact) => {
                let response = request.completed(artifact);
                match Schema::validate(&response) {
                    Ok(()) => return (ResponseStatus::Completed, response),
                    Err(e) => GenerationError::InvalidOutput(e.to_string()),
                }
            }
            Err(e) => e,
        };
        warn!(
            request_id = %request.request_id(),
            event_type = %R::EVENT_TYPE,
            error = %error,
            kind = ?error.kind(),
            "generation failed"
        );
        (ResponseStatus::Failed, request.failed(&error.to_string()))
    }

    fn response_metadata(&self, inbound: &Metadata, request: &R, status: ResponseStatus) -> Metadata {
        let mut metadata = inbound.clone();
        metadata.insert(
            SOURCE_KEY.to_string(),
            Value::String(self.ctx.service_id.clone()),
        );
        metadata.insert(
            REQUEST_ID_KEY.to_string(),
            Value::String(request.request_id().to_string()),
        );
        if status == ResponseStatus::Failed {
            metadata.insert(ERROR_KEY.to_string(), Value::Bool(true));
        }
        metadata
    }
}

#[async_trait]
impl<R: GenerationRequest> DynHandler for RequestHandler<R> {
    fn event_type(&self) -> EventType {
        R::EVENT_TYPE
    }

    async fn handle(&self, envelope: Envelope) -> Result<Handled, HandlerError> {
        let inbound_metadata = envelope.metadata().clone();
        let request = R::from_event_data(envelope.into_event_data())?;
        Schema::validate(&request)?;
        let request_id = request.request_id().clone();

        if self
            .ctx
            .ledger
            .is_done(R::EVENT_TYPE, &request_id)
            .await
            .map_err(|e| HandlerError::Ledger(e.to_string()))?
        {
            debug!(request_id = %request_id, event_type = %R::EVENT_TYPE, "already answered");
            return Ok(Handled::Duplicate);
        }

        let generated = self.generate(&request).await;
        let (status, payload) = self.respond(&request, generated);

        let metadata = self.response_metadata(&inbound_metadata, &request, status);
        let response = self
            .ctx
            .envelopes
            .build(payload, self.ctx.service_id.clone(), metadata)?;

        let topic = self.ctx.router.topic(R::response_type());
        let ack = self
            .ctx
            .producer
            .publish(topic, &response)
            .await
            .map_err(|source| HandlerError::Publish {
                topic: topic.to_string(),
                source,
            })?;

        if let Err(e) = self.ctx.ledger.mark_done(R::EVENT_TYPE, &request_id).await {
            // publish は済んでいる。再配送時に重複レスポンスが出うるだけ
            warn!(request_id = %request_id, error = %e, "ledger mark failed after publish");
        }

        info!(
            request_id = %request_id,
            event_type = %R::EVENT_TYPE,
            status = status.as_str(),
            topic,
            "response published"
        );
        Ok(Handled::Responded {
            status,
            response,
            ack,
        })
    }
}
