//! Generator port - 外部の生成コラボレーター
//!
//! 言語モデルの呼び出しそのものはこの層の外にあります。
//! ここでは `generate(request) -> artifact | error` という一つの呼び出しだけを定義し、
//! リトライもしません。

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::GenerationError;
use crate::typed::GenerationRequest;

#[async_trait]
pub trait Generator<R: GenerationRequest>: Send + Sync {
    async fn generate(&self, request: &R) -> Result<R::Artifact, GenerationError>;

    /// Readiness check run once after construction, before the first `generate`.
    async fn ready(&self) -> Result<(), GenerationError> {
        Ok(())
    }
}

/// Builds a generator handle on first use.
///
/// Construction may be expensive (client setup, credential lookup), so it is
/// deferred until the first request that needs it.
#[async_trait]
pub trait GeneratorFactory<R: GenerationRequest>: Send + Sync {
    async fn build(&self) -> Result<Arc<dyn Generator<R>>, GenerationError>;
}

/// Factory for a handle that already exists.
pub struct Prebuilt<R: GenerationRequest>(Arc<dyn Generator<R>>);

impl<R: GenerationRequest> Prebuilt<R> {
    pub fn new(generator: Arc<dyn Generator<R>>) -> Self {
        Self(generator)
    }
}

#[async_trait]
impl<R: GenerationRequest> GeneratorFactory<R> for Prebuilt<R> {
    async fn build(&self) -> Result<Arc<dyn Generator<R>>, GenerationError> {
        Ok(Arc::clone(&self.0))
    }
}
