//! LazyGenerator - 初回利用時に構築されるコラボレーターハンドル
//!
//! # 学習ポイント
//! - `tokio::sync::OnceCell::get_or_try_init` による非同期の遅延初期化
//! - 構築失敗はキャッシュしない（次のリクエストで再試行される）
//! - ready() を通ったハンドルだけをキャッシュする

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::domain::GenerationError;
use crate::ports::generator::{Generator, GeneratorFactory};
use crate::typed::GenerationRequest;

/// Owned by exactly one handler instance.
pub struct LazyGenerator<R: GenerationRequest> {
    factory: Arc<dyn GeneratorFactory<R>>,
    cell: OnceCell<Arc<dyn Generator<R>>>,
}

impl<R: GenerationRequest> LazyGenerator<R> {
    pub fn new(factory: Arc<dyn GeneratorFactory<R>>) -> Self {
        Self {
            factory,
            cell: OnceCell::new(),
        }
    }

    /// Get the cached handle, constructing it on first use.
    ///
    /// Construction and readiness failures surface as `GenerationError::Init`.
    pub async fn get(&self) -> Result<Arc<dyn Generator<R>>, GenerationError> {
        let handle = self
            .cell
            .get_or_try_init(|| async {
                let generator = self.factory.build().await.map_err(into_init)?;
                generator.ready().await.map_err(into_init)?;
                info!(event_type = %R::EVENT_TYPE, "generator initialized");
                Ok::<_, GenerationError>(generator)
            })
            .await
            .inspect_err(|e| warn!(event_type = %R::EVENT_TYPE, error = %e, "generator initialization failed"))?;
        Ok(Arc::clone(handle))
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

fn into_init(err: GenerationError) -> GenerationError {
    match err {
        GenerationError::Init(_) => err,
        other => GenerationError::Init(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QuestionGenerationRequest;
    use crate::domain::QuestionSet;
    use crate::domain::question::fixtures::question_set;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed;

    #[async_trait]
    impl Generator<QuestionGenerationRequest> for Fixed {
        async fn generate(
            &self,
            request: &QuestionGenerationRequest,
        ) -> Result<QuestionSet, GenerationError> {
            Ok(question_set(&request.topic, request.num_questions))
        }
    }

    struct NotReady;

    #[async_trait]
    impl Generator<QuestionGenerationRequest> for NotReady {
        async fn generate(
            &self,
            _request: &QuestionGenerationRequest,
        ) -> Result<QuestionSet, GenerationError> {
            Err(GenerationError::Service("unreachable".into()))
        }

        async fn ready(&self) -> Result<(), GenerationError> {
            Err(GenerationError::Service("endpoint not warmed up".into()))
        }
    }

    /// Fails the first `failures` builds, then hands out `Fixed`.
    struct CountingFactory {
        builds: AtomicUsize,
        failures: usize,
        ready: bool,
    }

    #[async_trait]
    impl GeneratorFactory<QuestionGenerationRequest> for CountingFactory {
        async fn build(
            &self,
        ) -> Result<Arc<dyn Generator<QuestionGenerationRequest>>, GenerationError> {
            let n = self.builds.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(GenerationError::Init("missing credentials".into()));
            }
            if self.ready {
                Ok(Arc::new(Fixed))
            } else {
                Ok(Arc::new(NotReady))
            }
        }
    }

    fn factory(failures: usize, ready: bool) -> Arc<CountingFactory> {
        Arc::new(CountingFactory {
            builds: AtomicUsize::new(0),
            failures,
            ready,
        })
    }

    #[tokio::test]
    async fn test_builds_once_and_caches() {
        let f = factory(0, true);
        let lazy = LazyGenerator::<QuestionGenerationRequest>::new(f.clone());
        assert!(!lazy.is_initialized());

        lazy.get().await.unwrap();
        lazy.get().await.unwrap();

        assert!(lazy.is_initialized());
        assert_eq!(f.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_build_is_retried_on_next_use() {
        let f = factory(1, true);
        let lazy = LazyGenerator::<QuestionGenerationRequest>::new(f.clone());

        assert!(matches!(lazy.get().await, Err(GenerationError::Init(_))));
        assert!(!lazy.is_initialized());
        assert!(lazy.get().await.is_ok());
        assert_eq!(f.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_ready_handle_is_not_cached() {
        let lazy = LazyGenerator::<QuestionGenerationRequest>::new(factory(0, false));
        let err = lazy.get().await.err().unwrap();
        assert!(matches!(err, GenerationError::Init(msg) if msg.contains("not warmed up")));
        assert!(!lazy.is_initialized());
    }
}
