//! GenerationRequest - リクエスト型と成果物・レスポンス型の対応
//!
//! # 学習ポイント
//! - Associated types (`Artifact`, `Response`)
//! - `Schema` を supertrait にして event_type との対応を静的に保証

use crate::domain::{
    EventType, LearningPath, LearningPathRequest, LearningPathResponse, QuestionGenerationRequest,
    QuestionGenerationResponse, QuestionSet, Schema,
};

/// A request payload that the generation collaborator can fulfil.
pub trait GenerationRequest: Schema + Clone {
    /// What the collaborator returns on success.
    type Artifact: Send + Sync + 'static;

    /// The matching response payload.
    type Response: Schema;

    /// Response event type. Always `Self::Response::EVENT_TYPE`.
    fn response_type() -> EventType {
        <Self::Response as Schema>::EVENT_TYPE
    }

    /// Reject collaborator output that cannot go into a `completed` response.
    fn check_artifact(&self, artifact: &Self::Artifact) -> Result<(), String>;

    fn completed(&self, artifact: Self::Artifact) -> Self::Response;

    fn failed(&self, error: &str) -> Self::Response;
}

impl GenerationRequest for QuestionGenerationRequest {
    type Artifact = QuestionSet;
    type Response = QuestionGenerationResponse;

    fn check_artifact(&self, artifact: &QuestionSet) -> Result<(), String> {
        artifact.check()
    }

    fn completed(&self, artifact: QuestionSet) -> QuestionGenerationResponse {
        QuestionGenerationResponse::completed(self, artifact)
    }

    fn failed(&self, error: &str) -> QuestionGenerationResponse {
        QuestionGenerationResponse::failed(self, error)
    }
}

impl GenerationRequest for LearningPathRequest {
    type Artifact = LearningPath;
    type Response = LearningPathResponse;

    fn check_artifact(&self, artifact: &LearningPath) -> Result<(), String> {
        artifact.check()
    }

    fn completed(&self, artifact: LearningPath) -> LearningPathResponse {
        LearningPathResponse::completed(self, artifact)
    }

    fn failed(&self, error: &str) -> LearningPathResponse {
        LearningPathResponse::failed(self, error)
    }
}
