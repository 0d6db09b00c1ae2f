//! EventType - エンベロープの型タグ
//!
//! 閉じた enum にして、スキーマ検証と dispatch の両方で網羅的に match できるようにします。
//! Wire では `{domain}.{...}.{request|response}` 形式の文字列です。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::SchemaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "learning_path.request")]
    LearningPathRequest,
    #[serde(rename = "learning_path.response")]
    LearningPathResponse,
    #[serde(rename = "question.generation.request")]
    QuestionGenerationRequest,
    #[serde(rename = "question.generation.response")]
    QuestionGenerationResponse,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::LearningPathRequest,
        EventType::LearningPathResponse,
        EventType::QuestionGenerationRequest,
        EventType::QuestionGenerationResponse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::LearningPathRequest => "learning_path.request",
            EventType::LearningPathResponse => "learning_path.response",
            EventType::QuestionGenerationRequest => "question.generation.request",
            EventType::QuestionGenerationResponse => "question.generation.response",
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(
            self,
            EventType::LearningPathRequest | EventType::QuestionGenerationRequest
        )
    }

    /// The response type paired with a request type.
    pub fn response_type(&self) -> Option<EventType> {
        match self {
            EventType::LearningPathRequest => Some(EventType::LearningPathResponse),
            EventType::QuestionGenerationRequest => Some(EventType::QuestionGenerationResponse),
            EventType::LearningPathResponse | EventType::QuestionGenerationResponse => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SchemaError::UnknownEventType(s.to_string()))
    }
}
