//! Question generation payloads (`question.generation.request` / `.response`).

use serde::{Deserialize, Serialize};

use super::errors::SchemaError;
use super::ids::RequestId;
use super::payload::{
    Difficulty, Metadata, ResponseStatus, Timestamps, require_in_range, require_non_blank,
    require_text,
};

pub const MIN_QUESTIONS: u32 = 1;
pub const MAX_QUESTIONS: u32 = 50;
pub const DEFAULT_QUESTIONS: u32 = 5;
pub const MAX_TOPIC_CHARS: usize = 500;

fn default_num_questions() -> u32 {
    DEFAULT_QUESTIONS
}

fn default_question_types() -> Vec<String> {
    vec!["multiple_choice".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionGenerationRequest {
    pub request_id: RequestId,

    /// Missing and blank topics are both reported by `validate` as an empty field.
    #[serde(default)]
    pub topic: String,

    #[serde(default = "default_num_questions")]
    pub num_questions: u32,

    #[serde(default = "default_question_types")]
    pub question_types: Vec<String>,

    #[serde(default)]
    pub difficulty: Difficulty,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl QuestionGenerationRequest {
    pub fn new(request_id: impl Into<RequestId>, topic: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            topic: topic.into(),
            num_questions: DEFAULT_QUESTIONS,
            question_types: default_question_types(),
            difficulty: Difficulty::default(),
            content_id: None,
            user_id: None,
            metadata: None,
            timestamps: Timestamps::now(),
        }
    }

    pub fn with_num_questions(mut self, n: u32) -> Self {
        self.num_questions = n;
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_question_types(mut self, types: Vec<String>) -> Self {
        self.question_types = types;
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        require_non_blank("request_id", self.request_id.as_str())?;
        require_in_range(
            "num_questions",
            i64::from(self.num_questions),
            i64::from(MIN_QUESTIONS),
            i64::from(MAX_QUESTIONS),
        )?;
        require_text("topic", &self.topic, MAX_TOPIC_CHARS)?;
        if self.question_types.is_empty() {
            return Err(SchemaError::EmptyField("question_types"));
        }
        for t in &self.question_types {
            require_non_blank("question_types", t)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub option_id: String,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: u32,
    pub question_type: String,
    pub question_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<QuestionOption>>,
    pub correct_answer: String,
    pub explanation: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub concepts: Vec<String>,
}

/// Artifact returned by the generation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub topic: String,
    pub total_questions: u32,
    pub questions: Vec<Question>,
}

impl QuestionSet {
    /// Checks the generated set before it is embedded in a `completed` response.
    pub fn check(&self) -> Result<(), String> {
        if self.questions.is_empty() {
            return Err("question set is empty".to_string());
        }
        if self.total_questions as usize != self.questions.len() {
            return Err(format!(
                "total_questions={} but {} questions were returned",
                self.total_questions,
                self.questions.len()
            ));
        }
        if let Some(q) = self.questions.iter().find(|q| q.question_text.trim().is_empty()) {
            return Err(format!("question {} has no text", q.question_id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QuestionOutcome {
    Completed {
        topic: String,
        total_questions: u32,
        questions: Vec<Question>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionGenerationResponse {
    pub request_id: RequestId,

    #[serde(flatten)]
    pub outcome: QuestionOutcome,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl QuestionGenerationResponse {
    /// `total_questions` is derived from the set, not trusted from the collaborator.
    pub fn completed(request: &QuestionGenerationRequest, set: QuestionSet) -> Self {
        let total_questions = set.questions.len() as u32;
        Self {
            request_id: request.request_id.clone(),
            outcome: QuestionOutcome::Completed {
                topic: set.topic,
                total_questions,
                questions: set.questions,
                content_id: request.content_id.clone(),
                user_id: request.user_id.clone(),
            },
            metadata: request.metadata.clone(),
            timestamps: Timestamps::now(),
        }
    }

    pub fn failed(request: &QuestionGenerationRequest, error: impl Into<String>) -> Self {
        Self {
            request_id: request.request_id.clone(),
            outcome: QuestionOutcome::Failed {
                error: error.into(),
            },
            metadata: request.metadata.clone(),
            timestamps: Timestamps::now(),
        }
    }

    pub fn status(&self) -> ResponseStatus {
        match self.outcome {
            QuestionOutcome::Completed { .. } => ResponseStatus::Completed,
            QuestionOutcome::Failed { .. } => ResponseStatus::Failed,
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        require_non_blank("request_id", self.request_id.as_str())?;
        match &self.outcome {
            QuestionOutcome::Completed {
                total_questions,
                questions,
                ..
            } => {
                require_in_range(
                    "total_questions",
                    i64::from(*total_questions),
                    i64::from(MIN_QUESTIONS),
                    i64::from(MAX_QUESTIONS),
                )?;
                if *total_questions as usize != questions.len() {
                    return Err(SchemaError::OutOfBounds {
                        field: "total_questions",
                        min: questions.len() as i64,
                        max: questions.len() as i64,
                        actual: i64::from(*total_questions),
                    });
                }
                Ok(())
            }
            QuestionOutcome::Failed { error } => require_non_blank("error", error),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn question(id: u32) -> Question {
        Question {
            question_id: id,
            question_type: "multiple_choice".to_string(),
            question_text: format!("What does loop {id} print?"),
            options: Some(vec![
                QuestionOption {
                    option_id: "A".to_string(),
                    text: "0".to_string(),
                    is_correct: true,
                },
                QuestionOption {
                    option_id: "B".to_string(),
                    text: "1".to_string(),
                    is_correct: false,
                },
            ]),
            correct_answer: "A".to_string(),
            explanation: "The loop body never runs.".to_string(),
            difficulty: Difficulty::Easy,
            concepts: vec!["loops".to_string()],
        }
    }

    pub fn question_set(topic: &str, n: u32) -> QuestionSet {
        QuestionSet {
            topic: topic.to_string(),
            total_questions: n,
            questions: (1..=n).map(question).collect(),
        }
    }
}
