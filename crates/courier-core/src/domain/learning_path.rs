//! Learning path payloads (`learning_path.request` / `.response`).

use serde::{Deserialize, Serialize};

use super::errors::SchemaError;
use super::ids::RequestId;
use super::payload::{Metadata, ResponseStatus, Timestamps, require_non_blank, require_text};

pub const MAX_GOAL_CHARS: usize = 2_000;
pub const MAX_STEPS: u32 = 100;

fn default_current_level() -> String {
    "beginner".to_string()
}

fn default_available_time() -> String {
    "flexible".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPathRequest {
    pub request_id: RequestId,

    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub goal: String,

    #[serde(default = "default_current_level")]
    pub current_level: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Metadata>,

    #[serde(default = "default_available_time")]
    pub available_time: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl LearningPathRequest {
    pub fn new(
        request_id: impl Into<RequestId>,
        user_id: impl Into<String>,
        goal: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: user_id.into(),
            goal: goal.into(),
            current_level: default_current_level(),
            preferences: None,
            available_time: default_available_time(),
            metadata: None,
            timestamps: Timestamps::now(),
        }
    }

    pub fn with_current_level(mut self, level: impl Into<String>) -> Self {
        self.current_level = level.into();
        self
    }

    pub fn with_available_time(mut self, available_time: impl Into<String>) -> Self {
        self.available_time = available_time.into();
        self
    }

    pub fn with_preferences(mut self, preferences: Metadata) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        require_non_blank("request_id", self.request_id.as_str())?;
        require_non_blank("user_id", &self.user_id)?;
        require_text("goal", &self.goal, MAX_GOAL_CHARS)?;
        require_non_blank("current_level", &self.current_level)?;
        require_non_blank("available_time", &self.available_time)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStep {
    pub step_number: u32,
    pub title: String,
    pub description: String,
    pub estimated_duration: String,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

/// Artifact returned by the generation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPath {
    pub goal: String,
    pub difficulty_level: String,
    pub total_duration: String,
    pub steps: Vec<LearningStep>,
}

impl LearningPath {
    pub fn check(&self) -> Result<(), String> {
        if self.steps.is_empty() {
            return Err("learning path has no steps".to_string());
        }
        if self.steps.len() > MAX_STEPS as usize {
            return Err(format!(
                "learning path has {} steps (max {MAX_STEPS})",
                self.steps.len()
            ));
        }
        for (i, step) in self.steps.iter().enumerate() {
            let expected = i as u32 + 1;
            if step.step_number != expected {
                return Err(format!(
                    "step numbers must be sequential: expected {expected}, got {}",
                    step.step_number
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LearningPathOutcome {
    Completed {
        user_id: String,
        goal: String,
        learning_path: LearningPath,
        total_steps: u32,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPathResponse {
    pub request_id: RequestId,

    #[serde(flatten)]
    pub outcome: LearningPathOutcome,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl LearningPathResponse {
    pub fn completed(request: &LearningPathRequest, path: LearningPath) -> Self {
        let total_steps = path.steps.len() as u32;
        Self {
            request_id: request.request_id.clone(),
            outcome: LearningPathOutcome::Completed {
                user_id: request.user_id.clone(),
                goal: request.goal.clone(),
                learning_path: path,
                total_steps,
            },
            metadata: request.metadata.clone(),
            timestamps: Timestamps::now(),
        }
    }

    pub fn failed(request: &LearningPathRequest, error: impl Into<String>) -> Self {
        Self {
            request_id: request.request_id.clone(),
            outcome: LearningPathOutcome::Failed {
                error: error.into(),
            },
            metadata: request.metadata.clone(),
            timestamps: Timestamps::now(),
        }
    }

    pub fn status(&self) -> ResponseStatus {
        match self.outcome {
            LearningPathOutcome::Completed { .. } => ResponseStatus::Completed,
            LearningPathOutcome::Failed { .. } => ResponseStatus::Failed,
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        require_non_blank("request_id", self.request_id.as_str())?;
        match &self.outcome {
            LearningPathOutcome::Completed {
                user_id,
                goal,
                learning_path,
                total_steps,
            } => {
                require_non_blank("user_id", user_id)?;
                require_non_blank("goal", goal)?;
                if *total_steps as usize != learning_path.steps.len() {
                    return Err(SchemaError::OutOfBounds {
                        field: "total_steps",
                        min: learning_path.steps.len() as i64,
                        max: learning_path.steps.len() as i64,
                        actual: i64::from(*total_steps),
                    });
                }
                Ok(())
            }
            LearningPathOutcome::Failed { error } => require_non_blank("error", error),
        }
    }
}
