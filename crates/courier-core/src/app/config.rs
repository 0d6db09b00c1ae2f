//! Config - 環境変数からの設定
//!
//! すべての値にデフォルトがあり、`COURIER_*` で上書きできます。
//! テストでは `from_lookup` にクロージャを渡してプロセス環境に触れずに済ませます。

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::observability::LogFormat;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Topic/group binding for one request type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    pub request_topic: String,
    pub response_topic: String,
    pub group_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `userId` on every response envelope and `metadata.source`.
    pub service_id: String,
    pub learning_path: RouteConfig,
    pub question: RouteConfig,
    pub partitions: u32,
    pub max_in_flight: usize,
    pub poll_interval: Duration,
    pub generation_timeout: Duration,
    pub shutdown_grace: Duration,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_id: "ai-service".to_string(),
            learning_path: RouteConfig {
                request_topic: "learning_path.request".to_string(),
                response_topic: "learning_path.response".to_string(),
                group_id: "ai-service-learning-path-consumer".to_string(),
            },
            question: RouteConfig {
                request_topic: "question.generation.request".to_string(),
                response_topic: "question.generation.response".to_string(),
                group_id: "ai-service-question-generator-consumer".to_string(),
            },
            partitions: 3,
            max_in_flight: 16,
            poll_interval: Duration::from_millis(500),
            generation_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(30),
            log_format: LogFormat::Console,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let text = |key: &'static str, default: String| -> Result<String, ConfigError> {
            match lookup(key) {
                None => Ok(default),
                Some(v) if v.trim().is_empty() => Err(ConfigError::Empty(key)),
                Some(v) => Ok(v.trim().to_string()),
            }
        };

        let partitions: u32 = parse(&lookup, "COURIER_PARTITIONS", "a positive integer", d.partitions)?;
        if partitions == 0 {
            return Err(ConfigError::Invalid {
                key: "COURIER_PARTITIONS",
                expected: "a positive integer",
                value: "0".to_string(),
            });
        }
        let max_in_flight: usize =
            parse(&lookup, "COURIER_MAX_IN_FLIGHT", "a positive integer", d.max_in_flight)?;
        if max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                key: "COURIER_MAX_IN_FLIGHT",
                expected: "a positive integer",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            service_id: text("COURIER_SERVICE_ID", d.service_id)?,
            learning_path: RouteConfig {
                request_topic: text(
                    "COURIER_LEARNING_PATH_REQUEST_TOPIC",
                    d.learning_path.request_topic,
                )?,
                response_topic: text(
                    "COURIER_LEARNING_PATH_RESPONSE_TOPIC",
                    d.learning_path.response_topic,
                )?,
                group_id: text("COURIER_LEARNING_PATH_GROUP_ID", d.learning_path.group_id)?,
            },
            question: RouteConfig {
                request_topic: text("COURIER_QUESTION_REQUEST_TOPIC", d.question.request_topic)?,
                response_topic: text("COURIER_QUESTION_RESPONSE_TOPIC", d.question.response_topic)?,
                group_id: text("COURIER_QUESTION_GROUP_ID", d.question.group_id)?,
            },
            partitions,
            max_in_flight,
            poll_interval: Duration::from_millis(parse(
                &lookup,
                "COURIER_POLL_INTERVAL_MS",
                "milliseconds",
                d.poll_interval.as_millis() as u64,
            )?),
            generation_timeout: Duration::from_secs(parse(
                &lookup,
                "COURIER_GENERATION_TIMEOUT_SECS",
                "seconds",
                d.generation_timeout.as_secs(),
            )?),
            shutdown_grace: Duration::from_secs(parse(
                &lookup,
                "COURIER_SHUTDOWN_GRACE_SECS",
                "seconds",
                d.shutdown_grace.as_secs(),
            )?),
            log_format: parse(&lookup, "COURIER_LOG_FORMAT", "console or json", d.log_format)?,
        })
    }
}

fn parse<F, T>(
    lookup: &F,
    key: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value: raw,
        }),
    }
}
