//! TopicRouter - 論理チャネル名から物理 topic / consumer group への対応

use std::collections::HashMap;

use crate::app::config::{Config, RouteConfig};
use crate::domain::EventType;

/// Resolves every event type to its physical topic, and every request type to
/// its consumer group.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    topics: HashMap<EventType, String>,
    groups: HashMap<EventType, String>,
}

impl TopicRouter {
    pub fn from_config(config: &Config) -> Self {
        let mut router = Self {
            topics: HashMap::new(),
            groups: HashMap::new(),
        };
        router.bind(EventType::LearningPathRequest, &config.learning_path);
        router.bind(EventType::QuestionGenerationRequest, &config.question);
        router
    }

    fn bind(&mut self, request: EventType, route: &RouteConfig) {
        self.topics.insert(request, route.request_topic.clone());
        if let Some(response) = request.response_type() {
            self.topics.insert(response, route.response_topic.clone());
        }
        self.groups.insert(request, route.group_id.clone());
    }

    /// Physical topic for `event_type`. Every event type is bound.
    pub fn topic(&self, event_type: EventType) -> &str {
        self.topics
            .get(&event_type)
            .map(String::as_str)
            .unwrap_or(event_type.as_str())
    }

    /// Consumer group for a request type. `None` for response types.
    pub fn group_id(&self, event_type: EventType) -> Option<&str> {
        self.groups.get(&event_type).map(String::as_str)
    }
}

impl Default for TopicRouter {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
