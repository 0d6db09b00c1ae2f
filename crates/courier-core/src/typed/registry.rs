//! HandlerRegistry - event_type ごとの handler の登録と管理
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Arc による共有所有権（dispatch ループと service で共有）

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::DynHandler;
use crate::domain::EventType;

/// RegistryError は HandlerRegistry の操作エラー
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("handler for event type '{0}' is already registered")]
    AlreadyRegistered(EventType),

    #[error("'{0}' is not a request type; only request types can have handlers")]
    NotARequestType(EventType),
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventType, Arc<dyn DynHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn DynHandler>) -> Result<(), RegistryError> {
        let event_type = handler.event_type();
        if !event_type.is_request() {
            return Err(RegistryError::NotARequestType(event_type));
        }
        if self.handlers.contains_key(&event_type) {
            return Err(RegistryError::AlreadyRegistered(event_type));
        }
        self.handlers.insert(event_type, handler);
        Ok(())
    }

    pub fn get(&self, event_type: EventType) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(&event_type).cloned()
    }

    /// Registered event types in a stable order.
    pub fn registered_types(&self) -> Vec<EventType> {
        let mut types: Vec<EventType> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
