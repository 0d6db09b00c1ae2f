//! InMemoryLedger - プロセス内の冪等性台帳

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{EventType, RequestId};
use crate::ports::ledger::{Ledger, LedgerError};

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    done: Mutex<HashSet<(EventType, RequestId)>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.done.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.done.lock().await.is_empty()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn is_done(
        &self,
        event_type: EventType,
        request_id: &RequestId,
    ) -> Result<bool, LedgerError> {
        let done = self.done.lock().await;
        Ok(done.contains(&(event_type, request_id.clone())))
    }

    async fn mark_done(
        &self,
        event_type: EventType,
        request_id: &RequestId,
    ) -> Result<(), LedgerError> {
        self.done.lock().await.insert((event_type, request_id.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_then_is_done() {
        let ledger = InMemoryLedger::new();
        let id = RequestId::new("r1");
        assert!(!ledger.is_done(EventType::QuestionGenerationRequest, &id).await.unwrap());

        ledger.mark_done(EventType::QuestionGenerationRequest, &id).await.unwrap();
        ledger.mark_done(EventType::QuestionGenerationRequest, &id).await.unwrap();

        assert!(ledger.is_done(EventType::QuestionGenerationRequest, &id).await.unwrap());
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_keys_are_scoped_by_event_type() {
        let ledger = InMemoryLedger::new();
        let id = RequestId::new("r1");
        ledger.mark_done(EventType::LearningPathRequest, &id).await.unwrap();
        assert!(!ledger.is_done(EventType::QuestionGenerationRequest, &id).await.unwrap());
    }
}
