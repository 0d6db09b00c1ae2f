//! Ledger port - 冪等性の記録
//!
//! `(event_type, request_id)` ごとに「終端レスポンスを publish 済みか」を記録します。
//! 再配送されたレコードはここで検出され、二度目の副作用は起きません。

use async_trait::async_trait;

use crate::domain::{EventType, RequestId};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Whether a terminal response for this request was already published.
    async fn is_done(&self, event_type: EventType, request_id: &RequestId)
    -> Result<bool, LedgerError>;

    /// Record that the terminal response was published. Idempotent.
    async fn mark_done(&self, event_type: EventType, request_id: &RequestId)
    -> Result<(), LedgerError>;
}
