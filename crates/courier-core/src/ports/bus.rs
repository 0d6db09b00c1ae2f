//! MessageBus port - パーティション付きの永続ログ
//!
//! Kafka 風のバスを想定した抽象です。
//!
//! # 契約
//! - `publish` は同じ key を必ず同じ partition に送り、耐久的に受理されたら `Ack` を返す
//! - `Subscription::poll` は partition ごとに「未コミットの in-flight が無いときだけ」
//!   次のレコードを返す。これで partition 内の到着順処理が保証される
//! - `commit` するまで consumer group の進捗は進まない（at-least-once）
//! - `close` で未コミットの in-flight は解放され、次の poll で再配送される

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::BusError;

/// One record as read from a topic partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: String,
    pub payload: Vec<u8>,
}

/// Durable-receipt acknowledgment for a published record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub partition: u32,
    pub offset: u64,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Append `payload` to the partition selected by `key`.
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<Ack, BusError>;

    /// Join `group_id` on `topic`.
    async fn subscribe(&self, topic: &str, group_id: &str)
    -> Result<Arc<dyn Subscription>, BusError>;
}

/// A consumer-group membership on one topic.
///
/// Methods take `&self` so the dispatch loop can share the subscription with
/// the tasks that commit records once their handler returns.
#[async_trait]
pub trait Subscription: Send + Sync {
    fn topic(&self) -> &str;

    fn group_id(&self) -> &str;

    /// Fetch up to `max` records, at most one per idle partition.
    ///
    /// Waits up to `wait` for something to arrive; an empty vec means nothing did.
    async fn poll(&self, max: usize, wait: Duration) -> Result<Vec<BusRecord>, BusError>;

    /// Mark `record` as processed for this consumer group.
    async fn commit(&self, record: &BusRecord) -> Result<(), BusError>;

    /// Leave the group. Uncommitted records become available for redelivery.
    async fn close(&self);
}
