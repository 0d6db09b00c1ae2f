//! InMemoryBus - 開発・テスト用のパーティション付きバス
//!
//! # 実装詳細
//! - topic ごとに固定数の partition（append-only の Vec）
//! - key → partition は FNV-1a ハッシュで決定的に割り当て
//! - consumer group ごとに committed offset と in-flight を保持
//! - partition は `p % members.len()` で group のメンバーに割り当て
//! - tokio の Mutex + Notify（ロックを跨いで await しない）
//!
//! topic は publish / subscribe の初回で自動作成されます。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use crate::domain::BusError;
use crate::ports::bus::{Ack, BusRecord, MessageBus, Subscription};

pub const DEFAULT_PARTITIONS: u32 = 3;

#[derive(Debug, Clone)]
struct StoredRecord {
    key: String,
    payload: Vec<u8>,
}

#[derive(Debug)]
struct GroupState {
    /// Next offset to deliver, per partition.
    committed: Vec<u64>,
    /// Member currently holding the record at `committed[p]`.
    in_flight: Vec<Option<u64>>,
    members: Vec<u64>,
}

impl GroupState {
    fn new(partitions: usize) -> Self {
        Self {
            committed: vec![0; partitions],
            in_flight: vec![None; partitions],
            members: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct TopicState {
    partitions: Vec<Vec<StoredRecord>>,
    groups: HashMap<String, GroupState>,
}

impl TopicState {
    fn new(partitions: u32) -> Self {
        Self {
            partitions: vec![Vec::new(); partitions as usize],
            groups: HashMap::new(),
        }
    }

    /// Claim the next record of every idle partition assigned to `member`.
    fn claim(
        &mut self,
        topic: &str,
        group_id: &str,
        member: u64,
        max: usize,
    ) -> Result<Vec<BusRecord>, BusError> {
        let group = self.groups.get_mut(group_id).ok_or(BusError::Closed)?;
        let index = group
            .members
            .iter()
            .position(|m| *m == member)
            .ok_or(BusError::Closed)?;
        let members = group.members.len();

        let mut out = Vec::new();
        for (p, log) in self.partitions.iter().enumerate() {
            if out.len() >= max {
                break;
            }
            if p % members != index || group.in_flight[p].is_some() {
                continue;
            }
            let offset = group.committed[p];
            if let Some(stored) = log.get(offset as usize) {
                group.in_flight[p] = Some(member);
                out.push(BusRecord {
                    topic: topic.to_string(),
                    partition: p as u32,
                    offset,
                    key: stored.key.clone(),
                    payload: stored.payload.clone(),
                });
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Default)]
struct BusState {
    topics: HashMap<String, TopicState>,
    next_member: u64,
    /// Topics whose publishes fail (fault injection).
    outages: HashSet<String>,
}

/// InMemoryBus は開発用のメッセージバス
///
/// # 使用例
/// ```ignore
/// let bus = InMemoryBus::with_partitions(3);
/// let sub = bus.subscribe("question.generation.request", "ai-service").await?;
/// bus.publish("question.generation.request", "r1", bytes).await?;
/// let records = sub.poll(16, Duration::from_millis(500)).await?;
/// for r in &records { sub.commit(r).await?; }
/// ```
pub struct InMemoryBus {
    state: Arc<Mutex<BusState>>,
    notify: Arc<Notify>,
    partitions: u32,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(partitions: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            notify: Arc::new(Notify::new()),
            partitions: partitions.max(1),
        }
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    /// Partition a key lands on.
    pub fn partition_for(&self, key: &str) -> u32 {
        (fnv1a(key.as_bytes()) % u64::from(self.partitions)) as u32
    }

    /// Make every publish to `topic` fail until `restore` is called.
    pub async fn fail_publishes(&self, topic: &str) {
        self.state.lock().await.outages.insert(topic.to_string());
    }

    pub async fn restore(&self, topic: &str) {
        self.state.lock().await.outages.remove(topic);
    }

    /// Every record of `topic`, ordered by partition then offset.
    pub async fn records(&self, topic: &str) -> Vec<BusRecord> {
        let state = self.state.lock().await;
        let Some(t) = state.topics.get(topic) else {
            return Vec::new();
        };
        t.partitions
            .iter()
            .enumerate()
            .flat_map(|(p, log)| {
                log.iter().enumerate().map(move |(offset, stored)| BusRecord {
                    topic: topic.to_string(),
                    partition: p as u32,
                    offset: offset as u64,
                    key: stored.key.clone(),
                    payload: stored.payload.clone(),
                })
            })
            .collect()
    }

    /// Committed offsets of `group_id` on `topic`, one per partition.
    pub async fn committed(&self, topic: &str, group_id: &str) -> Vec<u64> {
        let state = self.state.lock().await;
        state
            .topics
            .get(topic)
            .and_then(|t| t.groups.get(group_id))
            .map(|g| g.committed.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<Ack, BusError> {
        let partition = self.partition_for(key);
        let ack = {
            let mut state = self.state.lock().await;
            if state.outages.contains(topic) {
                return Err(BusError::Unavailable(format!(
                    "topic '{topic}' is not accepting writes"
                )));
            }
            let partitions = self.partitions;
            let t = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicState::new(partitions));
            let log = &mut t.partitions[partition as usize];
            log.push(StoredRecord {
                key: key.to_string(),
                payload,
            });
            Ack {
                partition,
                offset: (log.len() - 1) as u64,
            }
        };
        self.notify.notify_waiters();
        Ok(ack)
    }

    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<Arc<dyn Subscription>, BusError> {
        let member = {
            let mut state = self.state.lock().await;
            let member = state.next_member;
            state.next_member += 1;
            let partitions = self.partitions;
            let t = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicState::new(partitions));
            t.groups
                .entry(group_id.to_string())
                .or_insert_with(|| GroupState::new(partitions as usize))
                .members
                .push(member);
            member
        };
        debug!(topic, group_id, member, "joined consumer group");
        // 割り当てが変わるので待機中のメンバーを起こす
        self.notify.notify_waiters();

        Ok(Arc::new(InMemorySubscription {
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            member,
            closed: AtomicBool::new(false),
            state: Arc::clone(&self.state),
            notify: Arc::clone(&self.notify),
        }))
    }
}

struct InMemorySubscription {
    topic: String,
    group_id: String,
    member: u64,
    closed: AtomicBool,
    state: Arc<Mutex<BusState>>,
    notify: Arc<Notify>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn group_id(&self) -> &str {
        &self.group_id
    }

    async fn poll(&self, max: usize, wait: Duration) -> Result<Vec<BusRecord>, BusError> {
        let deadline = Instant::now() + wait;
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(BusError::Closed);
            }

            // 先に通知を登録してから状態を見る（取りこぼし防止）
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                let t = state.topics.get_mut(&self.topic).ok_or(BusError::Closed)?;
                let records = t.claim(&self.topic, &self.group_id, self.member, max)?;
                if !records.is_empty() || max == 0 {
                    return Ok(records);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn commit(&self, record: &BusRecord) -> Result<(), BusError> {
        {
            let mut state = self.state.lock().await;
            let group = state
                .topics
                .get_mut(&self.topic)
                .and_then(|t| t.groups.get_mut(&self.group_id))
                .ok_or(BusError::Closed)?;
            let p = record.partition as usize;
            if p >= group.committed.len() {
                return Err(BusError::Unavailable(format!(
                    "partition {} does not exist on '{}'",
                    record.partition, self.topic
                )));
            }
            if group.in_flight[p] != Some(self.member) || group.committed[p] != record.offset {
                // close 後の commit や二重 commit。進捗は動かさない
                debug!(
                    topic = %self.topic,
                    partition = record.partition,
                    offset = record.offset,
                    "ignoring stale commit"
                );
                return Ok(());
            }
            group.committed[p] += 1;
            group.in_flight[p] = None;
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut state = self.state.lock().await;
            if let Some(group) = state
                .topics
                .get_mut(&self.topic)
                .and_then(|t| t.groups.get_mut(&self.group_id))
            {
                group.members.retain(|m| *m != self.member);
                for slot in group.in_flight.iter_mut() {
                    if *slot == Some(self.member) {
                        *slot = None;
                    }
                }
            }
        }
        debug!(topic = %self.topic, group_id = %self.group_id, member = self.member, "left consumer group");
        self.notify.notify_waiters();
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
