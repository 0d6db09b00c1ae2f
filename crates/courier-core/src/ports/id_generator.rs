//! IdGenerator port - ID 生成の抽象化
//!
//! `event_id` はエンベロープ生成時に採番します（呼び出し側が決める `request_id` とは別物）。

use crate::domain::ids::{ConsumerId, EventId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は分散環境で衝突しない ID を生成
pub trait IdGenerator: Send + Sync {
    fn generate_event_id(&self) -> EventId;

    fn generate_consumer_id(&self) -> ConsumerId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// FixedClock を渡すとタイムスタンプ部分が固定されます（ランダム部分は毎回変わる）。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_event_id(&self) -> EventId {
        EventId::from(self.next_ulid())
    }

    fn generate_consumer_id(&self) -> ConsumerId {
        ConsumerId::from(self.next_ulid())
    }
}
