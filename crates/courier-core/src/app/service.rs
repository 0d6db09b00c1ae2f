//! ServiceHandle - 起動中のコンシューマ群
//!
//! - `request_shutdown()` で全ループが新規レコードの取得を止める
//! - `shutdown_and_join()` で全ループの終了を待つ
//! - `unsubscribe(id)` で 1 つのコンシューマだけ止めて外す

use tracing::info;

use crate::app::consumer::{ConsumerHandle, ConsumerState};
use crate::domain::{ConsumerId, EventType};
use crate::observability::StatsSnapshot;

/// Point-in-time view of one consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerInfo {
    pub id: ConsumerId,
    pub event_type: EventType,
    pub topic: String,
    pub group_id: String,
    pub state: ConsumerState,
}

pub struct ServiceHandle {
    consumers: Vec<(EventType, ConsumerHandle)>,
}

impl ServiceHandle {
    pub(crate) fn new(consumers: Vec<(EventType, ConsumerHandle)>) -> Self {
        Self { consumers }
    }

    pub fn consumers(&self) -> Vec<ConsumerInfo> {
        self.consumers
            .iter()
            .map(|(event_type, c)| ConsumerInfo {
                id: c.id(),
                event_type: *event_type,
                topic: c.topic().to_string(),
                group_id: c.group_id().to_string(),
                state: c.state(),
            })
            .collect()
    }

    /// Consumers whose loop has not stopped.
    pub fn active_consumers(&self) -> Vec<ConsumerInfo> {
        self.consumers()
            .into_iter()
            .filter(|c| c.state != ConsumerState::Stopped)
            .collect()
    }

    pub fn stats(&self, event_type: EventType) -> Option<StatsSnapshot> {
        self.consumers
            .iter()
            .find(|(t, _)| *t == event_type)
            .map(|(_, c)| c.stats())
    }

    /// Wait until every consumer has joined its group and is waiting for records.
    pub async fn wait_until_polling(&self) {
        for (_, c) in &self.consumers {
            c.wait_for_state(ConsumerState::Polling).await;
        }
    }

    /// Stop one consumer and drop it from the service.
    ///
    /// Its in-flight records get the usual grace period. Returns `false` for an unknown id.
    pub async fn unsubscribe(&mut self, id: ConsumerId) -> bool {
        let Some(pos) = self.consumers.iter().position(|(_, c)| c.id() == id) else {
            return false;
        };
        let (event_type, consumer) = self.consumers.remove(pos);
        let topic = consumer.topic().to_string();
        consumer.shutdown_and_join().await;
        info!(consumer_id = %id, event_type = %event_type, topic = %topic, "consumer unsubscribed");
        true
    }

    pub fn request_shutdown(&self) {
        for (_, c) in &self.consumers {
            c.request_shutdown();
        }
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for (_, c) in self.consumers {
            c.shutdown_and_join().await;
        }
        info!("service stopped");
    }
}
