//! Consumer - 1 topic / 1 consumer group のディスパッチループ
//!
//! # 状態遷移
//! ```text
//! Stopped → Starting → Subscribed → { Polling ⇄ Dispatching } → Stopping → Stopped
//! ```
//!
//! # 方針
//! - handler が戻ってから commit する（at-least-once）
//! - partition ごとの順序はバスの契約（未コミットの in-flight は partition あたり 1 件）で守る
//! - partition をまたいだ並行実行は `max_in_flight` で上限を切る
//! - shutdown 後は新しいレコードを取らず、in-flight は grace period 内で完了させる
//!
//! handler は内側の `tokio::spawn` で実行し、panic してもループは止まりません。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::app::dispatch::{Dispatched, Dispatcher};
use crate::domain::{BusError, ConsumerId};
use crate::observability::{ConsumerStats, StatsSnapshot};
use crate::ports::{BusRecord, MessageBus, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumerState {
    Stopped,
    Starting,
    Subscribed,
    Polling,
    Dispatching,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub topic: String,
    pub group_id: String,
    pub max_in_flight: usize,
    pub poll_interval: Duration,
    pub shutdown_grace: Duration,
}

/// Handle to a running dispatch loop.
///
/// - `request_shutdown()` で新規レコードの取得を止める
/// - `shutdown_and_join()` で in-flight の完了（または grace 超過）まで待つ
pub struct ConsumerHandle {
    id: ConsumerId,
    settings: ConsumerSettings,
    stats: Arc<ConsumerStats>,
    state_rx: watch::Receiver<ConsumerState>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn spawn(
        id: ConsumerId,
        bus: Arc<dyn MessageBus>,
        dispatcher: Dispatcher,
        settings: ConsumerSettings,
    ) -> Self {
        // 0 だと一度も poll しないので最低 1 件は流す
        let settings = ConsumerSettings {
            max_in_flight: settings.max_in_flight.max(1),
            ..settings
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ConsumerState::Stopped);
        let stats = Arc::clone(dispatcher.stats());

        let run = ConsumerLoop {
            id,
            bus,
            dispatcher: Arc::new(dispatcher),
            settings: settings.clone(),
            state_tx,
            shutdown_rx,
        };
        let join = tokio::spawn(run.run());

        Self {
            id,
            settings,
            stats,
            state_rx,
            shutdown_tx,
            join,
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.settings.topic
    }

    pub fn group_id(&self) -> &str {
        &self.settings.group_id
    }

    pub fn state(&self) -> ConsumerState {
        *self.state_rx.borrow()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Wait until the loop reaches `state`. Returns `false` if the loop is gone.
    pub async fn wait_for_state(&self, state: ConsumerState) -> bool {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|s| *s == state).await.is_ok()
    }

    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            error!(consumer_id = %self.id, error = %e, "consumer task ended abnormally");
        }
    }
}

struct ConsumerLoop {
    id: ConsumerId,
    bus: Arc<dyn MessageBus>,
    dispatcher: Arc<Dispatcher>,
    settings: ConsumerSettings,
    state_tx: watch::Sender<ConsumerState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConsumerLoop {
    fn set_state(&self, state: ConsumerState) {
        self.state_tx.send_replace(state);
    }

    async fn run(mut self) {
        let topic = self.settings.topic.clone();
        let group_id = self.settings.group_id.clone();

        self.set_state(ConsumerState::Starting);
        let subscription = match self.bus.subscribe(&topic, &group_id).await {
            Ok(s) => s,
            Err(e) => {
                error!(consumer_id = %self.id, topic = %topic, group_id = %group_id, error = %e, "subscribe failed");
                self.set_state(ConsumerState::Stopped);
                return;
            }
        };
        self.set_state(ConsumerState::Subscribed);
        info!(consumer_id = %self.id, topic = %topic, group_id = %group_id, "consumer subscribed");

        let mut tasks: JoinSet<()> = JoinSet::new();
        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }
            while let Some(res) = tasks.try_join_next() {
                log_join(res);
            }

            let capacity = self.settings.max_in_flight.saturating_sub(tasks.len());
            if capacity == 0 {
                // 上限に達したら 1 件終わるまで待つ
                tokio::select! {
                    _ = self.shutdown_rx.changed() => break,
                    Some(res) = tasks.join_next() => log_join(res),
                }
                continue;
            }

            if tasks.is_empty() {
                self.set_state(ConsumerState::Polling);
            }
            let polled = tokio::select! {
                _ = self.shutdown_rx.changed() => break,
                polled = subscription.poll(capacity, self.settings.poll_interval) => polled,
            };

            let records = match polled {
                Ok(records) => records,
                Err(BusError::Closed) => {
                    warn!(consumer_id = %self.id, topic = %topic, "subscription closed underneath the consumer");
                    break;
                }
                Err(e) => {
                    warn!(consumer_id = %self.id, topic = %topic, error = %e, "poll failed");
                    tokio::select! {
                        _ = self.shutdown_rx.changed() => break,
                        _ = tokio::time::sleep(self.settings.poll_interval) => {}
                    }
                    continue;
                }
            };
            if records.is_empty() {
                continue;
            }

            self.set_state(ConsumerState::Dispatching);
            for record in records {
                debug!(
                    topic = %topic,
                    partition = record.partition,
                    offset = record.offset,
                    key = %record.key,
                    "dispatching record"
                );
                tasks.spawn(process(
                    Arc::clone(&self.dispatcher),
                    Arc::clone(&subscription),
                    record,
                ));
            }
        }

        self.set_state(ConsumerState::Stopping);
        self.drain(&mut tasks).await;
        subscription.close().await;
        self.set_state(ConsumerState::Stopped);
        info!(consumer_id = %self.id, topic = %topic, group_id = %group_id, "consumer stopped");
    }

    /// Let in-flight records finish within the grace period; abort the rest.
    ///
    /// Aborted records are not committed and will be redelivered.
    async fn drain(&self, tasks: &mut JoinSet<()>) {
        if tasks.is_empty() {
            return;
        }
        info!(consumer_id = %self.id, in_flight = tasks.len(), "draining in-flight records");
        let deadline = Instant::now() + self.settings.shutdown_grace;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(res)) => log_join(res),
                Ok(None) => return,
                Err(_) => {
                    warn!(
                        consumer_id = %self.id,
                        remaining = tasks.len(),
                        "shutdown grace period elapsed; aborting in-flight records"
                    );
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return;
                }
            }
        }
    }
}

/// Aborts the handler task when the owning record task is aborted.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn process(dispatcher: Arc<Dispatcher>, subscription: Arc<dyn Subscription>, record: BusRecord) {
    let mut handler_task = {
        let dispatcher = Arc::clone(&dispatcher);
        let record = record.clone();
        AbortOnDrop(tokio::spawn(async move { dispatcher.dispatch(&record).await }))
    };
    match (&mut handler_task.0).await {
        Ok(Dispatched::Escaped(kind)) => {
            debug!(partition = record.partition, offset = record.offset, ?kind, "escaped error contained");
        }
        Ok(_) => {}
        Err(e) if e.is_panic() => {
            error!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "handler panicked"
            );
        }
        Err(_) => return,
    }

    if let Err(e) = subscription.commit(&record).await {
        warn!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            error = %e,
            "commit failed; record will be redelivered"
        );
    }
}

fn log_join(res: Result<(), JoinError>) {
    if let Err(e) = res
        && !e.is_cancelled()
    {
        error!(error = %e, "record task failed");
    }
}
