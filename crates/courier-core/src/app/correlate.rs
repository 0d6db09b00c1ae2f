//! Correlator - レスポンスを request_id で突き合わせる下流コンシューマ
//!
//! response topic を購読し、届いたレスポンスを `request_id` ごとに待ち手へ渡します。
//! 待ち手がまだいないレスポンスは取っておき、後から来た `wait_for` で返します。
//! 取っておく件数には上限があり、超えたら古いものから捨てます。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{BusError, Envelope, RequestId, validate_envelope};
use crate::ports::{MessageBus, Subscription};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CorrelateError {
    #[error("no response for request '{0}' within {1:?}")]
    Timeout(RequestId, Duration),

    #[error("correlator stopped")]
    Stopped,
}

/// Unclaimed responses kept by `Correlator::start`.
pub const DEFAULT_UNCLAIMED_CAPACITY: usize = 1024;

struct Pending {
    waiters: HashMap<RequestId, Vec<oneshot::Sender<Envelope>>>,
    arrived: HashMap<RequestId, Envelope>,
    // arrived のキーを到着順に保持する
    order: VecDeque<RequestId>,
    capacity: usize,
}

impl Pending {
    fn new(capacity: usize) -> Self {
        Self {
            waiters: HashMap::new(),
            arrived: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn claim(&mut self, request_id: &RequestId) -> Option<Envelope> {
        let envelope = self.arrived.remove(request_id)?;
        self.order.retain(|id| id != request_id);
        Some(envelope)
    }

    fn deliver(&mut self, envelope: Envelope) {
        let request_id = envelope.request_id().clone();
        match self.waiters.remove(&request_id) {
            Some(waiters) => {
                for tx in waiters {
                    // receiver may have timed out already
                    let _ = tx.send(envelope.clone());
                }
            }
            None => {
                if self.arrived.insert(request_id.clone(), envelope).is_none() {
                    self.order.push_back(request_id);
                }
                while self.arrived.len() > self.capacity {
                    let Some(oldest) = self.order.pop_front() else {
                        break;
                    };
                    self.arrived.remove(&oldest);
                    debug!(request_id = %oldest, "evicting unclaimed response");
                }
            }
        }
    }
}

pub struct Correlator {
    pending: Arc<Mutex<Pending>>,
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl Correlator {
    /// Subscribe to every topic in `topics` under `group_id` and start matching.
    pub async fn start(
        bus: Arc<dyn MessageBus>,
        topics: &[&str],
        group_id: &str,
    ) -> Result<Self, BusError> {
        Self::start_with_capacity(bus, topics, group_id, DEFAULT_UNCLAIMED_CAPACITY).await
    }

    /// Like `start`, keeping at most `capacity` unclaimed responses.
    pub async fn start_with_capacity(
        bus: Arc<dyn MessageBus>,
        topics: &[&str],
        group_id: &str,
        capacity: usize,
    ) -> Result<Self, BusError> {
        let pending = Arc::new(Mutex::new(Pending::new(capacity)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut subscriptions = Vec::with_capacity(topics.len());
        for topic in topics {
            subscriptions.push(bus.subscribe(topic, group_id).await?);
        }
        let joins = subscriptions
            .into_iter()
            .map(|sub| {
                tokio::spawn(listen(
                    sub,
                    Arc::clone(&pending),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        Ok(Self {
            pending,
            shutdown_tx,
            joins,
        })
    }

    /// Wait for the response to `request_id`.
    pub async fn wait_for(
        &self,
        request_id: &RequestId,
        timeout: Duration,
    ) -> Result<Envelope, CorrelateError> {
        let rx = {
            let mut pending = self.pending.lock().await;
            if let Some(envelope) = pending.claim(request_id) {
                return Ok(envelope);
            }
            let (tx, rx) = oneshot::channel();
            pending
                .waiters
                .entry(request_id.clone())
                .or_default()
                .push(tx);
            rx
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(CorrelateError::Stopped),
            Err(_) => {
                let mut pending = self.pending.lock().await;
                if let Some(waiters) = pending.waiters.get_mut(request_id) {
                    waiters.retain(|tx| !tx.is_closed());
                    if waiters.is_empty() {
                        pending.waiters.remove(request_id);
                    }
                }
                Err(CorrelateError::Timeout(request_id.clone(), timeout))
            }
        }
    }

    /// Responses that arrived with nobody waiting for them yet.
    pub async fn unclaimed(&self) -> usize {
        self.pending.lock().await.arrived.len()
    }

    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        for j in self.joins {
            let _ = j.await;
        }
        // 残った待ち手は Stopped を受け取る
        self.pending.lock().await.waiters.clear();
    }
}

async fn listen(
    sub: Arc<dyn Subscription>,
    pending: Arc<Mutex<Pending>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        let polled = tokio::select! {
            _ = shutdown_rx.changed() => break,
            polled = sub.poll(64, Duration::from_millis(200)) => polled,
        };
        let records = match polled {
            Ok(records) => records,
            Err(BusError::Closed) => break,
            Err(e) => {
                warn!(topic = sub.topic(), error = %e, "correlator poll failed");
                tokio::time::sleep(Duration::from_millis(200)).await;
                continue;
            }
        };
        for record in records {
            match validate_envelope(&record.payload) {
                Ok(envelope) => {
                    debug!(request_id = %envelope.request_id(), topic = sub.topic(), "response received");
                    pending.lock().await.deliver(envelope);
                }
                Err(e) => {
                    warn!(topic = sub.topic(), offset = record.offset, error = %e, "ignoring invalid response record");
                }
            }
            if let Err(e) = sub.commit(&record).await {
                warn!(topic = sub.topic(), error = %e, "correlator commit failed");
            }
        }
    }
    sub.close().await;
}
