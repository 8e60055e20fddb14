//! 进程内变更分发：所有写路径在提交后发布，实时订阅从这里接收
//!
//! 每个订阅在 hub 里有一条以 id 为键的登记，持有一个有界通道。
//! 注销是同步的：[`ChangeHub::unsubscribe`] 返回时该订阅已不再接收任何变更。

use crate::ootd::store::PostDocument;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// 已提交的写入
#[derive(Debug, Clone)]
pub enum StoredChange {
    Upserted(PostDocument),
    Deleted { id: String },
}

struct Registration {
    tx: mpsc::Sender<StoredChange>,
    dropped: Arc<AtomicU64>,
}

pub struct ChangeHub {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Registration>>,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<u64, Registration>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 分发给所有订阅者；缓冲已满的订阅者被移除，其接收端读完缓冲后得到 [`HubRecvError::Lagged`]
    pub fn publish(&self, change: StoredChange) {
        let mut subscribers = self.subscribers();
        if subscribers.is_empty() {
            trace!("[ChangeHub] 当前没有订阅者");
            return;
        }
        subscribers.retain(|id, registration| {
            match registration.tx.try_send(change.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    registration.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("[ChangeHub] 订阅 {} 缓冲已满，移出分发列表", id);
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
        trace!("[ChangeHub] 变更已分发给 {} 个订阅者", subscribers.len());
    }

    pub fn subscribe(self: &Arc<Self>) -> HubReceiver {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        self.subscribers().insert(
            id,
            Registration {
                tx,
                dropped: dropped.clone(),
            },
        );
        trace!("[ChangeHub] 新订阅 {}", id);
        HubReceiver {
            id,
            rx,
            dropped,
            hub: Arc::downgrade(self),
        }
    }

    /// 同步注销；订阅不存在时返回 `false`
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.subscribers().remove(&id).is_some();
        if removed {
            trace!("[ChangeHub] 注销订阅 {}", id);
        }
        removed
    }

    pub fn receiver_count(&self) -> usize {
        self.subscribers().len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubRecvError {
    /// 缓冲溢出被移出分发列表，丢失了这么多条变更
    Lagged(u64),
    Closed,
}

/// 一条订阅登记的接收端，drop 时自动注销
pub struct HubReceiver {
    id: u64,
    rx: mpsc::Receiver<StoredChange>,
    dropped: Arc<AtomicU64>,
    hub: Weak<ChangeHub>,
}

impl HubReceiver {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Result<StoredChange, HubRecvError> {
        match self.rx.recv().await {
            Some(change) => Ok(change),
            None => match self.dropped.load(Ordering::Relaxed) {
                0 => Err(HubRecvError::Closed),
                n => Err(HubRecvError::Lagged(n)),
            },
        }
    }
}

impl Drop for HubReceiver {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}
