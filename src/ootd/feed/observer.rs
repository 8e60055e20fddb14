//! 实时动态订阅
//!
//! 每个分片（最多 10 个用户）对应一个存储层订阅，由独立的 tokio 任务驱动。
//! 各分片的快照合并进同一份 [`FeedMergeState`]，满足推送条件时把完整的排序列表
//! 发到 [`FeedSubscription`]。

use crate::ootd::feed::merge::FeedMergeState;
use crate::ootd::post::models::Post;
use crate::ootd::store::{
    ChangeSubscription, ListenerRegistration, PostQuery, PostStore, QuerySnapshot, SortOrder,
};
use crate::ootd::types::UidKey;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 各分片存储层订阅的注销句柄
#[derive(Default)]
struct ChunkListeners {
    cancelled: bool,
    registrations: Vec<ListenerRegistration>,
}

/// 实时动态流
///
/// 每一项都是当前完整的动态列表（时间降序）。调用 [`FeedSubscription::cancel`] 或 drop
/// 时同步注销所有分片的存储层订阅并终止分片任务，之后不会再收到任何推送。
pub struct FeedSubscription {
    rx: mpsc::UnboundedReceiver<Vec<Post>>,
    tasks: Vec<JoinHandle<()>>,
    listeners: Arc<Mutex<ChunkListeners>>,
}

impl FeedSubscription {
    /// 等待下一次推送；`None` 表示流已结束
    pub async fn next_feed(&mut self) -> Option<Vec<Post>> {
        self.rx.recv().await
    }

    /// 仍在运行的分片任务数
    pub fn active_chunks(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    pub fn cancel(&mut self) {
        // 先关闭接收端，正在推送的任务随后的 send 都会失败
        self.rx.close();
        let registrations = {
            let mut listeners = lock_listeners(&self.listeners);
            listeners.cancelled = true;
            std::mem::take(&mut listeners.registrations)
        };
        for registration in registrations {
            registration.remove();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        while self.rx.try_recv().is_ok() {}
    }
}

fn lock_listeners(listeners: &Mutex<ChunkListeners>) -> MutexGuard<'_, ChunkListeners> {
    listeners
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Stream for FeedSubscription {
    type Item = Vec<Post>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// 订阅 `key` 中所有用户在 `since` 之后的帖子
///
/// 必须在 tokio 运行时中调用。`key` 为空时立即推送一次空列表，随后流结束。
pub fn observe_recent_feed(store: Arc<dyn PostStore>, key: &UidKey, since: i64) -> FeedSubscription {
    let (tx, rx) = mpsc::unbounded_channel();

    if key.is_empty() {
        debug!("[FeedObserver] 用户 ID 列表为空，推送空列表");
        let _ = tx.send(Vec::new());
        return FeedSubscription {
            rx,
            tasks: Vec::new(),
            listeners: Arc::default(),
        };
    }

    let chunk_count = key.chunk_count();
    info!(
        "[FeedObserver] 订阅 {} 个用户的动态，共 {} 片，since={}",
        key.len(),
        chunk_count,
        since
    );

    let state = Arc::new(Mutex::new(FeedMergeState::new(chunk_count)));
    let listeners: Arc<Mutex<ChunkListeners>> = Arc::default();
    let tasks = key
        .chunks()
        .enumerate()
        .map(|(idx, chunk)| {
            let query = PostQuery::owners(chunk.to_vec())
                .since(since)
                .order(SortOrder::Descending);
            tokio::spawn(run_chunk(
                store.clone(),
                idx,
                query,
                state.clone(),
                listeners.clone(),
                tx.clone(),
            ))
        })
        .collect();

    FeedSubscription {
        rx,
        tasks,
        listeners,
    }
}

async fn run_chunk(
    store: Arc<dyn PostStore>,
    idx: usize,
    query: PostQuery,
    state: Arc<Mutex<FeedMergeState>>,
    listeners: Arc<Mutex<ChunkListeners>>,
    tx: mpsc::UnboundedSender<Vec<Post>>,
) {
    let mut subscription = match store.subscribe(query).await {
        Ok(subscription) => subscription,
        Err(e) => {
            error!("[FeedObserver] 分片 {} 订阅失败，该分片不再更新: {}", idx, e);
            return;
        }
    };
    if !register(&listeners, &subscription) {
        debug!("[FeedObserver] 订阅已取消，分片 {} 立即注销", idx);
        subscription.remove();
        return;
    }

    while let Some(item) = subscription.next_snapshot().await {
        match item {
            Ok(snapshot) => {
                if !apply_and_emit(&state, idx, &snapshot, &tx) {
                    debug!("[FeedObserver] 接收端已关闭，分片 {} 退出", idx);
                    return;
                }
            }
            Err(e) => {
                error!("[FeedObserver] 分片 {} 监听出错，该分片不再更新: {}", idx, e);
                return;
            }
        }
    }
    warn!("[FeedObserver] 分片 {} 的存储层订阅已结束", idx);
}

/// 登记分片的注销句柄；流已取消时返回 `false`
fn register(listeners: &Mutex<ChunkListeners>, subscription: &ChangeSubscription) -> bool {
    let mut listeners = lock_listeners(listeners);
    if listeners.cancelled {
        return false;
    }
    listeners.registrations.push(subscription.registration());
    true
}

/// 在锁内合并并推送，推送顺序与状态变化顺序一致；接收端关闭时返回 `false`
fn apply_and_emit(
    state: &Mutex<FeedMergeState>,
    idx: usize,
    snapshot: &QuerySnapshot,
    tx: &mpsc::UnboundedSender<Vec<Post>>,
) -> bool {
    let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    match state.apply(idx, snapshot) {
        Some(posts) => tx.send(posts).is_ok(),
        None => true,
    }
}
