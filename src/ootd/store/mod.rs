//! 文档存储层
//!
//! [`PostStore`] 描述后端文档数据库需要提供的查询原语：
//! - 作者 `in` 成员过滤（最多 10 个取值）
//! - 时间戳下界过滤
//! - 按时间戳服务端排序
//! - 实时变更订阅（逐文档的新增 / 修改 / 删除事件）
//!
//! 每个 store 实例绑定一个已认证身份，所有路径都会经过 [`crate::ootd::policy`] 授权。

pub mod hub;
pub mod sqlite;

use crate::ootd::policy::DenyReason;
use crate::ootd::types::MAX_IN_FILTER_VALUES;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use hub::{ChangeHub, HubReceiver, HubRecvError, StoredChange};
pub use sqlite::{OotdBackend, SqlitePostStore};

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("查询超时")]
    Timeout,

    #[error("权限不足: {0}")]
    PermissionDenied(DenyReason),

    #[error("无效查询: {0}")]
    InvalidQuery(String),

    #[error("无效文档: {0}")]
    InvalidDocument(String),

    #[error("文档不存在: {0}")]
    NotFound(String),

    #[error("文档已存在: {0}")]
    AlreadyExists(String),

    #[error("监听器落后，丢失了 {0} 条变更")]
    ListenerLagged(u64),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StoreError::PermissionDenied(_))
    }
}

/// 存储中的帖子文档：文档 ID + JSON 数据
#[derive(Debug, Clone, PartialEq)]
pub struct PostDocument {
    pub id: String,
    pub data: Value,
}

impl PostDocument {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// 作者字段（`ownerId`）
    pub fn owner_id(&self) -> Option<&str> {
        self.data.get("ownerId").and_then(Value::as_str)
    }

    /// 时间戳字段（毫秒）
    pub fn timestamp(&self) -> Option<i64> {
        self.data.get("timestamp").and_then(Value::as_i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// 帖子查询：`ownerId in owner_in AND timestamp >= since ORDER BY timestamp`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    pub owner_in: Vec<String>,
    pub since: Option<i64>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl PostQuery {
    pub fn owners(owner_in: impl Into<Vec<String>>) -> Self {
        Self {
            owner_in: owner_in.into(),
            since: None,
            order: SortOrder::Ascending,
            limit: None,
        }
    }

    pub fn since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// 校验后端限制：`in` 过滤必须有 1..=10 个取值
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.owner_in.is_empty() {
            return Err(StoreError::InvalidQuery(
                "ownerId in [] 不允许为空".to_string(),
            ));
        }
        if self.owner_in.len() > MAX_IN_FILTER_VALUES {
            return Err(StoreError::InvalidQuery(format!(
                "ownerId in 最多 {} 个取值，实际 {}",
                MAX_IN_FILTER_VALUES,
                self.owner_in.len()
            )));
        }
        Ok(())
    }

    /// 文档是否满足查询条件
    pub fn matches(&self, doc: &PostDocument) -> bool {
        let owner_ok = doc
            .owner_id()
            .is_some_and(|owner| self.owner_in.iter().any(|o| o == owner));
        let time_ok = match self.since {
            Some(since) => doc.timestamp().is_some_and(|ts| ts >= since),
            None => true,
        };
        owner_ok && time_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub document: PostDocument,
}

/// 一次订阅回调携带的增量变更；首个快照把当前结果集全部作为 `Added` 下发
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySnapshot {
    pub changes: Vec<DocumentChange>,
}

impl QuerySnapshot {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

type RemoveFn = Box<dyn FnOnce() + Send>;

/// 订阅的注销句柄
///
/// 可克隆，任何一个副本调用 [`ListenerRegistration::remove`] 都会同步注销订阅，
/// 之后的调用不再有任何效果。
#[derive(Clone, Default)]
pub struct ListenerRegistration {
    remove: Arc<Mutex<Option<RemoveFn>>>,
}

impl ListenerRegistration {
    pub fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remove: Arc::new(Mutex::new(Some(Box::new(remove)))),
        }
    }

    pub fn remove(&self) {
        let remove = self
            .remove
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(remove) = remove {
            remove();
        }
    }

    pub fn is_removed(&self) -> bool {
        self.remove
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

/// 实时订阅句柄
///
/// drop 或调用 [`ChangeSubscription::remove`] 时同步注销，返回后不会再收到快照。
/// 句柄被移进其他任务时，可先用 [`ChangeSubscription::registration`] 取出注销句柄。
pub struct ChangeSubscription {
    rx: mpsc::Receiver<Result<QuerySnapshot, StoreError>>,
    task: Option<JoinHandle<()>>,
    registration: ListenerRegistration,
}

impl ChangeSubscription {
    pub fn new(rx: mpsc::Receiver<Result<QuerySnapshot, StoreError>>) -> Self {
        Self {
            rx,
            task: None,
            registration: ListenerRegistration::default(),
        }
    }

    /// 绑定负责推送快照的后台任务，订阅移除时一并终止
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// 绑定后端的注销动作
    pub fn with_registration(mut self, registration: ListenerRegistration) -> Self {
        self.registration = registration;
        self
    }

    pub fn registration(&self) -> ListenerRegistration {
        self.registration.clone()
    }

    /// 等待下一个快照；返回 `None` 表示订阅已结束
    pub async fn next_snapshot(&mut self) -> Option<Result<QuerySnapshot, StoreError>> {
        self.rx.recv().await
    }

    pub fn remove(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        self.registration.remove();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.rx.close();
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

/// 帖子文档存储
#[async_trait]
pub trait PostStore: Send + Sync {
    /// 当前已认证身份
    fn auth_uid(&self) -> Option<&str>;

    /// 单次查询，结果按时间戳服务端排序
    async fn query(&self, query: &PostQuery) -> Result<Vec<PostDocument>, StoreError>;

    /// 按 ID 读取单个文档
    async fn get(&self, post_uid: &str) -> Result<Option<PostDocument>, StoreError>;

    /// 新增文档（ID 已存在时失败）
    async fn add(&self, doc: PostDocument) -> Result<(), StoreError>;

    /// 覆盖已有文档
    async fn update(&self, doc: PostDocument) -> Result<(), StoreError>;

    async fn delete(&self, post_uid: &str) -> Result<(), StoreError>;

    /// 订阅查询结果的实时变更
    async fn subscribe(&self, query: PostQuery) -> Result<ChangeSubscription, StoreError>;
}
