//! 基于 SQLite 的帖子文档存储
//!
//! [`OotdBackend`] 持有连接池和变更 hub，代表「后端」；
//! [`SqlitePostStore`] 是以某个身份登录后的客户端视图，所有请求先经过访问策略。

use crate::ootd::db::create_sqlite_pool_with_migration;
use crate::ootd::friend::dao::FriendDao;
use crate::ootd::policy::{authorize, Decision, FriendSnapshot, Request};
use crate::ootd::post::dao::PostDao;
use crate::ootd::store::hub::{ChangeHub, HubReceiver, HubRecvError, StoredChange};
use crate::ootd::store::{
    ChangeKind, ChangeSubscription, DocumentChange, ListenerRegistration, PostDocument, PostQuery,
    PostStore, QuerySnapshot, StoreError,
};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 单个订阅缓冲的快照数量
const SUBSCRIPTION_BUFFER: usize = 64;

/// 进程内后端：SQLite 连接池 + 变更 hub
#[derive(Clone)]
pub struct OotdBackend {
    pool: Pool<Sqlite>,
    hub: Arc<ChangeHub>,
}

impl OotdBackend {
    pub fn new(pool: Pool<Sqlite>, hub_capacity: usize) -> Self {
        Self {
            pool,
            hub: Arc::new(ChangeHub::new(hub_capacity)),
        }
    }

    /// 连接数据库并执行迁移
    pub async fn open(db_url: &str, max_connections: u32, hub_capacity: usize) -> Result<Self> {
        let pool = create_sqlite_pool_with_migration(db_url, max_connections).await?;
        Ok(Self::new(pool, hub_capacity))
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn hub(&self) -> &Arc<ChangeHub> {
        &self.hub
    }

    /// 以 `auth_uid` 身份访问帖子存储；`None` 表示未登录
    pub fn post_store(&self, auth_uid: Option<String>) -> SqlitePostStore {
        SqlitePostStore {
            auth_uid,
            posts: PostDao::new(self.pool.clone()),
            friends: FriendDao::new(self.pool.clone()),
            hub: self.hub.clone(),
        }
    }
}

/// 以某个身份访问的帖子存储
#[derive(Clone)]
pub struct SqlitePostStore {
    auth_uid: Option<String>,
    posts: PostDao,
    friends: FriendDao,
    hub: Arc<ChangeHub>,
}

impl SqlitePostStore {
    fn ensure(decision: Decision) -> Result<(), StoreError> {
        match decision {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(StoreError::PermissionDenied(reason)),
        }
    }

    async fn graph_for(&self, owners: &[String]) -> Result<FriendSnapshot, StoreError> {
        load_graph(self.auth_uid.as_deref(), &self.friends, owners).await
    }

    async fn authorize_list(&self, query: &PostQuery) -> Result<(), StoreError> {
        authorize_owners(self.auth_uid.as_deref(), &self.friends, &query.owner_in).await
    }

    /// 写入前校验文档结构，返回 (owner_id, timestamp)
    fn indexed_fields(doc: &PostDocument) -> Result<(String, i64), StoreError> {
        if doc.id.trim().is_empty() {
            return Err(StoreError::InvalidDocument("文档 ID 不能为空".to_string()));
        }
        if !doc.data.is_object() {
            return Err(StoreError::InvalidDocument(format!(
                "文档 {} 必须是 JSON 对象",
                doc.id
            )));
        }
        if let Some(embedded) = doc.data.get("postUID").and_then(|v| v.as_str()) {
            if embedded != doc.id {
                return Err(StoreError::InvalidDocument(format!(
                    "postUID {} 与文档 ID {} 不一致",
                    embedded, doc.id
                )));
            }
        }
        let owner = doc
            .owner_id()
            .filter(|o| !o.is_empty())
            .ok_or_else(|| StoreError::InvalidDocument(format!("文档 {} 缺少 ownerId", doc.id)))?;
        let timestamp = doc
            .timestamp()
            .filter(|ts| *ts >= 0)
            .ok_or_else(|| StoreError::InvalidDocument(format!("文档 {} 缺少合法的 timestamp", doc.id)))?;
        Ok((owner.to_string(), timestamp))
    }
}

/// 加载请求者与给定作者之间的好友边
async fn load_graph(
    auth_uid: Option<&str>,
    friends: &FriendDao,
    owners: &[String],
) -> Result<FriendSnapshot, StoreError> {
    match auth_uid {
        Some(uid) => Ok(friends.load_edges_between(uid, owners).await?),
        None => Ok(FriendSnapshot::new()),
    }
}

/// 按当前好友关系判断能否列出这些作者的帖子
async fn authorize_owners(
    auth_uid: Option<&str>,
    friends: &FriendDao,
    owners: &[String],
) -> Result<(), StoreError> {
    let graph = load_graph(auth_uid, friends, owners).await?;
    SqlitePostStore::ensure(authorize(
        auth_uid,
        &Request::ListPosts {
            owner_in: Some(owners),
        },
        &graph,
    ))
}

/// 一个实时订阅的推送循环
struct SubscriptionFeed {
    auth_uid: Option<String>,
    friends: FriendDao,
    query: PostQuery,
}

impl SubscriptionFeed {
    async fn run(
        self,
        initial: Vec<PostDocument>,
        mut changes: HubReceiver,
        tx: mpsc::Sender<Result<QuerySnapshot, StoreError>>,
    ) {
        let mut current: HashMap<String, PostDocument> = initial
            .iter()
            .map(|doc| (doc.id.clone(), doc.clone()))
            .collect();
        let first = QuerySnapshot {
            changes: initial
                .into_iter()
                .map(|document| DocumentChange {
                    kind: ChangeKind::Added,
                    document,
                })
                .collect(),
        };
        if tx.send(Ok(first)).await.is_err() {
            return;
        }

        loop {
            let change = match changes.recv().await {
                Ok(change) => change,
                Err(HubRecvError::Lagged(n)) => {
                    warn!("[PostStore] 订阅落后，丢失 {} 条变更，终止订阅", n);
                    let _ = tx.send(Err(StoreError::ListenerLagged(n))).await;
                    return;
                }
                Err(HubRecvError::Closed) => {
                    debug!("[PostStore] 订阅 {} 已注销", changes.id());
                    return;
                }
            };
            let Some(snapshot) = apply_stored_change(&self.query, &mut current, change) else {
                continue;
            };
            // 好友关系可能在订阅期间变化，每次下发前按当前关系重新授权
            if let Err(e) =
                authorize_owners(self.auth_uid.as_deref(), &self.friends, &self.query.owner_in).await
            {
                warn!(
                    "[PostStore] 订阅 {:?} 不再被允许，终止订阅: {}",
                    self.query.owner_in, e
                );
                let _ = tx.send(Err(e)).await;
                return;
            }
            if tx.send(Ok(snapshot)).await.is_err() {
                return;
            }
        }
    }
}

/// 把一条已提交的写入折算成某个订阅的增量；与订阅无关时返回 `None`
fn apply_stored_change(
    query: &PostQuery,
    current: &mut HashMap<String, PostDocument>,
    change: StoredChange,
) -> Option<QuerySnapshot> {
    let change = match change {
        StoredChange::Upserted(doc) => {
            if query.matches(&doc) {
                let kind = if current.contains_key(&doc.id) {
                    ChangeKind::Modified
                } else {
                    ChangeKind::Added
                };
                current.insert(doc.id.clone(), doc.clone());
                DocumentChange {
                    kind,
                    document: doc,
                }
            } else {
                // 修改后不再满足条件的文档从结果集中移出
                let previous = current.remove(&doc.id)?;
                DocumentChange {
                    kind: ChangeKind::Removed,
                    document: previous,
                }
            }
        }
        StoredChange::Deleted { id } => {
            let previous = current.remove(&id)?;
            DocumentChange {
                kind: ChangeKind::Removed,
                document: previous,
            }
        }
    };
    Some(QuerySnapshot {
        changes: vec![change],
    })
}

#[async_trait]
impl PostStore for SqlitePostStore {
    fn auth_uid(&self) -> Option<&str> {
        self.auth_uid.as_deref()
    }

    async fn query(&self, query: &PostQuery) -> Result<Vec<PostDocument>, StoreError> {
        query.validate()?;
        self.authorize_list(query).await?;
        let docs = self
            .posts
            .query_posts(&query.owner_in, query.since, query.order, query.limit)
            .await?;
        Ok(docs)
    }

    async fn get(&self, post_uid: &str) -> Result<Option<PostDocument>, StoreError> {
        let Some(doc) = self.posts.get_post(post_uid).await? else {
            return Ok(None);
        };
        let owner = doc.owner_id().unwrap_or_default().to_string();
        let graph = self.graph_for(std::slice::from_ref(&owner)).await?;
        Self::ensure(authorize(
            self.auth_uid.as_deref(),
            &Request::ReadPost { owner_id: &owner },
            &graph,
        ))?;
        Ok(Some(doc))
    }

    async fn add(&self, doc: PostDocument) -> Result<(), StoreError> {
        let (owner, timestamp) = Self::indexed_fields(&doc)?;
        Self::ensure(authorize(
            self.auth_uid.as_deref(),
            &Request::CreatePost {
                new_owner_id: &owner,
            },
            &FriendSnapshot::new(),
        ))?;
        if !self.posts.insert_post(&doc, &owner, timestamp).await? {
            return Err(StoreError::AlreadyExists(doc.id));
        }
        debug!("[PostStore] 新增帖子 {} (owner={})", doc.id, owner);
        self.hub.publish(StoredChange::Upserted(doc));
        Ok(())
    }

    async fn update(&self, doc: PostDocument) -> Result<(), StoreError> {
        let existing = self
            .posts
            .get_post(&doc.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(doc.id.clone()))?;
        let existing_owner = existing.owner_id().unwrap_or_default().to_string();
        // 先判断权限，再校验新文档，非作者拿不到任何关于文档结构的反馈
        let new_owner = doc.owner_id().unwrap_or_default().to_string();
        Self::ensure(authorize(
            self.auth_uid.as_deref(),
            &Request::UpdatePost {
                existing_owner_id: &existing_owner,
                new_owner_id: &new_owner,
            },
            &FriendSnapshot::new(),
        ))?;
        let (owner, timestamp) = Self::indexed_fields(&doc)?;
        self.posts.upsert_post(&doc, &owner, timestamp).await?;
        debug!("[PostStore] 更新帖子 {}", doc.id);
        self.hub.publish(StoredChange::Upserted(doc));
        Ok(())
    }

    async fn delete(&self, post_uid: &str) -> Result<(), StoreError> {
        let existing = self
            .posts
            .get_post(post_uid)
            .await?
            .ok_or_else(|| StoreError::NotFound(post_uid.to_string()))?;
        let existing_owner = existing.owner_id().unwrap_or_default().to_string();
        Self::ensure(authorize(
            self.auth_uid.as_deref(),
            &Request::DeletePost {
                existing_owner_id: &existing_owner,
            },
            &FriendSnapshot::new(),
        ))?;
        if self.posts.delete_post(post_uid).await? {
            debug!("[PostStore] 删除帖子 {}", post_uid);
            self.hub.publish(StoredChange::Deleted {
                id: post_uid.to_string(),
            });
        }
        Ok(())
    }

    async fn subscribe(&self, query: PostQuery) -> Result<ChangeSubscription, StoreError> {
        query.validate()?;
        if query.limit.is_some() {
            return Err(StoreError::InvalidQuery(
                "实时订阅不支持 limit".to_string(),
            ));
        }
        self.authorize_list(&query).await?;

        // 先登记再读初始结果，两者之间的写入会以 Modified 的形式再出现一次
        let changes = self.hub.subscribe();
        let hub_id = changes.id();
        let initial = self
            .posts
            .query_posts(&query.owner_in, query.since, query.order, None)
            .await?;

        info!(
            "[PostStore] 新增实时订阅 {}，作者: {:?}, since: {:?}, 初始文档数: {}",
            hub_id,
            query.owner_in,
            query.since,
            initial.len()
        );

        let feed = SubscriptionFeed {
            auth_uid: self.auth_uid.clone(),
            friends: self.friends.clone(),
            query,
        };
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let task = tokio::spawn(feed.run(initial, changes, tx));

        let abort = task.abort_handle();
        let hub = Arc::downgrade(&self.hub);
        let registration = ListenerRegistration::new(move || {
            if let Some(hub) = hub.upgrade() {
                hub.unsubscribe(hub_id);
            }
            abort.abort();
        });

        Ok(ChangeSubscription::new(rx)
            .with_task(task)
            .with_registration(registration))
    }
}
