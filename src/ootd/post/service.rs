//! 帖子服务层（动态聚合）
//!
//! 负责按好友 ID 列表拉取并合并帖子：
//! 1. 规范化 ID 列表（去空白、去空串、去重）
//! 2. 按后端 `in` 查询上限分片，逐片带超时查询
//! 3. 合并后按时间戳稳定排序
//!
//! 读操作从不向调用方返回错误：超时或失败时记录日志并返回空结果。

use crate::ootd::feed::observer::{observe_recent_feed, FeedSubscription};
use crate::ootd::post::listener::{EmptyPostListener, PostListener};
use crate::ootd::post::models::{sort_by_timestamp, Post, PostDraft, PostRepositoryConfig};
use crate::ootd::serialization::{generate_post_id, now_millis, start_of_local_day_millis};
use crate::ootd::store::{PostQuery, PostStore, SortOrder, StoreError};
use crate::ootd::types::UidKey;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// 帖子仓库
pub struct PostRepository {
    store: Arc<dyn PostStore>,
    config: PostRepositoryConfig,
    listener: Arc<dyn PostListener>,
}

impl PostRepository {
    pub fn new(store: Arc<dyn PostStore>, config: PostRepositoryConfig) -> Self {
        Self {
            store,
            config,
            listener: Arc::new(EmptyPostListener),
        }
    }

    pub fn set_listener(&mut self, listener: Arc<dyn PostListener>) {
        self.listener = listener;
    }

    pub fn config(&self) -> &PostRepositoryConfig {
        &self.config
    }

    /// 全部历史动态，按时间升序
    pub async fn get_feed_for_uids<S: AsRef<str>>(&self, uids: &[S]) -> Vec<Post> {
        let key = UidKey::normalize(uids);
        self.fetch_chunked(&key, None, SortOrder::Ascending).await
    }

    /// 最近时间窗口（默认 24 小时）内的动态，按时间降序
    pub async fn get_recent_feed_for_uids<S: AsRef<str>>(&self, uids: &[S]) -> Vec<Post> {
        let key = UidKey::normalize(uids);
        let since = now_millis().saturating_sub(self.config.recent_window_millis());
        self.fetch_chunked(&key, Some(since), SortOrder::Descending).await
    }

    /// 当前用户自己的全部帖子，按时间降序
    pub async fn get_my_posts(&self) -> Vec<Post> {
        let Some(uid) = self.store.auth_uid() else {
            warn!("[PostRepo] 未登录，无法查询自己的帖子");
            return Vec::new();
        };
        let key = UidKey::normalize([uid]);
        self.fetch_chunked(&key, None, SortOrder::Descending).await
    }

    /// 分片查询并合并
    async fn fetch_chunked(&self, key: &UidKey, since: Option<i64>, order: SortOrder) -> Vec<Post> {
        if key.is_empty() {
            debug!("[PostRepo] 用户 ID 列表为空，跳过查询");
            return Vec::new();
        }

        let chunk_count = key.chunk_count();
        let mut posts = Vec::new();
        for (idx, chunk) in key.chunks().enumerate() {
            let mut query = PostQuery::owners(chunk.to_vec()).order(order);
            if let Some(since) = since {
                query = query.since(since);
            }

            match timeout(self.config.query_timeout, self.store.query(&query)).await {
                Err(_) => {
                    warn!(
                        "[PostRepo] 第 {}/{} 片查询超时（{:?}），返回空结果",
                        idx + 1,
                        chunk_count,
                        self.config.query_timeout
                    );
                    return Vec::new();
                }
                Ok(Err(e)) => {
                    error!(
                        "[PostRepo] 第 {}/{} 片查询失败，返回空结果: {}",
                        idx + 1,
                        chunk_count,
                        e
                    );
                    return Vec::new();
                }
                Ok(Ok(docs)) => {
                    debug!(
                        "[PostRepo] 第 {}/{} 片返回 {} 条文档",
                        idx + 1,
                        chunk_count,
                        docs.len()
                    );
                    posts.extend(docs.iter().filter_map(Post::from_document));
                }
            }
        }

        sort_by_timestamp(&mut posts, order);
        info!(
            "[PostRepo] 合并 {} 个用户的动态，共 {} 片 {} 条",
            key.len(),
            chunk_count,
            posts.len()
        );
        posts
    }

    pub async fn get_post(&self, post_uid: &str) -> Option<Post> {
        match timeout(self.config.query_timeout, self.store.get(post_uid)).await {
            Err(_) => {
                warn!("[PostRepo] 读取帖子 {} 超时", post_uid);
                None
            }
            Ok(Err(e)) => {
                error!("[PostRepo] 读取帖子 {} 失败: {}", post_uid, e);
                None
            }
            Ok(Ok(doc)) => doc.as_ref().and_then(Post::from_document),
        }
    }

    /// 用户今天（本地时区零点之后）是否已经发过帖子；出错时返回 `false`
    pub async fn has_posted_today(&self, user_id: &str) -> bool {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return false;
        }
        let query = PostQuery::owners(vec![user_id.to_string()])
            .since(start_of_local_day_millis())
            .limit(1);
        match timeout(self.config.query_timeout, self.store.query(&query)).await {
            Err(_) => {
                warn!("[PostRepo] 查询 {} 今日发帖状态超时", user_id);
                false
            }
            Ok(Err(e)) => {
                error!("[PostRepo] 查询 {} 今日发帖状态失败: {}", user_id, e);
                false
            }
            Ok(Ok(docs)) => !docs.is_empty(),
        }
    }

    /// 发布帖子
    ///
    /// 写入在独立任务中执行。超时不算失败：任务继续在后台完成（等同离线排队），
    /// 此时返回 `Ok`；其他错误原样向上传递。
    pub async fn add_post(&self, post: &Post) -> Result<()> {
        post.validate()?;
        let doc = post.to_document()?;

        let store = self.store.clone();
        let write = tokio::spawn(async move { store.add(doc).await });
        match timeout(self.config.query_timeout, write).await {
            Err(_) => {
                warn!(
                    "[PostRepo] 发布帖子 {} 超时，写入将在后台继续",
                    post.post_uid
                );
            }
            Ok(Err(join_err)) => {
                return Err(anyhow::Error::new(join_err).context("发布帖子的写入任务异常退出"));
            }
            Ok(Ok(Err(e))) => {
                return Err(anyhow::Error::new(e).context(format!("发布帖子 {} 失败", post.post_uid)));
            }
            Ok(Ok(Ok(()))) => {
                info!("[PostRepo] 帖子 {} 发布成功", post.post_uid);
            }
        }

        self.listener.on_post_added(Self::post_json(post)).await;
        Ok(())
    }

    /// 以当前登录用户身份发布一条新帖子
    pub async fn publish(&self, draft: PostDraft) -> Result<Post> {
        let owner_id = self
            .store
            .auth_uid()
            .map(str::to_string)
            .context("未登录，无法发布帖子")?;

        let post = Post {
            post_uid: generate_post_id(),
            owner_id,
            timestamp: now_millis(),
            description: draft.description,
            items_id: draft.items_id,
            name: draft.name,
            outfit_url: draft.outfit_url,
            user_profile_pic_url: draft.user_profile_pic_url,
            location: draft.location,
        };
        self.add_post(&post).await?;
        Ok(post)
    }

    /// 修改自己的帖子（作者与 ID 不可变）
    pub async fn update_post(&self, post: &Post) -> Result<()> {
        post.validate()?;
        let doc = post.to_document()?;
        timeout(self.config.query_timeout, self.store.update(doc))
            .await
            .map_err(|_| StoreError::Timeout)
            .and_then(|r| r)
            .with_context(|| format!("更新帖子 {} 失败", post.post_uid))?;

        info!("[PostRepo] 帖子 {} 已更新", post.post_uid);
        self.listener.on_post_updated(Self::post_json(post)).await;
        Ok(())
    }

    pub async fn delete_post(&self, post_uid: &str) -> Result<()> {
        timeout(self.config.query_timeout, self.store.delete(post_uid))
            .await
            .map_err(|_| StoreError::Timeout)
            .and_then(|r| r)
            .with_context(|| format!("删除帖子 {} 失败", post_uid))?;

        info!("[PostRepo] 帖子 {} 已删除", post_uid);
        self.listener.on_post_deleted(post_uid.to_string()).await;
        Ok(())
    }

    /// 实时订阅最近时间窗口内的动态
    ///
    /// 窗口下界在订阅建立时确定，之后不再滚动。
    pub fn observe_recent_feed_for_uids<S: AsRef<str>>(&self, uids: &[S]) -> FeedSubscription {
        let key = UidKey::normalize(uids);
        let since = now_millis().saturating_sub(self.config.recent_window_millis());
        observe_recent_feed(self.store.clone(), &key, since)
    }

    fn post_json(post: &Post) -> String {
        serde_json::to_string(post).unwrap_or_default()
    }
}
