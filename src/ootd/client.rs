//! OOTD 客户端核心实现模块
//!
//! [`OotdClient`] 是 SDK 的入口：按 [`ClientConfig`] 打开本地数据库，
//! 以当前用户身份组装帖子、好友和用户三个仓库。

use crate::ootd::feed::FeedSubscription;
use crate::ootd::friend::{FriendDao, FriendListener, FriendRepository};
use crate::ootd::post::{Post, PostDraft, PostListener, PostRepository, PostRepositoryConfig};
use crate::ootd::store::{OotdBackend, PostStore};
use crate::ootd::user::{UserDao, UserRepository};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 当前登录的用户 ID
    pub user_id: String,
    /// 本地 SQLite 数据库 URL
    ///
    /// 例如：`sqlite://ootd.db?mode=rwc`，测试中可用 `sqlite::memory:`
    pub db_url: String,
    /// 连接池最大连接数（内存库固定为 1）
    pub max_connections: u32,
    /// 单次查询 / 写入的超时时间
    pub query_timeout: Duration,
    /// 「最近动态」的时间窗口
    pub recent_window: Duration,
    /// 每个实时订阅在变更 hub 中的缓冲容量，落后超过该数量会收到错误
    pub hub_capacity: usize,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(user_id: impl Into<String>) -> Self {
        let repo_defaults = PostRepositoryConfig::default();
        Self {
            user_id: user_id.into(),
            db_url: "sqlite://ootd.db?mode=rwc".to_string(),
            max_connections: 5,
            query_timeout: repo_defaults.query_timeout,
            recent_window: repo_defaults.recent_window,
            hub_capacity: 256,
        }
    }

    pub fn post_repository_config(&self) -> PostRepositoryConfig {
        PostRepositoryConfig {
            query_timeout: self.query_timeout,
            recent_window: self.recent_window,
        }
    }
}

/// OOTD 客户端
pub struct OotdClient {
    config: ClientConfig,
    backend: OotdBackend,
    posts: PostRepository,
    friends: FriendRepository,
    users: UserRepository,
}

impl OotdClient {
    /// 打开数据库（执行迁移）并以 `config.user_id` 身份登录
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        if config.user_id.trim().is_empty() {
            bail!("用户 ID 不能为空");
        }
        let backend = OotdBackend::open(&config.db_url, config.max_connections, config.hub_capacity)
            .await
            .with_context(|| format!("打开数据库失败: {}", config.db_url))?;
        info!(
            "[Client] 用户 {} 已连接数据库 {}",
            config.user_id, config.db_url
        );
        Ok(Self::with_backend(config, backend))
    }

    /// 复用已有后端（多个用户共享同一份数据时使用）
    pub fn with_backend(config: ClientConfig, backend: OotdBackend) -> Self {
        let store: Arc<dyn PostStore> = Arc::new(backend.post_store(Some(config.user_id.clone())));
        let posts = PostRepository::new(store, config.post_repository_config());
        let friends = FriendRepository::new(
            config.user_id.clone(),
            FriendDao::new(backend.pool().clone()),
        );
        let users = UserRepository::new(config.user_id.clone(), UserDao::new(backend.pool().clone()));
        Self {
            config,
            backend,
            posts,
            friends,
            users,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.config.user_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn backend(&self) -> &OotdBackend {
        &self.backend
    }

    pub fn posts(&self) -> &PostRepository {
        &self.posts
    }

    pub fn friends(&self) -> &FriendRepository {
        &self.friends
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn set_post_listener(&mut self, listener: Arc<dyn PostListener>) {
        self.posts.set_listener(listener);
    }

    pub fn set_friend_listener(&mut self, listener: Arc<dyn FriendListener>) {
        self.friends.set_listener(listener);
    }

    /// 发布穿搭；草稿里没有填写的作者名和头像从当前用户资料补齐
    pub async fn publish_outfit(&self, mut draft: PostDraft) -> Result<Post> {
        if draft.name.trim().is_empty() || draft.user_profile_pic_url.trim().is_empty() {
            match self.users.me().await {
                Ok(Some(profile)) => {
                    if draft.name.trim().is_empty() {
                        draft.name = profile.shown_name().to_string();
                    }
                    if draft.user_profile_pic_url.trim().is_empty() {
                        draft.user_profile_pic_url = profile.profile_pic_url.clone();
                    }
                }
                Ok(None) => debug!("[Client] 用户 {} 尚未保存资料", self.config.user_id),
                Err(e) => warn!("[Client] 读取用户资料失败，按草稿原样发布: {:?}", e),
            }
        }
        self.posts.publish(draft).await
    }

    /// 动态范围：自己和所有互为好友的用户
    async fn feed_uids(&self) -> Vec<String> {
        let mut uids = vec![self.config.user_id.clone()];
        match self.friends.get_mutual_friend_ids().await {
            Ok(friends) => uids.extend(friends),
            Err(e) => warn!("[Client] 读取好友列表失败，只显示自己的动态: {:?}", e),
        }
        uids
    }

    /// 最近 24 小时的好友动态（时间降序）
    pub async fn get_friend_feed(&self) -> Vec<Post> {
        let uids = self.feed_uids().await;
        self.posts.get_recent_feed_for_uids(&uids).await
    }

    /// 好友动态的全部历史（时间升序）
    pub async fn get_friend_history(&self) -> Vec<Post> {
        let uids = self.feed_uids().await;
        self.posts.get_feed_for_uids(&uids).await
    }

    /// 实时订阅好友动态；好友列表在订阅建立时确定
    pub async fn observe_friend_feed(&self) -> FeedSubscription {
        let uids = self.feed_uids().await;
        self.posts.observe_recent_feed_for_uids(&uids)
    }

    pub async fn has_posted_today(&self) -> bool {
        self.posts.has_posted_today(&self.config.user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ootd::user::UserProfile;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn clients(uids: &[&str]) -> Vec<OotdClient> {
        let backend = OotdBackend::open("sqlite::memory:", 1, 64).await.unwrap();
        uids.iter()
            .map(|uid| OotdClient::with_backend(ClientConfig::new(*uid), backend.clone()))
            .collect()
    }

    #[test]
    fn config_defaults() {
        let config = ClientConfig::new("u1");
        assert_eq!(config.query_timeout, Duration::from_secs(5));
        assert_eq!(config.recent_window, Duration::from_secs(86_400));
        assert_eq!(config.post_repository_config().recent_window_millis(), 86_400_000);
    }

    #[tokio::test]
    async fn connect_rejects_blank_user() {
        let mut config = ClientConfig::new("  ");
        config.db_url = "sqlite::memory:".into();
        assert!(OotdClient::connect(config).await.is_err());
    }

    #[tokio::test]
    async fn publish_fills_author_from_profile() -> Result<()> {
        let clients = clients(&["alice"]).await;
        let alice = &clients[0];
        let mut profile = UserProfile::new("alice", "alice");
        profile.display_name = "Alice".into();
        profile.profile_pic_url = "https://img/alice.png".into();
        alice.users().save_profile(&profile).await?;

        let post = alice
            .publish_outfit(PostDraft {
                description: "linen".into(),
                ..Default::default()
            })
            .await?;
        assert_eq!(post.owner_id, "alice");
        assert_eq!(post.name, "Alice");
        assert_eq!(post.user_profile_pic_url, "https://img/alice.png");
        assert!(alice.has_posted_today().await);
        Ok(())
    }

    #[tokio::test]
    async fn friend_feed_only_includes_mutual_friends() -> Result<()> {
        let clients = clients(&["alice", "bob", "carol"]).await;
        let (alice, bob, carol) = (&clients[0], &clients[1], &clients[2]);
        alice.friends().add_friend("bob").await?;
        bob.friends().add_friend("alice").await?;
        // carol 单向添加 alice
        carol.friends().add_friend("alice").await?;

        bob.publish_outfit(PostDraft::default()).await?;
        carol.publish_outfit(PostDraft::default()).await?;
        alice.publish_outfit(PostDraft::default()).await?;

        let owners: Vec<String> = alice
            .get_friend_feed()
            .await
            .into_iter()
            .map(|p| p.owner_id)
            .collect();
        assert_eq!(owners.len(), 2);
        assert!(owners.contains(&"alice".to_string()));
        assert!(owners.contains(&"bob".to_string()));

        let carol_feed = carol.get_friend_feed().await;
        assert!(carol_feed.iter().all(|p| p.owner_id == "carol"));
        Ok(())
    }

    #[tokio::test]
    async fn observe_friend_feed_sees_new_posts() -> Result<()> {
        let clients = clients(&["alice", "bob"]).await;
        let (alice, bob) = (&clients[0], &clients[1]);
        alice.friends().add_friend("bob").await?;
        bob.friends().add_friend("alice").await?;

        let mut feed = alice.observe_friend_feed().await;
        let first = timeout(Duration::from_secs(2), feed.next_feed()).await?;
        assert_eq!(first, Some(vec![]));

        let post = bob.publish_outfit(PostDraft::default()).await?;
        let next = timeout(Duration::from_secs(2), feed.next_feed()).await?.unwrap();
        assert_eq!(next, vec![post]);
        Ok(())
    }
}
