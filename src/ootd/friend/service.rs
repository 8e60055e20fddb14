//! 好友服务层
//!
//! 以当前登录用户的身份维护好友边。写入和对他人好友边的读取先经过访问策略；
//! 列表查询按 SQL 条件只会返回以自己为一端的边。

use crate::ootd::friend::dao::FriendDao;
use crate::ootd::friend::listener::{EmptyFriendListener, FriendListener};
use crate::ootd::friend::models::{FriendEdge, Relationship};
use crate::ootd::policy::{authorize, Decision, FriendSnapshot, Request};
use crate::ootd::serialization::now_millis;
use crate::ootd::store::StoreError;
use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 好友仓库
pub struct FriendRepository {
    auth_uid: String,
    dao: FriendDao,
    listener: Arc<dyn FriendListener>,
}

impl FriendRepository {
    pub fn new(auth_uid: String, dao: FriendDao) -> Self {
        Self::with_listener(auth_uid, dao, Arc::new(EmptyFriendListener))
    }

    pub fn with_listener(auth_uid: String, dao: FriendDao, listener: Arc<dyn FriendListener>) -> Self {
        Self {
            auth_uid,
            dao,
            listener,
        }
    }

    pub fn set_listener(&mut self, listener: Arc<dyn FriendListener>) {
        self.listener = listener;
    }

    fn check(&self, request: Request<'_>) -> Result<(), StoreError> {
        match authorize(Some(&self.auth_uid), &request, &FriendSnapshot::new()) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(StoreError::PermissionDenied(reason)),
        }
    }

    /// 把 friend_uid 加为好友（单向）；对方也加了我时双方即互为好友
    pub async fn add_friend(&self, friend_uid: &str) -> Result<()> {
        let friend_uid = friend_uid.trim();
        if friend_uid.is_empty() {
            bail!("好友 ID 不能为空");
        }
        self.check(Request::WriteFriendEdge {
            owner_uid: &self.auth_uid,
            friend_uid,
        })?;

        if self.dao.add_edge(&self.auth_uid, friend_uid, now_millis()).await? {
            info!("[FriendRepo] {} 添加好友 {}", self.auth_uid, friend_uid);
            self.notify_changed().await;
        } else {
            debug!("[FriendRepo] {} 已经添加过 {}", self.auth_uid, friend_uid);
        }
        Ok(())
    }

    pub async fn remove_friend(&self, friend_uid: &str) -> Result<()> {
        let friend_uid = friend_uid.trim();
        self.check(Request::WriteFriendEdge {
            owner_uid: &self.auth_uid,
            friend_uid,
        })?;
        if self.dao.remove_edge(&self.auth_uid, friend_uid).await? {
            info!("[FriendRepo] {} 删除好友 {}", self.auth_uid, friend_uid);
            self.notify_changed().await;
        }
        Ok(())
    }

    /// 我加过的好友（单向）
    pub async fn get_friends(&self) -> Result<Vec<FriendEdge>> {
        self.dao.get_edges(&self.auth_uid).await
    }

    /// 与我互为好友的用户 ID，动态查询只应使用这个列表
    pub async fn get_mutual_friend_ids(&self) -> Result<Vec<String>> {
        self.dao.get_mutual_friend_ids(&self.auth_uid).await
    }

    /// 加了我但我还没加的用户
    pub async fn get_pending_requests(&self) -> Result<Vec<String>> {
        let followers = self.dao.get_follower_ids(&self.auth_uid).await?;
        let mut pending = Vec::with_capacity(followers.len());
        for uid in followers {
            if !self.dao.has_edge(&self.auth_uid, &uid).await? {
                pending.push(uid);
            }
        }
        Ok(pending)
    }

    pub async fn relationship_with(&self, other_uid: &str) -> Result<Relationship> {
        let other_uid = other_uid.trim();
        // 对方名下的那条边
        self.check(Request::ReadFriendEdge {
            owner_uid: other_uid,
            friend_uid: &self.auth_uid,
        })?;
        let i_list_them = self.dao.has_edge(&self.auth_uid, other_uid).await?;
        let they_list_me = self.dao.has_edge(other_uid, &self.auth_uid).await?;
        Ok(Relationship::from_edges(i_list_them, they_list_me))
    }

    async fn notify_changed(&self) {
        match self.dao.get_edges(&self.auth_uid).await {
            Ok(edges) => {
                if let Ok(json) = serde_json::to_string(&edges) {
                    self.listener.on_friend_list_changed(json).await;
                }
            }
            Err(e) => warn!("[FriendRepo] 读取好友列表失败，跳过回调: {:?}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ootd::db::create_sqlite_pool_with_migration;
    use crate::ootd::policy::DenyReason;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FriendListener for RecordingListener {
        async fn on_friend_list_changed(&self, friends_json: String) {
            self.events.lock().unwrap().push(friends_json);
        }
    }

    async fn repos() -> (FriendRepository, FriendRepository, Arc<RecordingListener>) {
        let pool = create_sqlite_pool_with_migration("sqlite::memory:", 1)
            .await
            .unwrap();
        let listener = Arc::new(RecordingListener::default());
        let alice = FriendRepository::with_listener(
            "alice".into(),
            FriendDao::new(pool.clone()),
            listener.clone(),
        );
        let bob = FriendRepository::new("bob".into(), FriendDao::new(pool));
        (alice, bob, listener)
    }

    #[tokio::test]
    async fn befriending_becomes_mutual_only_when_both_sides_add() -> Result<()> {
        let (alice, bob, listener) = repos().await;

        alice.add_friend("bob").await?;
        assert_eq!(alice.relationship_with("bob").await?, Relationship::Outgoing);
        assert_eq!(bob.relationship_with("alice").await?, Relationship::Incoming);
        assert_eq!(bob.get_pending_requests().await?, vec!["alice"]);
        assert!(alice.get_mutual_friend_ids().await?.is_empty());

        bob.add_friend("alice").await?;
        assert_eq!(alice.relationship_with("bob").await?, Relationship::Mutual);
        assert_eq!(alice.get_mutual_friend_ids().await?, vec!["bob"]);
        assert!(bob.get_pending_requests().await?.is_empty());

        alice.remove_friend("bob").await?;
        assert_eq!(bob.relationship_with("alice").await?, Relationship::Outgoing);

        let events = listener.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].contains("\"friendUID\":\"bob\""));
        assert_eq!(events[1], "[]");
        Ok(())
    }

    #[tokio::test]
    async fn adding_twice_or_self_is_rejected_or_ignored() -> Result<()> {
        let (alice, _, listener) = repos().await;
        let err = alice.add_friend(" alice ").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::PermissionDenied(DenyReason::SelfEdge))
        ));
        assert!(alice.add_friend("  ").await.is_err());
        alice.add_friend("bob").await?;
        alice.add_friend(" bob ").await?;
        assert_eq!(alice.get_friends().await?.len(), 1);
        assert_eq!(listener.events.lock().unwrap().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn signed_out_repository_cannot_touch_edges() -> Result<()> {
        let (alice, _, _) = repos().await;
        alice.add_friend("bob").await?;
        let anonymous = FriendRepository::new(String::new(), alice.dao.clone());

        for err in [
            anonymous.add_friend("bob").await.unwrap_err(),
            anonymous.remove_friend("bob").await.unwrap_err(),
            anonymous.relationship_with("alice").await.unwrap_err(),
        ] {
            assert!(matches!(
                err.downcast_ref::<StoreError>(),
                Some(StoreError::PermissionDenied(DenyReason::Unauthenticated))
            ));
        }
        assert_eq!(alice.relationship_with("bob").await?, Relationship::Outgoing);
        Ok(())
    }
}
