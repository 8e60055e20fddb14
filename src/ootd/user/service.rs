//! 用户服务层：资料维护与搜索

use crate::ootd::policy::{authorize, Decision, FriendSnapshot, Request};
use crate::ootd::serialization::now_millis;
use crate::ootd::store::StoreError;
use crate::ootd::user::dao::UserDao;
use crate::ootd::user::models::{normalize_username, UserProfile};
use anyhow::{bail, Result};
use tracing::{error, info};

/// 搜索结果默认条数
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;

pub struct UserRepository {
    auth_uid: String,
    dao: UserDao,
}

impl UserRepository {
    pub fn new(auth_uid: String, dao: UserDao) -> Self {
        Self { auth_uid, dao }
    }

    fn check(&self, request: Request<'_>) -> Result<(), StoreError> {
        match authorize(Some(&self.auth_uid), &request, &FriendSnapshot::new()) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(StoreError::PermissionDenied(reason)),
        }
    }

    /// 保存资料；只能修改自己的资料，用户名唯一
    pub async fn save_profile(&self, profile: &UserProfile) -> Result<UserProfile> {
        self.check(Request::WriteUser { uid: &profile.uid })?;

        let username = normalize_username(&profile.username);
        if username.is_empty() {
            bail!("用户名不能为空");
        }
        if username.chars().any(char::is_whitespace) {
            bail!("用户名不能包含空白字符: {:?}", username);
        }
        if self.dao.username_taken(&username, &profile.uid).await? {
            bail!("用户名已被占用: {}", username);
        }

        let existing = self.dao.get_user(&profile.uid).await?;
        let saved = UserProfile {
            uid: profile.uid.clone(),
            username,
            display_name: profile.display_name.trim().to_string(),
            profile_pic_url: profile.profile_pic_url.trim().to_string(),
            create_time: existing.map(|u| u.create_time).unwrap_or_else(now_millis),
        };
        self.dao.upsert_user(&saved).await?;
        info!("[UserRepo] 已保存用户资料: {} ({})", saved.uid, saved.username);
        Ok(saved)
    }

    pub async fn get_user(&self, uid: &str) -> Result<Option<UserProfile>> {
        self.check(Request::ReadUsers)?;
        self.dao.get_user(uid).await
    }

    pub async fn me(&self) -> Result<Option<UserProfile>> {
        self.get_user(&self.auth_uid).await
    }

    /// 按用户名前缀搜索；出错时返回空列表
    pub async fn search_users(&self, query: &str, limit: u32) -> Vec<UserProfile> {
        let prefix = normalize_username(query);
        if prefix.is_empty() || limit == 0 {
            return Vec::new();
        }
        if let Err(e) = self.check(Request::ReadUsers) {
            error!("[UserRepo] 搜索用户被拒绝: {}", e);
            return Vec::new();
        }
        match self.dao.search_by_username_prefix(&prefix, limit).await {
            Ok(users) => users,
            Err(e) => {
                error!("[UserRepo] 搜索用户失败: {:?}", e);
                Vec::new()
            }
        }
    }
}
