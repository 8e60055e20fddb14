//! 用户数据访问层（DAO）

use crate::ootd::user::models::UserProfile;
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

#[derive(Clone)]
pub struct UserDao {
    db: Pool<Sqlite>,
}

impl UserDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    fn row_to_profile(m: SqliteRow) -> UserProfile {
        UserProfile {
            uid: m.get("uid"),
            username: m.get("username"),
            display_name: m.get("display_name"),
            profile_pic_url: m.get("profile_pic_url"),
            create_time: m.get("create_time"),
        }
    }

    pub async fn get_user(&self, uid: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query(
            r#"
            SELECT uid, username, display_name, profile_pic_url, create_time
            FROM users
            WHERE uid = ?
            "#,
        )
        .bind(uid)
        .fetch_optional(&self.db)
        .await
        .context("查询用户失败")?;
        Ok(row.map(Self::row_to_profile))
    }

    /// 用户名是否已被其他用户占用
    pub async fn username_taken(&self, username: &str, except_uid: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ? AND uid != ?")
                .bind(username)
                .bind(except_uid)
                .fetch_one(&self.db)
                .await
                .context("查询用户名失败")?;
        Ok(count > 0)
    }

    /// 插入或更新用户资料（create_time 只在首次插入时写入）
    pub async fn upsert_user(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (uid, username, display_name, profile_pic_url, create_time)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(uid) DO UPDATE SET
                username = excluded.username,
                display_name = excluded.display_name,
                profile_pic_url = excluded.profile_pic_url
            "#,
        )
        .bind(&profile.uid)
        .bind(&profile.username)
        .bind(&profile.display_name)
        .bind(&profile.profile_pic_url)
        .bind(profile.create_time)
        .execute(&self.db)
        .await
        .context("插入或更新用户失败")?;
        Ok(())
    }

    /// 按用户名前缀搜索
    pub async fn search_by_username_prefix(&self, prefix: &str, limit: u32) -> Result<Vec<UserProfile>> {
        let rows = sqlx::query(
            r#"
            SELECT uid, username, display_name, profile_pic_url, create_time
            FROM users
            WHERE substr(username, 1, ?) = ?
            ORDER BY username ASC
            LIMIT ?
            "#,
        )
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .bind(i64::from(limit))
        .fetch_all(&self.db)
        .await
        .context("搜索用户失败")?;

        let users: Vec<UserProfile> = rows.into_iter().map(Self::row_to_profile).collect();
        debug!("[UserDAO] 前缀 {:?} 匹配 {} 个用户", prefix, users.len());
        Ok(users)
    }
}
