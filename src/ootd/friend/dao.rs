//! 好友数据访问层（DAO）
//!
//! 负责 `friends` 表（单向好友边）的所有数据库操作。

use crate::ootd::friend::models::FriendEdge;
use crate::ootd::policy::FriendSnapshot;
use anyhow::{Context, Result};
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

/// 好友 DAO（基于 sqlx）
#[derive(Clone)]
pub struct FriendDao {
    db: Pool<Sqlite>,
}

impl FriendDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    fn placeholders(n: usize) -> String {
        vec!["?"; n].join(",")
    }

    /// 新增好友边，已存在时返回 `false`
    pub async fn add_edge(&self, owner_uid: &str, friend_uid: &str, create_time: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO friends (owner_uid, friend_uid, create_time)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(owner_uid)
        .bind(friend_uid)
        .bind(create_time)
        .execute(&self.db)
        .await
        .context("添加好友失败")?;
        Ok(result.rows_affected() > 0)
    }

    /// 删除好友边，返回是否确有删除
    pub async fn remove_edge(&self, owner_uid: &str, friend_uid: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM friends WHERE owner_uid = ? AND friend_uid = ?")
            .bind(owner_uid)
            .bind(friend_uid)
            .execute(&self.db)
            .await
            .context("删除好友失败")?;
        Ok(result.rows_affected() > 0)
    }

    /// owner 加过的所有好友边，按添加时间排序
    pub async fn get_edges(&self, owner_uid: &str) -> Result<Vec<FriendEdge>> {
        let rows = sqlx::query(
            r#"
            SELECT owner_uid, friend_uid, create_time
            FROM friends
            WHERE owner_uid = ?
            ORDER BY create_time ASC, friend_uid ASC
            "#,
        )
        .bind(owner_uid)
        .fetch_all(&self.db)
        .await
        .context("查询好友列表失败")?;

        let edges: Vec<FriendEdge> = rows
            .into_iter()
            .map(|m| FriendEdge {
                owner_uid: m.get("owner_uid"),
                friend_uid: m.get("friend_uid"),
                create_time: m.get("create_time"),
            })
            .collect();
        debug!("[FriendDAO] 用户 {} 共 {} 条好友边", owner_uid, edges.len());
        Ok(edges)
    }

    /// 加了 uid 为好友的所有用户
    pub async fn get_follower_ids(&self, uid: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT owner_uid FROM friends WHERE friend_uid = ? ORDER BY create_time ASC, owner_uid ASC",
        )
        .bind(uid)
        .fetch_all(&self.db)
        .await
        .context("查询关注者列表失败")?;
        Ok(rows
            .into_iter()
            .map(|m| m.get::<String, _>("owner_uid"))
            .collect())
    }

    /// 与 uid 互为好友的用户
    pub async fn get_mutual_friend_ids(&self, uid: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT a.friend_uid AS friend_uid
            FROM friends a
            JOIN friends b ON b.owner_uid = a.friend_uid AND b.friend_uid = a.owner_uid
            WHERE a.owner_uid = ?
            ORDER BY a.create_time ASC, a.friend_uid ASC
            "#,
        )
        .bind(uid)
        .fetch_all(&self.db)
        .await
        .context("查询互为好友列表失败")?;

        let ids: Vec<String> = rows
            .into_iter()
            .map(|m| m.get::<String, _>("friend_uid"))
            .collect();
        debug!("[FriendDAO] 用户 {} 共 {} 个互为好友", uid, ids.len());
        Ok(ids)
    }

    /// 加载 uid 与 others 之间两个方向的好友边，供访问策略判断
    pub async fn load_edges_between(&self, uid: &str, others: &[String]) -> Result<FriendSnapshot> {
        let mut snapshot = FriendSnapshot::new();
        if others.is_empty() {
            return Ok(snapshot);
        }

        let marks = Self::placeholders(others.len());
        let sql = format!(
            r#"
            SELECT owner_uid, friend_uid FROM friends
            WHERE (owner_uid = ? AND friend_uid IN ({marks}))
               OR (friend_uid = ? AND owner_uid IN ({marks}))
            "#
        );

        let mut query = sqlx::query(&sql).bind(uid);
        for other in others {
            query = query.bind(other);
        }
        query = query.bind(uid);
        for other in others {
            query = query.bind(other);
        }

        let rows = query
            .fetch_all(&self.db)
            .await
            .context("加载好友关系失败")?;
        for row in rows {
            snapshot.insert(
                row.get::<String, _>("owner_uid"),
                row.get::<String, _>("friend_uid"),
            );
        }
        Ok(snapshot)
    }

    pub async fn has_edge(&self, owner_uid: &str, friend_uid: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM friends WHERE owner_uid = ? AND friend_uid = ?",
        )
        .bind(owner_uid)
        .bind(friend_uid)
        .fetch_one(&self.db)
        .await
        .context("查询好友关系失败")?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ootd::db::create_sqlite_pool_with_migration;
    use crate::ootd::policy::FriendGraph;

    async fn dao() -> FriendDao {
        FriendDao::new(
            create_sqlite_pool_with_migration("sqlite::memory:", 1)
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn edges_are_one_directional() -> Result<()> {
        let dao = dao().await;
        assert!(dao.add_edge("a", "b", 1).await?);
        assert!(!dao.add_edge("a", "b", 2).await?);
        assert!(dao.has_edge("a", "b").await?);
        assert!(!dao.has_edge("b", "a").await?);
        assert!(dao.get_mutual_friend_ids("a").await?.is_empty());
        assert_eq!(dao.get_follower_ids("b").await?, vec!["a"]);
        Ok(())
    }

    #[tokio::test]
    async fn mutual_requires_both_edges() -> Result<()> {
        let dao = dao().await;
        dao.add_edge("a", "b", 1).await?;
        dao.add_edge("b", "a", 2).await?;
        dao.add_edge("a", "c", 3).await?;
        assert_eq!(dao.get_mutual_friend_ids("a").await?, vec!["b"]);
        assert_eq!(dao.get_mutual_friend_ids("b").await?, vec!["a"]);

        let edges = dao.get_edges("a").await?;
        let friends: Vec<&str> = edges.iter().map(|e| e.friend_uid.as_str()).collect();
        assert_eq!(friends, vec!["b", "c"]);

        assert!(dao.remove_edge("b", "a").await?);
        assert!(dao.get_mutual_friend_ids("a").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn load_edges_between_sees_both_directions() -> Result<()> {
        let dao = dao().await;
        dao.add_edge("a", "b", 1).await?;
        dao.add_edge("b", "a", 1).await?;
        dao.add_edge("c", "a", 1).await?;
        dao.add_edge("d", "e", 1).await?;

        let snapshot = dao
            .load_edges_between("a", &["b".to_string(), "c".to_string(), "d".to_string()])
            .await?;
        assert!(snapshot.are_mutual("a", "b"));
        assert!(snapshot.lists("c", "a"));
        assert!(!snapshot.lists("a", "c"));
        assert!(!snapshot.lists("d", "e"));
        assert_eq!(snapshot.len(), 3);
        Ok(())
    }
}
