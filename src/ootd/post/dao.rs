//! 帖子数据访问层（DAO）
//!
//! 负责 `posts` 表的所有数据库操作。文档以 JSON 文本保存，
//! `owner_id` / `timestamp` 单独成列用于过滤和排序。

use crate::ootd::store::{PostDocument, SortOrder};
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, warn};

/// 帖子 DAO（基于 sqlx）
#[derive(Clone)]
pub struct PostDao {
    db: Pool<Sqlite>,
}

impl PostDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    fn placeholders(n: usize) -> String {
        if n == 0 {
            String::new()
        } else {
            vec!["?"; n].join(",")
        }
    }

    fn row_to_document(row: SqliteRow) -> Option<PostDocument> {
        let id: String = row.get("post_uid");
        let raw: String = row.get("document");
        match serde_json::from_str(&raw) {
            Ok(data) => Some(PostDocument::new(id, data)),
            Err(e) => {
                warn!("[PostDAO] 文档 {} 不是合法 JSON，已跳过: {}", id, e);
                None
            }
        }
    }

    /// 按作者集合和时间下界查询帖子
    pub async fn query_posts(
        &self,
        owner_in: &[String],
        since: Option<i64>,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<PostDocument>> {
        if owner_in.is_empty() {
            return Ok(Vec::new());
        }

        let direction = match order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        let mut sql = format!(
            "SELECT post_uid, document FROM posts WHERE owner_id IN ({})",
            Self::placeholders(owner_in.len())
        );
        if since.is_some() {
            sql.push_str(" AND timestamp >= ?");
        }
        sql.push_str(&format!(" ORDER BY timestamp {}, post_uid ASC", direction));
        if limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        for owner in owner_in {
            query = query.bind(owner);
        }
        if let Some(since) = since {
            query = query.bind(since);
        }
        if let Some(limit) = limit {
            query = query.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = query
            .fetch_all(&self.db)
            .await
            .context("查询帖子列表失败")?;

        let docs: Vec<PostDocument> = rows.into_iter().filter_map(Self::row_to_document).collect();
        debug!(
            "[PostDAO] 查询作者 {:?} 的帖子，共 {} 条",
            owner_in,
            docs.len()
        );
        Ok(docs)
    }

    pub async fn get_post(&self, post_uid: &str) -> Result<Option<PostDocument>> {
        let row = sqlx::query("SELECT post_uid, document FROM posts WHERE post_uid = ?")
            .bind(post_uid)
            .fetch_optional(&self.db)
            .await
            .context("查询帖子失败")?;
        Ok(row.and_then(Self::row_to_document))
    }

    /// 插入帖子，ID 已存在时返回 `false`
    pub async fn insert_post(&self, doc: &PostDocument, owner_id: &str, timestamp: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO posts (post_uid, owner_id, timestamp, document)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(owner_id)
        .bind(timestamp)
        .bind(doc.data.to_string())
        .execute(&self.db)
        .await
        .context("插入帖子失败")?;
        Ok(result.rows_affected() > 0)
    }

    /// 插入或覆盖帖子
    pub async fn upsert_post(&self, doc: &PostDocument, owner_id: &str, timestamp: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (post_uid, owner_id, timestamp, document)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(post_uid) DO UPDATE SET
                owner_id = excluded.owner_id,
                timestamp = excluded.timestamp,
                document = excluded.document
            "#,
        )
        .bind(&doc.id)
        .bind(owner_id)
        .bind(timestamp)
        .bind(doc.data.to_string())
        .execute(&self.db)
        .await
        .context("插入或更新帖子失败")?;
        Ok(())
    }

    /// 删除帖子，返回是否确有删除
    pub async fn delete_post(&self, post_uid: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE post_uid = ?")
            .bind(post_uid)
            .execute(&self.db)
            .await
            .context("删除帖子失败")?;
        Ok(result.rows_affected() > 0)
    }

    /// 直接写入原始文档文本（跳过所有校验），用于导入与测试损坏数据
    pub async fn insert_raw(
        &self,
        post_uid: &str,
        owner_id: &str,
        timestamp: i64,
        document: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO posts (post_uid, owner_id, timestamp, document) VALUES (?, ?, ?, ?)",
        )
        .bind(post_uid)
        .bind(owner_id)
        .bind(timestamp)
        .bind(document)
        .execute(&self.db)
        .await
        .context("写入原始帖子文档失败")?;
        Ok(())
    }
}
