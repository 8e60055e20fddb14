//! SQLite 数据库工具：统一创建连接池并执行 sqlx 迁移
//!
//! 约定：本 crate 根目录下存在 `migrations/` 目录，存放所有迁移 SQL 文件。
//! 通过 `sqlx::migrate!()` 自动管理 schema 升级。

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::info;

/// 创建 SQLite 连接池并执行所有未执行的迁移
///
/// 内存库（`sqlite::memory:`）只使用一个连接，多个连接在共享缓存模式下会互相锁表
pub async fn create_sqlite_pool_with_migration(
    db_url: &str,
    max_connections: u32,
) -> Result<Pool<Sqlite>> {
    let max_connections = if is_memory_url(db_url) {
        1
    } else {
        max_connections.max(1)
    };

    info!(
        "[DB] 连接 SQLite 数据库: {}, 最大连接数: {}",
        db_url, max_connections
    );

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .with_context(|| format!("连接SQLite数据库失败: {}", db_url))?;

    // 从 `migrations/` 目录读取迁移并执行
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("执行数据库迁移失败")?;

    Ok(pool)
}

fn is_memory_url(db_url: &str) -> bool {
    db_url.contains(":memory:") || db_url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_urls_are_detected() {
        assert!(is_memory_url("sqlite::memory:"));
        assert!(is_memory_url("sqlite:file:feed?mode=memory&cache=shared"));
        assert!(!is_memory_url("sqlite://ootd.db?mode=rwc"));
    }

    #[tokio::test]
    async fn migrations_create_tables() -> Result<()> {
        let pool = create_sqlite_pool_with_migration("sqlite::memory:", 5).await?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('posts', 'friends', 'users')",
        )
        .fetch_one(&pool)
        .await?;
        assert_eq!(count, 3);
        Ok(())
    }
}
