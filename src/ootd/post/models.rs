//! 帖子本地模型定义

use crate::ootd::serialization::deserialize_vec_or_null;
use crate::ootd::store::{PostDocument, SortOrder};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// 地理位置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// 穿搭帖子（字段名与后端文档保持一致）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "postUID", default)]
    pub post_uid: String,
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    /// 创建时间（毫秒）
    pub timestamp: i64,
    #[serde(default)]
    pub description: String,
    /// 关联的单品 ID（有序）
    #[serde(rename = "itemsID", default, deserialize_with = "deserialize_vec_or_null")]
    pub items_id: Vec<String>,
    /// 作者显示名
    #[serde(default)]
    pub name: String,
    #[serde(rename = "outfitURL", default)]
    pub outfit_url: String,
    #[serde(rename = "userProfilePicURL", default)]
    pub user_profile_pic_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Post {
    /// 校验不变量：ID、作者非空，时间戳非负
    pub fn validate(&self) -> Result<()> {
        if self.post_uid.trim().is_empty() {
            bail!("帖子 ID 不能为空");
        }
        if self.owner_id.trim().is_empty() {
            bail!("帖子作者不能为空");
        }
        if self.timestamp < 0 {
            bail!("帖子时间戳不能为负数: {}", self.timestamp);
        }
        Ok(())
    }

    /// 从存储文档还原帖子；字段缺失或类型不对时返回 `None` 并记录日志
    pub fn from_document(doc: &PostDocument) -> Option<Self> {
        let mut post: Post = match serde_json::from_value(doc.data.clone()) {
            Ok(post) => post,
            Err(e) => {
                warn!("[Post] 跳过格式错误的文档 {}: {}", doc.id, e);
                return None;
            }
        };
        if post.post_uid.is_empty() {
            post.post_uid = doc.id.clone();
        }
        if let Err(e) = post.validate() {
            warn!("[Post] 跳过不合法的文档 {}: {}", doc.id, e);
            return None;
        }
        Some(post)
    }

    pub fn to_document(&self) -> Result<PostDocument> {
        let data = serde_json::to_value(self).context("序列化帖子失败")?;
        Ok(PostDocument::new(self.post_uid.clone(), data))
    }
}

/// 发布时由调用方提供的内容；ID、作者和时间戳由仓库补齐
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostDraft {
    pub description: String,
    pub items_id: Vec<String>,
    pub name: String,
    pub outfit_url: String,
    pub user_profile_pic_url: String,
    pub location: Option<Location>,
}

/// 按时间戳稳定排序（时间戳相同保持原有相对顺序）
pub fn sort_by_timestamp(posts: &mut [Post], order: SortOrder) {
    match order {
        SortOrder::Ascending => posts.sort_by_key(|p| p.timestamp),
        SortOrder::Descending => posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
    }
}

/// 帖子仓库配置
#[derive(Debug, Clone)]
pub struct PostRepositoryConfig {
    /// 单次分片查询的超时时间
    pub query_timeout: Duration,
    /// 「最近」动态的时间窗口
    pub recent_window: Duration,
}

impl Default for PostRepositoryConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(5),
            recent_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl PostRepositoryConfig {
    pub fn recent_window_millis(&self) -> i64 {
        i64::try_from(self.recent_window.as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(id: &str, ts: i64) -> Post {
        Post {
            post_uid: id.to_string(),
            owner_id: "u1".to_string(),
            timestamp: ts,
            description: String::new(),
            items_id: vec![],
            name: String::new(),
            outfit_url: String::new(),
            user_profile_pic_url: String::new(),
            location: None,
        }
    }

    #[test]
    fn ascending_sort_orders_by_timestamp() {
        let mut posts: Vec<Post> = [5, 1, 3, 2]
            .iter()
            .map(|ts| post(&format!("p{}", ts), *ts))
            .collect();
        sort_by_timestamp(&mut posts, SortOrder::Ascending);
        let ts: Vec<i64> = posts.iter().map(|p| p.timestamp).collect();
        assert_eq!(ts, vec![1, 2, 3, 5]);
        assert!(posts.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn sort_is_stable_on_equal_timestamps() {
        let mut posts = vec![post("a", 2), post("b", 1), post("c", 2), post("d", 1)];
        sort_by_timestamp(&mut posts, SortOrder::Ascending);
        let ids: Vec<&str> = posts.iter().map(|p| p.post_uid.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a", "c"]);

        sort_by_timestamp(&mut posts, SortOrder::Descending);
        let ids: Vec<&str> = posts.iter().map(|p| p.post_uid.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn document_uses_backend_field_names() {
        let mut p = post("p1", 42);
        p.items_id = vec!["shirt".into(), "shoes".into()];
        p.location = Some(Location {
            name: "Seoul".into(),
            latitude: 37.5,
            longitude: 127.0,
        });
        let doc = p.to_document().unwrap();
        assert_eq!(doc.id, "p1");
        assert_eq!(doc.data["postUID"], "p1");
        assert_eq!(doc.data["ownerId"], "u1");
        assert_eq!(doc.data["itemsID"][1], "shoes");
        assert_eq!(doc.data["location"]["name"], "Seoul");
        assert_eq!(Post::from_document(&doc), Some(p));
    }

    #[test]
    fn missing_optional_fields_default_and_id_comes_from_document() {
        let doc = PostDocument::new(
            "doc-1",
            json!({"ownerId": "u2", "timestamp": 7, "itemsID": null}),
        );
        let p = Post::from_document(&doc).expect("post");
        assert_eq!(p.post_uid, "doc-1");
        assert!(p.items_id.is_empty());
        assert!(p.location.is_none());
    }

    #[test]
    fn malformed_documents_are_skipped() {
        let cases = [
            json!({"timestamp": 7}),
            json!({"ownerId": "u2"}),
            json!({"ownerId": "u2", "timestamp": "yesterday"}),
            json!({"ownerId": "u2", "timestamp": 7, "itemsID": "shirt"}),
            json!({"ownerId": "", "timestamp": 7}),
            json!({"ownerId": "u2", "timestamp": -1}),
        ];
        for data in cases {
            assert!(Post::from_document(&PostDocument::new("d", data)).is_none());
        }
    }
}
