//! 用户资料模型

use serde::{Deserialize, Serialize};

/// 用户公开资料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "uid")]
    pub uid: String,
    /// 用户名（唯一，小写存储）
    #[serde(rename = "username")]
    pub username: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "profilePicURL", default)]
    pub profile_pic_url: String,
    /// 创建时间（毫秒）
    #[serde(rename = "createTime", default)]
    pub create_time: i64,
}

impl UserProfile {
    pub fn new(uid: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            username: username.into(),
            display_name: String::new(),
            profile_pic_url: String::new(),
            create_time: 0,
        }
    }

    /// 帖子上展示的名字：优先显示名，否则用户名
    pub fn shown_name(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.username
        } else {
            &self.display_name
        }
    }
}

/// 规范化用户名：去空白并转小写
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}
