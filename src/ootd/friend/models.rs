//! 好友本地模型定义

use serde::{Deserialize, Serialize};

/// 单向好友边：owner 把 friend 加为好友
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEdge {
    #[serde(rename = "ownerUID")]
    pub owner_uid: String,
    #[serde(rename = "friendUID")]
    pub friend_uid: String,
    /// 创建时间（毫秒）
    #[serde(rename = "createTime")]
    pub create_time: i64,
}

/// 从当前用户视角看到的与另一用户的关系
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Relationship {
    None,
    /// 我加了对方，对方未加我
    Outgoing,
    /// 对方加了我，我未加对方
    Incoming,
    Mutual,
}

impl Relationship {
    pub fn from_edges(i_list_them: bool, they_list_me: bool) -> Self {
        match (i_list_them, they_list_me) {
            (true, true) => Relationship::Mutual,
            (true, false) => Relationship::Outgoing,
            (false, true) => Relationship::Incoming,
            (false, false) => Relationship::None,
        }
    }

    pub fn is_mutual(&self) -> bool {
        matches!(self, Relationship::Mutual)
    }
}
