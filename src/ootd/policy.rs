//! 访问策略
//!
//! 存储层在每条读 / 列表 / 订阅 / 写路径上调用 [`authorize`]，
//! 输入为请求者身份、请求描述和好友关系图，输出允许或拒绝。
//! 函数本身无状态、无 IO，好友关系由调用方预先加载。

use std::collections::{HashMap, HashSet};
use std::fmt;

/// 好友关系图（单向边）
pub trait FriendGraph {
    /// `owner` 是否把 `friend` 加为好友
    fn lists(&self, owner: &str, friend: &str) -> bool;

    /// 双方互相加为好友
    fn are_mutual(&self, a: &str, b: &str) -> bool {
        self.lists(a, b) && self.lists(b, a)
    }
}

/// 内存中的好友边快照
#[derive(Debug, Clone, Default)]
pub struct FriendSnapshot {
    /// owner -> 其好友集合
    edges: HashMap<String, HashSet<String>>,
}

impl FriendSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_edges<I, A, B>(edges: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let mut snapshot = Self::new();
        for (owner, friend) in edges {
            snapshot.insert(owner, friend);
        }
        snapshot
    }

    pub fn insert(&mut self, owner: impl Into<String>, friend: impl Into<String>) {
        self.edges
            .entry(owner.into())
            .or_default()
            .insert(friend.into());
    }

    pub fn len(&self) -> usize {
        self.edges.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl FriendGraph for FriendSnapshot {
    fn lists(&self, owner: &str, friend: &str) -> bool {
        self.edges
            .get(owner)
            .is_some_and(|friends| friends.contains(friend))
    }
}

/// 需要授权的请求
#[derive(Debug, Clone, Copy)]
pub enum Request<'a> {
    /// 读取单个帖子
    ReadPost { owner_id: &'a str },
    /// 列表查询或实时订阅；`owner_in` 为 `None` 表示没有作者过滤条件
    ListPosts { owner_in: Option<&'a [String]> },
    CreatePost { new_owner_id: &'a str },
    UpdatePost {
        existing_owner_id: &'a str,
        new_owner_id: &'a str,
    },
    DeletePost { existing_owner_id: &'a str },
    /// 读取 / 搜索用户资料
    ReadUsers,
    WriteUser { uid: &'a str },
    /// 读取一条好友边（`owner_uid` 把 `friend_uid` 加为好友）
    ReadFriendEdge {
        owner_uid: &'a str,
        friend_uid: &'a str,
    },
    /// 新增或删除一条好友边
    WriteFriendEdge {
        owner_uid: &'a str,
        friend_uid: &'a str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    NotOwner,
    NotMutualFriend,
    UnboundedQuery,
    NotParticipant,
    SelfEdge,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DenyReason::Unauthenticated => "request is not authenticated",
            DenyReason::NotOwner => "requester does not own the resource",
            DenyReason::NotMutualFriend => "requester is not a mutual friend of the owner",
            DenyReason::UnboundedQuery => "query must filter by explicit owner ids",
            DenyReason::NotParticipant => "requester is neither end of the friend edge",
            DenyReason::SelfEdge => "a user cannot befriend themselves",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// 评估一次请求
pub fn authorize<G: FriendGraph + ?Sized>(
    auth_uid: Option<&str>,
    request: &Request<'_>,
    graph: &G,
) -> Decision {
    let Some(uid) = auth_uid.filter(|uid| !uid.is_empty()) else {
        return Decision::Deny(DenyReason::Unauthenticated);
    };

    match *request {
        Request::ReadPost { owner_id } => can_see_posts_of(uid, owner_id, graph),
        Request::ListPosts { owner_in: None } => Decision::Deny(DenyReason::UnboundedQuery),
        Request::ListPosts {
            owner_in: Some(owners),
        } => {
            if owners.is_empty() {
                return Decision::Deny(DenyReason::UnboundedQuery);
            }
            // 查询条件必须是「自己或互为好友」的子集，任何一个不满足则整体拒绝
            owners
                .iter()
                .map(|owner| can_see_posts_of(uid, owner, graph))
                .find(|d| !d.is_allowed())
                .unwrap_or(Decision::Allow)
        }
        Request::CreatePost { new_owner_id } => owner_only(uid, new_owner_id),
        Request::UpdatePost {
            existing_owner_id,
            new_owner_id,
        } => match owner_only(uid, existing_owner_id) {
            Decision::Allow => owner_only(uid, new_owner_id),
            deny => deny,
        },
        Request::DeletePost { existing_owner_id } => owner_only(uid, existing_owner_id),
        Request::ReadUsers => Decision::Allow,
        Request::WriteUser { uid: target } => owner_only(uid, target),
        Request::ReadFriendEdge {
            owner_uid,
            friend_uid,
        } => {
            if uid == owner_uid || uid == friend_uid {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotParticipant)
            }
        }
        Request::WriteFriendEdge {
            owner_uid,
            friend_uid,
        } => {
            if owner_uid == friend_uid {
                Decision::Deny(DenyReason::SelfEdge)
            } else {
                owner_only(uid, owner_uid)
            }
        }
    }
}

fn can_see_posts_of<G: FriendGraph + ?Sized>(uid: &str, owner: &str, graph: &G) -> Decision {
    if uid == owner || graph.are_mutual(uid, owner) {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::NotMutualFriend)
    }
}

fn owner_only(uid: &str, owner: &str) -> Decision {
    if uid == owner {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::NotOwner)
    }
}
