pub mod ootd;

// 重新导出常用类型和函数，方便外部使用
pub use ootd::{
    client::{ClientConfig, OotdClient},
    feed::FeedSubscription,
    friend::{FriendEdge, FriendListener, Relationship},
    policy::{authorize, Decision, DenyReason, FriendGraph, FriendSnapshot, Request},
    post::{Location, Post, PostDraft, PostListener, PostRepository},
    store::{OotdBackend, PostQuery, PostStore, StoreError},
    types::UidKey,
    user::UserProfile,
};
