//! 好友模块
//!
//! 好友关系以单向边存储，双方互相添加才视为互为好友。

pub mod dao;
pub mod listener;
pub mod models;
pub mod service;

// 重新导出主要类型
pub use dao::FriendDao;
pub use listener::{EmptyFriendListener, FriendListener};
pub use models::{FriendEdge, Relationship};
pub use service::FriendRepository;
