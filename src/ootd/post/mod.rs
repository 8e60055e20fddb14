//! 帖子模块：模型、本地存储访问与动态聚合服务

pub mod dao;
pub mod listener;
pub mod models;
pub mod service;

// 重新导出主要类型
pub use dao::PostDao;
pub use listener::{EmptyPostListener, PostListener};
pub use models::{Location, Post, PostDraft, PostRepositoryConfig};
pub use service::PostRepository;
