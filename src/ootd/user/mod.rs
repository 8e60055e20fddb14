//! 用户模块：公开资料与用户名搜索

pub mod dao;
pub mod models;
pub mod service;

pub use dao::UserDao;
pub use models::UserProfile;
pub use service::{UserRepository, DEFAULT_SEARCH_LIMIT};
