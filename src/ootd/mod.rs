pub mod client;
pub mod db;
pub mod feed;
pub mod friend;
pub mod policy;
pub mod post;
pub mod serialization;
pub mod store;
pub mod types;
pub mod user;

// 重新导出客户端入口
pub use client::{ClientConfig, OotdClient};
