//! 实时动态：分片订阅与合并

pub mod merge;
pub mod observer;

pub use merge::FeedMergeState;
pub use observer::{observe_recent_feed, FeedSubscription};
