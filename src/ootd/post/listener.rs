//! 帖子监听器回调接口

use async_trait::async_trait;

#[async_trait]
pub trait PostListener: Send + Sync {
    /// 帖子发布成功（参数为帖子 JSON）
    async fn on_post_added(&self, post_json: String);

    async fn on_post_updated(&self, post_json: String);

    async fn on_post_deleted(&self, post_uid: String);
}

/// 默认空实现（无操作）
pub struct EmptyPostListener;

#[async_trait]
impl PostListener for EmptyPostListener {
    async fn on_post_added(&self, _post_json: String) {}

    async fn on_post_updated(&self, _post_json: String) {}

    async fn on_post_deleted(&self, _post_uid: String) {}
}
