//! 好友监听器回调接口

use async_trait::async_trait;

#[async_trait]
pub trait FriendListener: Send + Sync {
    /// 当前用户的好友列表发生变更，参数为好友边的 JSON 数组字符串
    async fn on_friend_list_changed(&self, friends_json: String);
}

/// 默认空实现（无操作）
pub struct EmptyFriendListener;

#[async_trait]
impl FriendListener for EmptyFriendListener {
    async fn on_friend_list_changed(&self, _friends_json: String) {}
}
