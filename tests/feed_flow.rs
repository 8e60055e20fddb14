//! 端到端流程：好友关系、发帖、动态聚合、实时订阅与访问控制

use anyhow::Result;
use ootd_sdk_core_rust::ootd::store::OotdBackend;
use ootd_sdk_core_rust::{ClientConfig, OotdClient, PostDraft, PostQuery, PostStore, UserProfile};
use std::sync::Once;
use std::time::Duration;
use tokio::time::timeout;

static INIT_LOGGER: Once = Once::new();

fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("info,ootd_sdk_core_rust=debug"))
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer()
            .try_init();
    });
}

async fn shared_backend() -> OotdBackend {
    OotdBackend::open("sqlite::memory:", 1, 256)
        .await
        .expect("in-memory backend")
}

fn client(backend: &OotdBackend, uid: &str) -> OotdClient {
    OotdClient::with_backend(ClientConfig::new(uid), backend.clone())
}

async fn befriend(a: &OotdClient, b: &OotdClient) -> Result<()> {
    a.friends().add_friend(b.user_id()).await?;
    b.friends().add_friend(a.user_id()).await?;
    Ok(())
}

#[tokio::test]
async fn friend_feed_spans_many_chunks_and_updates_live() -> Result<()> {
    init_test_logger();
    let backend = shared_backend().await;
    let me = client(&backend, "me");
    me.users()
        .save_profile(&UserProfile::new("me", "me_style"))
        .await?;

    // 23 个互为好友 + 自己 = 24 个用户，分成 3 片
    let mut friends = Vec::new();
    for i in 0..23 {
        let friend = client(&backend, &format!("f{:02}", i));
        befriend(&me, &friend).await?;
        friends.push(friend);
    }
    assert_eq!(me.friends().get_mutual_friend_ids().await?.len(), 23);

    for friend in friends.iter().step_by(5) {
        friend
            .publish_outfit(PostDraft {
                description: format!("look by {}", friend.user_id()),
                ..Default::default()
            })
            .await?;
    }

    let feed = me.get_friend_feed().await;
    assert_eq!(feed.len(), 5);
    assert!(feed.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

    let history = me.get_friend_history().await;
    assert_eq!(history.len(), 5);
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let mut live = me.observe_friend_feed().await;
    let first = timeout(Duration::from_secs(2), live.next_feed()).await?.unwrap();
    assert_eq!(first.len(), 5);

    let mine = me
        .publish_outfit(PostDraft {
            description: "monochrome".into(),
            items_id: vec!["coat".into(), "boots".into()],
            ..Default::default()
        })
        .await?;
    assert_eq!(mine.name, "me_style");
    let second = timeout(Duration::from_secs(2), live.next_feed()).await?.unwrap();
    assert_eq!(second.len(), 6);
    assert!(second.iter().any(|p| p.post_uid == mine.post_uid));

    me.posts().delete_post(&mine.post_uid).await?;
    let third = timeout(Duration::from_secs(2), live.next_feed()).await?.unwrap();
    assert_eq!(third.len(), 5);

    live.cancel();
    assert_eq!(live.next_feed().await, None);
    Ok(())
}

#[tokio::test]
async fn visibility_follows_mutual_friendship() -> Result<()> {
    init_test_logger();
    let backend = shared_backend().await;
    let alice = client(&backend, "alice");
    let bob = client(&backend, "bob");
    let eve = client(&backend, "eve");

    befriend(&alice, &bob).await?;
    // eve 单向添加 alice，alice 没有回加
    eve.friends().add_friend("alice").await?;
    assert_eq!(alice.friends().get_pending_requests().await?, vec!["eve".to_string()]);

    let post = alice.publish_outfit(PostDraft::default()).await?;

    // bob 可以读到，eve 读不到；读路径的拒绝表现为空结果
    assert_eq!(bob.posts().get_post(&post.post_uid).await, Some(post.clone()));
    assert!(eve.posts().get_post(&post.post_uid).await.is_none());
    assert!(eve.posts().get_feed_for_uids(&["alice"]).await.is_empty());

    // 直接访问存储层可以区分「被拒绝」
    let eve_store = backend.post_store(Some("eve".into()));
    let err = eve_store
        .query(&PostQuery::owners(vec!["alice".to_string()]))
        .await
        .unwrap_err();
    assert!(err.is_permission_denied());

    // 只有作者能修改和删除
    let mut hijacked = post.clone();
    hijacked.description = "bob was here".into();
    assert!(bob.posts().update_post(&hijacked).await.is_err());
    assert!(bob.posts().delete_post(&post.post_uid).await.is_err());
    assert!(alice.posts().get_post(&post.post_uid).await.is_some());

    // 解除好友后 bob 不再能看到
    alice.friends().remove_friend("bob").await?;
    assert!(bob.posts().get_post(&post.post_uid).await.is_none());
    assert!(bob.get_friend_feed().await.iter().all(|p| p.owner_id == "bob"));
    Ok(())
}

#[tokio::test]
async fn posted_today_and_user_search() -> Result<()> {
    init_test_logger();
    let backend = shared_backend().await;
    let alice = client(&backend, "alice");
    let bob = client(&backend, "bob");

    assert!(!alice.has_posted_today().await);
    alice.publish_outfit(PostDraft::default()).await?;
    assert!(alice.has_posted_today().await);
    // bob 与 alice 不是好友，查询被拒绝，结果为 false
    assert!(!bob.posts().has_posted_today("alice").await);

    alice
        .users()
        .save_profile(&UserProfile::new("alice", "alice.k"))
        .await?;
    bob.users()
        .save_profile(&UserProfile::new("bob", "bobby"))
        .await?;
    let found = bob.users().search_users("ALI", 10).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].uid, "alice");
    Ok(())
}
