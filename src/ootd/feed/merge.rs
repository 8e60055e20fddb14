//! 多分片实时结果的合并状态
//!
//! 每个订阅持有一份独立的 [`FeedMergeState`]。各分片的快照依次 `apply`，
//! 返回 `Some` 时表示需要向调用方推送一次合并后的完整列表。

use crate::ootd::post::models::Post;
use crate::ootd::store::{ChangeKind, QuerySnapshot};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Default)]
pub struct FeedMergeState {
    /// 文档 ID -> 帖子
    posts: HashMap<String, Post>,
    /// 已收到过至少一次快照的分片
    initialized: HashSet<usize>,
    chunk_count: usize,
}

impl FeedMergeState {
    pub fn new(chunk_count: usize) -> Self {
        Self {
            posts: HashMap::new(),
            initialized: HashSet::new(),
            chunk_count,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.initialized.len() >= self.chunk_count
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// 应用第 `chunk` 片的一次快照
    ///
    /// 推送条件：本次快照使所有分片首次全部就绪；或者全部就绪之后，
    /// 某个此前已就绪的分片送来了确有变更的快照。就绪之前的变更只更新状态。
    pub fn apply(&mut self, chunk: usize, snapshot: &QuerySnapshot) -> Option<Vec<Post>> {
        for change in &snapshot.changes {
            let id = &change.document.id;
            match change.kind {
                ChangeKind::Added | ChangeKind::Modified => match Post::from_document(&change.document) {
                    Some(post) => {
                        self.posts.insert(id.clone(), post);
                    }
                    None => {
                        // 被改坏的文档不再出现在列表里
                        self.posts.remove(id);
                    }
                },
                ChangeKind::Removed => {
                    self.posts.remove(id);
                }
            }
        }

        let newly_initialized = self.initialized.insert(chunk);
        let emit = if newly_initialized {
            self.is_ready()
        } else {
            self.is_ready() && !snapshot.is_empty()
        };
        debug!(
            "[FeedMerge] 分片 {} 变更 {} 条，已就绪 {}/{}，推送: {}",
            chunk,
            snapshot.changes.len(),
            self.initialized.len(),
            self.chunk_count,
            emit
        );
        emit.then(|| self.snapshot())
    }

    /// 当前合并结果：按时间戳降序，时间相同按帖子 ID 升序
    pub fn snapshot(&self) -> Vec<Post> {
        let mut posts: Vec<Post> = self.posts.values().cloned().collect();
        posts.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.post_uid.cmp(&b.post_uid))
        });
        posts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ootd::store::{DocumentChange, PostDocument};
    use serde_json::json;

    fn change(kind: ChangeKind, id: &str, ts: i64) -> DocumentChange {
        DocumentChange {
            kind,
            document: PostDocument::new(id, json!({"postUID": id, "ownerId": "u", "timestamp": ts})),
        }
    }

    fn snap(changes: Vec<DocumentChange>) -> QuerySnapshot {
        QuerySnapshot { changes }
    }

    fn ids(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|p| p.post_uid.as_str()).collect()
    }

    #[test]
    fn waits_for_every_chunk_before_first_emission() {
        let mut state = FeedMergeState::new(3);
        assert!(state.apply(0, &snap(vec![change(ChangeKind::Added, "a", 1)])).is_none());
        assert!(state.apply(2, &snap(vec![])).is_none());
        let first = state
            .apply(1, &snap(vec![change(ChangeKind::Added, "b", 2)]))
            .expect("all chunks ready");
        assert_eq!(ids(&first), vec!["b", "a"]);
    }

    #[test]
    fn empty_initial_snapshots_still_complete_the_quorum() {
        let mut state = FeedMergeState::new(2);
        assert!(state.apply(0, &snap(vec![])).is_none());
        assert_eq!(state.apply(1, &snap(vec![])), Some(vec![]));
    }

    #[test]
    fn later_changes_emit_once_each() {
        let mut state = FeedMergeState::new(2);
        state.apply(0, &snap(vec![]));
        state.apply(1, &snap(vec![]));

        let out = state.apply(1, &snap(vec![change(ChangeKind::Added, "x", 5)]));
        assert_eq!(out.as_deref().map(ids), Some(vec!["x"]));

        let out = state.apply(0, &snap(vec![change(ChangeKind::Modified, "x", 7)]));
        assert_eq!(out.unwrap()[0].timestamp, 7);

        let out = state.apply(1, &snap(vec![change(ChangeKind::Removed, "x", 7)]));
        assert_eq!(out, Some(vec![]));

        // 已就绪分片的空快照不推送
        assert!(state.apply(0, &snap(vec![])).is_none());
    }

    #[test]
    fn changes_before_quorum_are_kept() {
        let mut state = FeedMergeState::new(2);
        state.apply(0, &snap(vec![change(ChangeKind::Added, "a", 1)]));
        // 分片 0 在分片 1 就绪之前的后续变更：状态更新但不推送
        assert!(state
            .apply(0, &snap(vec![change(ChangeKind::Added, "b", 3)]))
            .is_none());
        let out = state.apply(1, &snap(vec![])).unwrap();
        assert_eq!(ids(&out), vec!["b", "a"]);
    }

    #[test]
    fn ties_break_by_post_id_and_malformed_docs_drop() {
        let mut state = FeedMergeState::new(1);
        let out = state
            .apply(
                0,
                &snap(vec![
                    change(ChangeKind::Added, "b", 1),
                    change(ChangeKind::Added, "a", 1),
                    change(ChangeKind::Added, "c", 2),
                ]),
            )
            .unwrap();
        assert_eq!(ids(&out), vec!["c", "a", "b"]);

        let broken = DocumentChange {
            kind: ChangeKind::Modified,
            document: PostDocument::new("c", json!({"ownerId": "u"})),
        };
        let out = state.apply(0, &snap(vec![broken])).unwrap();
        assert_eq!(ids(&out), vec!["a", "b"]);
    }
}
