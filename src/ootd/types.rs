//! 通用类型：查询键（用户 ID 集合）与分片

use std::collections::HashSet;

/// 单次 `in` 成员查询最多允许的取值数量（后端限制）
pub const MAX_IN_FILTER_VALUES: usize = 10;

/// 规范化后的用户 ID 集合
///
/// 去除首尾空白、丢弃空串、按首次出现顺序去重。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidKey {
    uids: Vec<String>,
}

impl UidKey {
    /// 从任意字符串列表构建规范化的查询键
    pub fn normalize<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut uids = Vec::new();
        for id in ids {
            let trimmed = id.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            if seen.insert(trimmed.to_string()) {
                uids.push(trimmed.to_string());
            }
        }
        Self { uids }
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.uids
    }

    /// 按 `MAX_IN_FILTER_VALUES` 切片，不会产生空的尾部分片
    pub fn chunks(&self) -> impl Iterator<Item = &[String]> {
        self.uids.chunks(MAX_IN_FILTER_VALUES)
    }

    pub fn chunk_count(&self) -> usize {
        self.uids.len().div_ceil(MAX_IN_FILTER_VALUES)
    }
}
