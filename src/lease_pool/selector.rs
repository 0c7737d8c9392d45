//! 选择算法：在满足可借条件的条目中选重置时间最早的一个。
//!
//! 重置时间相同则按 consumer_key 升序（BTreeMap 的遍历顺序），保证结果确定。
//! 重置时间最早的条目，要么窗口早已过去（服务端大概率已刷新配额），要么最先恢复，
//! 优先借出它能让其余凭证的配额留得更久。

use crate::lease_pool::types::QuotaState;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// 返回被选中条目的 key；没有可借条目时返回 None。
pub fn select_eligible(
    entries: &BTreeMap<String, QuotaState>,
    now: DateTime<Utc>,
) -> Option<String> {
    entries
        .iter()
        .filter(|(_, s)| s.is_eligible(now))
        // min_by_key 在相等时返回第一个，即 consumer_key 最小者。
        .min_by_key(|(_, s)| s.reset_at)
        .map(|(k, _)| k.clone())
}

/// 不可借条目中最早的重置时间。
pub fn next_reset(
    entries: &BTreeMap<String, QuotaState>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    entries
        .values()
        .filter(|s| !s.is_eligible(now))
        .map(|s| s.reset_at)
        .min()
}
