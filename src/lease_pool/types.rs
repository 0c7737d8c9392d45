use crate::credential::Credential;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// 新条目（启动种子 / 调用方未回报数值时）默认的剩余次数：乐观地假设至少还能调用一次。
pub const DEFAULT_REMAINING: i64 = 1;

/// 单个凭证在某个 service 下的配额状态。
#[derive(Debug, Clone)]
pub struct QuotaState {
    /// 剩余可调用次数，可能 <= 0。
    pub remaining: i64,
    /// 配额窗口重置时间（UTC），过了这个时间即视为配额已被服务端刷新。
    pub reset_at: DateTime<Utc>,
    pub credential: Credential,
}

impl QuotaState {
    /// 启动时的初始状态：立即可用。
    pub fn fresh(credential: Credential, now: DateTime<Utc>) -> Self {
        Self {
            remaining: DEFAULT_REMAINING,
            reset_at: now,
            credential,
        }
    }

    /// 还有剩余次数，或者重置窗口已经过去。
    ///
    /// 重置时间以 unix 秒为单位上报，因此按整秒比较：同一秒内仍视为未重置。
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.remaining > 0 || now.timestamp() > self.reset_at.timestamp()
    }
}

/// 一个 service 当前可出借的凭证，按 consumer_key 存放（同一凭证至多一条）。
///
/// 已借出的凭证不在表内。
#[derive(Debug, Clone, Default)]
pub struct ServicePool {
    pub entries: BTreeMap<String, QuotaState>,
}

impl ServicePool {
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// 借出结果：凭证本身，以及借出前记录的配额状态（用于日志/调用方参考）。
#[derive(Debug, Clone)]
pub struct Lease {
    pub credential: Credential,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
    /// 借出后该 service 池内还剩多少条目。
    pub available: usize,
}

/// 归还成功后写入池中的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Released {
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
    pub available: usize,
}

/// 单个 service 的池状态概览。
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServiceStats {
    pub service: String,
    /// 池内条目数（不含已借出的）。
    pub available: usize,
    /// 当前满足可借条件的条目数。
    pub eligible: usize,
    /// 不可借条目里最早的重置时间（unix 秒）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_reset: Option<i64>,
}
