use chrono::{DateTime, Utc};
use std::borrow::Cow;

use crate::credential::Credential;

/// 日志等级（DEBUG 环境变量 / -debug 参数）：
/// - off：不输出任何日志
/// - low：每次成功借出/归还输出一行
/// - medium：额外输出 204/400 等未成功的请求
/// - high：额外输出原始请求参数（secret 打码）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl LogLevel {
    pub fn parse(debug: &str) -> Self {
        match debug.trim().to_lowercase().as_str() {
            "off" | "none" => Self::Off,
            "medium" => Self::Medium,
            "high" | "all" | "raw" => Self::High,
            _ => Self::Low,
        }
    }

    pub fn lease_enabled(self) -> bool {
        self >= Self::Low
    }

    pub fn miss_enabled(self) -> bool {
        self >= Self::Medium
    }

    pub fn raw_enabled(self) -> bool {
        self >= Self::High
    }
}

/// 重置时间的日志格式：`2006-01-02 15:04:05 UTC`。
pub fn format_reset(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// secret 打码：保留首尾各 4 个字符；过短则完全隐藏。
pub fn mask_secret(s: &str) -> Cow<'_, str> {
    const KEEP: usize = 4;
    let count = s.chars().count();
    if count <= KEEP * 2 {
        return Cow::Borrowed("***");
    }
    let head: String = s.chars().take(KEEP).collect();
    let tail: String = s.chars().skip(count - KEEP).collect();
    Cow::Owned(format!("{head}***{tail}"))
}

pub fn lease_acquired(
    service: &str,
    credential: &Credential,
    remaining: i64,
    reset_at: DateTime<Utc>,
    bullets: usize,
) {
    tracing::info!(
        "GET key \"{}\" for service \"{}\", remaining: {}, reset: {}, bullets: {}",
        credential.masked_key(),
        service,
        remaining,
        format_reset(reset_at),
        bullets
    );
}

pub fn lease_released(
    service: &str,
    credential: &Credential,
    remaining: i64,
    reset_at: DateTime<Utc>,
    bullets: usize,
) {
    tracing::info!(
        "SET key \"{}\" for service \"{}\", remaining: {}, reset: {}, bullets: {}",
        credential.masked_key(),
        service,
        remaining,
        format_reset(reset_at),
        bullets
    );
}

pub fn lease_miss(service: &str) {
    tracing::info!("GET no usable key for service \"{service}\"");
}

pub fn release_rejected(service: &str, reason: &str) {
    tracing::info!("SET rejected for service \"{service}\": {reason}");
}

/// 原始请求参数：凭证字段打码后输出。
pub fn raw_request(method: &str, path: &str, params: &[(&str, &str)]) {
    let mut out = String::new();
    for &(k, v) in params {
        let v: Cow<'_, str> = match k {
            "consumer_key" | "consumer_secret" | "access_token" | "access_token_secret" => {
                mask_secret(v)
            }
            _ => Cow::Borrowed(v),
        };
        if !out.is_empty() {
            out.push_str(", ");
        }
        out.push_str(k);
        out.push('=');
        out.push_str(&v);
    }
    tracing::info!("[请求] {method} {path} {{{out}}}");
}
