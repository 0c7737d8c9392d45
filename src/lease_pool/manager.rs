use crate::credential::{Credential, CredentialSet};
use crate::lease_pool::selector;
use crate::lease_pool::types::{
    DEFAULT_REMAINING, Lease, QuotaState, Released, ServicePool, ServiceStats,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// 归还凭证失败。两种都是调用方错误：请求被拒绝，池保持不变。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReleaseError {
    #[error("未知的 service: {0}")]
    UnknownService(String),

    #[error("凭证不在已配置的凭证列表中")]
    UnknownCredential,
}

/// 凭证租赁池：集中维护每个 service 下各凭证的配额状态，并负责借出/归还。
///
/// service 集合在 `seed` 时确定，之后外层 map 只读；每个 service 一把锁，
/// 借出（判断可借 + 移除）与归还（校验 + 写入）都在同一把锁内完成。
#[derive(Debug)]
pub struct LeasePool {
    registry: Arc<CredentialSet>,
    services: HashMap<String, Mutex<ServicePool>>,
    /// 配置顺序，用于稳定输出统计。
    order: Vec<String>,
}

impl LeasePool {
    /// 为每个 service 放入每个已知凭证，初始 remaining=1、reset=now（立即可用）。
    ///
    /// 只在启动阶段（单线程、开始服务之前）调用一次。
    pub fn seed<I, S>(services: I, registry: Arc<CredentialSet>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::seed_at(services, registry, Utc::now())
    }

    pub fn seed_at<I, S>(services: I, registry: Arc<CredentialSet>, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map: HashMap<String, Mutex<ServicePool>> = HashMap::new();
        let mut order = Vec::new();
        for service in services {
            let service = service.into();
            if map.contains_key(&service) {
                continue;
            }
            let mut pool = ServicePool::default();
            for c in registry.iter() {
                pool.entries
                    .insert(c.consumer_key.clone(), QuotaState::fresh(c.clone(), now));
            }
            order.push(service.clone());
            map.insert(service, Mutex::new(pool));
        }

        Self {
            registry,
            services: map,
            order,
        }
    }

    /// 借出一个可用凭证；没有可用凭证（或 service 未知）时返回 None，池不变。
    pub fn acquire(&self, service: &str) -> Option<Lease> {
        self.acquire_at(service, Utc::now())
    }

    pub fn acquire_at(&self, service: &str, now: DateTime<Utc>) -> Option<Lease> {
        let mut pool = self.lock(service)?;
        let key = selector::select_eligible(&pool.entries, now)?;
        let state = pool.entries.remove(&key)?;
        Some(Lease {
            credential: state.credential,
            remaining: state.remaining,
            reset_at: state.reset_at,
            available: pool.len(),
        })
    }

    /// 归还凭证并回报最新配额；未提供的值分别默认为 remaining=1、reset=now。
    pub fn release(
        &self,
        service: &str,
        credential: Credential,
        remaining: Option<i64>,
        reset_at: Option<DateTime<Utc>>,
    ) -> Result<Released, ReleaseError> {
        self.release_at(service, credential, remaining, reset_at, Utc::now())
    }

    pub fn release_at(
        &self,
        service: &str,
        credential: Credential,
        remaining: Option<i64>,
        reset_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Released, ReleaseError> {
        let Some(mut pool) = self.lock(service) else {
            return Err(ReleaseError::UnknownService(service.to_string()));
        };
        if !self.registry.contains(&credential) {
            tracing::warn!(
                service,
                consumer_key = %credential.masked_key(),
                "拒绝归还未配置的凭证（可能是误用或攻击）"
            );
            return Err(ReleaseError::UnknownCredential);
        }

        let remaining = remaining.unwrap_or(DEFAULT_REMAINING);
        let reset_at = reset_at.unwrap_or(now);
        pool.entries.insert(
            credential.consumer_key.clone(),
            QuotaState {
                remaining,
                reset_at,
                credential,
            },
        );

        Ok(Released {
            remaining,
            reset_at,
            available: pool.len(),
        })
    }

    /// 池内条目数（不含已借出的）；service 未知时为 None。
    pub fn available(&self, service: &str) -> Option<usize> {
        self.lock(service).map(|p| p.len())
    }

    pub fn services(&self) -> &[String] {
        &self.order
    }

    pub fn stats(&self) -> Vec<ServiceStats> {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> Vec<ServiceStats> {
        self.order
            .iter()
            .filter_map(|service| {
                let pool = self.lock(service)?;
                Some(ServiceStats {
                    service: service.clone(),
                    available: pool.len(),
                    eligible: pool.entries.values().filter(|s| s.is_eligible(now)).count(),
                    next_reset: selector::next_reset(&pool.entries, now).map(|t| t.timestamp()),
                })
            })
            .collect()
    }

    // 临界区内只做内存 map 操作，不会留下半写状态，因此锁中毒时直接取回内部数据。
    fn lock(&self, service: &str) -> Option<MutexGuard<'_, ServicePool>> {
        self.services
            .get(service)
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashSet;

    fn cred(n: usize) -> Credential {
        Credential::new(
            format!("ck{n}"),
            format!("cs{n}"),
            format!("at{n}"),
            format!("ats{n}"),
        )
    }

    fn registry(n: usize) -> Arc<CredentialSet> {
        Arc::new(CredentialSet::from_credentials((1..=n).map(cred).collect()).unwrap())
    }

    #[test]
    fn acquire_after_seed_returns_a_credential_for_every_service() {
        let services = ["search/tweets", "users/lookup", "friends/ids"];
        let pool = LeasePool::seed(services, registry(2));
        for s in services {
            let lease = pool.acquire(s).expect("seeded service should lease");
            assert_eq!(lease.remaining, 1);
            assert_eq!(lease.available, 1);
        }
    }

    #[test]
    fn acquire_removes_credential_until_released() {
        let pool = LeasePool::seed(["lookup"], registry(3));
        let first = pool.acquire("lookup").unwrap().credential;

        let mut rest = Vec::new();
        while let Some(l) = pool.acquire("lookup") {
            assert_ne!(l.credential, first);
            rest.push(l.credential);
        }
        assert_eq!(rest.len(), 2);
        assert_eq!(pool.available("lookup"), Some(0));
    }

    #[test]
    fn unknown_service_acquire_is_absent() {
        let pool = LeasePool::seed(["lookup"], registry(1));
        assert!(pool.acquire("nope").is_none());
        assert_eq!(pool.available("nope"), None);
        assert_eq!(pool.available("lookup"), Some(1));
    }

    #[test]
    fn exhausted_release_blocks_until_reset_passes() {
        let now = Utc::now();
        let pool = LeasePool::seed_at(["lookup"], registry(1), now);
        let c = pool.acquire_at("lookup", now).unwrap().credential;

        let reset = now + Duration::seconds(3600);
        pool.release_at("lookup", c.clone(), Some(0), Some(reset), now)
            .unwrap();

        assert!(pool.acquire_at("lookup", now).is_none());
        assert!(pool.acquire_at("lookup", reset).is_none());
        assert_eq!(pool.available("lookup"), Some(1));

        let lease = pool
            .acquire_at("lookup", reset + Duration::seconds(1))
            .unwrap();
        assert_eq!(lease.credential, c);
        assert_eq!(lease.remaining, 0);
    }

    #[test]
    fn exhausted_release_becomes_eligible_after_positive_update() {
        let now = Utc::now();
        let pool = LeasePool::seed_at(["lookup"], registry(1), now);
        let c = pool.acquire_at("lookup", now).unwrap().credential;
        pool.release_at(
            "lookup",
            c.clone(),
            Some(0),
            Some(now + Duration::hours(1)),
            now,
        )
        .unwrap();
        assert!(pool.acquire_at("lookup", now).is_none());

        // 条目仍在池中（未被借出），直接覆盖。
        pool.release_at(
            "lookup",
            c.clone(),
            Some(3),
            Some(now + Duration::hours(1)),
            now,
        )
        .unwrap();
        assert_eq!(pool.available("lookup"), Some(1));
        assert_eq!(pool.acquire_at("lookup", now).unwrap().credential, c);
    }

    #[test]
    fn past_reset_is_immediately_eligible() {
        let now = Utc::now();
        let pool = LeasePool::seed_at(["lookup"], registry(1), now);
        let c = pool.acquire_at("lookup", now).unwrap().credential;
        pool.release_at("lookup", c.clone(), Some(-5), Some(now - Duration::seconds(1)), now)
            .unwrap();
        assert_eq!(pool.acquire_at("lookup", now).unwrap().credential, c);
    }

    #[test]
    fn release_defaults_to_one_remaining_and_now() {
        let now = Utc::now();
        let pool = LeasePool::seed_at(["lookup"], registry(1), now);
        let c = pool.acquire_at("lookup", now).unwrap().credential;
        let released = pool.release_at("lookup", c, None, None, now).unwrap();
        assert_eq!(
            released,
            Released {
                remaining: 1,
                reset_at: now,
                available: 1,
            }
        );
        assert!(pool.acquire_at("lookup", now).is_some());
    }

    #[test]
    fn release_unknown_credential_is_rejected_and_pool_unchanged() {
        let pool = LeasePool::seed(["lookup"], registry(1));
        let c = pool.acquire("lookup").unwrap().credential;

        let mut forged = c.clone();
        forged.access_token_secret = "forged".to_string();
        let err = pool.release("lookup", forged, Some(100), None).unwrap_err();
        assert_eq!(err, ReleaseError::UnknownCredential);
        assert_eq!(pool.available("lookup"), Some(0));
        assert!(pool.acquire("lookup").is_none());
    }

    #[test]
    fn release_unknown_service_is_rejected() {
        let pool = LeasePool::seed(["lookup"], registry(1));
        let err = pool.release("other", cred(1), None, None).unwrap_err();
        assert_eq!(err, ReleaseError::UnknownService("other".to_string()));
        assert_eq!(pool.available("lookup"), Some(1));
    }

    #[test]
    fn services_are_isolated() {
        let pool = LeasePool::seed(["a", "b"], registry(1));
        let c = pool.acquire("a").unwrap().credential;
        assert!(pool.acquire("a").is_none());
        assert_eq!(pool.acquire("b").unwrap().credential, c);
    }

    #[test]
    fn duplicate_services_are_seeded_once() {
        let pool = LeasePool::seed(["a", "b", "a"], registry(1));
        assert_eq!(pool.services(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn lookup_scenario() {
        let now = Utc::now();
        let pool = LeasePool::seed_at(["lookup"], registry(1), now);

        let k1 = pool.acquire_at("lookup", now).unwrap().credential;
        assert_eq!(k1, cred(1));
        assert!(pool.acquire_at("lookup", now).is_none());

        pool.release_at(
            "lookup",
            k1.clone(),
            Some(5),
            Some(now + Duration::seconds(900)),
            now,
        )
        .unwrap();
        let again = pool.acquire_at("lookup", now).unwrap();
        assert_eq!(again.credential, k1);
        assert_eq!(again.remaining, 5);
    }

    #[test]
    fn concurrent_acquire_returns_distinct_credentials() {
        const N: usize = 32;
        let pool = LeasePool::seed(["lookup"], registry(N));

        let leased: Vec<Credential> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..N)
                .map(|_| scope.spawn(|| pool.acquire("lookup")))
                .collect();
            handles
                .into_iter()
                .filter_map(|h| h.join().unwrap())
                .map(|l| l.credential)
                .collect()
        });

        assert_eq!(leased.len(), N);
        let distinct: HashSet<String> = leased.iter().map(|c| c.consumer_key.clone()).collect();
        assert_eq!(distinct.len(), N);
        assert_eq!(pool.available("lookup"), Some(0));
        assert!(pool.acquire("lookup").is_none());
    }

    #[test]
    fn concurrent_acquire_and_release_keep_each_credential_once() {
        const N: usize = 8;
        const ROUNDS: usize = 200;
        let pool = LeasePool::seed(["lookup"], registry(N));

        std::thread::scope(|scope| {
            for _ in 0..N {
                scope.spawn(|| {
                    for _ in 0..ROUNDS {
                        if let Some(l) = pool.acquire("lookup") {
                            pool.release("lookup", l.credential, None, None).unwrap();
                        }
                    }
                });
            }
        });

        assert_eq!(pool.available("lookup"), Some(N));
    }

    #[test]
    fn stats_report_available_and_eligible() {
        let now = Utc::now();
        let pool = LeasePool::seed_at(["a", "b"], registry(3), now);
        let c = pool.acquire_at("a", now).unwrap().credential;
        pool.acquire_at("a", now).unwrap();
        let reset = now + Duration::minutes(10);
        pool.release_at("a", c, Some(0), Some(reset), now).unwrap();

        let stats = pool.stats_at(now);
        assert_eq!(
            stats,
            vec![
                ServiceStats {
                    service: "a".to_string(),
                    available: 2,
                    eligible: 1,
                    next_reset: Some(reset.timestamp()),
                },
                ServiceStats {
                    service: "b".to_string(),
                    available: 3,
                    eligible: 3,
                    next_reset: None,
                },
            ]
        );
    }
}
