use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::types::{ApplicationId, LoanId, UserId};

/// keys of cached aggregates
///
/// the cache is advisory: entries are evicted after every ledger mutation
/// and never read back as ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Loan(LoanId),
    Application(ApplicationId),
    RepaymentSchedule(LoanId),
    UserLoanSummary(UserId),
    DashboardOverview,
    PaymentAnalytics,
    ApplicationStats,
    DailyReport,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Loan(id) => write!(f, "loan_{}", id),
            CacheKey::Application(id) => write!(f, "application_{}", id),
            CacheKey::RepaymentSchedule(id) => write!(f, "loan_repayment_schedule_{}", id),
            CacheKey::UserLoanSummary(id) => write!(f, "user_loan_summary_{}", id),
            CacheKey::DashboardOverview => f.write_str("dashboard_overview"),
            CacheKey::PaymentAnalytics => f.write_str("payment_analytics"),
            CacheKey::ApplicationStats => f.write_str("loan_application_stats"),
            CacheKey::DailyReport => f.write_str("daily_report"),
        }
    }
}

impl CacheKey {
    /// how long an entry under this key stays fresh
    pub fn ttl(&self) -> Duration {
        match self {
            CacheKey::DashboardOverview | CacheKey::ApplicationStats => Duration::from_secs(300),
            CacheKey::UserLoanSummary(_) | CacheKey::PaymentAnalytics => Duration::from_secs(600),
            CacheKey::RepaymentSchedule(_) => Duration::from_secs(1_800),
            CacheKey::DailyReport => Duration::from_secs(86_400),
            CacheKey::Loan(_) | CacheKey::Application(_) => Duration::from_secs(600),
        }
    }
}

/// read-through cache with explicit eviction
pub trait Cache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<serde_json::Value>;

    fn put(&self, key: CacheKey, value: serde_json::Value);

    /// fire-and-forget eviction
    fn invalidate(&self, key: &CacheKey);

    fn invalidate_all(&self, keys: &[CacheKey]) {
        for key in keys {
            self.invalidate(key);
        }
    }
}

/// typed read from a cache; entries that no longer decode are treated as misses
pub fn get_typed<T: DeserializeOwned>(cache: &dyn Cache, key: &CacheKey) -> Option<T> {
    let value = cache.get(key)?;
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(key = %key, error = %e, "discarding undecodable cache entry");
            cache.invalidate(key);
            None
        }
    }
}

/// typed write to a cache; values that fail to encode are skipped
pub fn put_typed<T: Serialize>(cache: &dyn Cache, key: CacheKey, value: &T) {
    match serde_json::to_value(value) {
        Ok(v) => cache.put(key, v),
        Err(e) => debug!(key = %key, error = %e, "skipping cache write"),
    }
}

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// process-local cache with per-key ttl
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if Instant::now() < entry.expires_at {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    fn put(&self, key: CacheKey, value: serde_json::Value) {
        let expires_at = Instant::now() + key.ttl();
        self.entries.write().insert(key, CacheEntry { value, expires_at });
    }

    fn invalidate(&self, key: &CacheKey) {
        if self.entries.write().remove(key).is_some() {
            debug!(key = %key, "cache entry evicted");
        }
    }
}

impl fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCache").field("entries", &self.len()).finish()
    }
}

/// cache that stores nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl Cache for NoCache {
    fn get(&self, _key: &CacheKey) -> Option<serde_json::Value> {
        None
    }

    fn put(&self, _key: CacheKey, _value: serde_json::Value) {}

    fn invalidate(&self, _key: &CacheKey) {}
}
