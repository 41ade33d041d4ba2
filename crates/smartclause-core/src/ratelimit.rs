//! Sliding-window log rate limiter.
//!
//! Every caller identifier keeps the timestamps of its admitted requests.
//! A request is admitted when the number of timestamps inside each trailing
//! window (one minute, one hour, one day) is below that window's limit;
//! admitted requests are recorded, rejected ones are not.
//!
//! The table of identifiers is an [`LruCache`] ordered by last write: reads
//! use `peek` and never reorder it. An entry expires a fixed time after its
//! last write, and when the table is full the least recently written entry
//! is evicted.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Timestamps older than this are never counted and are pruned on access.
const RETENTION_HOURS: i64 = 25;

/// Per-window request ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

/// Request counts per trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowCounts {
    pub minute: u32,
    pub hour: u32,
    pub day: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub enabled: bool,
    pub anonymous: WindowLimits,
    pub authenticated: WindowLimits,
    /// Entries not written for this long are dropped.
    pub expire_after: Duration,
    pub max_entries: usize,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            anonymous: WindowLimits {
                per_minute: 10,
                per_hour: 50,
                per_day: 200,
            },
            authenticated: WindowLimits {
                per_minute: 60,
                per_hour: 500,
                per_day: 2000,
            },
            expire_after: Duration::minutes(60),
            max_entries: 10_000,
        }
    }
}

impl RateLimitPolicy {
    pub fn limits_for(&self, authenticated: bool) -> WindowLimits {
        if authenticated {
            self.authenticated
        } else {
            self.anonymous
        }
    }
}

/// Outcome of [`RateLimiter::check`].
///
/// When allowed, `counts` includes the request just recorded. When denied,
/// `counts` is the usage that caused the rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub counts: WindowCounts,
    pub limits: WindowLimits,
}

impl Decision {
    pub fn remaining(&self) -> WindowCounts {
        remaining(self.limits, self.counts)
    }
}

fn remaining(limits: WindowLimits, used: WindowCounts) -> WindowCounts {
    WindowCounts {
        minute: limits.per_minute.saturating_sub(used.minute),
        hour: limits.per_hour.saturating_sub(used.hour),
        day: limits.per_day.saturating_sub(used.day),
    }
}

/// Snapshot of the identifier table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    pub size: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Entry {
    timestamps: VecDeque<DateTime<Utc>>,
    last_write: DateTime<Utc>,
}

impl Entry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            timestamps: VecDeque::new(),
            last_write: now,
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let horizon = now - Duration::hours(RETENTION_HOURS);
        while matches!(self.timestamps.front(), Some(ts) if *ts <= horizon) {
            self.timestamps.pop_front();
        }
    }

    fn counts(&self, now: DateTime<Utc>) -> WindowCounts {
        let minute = now - Duration::minutes(1);
        let hour = now - Duration::hours(1);
        let day = now - Duration::days(1);
        let mut counts = WindowCounts::default();
        for ts in self.timestamps.iter().rev() {
            if *ts <= day {
                break;
            }
            counts.day += 1;
            if *ts > hour {
                counts.hour += 1;
            }
            if *ts > minute {
                counts.minute += 1;
            }
        }
        counts
    }
}

struct Table {
    entries: LruCache<String, Entry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Thread-safe sliding-window limiter keyed by caller identifier.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    table: Mutex<Table>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        let capacity = NonZeroUsize::new(policy.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            policy,
            table: Mutex::new(Table {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit or reject one request for `identifier` at `now`.
    pub fn check(&self, identifier: &str, authenticated: bool, now: DateTime<Utc>) -> Decision {
        let limits = self.policy.limits_for(authenticated);
        if !self.policy.enabled {
            return Decision {
                allowed: true,
                counts: WindowCounts::default(),
                limits,
            };
        }

        let mut guard = self.lock();
        let table = &mut *guard;
        self.expire_stale(table, identifier, now);

        if table.entries.contains(identifier) {
            table.hits += 1;
        } else {
            table.misses += 1;
            self.drop_expired_tail(table, now);
            if let Some((evicted, _)) = table.entries.push(identifier.to_string(), Entry::new(now)) {
                table.evictions += 1;
                debug!(evicted = %evicted, size = table.entries.len(), "rate limit table full, evicted oldest entry");
            }
        }

        let Some(entry) = table.entries.peek_mut(identifier) else {
            return Decision {
                allowed: true,
                counts: WindowCounts::default(),
                limits,
            };
        };
        entry.prune(now);
        let counts = entry.counts(now);

        if counts.minute >= limits.per_minute
            || counts.hour >= limits.per_hour
            || counts.day >= limits.per_day
        {
            return Decision {
                allowed: false,
                counts,
                limits,
            };
        }

        entry.timestamps.push_back(now);
        entry.last_write = now;
        table.entries.promote(identifier);
        Decision {
            allowed: true,
            counts: WindowCounts {
                minute: counts.minute + 1,
                hour: counts.hour + 1,
                day: counts.day + 1,
            },
            limits,
        }
    }

    /// Current usage without recording a request.
    pub fn usage(&self, identifier: &str, now: DateTime<Utc>) -> WindowCounts {
        let mut guard = self.lock();
        let table = &mut *guard;
        self.expire_stale(table, identifier, now);
        table
            .entries
            .peek(identifier)
            .map(|e| e.counts(now))
            .unwrap_or_default()
    }

    pub fn remaining(&self, identifier: &str, authenticated: bool, now: DateTime<Utc>) -> WindowCounts {
        let limits = self.policy.limits_for(authenticated);
        if !self.policy.enabled {
            return WindowCounts {
                minute: limits.per_minute,
                hour: limits.per_hour,
                day: limits.per_day,
            };
        }
        remaining(limits, self.usage(identifier, now))
    }

    /// Give back the most recently recorded request. Returns whether a
    /// timestamp was removed.
    pub fn refund(&self, identifier: &str) -> bool {
        let mut table = self.lock();
        table
            .entries
            .peek_mut(identifier)
            .and_then(|e| e.timestamps.pop_back())
            .is_some()
    }

    pub fn clear(&self, identifier: &str) {
        self.lock().entries.pop(identifier);
    }

    pub fn stats(&self) -> LimiterStats {
        let table = self.lock();
        LimiterStats {
            size: table.entries.len(),
            max_entries: self.policy.max_entries,
            hits: table.hits,
            misses: table.misses,
            evictions: table.evictions,
        }
    }

    fn is_stale(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        now - entry.last_write >= self.policy.expire_after
    }

    fn expire_stale(&self, table: &mut Table, identifier: &str, now: DateTime<Utc>) {
        let stale = table
            .entries
            .peek(identifier)
            .is_some_and(|e| self.is_stale(e, now));
        if stale {
            table.entries.pop(identifier);
        }
    }

    /// Pop expired entries from the least recently written end. Stops at the
    /// first live entry, so the cost is proportional to what expired.
    fn drop_expired_tail(&self, table: &mut Table, now: DateTime<Utc>) {
        while table
            .entries
            .peek_lru()
            .is_some_and(|(_, e)| self.is_stale(e, now))
        {
            table.entries.pop_lru();
            table.evictions += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight_policy() -> RateLimitPolicy {
        RateLimitPolicy {
            anonymous: WindowLimits {
                per_minute: 3,
                per_hour: 5,
                per_day: 6,
            },
            expire_after: Duration::hours(48),
            ..RateLimitPolicy::default()
        }
    }

    #[test]
    fn test_admits_exactly_up_to_minute_limit() {
        let limiter = RateLimiter::new(tight_policy());
        let now = Utc::now();
        for i in 1..=3 {
            let d = limiter.check("anon:a", false, now);
            assert!(d.allowed, "request {} should pass", i);
            assert_eq!(d.counts.minute, i);
        }
        let denied = limiter.check("anon:a", false, now);
        assert!(!denied.allowed);
        assert_eq!(denied.counts.minute, 3);
        assert_eq!(denied.remaining().minute, 0);
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(tight_policy());
        let t0 = Utc::now();
        for _ in 0..3 {
            assert!(limiter.check("id", false, t0).allowed);
        }
        assert!(!limiter.check("id", false, t0 + Duration::seconds(59)).allowed);
        // one minute later the minute window is empty again, hour still counts
        let later = t0 + Duration::seconds(61);
        let d = limiter.check("id", false, later);
        assert!(d.allowed);
        assert_eq!(d.counts.minute, 1);
        assert_eq!(d.counts.hour, 4);
    }

    #[test]
    fn test_hour_and_day_limits() {
        let limiter = RateLimiter::new(tight_policy());
        let t0 = Utc::now();
        for i in 0..5 {
            assert!(limiter.check("id", false, t0 + Duration::minutes(i * 2)).allowed);
        }
        // hour ceiling of 5 reached
        assert!(!limiter.check("id", false, t0 + Duration::minutes(20)).allowed);
        // after the hour one more fits before the day ceiling of 6
        assert!(limiter.check("id", false, t0 + Duration::minutes(90)).allowed);
        assert!(!limiter.check("id", false, t0 + Duration::minutes(200)).allowed);
        // a day later everything has aged out
        assert!(limiter.check("id", false, t0 + Duration::hours(25)).allowed);
    }

    #[test]
    fn test_identifiers_are_isolated_and_tiers_differ() {
        let limiter = RateLimiter::new(tight_policy());
        let now = Utc::now();
        for _ in 0..3 {
            limiter.check("anon:a", false, now);
        }
        assert!(!limiter.check("anon:a", false, now).allowed);
        assert!(limiter.check("anon:b", false, now).allowed);
        let auth = limiter.check("auth:u", true, now);
        assert!(auth.allowed);
        assert_eq!(auth.limits.per_minute, 60);
    }

    #[test]
    fn test_refund_frees_a_slot() {
        let limiter = RateLimiter::new(tight_policy());
        let now = Utc::now();
        for _ in 0..3 {
            limiter.check("id", false, now);
        }
        assert!(limiter.refund("id"));
        assert_eq!(limiter.usage("id", now).minute, 2);
        assert!(limiter.check("id", false, now).allowed);
        assert!(!limiter.refund("missing"));
    }

    #[test]
    fn test_disabled_admits_everything() {
        let limiter = RateLimiter::new(RateLimitPolicy {
            enabled: false,
            ..tight_policy()
        });
        let now = Utc::now();
        for _ in 0..100 {
            let d = limiter.check("id", false, now);
            assert!(d.allowed);
            assert_eq!(d.counts, WindowCounts::default());
        }
        assert_eq!(limiter.remaining("id", false, now).minute, 3);
    }

    #[test]
    fn test_clear_and_remaining() {
        let limiter = RateLimiter::new(tight_policy());
        let now = Utc::now();
        limiter.check("id", false, now);
        assert_eq!(
            limiter.remaining("id", false, now),
            WindowCounts {
                minute: 2,
                hour: 4,
                day: 5
            }
        );
        limiter.clear("id");
        assert_eq!(limiter.usage("id", now), WindowCounts::default());
    }

    #[test]
    fn test_entries_expire_after_write_and_table_is_bounded() {
        let limiter = RateLimiter::new(RateLimitPolicy {
            expire_after: Duration::minutes(60),
            max_entries: 2,
            ..tight_policy()
        });
        let t0 = Utc::now();
        for _ in 0..3 {
            limiter.check("a", false, t0);
        }
        assert!(!limiter.check("a", false, t0).allowed);
        // idle past the expiry: the entry starts over
        assert!(limiter.check("a", false, t0 + Duration::minutes(61)).allowed);

        limiter.check("b", false, t0 + Duration::minutes(62));
        limiter.check("c", false, t0 + Duration::minutes(63));
        let stats = limiter.stats();
        assert_eq!(stats.size, 2);
        assert!(stats.evictions >= 1);
        assert_eq!(limiter.usage("a", t0 + Duration::minutes(63)), WindowCounts::default());
    }

    #[test]
    fn test_reads_and_denials_do_not_reorder_eviction() {
        let limiter = RateLimiter::new(RateLimitPolicy {
            max_entries: 2,
            ..tight_policy()
        });
        let t0 = Utc::now();
        for _ in 0..3 {
            limiter.check("a", false, t0);
        }
        limiter.check("b", false, t0 + Duration::seconds(1));
        // neither a read nor a rejected request counts as a write for "a"
        assert_eq!(limiter.usage("a", t0 + Duration::seconds(2)).minute, 3);
        assert!(!limiter.check("a", false, t0 + Duration::seconds(3)).allowed);

        limiter.check("c", false, t0 + Duration::seconds(4));
        let now = t0 + Duration::seconds(5);
        assert_eq!(limiter.usage("a", now), WindowCounts::default());
        assert_eq!(limiter.usage("b", now).minute, 1);
        assert_eq!(limiter.usage("c", now).minute, 1);
        assert_eq!(limiter.stats().evictions, 1);
    }

    #[test]
    fn test_full_table_of_fresh_callers_stays_bounded() {
        let limiter = RateLimiter::new(RateLimitPolicy {
            max_entries: 100,
            ..tight_policy()
        });
        let now = Utc::now();
        for i in 0..2_000 {
            assert!(limiter.check(&format!("anon:{}", i), false, now).allowed);
        }
        let stats = limiter.stats();
        assert_eq!(stats.size, 100);
        assert_eq!(stats.misses, 2_000);
        assert_eq!(stats.evictions, 1_900);
        assert_eq!(limiter.usage("anon:1999", now).minute, 1);
        assert_eq!(limiter.usage("anon:0", now), WindowCounts::default());
    }
}
