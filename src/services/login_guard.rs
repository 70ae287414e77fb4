//! Per-username login lockout
//!
//! Counts consecutive failed logins in memory. Once a username reaches the
//! attempt limit it is locked out for a fixed window, during which even a
//! correct password is refused.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct LoginGuardConfig {
    /// Consecutive failures allowed before the lockout starts
    pub max_attempts: u32,
    pub lockout: Duration,
}

struct FailureRecord {
    failures: u32,
    locked_until: Option<Instant>,
    last_failure: Instant,
}

pub struct LoginGuard {
    config: LoginGuardConfig,
    records: Mutex<HashMap<String, FailureRecord>>,
}

impl LoginGuard {
    pub fn new(config: LoginGuardConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    fn key(username: &str) -> String {
        username.trim().to_lowercase()
    }

    /// Whether `username` is currently locked out.
    pub fn is_locked(&self, username: &str) -> bool {
        self.is_locked_at(username, Instant::now())
    }

    fn is_locked_at(&self, username: &str, now: Instant) -> bool {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let key = Self::key(username);

        let expired = match records.get(&key).and_then(|r| r.locked_until) {
            Some(until) if now < until => return true,
            Some(_) => true,
            None => false,
        };
        if expired {
            records.remove(&key);
        }
        false
    }

    /// Record a failed attempt. Returns true if this failure started a lockout.
    pub fn record_failure(&self, username: &str) -> bool {
        self.record_failure_at(username, Instant::now())
    }

    fn record_failure_at(&self, username: &str, now: Instant) -> bool {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let record = records.entry(Self::key(username)).or_insert(FailureRecord {
            failures: 0,
            locked_until: None,
            last_failure: now,
        });

        record.failures += 1;
        record.last_failure = now;

        if record.failures >= self.config.max_attempts && record.locked_until.is_none() {
            record.locked_until = Some(now + self.config.lockout);
            return true;
        }
        false
    }

    /// Forget failures after a successful login.
    /// Returns false, leaving the record untouched, if a lockout is active.
    pub fn record_success(&self, username: &str) -> bool {
        self.record_success_at(username, Instant::now())
    }

    fn record_success_at(&self, username: &str, now: Instant) -> bool {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let key = Self::key(username);

        if records
            .get(&key)
            .and_then(|r| r.locked_until)
            .is_some_and(|until| now < until)
        {
            return false;
        }
        records.remove(&key);
        true
    }

    /// Drop records with no failure in `max_age`.
    /// Call this periodically to prevent memory growth
    pub fn cleanup(&self, max_age: Duration) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        records.retain(|_, r| {
            r.locked_until.is_some_and(|until| now < until)
                || now.duration_since(r.last_failure) < max_age
        });
    }
}
