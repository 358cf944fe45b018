/// Refresh Token Registry
///
/// A per-user, fixed-capacity FIFO of the refresh tokens that may still be
/// exchanged. Only SHA-256 digests of token strings are kept; membership is
/// exact-string equality through the digest.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

/// Hash a refresh token using SHA-256
///
/// Never store plaintext tokens.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One honourable refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn new(token: &str) -> Self {
        Self::issued_at(token, Utc::now())
    }

    pub fn issued_at(token: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            token_hash: hash_token(token),
            created_at,
        }
    }

    pub fn matches(&self, token: &str) -> bool {
        self.token_hash == hash_token(token)
    }

    /// Records disappear once the retention window has passed, whether or
    /// not the token inside was ever used.
    pub fn is_retained(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.created_at + retention > now
    }
}

/// Bounded FIFO of refresh token records, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRegistry {
    capacity: usize,
    records: VecDeque<RefreshTokenRecord>,
}

impl TokenRegistry {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    /// Rebuild from persisted records (oldest first), trimming to capacity
    pub fn from_records(
        capacity: usize,
        records: impl IntoIterator<Item = RefreshTokenRecord>,
    ) -> Self {
        let mut registry = Self::new(capacity);
        for record in records {
            registry.insert(record);
        }
        registry
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &RefreshTokenRecord> {
        self.records.iter()
    }

    /// Append a record, evicting the oldest one first when full.
    ///
    /// Returns the evicted record, if any.
    pub fn insert(&mut self, record: RefreshTokenRecord) -> Option<RefreshTokenRecord> {
        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        evicted
    }

    pub fn contains(&self, token: &str) -> bool {
        let digest = hash_token(token);
        self.records.iter().any(|r| r.token_hash == digest)
    }

    /// Drop every record for `token`. Absent tokens are not an error.
    pub fn remove(&mut self, token: &str) -> bool {
        let digest = hash_token(token);
        let before = self.records.len();
        self.records.retain(|r| r.token_hash != digest);
        self.records.len() != before
    }

    /// Swap `old` for `new` in one step.
    ///
    /// Nothing changes unless `old` is currently registered, so a token can
    /// be exchanged at most once.
    pub fn replace(&mut self, old: &str, new: RefreshTokenRecord) -> bool {
        if !self.remove(old) {
            return false;
        }
        self.insert(new);
        true
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Remove records past the retention window; returns how many went
    pub fn prune_expired(&mut self, now: DateTime<Utc>, retention: Duration) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.is_retained(now, retention));
        before - self.records.len()
    }
}
