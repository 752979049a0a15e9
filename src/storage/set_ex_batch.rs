//! Batched expiration-touching mutations on one hash (C8)
//!
//! `HEXPIRE`/`HPEXPIRE`-family and `HSET`-with-many-fields commands touch
//! several fields of the same hash in one call. Without batching, each
//! touched field's TTL change would independently remove-and-reinsert the
//! hash in the database-wide expiry index (C6); `SetExBatch` defers that to
//! a single `done()` call so C6 churn is proportional to commands, not
//! fields.

use bytes::Bytes;

use super::bucket_set::BucketSet;
use super::cond::{ExpireSetCond, FieldSetCond, SetExRes};
use super::field::{Field, INVALID};
use super::hash::Hash;
use super::listpack::Value;

/// `max(4s, BUCKET_WIDTH_MS)`; sub-threshold min-expire drift is not worth
/// reshuffling C6 for.
pub const HASH_NEW_EXPIRE_DIFF_THRESHOLD: u64 = {
    const BUCKET_WIDTH_MS: u64 = super::bucket_set::BUCKET_WIDTH_MS;
    if BUCKET_WIDTH_MS > 4_000 {
        BUCKET_WIDTH_MS
    } else {
        4_000
    }
};

/// Per-field outcome, matching spec.md §4.6 step 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyRes {
    Ok,
    NoField,
    NoConditionMet,
    Deleted,
    /// Value-only update of an existing field (no TTL touched).
    Updated,
}

/// One batched pass over a hash's fields. Borrows the hash and the
/// database-wide expiry index (C6) for its lifetime; `done()` must be
/// called exactly once to commit the C6 update.
pub struct SetExBatch<'a> {
    key: Bytes,
    hash: &'a mut Hash,
    hash_buckets: &'a mut BucketSet<Bytes>,
    cond_exp: ExpireSetCond,
    min_before: u64,
    min_seen_fields: u64,
    deleted: u32,
    updated: u32,
    touched: bool,
}

impl<'a> SetExBatch<'a> {
    pub fn new(
        key: Bytes,
        hash: &'a mut Hash,
        hash_buckets: &'a mut BucketSet<Bytes>,
        cond_exp: ExpireSetCond,
    ) -> Self {
        let min_before = hash.min_expire();
        Self {
            key,
            hash,
            hash_buckets,
            cond_exp,
            min_before,
            min_seen_fields: INVALID,
            deleted: 0,
            updated: 0,
            touched: false,
        }
    }

    fn note_seen(&mut self, prior_ttl: u64, new_ttl: u64) {
        self.min_seen_fields = self.min_seen_fields.min(prior_ttl).min(new_ttl);
    }

    /// Sets `field`'s TTL to `expire_at` under `self.cond_exp`.
    pub fn apply_ttl(&mut self, field: &[u8], expire_at: u64, now: u64) -> ApplyRes {
        let prior_ttl = self.hash.ttl_of(field);
        let res = self.hash.set_ttl(&self.key, field, expire_at, now, self.cond_exp);
        match res {
            SetExRes::NoField => ApplyRes::NoField,
            SetExRes::NoConditionMet => ApplyRes::NoConditionMet,
            SetExRes::Deleted => {
                self.touched = true;
                self.deleted += 1;
                self.note_seen(prior_ttl, INVALID);
                ApplyRes::Deleted
            }
            SetExRes::Ok => {
                self.touched = true;
                self.updated += 1;
                self.note_seen(prior_ttl, expire_at);
                ApplyRes::Ok
            }
        }
    }

    /// Clears `field`'s TTL. Returns `NoField` if absent, `NoConditionMet`
    /// if it had no TTL to begin with (mirrors `HPERSIST`'s `NO_TTL` reply,
    /// treated here as "condition not met").
    pub fn persist(&mut self, field: &[u8]) -> ApplyRes {
        if !self.hash.has_field(field) {
            return ApplyRes::NoField;
        }
        let prior_ttl = self.hash.ttl_of(field);
        if !self.hash.persist(field) {
            return ApplyRes::NoConditionMet;
        }
        self.touched = true;
        self.updated += 1;
        self.note_seen(prior_ttl, INVALID);
        ApplyRes::Ok
    }

    /// Sets `(field, value)`, honoring `cond_set` (`HSET` vs `HSETNX`).
    /// `keep_field` threads through to the encoding's TTL-preserving
    /// update path (used by `HINCRBY`/`HINCRBYFLOAT`).
    pub fn apply_set(
        &mut self,
        field: Field,
        value: Value,
        cond_set: FieldSetCond,
        keep_field: bool,
        cfg: &super::config::HashConfig,
    ) -> ApplyRes {
        let exists = self.hash.has_field(field.as_bytes());
        match cond_set {
            FieldSetCond::DontOverwrite if exists => return ApplyRes::NoConditionMet,
            FieldSetCond::DontCreate if !exists => return ApplyRes::NoField,
            _ => {}
        }
        let prior_ttl = self.hash.ttl_of(field.as_bytes());
        let flags = super::listpack::SetFlags { keep_field };
        let inserted = self.hash.set(&self.key, field, value, flags, cfg);
        self.touched = true;
        if inserted {
            ApplyRes::Ok
        } else {
            self.updated += 1;
            if !keep_field {
                self.note_seen(prior_ttl, INVALID);
            }
            ApplyRes::Updated
        }
    }

    pub fn deleted_count(&self) -> u32 {
        self.deleted
    }

    pub fn updated_count(&self) -> u32 {
        self.updated
    }

    /// Whether any field in the batch actually changed state. Callers use
    /// this to decide whether the command's keyspace event should fire.
    pub fn touched(&self) -> bool {
        self.touched
    }

    /// Commits the batch: deletes the key if the hash emptied, otherwise
    /// decides whether C6 needs updating per spec.md §4.6's amortization
    /// rule. Returns `true` if the key should now be deleted by the
    /// caller (the external database owns key deletion).
    pub fn done(self) -> bool {
        if !self.touched {
            return false;
        }
        if self.hash.is_empty() {
            if self.min_before != INVALID {
                self.hash_buckets.remove(self.key.as_ref());
            }
            return true;
        }
        let new_min = self.hash.min_expire();
        if self.min_before != INVALID && self.min_before < self.min_seen_fields {
            // Some other field still expires earlier than anything this
            // batch touched; the hash's registered min can't have moved.
            return false;
        }
        if self.min_before != INVALID
            && new_min != INVALID
            && self.min_before.abs_diff(new_min) < HASH_NEW_EXPIRE_DIFF_THRESHOLD
        {
            return false;
        }
        if self.min_before != INVALID {
            self.hash_buckets.remove(self.key.as_ref());
        }
        if new_min != INVALID {
            self.hash_buckets.add(self.key.clone(), new_min);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::config::HashConfig;
    use crate::storage::listpack::SetFlags;

    fn f(s: &str) -> Field {
        Field::new(Bytes::copy_from_slice(s.as_bytes()))
    }

    #[test]
    fn batch_registers_hash_in_global_index_once() {
        let mut h = Hash::new();
        let cfg = HashConfig::default();
        let key = Bytes::from_static(b"h");
        h.set(&key, f("a"), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        h.set(&key, f("b"), Bytes::from_static(b"2"), SetFlags::default(), &cfg);

        let mut hash_buckets: BucketSet<Bytes> = BucketSet::new();
        {
            let mut batch = SetExBatch::new(key.clone(), &mut h, &mut hash_buckets, ExpireSetCond::None);
            batch.apply_ttl(b"a", 10_000, 0);
            batch.apply_ttl(b"b", 50_000, 0);
            assert!(!batch.done());
        }
        assert_eq!(hash_buckets.peek_min(), 10_000);
        assert_eq!(hash_buckets.len(), 1);
    }

    #[test]
    fn small_drift_does_not_touch_global_index() {
        let mut h = Hash::new();
        let cfg = HashConfig::default();
        let key = Bytes::from_static(b"h");
        h.set(&key, f("a"), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        h.set(&key, f("b"), Bytes::from_static(b"2"), SetFlags::default(), &cfg);

        let mut hash_buckets: BucketSet<Bytes> = BucketSet::new();
        {
            let mut batch = SetExBatch::new(key.clone(), &mut h, &mut hash_buckets, ExpireSetCond::None);
            batch.apply_ttl(b"a", 10_000, 0);
            batch.done();
        }
        {
            let mut batch = SetExBatch::new(key.clone(), &mut h, &mut hash_buckets, ExpireSetCond::None);
            batch.apply_ttl(b"a", 10_500, 0);
            batch.done();
        }
        assert_eq!(hash_buckets.peek_min(), 10_000);
    }

    #[test]
    fn emptying_hash_removes_from_global_index_and_signals_delete() {
        let mut h = Hash::new();
        let cfg = HashConfig::default();
        let key = Bytes::from_static(b"h");
        h.set(&key, f("a"), Bytes::from_static(b"1"), SetFlags::default(), &cfg);

        let mut hash_buckets: BucketSet<Bytes> = BucketSet::new();
        {
            let mut batch = SetExBatch::new(key.clone(), &mut h, &mut hash_buckets, ExpireSetCond::None);
            batch.apply_ttl(b"a", 10_000, 0);
            batch.done();
        }
        let should_delete = {
            let mut batch = SetExBatch::new(key.clone(), &mut h, &mut hash_buckets, ExpireSetCond::None);
            let res = batch.apply_ttl(b"a", 1, 100);
            assert_eq!(res, ApplyRes::Deleted);
            batch.done()
        };
        assert!(should_delete);
        assert!(hash_buckets.is_empty());
    }

    #[test]
    fn nx_condition_refused_without_touching_batch_state() {
        let mut h = Hash::new();
        let cfg = HashConfig::default();
        let key = Bytes::from_static(b"h");
        h.set(&key, f("a"), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        let mut hash_buckets: BucketSet<Bytes> = BucketSet::new();
        let mut batch = SetExBatch::new(key.clone(), &mut h, &mut hash_buckets, ExpireSetCond::None);
        batch.apply_ttl(b"a", 10_000, 0);
        let mut batch2 = SetExBatch::new(key, &mut h, &mut hash_buckets, ExpireSetCond::Nx);
        assert_eq!(batch2.apply_ttl(b"a", 20_000, 0), ApplyRes::NoConditionMet);
        assert!(!batch2.done());
    }
}
