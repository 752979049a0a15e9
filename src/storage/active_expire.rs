//! Cron-driven quota-bounded expiration sweep (C9)
//!
//! Scans the database-wide hash-expiry index (C6), delegates bounded
//! per-hash expiration to each due hash (C5, via [`Hash::expire`]), and
//! re-buckets hashes that still have remaining scheduled expires.

use bytes::Bytes;

use super::bucket_set::{BucketSet, ExpireAction, ExpireInfo};
use super::hash::Hash;

/// One callback invocation per field actually expired, so the caller can
/// propagate a field-deletion event before the field is dropped.
pub trait ActiveExpireObserver {
    fn on_field_expired(&mut self, key: &[u8], field: &[u8]);
    fn on_key_deleted(&mut self, key: &[u8]);
}

/// Looks up a hash by key for the duration of one active-expire sweep.
/// The real implementation is the database's keyspace; kept as a trait so
/// this module has no dependency on `Db`.
pub trait HashLookup {
    fn with_hash_mut<R>(&mut self, key: &[u8], f: impl FnOnce(&mut Hash) -> R) -> Option<R>;
}

/// Runs one active-expire tick against `hash_buckets` (C6), consulting
/// `lookup` for each due hash and notifying `observer` of field/key
/// deletions. Returns the number of fields actually expired, bounded by
/// `quota`.
pub fn db_active_expire(
    hash_buckets: &mut BucketSet<Bytes>,
    lookup: &mut impl HashLookup,
    observer: &mut impl ActiveExpireObserver,
    now: u64,
    quota: u64,
) -> u64 {
    let mut quota_left = quota;
    let mut to_delete: Vec<Bytes> = Vec::new();

    {
        let mut on_expire = |key: &Bytes| -> ExpireAction {
            if quota_left == 0 {
                return ExpireAction::Stop;
            }
            let result = lookup.with_hash_mut(key, |hash| {
                let key_for_cb = key.clone();
                let (expired, next_expire) = hash.expire(now, quota_left.min(u32::MAX as u64) as u32, |field| {
                    observer.on_field_expired(&key_for_cb, field);
                });
                (expired, next_expire, hash.is_empty())
            });
            let Some((expired, next_expire, is_empty)) = result else {
                // Hash vanished from the keyspace out from under C6;
                // drop the stale bucket entry.
                return ExpireAction::Remove;
            };
            quota_left = quota_left.saturating_sub(expired as u64);
            if next_expire == 0 {
                if is_empty {
                    to_delete.push(key.clone());
                }
                ExpireAction::Remove
            } else {
                ExpireAction::Update(next_expire)
            }
        };

        let mut info = ExpireInfo {
            max_to_expire: u64::MAX,
            now,
            on_expire: &mut on_expire,
            next_expire: 0,
            items_expired: 0,
        };
        hash_buckets.expire(&mut info);
    }

    for key in &to_delete {
        observer.on_key_deleted(key);
    }
    quota - quota_left
}

/// Background task that drives [`db_active_expire`] on a fixed interval,
/// the hash-field-TTL analogue of the teacher's whole-key `TtlCleaner`.
pub struct ActiveExpireTask {
    db: super::db::Db,
    interval: std::time::Duration,
    quota: u64,
}

impl ActiveExpireTask {
    pub fn new(db: super::db::Db, interval_secs: u64, quota: u64) -> Self {
        Self { db, interval: std::time::Duration::from_secs(interval_secs), quota }
    }

    /// Runs the sweep loop; intended to be spawned, not awaited directly.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        tracing::info!(interval = ?self.interval, quota = self.quota, "active expire task started");
        loop {
            ticker.tick().await;
            let expired = self.db.active_expire(self.quota);
            if expired > 0 {
                tracing::debug!(expired, "active expire tick");
            }
        }
    }

    pub fn spawn(db: super::db::Db, interval_secs: u64, quota: u64) -> tokio::task::JoinHandle<()> {
        let task = Self::new(db, interval_secs, quota);
        tokio::spawn(task.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::config::HashConfig;
    use crate::storage::cond::ExpireSetCond;
    use crate::storage::field::Field;
    use crate::storage::listpack::SetFlags;
    use hashbrown::HashMap;

    struct FakeDb {
        hashes: HashMap<Bytes, Hash>,
    }

    impl HashLookup for FakeDb {
        fn with_hash_mut<R>(&mut self, key: &[u8], f: impl FnOnce(&mut Hash) -> R) -> Option<R> {
            self.hashes.get_mut(key).map(f)
        }
    }

    #[derive(Default)]
    struct Recorder {
        expired_fields: Vec<(Bytes, Bytes)>,
        deleted_keys: Vec<Bytes>,
    }

    impl ActiveExpireObserver for Recorder {
        fn on_field_expired(&mut self, key: &[u8], field: &[u8]) {
            self.expired_fields
                .push((Bytes::copy_from_slice(key), Bytes::copy_from_slice(field)));
        }
        fn on_key_deleted(&mut self, key: &[u8]) {
            self.deleted_keys.push(Bytes::copy_from_slice(key));
        }
    }

    #[test]
    fn sweeps_due_hash_and_deletes_empty_key() {
        let key = Bytes::from_static(b"h");
        let cfg = HashConfig::default();
        let mut hash = Hash::new();
        hash.set(&key, Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        hash.set_ttl(&key, b"a", 100, 0, ExpireSetCond::None);

        let mut hash_buckets: BucketSet<Bytes> = BucketSet::new();
        hash_buckets.add(key.clone(), 100);

        let mut db = FakeDb {
            hashes: HashMap::from_iter([(key.clone(), hash)]),
        };
        let mut observer = Recorder::default();

        let expired = db_active_expire(&mut hash_buckets, &mut db, &mut observer, 200, 10);
        assert_eq!(expired, 1);
        assert_eq!(observer.expired_fields, vec![(key.clone(), Bytes::from_static(b"a"))]);
        assert_eq!(observer.deleted_keys, vec![key]);
        assert!(hash_buckets.is_empty());
    }

    #[test]
    fn quota_bounds_total_fields_expired_across_hashes() {
        let cfg = HashConfig::default();
        let mut hash_buckets: BucketSet<Bytes> = BucketSet::new();
        let mut hashes = HashMap::new();

        for i in 0..3u8 {
            let key = Bytes::from(vec![b'h', i]);
            let mut hash = Hash::new();
            for j in 0..5u8 {
                let field = vec![b'f', j];
                hash.set(&key, Field::new(Bytes::from(field.clone())), Bytes::from_static(b"v"), SetFlags::default(), &cfg);
                hash.set_ttl(&key, &field, 100, 0, ExpireSetCond::None);
            }
            hash_buckets.add(key.clone(), 100);
            hashes.insert(key, hash);
        }

        let mut db = FakeDb { hashes };
        let mut observer = Recorder::default();
        let expired = db_active_expire(&mut hash_buckets, &mut db, &mut observer, 200, 7);
        assert_eq!(expired, 7);
    }

    #[test]
    fn hash_with_remaining_expires_is_rebucketed_not_removed() {
        let key = Bytes::from_static(b"h");
        let cfg = HashConfig::default();
        let mut hash = Hash::new();
        hash.set(&key, Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        hash.set(&key, Field::new(Bytes::from_static(b"b")), Bytes::from_static(b"2"), SetFlags::default(), &cfg);
        hash.set_ttl(&key, b"a", 100, 0, ExpireSetCond::None);
        hash.set_ttl(&key, b"b", 50_000, 0, ExpireSetCond::None);

        let mut hash_buckets: BucketSet<Bytes> = BucketSet::new();
        hash_buckets.add(key.clone(), 100);

        let mut db = FakeDb {
            hashes: HashMap::from_iter([(key.clone(), hash)]),
        };
        let mut observer = Recorder::default();
        db_active_expire(&mut hash_buckets, &mut db, &mut observer, 200, 10);

        assert_eq!(hash_buckets.peek_min(), 50_000);
        assert!(observer.deleted_keys.is_empty());
    }
}
