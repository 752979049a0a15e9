//! Top-level keyspace (`Db`)
//!
//! Concrete realization of spec.md §6's "collaborator callbacks required"
//! -- `find_key`, `delete_key`, event emission, `now_ms`, session flags --
//! since this crate has no separate database crate to delegate to. Holds
//! every key under one lock, matching the single-logical-worker
//! concurrency model of spec.md §5: a command takes the lock once, runs
//! its `SetExBatch`/lazy-expiry/`ActiveExpire` step to completion, and
//! releases it -- there is no suspension point inside that critical
//! section, so it stands in for the "main worker" the spec describes.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use hashbrown::HashMap;
use tracing::{debug, info};

use super::active_expire::{db_active_expire, ActiveExpireObserver, HashLookup};
use super::bucket_set::BucketSet;
use super::config::HashConfig;
use super::cond::{ExpireSetCond, FieldSetCond};
use super::field::{Field, INVALID};
use super::hash::{ExistsRes, GetRes, Hash};
use super::listpack::Value;
use super::set_ex_batch::{ApplyRes, SetExBatch};

/// Failure modes specific to `HINCRBY`/`HINCRBYFLOAT` (spec.md §4.5's
/// "missing/expired treated as 0" rule still lets the *existing* value be
/// the wrong shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrError {
    NotAnInteger,
    NotAFloat,
    Overflow,
}

/// Minimal humane float formatting: whole numbers print without a decimal
/// point, everything else trims to the shortest representation that
/// round-trips through 17 significant digits. Mirrors the source's
/// `ld2string(..., LD_STR_HUMAN)` without the long-double precision it
/// isn't worth chasing in safe Rust.
fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e17 {
        return format!("{}", v as i64);
    }
    let s = format!("{:.17}", v);
    let trimmed = s.trim_end_matches('0');
    let trimmed = trimmed.trim_end_matches('.');
    trimmed.to_string()
}

pub type HashBuckets = BucketSet<Bytes>;

/// Largest absolute millisecond expire time `hexpire` will accept, mirroring
/// the source's `EB_EXPIRE_TIME_MAX` bound on what the expiry bucket index
/// can represent. An `HEXPIRE`/`HPEXPIRE`/`HEXPIREAT`/`HPEXPIREAT` whose
/// computed absolute time exceeds this is rejected with no state change.
pub const EB_EXPIRE_TIME_MAX: u64 = (1u64 << 48) - 1;

/// Current wall-clock time in milliseconds since epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

/// One keyspace slot: either a plain string value or a hash.
#[derive(Debug)]
pub enum Entry {
    String(Bytes),
    Hash(Hash),
}

/// A hash command's view of whatever is (or isn't) stored at its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    /// Key exists but holds a non-hash value.
    WrongType,
    /// Computed absolute expire time exceeds `EB_EXPIRE_TIME_MAX`.
    ExpireTimeOverflow,
}

struct Inner {
    entries: HashMap<Bytes, Entry>,
    hash_buckets: HashBuckets,
    events: Vec<(&'static str, Bytes)>,
}

/// Cheaply-cloneable handle to the keyspace; every clone shares the same
/// underlying lock, mirroring the teacher's `Store::clone()` pattern used
/// to hand one shared store to each connection task.
#[derive(Clone)]
pub struct Db {
    inner: Arc<Mutex<Inner>>,
    config: HashConfig,
}

impl Db {
    pub fn new(config: HashConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                hash_buckets: HashBuckets::new(),
                events: Vec::new(),
            })),
            config,
        }
    }

    pub fn config(&self) -> HashConfig {
        self.config
    }

    /// Drains and returns every event emitted since the last drain
    /// (`del`, `hexpire`, `hpersist`, `hset`, `hdel`, `hincrby`,
    /// `hincrbyfloat`). Tests and the propagation sink both consume this.
    pub fn drain_events(&self) -> Vec<(&'static str, Bytes)> {
        let mut inner = self.inner.lock().unwrap();
        std::mem::take(&mut inner.events)
    }

    fn emit(inner: &mut Inner, event: &'static str, key: Bytes) {
        inner.events.push((event, key));
    }

    /// Deletes `key` unconditionally and emits `"del"`.
    pub fn delete_key(&self, key: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        Self::delete_key_locked(&mut inner, key)
    }

    fn delete_key_locked(inner: &mut Inner, key: &[u8]) -> bool {
        let existed = inner.entries.remove(key).is_some();
        if existed {
            inner.hash_buckets.remove(key);
            Self::emit(inner, "del", Bytes::copy_from_slice(key));
        }
        existed
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.entries.contains_key(key)
    }

    pub fn get_string(&self, key: &[u8]) -> Option<Bytes> {
        let inner = self.inner.lock().unwrap();
        match inner.entries.get(key) {
            Some(Entry::String(v)) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn set_string(&self, key: Bytes, value: Bytes) {
        let mut inner = self.inner.lock().unwrap();
        inner.hash_buckets.remove(key.as_ref());
        inner.entries.insert(key, Entry::String(value));
    }

    pub fn del(&self, key: &[u8]) -> bool {
        self.delete_key(key)
    }

    /// Runs `f` against the hash at `key`, creating it if absent, handling
    /// `WrongType` and deleting the key if the hash empties as a result.
    /// `f` also receives the keyspace's event sink directly, so a command
    /// that actually changes state can push its own `"hset"`/`"hdel"`/etc.
    /// event in the same critical section as the mutation.
    fn with_hash_for_write<R>(
        &self,
        key: &Bytes,
        create_if_missing: bool,
        f: impl FnOnce(&mut Hash, &mut HashBuckets, &HashConfig, &mut Vec<(&'static str, Bytes)>) -> R,
    ) -> Result<R, KeyError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.entries.contains_key(key.as_ref()) {
            if !create_if_missing {
                let cfg = self.config;
                let Inner { hash_buckets, events, .. } = &mut *inner;
                let mut empty = Hash::new();
                let result = f(&mut empty, hash_buckets, &cfg, events);
                return Ok(result);
            }
            inner.entries.insert(key.clone(), Entry::Hash(Hash::new()));
        }
        match inner.entries.get_mut(key.as_ref()) {
            Some(Entry::Hash(_)) => {}
            Some(Entry::String(_)) => return Err(KeyError::WrongType),
            None => unreachable!(),
        }
        let cfg = self.config;
        let result = {
            let Inner { entries, hash_buckets, events } = &mut *inner;
            let hash = match entries.get_mut(key.as_ref()) {
                Some(Entry::Hash(h)) => h,
                _ => unreachable!(),
            };
            f(hash, hash_buckets, &cfg, events)
        };

        if let Some(Entry::Hash(h)) = inner.entries.get(key.as_ref()) {
            if h.is_empty() {
                Self::delete_key_locked(&mut inner, key);
            }
        }
        Ok(result)
    }

    /// Runs `f` against the hash at `key` for a read-only command. `f`
    /// receives an `on_expired` sink: any field lazy expiry removes during
    /// the read is reported through it before the reply is built, and this
    /// helper turns each report into an `"hdel"` event -- the same
    /// propagation the active-expire cron already performs for the fields
    /// it sweeps (spec.md §9's "emit, then free" ordering applies equally
    /// to the lazy path).
    fn with_hash_for_read<R>(
        &self,
        key: &[u8],
        f: impl FnOnce(&mut Hash, &mut dyn FnMut(&[u8])) -> R,
    ) -> Result<Option<R>, KeyError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.entries.get(key) {
            None => return Ok(None),
            Some(Entry::String(_)) => return Err(KeyError::WrongType),
            Some(Entry::Hash(_)) => {}
        }
        let (result, empty) = {
            let Inner { entries, events, .. } = &mut *inner;
            let hash = match entries.get_mut(key) {
                Some(Entry::Hash(h)) => h,
                _ => unreachable!(),
            };
            let key_bytes = Bytes::copy_from_slice(key);
            let mut on_expired = |_field: &[u8]| {
                events.push(("hdel", key_bytes.clone()));
            };
            let result = f(hash, &mut on_expired);
            (result, hash.is_empty())
        };
        if empty {
            Self::delete_key_locked(&mut inner, key);
        }
        Ok(Some(result))
    }

    /// Upserts `fields`. Returns the number of fields that were newly
    /// inserted (as opposed to overwriting an existing one).
    pub fn hset(
        &self,
        key: Bytes,
        fields: Vec<(Field, Value)>,
        cond: FieldSetCond,
        keep_field: bool,
    ) -> Result<u32, KeyError> {
        let lookup_key = key.clone();
        self.with_hash_for_write(&lookup_key, true, move |hash, hash_buckets, cfg, events| {
            let key_for_event = key.clone();
            let mut batch = SetExBatch::new(key, hash, hash_buckets, ExpireSetCond::None);
            let mut inserted = 0u32;
            for (field, value) in fields {
                if let ApplyRes::Ok = batch.apply_set(field, value, cond, keep_field, cfg) {
                    inserted += 1;
                }
            }
            let touched = batch.touched();
            batch.done();
            if touched {
                events.push(("hset", key_for_event));
            }
            inserted
        })
    }

    pub fn hget(&self, key: &[u8], field: &[u8]) -> Result<GetRes, KeyError> {
        let now = now_ms();
        let suppress = self.config.suppress_lazy_expiry(false);
        let res = self.with_hash_for_read(key, move |hash, on_expired| hash.get(field, now, suppress, on_expired))?;
        Ok(res.unwrap_or(GetRes::NotFound))
    }

    pub fn hexists(&self, key: &[u8], field: &[u8]) -> Result<ExistsRes, KeyError> {
        let now = now_ms();
        let suppress = self.config.suppress_lazy_expiry(false);
        let res =
            self.with_hash_for_read(key, move |hash, on_expired| hash.exists(field, now, suppress, on_expired))?;
        Ok(res.unwrap_or(ExistsRes::No))
    }

    pub fn hlen(&self, key: &[u8]) -> Result<u64, KeyError> {
        let now = now_ms();
        let res = self.with_hash_for_read(key, move |hash, _on_expired| hash.length(true, now))?;
        Ok(res.unwrap_or(0))
    }

    pub fn hdel(&self, key: &Bytes, fields: &[Bytes]) -> Result<u32, KeyError> {
        self.with_hash_for_write(key, false, |hash, _, _, events| {
            let mut count = 0u32;
            for field in fields {
                if hash.delete(field) {
                    count += 1;
                }
            }
            if count > 0 {
                events.push(("hdel", key.clone()));
            }
            count
        })
    }

    pub fn hexpire(
        &self,
        key: Bytes,
        fields: &[Bytes],
        expire_at: u64,
        cond: ExpireSetCond,
    ) -> Result<Vec<ApplyRes>, KeyError> {
        if expire_at > EB_EXPIRE_TIME_MAX {
            return Err(KeyError::ExpireTimeOverflow);
        }
        let now = now_ms();
        let lookup_key = key.clone();
        self.with_hash_for_write(&lookup_key, false, move |hash, hash_buckets, _cfg, events| {
            let key_for_event = key.clone();
            let mut batch = SetExBatch::new(key, hash, hash_buckets, cond);
            let results = fields.iter().map(|f| batch.apply_ttl(f, expire_at, now)).collect();
            let touched = batch.touched();
            batch.done();
            if touched {
                events.push(("hexpire", key_for_event));
            }
            results
        })
    }

    pub fn hpersist(&self, key: Bytes, fields: &[Bytes]) -> Result<Vec<ApplyRes>, KeyError> {
        let lookup_key = key.clone();
        self.with_hash_for_write(&lookup_key, false, move |hash, hash_buckets, _cfg, events| {
            let key_for_event = key.clone();
            let mut batch = SetExBatch::new(key, hash, hash_buckets, ExpireSetCond::None);
            let results = fields.iter().map(|f| batch.persist(f)).collect();
            let touched = batch.touched();
            batch.done();
            if touched {
                events.push(("hpersist", key_for_event));
            }
            results
        })
    }

    /// `HRANDFIELD key` (no count): a single random field, or `None` if
    /// the hash is missing or empty. Equivalent to the positive-count form
    /// with `count == 1`, just unwrapped to a single pair.
    pub fn hrandfield(&self, key: &[u8]) -> Result<Option<(Bytes, Bytes)>, KeyError> {
        Ok(self.hrandfield_count(key, 1)?.into_iter().next())
    }

    /// `HRANDFIELD key count [WITHVALUES]`; `count` follows
    /// [`Hash::random_count`]'s sign convention.
    pub fn hrandfield_count(&self, key: &[u8], count: i64) -> Result<Vec<(Bytes, Bytes)>, KeyError> {
        let now = now_ms();
        let res = self.with_hash_for_read(key, move |hash, _on_expired| hash.random_count(count, now))?;
        Ok(res.unwrap_or_default())
    }

    pub fn hmget(&self, key: &[u8], fields: &[Bytes]) -> Result<Vec<Option<Bytes>>, KeyError> {
        let now = now_ms();
        let suppress = self.config.suppress_lazy_expiry(false);
        let res = self.with_hash_for_read(key, move |hash, on_expired| {
            fields
                .iter()
                .map(|f| match hash.get(f, now, suppress, on_expired) {
                    GetRes::Ok(v) => Some(v),
                    _ => None,
                })
                .collect::<Vec<_>>()
        })?;
        Ok(res.unwrap_or_else(|| fields.iter().map(|_| None).collect()))
    }

    pub fn hgetall(&self, key: &[u8]) -> Result<Vec<(Bytes, Bytes)>, KeyError> {
        let now = now_ms();
        let res = self.with_hash_for_read(key, move |hash, _on_expired| {
            hash.iter_pairs(true, now).into_iter().map(|(f, v, _)| (f, v)).collect::<Vec<_>>()
        })?;
        Ok(res.unwrap_or_default())
    }

    pub fn hkeys(&self, key: &[u8]) -> Result<Vec<Bytes>, KeyError> {
        let now = now_ms();
        let res = self.with_hash_for_read(key, move |hash, _on_expired| {
            hash.iter_pairs(true, now).into_iter().map(|(f, _, _)| f).collect::<Vec<_>>()
        })?;
        Ok(res.unwrap_or_default())
    }

    pub fn hvals(&self, key: &[u8]) -> Result<Vec<Bytes>, KeyError> {
        let now = now_ms();
        let res = self.with_hash_for_read(key, move |hash, _on_expired| {
            hash.iter_pairs(true, now).into_iter().map(|(_, v, _)| v).collect::<Vec<_>>()
        })?;
        Ok(res.unwrap_or_default())
    }

    pub fn hstrlen(&self, key: &[u8], field: &[u8]) -> Result<u64, KeyError> {
        let now = now_ms();
        let suppress = self.config.suppress_lazy_expiry(false);
        let res = self.with_hash_for_read(key, move |hash, on_expired| match hash.get(field, now, suppress, on_expired) {
            GetRes::Ok(v) => v.len() as u64,
            _ => 0,
        })?;
        Ok(res.unwrap_or(0))
    }

    /// Offset-based `HSCAN`: the cursor is just an index into a snapshot of
    /// live fields taken at call time (spec.md's non-goal drops any
    /// guarantee of a stable order across concurrent mutation). Returns
    /// `(next_cursor, pairs)`; `next_cursor == 0` means the scan is done.
    pub fn hscan(&self, key: &[u8], cursor: u64, count: u32) -> Result<(u64, Vec<(Bytes, Bytes)>), KeyError> {
        let now = now_ms();
        let limit = count.max(1) as usize;
        let res = self.with_hash_for_read(key, move |hash, _on_expired| {
            let pairs = hash.iter_pairs(true, now);
            let start = cursor as usize;
            if start >= pairs.len() {
                return (0u64, Vec::new());
            }
            let end = (start + limit).min(pairs.len());
            let page = pairs[start..end].iter().map(|(f, v, _)| (f.clone(), v.clone())).collect();
            let next = if end >= pairs.len() { 0 } else { end as u64 };
            (next, page)
        })?;
        Ok(res.unwrap_or((0, Vec::new())))
    }

    /// Per-field `HTTL`/`HPTTL`/`HEXPIRETIME`/`HPEXPIRETIME` reply codes:
    /// `NO_FIELD(-2)`, `NO_TTL(-1)`, or the ttl/expire-time value itself,
    /// in the unit `unit_ms` picks.
    pub fn httl(&self, key: &[u8], fields: &[Bytes], absolute: bool, unit_ms: bool) -> Result<Vec<i64>, KeyError> {
        let now = now_ms();
        let res = self.with_hash_for_read(key, move |hash, _on_expired| {
            fields
                .iter()
                .map(|f| {
                    if !hash.has_field(f) {
                        return -2i64;
                    }
                    let expire_at = hash.ttl_of(f);
                    if expire_at == INVALID {
                        return -1i64;
                    }
                    let value_ms = if absolute { expire_at } else { expire_at.saturating_sub(now) };
                    if unit_ms {
                        value_ms as i64
                    } else {
                        (value_ms / 1000) as i64
                    }
                })
                .collect::<Vec<_>>()
        })?;
        Ok(res.unwrap_or_else(|| fields.iter().map(|_| -2i64).collect()))
    }

    /// Treats a missing or lazily-expired field as `0` (spec.md §4.5),
    /// never attaches a TTL to the result (`KEEP_FIELD`).
    pub fn hincrby(&self, key: Bytes, field: Bytes, delta: i64) -> Result<Result<i64, IncrError>, KeyError> {
        let lookup_key = key.clone();
        self.with_hash_for_write(&lookup_key, true, move |hash, hash_buckets, cfg, events| {
            let now = now_ms();
            let key_for_event = key.clone();
            let mut on_expired = |_f: &[u8]| events.push(("hdel", key_for_event.clone()));
            let current = match hash.get(&field, now, false, &mut on_expired) {
                GetRes::Ok(v) => match std::str::from_utf8(&v).ok().and_then(|s| s.trim().parse::<i64>().ok()) {
                    Some(n) => n,
                    None => return Err(IncrError::NotAnInteger),
                },
                GetRes::NotFound | GetRes::Expired | GetRes::ExpiredHash => 0,
            };
            let new_val = match current.checked_add(delta) {
                Some(n) => n,
                None => return Err(IncrError::Overflow),
            };
            let value = Bytes::from(new_val.to_string());
            let mut batch = SetExBatch::new(key.clone(), hash, hash_buckets, ExpireSetCond::None);
            batch.apply_set(Field::new(field), value, FieldSetCond::CreateOrOverwrite, true, cfg);
            batch.done();
            events.push(("hincrby", key_for_event));
            Ok(new_val)
        })
    }

    pub fn hincrbyfloat(&self, key: Bytes, field: Bytes, delta: f64) -> Result<Result<Bytes, IncrError>, KeyError> {
        let lookup_key = key.clone();
        self.with_hash_for_write(&lookup_key, true, move |hash, hash_buckets, cfg, events| {
            let now = now_ms();
            let key_for_event = key.clone();
            let mut on_expired = |_f: &[u8]| events.push(("hdel", key_for_event.clone()));
            let current = match hash.get(&field, now, false, &mut on_expired) {
                GetRes::Ok(v) => match std::str::from_utf8(&v).ok().and_then(|s| s.trim().parse::<f64>().ok()) {
                    Some(n) => n,
                    None => return Err(IncrError::NotAFloat),
                },
                GetRes::NotFound | GetRes::Expired | GetRes::ExpiredHash => 0.0,
            };
            let new_val = current + delta;
            if !new_val.is_finite() {
                return Err(IncrError::Overflow);
            }
            let value = Bytes::from(format_float(new_val));
            let mut batch = SetExBatch::new(key.clone(), hash, hash_buckets, ExpireSetCond::None);
            batch.apply_set(Field::new(field), value.clone(), FieldSetCond::CreateOrOverwrite, true, cfg);
            batch.done();
            events.push(("hincrbyfloat", key_for_event));
            Ok(value)
        })
    }

    /// Runs one active-expire tick with the given fields quota, returning
    /// the number of fields actually expired.
    pub fn active_expire(&self, quota: u64) -> u64 {
        let now = now_ms();
        let mut inner = self.inner.lock().unwrap();
        let Inner { entries, hash_buckets, events } = &mut *inner;

        struct Lookup<'a>(&'a mut HashMap<Bytes, Entry>);
        impl<'a> HashLookup for Lookup<'a> {
            fn with_hash_mut<R>(&mut self, key: &[u8], f: impl FnOnce(&mut Hash) -> R) -> Option<R> {
                match self.0.get_mut(key) {
                    Some(Entry::Hash(h)) => Some(f(h)),
                    _ => None,
                }
            }
        }

        struct Observer<'a> {
            events: &'a mut Vec<(&'static str, Bytes)>,
            to_delete: Vec<Bytes>,
        }
        impl<'a> ActiveExpireObserver for Observer<'a> {
            fn on_field_expired(&mut self, key: &[u8], _field: &[u8]) {
                self.events.push(("hdel", Bytes::copy_from_slice(key)));
            }
            fn on_key_deleted(&mut self, key: &[u8]) {
                self.to_delete.push(Bytes::copy_from_slice(key));
            }
        }

        let mut lookup = Lookup(&mut *entries);
        let mut observer = Observer { events: &mut *events, to_delete: Vec::new() };
        let expired = db_active_expire(hash_buckets, &mut lookup, &mut observer, now, quota);

        for key in observer.to_delete {
            entries.remove(key.as_ref());
            events.push(("del", key));
        }

        debug!(expired, quota, "active expire tick");
        if expired > 0 {
            info!(expired, "hash fields actively expired");
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hset_then_hget_roundtrip() {
        let db = Db::new(HashConfig::default());
        db.hset(
            Bytes::from_static(b"h"),
            vec![(Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"))],
            FieldSetCond::CreateOrOverwrite,
            false,
        )
        .unwrap();
        assert_eq!(db.hget(b"h", b"a").unwrap(), GetRes::Ok(Bytes::from_static(b"1")));
    }

    #[test]
    fn string_key_rejects_hash_ops() {
        let db = Db::new(HashConfig::default());
        db.set_string(Bytes::from_static(b"s"), Bytes::from_static(b"v"));
        let res = db.hget(b"s", b"a");
        assert_eq!(res, Err(KeyError::WrongType));
    }

    #[test]
    fn hdel_last_field_deletes_key() {
        let db = Db::new(HashConfig::default());
        db.hset(
            Bytes::from_static(b"h"),
            vec![(Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"))],
            FieldSetCond::CreateOrOverwrite,
            false,
        )
        .unwrap();
        db.hdel(&Bytes::from_static(b"h"), &[Bytes::from_static(b"a")]).unwrap();
        assert!(!db.exists(b"h"));
    }

    #[test]
    fn active_expire_deletes_due_key() {
        let db = Db::new(HashConfig::default());
        db.hset(
            Bytes::from_static(b"h"),
            vec![(Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"))],
            FieldSetCond::CreateOrOverwrite,
            false,
        )
        .unwrap();
        db.hexpire(Bytes::from_static(b"h"), &[Bytes::from_static(b"a")], 1, ExpireSetCond::None)
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let expired = db.active_expire(100);
        assert_eq!(expired, 1);
        assert!(!db.exists(b"h"));
    }

    fn seed(db: &Db) {
        db.hset(
            Bytes::from_static(b"h"),
            vec![
                (Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1")),
                (Field::new(Bytes::from_static(b"b")), Bytes::from_static(b"2")),
            ],
            FieldSetCond::CreateOrOverwrite,
            false,
        )
        .unwrap();
    }

    #[test]
    fn hmget_reports_missing_field_as_nil() {
        let db = Db::new(HashConfig::default());
        seed(&db);
        let res = db.hmget(b"h", &[Bytes::from_static(b"a"), Bytes::from_static(b"missing")]).unwrap();
        assert_eq!(res, vec![Some(Bytes::from_static(b"1")), None]);
    }

    #[test]
    fn hgetall_hkeys_hvals_agree() {
        let db = Db::new(HashConfig::default());
        seed(&db);
        let pairs = db.hgetall(b"h").unwrap();
        let keys = db.hkeys(b"h").unwrap();
        let vals = db.hvals(b"h").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(keys.len(), 2);
        assert_eq!(vals.len(), 2);
    }

    #[test]
    fn hscan_pages_through_fields() {
        let db = Db::new(HashConfig::default());
        seed(&db);
        let (cursor, first) = db.hscan(b"h", 0, 1).unwrap();
        assert_eq!(first.len(), 1);
        assert_ne!(cursor, 0);
        let (cursor2, second) = db.hscan(b"h", cursor, 1).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(cursor2, 0);
    }

    #[test]
    fn hincrby_creates_missing_field_at_zero() {
        let db = Db::new(HashConfig::default());
        let res = db.hincrby(Bytes::from_static(b"h"), Bytes::from_static(b"counter"), 5).unwrap();
        assert_eq!(res, Ok(5));
        let res = db.hincrby(Bytes::from_static(b"h"), Bytes::from_static(b"counter"), 3).unwrap();
        assert_eq!(res, Ok(8));
    }

    #[test]
    fn hincrby_rejects_non_integer_value() {
        let db = Db::new(HashConfig::default());
        seed(&db); // field "a" holds "1", integer-looking; use a non-numeric one
        db.hset(
            Bytes::from_static(b"h"),
            vec![(Field::new(Bytes::from_static(b"word")), Bytes::from_static(b"nope"))],
            FieldSetCond::CreateOrOverwrite,
            false,
        )
        .unwrap();
        let res = db.hincrby(Bytes::from_static(b"h"), Bytes::from_static(b"word"), 1).unwrap();
        assert_eq!(res, Err(IncrError::NotAnInteger));
    }

    #[test]
    fn hincrby_never_attaches_ttl() {
        let db = Db::new(HashConfig::default());
        db.hincrby(Bytes::from_static(b"h"), Bytes::from_static(b"counter"), 1).unwrap();
        let ttls = db.httl(b"h", &[Bytes::from_static(b"counter")], false, false).unwrap();
        assert_eq!(ttls, vec![-1]);
    }

    #[test]
    fn hincrbyfloat_formats_whole_numbers_without_decimal() {
        let db = Db::new(HashConfig::default());
        let res = db.hincrbyfloat(Bytes::from_static(b"h"), Bytes::from_static(b"f"), 2.0).unwrap();
        assert_eq!(res.unwrap().as_ref(), b"2");
        let res = db.hincrbyfloat(Bytes::from_static(b"h"), Bytes::from_static(b"f"), 0.5).unwrap();
        assert_eq!(res.unwrap().as_ref(), b"2.5");
    }

    #[test]
    fn httl_reports_no_field_and_no_ttl() {
        let db = Db::new(HashConfig::default());
        seed(&db);
        let res = db.httl(b"h", &[Bytes::from_static(b"a"), Bytes::from_static(b"missing")], false, false).unwrap();
        assert_eq!(res, vec![-1, -2]);
    }

    #[test]
    fn httl_reports_remaining_seconds_and_absolute_ms() {
        let db = Db::new(HashConfig::default());
        seed(&db);
        let now = now_ms();
        db.hexpire(Bytes::from_static(b"h"), &[Bytes::from_static(b"a")], now + 5_000, ExpireSetCond::None).unwrap();
        let remaining = db.httl(b"h", &[Bytes::from_static(b"a")], false, false).unwrap();
        assert!(remaining[0] > 0 && remaining[0] <= 5);
        let absolute = db.httl(b"h", &[Bytes::from_static(b"a")], true, true).unwrap();
        assert_eq!(absolute[0], (now + 5_000) as i64);
    }

    #[test]
    fn hrandfield_count_samples_without_panicking_on_empty_hash() {
        let db = Db::new(HashConfig::default());
        let res = db.hrandfield_count(b"missing", 3).unwrap();
        assert!(res.is_empty());
    }

    #[test]
    fn write_commands_emit_their_keyspace_events() {
        let db = Db::new(HashConfig::default());
        db.hset(
            Bytes::from_static(b"h"),
            vec![(Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"))],
            FieldSetCond::CreateOrOverwrite,
            false,
        )
        .unwrap();
        db.hexpire(Bytes::from_static(b"h"), &[Bytes::from_static(b"a")], now_ms() + 60_000, ExpireSetCond::None)
            .unwrap();
        db.hpersist(Bytes::from_static(b"h"), &[Bytes::from_static(b"a")]).unwrap();
        db.hincrby(Bytes::from_static(b"h"), Bytes::from_static(b"counter"), 1).unwrap();
        db.hincrbyfloat(Bytes::from_static(b"h"), Bytes::from_static(b"float"), 1.5).unwrap();
        db.hdel(&Bytes::from_static(b"h"), &[Bytes::from_static(b"a")]).unwrap();

        let events: Vec<&str> = db.drain_events().into_iter().map(|(name, _)| name).collect();
        assert!(events.contains(&"hset"), "{events:?}");
        assert!(events.contains(&"hexpire"), "{events:?}");
        assert!(events.contains(&"hpersist"), "{events:?}");
        assert!(events.contains(&"hincrby"), "{events:?}");
        assert!(events.contains(&"hincrbyfloat"), "{events:?}");
        assert!(events.contains(&"hdel"), "{events:?}");
    }

    #[test]
    fn hset_on_refused_condition_emits_no_event() {
        let db = Db::new(HashConfig::default());
        seed(&db);
        db.drain_events();
        let res = db.hset(
            Bytes::from_static(b"h"),
            vec![(Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"changed"))],
            FieldSetCond::DontOverwrite,
            false,
        );
        assert_eq!(res.unwrap(), 0);
        assert!(db.drain_events().is_empty());
    }

    #[test]
    fn lazy_expiry_on_non_last_field_emits_hdel_before_reply() {
        let db = Db::new(HashConfig::default());
        seed(&db);
        db.hexpire(Bytes::from_static(b"h"), &[Bytes::from_static(b"a")], 1, ExpireSetCond::None).unwrap();
        db.drain_events();
        std::thread::sleep(std::time::Duration::from_millis(5));

        let res = db.hget(b"h", b"a").unwrap();
        assert_eq!(res, GetRes::NotFound);
        assert!(db.exists(b"h"), "hash still has field \"b\" left");

        let events = db.drain_events();
        assert_eq!(events, vec![("hdel", Bytes::from_static(b"h"))]);
    }

    #[test]
    fn lazy_expiry_through_hmget_emits_hdel_per_field() {
        let db = Db::new(HashConfig::default());
        seed(&db);
        db.hexpire(
            Bytes::from_static(b"h"),
            &[Bytes::from_static(b"a"), Bytes::from_static(b"b")],
            1,
            ExpireSetCond::None,
        )
        .unwrap();
        db.drain_events();
        std::thread::sleep(std::time::Duration::from_millis(5));

        let res = db.hmget(b"h", &[Bytes::from_static(b"a"), Bytes::from_static(b"b")]).unwrap();
        assert_eq!(res, vec![None, None]);
        assert!(!db.exists(b"h"));

        let events = db.drain_events();
        let hdel_count = events.iter().filter(|(name, _)| *name == "hdel").count();
        assert_eq!(hdel_count, 2);
    }

    #[test]
    fn hexpire_rejects_expire_time_past_max_with_no_state_change() {
        let db = Db::new(HashConfig::default());
        seed(&db);
        db.drain_events();
        let res = db.hexpire(Bytes::from_static(b"h"), &[Bytes::from_static(b"a")], u64::MAX, ExpireSetCond::None);
        assert_eq!(res, Err(KeyError::ExpireTimeOverflow));
        assert_eq!(db.httl(b"h", &[Bytes::from_static(b"a")], false, false).unwrap(), vec![-1]);
        assert!(db.drain_events().is_empty());
    }
}
