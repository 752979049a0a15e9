//! Hash object (C7)
//!
//! Opaque handle holding exactly one of the three encodings and dispatching
//! every operation to it, promoting encoding as needed along the way.
//! Nothing above this layer (the database, the command handlers) ever
//! matches on which encoding is in use -- that's the entire point of
//! wrapping them in one enum.

use bytes::Bytes;
use rand::Rng;

use super::cond::{condition_met, ExpireSetCond, SetExRes};
use super::config::HashConfig;
use super::field::{Field, INVALID};
use super::hashtable::HtStore;
use super::listpack::{LpStore, SetFlags, Value};
use super::listpack_ex::LpStoreEx;

/// Result of [`Hash::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetRes {
    Ok(Value),
    NotFound,
    /// The field was lazily expired; the hash itself survives.
    Expired,
    /// The field was lazily expired and was the hash's last field, so the
    /// hash itself is now gone. Callers must delete the key.
    ExpiredHash,
}

/// Result of [`Hash::exists`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistsRes {
    Yes,
    No,
    /// Existed but was lazily expired; hash survives.
    ExpiredField,
    /// Existed, was lazily expired, and was the last field.
    ExpiredHash,
}

#[derive(Debug)]
enum Encoding {
    Lp(LpStore),
    LpEx(LpStoreEx),
    Ht(HtStore),
}

/// A single hash value, dispatching to whichever of the three encodings it
/// currently holds.
#[derive(Debug)]
pub struct Hash {
    enc: Encoding,
}

impl Hash {
    pub fn new() -> Self {
        Self { enc: Encoding::Lp(LpStore::new()) }
    }

    pub fn is_empty(&self) -> bool {
        match &self.enc {
            Encoding::Lp(lp) => lp.is_empty(),
            Encoding::LpEx(lp) => lp.is_empty(),
            Encoding::Ht(ht) => ht.is_empty(),
        }
    }

    /// Apparent length, optionally subtracting fields currently expired at
    /// `now` without actually removing them (spec property #4).
    pub fn length(&self, subtract_expired: bool, now: u64) -> u64 {
        match &self.enc {
            Encoding::Lp(lp) => lp.len() as u64,
            Encoding::LpEx(lp) => {
                let len = lp.len() as u64;
                if subtract_expired {
                    len - lp.dry_run_expired(now) as u64
                } else {
                    len
                }
            }
            Encoding::Ht(ht) => {
                let len = ht.len() as u64;
                if subtract_expired {
                    let expired = ht.meta().map(|m| m.bucket.expire_dry_run(now)).unwrap_or(0);
                    len - expired
                } else {
                    len
                }
            }
        }
    }

    pub fn dry_run_expired(&self, now: u64) -> u64 {
        match &self.enc {
            Encoding::Lp(_) => 0,
            Encoding::LpEx(lp) => lp.dry_run_expired(now) as u64,
            Encoding::Ht(ht) => ht.meta().map(|m| m.bucket.expire_dry_run(now)).unwrap_or(0),
        }
    }

    /// The hash's min field expiry (spec §3: min TTL over all
    /// expire-attached fields, `INVALID` if none).
    pub fn min_expire(&self) -> u64 {
        match &self.enc {
            Encoding::Lp(_) => INVALID,
            Encoding::LpEx(lp) => lp.min_expire(),
            Encoding::Ht(ht) => ht.min_expire(),
        }
    }

    /// Reads `field`, applying lazy expiry unless `suppress` is set.
    /// `now` and `suppress` come from the caller's config/session state
    /// (spec §4.5's lazy-expiry policy). When lazy expiry removes the
    /// field, `on_expired` is invoked with the field name before it is
    /// dropped from the backing store, so the caller can emit the
    /// field-deletion event the same way the active-expire cron does.
    pub fn get(
        &mut self,
        field: &[u8],
        now: u64,
        suppress: bool,
        on_expired: &mut dyn FnMut(&[u8]),
    ) -> GetRes {
        match &mut self.enc {
            Encoding::Lp(lp) => match lp.get(field) {
                Some(v) => GetRes::Ok(v.clone()),
                None => GetRes::NotFound,
            },
            Encoding::LpEx(lp) => match lp.get(field) {
                None => GetRes::NotFound,
                Some((v, ttl)) if ttl == 0 || suppress || ttl >= now => GetRes::Ok(v.clone()),
                Some(_) => {
                    on_expired(field);
                    lp.delete(field);
                    if lp.is_empty() {
                        GetRes::ExpiredHash
                    } else {
                        GetRes::Expired
                    }
                }
            },
            Encoding::Ht(ht) => {
                let Some(value) = ht.get(field).cloned() else {
                    return GetRes::NotFound;
                };
                let ttl = ht.ttl_of(field);
                if ttl == INVALID || suppress || ttl >= now {
                    GetRes::Ok(value)
                } else {
                    on_expired(field);
                    ht.expire_field(field);
                    if ht.is_empty() {
                        GetRes::ExpiredHash
                    } else {
                        GetRes::Expired
                    }
                }
            }
        }
    }

    pub fn exists(
        &mut self,
        field: &[u8],
        now: u64,
        suppress: bool,
        on_expired: &mut dyn FnMut(&[u8]),
    ) -> ExistsRes {
        match self.get(field, now, suppress, on_expired) {
            GetRes::Ok(_) => ExistsRes::Yes,
            GetRes::NotFound => ExistsRes::No,
            GetRes::Expired => ExistsRes::ExpiredField,
            GetRes::ExpiredHash => ExistsRes::ExpiredHash,
        }
    }

    /// Whether a would-be (field, value) tuple requires promoting past
    /// listpack encoding.
    fn exceeds_listpack_limits(&self, field: &[u8], value: &[u8], cfg: &HashConfig) -> bool {
        let next_len = match &self.enc {
            Encoding::Lp(lp) => lp.len() + 1,
            Encoding::LpEx(lp) => lp.len() + 1,
            Encoding::Ht(_) => return false,
        };
        next_len as u32 > cfg.hash_max_listpack_entries
            || field.len() as u32 > cfg.hash_max_listpack_value
            || value.len() as u32 > cfg.hash_max_listpack_value
    }

    /// Promotes `LpStore -> LpStoreEx`, a no-op if already past it.
    fn promote_to_ex(&mut self) {
        if let Encoding::Lp(lp) = &mut self.enc {
            let tuples = std::mem::take(lp).into_tuples();
            self.enc = Encoding::LpEx(LpStoreEx::from_lpstore(tuples));
        }
    }

    /// Promotes `LpStore`/`LpStoreEx` -> `HtStore`, preserving `key` for C6
    /// bookkeeping the caller already knows.
    fn promote_to_ht(&mut self, key: &Bytes) {
        match &mut self.enc {
            Encoding::Lp(lp) => {
                let tuples = std::mem::take(lp)
                    .into_tuples()
                    .into_iter()
                    .map(|(f, v)| (f, v, 0u64))
                    .collect();
                self.enc = Encoding::Ht(HtStore::from_tuples(key.clone(), tuples));
            }
            Encoding::LpEx(lp) => {
                let tuples = std::mem::take(lp).into_tuples();
                self.enc = Encoding::Ht(HtStore::from_tuples(key.clone(), tuples));
            }
            Encoding::Ht(_) => {}
        }
    }

    /// Upserts `(field, value)`, promoting encoding as needed. `key` is
    /// needed only in case this set crosses the C4 promotion threshold.
    /// Returns `true` if this was an insert.
    pub fn set(&mut self, key: &Bytes, field: Field, value: Value, flags: SetFlags, cfg: &HashConfig) -> bool {
        if self.exceeds_listpack_limits(field.as_bytes(), &value, cfg) {
            self.promote_to_ht(key);
        }
        match &mut self.enc {
            Encoding::Lp(lp) => lp.set(field, value),
            Encoding::LpEx(lp) => lp.set(field, value, flags),
            Encoding::Ht(ht) => ht.set(field, value, flags),
        }
    }

    pub fn delete(&mut self, field: &[u8]) -> bool {
        match &mut self.enc {
            Encoding::Lp(lp) => lp.delete(field),
            Encoding::LpEx(lp) => lp.delete(field),
            Encoding::Ht(ht) => ht.delete(field),
        }
    }

    /// Sets a field's TTL, handling C2->C3 and, if needed, ->C4 promotion
    /// first (spec §4.6 steps 1-3 factored out so `SetExBatch` can reuse
    /// it for its own multi-field loop).
    pub fn set_ttl(&mut self, key: &Bytes, field: &[u8], expire_at: u64, now: u64, cond: ExpireSetCond) -> SetExRes {
        self.promote_to_ex();
        match &mut self.enc {
            Encoding::Lp(_) => unreachable!("promote_to_ex always leaves LpEx or Ht"),
            Encoding::LpEx(lp) => lp.set_ttl(field, expire_at, now, cond),
            Encoding::Ht(ht) => {
                let Some(current) = (if ht.get(field).is_some() { Some(ht.ttl_of(field)) } else { None }) else {
                    return SetExRes::NoField;
                };
                let current_ttl = if current == INVALID { 0 } else { current };
                if !condition_met(cond, current_ttl, expire_at) {
                    return SetExRes::NoConditionMet;
                }
                if expire_at <= now {
                    ht.delete(field);
                    return SetExRes::Deleted;
                }
                ht.set_ttl(key, field, expire_at);
                SetExRes::Ok
            }
        }
    }

    pub fn persist(&mut self, field: &[u8]) -> bool {
        match &mut self.enc {
            Encoding::Lp(_) => false,
            Encoding::LpEx(lp) => lp.persist(field),
            Encoding::Ht(ht) => ht.persist(field),
        }
    }

    pub fn ttl_of(&self, field: &[u8]) -> u64 {
        match &self.enc {
            Encoding::Lp(_) => INVALID,
            Encoding::LpEx(lp) => lp.get(field).map(|(_, ttl)| if ttl == 0 { INVALID } else { ttl }).unwrap_or(INVALID),
            Encoding::Ht(ht) => ht.ttl_of(field),
        }
    }

    pub fn has_field(&self, field: &[u8]) -> bool {
        match &self.enc {
            Encoding::Lp(lp) => lp.get(field).is_some(),
            Encoding::LpEx(lp) => lp.get(field).is_some(),
            Encoding::Ht(ht) => ht.get(field).is_some(),
        }
    }

    pub fn iter_pairs(&self, skip_expired: bool, now: u64) -> Vec<(Bytes, Bytes, u64)> {
        match &self.enc {
            Encoding::Lp(lp) => lp
                .iter()
                .map(|(f, v)| (Bytes::copy_from_slice(f.as_bytes()), v.clone(), 0))
                .collect(),
            Encoding::LpEx(lp) => lp
                .iter()
                .filter(|(_, _, ttl)| !(skip_expired && *ttl != 0 && *ttl <= now))
                .map(|(f, v, ttl)| (Bytes::copy_from_slice(f.as_bytes()), v.clone(), ttl))
                .collect(),
            Encoding::Ht(ht) => ht
                .iter()
                .filter(|(f, _)| {
                    if !skip_expired {
                        return true;
                    }
                    let ttl = ht.ttl_of(f.as_bytes());
                    !(ttl != INVALID && ttl <= now)
                })
                .map(|(f, v)| {
                    let ttl = ht.ttl_of(f.as_bytes());
                    let ttl = if ttl == INVALID { 0 } else { ttl };
                    (Bytes::copy_from_slice(f.as_bytes()), v.clone(), ttl)
                })
                .collect(),
        }
    }

    /// Deep copy preserving encoding and per-field TTLs. Returns the new
    /// hash's min-expire so the caller can register it in the global
    /// expiry index.
    pub fn dup(&self, new_key: &Bytes) -> (Hash, u64) {
        let pairs = self.iter_pairs(false, 0);
        let mut copy = Hash::new();
        let cfg = HashConfig::default();
        for (f, v, ttl) in &pairs {
            copy.set(new_key, Field::new(f.clone()), v.clone(), SetFlags::default(), &cfg);
            if *ttl != 0 {
                copy.set_ttl(new_key, f, *ttl, 0, ExpireSetCond::None);
            }
        }
        let min = copy.min_expire();
        (copy, min)
    }

    /// `HRANDFIELD key [count]` sampling (spec.md §4.5/§6): the pool is
    /// every field not currently due for expiry. `count < 0` samples
    /// `|count|` times with replacement (duplicates allowed); `count >= 0`
    /// samples `min(count, pool.len())` distinct fields. `count == None`
    /// is the single-field form and is equivalent to `count == Some(1)`
    /// except it returns `None` rather than an empty vec on a missing
    /// hash (the caller, `Db::hrandfield`, tells those apart).
    pub fn random_count(&self, count: i64, now: u64) -> Vec<(Bytes, Bytes)> {
        let pool = self.iter_pairs(true, now);
        if pool.is_empty() {
            return Vec::new();
        }
        let mut rng = rand::rng();
        if count < 0 {
            let n = count.unsigned_abs() as usize;
            (0..n)
                .map(|_| {
                    let i = rng.random_range(0..pool.len());
                    (pool[i].0.clone(), pool[i].1.clone())
                })
                .collect()
        } else {
            let n = (count as usize).min(pool.len());
            // Partial Fisher-Yates: shuffle just the prefix we need.
            let mut indices: Vec<usize> = (0..pool.len()).collect();
            for i in 0..n {
                let j = rng.random_range(i..indices.len());
                indices.swap(i, j);
            }
            indices[..n]
                .iter()
                .map(|&i| (pool[i].0.clone(), pool[i].1.clone()))
                .collect()
        }
    }

    pub fn len_raw(&self) -> usize {
        match &self.enc {
            Encoding::Lp(lp) => lp.len(),
            Encoding::LpEx(lp) => lp.len(),
            Encoding::Ht(ht) => ht.len(),
        }
    }

    /// Local, quota-bounded expiry sweep used by `ActiveExpire` (C9) and
    /// also reusable to bound lazy cleanup. Returns `(expired_count,
    /// next_expire)`; `on_field_expired` is invoked once per removed field
    /// before it's actually dropped, so callers can emit propagation
    /// events.
    pub fn expire(&mut self, now: u64, quota: u32, mut on_field_expired: impl FnMut(&[u8])) -> (u32, u64) {
        match &mut self.enc {
            Encoding::Lp(_) => (0, 0),
            Encoding::LpEx(lp) => {
                let due: Vec<Bytes> = lp
                    .iter()
                    .take(quota as usize)
                    .filter(|(_, _, ttl)| *ttl != 0 && *ttl <= now)
                    .map(|(f, _, _)| Bytes::copy_from_slice(f.as_bytes()))
                    .collect();
                for f in &due {
                    on_field_expired(f);
                }
                lp.expire(now, quota)
            }
            Encoding::Ht(ht) => ht.expire(now, quota, &mut on_field_expired),
        }
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Bytes {
        Bytes::from_static(b"h")
    }

    #[test]
    fn plain_set_get_roundtrip() {
        let mut h = Hash::new();
        let cfg = HashConfig::default();
        h.set(&key(), Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        assert_eq!(h.get(b"a", 0, false, &mut |_| {}), GetRes::Ok(Bytes::from_static(b"1")));
        assert_eq!(h.get(b"missing", 0, false, &mut |_| {}), GetRes::NotFound);
    }

    #[test]
    fn first_ttl_promotes_to_lpex() {
        let mut h = Hash::new();
        let cfg = HashConfig::default();
        h.set(&key(), Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        let res = h.set_ttl(&key(), b"a", 10_000, 0, ExpireSetCond::None);
        assert_eq!(res, SetExRes::Ok);
        assert_eq!(h.min_expire(), 10_000);
    }

    #[test]
    fn get_past_ttl_lazily_expires_and_frees_hash_when_last() {
        let mut h = Hash::new();
        let cfg = HashConfig::default();
        h.set(&key(), Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        h.set_ttl(&key(), b"a", 100, 0, ExpireSetCond::None);
        let mut expired_fields = Vec::new();
        assert_eq!(
            h.get(b"a", 200, false, &mut |f| expired_fields.push(f.to_vec())),
            GetRes::ExpiredHash
        );
        assert!(h.is_empty());
        assert_eq!(expired_fields, vec![b"a".to_vec()]);
    }

    #[test]
    fn suppressed_lazy_expiry_still_returns_value() {
        let mut h = Hash::new();
        let cfg = HashConfig::default();
        h.set(&key(), Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        h.set_ttl(&key(), b"a", 100, 0, ExpireSetCond::None);
        assert_eq!(h.get(b"a", 200, true, &mut |_| {}), GetRes::Ok(Bytes::from_static(b"1")));
    }

    #[test]
    fn get_past_ttl_on_non_last_field_reports_expired_without_emptying() {
        let mut h = Hash::new();
        let cfg = HashConfig::default();
        h.set(&key(), Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        h.set(&key(), Field::new(Bytes::from_static(b"b")), Bytes::from_static(b"2"), SetFlags::default(), &cfg);
        h.set_ttl(&key(), b"a", 100, 0, ExpireSetCond::None);
        let mut expired_fields = Vec::new();
        assert_eq!(
            h.get(b"a", 200, false, &mut |f| expired_fields.push(f.to_vec())),
            GetRes::Expired
        );
        assert!(!h.is_empty());
        assert_eq!(expired_fields, vec![b"a".to_vec()]);
    }

    #[test]
    fn size_threshold_promotes_to_hashtable() {
        let mut h = Hash::new();
        let cfg = HashConfig::default().with_max_listpack_entries(2);
        h.set(&key(), Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        h.set(&key(), Field::new(Bytes::from_static(b"b")), Bytes::from_static(b"2"), SetFlags::default(), &cfg);
        h.set(&key(), Field::new(Bytes::from_static(b"c")), Bytes::from_static(b"3"), SetFlags::default(), &cfg);
        assert!(matches!(h.enc, Encoding::Ht(_)));
        assert_eq!(h.get(b"c", 0, false, &mut |_| {}), GetRes::Ok(Bytes::from_static(b"3")));
    }

    #[test]
    fn length_subtracts_expired() {
        let mut h = Hash::new();
        let cfg = HashConfig::default();
        h.set(&key(), Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        h.set(&key(), Field::new(Bytes::from_static(b"b")), Bytes::from_static(b"2"), SetFlags::default(), &cfg);
        h.set_ttl(&key(), b"a", 100, 0, ExpireSetCond::None);
        assert_eq!(h.length(true, 200), h.length(false, 200) - h.dry_run_expired(200));
    }

    #[test]
    fn random_count_negative_allows_duplicates() {
        let mut h = Hash::new();
        let cfg = HashConfig::default();
        h.set(&key(), Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        let sample = h.random_count(-5, 0);
        assert_eq!(sample.len(), 5);
        assert!(sample.iter().all(|(f, _)| f.as_ref() == b"a"));
    }

    #[test]
    fn random_count_positive_is_unique_and_capped_at_size() {
        let mut h = Hash::new();
        let cfg = HashConfig::default();
        h.set(&key(), Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        h.set(&key(), Field::new(Bytes::from_static(b"b")), Bytes::from_static(b"2"), SetFlags::default(), &cfg);
        let sample = h.random_count(10, 0);
        assert_eq!(sample.len(), 2);
        let mut fields: Vec<_> = sample.iter().map(|(f, _)| f.clone()).collect();
        fields.sort();
        fields.dedup();
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn random_count_skips_expired_fields() {
        let mut h = Hash::new();
        let cfg = HashConfig::default();
        h.set(&key(), Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        h.set(&key(), Field::new(Bytes::from_static(b"b")), Bytes::from_static(b"2"), SetFlags::default(), &cfg);
        h.set_ttl(&key(), b"a", 100, 0, ExpireSetCond::None);
        let sample = h.random_count(10, 200);
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].0.as_ref(), b"b");
    }

    #[test]
    fn dup_preserves_ttls() {
        let mut h = Hash::new();
        let cfg = HashConfig::default();
        h.set(&key(), Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        h.set_ttl(&key(), b"a", 10_000, 0, ExpireSetCond::None);
        let (dup, min_hint) = h.dup(&Bytes::from_static(b"h2"));
        assert_eq!(min_hint, 10_000);
        assert_eq!(dup.ttl_of(b"a"), 10_000);
    }
}
