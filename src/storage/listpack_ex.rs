//! TTL-aware listpack encoding (C3)
//!
//! Extends C2's tuple layout with a third column (an absolute millisecond
//! TTL, `0` meaning "no TTL"). The ordering invariant from spec.md §4.2 is
//! load-bearing: tuples are kept sorted strictly ascending by TTL with all
//! `TTL == 0` tuples forming a contiguous suffix. That ordering is what lets
//! `dry_run_expired`/`expire` stop at the first non-expired tuple instead of
//! scanning the whole listpack.
//!
//! Promoted from `LpStore` the first time any field in the hash gets a TTL;
//! promotes further to `HtStore` once size/value-length limits are crossed.

use bytes::Bytes;

use super::cond::{condition_met, ExpireSetCond, SetExRes};
use super::field::{Field, INVALID};
use super::listpack::{SetFlags, Value};

/// Sort key that puts `ttl == 0` (no TTL) after every real TTL, however
/// large, reproducing "0 sorted last" with a plain ascending sort.
fn sort_key(ttl: u64) -> u64 {
    if ttl == 0 {
        u64::MAX
    } else {
        ttl
    }
}

#[derive(Debug, Clone, Default)]
pub struct LpStoreEx {
    /// (field, value, ttl); ttl == 0 means no TTL. Invariant: ascending by
    /// `sort_key(ttl)`.
    tuples: Vec<(Field, Value, u64)>,
}

impl LpStoreEx {
    pub fn new() -> Self {
        Self { tuples: Vec::new() }
    }

    /// Rebuild from an existing `LpStore` the first time a field's TTL is
    /// set (C2 -> C3 promotion). All tuples start with ttl = 0, so the
    /// relative order doesn't matter yet.
    pub fn from_lpstore(tuples: Vec<(Field, Value)>) -> Self {
        Self {
            tuples: tuples.into_iter().map(|(f, v)| (f, v, 0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    fn position(&self, field: &[u8]) -> Option<usize> {
        self.tuples.iter().position(|(f, _, _)| f.as_bytes() == field)
    }

    pub fn get(&self, field: &[u8]) -> Option<(&Value, u64)> {
        self.position(field).map(|i| (&self.tuples[i].1, self.tuples[i].2))
    }

    fn insert_sorted(&mut self, tuple: (Field, Value, u64)) {
        let key = sort_key(tuple.2);
        let pos = self.tuples.partition_point(|t| sort_key(t.2) < key);
        self.tuples.insert(pos, tuple);
    }

    /// Upsert. Existing TTL is cleared on update unless `flags.keep_field`
    /// is set (`HINCRBY`-style updates use `keep_field` to preserve TTL).
    /// Newly-appended fields always start with ttl = 0 (tail).
    pub fn set(&mut self, field: Field, value: Value, flags: SetFlags) -> bool {
        if let Some(pos) = self.position(field.as_bytes()) {
            if flags.keep_field {
                self.tuples[pos].1 = value;
            } else {
                let (f, _, _) = self.tuples.remove(pos);
                self.insert_sorted((f, value, 0));
            }
            false
        } else {
            self.insert_sorted((field, value, 0));
            true
        }
    }

    pub fn delete(&mut self, field: &[u8]) -> bool {
        if let Some(pos) = self.position(field) {
            self.tuples.remove(pos);
            true
        } else {
            false
        }
    }

    /// Sets (or clears, via `expire_at == 0` meaning persist -- callers
    /// should use [`Self::persist`] for that) the TTL of `field`, honoring
    /// `cond`. `now` is compared against `expire_at` to decide immediate
    /// deletion, per spec.md §4.2.
    pub fn set_ttl(&mut self, field: &[u8], expire_at: u64, now: u64, cond: ExpireSetCond) -> SetExRes {
        let Some(pos) = self.position(field) else {
            return SetExRes::NoField;
        };
        let current_ttl = self.tuples[pos].2;
        if !condition_met(cond, current_ttl, expire_at) {
            return SetExRes::NoConditionMet;
        }
        if expire_at <= now {
            self.tuples.remove(pos);
            return SetExRes::Deleted;
        }
        let (f, v, _) = self.tuples.remove(pos);
        self.insert_sorted((f, v, expire_at));
        SetExRes::Ok
    }

    /// Clears a field's TTL. Returns `true` if it had one.
    pub fn persist(&mut self, field: &[u8]) -> bool {
        let Some(pos) = self.position(field) else {
            return false;
        };
        if self.tuples[pos].2 == 0 {
            return false;
        }
        let (f, v, _) = self.tuples.remove(pos);
        self.insert_sorted((f, v, 0));
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Field, &Value, u64)> {
        self.tuples.iter().map(|(f, v, t)| (f, v, *t))
    }

    pub fn random_pair(&self, k: usize) -> Option<(&Field, &Value, u64)> {
        self.tuples.get(k).map(|(f, v, t)| (f, v, *t))
    }

    pub fn max_tuple_len(&self) -> usize {
        self.tuples
            .iter()
            .map(|(f, v, _)| f.as_bytes().len().max(v.len()))
            .max()
            .unwrap_or(0)
    }

    /// The first tuple's TTL, or `INVALID` if the hash has no TTL-bearing
    /// field (either empty, or the first tuple's ttl is the 0 sentinel).
    pub fn min_expire(&self) -> u64 {
        match self.tuples.first() {
            Some((_, _, 0)) | None => INVALID,
            Some((_, _, ttl)) => *ttl,
        }
    }

    /// Count of leading tuples with `0 < ttl <= now`, exploiting ordering.
    pub fn dry_run_expired(&self, now: u64) -> u32 {
        let mut count = 0u32;
        for (_, _, ttl) in &self.tuples {
            if *ttl == 0 || *ttl > now {
                break;
            }
            count += 1;
        }
        count
    }

    /// Removes leading expired tuples while `quota > 0`. Returns the
    /// number removed and the TTL of the first surviving tuple (0 if none
    /// or the next survivor has no TTL).
    pub fn expire(&mut self, now: u64, quota: u32) -> (u32, u64) {
        let mut expired = 0u32;
        while expired < quota {
            match self.tuples.first() {
                Some((_, _, ttl)) if *ttl != 0 && *ttl <= now => {
                    self.tuples.remove(0);
                    expired += 1;
                }
                _ => break,
            }
        }
        let next_expire = match self.tuples.first() {
            Some((_, _, ttl)) => *ttl,
            None => 0,
        };
        (expired, next_expire)
    }

    pub fn into_tuples(self) -> Vec<(Field, Value, u64)> {
        self.tuples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(s: &str) -> Field {
        Field::new(Bytes::copy_from_slice(s.as_bytes()))
    }

    #[test]
    fn ordering_keeps_zero_ttl_last() {
        let mut lp = LpStoreEx::new();
        lp.set(f("a"), Bytes::from_static(b"1"), SetFlags::default());
        lp.set(f("b"), Bytes::from_static(b"2"), SetFlags::default());
        lp.set_ttl(b"a", 5_000, 0, ExpireSetCond::None);
        let order: Vec<&[u8]> = lp.iter().map(|(f, _, _)| f.as_bytes()).collect();
        assert_eq!(order, vec![b"a".as_ref(), b"b".as_ref()]);
    }

    #[test]
    fn set_ttl_in_past_deletes() {
        let mut lp = LpStoreEx::new();
        lp.set(f("a"), Bytes::from_static(b"1"), SetFlags::default());
        let res = lp.set_ttl(b"a", 100, 200, ExpireSetCond::None);
        assert_eq!(res, SetExRes::Deleted);
        assert!(lp.get(b"a").is_none());
    }

    #[test]
    fn dry_run_and_expire_scan_only_leading_run() {
        let mut lp = LpStoreEx::new();
        lp.set(f("a"), Bytes::from_static(b"1"), SetFlags::default());
        lp.set(f("b"), Bytes::from_static(b"2"), SetFlags::default());
        lp.set(f("c"), Bytes::from_static(b"3"), SetFlags::default());
        lp.set_ttl(b"b", 5_000, 0, ExpireSetCond::None);
        lp.set_ttl(b"c", 1_000, 0, ExpireSetCond::None);
        assert_eq!(lp.dry_run_expired(10_000), 2);
        let (expired, next) = lp.expire(10_000, 1);
        assert_eq!(expired, 1);
        assert_eq!(next, 5_000);
        assert_eq!(lp.len(), 2);
    }

    #[test]
    fn keep_field_preserves_ttl_on_set() {
        let mut lp = LpStoreEx::new();
        lp.set(f("a"), Bytes::from_static(b"1"), SetFlags::default());
        lp.set_ttl(b"a", 5_000, 0, ExpireSetCond::None);
        lp.set(
            f("a"),
            Bytes::from_static(b"2"),
            SetFlags { keep_field: true },
        );
        assert_eq!(lp.get(b"a"), Some((&Bytes::from_static(b"2"), 5_000)));
    }

    #[test]
    fn set_without_keep_field_clears_ttl() {
        let mut lp = LpStoreEx::new();
        lp.set(f("a"), Bytes::from_static(b"1"), SetFlags::default());
        lp.set_ttl(b"a", 5_000, 0, ExpireSetCond::None);
        lp.set(f("a"), Bytes::from_static(b"2"), SetFlags::default());
        assert_eq!(lp.get(b"a"), Some((&Bytes::from_static(b"2"), 0)));
    }
}
