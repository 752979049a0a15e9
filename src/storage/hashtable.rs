//! Indexed hashtable encoding (C4)
//!
//! The encoding large or TTL-heavy hashes are promoted into. Lookup,
//! insert and delete are all O(1) amortized via `hashbrown::HashMap`
//! instead of C2/C3's linear scan; per-field TTLs live in a side
//! [`FieldBuckets`](super::bucket_set::BucketSet) rather than inline,
//! since a plain `HashMap` value slot has nowhere to also carry
//! bucket-set membership.
//!
//! `meta` is `None` until the first field in the hash gets a TTL -- most
//! hashtable-encoded hashes never use per-field expiry at all, and there's
//! no reason to pay for an (empty) bucket set and an owning-key copy until
//! something actually needs it.

use bytes::Bytes;
use hashbrown::HashMap;

use super::bucket_set::BucketSet;
use super::field::{Field, INVALID};
use super::listpack::{SetFlags, Value};

pub type FieldBuckets = BucketSet<Field>;

/// Lazily-allocated per-field-TTL bookkeeping for one hashtable-encoded hash.
#[derive(Debug)]
pub struct HtMeta {
    /// The owning hash's key, kept so `HtStore` can report it back to the
    /// database-wide C6 index without the caller threading it through.
    pub key: Bytes,
    pub bucket: FieldBuckets,
}

#[derive(Debug, Default)]
pub struct HtStore {
    map: HashMap<Field, Value>,
    meta: Option<HtMeta>,
}

impl HtStore {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            meta: None,
        }
    }

    /// Rebuild from a smaller encoding's tuples (C2/C3 -> C4 promotion).
    /// `ttls` is empty when promoting straight from `LpStore`.
    pub fn from_tuples(key: Bytes, tuples: Vec<(Field, Value, u64)>) -> Self {
        let mut map = HashMap::with_capacity(tuples.len());
        let mut bucket = FieldBuckets::new();
        for (field, value, ttl) in tuples {
            if ttl != 0 {
                bucket.add(field.clone(), ttl);
            }
            map.insert(field, value);
        }
        let meta = if bucket.is_empty() {
            None
        } else {
            Some(HtMeta { key, bucket })
        };
        Self { map, meta }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, field: &[u8]) -> Option<&Value> {
        self.map.get(field)
    }

    /// TTL of `field`, or `INVALID` if it has none (or no field ever got
    /// one, in which case `meta` doesn't even exist).
    pub fn ttl_of(&self, field: &[u8]) -> u64 {
        self.meta
            .as_ref()
            .map(|m| m.bucket.expire_of(field))
            .unwrap_or(INVALID)
    }

    pub fn has_ttls(&self) -> bool {
        self.meta.is_some()
    }

    pub fn meta(&self) -> Option<&HtMeta> {
        self.meta.as_ref()
    }

    /// Lazily allocate `meta`, e.g. the first time a TTL is attached to a
    /// field in this hash.
    fn ensure_meta(&mut self, key: &Bytes) -> &mut HtMeta {
        if self.meta.is_none() {
            self.meta = Some(HtMeta {
                key: key.clone(),
                bucket: FieldBuckets::new(),
            });
        }
        self.meta.as_mut().unwrap()
    }

    /// Upserts a `(field, value)` pair. Returns `true` if this was an
    /// insert. On update without `flags.keep_field`, any existing TTL on
    /// the field is cleared, matching the C2/C3 `set` semantics.
    pub fn set(&mut self, field: Field, value: Value, flags: SetFlags) -> bool {
        let is_new = !self.map.contains_key(field.as_bytes());
        if !is_new && !flags.keep_field {
            if let Some(meta) = self.meta.as_mut() {
                meta.bucket.remove(field.as_bytes());
            }
        }
        self.map.insert(field, value);
        is_new
    }

    pub fn delete(&mut self, field: &[u8]) -> bool {
        let Some(_) = self.map.remove(field) else {
            return false;
        };
        if let Some(meta) = self.meta.as_mut() {
            meta.bucket.remove(field);
        }
        true
    }

    /// Sets a field's TTL, allocating `meta` on first use. Returns `false`
    /// if the field doesn't exist.
    pub fn set_ttl(&mut self, key: &Bytes, field: &[u8], expire_at: u64) -> bool {
        if !self.map.contains_key(field) {
            return false;
        }
        let owned = Field::new(Bytes::copy_from_slice(field));
        self.ensure_meta(key).bucket.add(owned, expire_at);
        true
    }

    /// Clears a field's TTL. Returns `true` if it had one.
    pub fn persist(&mut self, field: &[u8]) -> bool {
        self.meta
            .as_mut()
            .map(|m| m.bucket.remove(field))
            .unwrap_or(false)
    }

    /// Removes `field` unconditionally, used by the expiry sweep (both
    /// lazy and active) once it has already decided the field is due.
    pub fn expire_field(&mut self, field: &[u8]) {
        self.map.remove(field);
        if let Some(meta) = self.meta.as_mut() {
            meta.bucket.remove(field);
        }
    }

    /// Bounded active-expiry sweep over this hash's field bucket. Removes
    /// up to `quota` due fields from both the bucket and the map, calling
    /// `on_expired` for each before it is dropped from `map`. Returns the
    /// count removed and the next scheduled expire (0 if none remain).
    pub fn expire(&mut self, now: u64, quota: u32, mut on_expired: impl FnMut(&[u8])) -> (u32, u64) {
        let Some(meta) = self.meta.as_mut() else {
            return (0, 0);
        };
        let mut due: Vec<Field> = Vec::new();
        {
            let mut collect = |field: &Field| {
                due.push(field.clone());
                super::bucket_set::ExpireAction::Remove
            };
            let mut info = super::bucket_set::ExpireInfo {
                max_to_expire: quota as u64,
                now,
                on_expire: &mut collect,
                next_expire: 0,
                items_expired: 0,
            };
            meta.bucket.expire(&mut info);
        }
        for field in &due {
            on_expired(field.as_bytes());
            self.map.remove(field.as_bytes());
        }
        let next = self.min_expire();
        (due.len() as u32, if next == INVALID { 0 } else { next })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Field, &Value)> {
        self.map.iter()
    }

    pub fn random_pair(&self) -> Option<(&Field, &Value)> {
        self.map.iter().next()
    }

    pub fn min_expire(&self) -> u64 {
        self.meta.as_ref().map(|m| m.bucket.peek_min()).unwrap_or(INVALID)
    }

    pub fn max_tuple_len(&self) -> usize {
        self.map
            .iter()
            .map(|(f, v)| f.as_bytes().len().max(v.len()))
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(s: &str) -> Field {
        Field::new(Bytes::copy_from_slice(s.as_bytes()))
    }

    fn key() -> Bytes {
        Bytes::from_static(b"myhash")
    }

    #[test]
    fn set_and_get_roundtrip() {
        let mut ht = HtStore::new();
        assert!(ht.set(f("a"), Bytes::from_static(b"1"), SetFlags::default()));
        assert!(!ht.set(f("a"), Bytes::from_static(b"2"), SetFlags::default()));
        assert_eq!(ht.get(b"a"), Some(&Bytes::from_static(b"2")));
    }

    #[test]
    fn set_ttl_allocates_meta_lazily() {
        let mut ht = HtStore::new();
        ht.set(f("a"), Bytes::from_static(b"1"), SetFlags::default());
        assert!(!ht.has_ttls());
        assert!(ht.set_ttl(&key(), b"a", 5_000));
        assert!(ht.has_ttls());
        assert_eq!(ht.ttl_of(b"a"), 5_000);
    }

    #[test]
    fn set_without_keep_field_clears_ttl() {
        let mut ht = HtStore::new();
        ht.set(f("a"), Bytes::from_static(b"1"), SetFlags::default());
        ht.set_ttl(&key(), b"a", 5_000);
        ht.set(f("a"), Bytes::from_static(b"2"), SetFlags::default());
        assert_eq!(ht.ttl_of(b"a"), INVALID);
    }

    #[test]
    fn keep_field_preserves_ttl_on_set() {
        let mut ht = HtStore::new();
        ht.set(f("a"), Bytes::from_static(b"1"), SetFlags::default());
        ht.set_ttl(&key(), b"a", 5_000);
        ht.set(f("a"), Bytes::from_static(b"2"), SetFlags { keep_field: true });
        assert_eq!(ht.ttl_of(b"a"), 5_000);
    }

    #[test]
    fn delete_clears_ttl_bookkeeping_too() {
        let mut ht = HtStore::new();
        ht.set(f("a"), Bytes::from_static(b"1"), SetFlags::default());
        ht.set_ttl(&key(), b"a", 5_000);
        assert!(ht.delete(b"a"));
        assert!(ht.get(b"a").is_none());
        assert_eq!(ht.min_expire(), INVALID);
    }

    #[test]
    fn from_tuples_promotes_existing_ttls() {
        let tuples = vec![
            (f("a"), Bytes::from_static(b"1"), 5_000u64),
            (f("b"), Bytes::from_static(b"2"), 0u64),
        ];
        let ht = HtStore::from_tuples(key(), tuples);
        assert_eq!(ht.ttl_of(b"a"), 5_000);
        assert_eq!(ht.ttl_of(b"b"), INVALID);
        assert_eq!(ht.min_expire(), 5_000);
    }
}
