//! Persisted single-hash payload (spec.md §6)
//!
//! A flat, encoding-independent snapshot of one hash: `(field, value,
//! ttl-ms-or-0)` triples in the hash's natural iteration order. Used
//! wherever a whole hash needs to move as one unit outside the normal
//! per-field API -- `DUMP`/`RESTORE`, `COPY`, replication snapshotting --
//! none of which this crate owns itself (those are the out-of-scope
//! RDB/replication collaborators), but the encode/decode step between "a
//! `Hash`" and "bytes on the wire" is this crate's responsibility.
//!
//! Restoring never re-derives C6 membership itself: the caller owns the
//! database-wide expiry index, so `restore` only rebuilds the `Hash` and
//! hands back `min_expire_hint` for the caller to register.

use bytes::Bytes;

use super::config::HashConfig;
use super::cond::ExpireSetCond;
use super::field::{Field, INVALID};
use super::hash::Hash;
use super::listpack::SetFlags;

/// One field's persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPayload {
    pub field: Bytes,
    pub value: Bytes,
    /// Absolute expire time in milliseconds, or 0 for no TTL.
    pub ttl_ms: u64,
}

/// A whole hash, flattened for transport or snapshotting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashPayload {
    pub fields: Vec<FieldPayload>,
}

impl HashPayload {
    /// Snapshots `hash`'s current contents, including fields already due
    /// for lazy expiry (a payload is a faithful mirror, not a filter --
    /// the restoring side decides what to do with stale TTLs).
    pub fn capture(hash: &Hash) -> Self {
        let fields = hash
            .iter_pairs(false, 0)
            .into_iter()
            .map(|(field, value, ttl_ms)| FieldPayload { field, value, ttl_ms })
            .collect();
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rebuilds a `Hash` from this payload under `cfg`'s encoding
    /// thresholds, along with the hint the caller should register the new
    /// hash's key under in the database-wide expiry index (C6). Fields
    /// whose TTL has already elapsed relative to `now` are dropped rather
    /// than restored expired.
    pub fn restore(&self, key: &Bytes, cfg: &HashConfig, now: u64) -> (Hash, u64) {
        let mut hash = Hash::new();
        for entry in &self.fields {
            if entry.ttl_ms != 0 && entry.ttl_ms <= now {
                continue;
            }
            hash.set(
                key,
                Field::new(entry.field.clone()),
                entry.value.clone(),
                SetFlags::default(),
                cfg,
            );
            if entry.ttl_ms != 0 {
                hash.set_ttl(key, &entry.field, entry.ttl_ms, now, ExpireSetCond::None);
            }
        }
        let hint = hash.min_expire();
        (hash, if hint == INVALID { 0 } else { hint })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::cond::ExpireSetCond;

    fn key() -> Bytes {
        Bytes::from_static(b"h")
    }

    #[test]
    fn capture_then_restore_roundtrips_values_and_ttls() {
        let cfg = HashConfig::default();
        let mut h = Hash::new();
        h.set(&key(), Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        h.set(&key(), Field::new(Bytes::from_static(b"b")), Bytes::from_static(b"2"), SetFlags::default(), &cfg);
        h.set_ttl(&key(), b"a", 10_000, 0, ExpireSetCond::None);

        let payload = HashPayload::capture(&h);
        assert_eq!(payload.fields.len(), 2);

        let (mut restored, hint) = payload.restore(&key(), &cfg, 0);
        assert_eq!(hint, 10_000);
        assert_eq!(restored.ttl_of(b"a"), 10_000);
        assert_eq!(restored.ttl_of(b"b"), INVALID);
        assert_eq!(
            restored.get(b"b", 0, false, &mut |_| {}),
            crate::storage::hash::GetRes::Ok(Bytes::from_static(b"2"))
        );
    }

    #[test]
    fn restore_drops_already_expired_fields() {
        let cfg = HashConfig::default();
        let mut h = Hash::new();
        h.set(&key(), Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        h.set_ttl(&key(), b"a", 100, 0, ExpireSetCond::None);

        let payload = HashPayload::capture(&h);
        let (restored, hint) = payload.restore(&key(), &cfg, 500);
        assert_eq!(hint, 0);
        assert!(restored.is_empty());
    }

    #[test]
    fn restore_promotes_encoding_same_as_live_sets() {
        let cfg = HashConfig::default().with_max_listpack_entries(1);
        let mut h = Hash::new();
        h.set(&key(), Field::new(Bytes::from_static(b"a")), Bytes::from_static(b"1"), SetFlags::default(), &cfg);
        h.set(&key(), Field::new(Bytes::from_static(b"b")), Bytes::from_static(b"2"), SetFlags::default(), &cfg);

        let payload = HashPayload::capture(&h);
        let (restored, _hint) = payload.restore(&key(), &cfg, 0);
        assert_eq!(restored.len_raw(), 2);
    }
}
