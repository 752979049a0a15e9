//! Field (C1)
//!
//! A hash field is just the name half of a `(field, value)` pair. The C
//! implementation this crate is modeled on embeds an expiry header and an
//! intrusive bucket-set link directly inside the field's allocation, tagging
//! the low bit of the pointer so a bucket set can hold both plain and
//! expire-attached items. Safe Rust has no equivalent trick, so the expiry
//! side of a field's state lives in the owning encoding instead (the TTL
//! column of a `LpStoreEx` tuple, or the `FieldBuckets` of a `HtStore`) and
//! `Field` itself is a thin, cheaply-cloneable handle over the bytes.
//!
//! The sentinel used throughout this crate in place of "no expiry" is
//! [`INVALID`], matching `u64::MAX` from the source.

use bytes::Bytes;

/// Sentinel meaning "no expiry" / "not present in any bucket set".
pub const INVALID: u64 = u64::MAX;

/// The name half of a hash entry.
///
/// Two fields compare equal, and hash identically, iff their bytes are
/// bytewise equal. Because `Bytes` already has exactly this semantics,
/// `Field` is a transparent wrapper rather than a new hashing scheme --
/// looking a field up by plain bytes (`&[u8]`) or by a stored `Field` goes
/// through the same `Borrow<[u8]>` impl, which is what spec.md's "stored-key
/// lookup protocol" is asking for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Field(pub Bytes);

impl Field {
    pub fn new(bytes: Bytes) -> Self {
        debug_assert!(!bytes.is_empty(), "fields must be at least 1 byte");
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl std::borrow::Borrow<[u8]> for Field {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for Field {
    fn from(b: Bytes) -> Self {
        Field::new(b)
    }
}

/// Whether an expiry reported by the storage layer means "expired at `now`".
///
/// `INVALID` fields (plain, never had a TTL) are never expired, which falls
/// out for free from the fact that `INVALID == u64::MAX`.
pub fn is_expired(expire_at: u64, now: u64) -> bool {
    expire_at < now
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_field_never_expired() {
        assert!(!is_expired(INVALID, u64::MAX - 1));
    }

    #[test]
    fn past_expiry_is_expired() {
        assert!(is_expired(100, 200));
        assert!(!is_expired(200, 200)); // expiry == now is not yet expired
        assert!(!is_expired(300, 200));
    }

    #[test]
    fn field_equality_is_bytewise() {
        let a = Field::new(Bytes::from_static(b"field"));
        let b = Field::new(Bytes::from_static(b"field"));
        assert_eq!(a, b);
        use std::borrow::Borrow;
        let slice: &[u8] = a.borrow();
        assert_eq!(slice, b"field");
    }
}
