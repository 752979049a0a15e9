//! Hash encoding configuration
//!
//! The options spec.md §6 names as "Named configuration options the core
//! consults". Kept as a plain struct with `with_*` builder methods, the same
//! shape as the teacher's `server::Config`.

/// Default redis-compatible listpack thresholds.
pub const DEFAULT_MAX_LISTPACK_ENTRIES: u32 = 128;
pub const DEFAULT_MAX_LISTPACK_VALUE: u32 = 64;

#[derive(Debug, Clone, Copy)]
pub struct HashConfig {
    /// Promote `LpStore`/`LpStoreEx` to `HtStore` once a hash has more
    /// than this many field/value tuples.
    pub hash_max_listpack_entries: u32,
    /// Promote once any field or value byte length exceeds this.
    pub hash_max_listpack_value: u32,
    /// Suppress lazy expiry on `get`/`exists` (e.g. loading a snapshot).
    pub lazy_expire_disabled: bool,
    /// Server is in loading mode; also suppresses lazy expiry.
    pub loading: bool,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            hash_max_listpack_entries: DEFAULT_MAX_LISTPACK_ENTRIES,
            hash_max_listpack_value: DEFAULT_MAX_LISTPACK_VALUE,
            lazy_expire_disabled: false,
            loading: false,
        }
    }
}

impl HashConfig {
    pub fn with_max_listpack_entries(mut self, n: u32) -> Self {
        self.hash_max_listpack_entries = n;
        self
    }

    pub fn with_max_listpack_value(mut self, n: u32) -> Self {
        self.hash_max_listpack_value = n;
        self
    }

    pub fn with_lazy_expire_disabled(mut self, disabled: bool) -> Self {
        self.lazy_expire_disabled = disabled;
        self
    }

    pub fn with_loading(mut self, loading: bool) -> Self {
        self.loading = loading;
        self
    }

    /// Whether lazy expiry should be suppressed for a given caller.
    ///
    /// spec.md §4.5: suppressed when loading, lazy expiry is globally
    /// disabled, or the caller is a master replication stream. Replication
    /// is out of scope (no replica role in this crate), so only the local
    /// flags apply; `is_master_session` is kept as a parameter so the
    /// policy function still matches spec.md's stated rule shape.
    pub fn suppress_lazy_expiry(&self, is_master_session: bool) -> bool {
        self.loading || self.lazy_expire_disabled || is_master_session
    }
}
