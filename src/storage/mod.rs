//! Hash field expiration engine
//!
//! The keyspace (`Db`) and everything under it needed to give a hash's
//! fields their own independent TTL: dual/triple encoding with
//! size-driven promotion, a two-level bucketed expiry index, lazy
//! expiry on access, a quota-bounded active sweep, and batched
//! multi-field TTL mutation.

mod active_expire;
mod bucket_set;
mod cond;
mod config;
mod db;
mod field;
mod hash;
mod hashtable;
mod listpack;
mod listpack_ex;
mod payload;
mod set_ex_batch;

pub use active_expire::{db_active_expire, ActiveExpireObserver, ActiveExpireTask, HashLookup};
pub use bucket_set::{BucketSet, ExpireAction, ExpireInfo, BUCKET_WIDTH_MS};
pub use cond::{condition_met, ExpireSetCond, FieldSetCond, SetExRes};
pub use config::{HashConfig, DEFAULT_MAX_LISTPACK_ENTRIES, DEFAULT_MAX_LISTPACK_VALUE};
pub use db::{now_ms, Db, Entry, HashBuckets, IncrError, KeyError};
pub use field::{Field, INVALID};
pub use hash::{ExistsRes, GetRes, Hash};
pub use hashtable::{FieldBuckets, HtMeta, HtStore};
pub use listpack::{LpStore, SetFlags, Value};
pub use listpack_ex::LpStoreEx;
pub use payload::{FieldPayload, HashPayload};
pub use set_ex_batch::{ApplyRes, SetExBatch, HASH_NEW_EXPIRE_DIFF_THRESHOLD};
