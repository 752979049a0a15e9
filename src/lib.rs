//! hfedb - an in-memory hash store with per-field expiration (HFE)
//!
//! A hash value can give each of its fields an independent TTL on top of
//! the usual whole-key expiry: `HEXPIRE key 10 FIELDS 1 f` expires just
//! `f`, not the whole hash at `key`. The store picks one of three
//! encodings per hash (plain listpack, TTL-aware listpack, hashtable),
//! promoting as a hash grows or as soon as any field gets a TTL, and
//! tracks due expirations with a two-level bucketed index so neither a
//! lazy `HGET` nor the active background sweep has to scan the whole
//! keyspace.

pub mod error;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod storage;

pub use error::HfeError;
pub use metrics::Metrics;
pub use protocol::{Command, Frame, Response, VcpCodec};
pub use server::{Config, Server};
pub use storage::{Db, Hash, HashConfig};
