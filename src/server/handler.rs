//! Connection Handler
//!
//! Processes VCP frames and dispatches commands.

use crate::error::HfeError;
use crate::metrics::Metrics;
use crate::protocol::{Command, Response, VcpCodec};
use crate::storage::{Db, ExistsRes, FieldSetCond, GetRes, IncrError};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

/// Connection handler: one per accepted TCP connection, sharing the
/// database and metrics with every other connection.
pub struct Handler {
    db: Db,
    metrics: Arc<Metrics>,
}

impl Handler {
    /// Create a new handler
    pub fn new(db: Db, metrics: Arc<Metrics>) -> Self {
        Self { db, metrics }
    }

    /// Run the handler for a connection
    pub async fn run(self, mut framed: Framed<TcpStream, VcpCodec>) -> std::io::Result<()> {
        while let Some(result) = framed.next().await {
            let frame = result?;
            let start = Instant::now();

            let request_id = frame.header.request_id;
            let cmd_name = format!("{:?}", frame.header.opcode);

            let response = match Command::from_frame(&frame) {
                Ok(cmd) => self.execute(cmd),
                Err(e) => Response::Error(e.to_string()),
            };

            let response_frame = response.to_frame(request_id);
            framed.send(response_frame).await?;

            let elapsed = start.elapsed();
            self.metrics.record_operation(&cmd_name, elapsed);
            debug!(cmd = %cmd_name, latency = ?elapsed, "Command executed");
        }

        Ok(())
    }

    /// Execute a command and return response
    fn execute(&self, cmd: Command) -> Response {
        match cmd {
            Command::Ping => Response::Pong,

            Command::Get { key } => match self.db.get_string(&key) {
                Some(value) => Response::Value(value),
                None => Response::Nil,
            },

            Command::Set { key, value, ttl: _ } => {
                // Whole-key expiry on a plain string is out of scope here;
                // this opcode exists only to exercise WrongType against a
                // hash key.
                self.db.set_string(key, value);
                Response::Ok
            }

            Command::Del { key } => {
                let existed = self.db.del(&key);
                Response::Integer(if existed { 1 } else { 0 })
            }

            Command::Exists { key } => {
                let exists = self.db.exists(&key);
                Response::Integer(if exists { 1 } else { 0 })
            }

            Command::HSet { key, fields } => {
                let fields = fields.into_iter().map(|(f, v)| (f.into(), v)).collect();
                match self.db.hset(key, fields, FieldSetCond::CreateOrOverwrite, false) {
                    Ok(n) => Response::Integer(n as i64),
                    Err(e) => HfeError::from(e).into(),
                }
            }

            Command::HSetNx { key, field, value } => {
                match self.db.hset(key, vec![(field.into(), value)], FieldSetCond::DontOverwrite, false) {
                    Ok(n) => Response::Integer(n as i64),
                    Err(e) => HfeError::from(e).into(),
                }
            }

            Command::HGet { key, field } => match self.db.hget(&key, &field) {
                Ok(GetRes::Ok(v)) => Response::Value(v),
                Ok(_) => Response::Nil,
                Err(e) => HfeError::from(e).into(),
            },

            Command::HMGet { key, fields } => match self.db.hmget(&key, &fields) {
                Ok(values) => Response::FieldArray(values),
                Err(e) => HfeError::from(e).into(),
            },

            Command::HGetAll { key } => match self.db.hgetall(&key) {
                Ok(pairs) => Response::PairArray(pairs),
                Err(e) => HfeError::from(e).into(),
            },

            Command::HKeys { key } => match self.db.hkeys(&key) {
                Ok(keys) => Response::Array(keys),
                Err(e) => HfeError::from(e).into(),
            },

            Command::HVals { key } => match self.db.hvals(&key) {
                Ok(vals) => Response::Array(vals),
                Err(e) => HfeError::from(e).into(),
            },

            Command::HExists { key, field } => match self.db.hexists(&key, &field) {
                Ok(ExistsRes::Yes) => Response::Integer(1),
                Ok(_) => Response::Integer(0),
                Err(e) => HfeError::from(e).into(),
            },

            Command::HLen { key } => match self.db.hlen(&key) {
                Ok(n) => Response::Integer(n as i64),
                Err(e) => HfeError::from(e).into(),
            },

            Command::HStrlen { key, field } => match self.db.hstrlen(&key, &field) {
                Ok(n) => Response::Integer(n as i64),
                Err(e) => HfeError::from(e).into(),
            },

            Command::HScan { key, cursor, count } => match self.db.hscan(&key, cursor, count) {
                Ok((next_cursor, pairs)) => Response::ScanReply { cursor: next_cursor, pairs },
                Err(e) => HfeError::from(e).into(),
            },

            Command::HIncrBy { key, field, delta } => match self.db.hincrby(key, field, delta) {
                Ok(Ok(n)) => Response::Integer(n),
                Ok(Err(IncrError::NotAnInteger)) => {
                    HfeError::Syntax("hash value is not an integer".into()).into()
                }
                Ok(Err(_)) => HfeError::Syntax("increment or decrement would overflow".into()).into(),
                Err(e) => HfeError::from(e).into(),
            },

            Command::HIncrByFloat { key, field, delta } => match self.db.hincrbyfloat(key, field, delta) {
                Ok(Ok(v)) => Response::Value(v),
                Ok(Err(IncrError::NotAFloat)) => {
                    HfeError::Syntax("hash value is not a float".into()).into()
                }
                Ok(Err(_)) => HfeError::Syntax("increment would produce NaN or an infinity".into()).into(),
                Err(e) => HfeError::from(e).into(),
            },

            Command::HDel { key, fields } => match self.db.hdel(&key, &fields) {
                Ok(n) => Response::Integer(n as i64),
                Err(e) => HfeError::from(e).into(),
            },

            Command::HExpire { key, fields, expire_at_ms, cond } => {
                match self.db.hexpire(key, &fields, expire_at_ms, cond) {
                    Ok(results) => Response::IntArray(results.into_iter().map(apply_res_to_expire_code).collect()),
                    Err(e) => HfeError::from(e).into(),
                }
            }

            Command::HTtl { key, fields, absolute, unit_ms } => {
                match self.db.httl(&key, &fields, absolute, unit_ms) {
                    Ok(codes) => Response::IntArray(codes),
                    Err(e) => HfeError::from(e).into(),
                }
            }

            Command::HPersist { key, fields } => match self.db.hpersist(key, &fields) {
                Ok(results) => Response::IntArray(results.into_iter().map(apply_res_to_persist_code).collect()),
                Err(e) => HfeError::from(e).into(),
            },

            Command::HRandField { key, count, with_values } => {
                let pairs = match count {
                    None => match self.db.hrandfield(&key) {
                        Ok(Some(pair)) => vec![pair],
                        Ok(None) => Vec::new(),
                        Err(e) => return HfeError::from(e).into(),
                    },
                    Some(n) => match self.db.hrandfield_count(&key, n) {
                        Ok(pairs) => pairs,
                        Err(e) => return HfeError::from(e).into(),
                    },
                };
                if with_values {
                    Response::PairArray(pairs)
                } else {
                    Response::Array(pairs.into_iter().map(|(f, _)| f).collect())
                }
            }
        }
    }
}

/// Maps a per-field `HEXPIRE` outcome to the spec's reply code:
/// `OK(1)`/`NO_COND(0)`/`NO_FIELD(-2)`/`DELETED(2)`.
fn apply_res_to_expire_code(res: crate::storage::ApplyRes) -> i64 {
    use crate::storage::ApplyRes;
    match res {
        ApplyRes::Ok => 1,
        ApplyRes::NoConditionMet => 0,
        ApplyRes::NoField => -2,
        ApplyRes::Deleted => 2,
        ApplyRes::Updated => 1,
    }
}

/// Maps a per-field `HPERSIST` outcome to the spec's reply code:
/// `OK(1)`/`NO_TTL(-1)`/`NO_FIELD(-2)`.
fn apply_res_to_persist_code(res: crate::storage::ApplyRes) -> i64 {
    use crate::storage::ApplyRes;
    match res {
        ApplyRes::Ok => 1,
        ApplyRes::NoConditionMet => -1,
        ApplyRes::NoField => -2,
        ApplyRes::Deleted | ApplyRes::Updated => 1,
    }
}
