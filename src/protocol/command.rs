//! VCP Command Parsing
//!
//! Parses command arguments from VCP frames: the baseline string ops
//! needed to exercise `WrongType` against a hash key, plus the full hash
//! field expiration command family.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;

use super::frame::{Frame, OpCode};
use crate::storage::ExpireSetCond;

/// Parsed command from a VCP frame
#[derive(Debug, Clone)]
pub enum Command {
    Ping,

    Get { key: Bytes },

    Set {
        key: Bytes,
        value: Bytes,
        ttl: Option<u64>,
    },

    Del { key: Bytes },

    Exists { key: Bytes },

    /// `HSET key (f v)+`
    HSet { key: Bytes, fields: Vec<(Bytes, Bytes)> },

    /// `HSETNX key f v`
    HSetNx { key: Bytes, field: Bytes, value: Bytes },

    HGet { key: Bytes, field: Bytes },

    HMGet { key: Bytes, fields: Vec<Bytes> },

    HGetAll { key: Bytes },

    HKeys { key: Bytes },

    HVals { key: Bytes },

    HExists { key: Bytes, field: Bytes },

    HLen { key: Bytes },

    HStrlen { key: Bytes, field: Bytes },

    HScan { key: Bytes, cursor: u64, count: u32 },

    HIncrBy { key: Bytes, field: Bytes, delta: i64 },

    HIncrByFloat { key: Bytes, field: Bytes, delta: f64 },

    /// `HDEL key f+`
    HDel { key: Bytes, fields: Vec<Bytes> },

    /// `HEXPIRE`/`HPEXPIRE`/`HEXPIREAT`/`HPEXPIREAT`, normalized on the
    /// wire to an absolute millisecond expire time (mirroring the
    /// replication rewrite spec.md §9 describes) plus a condition flag.
    HExpire {
        key: Bytes,
        fields: Vec<Bytes>,
        expire_at_ms: u64,
        cond: ExpireSetCond,
    },

    /// `HTTL`/`HPTTL`/`HEXPIRETIME`/`HPEXPIRETIME`, disambiguated by two
    /// independent flags: `absolute` (false = remaining ttl from now, true
    /// = absolute expire time) and `unit_ms` (false = seconds, true =
    /// milliseconds) -- the four combinations are exactly the four
    /// commands.
    HTtl { key: Bytes, fields: Vec<Bytes>, absolute: bool, unit_ms: bool },

    HPersist { key: Bytes, fields: Vec<Bytes> },

    /// `HRANDFIELD key [count [WITHVALUES]]`. `count = None` is the
    /// single-field form.
    HRandField { key: Bytes, count: Option<i64>, with_values: bool },
}

fn cond_to_u8(cond: ExpireSetCond) -> u8 {
    match cond {
        ExpireSetCond::None => 0,
        ExpireSetCond::Nx => 1,
        ExpireSetCond::Xx => 2,
        ExpireSetCond::Gt => 3,
        ExpireSetCond::Lt => 4,
    }
}

fn cond_from_u8(b: u8) -> io::Result<ExpireSetCond> {
    match b {
        0 => Ok(ExpireSetCond::None),
        1 => Ok(ExpireSetCond::Nx),
        2 => Ok(ExpireSetCond::Xx),
        3 => Ok(ExpireSetCond::Gt),
        4 => Ok(ExpireSetCond::Lt),
        other => Err(io::Error::new(io::ErrorKind::InvalidData, format!("bad cond byte: {other}"))),
    }
}

impl Command {
    /// Parse command from a VCP frame
    pub fn from_frame(frame: &Frame) -> io::Result<Self> {
        match frame.header.opcode {
            OpCode::Ping => Ok(Command::Ping),

            OpCode::Get => {
                let key = Self::read_length_prefixed(&frame.payload)?;
                Ok(Command::Get { key })
            }

            OpCode::Set => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                let value = Self::read_length_prefixed_buf(&mut payload)?;
                let ttl = if payload.remaining() >= 8 {
                    let t = payload.get_u64();
                    if t > 0 { Some(t) } else { None }
                } else {
                    None
                };
                Ok(Command::Set { key, value, ttl })
            }

            OpCode::Del => {
                let key = Self::read_length_prefixed(&frame.payload)?;
                Ok(Command::Del { key })
            }

            OpCode::Exists => {
                let key = Self::read_length_prefixed(&frame.payload)?;
                Ok(Command::Exists { key })
            }

            OpCode::HSet => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                let count = Self::read_u32(&mut payload)?;
                let mut fields = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let f = Self::read_length_prefixed_buf(&mut payload)?;
                    let v = Self::read_length_prefixed_buf(&mut payload)?;
                    fields.push((f, v));
                }
                Ok(Command::HSet { key, fields })
            }

            OpCode::HSetNx => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                let field = Self::read_length_prefixed_buf(&mut payload)?;
                let value = Self::read_length_prefixed_buf(&mut payload)?;
                Ok(Command::HSetNx { key, field, value })
            }

            OpCode::HGet => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                let field = Self::read_length_prefixed_buf(&mut payload)?;
                Ok(Command::HGet { key, field })
            }

            OpCode::HMGet => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                let fields = Self::read_field_list(&mut payload)?;
                Ok(Command::HMGet { key, fields })
            }

            OpCode::HGetAll => {
                let key = Self::read_length_prefixed(&frame.payload)?;
                Ok(Command::HGetAll { key })
            }

            OpCode::HKeys => {
                let key = Self::read_length_prefixed(&frame.payload)?;
                Ok(Command::HKeys { key })
            }

            OpCode::HVals => {
                let key = Self::read_length_prefixed(&frame.payload)?;
                Ok(Command::HVals { key })
            }

            OpCode::HExists => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                let field = Self::read_length_prefixed_buf(&mut payload)?;
                Ok(Command::HExists { key, field })
            }

            OpCode::HLen => {
                let key = Self::read_length_prefixed(&frame.payload)?;
                Ok(Command::HLen { key })
            }

            OpCode::HStrlen => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                let field = Self::read_length_prefixed_buf(&mut payload)?;
                Ok(Command::HStrlen { key, field })
            }

            OpCode::HScan => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                let cursor = Self::read_u64(&mut payload)?;
                let count = Self::read_u32(&mut payload)?;
                Ok(Command::HScan { key, cursor, count })
            }

            OpCode::HIncrBy => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                let field = Self::read_length_prefixed_buf(&mut payload)?;
                if payload.remaining() < 8 {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "missing delta"));
                }
                let delta = payload.get_i64();
                Ok(Command::HIncrBy { key, field, delta })
            }

            OpCode::HIncrByFloat => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                let field = Self::read_length_prefixed_buf(&mut payload)?;
                if payload.remaining() < 8 {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "missing delta"));
                }
                let delta = payload.get_f64();
                Ok(Command::HIncrByFloat { key, field, delta })
            }

            OpCode::HDel => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                let fields = Self::read_field_list(&mut payload)?;
                Ok(Command::HDel { key, fields })
            }

            OpCode::HExpire => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                let expire_at_ms = Self::read_u64(&mut payload)?;
                if !payload.has_remaining() {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "missing cond byte"));
                }
                let cond = cond_from_u8(payload.get_u8())?;
                let fields = Self::read_field_list(&mut payload)?;
                Ok(Command::HExpire { key, fields, expire_at_ms, cond })
            }

            OpCode::HTtl => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                if payload.remaining() < 2 {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "missing absolute/unit flags"));
                }
                let absolute = payload.get_u8() != 0;
                let unit_ms = payload.get_u8() != 0;
                let fields = Self::read_field_list(&mut payload)?;
                Ok(Command::HTtl { key, fields, absolute, unit_ms })
            }

            OpCode::HPersist => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                let fields = Self::read_field_list(&mut payload)?;
                Ok(Command::HPersist { key, fields })
            }

            OpCode::HRandField => {
                let mut payload = frame.payload.clone();
                let key = Self::read_length_prefixed_buf(&mut payload)?;
                if payload.remaining() < 9 {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "missing count/flags"));
                }
                let has_count = payload.get_u8() != 0;
                let raw_count = payload.get_i64();
                let with_values = payload.has_remaining() && payload.get_u8() != 0;
                let count = if has_count { Some(raw_count) } else { None };
                Ok(Command::HRandField { key, count, with_values })
            }

            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected opcode for command: {:?}", other),
            )),
        }
    }

    /// Encode command to frame payload bytes
    pub fn encode(&self) -> (OpCode, Bytes) {
        match self {
            Command::Ping => (OpCode::Ping, Bytes::new()),

            Command::Get { key } => (OpCode::Get, Self::write_length_prefixed(key)),

            Command::Set { key, value, ttl } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                Self::write_length_prefixed_buf(&mut buf, value);
                buf.put_u64(ttl.unwrap_or(0));
                (OpCode::Set, buf.freeze())
            }

            Command::Del { key } => (OpCode::Del, Self::write_length_prefixed(key)),

            Command::Exists { key } => (OpCode::Exists, Self::write_length_prefixed(key)),

            Command::HSet { key, fields } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                buf.put_u32(fields.len() as u32);
                for (f, v) in fields {
                    Self::write_length_prefixed_buf(&mut buf, f);
                    Self::write_length_prefixed_buf(&mut buf, v);
                }
                (OpCode::HSet, buf.freeze())
            }

            Command::HSetNx { key, field, value } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                Self::write_length_prefixed_buf(&mut buf, field);
                Self::write_length_prefixed_buf(&mut buf, value);
                (OpCode::HSetNx, buf.freeze())
            }

            Command::HGet { key, field } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                Self::write_length_prefixed_buf(&mut buf, field);
                (OpCode::HGet, buf.freeze())
            }

            Command::HMGet { key, fields } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                Self::write_field_list(&mut buf, fields);
                (OpCode::HMGet, buf.freeze())
            }

            Command::HGetAll { key } => (OpCode::HGetAll, Self::write_length_prefixed(key)),
            Command::HKeys { key } => (OpCode::HKeys, Self::write_length_prefixed(key)),
            Command::HVals { key } => (OpCode::HVals, Self::write_length_prefixed(key)),

            Command::HExists { key, field } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                Self::write_length_prefixed_buf(&mut buf, field);
                (OpCode::HExists, buf.freeze())
            }

            Command::HLen { key } => (OpCode::HLen, Self::write_length_prefixed(key)),

            Command::HStrlen { key, field } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                Self::write_length_prefixed_buf(&mut buf, field);
                (OpCode::HStrlen, buf.freeze())
            }

            Command::HScan { key, cursor, count } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                buf.put_u64(*cursor);
                buf.put_u32(*count);
                (OpCode::HScan, buf.freeze())
            }

            Command::HIncrBy { key, field, delta } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                Self::write_length_prefixed_buf(&mut buf, field);
                buf.put_i64(*delta);
                (OpCode::HIncrBy, buf.freeze())
            }

            Command::HIncrByFloat { key, field, delta } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                Self::write_length_prefixed_buf(&mut buf, field);
                buf.put_f64(*delta);
                (OpCode::HIncrByFloat, buf.freeze())
            }

            Command::HDel { key, fields } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                Self::write_field_list(&mut buf, fields);
                (OpCode::HDel, buf.freeze())
            }

            Command::HExpire { key, fields, expire_at_ms, cond } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                buf.put_u64(*expire_at_ms);
                buf.put_u8(cond_to_u8(*cond));
                Self::write_field_list(&mut buf, fields);
                (OpCode::HExpire, buf.freeze())
            }

            Command::HTtl { key, fields, absolute, unit_ms } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                buf.put_u8(if *absolute { 1 } else { 0 });
                buf.put_u8(if *unit_ms { 1 } else { 0 });
                Self::write_field_list(&mut buf, fields);
                (OpCode::HTtl, buf.freeze())
            }

            Command::HPersist { key, fields } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                Self::write_field_list(&mut buf, fields);
                (OpCode::HPersist, buf.freeze())
            }

            Command::HRandField { key, count, with_values } => {
                let mut buf = BytesMut::new();
                Self::write_length_prefixed_buf(&mut buf, key);
                buf.put_u8(if count.is_some() { 1 } else { 0 });
                buf.put_i64(count.unwrap_or(0));
                buf.put_u8(if *with_values { 1 } else { 0 });
                (OpCode::HRandField, buf.freeze())
            }
        }
    }

    fn read_u32(buf: &mut Bytes) -> io::Result<u32> {
        if buf.remaining() < 4 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "missing u32"));
        }
        Ok(buf.get_u32())
    }

    fn read_u64(buf: &mut Bytes) -> io::Result<u64> {
        if buf.remaining() < 8 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "missing u64"));
        }
        Ok(buf.get_u64())
    }

    fn read_field_list(buf: &mut Bytes) -> io::Result<Vec<Bytes>> {
        let count = Self::read_u32(buf)?;
        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            fields.push(Self::read_length_prefixed_buf(buf)?);
        }
        Ok(fields)
    }

    fn write_field_list(buf: &mut BytesMut, fields: &[Bytes]) {
        buf.put_u32(fields.len() as u32);
        for f in fields {
            Self::write_length_prefixed_buf(buf, f);
        }
    }

    fn read_length_prefixed(data: &Bytes) -> io::Result<Bytes> {
        let mut buf = data.clone();
        Self::read_length_prefixed_buf(&mut buf)
    }

    fn read_length_prefixed_buf(buf: &mut Bytes) -> io::Result<Bytes> {
        if buf.remaining() < 4 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Not enough data for length prefix",
            ));
        }
        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Not enough data for payload",
            ));
        }
        Ok(buf.copy_to_bytes(len))
    }

    fn write_length_prefixed(data: &Bytes) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + data.len());
        Self::write_length_prefixed_buf(&mut buf, data);
        buf.freeze()
    }

    fn write_length_prefixed_buf(buf: &mut BytesMut, data: &Bytes) {
        buf.put_u32(data.len() as u32);
        buf.put_slice(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_command() {
        let frame = Frame::ping(1);
        let cmd = Command::from_frame(&frame).unwrap();
        assert!(matches!(cmd, Command::Ping));
    }

    #[test]
    fn test_get_command() {
        let cmd = Command::Get { key: Bytes::from_static(b"mykey") };
        let (opcode, payload) = cmd.encode();
        let frame = Frame::new(opcode, 1, payload);
        let parsed = Command::from_frame(&frame).unwrap();

        if let Command::Get { key } = parsed {
            assert_eq!(key.as_ref(), b"mykey");
        } else {
            panic!("Expected Get command");
        }
    }

    #[test]
    fn test_hset_roundtrip() {
        let cmd = Command::HSet {
            key: Bytes::from_static(b"h"),
            fields: vec![
                (Bytes::from_static(b"a"), Bytes::from_static(b"1")),
                (Bytes::from_static(b"b"), Bytes::from_static(b"2")),
            ],
        };
        let (opcode, payload) = cmd.encode();
        let frame = Frame::new(opcode, 1, payload);
        let parsed = Command::from_frame(&frame).unwrap();
        match parsed {
            Command::HSet { key, fields } => {
                assert_eq!(key.as_ref(), b"h");
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[1].0.as_ref(), b"b");
            }
            _ => panic!("Expected HSet command"),
        }
    }

    #[test]
    fn test_hexpire_roundtrip_preserves_cond() {
        let cmd = Command::HExpire {
            key: Bytes::from_static(b"h"),
            fields: vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")],
            expire_at_ms: 123_456,
            cond: ExpireSetCond::Gt,
        };
        let (opcode, payload) = cmd.encode();
        let frame = Frame::new(opcode, 7, payload);
        let parsed = Command::from_frame(&frame).unwrap();
        match parsed {
            Command::HExpire { key, fields, expire_at_ms, cond } => {
                assert_eq!(key.as_ref(), b"h");
                assert_eq!(fields.len(), 2);
                assert_eq!(expire_at_ms, 123_456);
                assert_eq!(cond, ExpireSetCond::Gt);
            }
            _ => panic!("Expected HExpire command"),
        }
    }

    #[test]
    fn test_hrandfield_without_count() {
        let cmd = Command::HRandField { key: Bytes::from_static(b"h"), count: None, with_values: false };
        let (opcode, payload) = cmd.encode();
        let frame = Frame::new(opcode, 1, payload);
        let parsed = Command::from_frame(&frame).unwrap();
        match parsed {
            Command::HRandField { count, with_values, .. } => {
                assert_eq!(count, None);
                assert!(!with_values);
            }
            _ => panic!("Expected HRandField command"),
        }
    }
}
