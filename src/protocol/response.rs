//! VCP Response types
//!
//! Response variants for command execution results. The hash field
//! expiration command family needs three shapes the baseline string ops
//! never did: a reply code per field (`HEXPIRE`/`HTTL`/`HPERSIST`), a
//! nil-aware bulk array (`HMGET`, where a missing field must be
//! distinguishable from an empty one), and field/value pairs
//! (`HGETALL`/`HSCAN`/`HRANDFIELD WITHVALUES`).

use bytes::Bytes;

use super::frame::{Frame, OpCode};

/// Response to a command
#[derive(Debug, Clone)]
pub enum Response {
    /// Simple OK response
    Ok,

    /// Nil/null response (key not found)
    Nil,

    /// String/bytes value
    Value(Bytes),

    /// Integer value
    Integer(i64),

    /// Error response
    Error(String),

    /// Pong response (for PING)
    Pong,

    /// Array response (list of byte arrays)
    Array(Vec<Bytes>),

    /// One reply code per field: `HEXPIRE`/`HTTL`-family/`HPERSIST`.
    /// Matches spec.md's `OK(1)`/`NO_COND(0)`/`NO_FIELD(-2)`/`DELETED(2)`/
    /// `NO_TTL(-1)`/ttl-value conventions -- the caller picks the right
    /// integer per command, this type only carries the list.
    IntArray(Vec<i64>),

    /// Nil-aware bulk array: `HMGET` must report a missing field as nil,
    /// not as an absent slot, so position is preserved.
    FieldArray(Vec<Option<Bytes>>),

    /// Field/value pairs: `HGETALL`, `HRANDFIELD ... WITHVALUES`.
    PairArray(Vec<(Bytes, Bytes)>),

    /// `HSCAN`'s cursor-plus-page reply: `cursor == 0` means the scan is
    /// exhausted.
    ScanReply { cursor: u64, pairs: Vec<(Bytes, Bytes)> },
}

impl Response {
    /// Convert response to a VCP frame
    pub fn to_frame(&self, request_id: u64) -> Frame {
        use bytes::{BufMut, BytesMut};
        match self {
            Response::Ok => Frame::ok(request_id),
            Response::Nil => Frame::nil(request_id),
            Response::Value(data) => Frame::value(request_id, data.clone()),
            Response::Integer(n) => Frame::integer(request_id, *n),
            Response::Error(msg) => Frame::error(request_id, msg),
            Response::Pong => Frame::pong(request_id),
            Response::Array(items) => {
                let mut buf = BytesMut::new();
                buf.put_u32(items.len() as u32);
                for item in items {
                    buf.put_u32(item.len() as u32);
                    buf.put_slice(item);
                }
                Frame::new(OpCode::Array, request_id, buf.freeze())
            }
            Response::IntArray(codes) => {
                let mut buf = BytesMut::new();
                buf.put_u32(codes.len() as u32);
                for code in codes {
                    buf.put_i64(*code);
                }
                Frame::new(OpCode::IntArray, request_id, buf.freeze())
            }
            Response::FieldArray(items) => {
                let mut buf = BytesMut::new();
                buf.put_u32(items.len() as u32);
                for item in items {
                    match item {
                        Some(v) => {
                            buf.put_u8(1);
                            buf.put_u32(v.len() as u32);
                            buf.put_slice(v);
                        }
                        None => buf.put_u8(0),
                    }
                }
                Frame::new(OpCode::FieldArray, request_id, buf.freeze())
            }
            Response::PairArray(pairs) => {
                let mut buf = BytesMut::new();
                buf.put_u32(pairs.len() as u32);
                for (field, value) in pairs {
                    buf.put_u32(field.len() as u32);
                    buf.put_slice(field);
                    buf.put_u32(value.len() as u32);
                    buf.put_slice(value);
                }
                Frame::new(OpCode::PairArray, request_id, buf.freeze())
            }
            Response::ScanReply { cursor, pairs } => {
                let mut buf = BytesMut::new();
                buf.put_u64(*cursor);
                buf.put_u32(pairs.len() as u32);
                for (field, value) in pairs {
                    buf.put_u32(field.len() as u32);
                    buf.put_slice(field);
                    buf.put_u32(value.len() as u32);
                    buf.put_slice(value);
                }
                Frame::new(OpCode::ScanReply, request_id, buf.freeze())
            }
        }
    }

    /// Parse response from a VCP frame
    pub fn from_frame(frame: &Frame) -> std::io::Result<Self> {
        use bytes::Buf;
        match frame.header.opcode {
            OpCode::Ok => Ok(Response::Ok),
            OpCode::Nil => Ok(Response::Nil),
            OpCode::Pong => Ok(Response::Pong),
            OpCode::Value => Ok(Response::Value(frame.payload.clone())),
            OpCode::Integer => {
                if frame.payload.len() >= 8 {
                    let bytes: [u8; 8] = frame.payload[..8].try_into().unwrap();
                    Ok(Response::Integer(i64::from_be_bytes(bytes)))
                } else {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "Invalid integer payload",
                    ))
                }
            }
            OpCode::Error => {
                let msg = String::from_utf8_lossy(&frame.payload).to_string();
                Ok(Response::Error(msg))
            }
            OpCode::Array => {
                if frame.payload.len() < 4 {
                    return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "Invalid array payload"));
                }
                let mut buf = frame.payload.clone();
                let count = buf.get_u32() as usize;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    if buf.remaining() < 4 {
                        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "Insufficient array data"));
                    }
                    let len = buf.get_u32() as usize;
                    if buf.remaining() < len {
                        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "Insufficient item data"));
                    }
                    items.push(buf.copy_to_bytes(len));
                }
                Ok(Response::Array(items))
            }
            OpCode::IntArray => {
                if frame.payload.len() < 4 {
                    return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "Invalid int-array payload"));
                }
                let mut buf = frame.payload.clone();
                let count = buf.get_u32() as usize;
                let mut codes = Vec::with_capacity(count);
                for _ in 0..count {
                    if buf.remaining() < 8 {
                        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "Insufficient int-array data"));
                    }
                    codes.push(buf.get_i64());
                }
                Ok(Response::IntArray(codes))
            }
            OpCode::FieldArray => {
                if frame.payload.len() < 4 {
                    return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "Invalid field-array payload"));
                }
                let mut buf = frame.payload.clone();
                let count = buf.get_u32() as usize;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    if !buf.has_remaining() {
                        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "Insufficient field-array data"));
                    }
                    let present = buf.get_u8() != 0;
                    if !present {
                        items.push(None);
                        continue;
                    }
                    if buf.remaining() < 4 {
                        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "Insufficient field-array length"));
                    }
                    let len = buf.get_u32() as usize;
                    if buf.remaining() < len {
                        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "Insufficient field-array value"));
                    }
                    items.push(Some(buf.copy_to_bytes(len)));
                }
                Ok(Response::FieldArray(items))
            }
            OpCode::PairArray => {
                if frame.payload.len() < 4 {
                    return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "Invalid pair-array payload"));
                }
                let mut buf = frame.payload.clone();
                let count = buf.get_u32() as usize;
                let mut pairs = Vec::with_capacity(count);
                for _ in 0..count {
                    if buf.remaining() < 4 {
                        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "Insufficient pair-array field length"));
                    }
                    let flen = buf.get_u32() as usize;
                    if buf.remaining() < flen {
                        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "Insufficient pair-array field"));
                    }
                    let field = buf.copy_to_bytes(flen);
                    if buf.remaining() < 4 {
                        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "Insufficient pair-array value length"));
                    }
                    let vlen = buf.get_u32() as usize;
                    if buf.remaining() < vlen {
                        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "Insufficient pair-array value"));
                    }
                    let value = buf.copy_to_bytes(vlen);
                    pairs.push((field, value));
                }
                Ok(Response::PairArray(pairs))
            }
            OpCode::ScanReply => {
                if frame.payload.len() < 12 {
                    return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "Invalid scan-reply payload"));
                }
                let mut buf = frame.payload.clone();
                let cursor = buf.get_u64();
                let count = buf.get_u32() as usize;
                let mut pairs = Vec::with_capacity(count);
                for _ in 0..count {
                    if buf.remaining() < 4 {
                        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "Insufficient scan-reply field length"));
                    }
                    let flen = buf.get_u32() as usize;
                    if buf.remaining() < flen {
                        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "Insufficient scan-reply field"));
                    }
                    let field = buf.copy_to_bytes(flen);
                    if buf.remaining() < 4 {
                        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "Insufficient scan-reply value length"));
                    }
                    let vlen = buf.get_u32() as usize;
                    if buf.remaining() < vlen {
                        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "Insufficient scan-reply value"));
                    }
                    let value = buf.copy_to_bytes(vlen);
                    pairs.push((field, value));
                }
                Ok(Response::ScanReply { cursor, pairs })
            }
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unexpected opcode for response: {:?}", frame.header.opcode),
            )),
        }
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Ok => write!(f, "OK"),
            Response::Nil => write!(f, "(nil)"),
            Response::Value(data) => {
                let s = String::from_utf8_lossy(data);
                write!(f, "\"{}\"", s)
            }
            Response::Integer(n) => write!(f, "(integer) {}", n),
            Response::Error(msg) => write!(f, "(error) {}", msg),
            Response::Pong => write!(f, "PONG"),
            Response::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    let s = String::from_utf8_lossy(item);
                    write!(f, "\"{}\"", s)?;
                }
                write!(f, "]")
            }
            Response::IntArray(codes) => {
                write!(f, "[")?;
                for (i, code) in codes.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", code)?;
                }
                write!(f, "]")
            }
            Response::FieldArray(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    match item {
                        Some(v) => write!(f, "\"{}\"", String::from_utf8_lossy(v))?,
                        None => write!(f, "(nil)")?,
                    }
                }
                write!(f, "]")
            }
            Response::PairArray(pairs) => {
                write!(f, "[")?;
                for (i, (field, value)) in pairs.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(
                        f,
                        "\"{}\" => \"{}\"",
                        String::from_utf8_lossy(field),
                        String::from_utf8_lossy(value)
                    )?;
                }
                write!(f, "]")
            }
            Response::ScanReply { cursor, pairs } => {
                write!(f, "cursor={} [", cursor)?;
                for (i, (field, value)) in pairs.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(
                        f,
                        "\"{}\" => \"{}\"",
                        String::from_utf8_lossy(field),
                        String::from_utf8_lossy(value)
                    )?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_array_roundtrips_through_frame() {
        let resp = Response::IntArray(vec![1, 0, -2, 2]);
        let frame = resp.to_frame(1);
        let parsed = Response::from_frame(&frame).unwrap();
        match parsed {
            Response::IntArray(codes) => assert_eq!(codes, vec![1, 0, -2, 2]),
            _ => panic!("expected IntArray"),
        }
    }

    #[test]
    fn field_array_preserves_nil_positions() {
        let resp = Response::FieldArray(vec![Some(Bytes::from_static(b"v")), None, Some(Bytes::from_static(b"w"))]);
        let frame = resp.to_frame(1);
        let parsed = Response::from_frame(&frame).unwrap();
        match parsed {
            Response::FieldArray(items) => {
                assert_eq!(items[0], Some(Bytes::from_static(b"v")));
                assert_eq!(items[1], None);
                assert_eq!(items[2], Some(Bytes::from_static(b"w")));
            }
            _ => panic!("expected FieldArray"),
        }
    }

    #[test]
    fn pair_array_roundtrips() {
        let resp = Response::PairArray(vec![
            (Bytes::from_static(b"a"), Bytes::from_static(b"1")),
            (Bytes::from_static(b"b"), Bytes::from_static(b"2")),
        ]);
        let frame = resp.to_frame(1);
        let parsed = Response::from_frame(&frame).unwrap();
        match parsed {
            Response::PairArray(pairs) => {
                assert_eq!(pairs.len(), 2);
                assert_eq!(pairs[0].0.as_ref(), b"a");
            }
            _ => panic!("expected PairArray"),
        }
    }

    #[test]
    fn scan_reply_roundtrips_cursor_and_pairs() {
        let resp = Response::ScanReply {
            cursor: 7,
            pairs: vec![(Bytes::from_static(b"a"), Bytes::from_static(b"1"))],
        };
        let frame = resp.to_frame(1);
        let parsed = Response::from_frame(&frame).unwrap();
        match parsed {
            Response::ScanReply { cursor, pairs } => {
                assert_eq!(cursor, 7);
                assert_eq!(pairs.len(), 1);
            }
            _ => panic!("expected ScanReply"),
        }
    }
}
