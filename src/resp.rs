use bytes::{Buf, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::debug;

const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
const MAX_ARRAY_LEN: i64 = 1024 * 1024;
const MAX_INLINE_LEN: usize = 64 * 1024;

/// A RESP2 value. Requests arrive as arrays of bulk strings; replies use
/// every variant.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// +OK\r\n
    SimpleString(String),
    /// -ERR message\r\n
    Error(String),
    /// :1000\r\n
    Integer(i64),
    /// $6\r\nfoobar\r\n  or  $-1\r\n (null)
    BulkString(Option<Vec<u8>>),
    /// *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n  or  *0\r\n
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// A bulk reply. An empty payload is the null bulk on the wire, so it is
    /// stored as one.
    pub fn bulk_string(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        if data.is_empty() {
            RespValue::BulkString(None)
        } else {
            RespValue::BulkString(Some(data))
        }
    }

    pub fn null_bulk_string() -> Self {
        RespValue::BulkString(None)
    }

    pub fn empty_array() -> Self {
        RespValue::Array(Vec::new())
    }

    pub fn array(items: Vec<RespValue>) -> Self {
        RespValue::Array(items)
    }

    /// Build a multi-bulk value out of raw arguments, e.g. a command line.
    pub fn multi_bulk<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Vec<u8>>,
    {
        RespValue::Array(args.into_iter().map(RespValue::bulk_string).collect())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Serialize this value to RESP bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }

    /// Write RESP bytes into the given buffer.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => write_line(buf, b'+', s.as_bytes()),
            RespValue::Error(s) => write_line(buf, b'-', s.as_bytes()),
            RespValue::Integer(n) => write_line(buf, b':', n.to_string().as_bytes()),
            RespValue::BulkString(Some(data)) if !data.is_empty() => {
                write_line(buf, b'$', data.len().to_string().as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::BulkString(_) => buf.extend_from_slice(b"$-1\r\n"),
            RespValue::Array(items) => {
                write_line(buf, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.write_to(buf);
                }
            }
        }
    }

    /// Byte view of a bulk or simple string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(Some(data)) => Some(data),
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Turn a decoded request into its argument vector. Null bulk strings
    /// inside an array become empty arguments; anything but an array is not
    /// a command.
    pub fn into_args(self) -> Option<Vec<Vec<u8>>> {
        match self {
            RespValue::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    RespValue::BulkString(data) => Some(data.unwrap_or_default()),
                    RespValue::SimpleString(s) => Some(s.into_bytes()),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

fn write_line(buf: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    buf.push(prefix);
    buf.extend_from_slice(body);
    buf.extend_from_slice(b"\r\n");
}

/// Incremental RESP decoder.
///
/// Call `decode()` repeatedly as data arrives. It returns `Ok(Some(value))`
/// when a complete frame was consumed and `Ok(None)` when more data is needed.
/// Errors are either per-frame (the bad frame has been consumed and decoding
/// may continue) or fatal, see [`RespError::is_fatal`].
pub struct RespParser;

impl RespParser {
    pub fn decode(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        loop {
            let Some(nl) = find_newline(&buf[..], 0) else {
                if buf.len() > MAX_INLINE_LEN {
                    return Err(RespError::Framing("line too long".into()));
                }
                return Ok(None);
            };

            // Blank lines and lines not terminated by CRLF are dropped.
            if nl < 2 || buf[nl - 1] != b'\r' {
                buf.advance(nl + 1);
                continue;
            }

            let header_end = nl - 1;
            return match buf[0] {
                b'+' => {
                    let s = String::from_utf8_lossy(&buf[1..header_end]).into_owned();
                    buf.advance(nl + 1);
                    Ok(Some(RespValue::SimpleString(s)))
                }
                b'-' => {
                    let s = String::from_utf8_lossy(&buf[1..header_end]).into_owned();
                    buf.advance(nl + 1);
                    Ok(Some(RespValue::Error(s)))
                }
                b':' => {
                    let parsed = parse_number(&buf[1..header_end]);
                    let raw = String::from_utf8_lossy(&buf[..header_end]).into_owned();
                    buf.advance(nl + 1);
                    match parsed {
                        Some(n) => Ok(Some(RespValue::Integer(n))),
                        None => Err(RespError::InvalidData(raw)),
                    }
                }
                b'$' => match read_bulk(&buf[..], 0)? {
                    Some((value, consumed)) => {
                        buf.advance(consumed);
                        Ok(Some(value))
                    }
                    None => Ok(None),
                },
                b'*' => Self::decode_array(buf, nl),
                _ => {
                    let items: Vec<RespValue> = buf[..header_end]
                        .split(|b| *b == b' ')
                        .filter(|part| !part.is_empty())
                        .map(|part| RespValue::BulkString(Some(part.to_vec())))
                        .collect();
                    buf.advance(nl + 1);
                    if items.is_empty() {
                        continue;
                    }
                    Ok(Some(RespValue::Array(items)))
                }
            };
        }
    }

    fn decode_array(buf: &mut BytesMut, nl: usize) -> Result<Option<RespValue>, RespError> {
        let count = match parse_number(&buf[1..nl - 1]) {
            Some(n) if (0..=MAX_ARRAY_LEN).contains(&n) => n as usize,
            _ => return Err(RespError::Framing(header_text(&buf[..nl - 1]))),
        };

        let mut pos = nl + 1;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            if pos >= buf.len() {
                return Ok(None);
            }
            if buf[pos] != b'$' {
                let end = find_newline(&buf[..], pos).unwrap_or(buf.len());
                return Err(RespError::Framing(header_text(&buf[pos..end])));
            }
            match read_bulk(&buf[..], pos)? {
                Some((value, consumed)) => {
                    items.push(value);
                    pos += consumed;
                }
                None => return Ok(None),
            }
        }

        buf.advance(pos);
        Ok(Some(RespValue::Array(items)))
    }
}

/// Read one `$`-prefixed bulk frame starting at `start`. Returns the value and
/// the number of bytes it occupies, or `None` when the frame is incomplete.
fn read_bulk(buf: &[u8], start: usize) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some(nl) = find_newline(buf, start) else {
        return Ok(None);
    };
    if nl < start + 2 || buf[nl - 1] != b'\r' {
        return Err(RespError::Framing(header_text(&buf[start..nl])));
    }

    let len = match parse_number(&buf[start + 1..nl - 1]) {
        Some(-1) => return Ok(Some((RespValue::BulkString(None), nl + 1 - start))),
        Some(n) if (0..=MAX_BULK_LEN).contains(&n) => n as usize,
        _ => return Err(RespError::Framing(header_text(&buf[start..nl - 1]))),
    };

    let body = nl + 1;
    let total = body + len + 2;
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[body + len..total] != b"\r\n" {
        return Err(RespError::Framing("bulk string is not terminated by CRLF".into()));
    }

    let data = buf[body..body + len].to_vec();
    Ok(Some((RespValue::BulkString(Some(data)), total - start)))
}

fn find_newline(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .iter()
        .position(|b| *b == b'\n')
        .map(|i| i + from)
}

fn parse_number(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

fn header_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// One item of a decoded stream.
pub type Payload = Result<RespValue, RespError>;

/// Decode frames from `reader` and push them to `tx` until end of stream,
/// an I/O error, a fatal protocol error, or the receiver going away.
pub async fn decode_stream<R>(mut reader: R, tx: mpsc::Sender<Payload>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        loop {
            match RespParser::decode(&mut buf) {
                Ok(Some(value)) => {
                    if tx.send(Ok(value)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let fatal = e.is_fatal();
                    if tx.send(Err(e)).await.is_err() || fatal {
                        return;
                    }
                }
            }
        }

        match reader.read_buf(&mut buf).await {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => {
                debug!("decoder stopped: {e}");
                return;
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RespError {
    /// A single malformed frame; the stream stays usable.
    #[error("{0}")]
    InvalidData(String),

    /// The framing itself is corrupt and the stream cannot be resynchronised.
    #[error("{0}")]
    Framing(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RespError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RespError::InvalidData(_))
    }
}

impl From<RespError> for crate::error::ShardisError {
    fn from(err: RespError) -> Self {
        match err {
            RespError::Io(e) => crate::error::ShardisError::Io(e),
            other => crate::error::ShardisError::Protocol(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<Result<RespValue, String>> {
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        loop {
            match RespParser::decode(&mut buf) {
                Ok(Some(v)) => out.push(Ok(v)),
                Ok(None) => break,
                Err(e) => {
                    let fatal = e.is_fatal();
                    out.push(Err(e.to_string()));
                    if fatal {
                        break;
                    }
                }
            }
        }
        out
    }

    fn round_trip(value: RespValue) {
        let mut buf = BytesMut::from(&value.serialize()[..]);
        let decoded = RespParser::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, value);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_simple_string() {
        let mut buf = BytesMut::from("+OK\r\n");
        let result = RespParser::decode(&mut buf).unwrap().unwrap();
        assert_eq!(result, RespValue::ok());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_integer() {
        let mut buf = BytesMut::from(":-42\r\n");
        let result = RespParser::decode(&mut buf).unwrap().unwrap();
        assert_eq!(result, RespValue::Integer(-42));
    }

    #[test]
    fn test_bad_integer_is_per_frame() {
        let items = decode_all(b":abc\r\n+OK\r\n");
        assert_eq!(items.len(), 2);
        assert!(items[0].is_err());
        assert_eq!(items[1], Ok(RespValue::ok()));
    }

    #[test]
    fn test_parse_array() {
        let mut buf = BytesMut::from("*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        let result = RespParser::decode(&mut buf).unwrap().unwrap();
        assert_eq!(result, RespValue::multi_bulk(["foo", "bar"]));
    }

    #[test]
    fn test_parse_partial_data() {
        let mut buf = BytesMut::from("*2\r\n$3\r\nfoo\r\n$3\r\nba");
        assert!(RespParser::decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"*2\r\n$3\r\nfoo\r\n$3\r\nba");
        buf.extend_from_slice(b"r\r\n");
        let result = RespParser::decode(&mut buf).unwrap().unwrap();
        assert_eq!(result, RespValue::multi_bulk(["foo", "bar"]));
    }

    #[test]
    fn test_bulk_trailer_mismatch_is_fatal() {
        let items = decode_all(b"$3\r\nfooXY+OK\r\n");
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[test]
    fn test_corrupt_length_header_is_fatal() {
        let mut buf = BytesMut::from("*x\r\n+OK\r\n");
        let err = RespParser::decode(&mut buf).unwrap_err();
        assert!(err.is_fatal());

        let mut buf = BytesMut::from("*1\r\n:1\r\n");
        assert!(RespParser::decode(&mut buf).unwrap_err().is_fatal());
    }

    #[test]
    fn test_inline_command() {
        let mut buf = BytesMut::from("SET  foo bar\r\n");
        let result = RespParser::decode(&mut buf).unwrap().unwrap();
        assert_eq!(result, RespValue::multi_bulk(["SET", "foo", "bar"]));
    }

    #[test]
    fn test_blank_and_malformed_lines_skipped() {
        let items = decode_all(b"\r\nPING\n\r\n+OK\r\n");
        assert_eq!(items, vec![Ok(RespValue::ok())]);
    }

    #[test]
    fn test_serialize_exact_bytes() {
        assert_eq!(RespValue::ok().serialize(), b"+OK\r\n");
        assert_eq!(RespValue::pong().serialize(), b"+PONG\r\n");
        assert_eq!(RespValue::integer(7).serialize(), b":7\r\n");
        assert_eq!(RespValue::null_bulk_string().serialize(), b"$-1\r\n");
        assert_eq!(RespValue::empty_array().serialize(), b"*0\r\n");
        assert_eq!(RespValue::BulkString(Some(vec![])).serialize(), b"$-1\r\n");
        assert_eq!(
            RespValue::multi_bulk(["a", ""]).serialize(),
            b"*2\r\n$1\r\na\r\n$-1\r\n"
        );
    }

    #[test]
    fn test_round_trips() {
        round_trip(RespValue::simple_string("QUEUED"));
        round_trip(RespValue::error("ERR bad thing"));
        round_trip(RespValue::integer(-9));
        round_trip(RespValue::bulk_string("hello\r\nworld"));
        round_trip(RespValue::bulk_string(""));
        round_trip(RespValue::null_bulk_string());
        round_trip(RespValue::empty_array());
        round_trip(RespValue::array(vec![
            RespValue::bulk_string("x"),
            RespValue::null_bulk_string(),
        ]));
    }

    #[test]
    fn test_into_args() {
        let value = RespValue::array(vec![
            RespValue::bulk_string("GET"),
            RespValue::null_bulk_string(),
        ]);
        assert_eq!(value.into_args(), Some(vec![b"GET".to_vec(), Vec::new()]));
        assert_eq!(RespValue::Integer(1).into_args(), None);
        assert_eq!(RespValue::ok().into_args(), None);
    }

    #[tokio::test]
    async fn test_decode_stream_ends_after_fatal_error() {
        let (tx, mut rx) = mpsc::channel(8);
        let input: &[u8] = b"+OK\r\n:zz\r\n$2\r\nabcd\r\n+NEVER\r\n";
        tokio::spawn(decode_stream(input, tx));

        assert_eq!(rx.recv().await.unwrap().unwrap(), RespValue::ok());
        assert!(!rx.recv().await.unwrap().unwrap_err().is_fatal());
        assert!(rx.recv().await.unwrap().unwrap_err().is_fatal());
        assert!(rx.recv().await.is_none());
    }
}
