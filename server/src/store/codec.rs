//! Hand-rolled length-prefixed binary codec for the handful of persisted
//! blob shapes the queue engine needs (topic-name directory, topic
//! directory, line state). Every variable-length field is a `u32`
//! little-endian length followed by raw bytes; collections are
//! length-prefixed by element count. No general-purpose serialization crate
//! is pulled in because the wire shapes are few and fixed.

use super::StorageError;

fn encoding_err(what: &str) -> StorageError {
    StorageError::Encoding(what.to_string())
}

/// Cursor over an encoded blob, tracking how many bytes have been consumed.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, StorageError> {
        let b = *self.buf.get(self.pos).ok_or_else(|| encoding_err("unexpected EOF reading u8"))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_u32(&mut self) -> Result<u32, StorageError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| encoding_err("unexpected EOF reading u32"))?;
        self.pos += 4;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64, StorageError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + 8)
            .ok_or_else(|| encoding_err("unexpected EOF reading u64"))?;
        self.pos += 8;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_bytes(&mut self) -> Result<&'a [u8], StorageError> {
        let len = self.read_u32()? as usize;
        let bytes = self
            .buf
            .get(self.pos..self.pos + len)
            .ok_or_else(|| encoding_err("unexpected EOF reading length-prefixed bytes"))?;
        self.pos += len;
        Ok(bytes)
    }

    fn read_string(&mut self) -> Result<String, StorageError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|e| encoding_err(&e.to_string()))
    }
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    write_bytes(out, s.as_bytes());
}

/// An 8-byte little-endian unsigned integer, used for `<topic>:head`,
/// `<topic>:tail`, and `<topic>/<line>:head` records.
pub fn encode_u64(value: u64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn decode_u64(bytes: &[u8]) -> Result<u64, StorageError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| encoding_err("expected 8 bytes for u64"))?;
    Ok(u64::from_le_bytes(arr))
}

/// The top-level `"UnitedQueueKey"` directory: the list of topic names.
pub fn encode_topic_directory(names: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(names.len() as u32).to_le_bytes());
    for name in names {
        write_string(&mut out, name);
    }
    out
}

pub fn decode_topic_directory(bytes: &[u8]) -> Result<Vec<String>, StorageError> {
    let mut reader = Reader::new(bytes);
    let count = reader.read_u32()?;
    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        names.push(reader.read_string()?);
    }
    Ok(names)
}

/// A topic's `{ lines: [name…], persist: bool }` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDirectory {
    pub lines: Vec<String>,
    pub persist: bool,
}

pub fn encode_topic(dir: &TopicDirectory) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(dir.lines.len() as u32).to_le_bytes());
    for line in &dir.lines {
        write_string(&mut out, line);
    }
    out.push(dir.persist as u8);
    out
}

pub fn decode_topic(bytes: &[u8]) -> Result<TopicDirectory, StorageError> {
    let mut reader = Reader::new(bytes);
    let count = reader.read_u32()?;
    let mut lines = Vec::with_capacity(count as usize);
    for _ in 0..count {
        lines.push(reader.read_string()?);
    }
    let persist = reader.read_u8()? != 0;
    Ok(TopicDirectory { lines, persist })
}

/// One in-flight entry: a message id popped but not yet confirmed, with the
/// absolute deadline (nanoseconds since epoch) at which it becomes eligible
/// for redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InflightRecord {
    pub id: u64,
    pub deadline_ns: u64,
}

/// A line's `{ inflight: [{id, deadline-ns}…], ihead }` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineState {
    pub inflight: Vec<InflightRecord>,
    pub ihead: u64,
}

pub fn encode_line(state: &LineState) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(state.inflight.len() as u32).to_le_bytes());
    for entry in &state.inflight {
        out.extend_from_slice(&entry.id.to_le_bytes());
        out.extend_from_slice(&entry.deadline_ns.to_le_bytes());
    }
    out.extend_from_slice(&state.ihead.to_le_bytes());
    out
}

pub fn decode_line(bytes: &[u8]) -> Result<LineState, StorageError> {
    let mut reader = Reader::new(bytes);
    let count = reader.read_u32()?;
    let mut inflight = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = reader.read_u64()?;
        let deadline_ns = reader.read_u64()?;
        inflight.push(InflightRecord { id, deadline_ns });
    }
    let ihead = reader.read_u64()?;
    Ok(LineState { inflight, ihead })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_roundtrip() {
        let encoded = encode_u64(u64::MAX);
        assert_eq!(decode_u64(&encoded).unwrap(), u64::MAX);
    }

    #[test]
    fn test_topic_directory_roundtrip() {
        let names = vec!["orders".to_string(), "events".to_string()];
        let encoded = encode_topic_directory(&names);
        assert_eq!(decode_topic_directory(&encoded).unwrap(), names);
    }

    #[test]
    fn test_topic_directory_empty_roundtrip() {
        let encoded = encode_topic_directory(&[]);
        assert_eq!(decode_topic_directory(&encoded).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_topic_roundtrip() {
        let dir = TopicDirectory {
            lines: vec!["consumer-a".to_string()],
            persist: true,
        };
        let encoded = encode_topic(&dir);
        assert_eq!(decode_topic(&encoded).unwrap(), dir);
    }

    #[test]
    fn test_line_roundtrip() {
        let state = LineState {
            inflight: vec![
                InflightRecord { id: 1, deadline_ns: 1_000 },
                InflightRecord { id: 2, deadline_ns: 2_000 },
            ],
            ihead: 3,
        };
        let encoded = encode_line(&state);
        assert_eq!(decode_line(&encoded).unwrap(), state);
    }

    #[test]
    fn test_line_empty_inflight_roundtrip() {
        let state = LineState { inflight: vec![], ihead: 0 };
        let encoded = encode_line(&state);
        assert_eq!(decode_line(&encoded).unwrap(), state);
    }

    #[test]
    fn test_decode_truncated_fails() {
        let encoded = encode_u64(42);
        assert!(decode_u64(&encoded[..4]).is_err());
    }
}
