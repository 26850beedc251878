//! Table log record format.
//!
//! ```text
//! +------------------+
//! | Record Length    | (u32 LE, whole record including this field)
//! +------------------+
//! | Operation        | (u8: 1 = put, 2 = remove)
//! +------------------+
//! | Hash Key         | (length-prefixed string)
//! +------------------+
//! | Range Flag       | (u8: 0 = none, 1 = present)
//! | Range Key        | (length-prefixed string, only when flagged)
//! +------------------+
//! | Item Body        | (length-prefixed JSON bytes, empty for remove)
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! The checksum covers every byte before it.

use std::io::{self, Cursor, Read};

use super::checksum::compute_checksum;
use super::ItemKey;

/// Smallest possible record: length, op, empty hash, no range, empty body, checksum
pub const MIN_RECORD_SIZE: usize = 4 + 1 + 4 + 1 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOp {
    Put = 1,
    Remove = 2,
}

impl LogOp {
    fn from_byte(byte: u8) -> io::Result<Self> {
        match byte {
            1 => Ok(LogOp::Put),
            2 => Ok(LogOp::Remove),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown log operation {}", other),
            )),
        }
    }
}

/// One persisted mutation: the full post-image for puts, the key for removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub op: LogOp,
    pub key: ItemKey,
    pub body: Vec<u8>,
}

impl LogRecord {
    pub fn put(key: ItemKey, body: Vec<u8>) -> Self {
        Self {
            op: LogOp::Put,
            key,
            body,
        }
    }

    pub fn remove(key: ItemKey) -> Self {
        Self {
            op: LogOp::Remove,
            key,
            body: Vec::new(),
        }
    }

    fn serialize_body(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(self.op as u8);

        buf.extend_from_slice(&(self.key.hash.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.key.hash.as_bytes());

        match &self.key.range {
            Some(range) => {
                buf.push(1);
                buf.extend_from_slice(&(range.len() as u32).to_le_bytes());
                buf.extend_from_slice(range.as_bytes());
            }
            None => buf.push(0),
        }

        buf.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.body);
        buf
    }

    pub fn serialize(&self) -> Vec<u8> {
        let body = self.serialize_body();
        let record_length = (4 + body.len() + 4) as u32;

        let mut record = Vec::with_capacity(record_length as usize);
        record.extend_from_slice(&record_length.to_le_bytes());
        record.extend_from_slice(&body);
        let checksum = compute_checksum(&record);
        record.extend_from_slice(&checksum.to_le_bytes());
        record
    }

    /// Parses one record from the front of `data`, verifying its checksum.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_RECORD_SIZE {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Record too short"));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_length < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record length: {}", record_length),
            ));
        }
        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Record truncated: expected {} bytes, got {}",
                    record_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = record_length - 4;
        let stored = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed = compute_checksum(&data[..checksum_offset]);
        if computed != stored {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    computed, stored
                ),
            ));
        }

        let mut cursor = Cursor::new(&data[4..checksum_offset]);

        fn read_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
            let mut len_buf = [0u8; 4];
            reader.read_exact(&mut len_buf)?;
            let mut buf = vec![0u8; u32::from_le_bytes(len_buf) as usize];
            reader.read_exact(&mut buf)?;
            Ok(buf)
        }

        fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
            String::from_utf8(read_bytes(reader)?).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e))
            })
        }

        let mut byte = [0u8; 1];
        cursor.read_exact(&mut byte)?;
        let op = LogOp::from_byte(byte[0])?;

        let hash = read_string(&mut cursor)?;
        cursor.read_exact(&mut byte)?;
        let range = match byte[0] {
            0 => None,
            _ => Some(read_string(&mut cursor)?),
        };
        let body = read_bytes(&mut cursor)?;

        Ok((
            Self {
                op,
                key: ItemKey { hash, range },
                body,
            },
            record_length,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LogRecord {
        LogRecord::put(
            ItemKey::with_range("orders-dev", "Meta"),
            br#"{"api":"orders-dev","type":"Meta"}"#.to_vec(),
        )
    }

    #[test]
    fn test_put_and_remove_parse_back() {
        for record in [sample(), LogRecord::remove(ItemKey::new("A"))] {
            let bytes = record.serialize();
            let (parsed, consumed) = LogRecord::deserialize(&bytes).unwrap();
            assert_eq!(parsed, record);
            assert_eq!(consumed, bytes.len());
        }
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut bytes = sample().serialize();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        let err = LogRecord::deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_truncated_record() {
        let bytes = sample().serialize();
        let err = LogRecord::deserialize(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_minimum_size_matches_empty_remove() {
        assert_eq!(LogRecord::remove(ItemKey::new("")).serialize().len(), MIN_RECORD_SIZE);
    }
}
