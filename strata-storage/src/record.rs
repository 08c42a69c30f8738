//! Record codec: the single binary shape shared by WAL payloads and
//! sorted-run block entries.
//!
//! ## Encoding
//!
//! ```text
//! ┌──────────────┬────────────────┬──────────────┬─────────────────┬───────────┬─────┬───────┐
//! │ key_len (4)  │ value_len (4)  │ sequence (8) │ expires_at (8)  │ flags (1) │ key │ value │
//! └──────────────┴────────────────┴──────────────┴─────────────────┴───────────┴─────┴───────┘
//! ```
//!
//! All integers little-endian. `expires_at` of 0 means "never expires".
//! Flag bit 0 marks a tombstone; a tombstone's value is always empty.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use strata_core::error::{Error, Result};

/// Fixed portion of an encoded record, before key and value bytes.
pub const RECORD_HEADER_SIZE: usize = 4 + 4 + 8 + 8 + 1;

const FLAG_TOMBSTONE: u8 = 0b0000_0001;

/// One versioned key-value entry.
///
/// Ordering between records with equal keys is resolved by sequence
/// number: higher wins. A tombstone logically removes the key as of its
/// sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Bytes,
    pub value: Bytes,
    pub sequence: u64,
    /// Unix seconds after which the record is invisible; `None` = never.
    pub expires_at: Option<u64>,
    pub tombstone: bool,
}

impl Record {
    pub fn put(key: Bytes, value: Bytes, sequence: u64, expires_at: Option<u64>) -> Self {
        Self {
            key,
            value,
            sequence,
            expires_at,
            tombstone: false,
        }
    }

    pub fn tombstone(key: Bytes, sequence: u64) -> Self {
        Self {
            key,
            value: Bytes::new(),
            sequence,
            expires_at: None,
            tombstone: true,
        }
    }

    /// Whether the record has passed its expiry as of `now` (unix secs).
    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// A record is visible to reads if it is neither a tombstone nor
    /// expired.
    pub fn is_visible(&self, now: u64) -> bool {
        !self.tombstone && !self.is_expired(now)
    }

    /// Size of this record once encoded.
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// Append the encoded record to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u32_le(self.key.len() as u32);
        buf.put_u32_le(self.value.len() as u32);
        buf.put_u64_le(self.sequence);
        buf.put_u64_le(self.expires_at.unwrap_or(0));
        buf.put_u8(if self.tombstone { FLAG_TOMBSTONE } else { 0 });
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);
    }

    /// Encode into a fresh buffer.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.to_vec()
    }

    /// Decode one record from the front of `buf`, advancing it.
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < RECORD_HEADER_SIZE {
            return Err(Error::Corruption {
                message: format!(
                    "truncated record header: {} bytes remaining",
                    buf.remaining()
                ),
            });
        }

        let key_len = buf.get_u32_le() as usize;
        let value_len = buf.get_u32_le() as usize;
        let sequence = buf.get_u64_le();
        let expires_at = match buf.get_u64_le() {
            0 => None,
            at => Some(at),
        };
        let flags = buf.get_u8();

        if buf.remaining() < key_len + value_len {
            return Err(Error::Corruption {
                message: format!(
                    "truncated record body: need {} bytes, {} remaining",
                    key_len + value_len,
                    buf.remaining()
                ),
            });
        }

        let key = buf.copy_to_bytes(key_len);
        let value = buf.copy_to_bytes(value_len);

        Ok(Self {
            key,
            value,
            sequence,
            expires_at,
            tombstone: flags & FLAG_TOMBSTONE != 0,
        })
    }
}

/// Ordering used everywhere records from multiple sources meet:
/// key ascending, then sequence descending so the newest version of a
/// key always comes first.
pub fn internal_cmp(a: &Record, b: &Record) -> std::cmp::Ordering {
    a.key
        .cmp(&b.key)
        .then_with(|| b.sequence.cmp(&a.sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let rec = Record::put(
            Bytes::from_static(b"key1"),
            Bytes::from_static(b"value1"),
            42,
            Some(1_700_000_000),
        );
        let encoded = rec.encode_to_vec();
        assert_eq!(encoded.len(), rec.encoded_len());

        let decoded = Record::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn tombstone_round_trip() {
        let rec = Record::tombstone(Bytes::from_static(b"gone"), 7);
        let decoded = Record::decode(&mut rec.encode_to_vec().as_slice()).unwrap();
        assert!(decoded.tombstone);
        assert!(decoded.value.is_empty());
        assert_eq!(decoded.expires_at, None);
    }

    #[test]
    fn truncated_input_is_corruption() {
        let rec = Record::put(Bytes::from_static(b"k"), Bytes::from_static(b"v"), 1, None);
        let encoded = rec.encode_to_vec();
        let err = Record::decode(&mut &encoded[..encoded.len() - 1]).unwrap_err();
        assert_eq!(err.error_code(), "CORRUPTION");
    }

    #[test]
    fn expiry_visibility() {
        let rec = Record::put(Bytes::from_static(b"k"), Bytes::from_static(b"v"), 1, Some(100));
        assert!(rec.is_visible(99));
        assert!(!rec.is_visible(100));
        assert!(!rec.is_visible(101));

        let forever = Record::put(Bytes::from_static(b"k"), Bytes::from_static(b"v"), 1, None);
        assert!(forever.is_visible(u64::MAX));
    }

    #[test]
    fn internal_ordering_newest_first() {
        let old = Record::put(Bytes::from_static(b"a"), Bytes::from_static(b"1"), 1, None);
        let new = Record::put(Bytes::from_static(b"a"), Bytes::from_static(b"2"), 2, None);
        let other = Record::put(Bytes::from_static(b"b"), Bytes::from_static(b"3"), 0, None);

        assert_eq!(internal_cmp(&new, &old), std::cmp::Ordering::Less);
        assert_eq!(internal_cmp(&old, &other), std::cmp::Ordering::Less);
    }
}
