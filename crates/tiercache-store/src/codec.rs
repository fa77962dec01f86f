//! Envelope codec for values in the distributed tier.
//!
//! Stored layout:
//!
//! ```text
//! byte 0      format version
//! byte 1      flags (bit 0 = gzip)
//! bytes 2..10 created_at, unix milliseconds, big-endian
//! bytes 10..  JSON payload, gzip-compressed when flagged
//! ```

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use tiercache_config::CompressionConfig;
use tiercache_core::{CacheError, CacheKey, CacheResult};

/// Current envelope format version.
pub const FORMAT_VERSION: u8 = 1;

const FLAG_GZIP: u8 = 0b0000_0001;
const HEADER_LEN: usize = 10;

/// Bytes ready for the distributed tier, with sizes for observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedValue {
    /// Full envelope.
    pub bytes: Vec<u8>,
    /// Whether the payload was gzip-compressed.
    pub compressed: bool,
    /// Serialized JSON length before compression.
    pub raw_len: usize,
    /// Envelope length as stored.
    pub stored_len: usize,
}

/// A stored value reopened from its envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Serialized JSON, already decompressed.
    pub value: Vec<u8>,
    /// Whether the payload was stored compressed.
    pub compressed: bool,
    pub created_at: DateTime<Utc>,
    /// Only known on the write path; the backend owns the remaining TTL.
    pub ttl_secs: Option<u64>,
}

/// Serializer and compressor.
#[derive(Debug, Clone)]
pub struct Codec {
    threshold_bytes: usize,
    max_decompressed_bytes: usize,
    level: Compression,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(&CompressionConfig::default())
    }
}

impl Codec {
    /// Creates a codec from compression settings.
    #[must_use]
    pub fn new(config: &CompressionConfig) -> Self {
        Self {
            threshold_bytes: config.threshold_bytes,
            max_decompressed_bytes: config.max_decompressed_bytes,
            level: Compression::new(config.level.min(9)),
        }
    }

    /// Payloads longer than this are compressed when the namespace allows it.
    #[must_use]
    pub fn threshold_bytes(&self) -> usize {
        self.threshold_bytes
    }

    /// Serializes `value` and wraps it in an envelope.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T, compressible: bool) -> CacheResult<EncodedValue> {
        let payload = serde_json::to_vec(value)?;
        self.encode_payload(&payload, compressible)
    }

    /// Wraps already-serialized JSON in an envelope.
    pub fn encode_payload(&self, payload: &[u8], compressible: bool) -> CacheResult<EncodedValue> {
        let compressed = compressible && payload.len() > self.threshold_bytes;
        let created_at = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.push(FORMAT_VERSION);
        bytes.push(if compressed { FLAG_GZIP } else { 0 });
        bytes.extend_from_slice(&created_at.to_be_bytes());

        if compressed {
            let mut encoder = GzEncoder::new(bytes, self.level);
            encoder
                .write_all(payload)
                .map_err(|e| CacheError::Serialization(format!("gzip failed: {e}")))?;
            bytes = encoder
                .finish()
                .map_err(|e| CacheError::Serialization(format!("gzip failed: {e}")))?;
        } else {
            bytes.extend_from_slice(payload);
        }

        let stored_len = bytes.len();
        Ok(EncodedValue {
            bytes,
            compressed,
            raw_len: payload.len(),
            stored_len,
        })
    }

    /// Opens an envelope and deserializes its payload.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CacheResult<T> {
        let payload = self.decode_payload(bytes)?;
        serde_json::from_slice(&payload).map_err(|e| CacheError::corrupt(format!("invalid payload: {e}")))
    }

    /// Opens an envelope and returns the serialized JSON.
    pub fn decode_payload(&self, bytes: &[u8]) -> CacheResult<Vec<u8>> {
        self.unwrap_envelope(bytes).map(|(payload, _, _)| payload)
    }

    /// Reconstructs the entry metadata stored with `key`.
    pub fn open(&self, key: CacheKey, bytes: &[u8]) -> CacheResult<CacheEntry> {
        let (value, compressed, created_at) = self.unwrap_envelope(bytes)?;
        Ok(CacheEntry {
            key,
            value,
            compressed,
            created_at,
            ttl_secs: None,
        })
    }

    fn unwrap_envelope(&self, bytes: &[u8]) -> CacheResult<(Vec<u8>, bool, DateTime<Utc>)> {
        if bytes.len() < HEADER_LEN {
            return Err(CacheError::corrupt(format!("truncated header ({} bytes)", bytes.len())));
        }

        let (header, body) = bytes.split_at(HEADER_LEN);
        if header[0] != FORMAT_VERSION {
            return Err(CacheError::corrupt(format!("unsupported format version {}", header[0])));
        }
        let flags = header[1];
        if flags & !FLAG_GZIP != 0 {
            return Err(CacheError::corrupt(format!("unknown flags {flags:#010b}")));
        }

        let mut millis = [0u8; 8];
        millis.copy_from_slice(&header[2..HEADER_LEN]);
        let created_at = i64::try_from(u64::from_be_bytes(millis))
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| CacheError::corrupt("created_at out of range"))?;

        let compressed = flags & FLAG_GZIP != 0;
        let payload = if compressed {
            self.inflate(body)?
        } else {
            body.to_vec()
        };

        Ok((payload, compressed, created_at))
    }

    fn inflate(&self, body: &[u8]) -> CacheResult<Vec<u8>> {
        let limit = u64::try_from(self.max_decompressed_bytes).unwrap_or(u64::MAX);
        let mut decoder = GzDecoder::new(body).take(limit.saturating_add(1));
        let mut payload = Vec::new();
        decoder
            .read_to_end(&mut payload)
            .map_err(|e| CacheError::corrupt(format!("gzip error: {e}")))?;
        if payload.len() as u64 > limit {
            return Err(CacheError::corrupt(format!(
                "decompressed payload exceeds {} bytes",
                self.max_decompressed_bytes
            )));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tiercache_core::Namespace;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Lead {
        id: String,
        notes: String,
    }

    fn lead(notes_len: usize) -> Lead {
        Lead {
            id: "lead-123".to_string(),
            notes: "x".repeat(notes_len),
        }
    }

    #[test]
    fn test_small_payload_stored_raw() {
        let codec = Codec::default();
        let encoded = codec.encode(&lead(10), true).unwrap();
        assert!(!encoded.compressed);
        assert_eq!(encoded.bytes[0], FORMAT_VERSION);
        assert_eq!(encoded.bytes[1], 0);
        assert_eq!(encoded.stored_len, encoded.raw_len + HEADER_LEN);
        assert_eq!(codec.decode::<Lead>(&encoded.bytes).unwrap(), lead(10));
    }

    #[test]
    fn test_large_payload_compressed() {
        let codec = Codec::default();
        let value = lead(4096);
        let encoded = codec.encode(&value, true).unwrap();
        assert!(encoded.compressed);
        assert_eq!(encoded.bytes[1], FLAG_GZIP);
        assert!(encoded.stored_len < encoded.raw_len);
        assert_eq!(codec.decode::<Lead>(&encoded.bytes).unwrap(), value);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let codec = Codec::default();
        let at_threshold = vec![b'a'; 1022];
        let payload = serde_json::to_vec(&String::from_utf8(at_threshold).unwrap()).unwrap();
        assert_eq!(payload.len(), 1024);
        assert!(!codec.encode_payload(&payload, true).unwrap().compressed);

        let mut over = payload.clone();
        over.insert(1, b'a');
        assert!(codec.encode_payload(&over, true).unwrap().compressed);
    }

    #[test]
    fn test_non_compressible_namespace_stays_raw() {
        let codec = Codec::default();
        let encoded = codec.encode(&lead(4096), false).unwrap();
        assert!(!encoded.compressed);
    }

    #[test]
    fn test_corrupt_envelopes() {
        let codec = Codec::default();
        let good = codec.encode(&lead(10), true).unwrap().bytes;

        assert!(matches!(codec.decode::<Lead>(&good[..4]), Err(CacheError::CorruptEntry(_))));

        let mut bad_version = good.clone();
        bad_version[0] = 9;
        assert!(matches!(codec.decode::<Lead>(&bad_version), Err(CacheError::CorruptEntry(_))));

        let mut bad_flags = good.clone();
        bad_flags[1] = 0b10;
        assert!(matches!(codec.decode::<Lead>(&bad_flags), Err(CacheError::CorruptEntry(_))));

        let mut fake_gzip = good.clone();
        fake_gzip[1] = FLAG_GZIP;
        assert!(matches!(codec.decode::<Lead>(&fake_gzip), Err(CacheError::CorruptEntry(_))));

        let mut bad_json = good;
        bad_json.truncate(bad_json.len() - 2);
        assert!(matches!(codec.decode::<Lead>(&bad_json), Err(CacheError::CorruptEntry(_))));
    }

    #[test]
    fn test_decompression_is_bounded() {
        let writer = Codec::default();
        let encoded = writer.encode(&lead(64 * 1024), true).unwrap();
        assert!(encoded.compressed);

        let reader = Codec::new(&CompressionConfig {
            max_decompressed_bytes: 8 * 1024,
            ..Default::default()
        });
        let err = reader.decode::<Lead>(&encoded.bytes).unwrap_err();
        assert!(matches!(err, CacheError::CorruptEntry(ref m) if m.contains("exceeds")));
    }

    #[test]
    fn test_unbounded_decompression_limit() {
        let codec = Codec::new(&CompressionConfig {
            max_decompressed_bytes: usize::MAX,
            ..Default::default()
        });
        let value = lead(4096);
        let encoded = codec.encode(&value, true).unwrap();
        assert!(encoded.compressed);
        assert_eq!(codec.decode::<Lead>(&encoded.bytes).unwrap(), value);
    }

    #[test]
    fn test_open_exposes_metadata() {
        let codec = Codec::default();
        let before = Utc::now().timestamp_millis();
        let encoded = codec.encode(&lead(2048), true).unwrap();
        let key = CacheKey::new(Namespace::Lead, "lead-123", None).unwrap();

        let entry = codec.open(key.clone(), &encoded.bytes).unwrap();
        assert_eq!(entry.key, key);
        assert!(entry.compressed);
        assert!(entry.created_at.timestamp_millis() >= before);
        assert_eq!(serde_json::from_slice::<Lead>(&entry.value).unwrap(), lead(2048));
    }
}
