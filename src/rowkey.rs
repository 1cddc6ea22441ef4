use crate::measurement::{Measurement, MeasurementIdentity};
use crate::window::{windows_between, TimeWindow, WindowError};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Leading two bytes of every row key produced by this codec.
pub const MAGIC_NUMBER: u16 = 0x5057;

/// Wire format version written after the magic number.
pub const VERSION: u8 = 1;

/// Default number of distinct salt buckets.
pub const DEFAULT_SALT_DIVISOR: u32 = 1000;

/// Default window duration (15 minutes).
pub const DEFAULT_WINDOW_DURATION_MILLIS: u64 = 15 * 60 * 1000;

/// Errors surfaced by the row-key codec. These are always returned to the
/// caller; a key is never silently corrupted or partially recovered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("cannot encode row key: profile name and entity must be non-empty")]
    InvalidIdentity,
    #[error("malformed row key: {0}")]
    MalformedKey(String),
}

impl From<WindowError> for CodecError {
    fn from(err: WindowError) -> Self {
        CodecError::MalformedKey(err.to_string())
    }
}

/// Encodes and decodes measurement identities as versioned, salted row keys.
///
/// Layout, big-endian throughout:
///
/// ```text
/// magic:u16 | version:u8 | salt_len:i32 | salt | name_len:i32 | name |
/// entity_len:i32 | entity | group_count:i32 | (group_len:i32 | group)* |
/// window_index:i64 | duration_millis:i64
/// ```
///
/// The salt is a deterministic function of the window index alone, rendered
/// as decimal digits so its length varies. It spreads writes for adjacent
/// windows across a partitioned store while keeping keys sortable within
/// one salt bucket.
#[derive(Debug, Clone)]
pub struct RowKeyCodec {
    salt_divisor: u32,
    window_duration_millis: u64,
}

impl Default for RowKeyCodec {
    fn default() -> Self {
        Self::new(DEFAULT_SALT_DIVISOR, DEFAULT_WINDOW_DURATION_MILLIS)
    }
}

impl RowKeyCodec {
    pub fn new(salt_divisor: u32, window_duration_millis: u64) -> Self {
        assert!(salt_divisor > 0, "salt divisor must be > 0");
        assert!(
            window_duration_millis > 0,
            "window duration must be > 0 ms"
        );
        Self {
            salt_divisor,
            window_duration_millis,
        }
    }

    pub fn salt_divisor(&self) -> u32 {
        self.salt_divisor
    }

    pub fn window_duration_millis(&self) -> u64 {
        self.window_duration_millis
    }

    /// Encodes the identity of a measurement as a row key.
    pub fn encode(&self, measurement: &Measurement) -> Result<Vec<u8>, CodecError> {
        self.encode_identity(
            measurement.profile_name(),
            measurement.entity(),
            measurement.groups(),
            measurement.window(),
        )
    }

    /// Encodes one key per window covering `[start_millis, end_millis]`,
    /// in ascending chronological order. Used to drive range scans and
    /// historical backfills.
    pub fn encode_range(
        &self,
        profile_name: &str,
        entity: &str,
        groups: &[String],
        start_millis: u64,
        end_millis: u64,
    ) -> Result<Vec<Vec<u8>>, CodecError> {
        let windows = windows_between(start_millis, end_millis, self.window_duration_millis)?;
        let mut keys = Vec::with_capacity(windows.len());
        for window in windows {
            keys.push(self.encode_identity(profile_name, entity, groups, window)?);
        }
        Ok(keys)
    }

    /// Decodes a row key back into the measurement identity it names.
    pub fn decode(&self, key: &[u8]) -> Result<MeasurementIdentity, CodecError> {
        let mut reader = KeyReader::new(key);
        let magic = reader.read_u16()?;
        if magic != MAGIC_NUMBER {
            return Err(CodecError::MalformedKey(format!(
                "unexpected magic number {magic:#06x}, expected {MAGIC_NUMBER:#06x}"
            )));
        }
        let version = reader.read_u8()?;
        if version != VERSION {
            return Err(CodecError::MalformedKey(format!(
                "unsupported version {version}, expected {VERSION}"
            )));
        }
        let salt_len = reader.read_len("salt")?;
        reader.read_bytes(salt_len, "salt")?;
        let profile_name = reader.read_string("profile name")?;
        let entity = reader.read_string("entity")?;
        let group_count = reader.read_len("group count")?;
        let mut groups = Vec::with_capacity(group_count);
        for ordinal in 0..group_count {
            groups.push(reader.read_string(&format!("group {ordinal}"))?);
        }
        let window_index = reader.read_u64("window index")?;
        let duration_millis = reader.read_u64("window duration")?;
        let window = TimeWindow::from_index(window_index, duration_millis)?;
        Ok(MeasurementIdentity {
            profile_name,
            entity,
            groups,
            window,
        })
    }

    fn encode_identity(
        &self,
        profile_name: &str,
        entity: &str,
        groups: &[String],
        window: TimeWindow,
    ) -> Result<Vec<u8>, CodecError> {
        if profile_name.is_empty() || entity.is_empty() {
            return Err(CodecError::InvalidIdentity);
        }
        let salt = encode_salt(window.index(), self.salt_divisor);
        let mut key = Vec::with_capacity(
            32 + salt.len() + profile_name.len() + entity.len() + groups.len() * 8,
        );
        key.extend_from_slice(&MAGIC_NUMBER.to_be_bytes());
        key.push(VERSION);
        put_field(&mut key, &salt);
        put_field(&mut key, profile_name.as_bytes());
        put_field(&mut key, entity.as_bytes());
        key.extend_from_slice(&(groups.len() as i32).to_be_bytes());
        for group in groups {
            put_field(&mut key, group.as_bytes());
        }
        key.extend_from_slice(&window.index().to_be_bytes());
        key.extend_from_slice(&window.duration_millis().to_be_bytes());
        Ok(key)
    }
}

/// Computes the salt bucket for a window index.
///
/// SHA-256 of the index's big-endian bytes, reduced modulo the divisor and
/// rendered as decimal digits. Repeated calls for the same inputs are
/// byte-identical, which keeps `encode` idempotent per logical window.
pub fn encode_salt(window_index: u64, salt_divisor: u32) -> Vec<u8> {
    let digest = Sha256::digest(window_index.to_be_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let bucket = u64::from_be_bytes(prefix) % u64::from(salt_divisor.max(1));
    bucket.to_string().into_bytes()
}

fn put_field(key: &mut Vec<u8>, bytes: &[u8]) {
    key.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
    key.extend_from_slice(bytes);
}

/// Bounds-checked cursor over a candidate row key. Every read that would
/// run past the end of the buffer reports an underflow instead of
/// panicking.
struct KeyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> KeyReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, count: usize, field: &str) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(count).ok_or_else(|| underflow(field))?;
        if end > self.buf.len() {
            return Err(underflow(field));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1, "version")?[0])
    }

    fn read_u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.take(2, "magic number")?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u64(&mut self, field: &str) -> Result<u64, CodecError> {
        let bytes = self.take(8, field)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(raw))
    }

    fn read_len(&mut self, field: &str) -> Result<usize, CodecError> {
        let bytes = self.take(4, field)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        let len = i32::from_be_bytes(raw);
        if len < 0 {
            return Err(CodecError::MalformedKey(format!(
                "negative length {len} for {field}"
            )));
        }
        Ok(len as usize)
    }

    fn read_bytes(&mut self, count: usize, field: &str) -> Result<&'a [u8], CodecError> {
        self.take(count, field)
    }

    fn read_string(&mut self, field: &str) -> Result<String, CodecError> {
        let len = self.read_len(field)?;
        let bytes = self.take(len, field)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CodecError::MalformedKey(format!("{field} is not valid UTF-8")))
    }
}

fn underflow(field: &str) -> CodecError {
    CodecError::MalformedKey(format!("buffer underflow while reading {field}"))
}
