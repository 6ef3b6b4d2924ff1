use thiserror::Error;

/// Failure to read a typed value out of a [`Storage`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("short read: {needed} byte(s) requested, {available} available")]
    ShortRead { needed: usize, available: usize },

    #[error("string payload is not valid UTF-8")]
    InvalidString,

    #[error("invalid command size {0}")]
    InvalidCommandSize(i32),
}

/// Growable byte buffer with a forward-only read cursor.
///
/// All multi-byte integers are big-endian; strings are `<i32 length>`
/// followed by that many UTF-8 bytes. Writes always append at the end,
/// reads always consume at the cursor. [`reset`](Storage::reset) drops the
/// contents and rewinds the cursor; there is no partial rewind.
#[derive(Debug, Default, Clone)]
pub struct Storage {
    data: Vec<u8>,
    pos: usize,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the contents and rewinds the read cursor.
    pub fn reset(&mut self) {
        self.data.clear();
        self.pos = 0;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True while the read cursor has bytes left to consume.
    pub fn valid_pos(&self) -> bool {
        self.pos < self.data.len()
    }

    /// The full contents, regardless of how far the cursor has moved.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn take(&mut self, n: usize) -> Result<&[u8], StorageError> {
        let available = self.data.len() - self.pos;
        if available < n {
            return Err(StorageError::ShortRead {
                needed: n,
                available,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..start + n])
    }

    pub fn read_u8(&mut self) -> Result<u8, StorageError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i32(&mut self) -> Result<i32, StorageError> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a `<i32 length><UTF-8 bytes>` string.
    pub fn read_string(&mut self) -> Result<String, StorageError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(StorageError::InvalidString);
        }
        let bytes = self.take(len as usize)?.to_vec();
        String::from_utf8(bytes).map_err(|_| StorageError::InvalidString)
    }

    /// Consumes the next `n` raw bytes.
    pub fn read_raw(&mut self, n: usize) -> Result<&[u8], StorageError> {
        self.take(n)
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes a `<i32 length><UTF-8 bytes>` string.
    pub fn write_string(&mut self, value: &str) {
        self.write_i32(value.len() as i32);
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Appends raw bytes. Appending another storage's `as_slice` copies its
    /// full contents, not just the unread tail.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}
