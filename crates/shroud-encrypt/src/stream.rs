//! `std::io` adapter over a [`SelfEncryptor`].

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::data_map::DataMap;
use crate::encryptor::SelfEncryptor;
use crate::EncryptError;

/// Cursor over a self-encrypted item.
///
/// Seeking past the end is allowed; a write there extends the item with
/// zeros. Reads at or past the end return 0 bytes.
#[derive(Debug)]
pub struct EncryptorStream {
    encryptor: SelfEncryptor,
    position: u64,
}

impl EncryptorStream {
    /// Wraps `encryptor` with the cursor at 0.
    pub fn new(encryptor: SelfEncryptor) -> Self {
        Self {
            encryptor,
            position: 0,
        }
    }

    /// Current item length.
    pub fn len(&self) -> u64 {
        self.encryptor.size()
    }

    /// Returns true for a zero-length item.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cursor position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The wrapped engine.
    pub fn get_ref(&self) -> &SelfEncryptor {
        &self.encryptor
    }

    /// Unwraps the engine.
    pub fn into_inner(self) -> SelfEncryptor {
        self.encryptor
    }

    /// Commits and returns the data map.
    pub fn into_data_map(self) -> Result<DataMap, EncryptError> {
        self.encryptor.into_data_map()
    }
}

impl Read for EncryptorStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let size = self.encryptor.size();
        if self.position >= size || buf.is_empty() {
            return Ok(0);
        }
        let n = (size - self.position).min(buf.len() as u64) as usize;
        self.encryptor.read_into(self.position, &mut buf[..n])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for EncryptorStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encryptor.write(self.position, buf)?;
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encryptor.flush()?;
        Ok(())
    }
}

impl Seek for EncryptorStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => offset_by(self.encryptor.size(), delta),
            SeekFrom::Current(delta) => offset_by(self.position, delta),
        };
        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )),
        }
    }
}

fn offset_by(base: u64, delta: i64) -> Option<u64> {
    if delta >= 0 {
        base.checked_add(delta as u64)
    } else {
        base.checked_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EncryptorConfig;
    use shroud_store::MemoryChunkStore;
    use std::sync::Arc;

    fn stream() -> EncryptorStream {
        let config = EncryptorConfig {
            chunk_size: 1024,
            queue_capacity: 8192,
            ..EncryptorConfig::default()
        };
        EncryptorStream::new(SelfEncryptor::new(Arc::new(MemoryChunkStore::new()), config).unwrap())
    }

    #[test]
    fn test_write_seek_read() {
        let mut s = stream();
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
        s.write_all(&data).unwrap();
        assert_eq!(s.len(), 5000);
        assert_eq!(s.position(), 5000);

        s.seek(SeekFrom::Start(0)).unwrap();
        let mut back = Vec::new();
        s.read_to_end(&mut back).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_seek_past_end_then_write() {
        let mut s = stream();
        s.write_all(b"head").unwrap();
        s.seek(SeekFrom::End(6)).unwrap();
        s.write_all(b"tail").unwrap();
        s.flush().unwrap();

        s.rewind().unwrap();
        let mut back = Vec::new();
        s.read_to_end(&mut back).unwrap();
        assert_eq!(back, b"head\0\0\0\0\0\0tail");
    }

    #[test]
    fn test_read_at_end_returns_zero() {
        let mut s = stream();
        s.write_all(b"abc").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(s.read(&mut buf).unwrap(), 0);
        s.seek(SeekFrom::Current(-2)).unwrap();
        assert_eq!(s.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"bc");
    }

    #[test]
    fn test_negative_seek_is_rejected() {
        let mut s = stream();
        let err = s.seek(SeekFrom::Current(-1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
