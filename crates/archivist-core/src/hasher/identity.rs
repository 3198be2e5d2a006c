use crate::error::Error;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

pub const HASH_LENGTH: usize = 32;

const SHORT_HASH_BEGIN: usize = 16 * 1024;
const SHORT_HASH_MIDDLE: usize = 32 * 1024;
const SHORT_HASH_END: usize = 16 * 1024;

/// Streams at or below this length get a short hash equal to their full hash.
pub const SHORT_HASH_THRESHOLD: u64 = (SHORT_HASH_BEGIN + SHORT_HASH_MIDDLE + SHORT_HASH_END) as u64;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// A SHA-256 digest. Always exactly 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sha256Hash([u8; HASH_LENGTH]);

impl Sha256Hash {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let array: [u8; HASH_LENGTH] = bytes
            .try_into()
            .map_err(|_| Error::InvalidHash(bytes.len()))?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; HASH_LENGTH]> for Sha256Hash {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Sha256Hash {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(bytes)
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Hash({})", self.to_hex())
    }
}

impl ToSql for Sha256Hash {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Blob(&self.0)))
    }
}

impl FromSql for Sha256Hash {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let blob = value.as_blob()?;
        let array: [u8; HASH_LENGTH] =
            blob.try_into().map_err(|_| FromSqlError::InvalidBlobSize {
                expected_size: HASH_LENGTH,
                blob_size: blob.len(),
            })?;
        Ok(Self(array))
    }
}

/// Content identity of a file: two files are the same content iff all three fields match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub size: u64,
    pub short_hash: Sha256Hash,
    pub hash: Sha256Hash,
}

impl FileIdentity {
    pub fn new(size: u64, short_hash: Sha256Hash, hash: Sha256Hash) -> Self {
        Self {
            size,
            short_hash,
            hash,
        }
    }

    /// Identify a seekable stream of known length.
    pub fn from_reader<R: Read + Seek>(reader: &mut R, len: u64) -> io::Result<Self> {
        let short_hash = short_hash(reader, len)?;
        let hash = if len <= SHORT_HASH_THRESHOLD {
            short_hash
        } else {
            full_hash(reader)?
        };
        Ok(Self::new(len, short_hash, hash))
    }

    pub fn of_path(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        Self::from_reader(&mut file, len)
    }
}

/// SHA-256 over the whole stream, starting from its beginning.
pub fn full_hash<R: Read + Seek>(reader: &mut R) -> io::Result<Sha256Hash> {
    reader.seek(SeekFrom::Start(0))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(Sha256Hash(hasher.finalize().into()))
}

/// Hash of the first 16 KiB, the 32 KiB around the midpoint and the last 16 KiB.
/// Small streams fall back to the full hash.
pub fn short_hash<R: Read + Seek>(reader: &mut R, len: u64) -> io::Result<Sha256Hash> {
    if len <= SHORT_HASH_THRESHOLD {
        return full_hash(reader);
    }

    let mut data = vec![0u8; SHORT_HASH_THRESHOLD as usize];
    let (begin, rest) = data.split_at_mut(SHORT_HASH_BEGIN);
    let (middle, end) = rest.split_at_mut(SHORT_HASH_MIDDLE);

    reader.seek(SeekFrom::Start(0))?;
    reader.read_exact(begin)?;

    reader.seek(SeekFrom::Start(len / 2 - (SHORT_HASH_MIDDLE / 2) as u64))?;
    reader.read_exact(middle)?;

    reader.seek(SeekFrom::Start(len - SHORT_HASH_END as u64))?;
    reader.read_exact(end)?;

    Ok(Sha256Hash(Sha256::digest(&data).into()))
}

pub fn short_hash_of_path(path: &Path) -> io::Result<(u64, Sha256Hash)> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    Ok((len, short_hash(&mut file, len)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_small_stream_short_hash_equals_full_hash() {
        for len in [0usize, 1, 1000, SHORT_HASH_THRESHOLD as usize] {
            let data = patterned(len);
            let identity = FileIdentity::from_reader(&mut Cursor::new(&data), len as u64).unwrap();
            assert_eq!(identity.short_hash, identity.hash, "length {}", len);
            assert_eq!(identity.size, len as u64);
        }
    }

    #[test]
    fn test_full_hash_matches_known_digest() {
        let hash = full_hash(&mut Cursor::new(b"abc")).unwrap();
        assert_eq!(
            hash.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_large_stream_short_hash_samples_three_windows() {
        let len = 200 * 1024;
        let data = patterned(len);
        let identity = FileIdentity::from_reader(&mut Cursor::new(&data), len as u64).unwrap();
        assert_ne!(identity.short_hash, identity.hash);

        let mut windows = Vec::new();
        windows.extend_from_slice(&data[..16 * 1024]);
        let mid = len / 2 - 16 * 1024;
        windows.extend_from_slice(&data[mid..mid + 32 * 1024]);
        windows.extend_from_slice(&data[len - 16 * 1024..]);
        let expected = Sha256Hash(Sha256::digest(&windows).into());
        assert_eq!(identity.short_hash, expected);
    }

    #[test]
    fn test_short_hash_ignores_bytes_outside_windows() {
        let len = 200 * 1024;
        let original = patterned(len);
        let mut modified = original.clone();
        // between the first window and the middle window
        modified[40 * 1024] ^= 0xFF;

        let a = FileIdentity::from_reader(&mut Cursor::new(&original), len as u64).unwrap();
        let b = FileIdentity::from_reader(&mut Cursor::new(&modified), len as u64).unwrap();
        assert_eq!(a.short_hash, b.short_hash);
        assert_ne!(a.hash, b.hash);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_rejects_wrong_length() {
        assert!(matches!(
            Sha256Hash::from_slice(&[0u8; 31]),
            Err(Error::InvalidHash(31))
        ));
        assert!(Sha256Hash::from_slice(&[7u8; 32]).is_ok());
    }

    #[test]
    fn test_truncated_stream_is_an_io_error() {
        let data = patterned(1000);
        let err = short_hash(&mut Cursor::new(&data), 100 * 1024).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
