//! Fixed-size record layout.

use std::fmt;

/// Size of a record in bytes.
pub const RECORD_SIZE: usize = 4;

/// Size of the record key in bytes. The key occupies the record head.
pub const KEY_SIZE: usize = 2;

/// A single record: a signed big-endian 16-bit key followed by two opaque payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Record {
    pub key: i16,
    pub payload: [u8; 2],
}

impl Record {
    pub fn new(key: i16, payload: [u8; 2]) -> Self {
        Record { key, payload }
    }

    /// Decodes a record from its on-disk representation.
    pub fn from_bytes(bytes: [u8; RECORD_SIZE]) -> Self {
        Record {
            key: i16::from_be_bytes([bytes[0], bytes[1]]),
            payload: [bytes[2], bytes[3]],
        }
    }

    /// Encodes the record into its on-disk representation.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let key = self.key.to_be_bytes();
        [key[0], key[1], self.payload[0], self.payload[1]]
    }

    /// Extracts the key from a raw record.
    ///
    /// # Panics
    /// Panics if `bytes` is shorter than [`KEY_SIZE`].
    pub fn key_of(bytes: &[u8]) -> i16 {
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes[..KEY_SIZE]);
        i16::from_be_bytes(key)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:02x}{:02x}]", self.key, self.payload[0], self.payload[1])
    }
}
