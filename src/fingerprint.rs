//! Content identity for local documents.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// SHA-256 hash of document contents.
///
/// Serializes as a lowercase hex string so it can key JSON maps and appear
/// in remote API requests unmodified.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
   /// Creates a hash from a byte slice, verifying length
   pub fn from_slice(slice: &[u8]) -> Option<Self> {
      let (this, rem) = slice.split_first_chunk()?;
      rem.is_empty().then_some(Self(*this))
   }

   pub const fn new(hash: [u8; 32]) -> Self {
      Self(hash)
   }

   /// Computes SHA-256 hash of data
   pub fn sum(dat: impl AsRef<[u8]>) -> Self {
      Self(Sha256::digest(dat.as_ref()).into())
   }

   /// Parses a lowercase or uppercase hex string
   pub fn from_hex(s: &str) -> Option<Self> {
      let bytes = hex::decode(s).ok()?;
      Self::from_slice(&bytes)
   }
}

impl AsRef<[u8]> for ContentHash {
   fn as_ref(&self) -> &[u8] {
      &self.0
   }
}

impl fmt::Display for ContentHash {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{}", hex::encode(self.0))
   }
}

impl fmt::Debug for ContentHash {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "Hash({})", hex::encode(self.0))
   }
}

impl Serialize for ContentHash {
   fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
      serializer.serialize_str(&hex::encode(self.0))
   }
}

impl<'de> Deserialize<'de> for ContentHash {
   fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
      let s = String::deserialize(deserializer)?;
      Self::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid content hash"))
   }
}

/// Content identity of a local document, independent of name, path, and
/// modification time. Immutable once computed; identical bytes always
/// produce identical fingerprints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Fingerprint {
   pub size: u64,
   pub hash: ContentHash,
}

impl Fingerprint {
   /// Derives the fingerprint of a document's content. Pure and
   /// deterministic; the whole dedup scheme rests on that.
   pub fn compute(bytes: impl AsRef<[u8]>) -> Self {
      let bytes = bytes.as_ref();
      Self { size: bytes.len() as u64, hash: ContentHash::sum(bytes) }
   }
}
