//! Key hashing and pair serialization
//!
//! - [`HashCode`]: the 32-bit hash that places a key in the index. It must
//!   be stable across processes because it is persisted.
//! - [`Codec`]: turns a key/value pair into the opaque bytes of a pair record.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

// =============================================================================
// Hash Codes
// =============================================================================

/// Stable 32-bit hash code of a key
///
/// Equal keys must have equal hash codes. Distinct keys may collide; colliding
/// keys share one index entry and are told apart by `Eq`.
pub trait HashCode {
    fn hash_code(&self) -> i32;
}

macro_rules! identity_hash {
    ($($ty:ty),*) => {
        $(
            impl HashCode for $ty {
                fn hash_code(&self) -> i32 {
                    *self as i32
                }
            }
        )*
    };
}

identity_hash!(i8, i16, i32, u8, u16, u32, char);

impl HashCode for i64 {
    fn hash_code(&self) -> i32 {
        (*self ^ ((*self as u64) >> 32) as i64) as i32
    }
}

impl HashCode for u64 {
    fn hash_code(&self) -> i32 {
        (*self as i64).hash_code()
    }
}

impl HashCode for isize {
    fn hash_code(&self) -> i32 {
        (*self as i64).hash_code()
    }
}

impl HashCode for usize {
    fn hash_code(&self) -> i32 {
        (*self as u64).hash_code()
    }
}

impl HashCode for bool {
    fn hash_code(&self) -> i32 {
        if *self {
            1231
        } else {
            1237
        }
    }
}

impl HashCode for str {
    fn hash_code(&self) -> i32 {
        crc32fast::hash(self.as_bytes()) as i32
    }
}

impl HashCode for String {
    fn hash_code(&self) -> i32 {
        self.as_str().hash_code()
    }
}

impl HashCode for [u8] {
    fn hash_code(&self) -> i32 {
        crc32fast::hash(self) as i32
    }
}

impl HashCode for Vec<u8> {
    fn hash_code(&self) -> i32 {
        self.as_slice().hash_code()
    }
}

impl<T: HashCode + ?Sized> HashCode for &T {
    fn hash_code(&self) -> i32 {
        (**self).hash_code()
    }
}

impl<T: HashCode + ?Sized> HashCode for Box<T> {
    fn hash_code(&self) -> i32 {
        (**self).hash_code()
    }
}

// =============================================================================
// Pair Codec
// =============================================================================

/// Serialization of a key/value pair into one opaque byte string
pub trait Codec<K, V>: Send + Sync {
    fn encode(&self, key: &K, value: &V) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<(K, V)>;
}

/// Default codec: bincode over a `(key, value)` tuple
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl<K, V> Codec<K, V> for BincodeCodec
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    fn encode(&self, key: &K, value: &V) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&(key, value))?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<(K, V)> {
        Ok(bincode::deserialize(bytes)?)
    }
}
