//! Deterministic FNV-1a hasher.
//!
//! `DefaultHasher` is randomly seeded per process, so anything persisted to
//! disk (cache keys, fingerprints) goes through FNV-1a instead.

use std::hash::Hasher;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// FNV-1a 64-bit hasher with fixed seed.
#[derive(Debug, Clone)]
pub struct FnvHasher(u64);

impl FnvHasher {
    pub fn new() -> Self {
        Self(FNV_OFFSET_BASIS)
    }

    /// Feed a length-prefixed byte field, so `("ab", "c")` and `("a", "bc")`
    /// hash differently.
    pub fn write_field(&mut self, bytes: &[u8]) {
        self.write_u64(bytes.len() as u64);
        self.write(bytes);
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }
}

/// Hash a sequence of fields and format the result as 16 hex digits.
pub fn fingerprint<'a>(fields: impl IntoIterator<Item = &'a [u8]>) -> String {
    let mut hasher = FnvHasher::new();
    for field in fields {
        hasher.write_field(field);
    }
    format!("{:016x}", hasher.finish())
}
