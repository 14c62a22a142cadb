// SPDX-License-Identifier: MIT OR Apache-2.0
//! 128-bit content fingerprints.
//!
//! Items appended to a [`FingerprintHasher`] are serialized with bincode
//! straight into a BLAKE3 hasher, so equal inputs appended in the same order
//! always produce bit-identical fingerprints.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic digest identifying a computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub u128);

impl Fingerprint {
    /// Fingerprint of a single serializable value
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Self {
        let mut hasher = FingerprintHasher::new();
        hasher.append(value);
        hasher.finish()
    }

    /// Raw digest bytes
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Incremental builder for a [`Fingerprint`]
#[derive(Clone, Default)]
pub struct FingerprintHasher {
    inner: blake3::Hasher,
}

impl FingerprintHasher {
    /// Create an empty hasher
    pub fn new() -> Self {
        Self::default()
    }

    /// Append any serializable value
    pub fn append<T: Serialize + ?Sized>(&mut self, value: &T) -> &mut Self {
        if let Err(err) = bincode::serialize_into(&mut self.inner, value) {
            tracing::warn!("Failed to fold value into fingerprint: {}", err);
        }
        self
    }

    /// Append another fingerprint
    pub fn append_fingerprint(&mut self, fingerprint: Fingerprint) -> &mut Self {
        self.inner.update(&fingerprint.to_bytes());
        self
    }

    /// Finish and return the digest
    pub fn finish(&self) -> Fingerprint {
        let digest = self.inner.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest.as_bytes()[..16]);
        Fingerprint(u128::from_le_bytes(bytes))
    }
}

impl fmt::Debug for FingerprintHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingerprintHasher").field("current", &self.finish()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_order_matters() {
        let mut a = FingerprintHasher::new();
        a.append("x").append(&1i64);
        let mut b = FingerprintHasher::new();
        b.append(&1i64).append("x");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_string_boundaries() {
        let mut a = FingerprintHasher::new();
        a.append("ab").append("c");
        let mut b = FingerprintHasher::new();
        b.append("a").append("bc");
        assert_ne!(a.finish(), b.finish());
    }

    proptest! {
        #[test]
        fn prop_deterministic(values in proptest::collection::vec(any::<i64>(), 0..16), text in ".*") {
            let build = || {
                let mut hasher = FingerprintHasher::new();
                hasher.append(&values).append(&text);
                hasher.finish()
            };
            prop_assert_eq!(build(), build());
        }
    }
}
