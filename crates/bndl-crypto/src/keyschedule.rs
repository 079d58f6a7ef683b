//! Per-bundle key derivation: catalog metadata → cipher key + nonce pool

use sha2::{Digest, Sha512};
use zeroize::Zeroize;

/// Derived cipher inputs for one bundle: a 256-bit key and the 64-byte
/// nonce-material pool the cascade samples per mega-block.
///
/// Zeroized on drop to prevent key bytes lingering in memory.
pub struct KeyMaterial {
    key: [u8; 32],
    pool: [u8; 64],
}

impl KeyMaterial {
    /// Derive key material from bundle metadata.
    ///
    /// Pure and deterministic: the same four inputs always yield the same
    /// material, so recomputing per bundle needs no synchronization.
    /// `plaintext_size` is the payload size after framing is stripped.
    pub fn derive(
        bundle_name: &str,
        plaintext_size: u64,
        content_hash: &str,
        crc: u32,
    ) -> Self {
        let seed = format!("{bundle_name}-{plaintext_size}-{content_hash}-{crc}");
        let base = Sha512::digest(seed.as_bytes());

        let mut key = [0u8; 32];
        key.copy_from_slice(&base[..32]);

        let mut pool = [0u8; 64];
        pool.copy_from_slice(&Sha512::digest(base));

        Self { key, pool }
    }

    /// The eight little-endian key words loaded into the cipher state.
    pub fn key_words(&self) -> [u32; 8] {
        let mut words = [0u32; 8];
        for (word, chunk) in words.iter_mut().zip(self.key.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        words
    }

    pub fn pool(&self) -> &[u8; 64] {
        &self.pool
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.key.zeroize();
        self.pool.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"[REDACTED]")
            .field("pool", &"[REDACTED]")
            .finish()
    }
}
