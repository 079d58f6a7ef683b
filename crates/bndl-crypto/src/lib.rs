//! bndl-crypto: the packed-container codec for CDN asset bundles
//!
//! Container layout (big-endian):
//! ```text
//! [12 bytes: magic u32 | version u16 | reserved u16 | encrypted u32]
//! [16 bytes: MD5 of everything after it]
//! [N bytes: ciphertext or plaintext payload]
//! ```
//!
//! Decryption pipeline: raw payload → header validation → MD5 integrity
//! check → cascading keystream XOR → plaintext.
//!
//! Key derivation (per bundle, no cross-bundle reuse):
//! ```text
//! seed   = "{bundle_name}-{plaintext_size}-{content_hash}-{crc}"
//! base   = SHA-512(seed)
//! key    = base[0..32]
//! pool   = SHA-512(base)     (64-byte nonce-material pool)
//! ```

pub mod cascade;
pub mod container;
pub mod keyschedule;
pub mod master;

pub use cascade::{Cascade, MEGA_BLOCK, SUB_BLOCK};
pub use container::{unpack, ContainerHeader, MAGIC, VERSION};
pub use keyschedule::KeyMaterial;
pub use master::decrypt_master;
