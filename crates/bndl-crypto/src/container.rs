//! Packed-container framing and integrity checking.
//!
//! A packed payload opens with a fixed 12-byte header, then the 16-byte
//! MD5 of everything that follows, then the (possibly encrypted) body.
//! The hash must verify before any decryption is attempted.

use md5::{Digest, Md5};

use bndl_core::{BndlError, BndlResult, BundleDescriptor, HASH_SIZE, HEADER_SIZE};

use crate::cascade::Cascade;
use crate::keyschedule::KeyMaterial;

/// Container magic, "BNDL" big-endian on the wire.
pub const MAGIC: u32 = 0x424E_444C;

/// The only container version this codec understands.
pub const VERSION: u16 = 1;

/// Validated fixed header of a packed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u16,
    pub reserved: u16,
    pub encrypted: bool,
}

impl ContainerHeader {
    /// Parse and validate the header from the start of a raw payload.
    ///
    /// The payload must be long enough to also hold the stored hash;
    /// anything shorter cannot be a well-formed container.
    pub fn parse(raw: &[u8]) -> BndlResult<Self> {
        if raw.len() < HEADER_SIZE + HASH_SIZE {
            return Err(BndlError::MalformedContainer(format!(
                "payload of {} bytes is too short for header and hash",
                raw.len()
            )));
        }

        let magic = read_be32(raw, 0);
        if magic != MAGIC {
            return Err(BndlError::MalformedContainer(format!(
                "bad magic {magic:#010x}"
            )));
        }

        let version = read_be16(raw, 4);
        if version != VERSION {
            return Err(BndlError::MalformedContainer(format!(
                "unsupported version {version}"
            )));
        }

        let reserved = read_be16(raw, 6);
        if reserved != 0 {
            return Err(BndlError::MalformedContainer(format!(
                "reserved field is {reserved:#06x}, expected zero"
            )));
        }

        let encrypted = match read_be32(raw, 8) {
            0 => false,
            1 => true,
            other => {
                return Err(BndlError::MalformedContainer(format!(
                    "encrypted flag is {other}, expected 0 or 1"
                )))
            }
        };

        Ok(Self {
            version,
            reserved,
            encrypted,
        })
    }
}

/// Recover a bundle's plaintext bytes from its raw fetched payload.
///
/// Bundles outside the packed compression mode are stored verbatim and
/// pass through untouched. For packed bundles the header is validated and
/// the stored MD5 compared against the body; only then does the cascade
/// run, keyed from the descriptor's metadata and the body length.
pub fn unpack(desc: &BundleDescriptor, raw: &[u8]) -> BndlResult<Vec<u8>> {
    if !desc.is_packed() {
        return Ok(raw.to_vec());
    }

    let header = ContainerHeader::parse(raw)?;

    let stored = &raw[HEADER_SIZE..HEADER_SIZE + HASH_SIZE];
    let body = &raw[HEADER_SIZE + HASH_SIZE..];
    let computed = Md5::digest(body);
    if computed.as_slice() != stored {
        return Err(BndlError::IntegrityMismatch {
            stored: hex::encode(stored),
            computed: hex::encode(computed),
        });
    }

    if !header.encrypted {
        return Ok(body.to_vec());
    }

    let material = KeyMaterial::derive(
        &desc.bundle_name,
        body.len() as u64,
        &desc.content_hash,
        desc.crc,
    );
    let mut plain = body.to_vec();
    Cascade::new(&material).apply_keystream(&mut plain);
    Ok(plain)
}

fn read_be16(raw: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([raw[offset], raw[offset + 1]])
}

fn read_be32(raw: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        raw[offset],
        raw[offset + 1],
        raw[offset + 2],
        raw[offset + 3],
    ])
}
