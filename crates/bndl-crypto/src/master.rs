//! Master-data blob decryption: AES-256-CBC with PKCS#7 padding.
//!
//! The master database travels outside the packed-container format; it is
//! a single AES-CBC blob under a fixed key/IV supplied by configuration.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, KeyInit};
use aes::Aes256;

use bndl_core::{BndlError, BndlResult};

const AES_BLOCK_SIZE: usize = 16;

/// Decrypt the master-data blob and strip its PKCS#7 padding.
///
/// Input length must be a positive multiple of the AES block size.
pub fn decrypt_master(key: &[u8; 32], iv: &[u8; 16], data: &[u8]) -> BndlResult<Vec<u8>> {
    if data.is_empty() || data.len() % AES_BLOCK_SIZE != 0 {
        return Err(BndlError::ProtocolCorruption(format!(
            "master blob length {} is not a positive multiple of {AES_BLOCK_SIZE}",
            data.len()
        )));
    }

    let cipher = Aes256::new(GenericArray::from_slice(key));
    let mut out = Vec::with_capacity(data.len());
    let mut prev = *iv;
    for block in data.chunks_exact(AES_BLOCK_SIZE) {
        let mut buf = GenericArray::clone_from_slice(block);
        cipher.decrypt_block(&mut buf);
        for (b, p) in buf.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        out.extend_from_slice(&buf);
        prev.copy_from_slice(block);
    }

    strip_pkcs7(&mut out)?;
    Ok(out)
}

fn strip_pkcs7(buf: &mut Vec<u8>) -> BndlResult<()> {
    let pad = match buf.last() {
        Some(&p) => p as usize,
        None => return Err(BndlError::ProtocolCorruption("master blob is empty".into())),
    };
    if pad == 0 || pad > AES_BLOCK_SIZE || pad > buf.len() {
        return Err(BndlError::ProtocolCorruption(format!(
            "master blob padding value {pad} is invalid"
        )));
    }
    let split = buf.len() - pad;
    if buf[split..].iter().any(|&b| b as usize != pad) {
        return Err(BndlError::ProtocolCorruption(
            "master blob padding bytes are inconsistent".into(),
        ));
    }
    buf.truncate(split);
    Ok(())
}
