//! Cascading keystream generator over a ChaCha20-style permutation core.
//!
//! This is not standard ChaCha20. Keystream is produced in 512-byte
//! mega-blocks; each mega-block derives a fresh 96-bit nonce from the
//! nonce-material pool under a counter-driven rotation step, then chains
//! eight 64-byte sub-blocks: every sub-block's output is XORed into the
//! base state of the next, and the round count shrinks along the chain.
//! Any deviation here breaks byte-for-byte compatibility with the remote
//! content, so the arithmetic is reproduced exactly, odd constants and
//! all.

use crate::keyschedule::KeyMaterial;

/// Keystream unit: one nonce derivation plus eight chained sub-blocks.
pub const MEGA_BLOCK: usize = 512;

/// One chained permutation output inside a mega-block.
pub const SUB_BLOCK: usize = 64;

/// Rounds applied per sub-block, in chain order.
const ROUND_TABLE: [u32; 8] = [12, 8, 8, 8, 4, 4, 4, 4];

/// "expand 32-byte k" as four little-endian words.
const SIGMA: [u32; 4] = [0x6170_7865, 0x3320_646e, 0x7962_2d32, 0x6b20_6574];

/// Sequential keystream state for a single bundle.
///
/// Mega-blocks cannot be generated out of order: each nonce depends on the
/// running counter and each sub-block on its predecessor's output.
/// Parallel decryption is only possible across bundles.
pub struct Cascade<'a> {
    key: [u32; 8],
    pool: &'a [u8; 64],
    counter: u32,
}

impl<'a> Cascade<'a> {
    /// Fresh keystream state with the mega-block counter at zero.
    pub fn new(material: &'a KeyMaterial) -> Self {
        Self {
            key: material.key_words(),
            pool: material.pool(),
            counter: 0,
        }
    }

    /// XOR the keystream over `data` in place, one mega-block at a time.
    /// The trailing partial block consumes only the leading keystream
    /// bytes, so output length always equals input length.
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for chunk in data.chunks_mut(MEGA_BLOCK) {
            let keystream = self.next_mega_block();
            for (byte, k) in chunk.iter_mut().zip(keystream.iter()) {
                *byte ^= k;
            }
        }
    }

    fn next_mega_block(&mut self) -> [u8; MEGA_BLOCK] {
        // Nonce derivation sees the counter before the increment; the
        // incremented value seeds the state's embedded block counter.
        let nonce = self.derive_nonce(self.counter);
        self.counter = self.counter.wrapping_add(1);

        let mut state = [0u32; 16];
        state[..4].copy_from_slice(&SIGMA);
        state[4..12].copy_from_slice(&self.key);
        state[12] = self.counter;
        state[13..].copy_from_slice(&nonce);

        let mut out = [0u8; MEGA_BLOCK];
        let mut prior = [0u32; 16];
        for (index, &rounds) in ROUND_TABLE.iter().enumerate() {
            let mut x = [0u32; 16];
            for (slot, (&base, &fed)) in x.iter_mut().zip(state.iter().zip(prior.iter())) {
                *slot = base ^ fed;
            }
            // y keeps the pre-round words; the output is a single
            // add-back of x onto y (y is never diagonal-mixed).
            let y = x;
            for _ in 0..rounds / 2 {
                double_round(&mut x);
            }
            for (j, slot) in prior.iter_mut().enumerate() {
                *slot = x[j].wrapping_add(y[j]);
                out[index * SUB_BLOCK + j * 4..index * SUB_BLOCK + j * 4 + 4]
                    .copy_from_slice(&slot.to_le_bytes());
            }
            // The embedded counter word advances once per sub-block,
            // carrying into the first nonce word on overflow.
            let (word, carry) = state[12].overflowing_add(1);
            state[12] = word;
            if carry {
                state[13] = state[13].wrapping_add(1);
            }
        }
        out
    }

    /// Per-mega-block nonce obfuscation over the 64-byte pool.
    ///
    /// The four sample offsets are the first four base-13 digits of the
    /// counter (0xA9 = 0xD², 0x895 = 0xD³), one digit per 16-byte pool
    /// quarter; a digit never exceeds 12, so every 4-byte read stays
    /// inside its quarter.
    fn derive_nonce(&self, c: u32) -> [u32; 3] {
        let m1 = self.pool_word((c % 0xD) as usize);
        let m2 = self.pool_word((0x10 | ((c / 0xD) % 0xD)) as usize);
        let x1 = self.pool_word((0x20 | ((c / 0xA9) % 0xD)) as usize);
        let x2 = self.pool_word((0x30 | ((c / 0x895) % 0xD)) as usize);

        let seed = m1.rotate_right((2 * ((c % 0x93E) / 0xA9)) % 0x1B)
            ^ m2.rotate_right((3 * (c / 0x93E)) % 0x1B);

        let n0 = seed;
        let n1 = n0 ^ x1;
        let n2 = n1 ^ x2;
        [n0, n1, n2]
    }

    fn pool_word(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.pool[offset],
            self.pool[offset + 1],
            self.pool[offset + 2],
            self.pool[offset + 3],
        ])
    }
}

#[inline]
fn quarter(s: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    s[a] = s[a].wrapping_add(s[b]);
    s[d] ^= s[a];
    s[d] = s[d].rotate_left(16);
    s[c] = s[c].wrapping_add(s[d]);
    s[b] ^= s[c];
    s[b] = s[b].rotate_left(12);
    s[a] = s[a].wrapping_add(s[b]);
    s[d] ^= s[a];
    s[d] = s[d].rotate_left(8);
    s[c] = s[c].wrapping_add(s[d]);
    s[b] ^= s[c];
    s[b] = s[b].rotate_left(7);
}

fn double_round(s: &mut [u32; 16]) {
    // column
    quarter(s, 0, 4, 8, 12);
    quarter(s, 1, 5, 9, 13);
    quarter(s, 2, 6, 10, 14);
    quarter(s, 3, 7, 11, 15);
    // diagonal
    quarter(s, 0, 5, 10, 15);
    quarter(s, 1, 6, 11, 12);
    quarter(s, 2, 7, 8, 13);
    quarter(s, 3, 4, 9, 14);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keystream(material: &KeyMaterial, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        Cascade::new(material).apply_keystream(&mut buf);
        buf
    }

    #[test]
    fn test_keystream_deterministic() {
        let m = KeyMaterial::derive("card_c001", 2048, "9f2d41aa", 123456);
        assert_eq!(keystream(&m, 2048), keystream(&m, 2048));
    }

    #[test]
    fn test_keystream_diverges_across_bundle_names() {
        let a = KeyMaterial::derive("card_c001", 512, "9f2d41aa", 123456);
        let b = KeyMaterial::derive("card_c002", 512, "9f2d41aa", 123456);

        let ka = keystream(&a, MEGA_BLOCK);
        let kb = keystream(&b, MEGA_BLOCK);
        assert_ne!(ka, kb);

        // avalanche spot-check on the first mega-block: the two streams
        // should disagree broadly, not in a few trailing bytes
        let differing = ka.iter().zip(&kb).filter(|(x, y)| x != y).count();
        assert!(differing > MEGA_BLOCK / 2, "only {differing} bytes differ");
    }

    #[test]
    fn test_sub_blocks_are_chained() {
        // with chaining, no two sub-blocks of one mega-block can repeat
        let m = KeyMaterial::derive("bg_title", 4096, "ab12cd34", 7);
        let ks = keystream(&m, MEGA_BLOCK);
        for i in 0..ROUND_TABLE.len() {
            for j in (i + 1)..ROUND_TABLE.len() {
                assert_ne!(
                    ks[i * SUB_BLOCK..(i + 1) * SUB_BLOCK],
                    ks[j * SUB_BLOCK..(j + 1) * SUB_BLOCK],
                    "sub-blocks {i} and {j} repeat"
                );
            }
        }
    }

    #[test]
    fn test_mega_blocks_advance_with_counter() {
        let m = KeyMaterial::derive("bg_title", 4096, "ab12cd34", 7);
        let ks = keystream(&m, 2 * MEGA_BLOCK);
        assert_ne!(ks[..MEGA_BLOCK], ks[MEGA_BLOCK..]);
    }

    #[test]
    fn test_split_at_mega_block_boundary_matches_single_pass() {
        let m = KeyMaterial::derive("card_c001", 1025, "9f2d41aa", 123456);

        let mut whole = vec![0u8; 1025];
        Cascade::new(&m).apply_keystream(&mut whole);

        let mut split = vec![0u8; 1025];
        let mut cascade = Cascade::new(&m);
        let (head, tail) = split.split_at_mut(MEGA_BLOCK);
        cascade.apply_keystream(head);
        cascade.apply_keystream(tail);

        assert_eq!(whole, split);
    }

    #[test]
    fn test_xor_is_its_own_inverse() {
        let m = KeyMaterial::derive("card_c001", 700, "9f2d41aa", 123456);
        let plaintext: Vec<u8> = (0..700u32).map(|i| (i * 31 % 251) as u8).collect();

        let mut buf = plaintext.clone();
        Cascade::new(&m).apply_keystream(&mut buf);
        assert_ne!(buf, plaintext);
        Cascade::new(&m).apply_keystream(&mut buf);
        assert_eq!(buf, plaintext);
    }

    #[test]
    fn test_empty_input_is_untouched() {
        let m = KeyMaterial::derive("card_c001", 0, "9f2d41aa", 123456);
        let mut buf: Vec<u8> = Vec::new();
        Cascade::new(&m).apply_keystream(&mut buf);
        assert!(buf.is_empty());
    }
}
