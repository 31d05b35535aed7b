//! Compression of a window's difference shares into a fixed 32-byte digest.
//!
//! The digest is a deterministic function of the difference vector, so two
//! parties holding equal difference shares compute equal digests without
//! talking to each other.

use aes::{
    Aes128,
    cipher::{BlockEncrypt, KeyInit},
};
use once_cell::sync::Lazy;
use rayon::prelude::*;

use crate::config::DigestMode;

pub const BLOCK_LEN: usize = 16;
pub const DIGEST_LEN: usize = 2 * BLOCK_LEN;

pub type Digest = [u8; DIGEST_LEN];

const COMPRESSION_KEYS: [[u8; BLOCK_LEN]; 2] = [*b"exact-pm digest0", *b"exact-pm digest1"];
const CHAIN_IV: [u8; BLOCK_LEN] = *b"exact-pm chained";

static COMPRESSION_CIPHERS: Lazy<[Aes128; 2]> = Lazy::new(|| {
    [
        Aes128::new(&COMPRESSION_KEYS[0].into()),
        Aes128::new(&COMPRESSION_KEYS[1].into()),
    ]
});

/// XOR-folds `diff` into one block: byte `i` lands in lane `i % 16`.
pub fn fold(diff: &[u8]) -> [u8; BLOCK_LEN] {
    let mut block = [0u8; BLOCK_LEN];
    for (i, &byte) in diff.iter().enumerate() {
        block[i % BLOCK_LEN] ^= byte;
    }
    block
}

/// Fixed-key Matyas-Meyer-Oseas compression under two keys:
/// `E_k0(x) ^ x || E_k1(x) ^ x`.
pub fn compress(block: &[u8; BLOCK_LEN]) -> Digest {
    let mut digest = [0u8; DIGEST_LEN];
    for (cipher, out) in COMPRESSION_CIPHERS
        .iter()
        .zip(digest.chunks_exact_mut(BLOCK_LEN))
    {
        let mut encrypted = (*block).into();
        cipher.encrypt_block(&mut encrypted);
        for ((o, e), x) in out.iter_mut().zip(encrypted.iter()).zip(block) {
            *o = e ^ x;
        }
    }
    digest
}

/// Davies-Meyer chaining over zero-padded 16-byte blocks, finished with a
/// length block. Unlike [`fold`], vectors longer than one block do not
/// collide when their lane differences cancel.
pub fn chain(diff: &[u8]) -> [u8; BLOCK_LEN] {
    let mut length = [0u8; BLOCK_LEN];
    length[..8].copy_from_slice(&(diff.len() as u64).to_le_bytes());

    let blocks = diff.chunks(BLOCK_LEN).map(|chunk| {
        let mut block = [0u8; BLOCK_LEN];
        block[..chunk.len()].copy_from_slice(chunk);
        block
    });
    blocks
        .chain(std::iter::once(length))
        .fold(CHAIN_IV, |state, message| {
            let cipher = Aes128::new(&message.into());
            let mut next = state.into();
            cipher.encrypt_block(&mut next);
            std::array::from_fn(|i| next[i] ^ state[i])
        })
}

/// `compress(fold(diff))`.
pub fn digest(diff: &[u8]) -> Digest {
    compress(&fold(diff))
}

pub fn digest_with(diff: &[u8], mode: DigestMode) -> Digest {
    match mode {
        DigestMode::Folded => digest(diff),
        DigestMode::Chained => compress(&chain(diff)),
    }
}

/// Digests of all windows, computed on the rayon pool.
pub fn window_digests(diffs: &[Vec<u8>], mode: DigestMode) -> Vec<Digest> {
    diffs
        .par_iter()
        .map(|diff| digest_with(diff, mode))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, distributions::Standard};
    use rand_chacha::ChaCha12Rng;
    use std::collections::HashSet;

    #[test]
    fn test_fold() {
        let diff: Vec<u8> = (0..20).collect();
        let block = fold(&diff);
        assert_eq!(block[0], 16);
        assert_eq!(block[3], 3 ^ 19);
        assert_eq!(block[4], 4);
        assert_eq!(fold(b"AB")[..2], *b"AB");
        assert_eq!(fold(b"AB")[2..], [0u8; 14]);
    }

    #[test]
    fn test_compress_is_deterministic_and_uses_both_keys() {
        let block = [0x42u8; BLOCK_LEN];
        let first = compress(&block);
        assert_eq!(first, compress(&block));
        assert_ne!(first[..BLOCK_LEN], first[BLOCK_LEN..]);
    }

    #[test]
    fn test_distinct_vectors_give_distinct_digests() {
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let mut folded = HashSet::new();
        let mut digests = HashSet::new();
        for _ in 0..2000 {
            let len = rng.gen_range(1..40);
            let diff: Vec<u8> = (0..len).map(|_| rng.sample(Standard)).collect();
            if folded.insert(fold(&diff)) {
                assert!(digests.insert(digest(&diff)));
            }
        }
    }

    #[test]
    fn test_chained_mode_separates_fold_collisions() {
        let mut a = vec![0u8; 32];
        let mut b = vec![0u8; 32];
        a[0] = 1;
        a[16] = 1;
        b[1] = 2;
        b[17] = 2;
        assert_eq!(digest(&a), digest(&b));
        assert_ne!(
            digest_with(&a, DigestMode::Chained),
            digest_with(&b, DigestMode::Chained)
        );
        // Zero padding alone does not collide with an explicit zero byte.
        assert_ne!(
            digest_with(&[1], DigestMode::Chained),
            digest_with(&[1, 0], DigestMode::Chained)
        );
    }

    #[test]
    fn test_window_digests_keep_order() {
        let diffs = vec![b"AB".to_vec(), vec![0, 0], b"AB".to_vec()];
        let digests = window_digests(&diffs, DigestMode::Folded);
        assert_eq!(digests[0], digests[2]);
        assert_ne!(digests[0], digests[1]);
        assert_eq!(digests[1], digest(&[0, 0]));
    }
}
