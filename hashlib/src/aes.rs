//! AES block cipher (FIPS-197): key schedule and single-block transforms
//!
//! 32-bit round-key words, 128/192/256-bit keys, 10/12/14 rounds.
//! `encrypt_block`/`decrypt_block` are ECB primitives for building modes;
//! multi-block data belongs in [`crate::cbc`].

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::random::RandomSource;
use crate::{Error, Result};

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;
/// AES-CBC IV size in bytes.
pub const AES_IV_SIZE: usize = AES_BLOCK_SIZE;
/// CBC-MAC tag size in bytes.
pub const AES_MAC_SIZE: usize = AES_BLOCK_SIZE;

const MAX_ROUND_KEY_WORDS: usize = 60;

static SBOX: [u8; 256] = [
    0x63, 0x7c, 0x77, 0x7b, 0xf2, 0x6b, 0x6f, 0xc5, 0x30, 0x01, 0x67, 0x2b, 0xfe, 0xd7, 0xab, 0x76,
    0xca, 0x82, 0xc9, 0x7d, 0xfa, 0x59, 0x47, 0xf0, 0xad, 0xd4, 0xa2, 0xaf, 0x9c, 0xa4, 0x72, 0xc0,
    0xb7, 0xfd, 0x93, 0x26, 0x36, 0x3f, 0xf7, 0xcc, 0x34, 0xa5, 0xe5, 0xf1, 0x71, 0xd8, 0x31, 0x15,
    0x04, 0xc7, 0x23, 0xc3, 0x18, 0x96, 0x05, 0x9a, 0x07, 0x12, 0x80, 0xe2, 0xeb, 0x27, 0xb2, 0x75,
    0x09, 0x83, 0x2c, 0x1a, 0x1b, 0x6e, 0x5a, 0xa0, 0x52, 0x3b, 0xd6, 0xb3, 0x29, 0xe3, 0x2f, 0x84,
    0x53, 0xd1, 0x00, 0xed, 0x20, 0xfc, 0xb1, 0x5b, 0x6a, 0xcb, 0xbe, 0x39, 0x4a, 0x4c, 0x58, 0xcf,
    0xd0, 0xef, 0xaa, 0xfb, 0x43, 0x4d, 0x33, 0x85, 0x45, 0xf9, 0x02, 0x7f, 0x50, 0x3c, 0x9f, 0xa8,
    0x51, 0xa3, 0x40, 0x8f, 0x92, 0x9d, 0x38, 0xf5, 0xbc, 0xb6, 0xda, 0x21, 0x10, 0xff, 0xf3, 0xd2,
    0xcd, 0x0c, 0x13, 0xec, 0x5f, 0x97, 0x44, 0x17, 0xc4, 0xa7, 0x7e, 0x3d, 0x64, 0x5d, 0x19, 0x73,
    0x60, 0x81, 0x4f, 0xdc, 0x22, 0x2a, 0x90, 0x88, 0x46, 0xee, 0xb8, 0x14, 0xde, 0x5e, 0x0b, 0xdb,
    0xe0, 0x32, 0x3a, 0x0a, 0x49, 0x06, 0x24, 0x5c, 0xc2, 0xd3, 0xac, 0x62, 0x91, 0x95, 0xe4, 0x79,
    0xe7, 0xc8, 0x37, 0x6d, 0x8d, 0xd5, 0x4e, 0xa9, 0x6c, 0x56, 0xf4, 0xea, 0x65, 0x7a, 0xae, 0x08,
    0xba, 0x78, 0x25, 0x2e, 0x1c, 0xa6, 0xb4, 0xc6, 0xe8, 0xdd, 0x74, 0x1f, 0x4b, 0xbd, 0x8b, 0x8a,
    0x70, 0x3e, 0xb5, 0x66, 0x48, 0x03, 0xf6, 0x0e, 0x61, 0x35, 0x57, 0xb9, 0x86, 0xc1, 0x1d, 0x9e,
    0xe1, 0xf8, 0x98, 0x11, 0x69, 0xd9, 0x8e, 0x94, 0x9b, 0x1e, 0x87, 0xe9, 0xce, 0x55, 0x28, 0xdf,
    0x8c, 0xa1, 0x89, 0x0d, 0xbf, 0xe6, 0x42, 0x68, 0x41, 0x99, 0x2d, 0x0f, 0xb0, 0x54, 0xbb, 0x16,
];

static INV_SBOX: [u8; 256] = [
    0x52, 0x09, 0x6a, 0xd5, 0x30, 0x36, 0xa5, 0x38, 0xbf, 0x40, 0xa3, 0x9e, 0x81, 0xf3, 0xd7, 0xfb,
    0x7c, 0xe3, 0x39, 0x82, 0x9b, 0x2f, 0xff, 0x87, 0x34, 0x8e, 0x43, 0x44, 0xc4, 0xde, 0xe9, 0xcb,
    0x54, 0x7b, 0x94, 0x32, 0xa6, 0xc2, 0x23, 0x3d, 0xee, 0x4c, 0x95, 0x0b, 0x42, 0xfa, 0xc3, 0x4e,
    0x08, 0x2e, 0xa1, 0x66, 0x28, 0xd9, 0x24, 0xb2, 0x76, 0x5b, 0xa2, 0x49, 0x6d, 0x8b, 0xd1, 0x25,
    0x72, 0xf8, 0xf6, 0x64, 0x86, 0x68, 0x98, 0x16, 0xd4, 0xa4, 0x5c, 0xcc, 0x5d, 0x65, 0xb6, 0x92,
    0x6c, 0x70, 0x48, 0x50, 0xfd, 0xed, 0xb9, 0xda, 0x5e, 0x15, 0x46, 0x57, 0xa7, 0x8d, 0x9d, 0x84,
    0x90, 0xd8, 0xab, 0x00, 0x8c, 0xbc, 0xd3, 0x0a, 0xf7, 0xe4, 0x58, 0x05, 0xb8, 0xb3, 0x45, 0x06,
    0xd0, 0x2c, 0x1e, 0x8f, 0xca, 0x3f, 0x0f, 0x02, 0xc1, 0xaf, 0xbd, 0x03, 0x01, 0x13, 0x8a, 0x6b,
    0x3a, 0x91, 0x11, 0x41, 0x4f, 0x67, 0xdc, 0xea, 0x97, 0xf2, 0xcf, 0xce, 0xf0, 0xb4, 0xe6, 0x73,
    0x96, 0xac, 0x74, 0x22, 0xe7, 0xad, 0x35, 0x85, 0xe2, 0xf9, 0x37, 0xe8, 0x1c, 0x75, 0xdf, 0x6e,
    0x47, 0xf1, 0x1a, 0x71, 0x1d, 0x29, 0xc5, 0x89, 0x6f, 0xb7, 0x62, 0x0e, 0xaa, 0x18, 0xbe, 0x1b,
    0xfc, 0x56, 0x3e, 0x4b, 0xc6, 0xd2, 0x79, 0x20, 0x9a, 0xdb, 0xc0, 0xfe, 0x78, 0xcd, 0x5a, 0xf4,
    0x1f, 0xdd, 0xa8, 0x33, 0x88, 0x07, 0xc7, 0x31, 0xb1, 0x12, 0x10, 0x59, 0x27, 0x80, 0xec, 0x5f,
    0x60, 0x51, 0x7f, 0xa9, 0x19, 0xb5, 0x4a, 0x0d, 0x2d, 0xe5, 0x7a, 0x9f, 0x93, 0xc9, 0x9c, 0xef,
    0xa0, 0xe0, 0x3b, 0x4d, 0xae, 0x2a, 0xf5, 0xb0, 0xc8, 0xeb, 0xbb, 0x3c, 0x83, 0x53, 0x99, 0x61,
    0x17, 0x2b, 0x04, 0x7e, 0xba, 0x77, 0xd6, 0x26, 0xe1, 0x69, 0x14, 0x63, 0x55, 0x21, 0x0c, 0x7d,
];

const RCON: [u32; 10] = [
    0x01000000, 0x02000000, 0x04000000, 0x08000000, 0x10000000,
    0x20000000, 0x40000000, 0x80000000, 0x1b000000, 0x36000000,
];

/// Supported AES key sizes; the discriminant is the bit length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesKeySize {
    Aes128 = 128,
    Aes192 = 192,
    Aes256 = 256,
}

impl AesKeySize {
    /// Map a bit length to a key size.
    pub fn from_bits(bits: usize) -> Option<Self> {
        match bits {
            128 => Some(AesKeySize::Aes128),
            192 => Some(AesKeySize::Aes192),
            256 => Some(AesKeySize::Aes256),
            _ => None,
        }
    }

    pub fn bits(self) -> usize {
        self as usize
    }

    /// Key length in bytes.
    pub fn key_len(self) -> usize {
        self.bits() / 8
    }

    /// Number of cipher rounds.
    pub fn rounds(self) -> usize {
        match self {
            AesKeySize::Aes128 => 10,
            AesKeySize::Aes192 => 12,
            AesKeySize::Aes256 => 14,
        }
    }
}

/// Expanded AES round keys.
///
/// Immutable once loaded. Use separate schedules for encryption and for
/// CBC-MAC; [`crate::cbc`] refuses to authenticate under a shared one.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AesKeySchedule {
    #[zeroize(skip)]
    keysize: AesKeySize,
    round_keys: [u32; MAX_ROUND_KEY_WORDS],
}

impl core::fmt::Debug for AesKeySchedule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AesKeySchedule")
            .field("keysize", &self.keysize)
            .field("round_keys", &"<redacted>")
            .finish()
    }
}

impl AesKeySchedule {
    /// Expand `key` for the given key size. `key` must be exactly
    /// `size.key_len()` bytes.
    pub fn new(key: &[u8], size: AesKeySize) -> Result<Self> {
        if key.len() != size.key_len() {
            return Err(Error::InvalidKeyLength);
        }
        let mut ks = Self { keysize: size, round_keys: [0; MAX_ROUND_KEY_WORDS] };
        ks.expand(key);
        Ok(ks)
    }

    /// Expand `key` given its length in bits (128, 192 or 256).
    pub fn load_key(key: &[u8], bitlen: usize) -> Result<Self> {
        let size = AesKeySize::from_bits(bitlen).ok_or(Error::InvalidKeyLength)?;
        Self::new(key, size)
    }

    /// Draw a fresh key from `rng` and expand it.
    pub fn generate<R: RandomSource + ?Sized>(rng: &mut R, size: AesKeySize) -> Result<Self> {
        let mut key = Zeroizing::new([0u8; 32]);
        let key = &mut key[..size.key_len()];
        rng.fill_bytes(key)?;
        Self::new(key, size)
    }

    pub fn key_size(&self) -> AesKeySize {
        self.keysize
    }

    pub fn rounds(&self) -> usize {
        self.keysize.rounds()
    }

    pub(crate) fn round_key_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        let used = 4 * (self.rounds() + 1);
        self.round_keys[..used].iter().flat_map(|w| w.to_be_bytes())
    }

    fn expand(&mut self, key: &[u8]) {
        let nk = key.len() / 4;
        let total = 4 * (self.rounds() + 1);
        for i in 0..nk {
            self.round_keys[i] = u32::from_be_bytes([
                key[4 * i], key[4 * i + 1], key[4 * i + 2], key[4 * i + 3],
            ]);
        }
        for i in nk..total {
            let mut temp = self.round_keys[i - 1];
            if i % nk == 0 {
                temp = sub_word(temp.rotate_left(8)) ^ RCON[i / nk - 1];
            } else if nk > 6 && i % nk == 4 {
                temp = sub_word(temp);
            }
            self.round_keys[i] = self.round_keys[i - nk] ^ temp;
        }
    }

    /// Encrypt one 16-byte block in place (ECB).
    pub fn encrypt_block(&self, block: &mut [u8; AES_BLOCK_SIZE]) {
        let nr = self.rounds();
        add_round_key(block, &self.round_keys[0..4]);
        for round in 1..nr {
            sub_bytes(block);
            shift_rows(block);
            mix_columns(block);
            add_round_key(block, &self.round_keys[4 * round..4 * round + 4]);
        }
        sub_bytes(block);
        shift_rows(block);
        add_round_key(block, &self.round_keys[4 * nr..4 * nr + 4]);
    }

    /// Decrypt one 16-byte block in place (ECB).
    pub fn decrypt_block(&self, block: &mut [u8; AES_BLOCK_SIZE]) {
        let nr = self.rounds();
        add_round_key(block, &self.round_keys[4 * nr..4 * nr + 4]);
        for round in (1..nr).rev() {
            inv_shift_rows(block);
            inv_sub_bytes(block);
            add_round_key(block, &self.round_keys[4 * round..4 * round + 4]);
            inv_mix_columns(block);
        }
        inv_shift_rows(block);
        inv_sub_bytes(block);
        add_round_key(block, &self.round_keys[0..4]);
    }
}

/// Fill `out` with a random key of the given size (the keygen helper).
pub fn generate_key<R: RandomSource + ?Sized>(
    rng: &mut R,
    size: AesKeySize,
    out: &mut [u8],
) -> Result<usize> {
    let len = size.key_len();
    if out.len() < len {
        return Err(Error::BufferTooSmall);
    }
    rng.fill_bytes(&mut out[..len])?;
    Ok(len)
}

// ── S-box lookup ────────────────────────────────────────────

#[cfg(not(feature = "ct-sbox"))]
#[inline]
fn lookup(table: &[u8; 256], x: u8) -> u8 {
    table[x as usize]
}

/// Scan the whole table so the memory access pattern is independent of `x`.
#[cfg(feature = "ct-sbox")]
#[inline]
fn lookup(table: &[u8; 256], x: u8) -> u8 {
    let mut out = 0u8;
    for (i, &v) in table.iter().enumerate() {
        out |= v & crate::ct::eq_mask(i as u8, x);
    }
    out
}

fn sub_word(w: u32) -> u32 {
    let b = w.to_be_bytes();
    u32::from_be_bytes([
        lookup(&SBOX, b[0]), lookup(&SBOX, b[1]),
        lookup(&SBOX, b[2]), lookup(&SBOX, b[3]),
    ])
}

// ── Round transforms (state is column-major: state[4*c + r]) ──

fn add_round_key(state: &mut [u8; 16], rk: &[u32]) {
    for c in 0..4 {
        let k = rk[c].to_be_bytes();
        for r in 0..4 {
            state[4 * c + r] ^= k[r];
        }
    }
}

fn sub_bytes(state: &mut [u8; 16]) {
    for b in state.iter_mut() {
        *b = lookup(&SBOX, *b);
    }
}

fn inv_sub_bytes(state: &mut [u8; 16]) {
    for b in state.iter_mut() {
        *b = lookup(&INV_SBOX, *b);
    }
}

fn shift_rows(s: &mut [u8; 16]) {
    let t = *s;
    for c in 0..4 {
        for r in 1..4 {
            s[4 * c + r] = t[4 * ((c + r) % 4) + r];
        }
    }
}

fn inv_shift_rows(s: &mut [u8; 16]) {
    let t = *s;
    for c in 0..4 {
        for r in 1..4 {
            s[4 * ((c + r) % 4) + r] = t[4 * c + r];
        }
    }
}

/// Multiply by x in GF(2^8) without a data-dependent branch.
#[inline]
fn xtime(a: u8) -> u8 {
    (a << 1) ^ (0x1b & (a >> 7).wrapping_neg())
}

#[inline]
fn gmul(mut a: u8, mut b: u8) -> u8 {
    let mut p = 0u8;
    for _ in 0..8 {
        p ^= a & (b & 1).wrapping_neg();
        a = xtime(a);
        b >>= 1;
    }
    p
}

fn mix_columns(s: &mut [u8; 16]) {
    for c in 0..4 {
        let col = [s[4 * c], s[4 * c + 1], s[4 * c + 2], s[4 * c + 3]];
        let all = col[0] ^ col[1] ^ col[2] ^ col[3];
        for r in 0..4 {
            s[4 * c + r] = col[r] ^ all ^ xtime(col[r] ^ col[(r + 1) % 4]);
        }
    }
}

fn inv_mix_columns(s: &mut [u8; 16]) {
    for c in 0..4 {
        let col = [s[4 * c], s[4 * c + 1], s[4 * c + 2], s[4 * c + 3]];
        for r in 0..4 {
            s[4 * c + r] = gmul(col[r], 0x0e)
                ^ gmul(col[(r + 1) % 4], 0x0b)
                ^ gmul(col[(r + 2) % 4], 0x0d)
                ^ gmul(col[(r + 3) % 4], 0x09);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn block(s: &str) -> [u8; 16] {
        hex(s).try_into().unwrap()
    }

    const FIPS_PLAINTEXT: &str = "00112233445566778899aabbccddeeff";

    fn check_fips197(key_hex: &str, bits: usize, ct_hex: &str) {
        let ks = AesKeySchedule::load_key(&hex(key_hex), bits).unwrap();
        let mut b = block(FIPS_PLAINTEXT);
        ks.encrypt_block(&mut b);
        assert_eq!(b, block(ct_hex));
        ks.decrypt_block(&mut b);
        assert_eq!(b, block(FIPS_PLAINTEXT));
    }

    #[test]
    fn test_fips197_aes128() {
        check_fips197("000102030405060708090a0b0c0d0e0f", 128, "69c4e0d86a7b0430d8cdb78070b4c55a");
    }

    #[test]
    fn test_fips197_aes192() {
        check_fips197(
            "000102030405060708090a0b0c0d0e0f1011121314151617",
            192,
            "dda97ca4864cdfe06eaf70a0ec0d7191",
        );
    }

    #[test]
    fn test_fips197_aes256() {
        check_fips197(
            "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f",
            256,
            "8ea2b7ca516745bfeafc49904b496089",
        );
    }

    #[test]
    fn test_round_counts() {
        assert_eq!(AesKeySchedule::load_key(&[0; 16], 128).unwrap().rounds(), 10);
        assert_eq!(AesKeySchedule::load_key(&[0; 24], 192).unwrap().rounds(), 12);
        assert_eq!(AesKeySchedule::load_key(&[0; 32], 256).unwrap().rounds(), 14);
    }

    #[test]
    fn test_rejects_bad_key_lengths() {
        assert_eq!(AesKeySchedule::load_key(&[0; 16], 64).unwrap_err(), Error::InvalidKeyLength);
        assert_eq!(AesKeySchedule::load_key(&[0; 16], 256).unwrap_err(), Error::InvalidKeyLength);
        assert_eq!(
            AesKeySchedule::new(&[0; 31], AesKeySize::Aes256).unwrap_err(),
            Error::InvalidKeyLength
        );
    }

    #[test]
    fn test_sbox_tables_are_inverse() {
        for x in 0..=255u8 {
            assert_eq!(INV_SBOX[SBOX[x as usize] as usize], x);
        }
    }

    #[test]
    fn test_debug_redacts_round_keys() {
        let ks = AesKeySchedule::load_key(&[0x42; 16], 128).unwrap();
        let s = format!("{:?}", ks);
        assert!(s.contains("redacted"));
        assert!(!s.contains("42"));
    }
}
