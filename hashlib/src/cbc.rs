//! AES-CBC, CBC-MAC and CBC + CBC-MAC authenticated encryption
//!
//! Authenticated ciphertext layout:
//!
//! ```text
//! [ IV: 16 ][ CBC(ks_enc, IV, padded plaintext): N*16 ][ CBC-MAC(ks_mac, IV || ciphertext): 16 ]
//! ```
//!
//! Decryption verifies the MAC before touching the ciphertext, so no
//! plaintext is released for a forged message.

use zeroize::Zeroizing;

use crate::aes::{AesKeySchedule, AES_BLOCK_SIZE, AES_IV_SIZE, AES_MAC_SIZE};
use crate::random::RandomSource;
use crate::{check_within, ct, Error, Result};

type Block = [u8; AES_BLOCK_SIZE];

fn check_aligned(len: usize) -> Result<()> {
    if len == 0 {
        return Err(Error::EmptyBuffer);
    }
    if len % AES_BLOCK_SIZE != 0 {
        return Err(Error::UnalignedLength);
    }
    Ok(())
}

fn read_block(buf: &[u8], at: usize) -> Block {
    let mut b = [0u8; AES_BLOCK_SIZE];
    b.copy_from_slice(&buf[at..at + AES_BLOCK_SIZE]);
    b
}

fn xor_block(dst: &mut Block, src: &Block) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d ^= s;
    }
}

/// Draw a fresh IV from `rng`.
pub fn generate_iv<R: RandomSource + ?Sized>(rng: &mut R) -> Result<[u8; AES_IV_SIZE]> {
    let mut iv = [0u8; AES_IV_SIZE];
    rng.fill_bytes(&mut iv)?;
    Ok(iv)
}

// ── Chaining over one buffer (output offset <= input offset) ──

fn encrypt_chain(ks: &AesKeySchedule, iv: &Block, buf: &mut [u8], src: usize, dst: usize, len: usize) {
    let mut prev = Zeroizing::new(*iv);
    for i in (0..len).step_by(AES_BLOCK_SIZE) {
        let mut block = Zeroizing::new(read_block(buf, src + i));
        xor_block(&mut block, &prev);
        ks.encrypt_block(&mut block);
        buf[dst + i..dst + i + AES_BLOCK_SIZE].copy_from_slice(&block[..]);
        *prev = *block;
    }
}

fn decrypt_chain(ks: &AesKeySchedule, iv: &Block, buf: &mut [u8], src: usize, dst: usize, len: usize) {
    let mut prev = *iv;
    for i in (0..len).step_by(AES_BLOCK_SIZE) {
        let cipher = read_block(buf, src + i);
        let mut block = Zeroizing::new(cipher);
        ks.decrypt_block(&mut block);
        xor_block(&mut block, &prev);
        buf[dst + i..dst + i + AES_BLOCK_SIZE].copy_from_slice(&block[..]);
        prev = cipher;
    }
}

// ── CBC ─────────────────────────────────────────────────────

/// CBC-encrypt `input` (a multiple of the block size) into `output`.
///
/// Returns the number of bytes written.
pub fn cbc_encrypt(ks: &AesKeySchedule, iv: &Block, input: &[u8], output: &mut [u8]) -> Result<usize> {
    check_aligned(input.len())?;
    if output.len() < input.len() {
        return Err(Error::BufferTooSmall);
    }
    output[..input.len()].copy_from_slice(input);
    encrypt_chain(ks, iv, output, 0, 0, input.len());
    Ok(input.len())
}

/// CBC-encrypt all of `buf` in place.
pub fn cbc_encrypt_in_place(ks: &AesKeySchedule, iv: &Block, buf: &mut [u8]) -> Result<usize> {
    cbc_encrypt_within(ks, iv, buf, 0, 0, buf.len())
}

/// CBC-encrypt `buf[src..src+len]` into `buf[dst..dst+len]`, `dst <= src`.
pub fn cbc_encrypt_within(
    ks: &AesKeySchedule,
    iv: &Block,
    buf: &mut [u8],
    src: usize,
    dst: usize,
    len: usize,
) -> Result<usize> {
    check_aligned(len)?;
    check_within(buf.len(), src, dst, len)?;
    encrypt_chain(ks, iv, buf, src, dst, len);
    Ok(len)
}

/// CBC-decrypt `input` into `output`. Returns the number of bytes written.
pub fn cbc_decrypt(ks: &AesKeySchedule, iv: &Block, input: &[u8], output: &mut [u8]) -> Result<usize> {
    check_aligned(input.len())?;
    if output.len() < input.len() {
        return Err(Error::BufferTooSmall);
    }
    output[..input.len()].copy_from_slice(input);
    decrypt_chain(ks, iv, output, 0, 0, input.len());
    Ok(input.len())
}

/// CBC-decrypt all of `buf` in place.
pub fn cbc_decrypt_in_place(ks: &AesKeySchedule, iv: &Block, buf: &mut [u8]) -> Result<usize> {
    cbc_decrypt_within(ks, iv, buf, 0, 0, buf.len())
}

/// CBC-decrypt `buf[src..src+len]` into `buf[dst..dst+len]`, `dst <= src`.
pub fn cbc_decrypt_within(
    ks: &AesKeySchedule,
    iv: &Block,
    buf: &mut [u8],
    src: usize,
    dst: usize,
    len: usize,
) -> Result<usize> {
    check_aligned(len)?;
    check_within(buf.len(), src, dst, len)?;
    decrypt_chain(ks, iv, buf, src, dst, len);
    Ok(len)
}

// ── CBC-MAC ─────────────────────────────────────────────────

/// CBC-MAC: the last block of CBC-encrypting `data` under a zero IV.
///
/// `ks_mac` must not be the schedule used to encrypt `data`.
pub fn cbc_mac(ks_mac: &AesKeySchedule, data: &[u8]) -> Result<[u8; AES_MAC_SIZE]> {
    check_aligned(data.len())?;
    let mut tag = [0u8; AES_MAC_SIZE];
    for chunk in data.chunks_exact(AES_BLOCK_SIZE) {
        for (t, d) in tag.iter_mut().zip(chunk.iter()) {
            *t ^= d;
        }
        ks_mac.encrypt_block(&mut tag);
    }
    Ok(tag)
}

/// Check that the last block of `data` is the CBC-MAC of everything before it.
pub fn verify_mac(ks_mac: &AesKeySchedule, data: &[u8]) -> Result<()> {
    check_aligned(data.len())?;
    if data.len() < 2 * AES_BLOCK_SIZE {
        return Err(Error::InvalidParameter);
    }
    let split = data.len() - AES_MAC_SIZE;
    let expected = cbc_mac(ks_mac, &data[..split])?;
    if ct::compare_digest(&expected, &data[split..]) {
        Ok(())
    } else {
        log::warn!("[hashlib AES] MAC verification failed ({} bytes)", data.len());
        Err(Error::MacMismatch)
    }
}

/// Whether two schedules expand the same key.
fn same_schedule(a: &AesKeySchedule, b: &AesKeySchedule) -> bool {
    if a.key_size() != b.key_size() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.round_key_bytes().zip(b.round_key_bytes()) {
        diff |= x ^ y;
    }
    ct::is_zero(diff) == 0xFF
}

// ── Authenticated encryption ────────────────────────────────

/// Encrypt pre-padded `plaintext` and write `IV || ciphertext || MAC` to `output`.
///
/// Returns the total length written, `plaintext.len() + 32`.
pub fn auth_encrypt(
    ks_encrypt: &AesKeySchedule,
    ks_mac: &AesKeySchedule,
    iv: &Block,
    plaintext: &[u8],
    output: &mut [u8],
) -> Result<usize> {
    let len = plaintext.len();
    check_aligned(len)?;
    let total = len + AES_IV_SIZE + AES_MAC_SIZE;
    if output.len() < total {
        return Err(Error::BufferTooSmall);
    }
    output[AES_IV_SIZE..AES_IV_SIZE + len].copy_from_slice(plaintext);
    auth_encrypt_in_place(ks_encrypt, ks_mac, iv, output, len)
}

/// Authenticated encryption over one buffer.
///
/// The padded plaintext of `len` bytes must already sit at
/// `buf[AES_IV_SIZE..AES_IV_SIZE + len]`; the IV is written in front of it and
/// the MAC after it.
pub fn auth_encrypt_in_place(
    ks_encrypt: &AesKeySchedule,
    ks_mac: &AesKeySchedule,
    iv: &Block,
    buf: &mut [u8],
    len: usize,
) -> Result<usize> {
    check_aligned(len)?;
    if same_schedule(ks_encrypt, ks_mac) {
        return Err(Error::SameKeySchedule);
    }
    let body_end = AES_IV_SIZE + len;
    let total = body_end + AES_MAC_SIZE;
    if buf.len() < total {
        return Err(Error::BufferTooSmall);
    }
    log::trace!("[hashlib AES] auth encrypt {} bytes", len);

    buf[..AES_IV_SIZE].copy_from_slice(iv);
    encrypt_chain(ks_encrypt, iv, buf, AES_IV_SIZE, AES_IV_SIZE, len);
    let tag = cbc_mac(ks_mac, &buf[..body_end])?;
    buf[body_end..total].copy_from_slice(&tag);
    Ok(total)
}

fn check_auth_input(ks_decrypt: &AesKeySchedule, ks_mac: &AesKeySchedule, len: usize) -> Result<usize> {
    if len <= AES_IV_SIZE + AES_MAC_SIZE {
        return Err(Error::InvalidParameter);
    }
    if len % AES_BLOCK_SIZE != 0 {
        return Err(Error::UnalignedLength);
    }
    if same_schedule(ks_decrypt, ks_mac) {
        return Err(Error::SameKeySchedule);
    }
    Ok(len - AES_IV_SIZE - AES_MAC_SIZE)
}

/// Verify and decrypt `IV || ciphertext || MAC` into `output`.
///
/// Returns the plaintext length (still padded). Nothing is written to
/// `output` unless the MAC matches.
pub fn auth_decrypt(
    ks_decrypt: &AesKeySchedule,
    ks_mac: &AesKeySchedule,
    input: &[u8],
    output: &mut [u8],
) -> Result<usize> {
    let body_len = check_auth_input(ks_decrypt, ks_mac, input.len())?;
    if output.len() < body_len {
        return Err(Error::BufferTooSmall);
    }
    verify_mac(ks_mac, input)?;

    let iv = read_block(input, 0);
    output[..body_len].copy_from_slice(&input[AES_IV_SIZE..AES_IV_SIZE + body_len]);
    decrypt_chain(ks_decrypt, &iv, output, 0, 0, body_len);
    Ok(body_len)
}

/// Verify and decrypt a whole authenticated ciphertext held in `buf`.
///
/// The plaintext is written to the front of `buf`; returns its length.
pub fn auth_decrypt_in_place(
    ks_decrypt: &AesKeySchedule,
    ks_mac: &AesKeySchedule,
    buf: &mut [u8],
) -> Result<usize> {
    let body_len = check_auth_input(ks_decrypt, ks_mac, buf.len())?;
    verify_mac(ks_mac, buf)?;

    let iv = read_block(buf, 0);
    decrypt_chain(ks_decrypt, &iv, buf, AES_IV_SIZE, 0, body_len);
    Ok(body_len)
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

    fn nist_key() -> AesKeySchedule {
        AesKeySchedule::load_key(&hex("2b7e151628aed2a6abf7158809cf4f3c"), 128).unwrap()
    }

    fn mac_key() -> AesKeySchedule {
        AesKeySchedule::load_key(&[0x5c; 32], 256).unwrap()
    }

    const NIST_IV: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];
    const NIST_PT: &str = "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51";
    const NIST_CT: &str = "7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2";

    #[test]
    fn test_sp800_38a_cbc_encrypt() {
        let pt = hex(NIST_PT);
        let mut ct = [0u8; 32];
        assert_eq!(cbc_encrypt(&nist_key(), &NIST_IV, &pt, &mut ct), Ok(32));
        assert_eq!(ct.to_vec(), hex(NIST_CT));
    }

    #[test]
    fn test_sp800_38a_cbc_decrypt() {
        let ct = hex(NIST_CT);
        let mut pt = [0u8; 32];
        assert_eq!(cbc_decrypt(&nist_key(), &NIST_IV, &ct, &mut pt), Ok(32));
        assert_eq!(pt.to_vec(), hex(NIST_PT));
    }

    #[test]
    fn test_in_place_matches_separate_buffers() {
        let mut buf = hex(NIST_PT);
        cbc_encrypt_in_place(&nist_key(), &NIST_IV, &mut buf).unwrap();
        assert_eq!(buf, hex(NIST_CT));
        cbc_decrypt_in_place(&nist_key(), &NIST_IV, &mut buf).unwrap();
        assert_eq!(buf, hex(NIST_PT));
    }

    #[test]
    fn test_within_shifts_output_left() {
        let mut buf = vec![0u8; 48];
        buf[16..].copy_from_slice(&hex(NIST_PT));
        cbc_encrypt_within(&nist_key(), &NIST_IV, &mut buf, 16, 0, 32).unwrap();
        assert_eq!(&buf[..32], &hex(NIST_CT)[..]);

        let mut buf = vec![0u8; 48];
        buf[16..].copy_from_slice(&hex(NIST_CT));
        cbc_decrypt_within(&nist_key(), &NIST_IV, &mut buf, 16, 0, 32).unwrap();
        assert_eq!(&buf[..32], &hex(NIST_PT)[..]);
    }

    #[test]
    fn test_within_rejects_output_after_input() {
        let mut buf = vec![0u8; 48];
        assert_eq!(
            cbc_encrypt_within(&nist_key(), &NIST_IV, &mut buf, 0, 16, 32),
            Err(Error::InvalidAliasing)
        );
        assert_eq!(
            cbc_decrypt_within(&nist_key(), &NIST_IV, &mut buf, 16, 0, 48),
            Err(Error::BufferTooSmall)
        );
    }

    #[test]
    fn test_rejects_unaligned_and_empty() {
        let mut out = [0u8; 32];
        assert_eq!(cbc_encrypt(&nist_key(), &NIST_IV, &[0u8; 17], &mut out), Err(Error::UnalignedLength));
        assert_eq!(cbc_decrypt(&nist_key(), &NIST_IV, &[0u8; 15], &mut out), Err(Error::UnalignedLength));
        assert_eq!(cbc_encrypt(&nist_key(), &NIST_IV, &[], &mut out), Err(Error::EmptyBuffer));
        assert_eq!(cbc_encrypt(&nist_key(), &NIST_IV, &[0u8; 32], &mut out[..16]), Err(Error::BufferTooSmall));
    }

    #[test]
    fn test_cbc_mac_is_last_zero_iv_block() {
        let tag = cbc_mac(&nist_key(), &hex(NIST_PT)).unwrap();
        assert_eq!(tag.to_vec(), hex("b148c17f309ee692287ae57cf12add49"));
    }

    #[test]
    fn test_verify_mac() {
        let mut data = hex(NIST_PT);
        let tag = cbc_mac(&mac_key(), &data).unwrap();
        data.extend_from_slice(&tag);
        assert_eq!(verify_mac(&mac_key(), &data), Ok(()));
        data[3] ^= 1;
        assert_eq!(verify_mac(&mac_key(), &data), Err(Error::MacMismatch));
        assert_eq!(verify_mac(&mac_key(), &data[..16]), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_auth_round_trip() {
        let pt = hex(NIST_PT);
        let iv = [0x24u8; 16];
        let mut sealed = [0u8; 64];
        assert_eq!(auth_encrypt(&nist_key(), &mac_key(), &iv, &pt, &mut sealed), Ok(64));
        assert_eq!(&sealed[..16], &iv);
        verify_mac(&mac_key(), &sealed).unwrap();

        let mut opened = [0u8; 32];
        assert_eq!(auth_decrypt(&nist_key(), &mac_key(), &sealed, &mut opened), Ok(32));
        assert_eq!(opened.to_vec(), pt);
    }

    #[test]
    fn test_auth_in_place_round_trip() {
        let pt = hex(NIST_PT);
        let iv = [0x99u8; 16];
        let mut buf = vec![0u8; 64];
        buf[16..48].copy_from_slice(&pt);
        assert_eq!(auth_encrypt_in_place(&nist_key(), &mac_key(), &iv, &mut buf, 32), Ok(64));

        let mut separate = [0u8; 64];
        auth_encrypt(&nist_key(), &mac_key(), &iv, &pt, &mut separate).unwrap();
        assert_eq!(buf, separate.to_vec());

        assert_eq!(auth_decrypt_in_place(&nist_key(), &mac_key(), &mut buf), Ok(32));
        assert_eq!(&buf[..32], &pt[..]);
    }

    #[test]
    fn test_auth_decrypt_every_flipped_byte_fails() {
        let pt = hex(NIST_PT);
        let mut sealed = [0u8; 64];
        auth_encrypt(&nist_key(), &mac_key(), &[7u8; 16], &pt, &mut sealed).unwrap();
        for pos in 0..sealed.len() {
            let mut forged = sealed;
            forged[pos] ^= 0x01;
            let mut out = [0xEEu8; 32];
            assert_eq!(
                auth_decrypt(&nist_key(), &mac_key(), &forged, &mut out),
                Err(Error::MacMismatch),
                "flip at {} accepted",
                pos
            );
            assert_eq!(out, [0xEEu8; 32], "plaintext released for flip at {}", pos);
        }
    }

    #[test]
    fn test_auth_rejects_short_and_shared_key() {
        let mut out = [0u8; 64];
        assert_eq!(
            auth_decrypt(&nist_key(), &mac_key(), &[0u8; 32], &mut out),
            Err(Error::InvalidParameter)
        );
        assert_eq!(
            auth_decrypt(&nist_key(), &mac_key(), &[0u8; 40], &mut out),
            Err(Error::UnalignedLength)
        );
        assert_eq!(
            auth_encrypt(&nist_key(), &nist_key(), &[0u8; 16], &[0u8; 16], &mut out),
            Err(Error::SameKeySchedule)
        );
    }
}
