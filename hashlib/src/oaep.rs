//! OAEP message padding for RSA, and public-key encryption over an external
//! modular exponentiation service
//!
//! Block layout before masking (`k` = modulus length in bytes):
//!
//! ```text
//! | message | 0x01 | 0x00 .. (>= 15) | salt (16) |   == k
//! ```
//!
//! The message region (everything before the salt) is XORed with
//! `MGF1(salt)`, then the salt is XORed with `MGF1(masked region)`. All
//! padding material derives from the salt, so the salt must be unpredictable.

use zeroize::{Zeroize, Zeroizing};

use crate::random::RandomSource;
use crate::sha::mgf1_xor;
use crate::{ct, Error, Result};

/// Salt length in bytes.
pub const OAEP_SALT_LEN: usize = 16;

/// Minimum padding between message and salt: delimiter plus 15 zeros.
pub const OAEP_MIN_PADDING: usize = 16;

/// Smallest accepted modulus, in bytes (512 bits).
pub const RSA_MODULUS_MIN_LEN: usize = 64;

/// Largest accepted modulus, in bytes (4096 bits).
pub const RSA_MODULUS_MAX_LEN: usize = 512;

/// Public exponent 65537, big-endian.
pub const RSA_PUBLIC_EXPONENT: [u8; 3] = [0x01, 0x00, 0x01];

const OAEP_DELIMITER: u8 = 0x01;

/// Fresh salts tried before giving up on an encoding below the modulus.
const RSA_ENCODE_ATTEMPTS: usize = 8;

/// Padded block length for a modulus of `modulus_len` bytes.
pub const fn rsa_padded_size(modulus_len: usize) -> usize {
    modulus_len
}

/// Longest message that fits a modulus of `modulus_len` bytes.
pub const fn oaep_max_message_len(modulus_len: usize) -> usize {
    modulus_len.saturating_sub(OAEP_SALT_LEN + OAEP_MIN_PADDING)
}

fn check_block_len(k: usize) -> Result<()> {
    if (RSA_MODULUS_MIN_LEN..=RSA_MODULUS_MAX_LEN).contains(&k) {
        Ok(())
    } else {
        Err(Error::InvalidParameter)
    }
}

fn mask(block: &mut [u8]) {
    let (region, salt) = block.split_at_mut(block.len() - OAEP_SALT_LEN);
    mgf1_xor(salt, region);
    mgf1_xor(region, salt);
}

fn unmask(block: &mut [u8]) {
    let (region, salt) = block.split_at_mut(block.len() - OAEP_SALT_LEN);
    mgf1_xor(region, salt);
    mgf1_xor(salt, region);
}

/// Pad `input` to a `modulus_len`-byte OAEP block in `output` using `salt`.
///
/// Returns `modulus_len`.
pub fn oaep_pad(
    input: &[u8],
    output: &mut [u8],
    modulus_len: usize,
    salt: &[u8; OAEP_SALT_LEN],
) -> Result<usize> {
    check_block_len(modulus_len)?;
    let m = input.len();
    if m > oaep_max_message_len(modulus_len) {
        return Err(Error::MessageTooLong);
    }
    if output.len() < modulus_len {
        return Err(Error::BufferTooSmall);
    }
    log::trace!("[hashlib OAEP] pad {} bytes into {} byte block", m, modulus_len);

    let block = &mut output[..modulus_len];
    let salt_at = modulus_len - OAEP_SALT_LEN;
    block[..m].copy_from_slice(input);
    block[m] = OAEP_DELIMITER;
    block[m + 1..salt_at].fill(0);
    block[salt_at..].copy_from_slice(salt);
    mask(block);
    Ok(modulus_len)
}

/// As [`oaep_pad`], drawing the salt from `rng`.
pub fn oaep_pad_random<R: RandomSource + ?Sized>(
    rng: &mut R,
    input: &[u8],
    output: &mut [u8],
    modulus_len: usize,
) -> Result<usize> {
    let mut salt = Zeroizing::new([0u8; OAEP_SALT_LEN]);
    rng.fill_bytes(&mut salt[..])?;
    oaep_pad(input, output, modulus_len, &salt)
}

/// Locate the delimiter in an unmasked region. Returns the message length.
fn message_len(region: &[u8]) -> Result<usize> {
    // last index at which the delimiter may sit
    let latest = region.len() - OAEP_MIN_PADDING;
    let mut found = 0u8;
    let mut marker = 0u8;
    let mut pos = 0usize;
    for (j, &b) in region.iter().enumerate().rev() {
        let first = !ct::is_zero(b) & !found;
        pos = ct::select_usize(first, j, pos);
        marker |= b & first;
        found |= first;
    }
    let valid = found & ct::eq_mask(marker, OAEP_DELIMITER) & !ct::lt_mask(latest, pos);
    if valid != 0xFF {
        log::warn!("[hashlib OAEP] malformed {} byte block", region.len() + OAEP_SALT_LEN);
        return Err(Error::InvalidPadding);
    }
    Ok(pos)
}

/// Remove OAEP padding from `input` (one full block) into `output`.
///
/// Returns the message length. Nothing is written on failure.
pub fn oaep_strip(input: &[u8], output: &mut [u8]) -> Result<usize> {
    let k = input.len();
    check_block_len(k)?;
    let mut scratch = Zeroizing::new([0u8; RSA_MODULUS_MAX_LEN]);
    let block = &mut scratch[..k];
    block.copy_from_slice(input);
    unmask(block);

    let n = message_len(&block[..k - OAEP_SALT_LEN])?;
    if output.len() < n {
        return Err(Error::BufferTooSmall);
    }
    output[..n].copy_from_slice(&block[..n]);
    Ok(n)
}

/// Remove OAEP padding from the block in `buf`, leaving the message at the front.
///
/// On failure the whole buffer is wiped.
pub fn oaep_strip_in_place(buf: &mut [u8]) -> Result<usize> {
    let k = buf.len();
    check_block_len(k)?;
    unmask(buf);
    match message_len(&buf[..k - OAEP_SALT_LEN]) {
        Ok(n) => {
            buf[n..].zeroize();
            Ok(n)
        }
        Err(e) => {
            buf.zeroize();
            Err(e)
        }
    }
}

// ── RSA public operation ────────────────────────────────────

/// Modular exponentiation provided outside the engine.
///
/// All operands are unsigned big-endian. `out` has the modulus length and
/// receives `base ^ exponent mod modulus`. Implementations report their own
/// failures as [`Error::ExternalFailure`].
pub trait ModExp {
    fn modexp(&mut self, base: &[u8], exponent: &[u8], modulus: &[u8], out: &mut [u8]) -> Result<()>;
}

fn check_modulus(modulus: &[u8]) -> Result<()> {
    let k = modulus.len();
    if !(RSA_MODULUS_MIN_LEN..=RSA_MODULUS_MAX_LEN).contains(&k)
        || modulus[0] == 0
        || modulus[k - 1] & 1 == 0
    {
        return Err(Error::InvalidModulus);
    }
    Ok(())
}

/// OAEP-pad `msg` with a random salt and encrypt it under `(modulus, 65537)`.
///
/// An encoding that is not numerically below the modulus is redrawn with a
/// fresh salt. Returns the ciphertext length, which equals the modulus length.
pub fn rsa_encrypt<M, R>(
    engine: &mut M,
    rng: &mut R,
    msg: &[u8],
    modulus: &[u8],
    out: &mut [u8],
) -> Result<usize>
where
    M: ModExp + ?Sized,
    R: RandomSource + ?Sized,
{
    check_modulus(modulus)?;
    let k = modulus.len();
    if out.len() < k {
        return Err(Error::BufferTooSmall);
    }

    let mut scratch = Zeroizing::new([0u8; RSA_MODULUS_MAX_LEN]);
    let block = &mut scratch[..k];
    for attempt in 0..RSA_ENCODE_ATTEMPTS {
        oaep_pad_random(rng, msg, block, k)?;
        // equal lengths, so byte order is numeric order
        if &block[..] < modulus {
            engine.modexp(block, &RSA_PUBLIC_EXPONENT, modulus, &mut out[..k])?;
            return Ok(k);
        }
        log::debug!("[hashlib RSA] encoding not below modulus, redrawing salt ({})", attempt + 1);
    }
    Err(Error::MessageOutOfRange)
}
