//! AES block padding: PKCS#7, ISO/IEC 9797-1 method 2 and ANSI X9.23
//!
//! Padding always adds between 1 and 16 bytes, so a block-aligned message
//! gains a full block. Stripping PKCS#7 and ISO-M2 checks the whole pad
//! without branching on its contents.

use crate::aes::{AES_BLOCK_SIZE, AES_IV_SIZE, AES_MAC_SIZE};
use crate::random::RandomSource;
use crate::{check_within, ct, Error, Result};

/// Padding scheme tag. The discriminants are the on-the-wire byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PaddingScheme {
    /// Same as [`Pkcs7`](Self::Pkcs7).
    #[default]
    Default = 0,
    /// Every pad byte holds the pad length.
    Pkcs7 = 1,
    /// `0x80` followed by zeros.
    IsoM2 = 2,
    /// Random bytes, pad length in the final byte. Needs a random source.
    AnsiX923 = 3,
}

impl TryFrom<u8> for PaddingScheme {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Default),
            1 => Ok(Self::Pkcs7),
            2 => Ok(Self::IsoM2),
            3 => Ok(Self::AnsiX923),
            _ => Err(Error::InvalidParameter),
        }
    }
}

/// Padded length of a `len`-byte message.
pub const fn aes_padded_size(len: usize) -> usize {
    (len / AES_BLOCK_SIZE + 1) * AES_BLOCK_SIZE
}

/// Plain CBC ciphertext length (IV included) for a `len`-byte message.
pub const fn aes_ciphertext_size(len: usize) -> usize {
    aes_padded_size(len) + AES_IV_SIZE
}

/// Authenticated ciphertext length (IV and MAC included) for a `len`-byte message.
pub const fn aes_auth_ciphertext_size(len: usize) -> usize {
    aes_padded_size(len) + AES_IV_SIZE + AES_MAC_SIZE
}

fn fill_padding(pad: &mut [u8], scheme: PaddingScheme, rng: Option<&mut dyn RandomSource>) -> Result<()> {
    let n = pad.len();
    match scheme {
        PaddingScheme::Default | PaddingScheme::Pkcs7 => pad.fill(n as u8),
        PaddingScheme::IsoM2 => {
            pad.fill(0);
            pad[0] = 0x80;
        }
        PaddingScheme::AnsiX923 => {
            let rng = rng.ok_or(Error::EntropyUnavailable)?;
            if n > 1 {
                rng.fill_bytes(&mut pad[..n - 1])?;
            }
            pad[n - 1] = n as u8;
        }
    }
    Ok(())
}

fn check_rng(scheme: PaddingScheme, rng: &Option<&mut dyn RandomSource>) -> Result<()> {
    if scheme == PaddingScheme::AnsiX923 && rng.is_none() {
        return Err(Error::EntropyUnavailable);
    }
    Ok(())
}

/// Pad `input` into `output`. Returns the padded length.
///
/// `rng` is only consulted for [`PaddingScheme::AnsiX923`].
pub fn pad_message(
    input: &[u8],
    output: &mut [u8],
    scheme: PaddingScheme,
    rng: Option<&mut dyn RandomSource>,
) -> Result<usize> {
    check_rng(scheme, &rng)?;
    let len = input.len();
    let padded = aes_padded_size(len);
    if output.len() < padded {
        return Err(Error::BufferTooSmall);
    }
    output[..len].copy_from_slice(input);
    fill_padding(&mut output[len..padded], scheme, rng)?;
    Ok(padded)
}

/// Pad the `len`-byte message at the front of `buf` where it lies.
pub fn pad_message_in_place(
    buf: &mut [u8],
    len: usize,
    scheme: PaddingScheme,
    rng: Option<&mut dyn RandomSource>,
) -> Result<usize> {
    pad_message_within(buf, 0, 0, len, scheme, rng)
}

/// Pad `buf[src..src+len]`, writing the padded message at `buf[dst..]`, `dst <= src`.
pub fn pad_message_within(
    buf: &mut [u8],
    src: usize,
    dst: usize,
    len: usize,
    scheme: PaddingScheme,
    rng: Option<&mut dyn RandomSource>,
) -> Result<usize> {
    check_rng(scheme, &rng)?;
    check_within(buf.len(), src, dst, len)?;
    let padded = aes_padded_size(len);
    if dst + padded > buf.len() {
        return Err(Error::BufferTooSmall);
    }
    buf.copy_within(src..src + len, dst);
    fill_padding(&mut buf[dst + len..dst + padded], scheme, rng)?;
    Ok(padded)
}

/// Length of the message inside the padded `data`.
fn unpadded_len(data: &[u8], scheme: PaddingScheme) -> Result<usize> {
    let len = data.len();
    if len == 0 {
        return Err(Error::EmptyBuffer);
    }
    if len % AES_BLOCK_SIZE != 0 {
        return Err(Error::UnalignedLength);
    }
    let last = &data[len - AES_BLOCK_SIZE..];

    let (valid, pad_len) = match scheme {
        PaddingScheme::AnsiX923 => return Ok(len),
        PaddingScheme::Default | PaddingScheme::Pkcs7 => {
            let n = last[AES_BLOCK_SIZE - 1];
            let mut valid = !ct::is_zero(n) & ct::lt_mask(n as usize, AES_BLOCK_SIZE + 1);
            for (j, &b) in last.iter().rev().enumerate() {
                let in_pad = ct::lt_mask(j, n as usize);
                valid &= !in_pad | ct::eq_mask(b, n);
            }
            (valid, n as usize)
        }
        PaddingScheme::IsoM2 => {
            let mut found = 0u8;
            let mut marker = 0u8;
            let mut pad_len = 0usize;
            for (j, &b) in last.iter().rev().enumerate() {
                let first = !ct::is_zero(b) & !found;
                pad_len = ct::select_usize(first, j + 1, pad_len);
                marker |= b & first;
                found |= first;
            }
            (found & ct::eq_mask(marker, 0x80), pad_len)
        }
    };

    if valid != 0xFF {
        log::trace!("[hashlib AES] rejected padding on {} byte message", len);
        return Err(Error::InvalidPadding);
    }
    Ok(len - pad_len)
}

/// Strip padding from `input` into `output`. Returns the unpadded length.
///
/// ANSI X9.23 padding is random and not checked: the padded length comes
/// back unchanged and the caller tracks the real length.
pub fn strip_padding(input: &[u8], output: &mut [u8], scheme: PaddingScheme) -> Result<usize> {
    let n = unpadded_len(input, scheme)?;
    if output.len() < n {
        return Err(Error::BufferTooSmall);
    }
    output[..n].copy_from_slice(&input[..n]);
    Ok(n)
}

/// Validate the padding on all of `buf`; the message stays at the front.
pub fn strip_padding_in_place(buf: &mut [u8], scheme: PaddingScheme) -> Result<usize> {
    unpadded_len(buf, scheme)
}

/// Strip `buf[src..src+len]`, moving the message to `buf[dst..]`, `dst <= src`.
pub fn strip_padding_within(
    buf: &mut [u8],
    src: usize,
    dst: usize,
    len: usize,
    scheme: PaddingScheme,
) -> Result<usize> {
    check_within(buf.len(), src, dst, len)?;
    let n = unpadded_len(&buf[src..src + len], scheme)?;
    buf.copy_within(src..src + n, dst);
    Ok(n)
}
