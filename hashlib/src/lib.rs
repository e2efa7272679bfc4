//! KPIO Hashlib - cryptographic primitives for constrained targets
//!
//! Every primitive operates on caller-supplied buffers; nothing in this crate
//! allocates. Sensitive state (hash contexts, key schedules, the entropy pool)
//! is wiped on drop.
//!
//! Primitives provided:
//!   - **Hash**:    SHA-256 (streaming), MGF1 arbitrary-length hash
//!   - **MAC**:     HMAC-SHA-256, AES CBC-MAC
//!   - **KDF**:     PBKDF2-HMAC-SHA-256
//!   - **Cipher**:  AES-128/192/256, CBC mode, CBC + CBC-MAC authenticated encryption
//!   - **Padding**: PKCS#7, ISO/IEC 9797-1 M2, ANSI X9.23 (AES); OAEP (RSA)
//!   - **PRNG**:    entropy-pool CSPRNG seeded from a surveyed hardware noise bit
//!
//! # Aliasing
//!
//! Operations that may run over a single buffer come in three forms: separate
//! input/output slices, `*_in_place`, and `*_within` where the output offset
//! must not exceed the input offset.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod ct;
pub mod sha;
pub mod hmac;
pub mod pbkdf2;
pub mod aes;
pub mod cbc;
pub mod padding;
pub mod oaep;
pub mod random;


use core::fmt;

// Convenience re-exports
pub use ct::compare_digest;
pub use sha::{sha256, mgf1, mgf1_xor, Sha256, SHA256_BLOCK_LEN, SHA256_DIGEST_LEN};
pub use hmac::{hmac_sha256, HmacSha256};
pub use pbkdf2::pbkdf2_hmac_sha256;
pub use aes::{generate_key, AesKeySchedule, AesKeySize, AES_BLOCK_SIZE, AES_IV_SIZE, AES_MAC_SIZE};
pub use cbc::{
    auth_decrypt, auth_decrypt_in_place, auth_encrypt, auth_encrypt_in_place, cbc_decrypt,
    cbc_decrypt_in_place, cbc_decrypt_within, cbc_encrypt, cbc_encrypt_in_place,
    cbc_encrypt_within, cbc_mac, generate_iv, verify_mac,
};
pub use padding::{
    aes_auth_ciphertext_size, aes_ciphertext_size, aes_padded_size, pad_message,
    pad_message_in_place, pad_message_within, strip_padding, strip_padding_in_place,
    strip_padding_within, PaddingScheme,
};
pub use oaep::{
    oaep_max_message_len, oaep_pad, oaep_pad_random, oaep_strip, oaep_strip_in_place,
    rsa_encrypt, rsa_padded_size, ModExp, OAEP_MIN_PADDING, OAEP_SALT_LEN,
    RSA_MODULUS_MAX_LEN, RSA_MODULUS_MIN_LEN, RSA_PUBLIC_EXPONENT,
};
pub use random::{
    EntropyPool, MmioNoise, NoiseBit, NoiseSource, RandomSource, Ready, SharedSprng,
    SprngConfig, Surveyed, Uninitialized, ENTROPY_POOL_SIZE,
};
#[cfg(feature = "std")]
pub use random::JitterNoise;
pub use zeroize::{Zeroize, Zeroizing};

/// Hashlib error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// AES key bit length is not 128, 192 or 256, or the key slice is the wrong size.
    InvalidKeyLength,
    /// Length is not a multiple of the AES block size.
    UnalignedLength,
    /// A required buffer is empty.
    EmptyBuffer,
    /// Output buffer too small.
    BufferTooSmall,
    /// Parameter out of its accepted range.
    InvalidParameter,
    /// Output range starts after the input range in a shared buffer.
    InvalidAliasing,
    /// Encryption and MAC key schedules are identical.
    SameKeySchedule,
    /// MAC verification failed.
    MacMismatch,
    /// Padding structure is malformed.
    InvalidPadding,
    /// Message does not fit the padded block.
    MessageTooLong,
    /// RSA modulus rejected (size, parity or leading zero byte).
    InvalidModulus,
    /// Encoded block is not below the modulus.
    MessageOutOfRange,
    /// No noise bit met the survey deviation threshold.
    SurveyFailed,
    /// No random source available for an operation that needs one.
    EntropyUnavailable,
    /// The external modular exponentiation service failed.
    ExternalFailure,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::InvalidKeyLength => "invalid AES key length",
            Error::UnalignedLength => "length is not a multiple of the block size",
            Error::EmptyBuffer => "empty buffer",
            Error::BufferTooSmall => "output buffer too small",
            Error::InvalidParameter => "invalid parameter",
            Error::InvalidAliasing => "output range starts after input range",
            Error::SameKeySchedule => "encryption and MAC keys must differ",
            Error::MacMismatch => "MAC verification failed",
            Error::InvalidPadding => "malformed padding",
            Error::MessageTooLong => "message too long",
            Error::InvalidModulus => "invalid RSA modulus",
            Error::MessageOutOfRange => "encoded message not below modulus",
            Error::SurveyFailed => "no noise bit of sufficient entropy",
            Error::EntropyUnavailable => "random source unavailable",
            Error::ExternalFailure => "modular exponentiation failed",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Wipe a context so no trace of its key or hash state remains.
///
/// Contexts also wipe themselves on drop; this is for reuse of a live value.
pub fn erase_context<T: Zeroize + ?Sized>(ctx: &mut T) {
    ctx.zeroize();
}

/// Check that `dst..dst+len` and `src..src+len` both fit in a buffer of
/// `buf_len` bytes and that the output does not start after the input.
pub(crate) fn check_within(buf_len: usize, src: usize, dst: usize, len: usize) -> Result<()> {
    if dst > src {
        return Err(Error::InvalidAliasing);
    }
    match src.checked_add(len) {
        Some(end) if end <= buf_len => Ok(()),
        _ => Err(Error::BufferTooSmall),
    }
}
