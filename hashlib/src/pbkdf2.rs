//! PBKDF2 (RFC 8018 §5.2) with HMAC-SHA-256 as the PRF
//!
//! Salt length and iteration count are the caller's policy; a salt of at
//! least 16 bytes is recommended but not enforced.

use zeroize::Zeroizing;

use crate::hmac::HmacSha256;
use crate::sha::SHA256_DIGEST_LEN;
use crate::{Error, Result};

/// Derive `out.len()` bytes from `password` and `salt`.
///
/// Block `i` (1-based) is `U1 ^ U2 ^ .. ^ Uc` with `U1 = PRF(P, S || INT(i))`
/// and `Uj = PRF(P, Uj-1)`. The final block is truncated.
pub fn pbkdf2_hmac_sha256(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    out: &mut [u8],
) -> Result<()> {
    if out.is_empty() {
        return Err(Error::EmptyBuffer);
    }
    if iterations == 0 {
        return Err(Error::InvalidParameter);
    }
    // dkLen > (2^32 - 1) * hLen is unreachable on 32-bit targets but checked anyway
    if (out.len() as u64).div_ceil(SHA256_DIGEST_LEN as u64) > u32::MAX as u64 {
        return Err(Error::InvalidParameter);
    }
    log::trace!("[hashlib PBKDF2] {} iterations, {} bytes", iterations, out.len());

    let keyed = HmacSha256::new(password);
    for (i, chunk) in out.chunks_mut(SHA256_DIGEST_LEN).enumerate() {
        let block_index = (i as u32) + 1;

        let mut prf = keyed.clone();
        prf.update(salt);
        prf.update(&block_index.to_be_bytes());
        let mut u = Zeroizing::new(prf.finalize());
        let mut t = Zeroizing::new(*u);

        for _ in 1..iterations {
            let mut prf = keyed.clone();
            prf.update(&u[..]);
            *u = prf.finalize();
            for (acc, byte) in t.iter_mut().zip(u.iter()) {
                *acc ^= byte;
            }
        }
        chunk.copy_from_slice(&t[..chunk.len()]);
    }
    Ok(())
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

    const DEMO_SALT: [u8; 16] = [
        0xea, 0x53, 0xad, 0xb5, 0x34, 0x96, 0xdc, 0xdd,
        0xd9, 0xd8, 0xf1, 0x50, 0x4c, 0x9d, 0xfb, 0x4d,
    ];

    #[test]
    fn test_demo_vector() {
        let mut out = [0u8; 64];
        pbkdf2_hmac_sha256(b"testing123", &DEMO_SALT, 100, &mut out).unwrap();
        assert_eq!(
            out.to_vec(),
            hex("f1b46516a955f321577c16bc71fe174901362031e323b96016c7278b5e8595a1\
                 0eb9d43f41f83794daeb978420688da4d83ed90280fb02c99a83254c07d48f10")
        );
    }

    #[test]
    fn test_single_iteration() {
        let mut out = [0u8; 32];
        pbkdf2_hmac_sha256(b"password", b"salt", 1, &mut out).unwrap();
        assert_eq!(
            out.to_vec(),
            hex("120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b")
        );
    }

    #[test]
    fn test_two_iterations() {
        let mut out = [0u8; 32];
        pbkdf2_hmac_sha256(b"password", b"salt", 2, &mut out).unwrap();
        assert_eq!(
            out.to_vec(),
            hex("ae4d0c95af6b46d32d0adff928f06dd02a303f8ef3c251dfd6e2d85a95474c43")
        );
    }

    #[test]
    fn test_truncated_output_is_prefix() {
        let mut full = [0u8; 64];
        let mut short = [0u8; 20];
        pbkdf2_hmac_sha256(b"testing123", &DEMO_SALT, 100, &mut full).unwrap();
        pbkdf2_hmac_sha256(b"testing123", &DEMO_SALT, 100, &mut short).unwrap();
        assert_eq!(&full[..20], &short[..]);
    }

    #[test]
    fn test_rejects_degenerate_parameters() {
        let mut out = [0u8; 32];
        assert_eq!(pbkdf2_hmac_sha256(b"pw", b"salt", 0, &mut out), Err(Error::InvalidParameter));
        assert_eq!(pbkdf2_hmac_sha256(b"pw", b"salt", 1, &mut []), Err(Error::EmptyBuffer));
    }
}
