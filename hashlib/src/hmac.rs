//! HMAC (Hash-based Message Authentication Code) - RFC 2104
//!
//! HMAC-SHA-256 (32-byte tag), streaming and one-shot.

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::sha::{Sha256, SHA256_BLOCK_LEN, SHA256_DIGEST_LEN};

/// Keyed HMAC-SHA-256 context.
///
/// Cloning a freshly keyed context is the cheap way to MAC many messages
/// under one key: the ipad/opad blocks are absorbed once.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct HmacSha256 {
    inner: Sha256,
    outer: Sha256,
}

impl HmacSha256 {
    pub fn new(key: &[u8]) -> Self {
        let mut k = Zeroizing::new([0u8; SHA256_BLOCK_LEN]);
        if key.len() > SHA256_BLOCK_LEN {
            let h = Zeroizing::new(crate::sha::sha256(key));
            k[..SHA256_DIGEST_LEN].copy_from_slice(&h[..]);
        } else {
            k[..key.len()].copy_from_slice(key);
        }

        let mut ipad = Zeroizing::new([0x36u8; SHA256_BLOCK_LEN]);
        let mut opad = Zeroizing::new([0x5cu8; SHA256_BLOCK_LEN]);
        for i in 0..SHA256_BLOCK_LEN {
            ipad[i] ^= k[i];
            opad[i] ^= k[i];
        }

        let mut inner = Sha256::new();
        inner.update(&ipad[..]);
        let mut outer = Sha256::new();
        outer.update(&opad[..]);
        Self { inner, outer }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> [u8; SHA256_DIGEST_LEN] {
        let inner_hash = Zeroizing::new(self.inner.clone().finalize());
        let mut outer = self.outer.clone();
        outer.update(&inner_hash[..]);
        outer.finalize()
    }
}

/// HMAC-SHA-256 → 32-byte MAC.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; SHA256_DIGEST_LEN] {
    let mut mac = HmacSha256::new(key);
    mac.update(data);
    mac.finalize()
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

    #[test]
    fn test_rfc4231_case1() {
        let tag = hmac_sha256(&[0x0b; 20], b"Hi There");
        assert_eq!(
            tag.to_vec(),
            hex("b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7")
        );
    }

    #[test]
    fn test_rfc4231_case2() {
        let tag = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            tag.to_vec(),
            hex("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
        );
    }

    #[test]
    fn test_long_key_is_hashed_first() {
        let long_key = [0xaau8; 131];
        let hashed = crate::sha::sha256(&long_key);
        assert_eq!(hmac_sha256(&long_key, b"msg"), hmac_sha256(&hashed, b"msg"));
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut mac = HmacSha256::new(b"key");
        mac.update(b"split ");
        mac.update(b"message");
        assert_eq!(mac.finalize(), hmac_sha256(b"key", b"split message"));
    }
}
