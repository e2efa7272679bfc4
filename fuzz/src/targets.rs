//! Hashlib Fuzz Targets
//!
//! One target per integrity-checking decoder, plus a round-trip target
//! that feeds arbitrary data through every encoder and back.

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use kpio_hashlib::{
    auth_decrypt, auth_decrypt_in_place, auth_encrypt, cbc_decrypt, cbc_encrypt,
    cbc_encrypt_within, compare_digest, oaep_max_message_len, oaep_pad, oaep_strip,
    oaep_strip_in_place, pad_message, sha256, strip_padding, strip_padding_in_place,
    verify_mac, AesKeySchedule, PaddingScheme, Sha256, AES_BLOCK_SIZE, OAEP_SALT_LEN,
    RSA_MODULUS_MAX_LEN,
};

use crate::{CrashInfo, CrashType, FuzzResult, FuzzTarget};

const SENTINEL: u8 = 0xEE;

fn crash(crash_type: CrashType, detail: &str) -> FuzzResult {
    FuzzResult::Crash(CrashInfo::new(crash_type, detail))
}

fn rejected(e: kpio_hashlib::Error) -> FuzzResult {
    FuzzResult::Rejected(e.to_string())
}

fn untouched(buf: &[u8]) -> bool {
    buf.iter().all(|&b| b == SENTINEL)
}

fn fixed_keys() -> kpio_hashlib::Result<(AesKeySchedule, AesKeySchedule)> {
    let enc = AesKeySchedule::load_key(&[0x2b; 16], 128)?;
    let mac = AesKeySchedule::load_key(&[0x7e; 32], 256)?;
    Ok((enc, mac))
}

// ── OAEP strip ──────────────────────────────────────────────

/// Arbitrary bytes as an OAEP block.
#[derive(Default)]
pub struct OaepStripFuzzer;

impl FuzzTarget for OaepStripFuzzer {
    fn name(&self) -> &str {
        "oaep_strip"
    }

    fn fuzz(&mut self, input: &[u8]) -> FuzzResult {
        let mut out = [SENTINEL; RSA_MODULUS_MAX_LEN];
        let result = oaep_strip(input, &mut out);
        let mut copy = input.to_vec();
        let in_place = oaep_strip_in_place(&mut copy);
        if result != in_place {
            return crash(CrashType::Inconsistent, "oaep_strip and oaep_strip_in_place disagree");
        }
        match result {
            Ok(n) => {
                if n > oaep_max_message_len(input.len()) {
                    return crash(CrashType::BoundsViolation, "message longer than the block allows");
                }
                if out[..n] != copy[..n] {
                    return crash(CrashType::Inconsistent, "in-place message differs");
                }
                FuzzResult::Ok
            }
            Err(e) => {
                if !untouched(&out) {
                    return crash(CrashType::PlaintextReleased, "output written on failed strip");
                }
                // only a block that was unmasked has anything to wipe
                if e == kpio_hashlib::Error::InvalidPadding && copy.iter().any(|&b| b != 0) {
                    return crash(CrashType::PlaintextReleased, "failed in-place strip left data behind");
                }
                rejected(e)
            }
        }
    }

    fn reset(&mut self) {}
}

// ── AES padding strip ───────────────────────────────────────

/// First byte picks the scheme, the rest is a padded message.
#[derive(Default)]
pub struct PaddingStripFuzzer;

impl FuzzTarget for PaddingStripFuzzer {
    fn name(&self) -> &str {
        "padding_strip"
    }

    fn fuzz(&mut self, input: &[u8]) -> FuzzResult {
        let Some((&tag, data)) = input.split_first() else {
            return FuzzResult::Rejected(String::from("empty input"));
        };
        let scheme = match PaddingScheme::try_from(tag & 0x03) {
            Ok(s) => s,
            Err(e) => return rejected(e),
        };

        let mut out = vec![SENTINEL; data.len()];
        let result = strip_padding(data, &mut out, scheme);
        let mut copy = data.to_vec();
        if strip_padding_in_place(&mut copy, scheme) != result {
            return crash(CrashType::Inconsistent, "strip_padding and strip_padding_in_place disagree");
        }

        let n = match result {
            Ok(n) => n,
            Err(e) => {
                if !untouched(&out) {
                    return crash(CrashType::PlaintextReleased, "output written on failed strip");
                }
                return rejected(e);
            }
        };
        if n > data.len() {
            return crash(CrashType::BoundsViolation, "unpadded length exceeds input");
        }
        if scheme == PaddingScheme::AnsiX923 {
            if n != data.len() {
                return crash(CrashType::BoundsViolation, "ANSI X9.23 strip changed the length");
            }
            return FuzzResult::Ok;
        }

        // accepted padding must be exactly what pad_message would write
        let mut repadded = vec![0u8; data.len()];
        match pad_message(&data[..n], &mut repadded, scheme, None) {
            Ok(len) if len == data.len() && repadded == data => FuzzResult::Ok,
            _ => crash(CrashType::ForgeryAccepted, "non-canonical padding accepted"),
        }
    }

    fn reset(&mut self) {}
}

// ── Authenticated decryption ────────────────────────────────

const SEALED_MESSAGE: &[u8] = b"fuzzing the authenticated decryptor!";

/// Forged ciphertexts against a fixed key pair.
///
/// The input is tried twice: as a ciphertext on its own, and XORed into a
/// genuine ciphertext as a tamper pattern.
pub struct AuthDecryptFuzzer {
    enc: AesKeySchedule,
    mac: AesKeySchedule,
    genuine: Vec<u8>,
}

impl AuthDecryptFuzzer {
    pub fn new() -> kpio_hashlib::Result<Self> {
        let (enc, mac) = fixed_keys()?;
        let mut padded = [0u8; 48];
        let mut genuine = vec![0u8; 80];
        let n = pad_message(SEALED_MESSAGE, &mut padded, PaddingScheme::Pkcs7, None)?;
        let len = auth_encrypt(&enc, &mac, &[0x0f; 16], &padded[..n], &mut genuine)?;
        genuine.truncate(len);
        Ok(Self { enc, mac, genuine })
    }

    /// The ciphertext this target accepts.
    pub fn genuine(&self) -> &[u8] {
        &self.genuine
    }

    fn open(&self, ciphertext: &[u8]) -> Result<usize, FuzzResult> {
        let mut out = vec![SENTINEL; ciphertext.len()];
        let result = auth_decrypt(&self.enc, &self.mac, ciphertext, &mut out);
        let mut copy = ciphertext.to_vec();
        if auth_decrypt_in_place(&self.enc, &self.mac, &mut copy) != result {
            return Err(crash(CrashType::Inconsistent, "auth_decrypt and auth_decrypt_in_place disagree"));
        }
        match result {
            Ok(_) if ciphertext != self.genuine.as_slice() => {
                Err(crash(CrashType::ForgeryAccepted, "tampered ciphertext authenticated"))
            }
            Ok(n) => Ok(n),
            Err(e) => {
                if !untouched(&out) {
                    return Err(crash(CrashType::PlaintextReleased, "plaintext released on MAC failure"));
                }
                Err(rejected(e))
            }
        }
    }
}

impl FuzzTarget for AuthDecryptFuzzer {
    fn name(&self) -> &str {
        "auth_decrypt"
    }

    fn fuzz(&mut self, input: &[u8]) -> FuzzResult {
        let mut forged = self.genuine.clone();
        let len = forged.len();
        for (i, &b) in input.iter().enumerate() {
            forged[i % len] ^= b;
        }
        match self.open(&forged) {
            Err(FuzzResult::Rejected(_)) if forged != self.genuine => {}
            Ok(_) if forged == self.genuine => {}
            Err(r @ FuzzResult::Crash(_)) => return r,
            _ => return crash(CrashType::Inconsistent, "genuine ciphertext rejected"),
        }

        match self.open(input) {
            Ok(_) => FuzzResult::Ok,
            Err(r) => r,
        }
    }

    fn reset(&mut self) {}
}

// ── MAC verification and digest compare ─────────────────────

/// Arbitrary `data || tag` against a MAC key no other target seals with,
/// and compare_digest against plain equality on the two input halves.
pub struct MacVerifyFuzzer {
    mac: AesKeySchedule,
}

impl MacVerifyFuzzer {
    pub fn new() -> kpio_hashlib::Result<Self> {
        Ok(Self { mac: AesKeySchedule::load_key(&[0x6d; 24], 192)? })
    }
}

impl FuzzTarget for MacVerifyFuzzer {
    fn name(&self) -> &str {
        "verify_mac"
    }

    fn fuzz(&mut self, input: &[u8]) -> FuzzResult {
        let (a, b) = input.split_at(input.len() / 2);
        if compare_digest(a, b) != (a == b) || !compare_digest(input, input) {
            return crash(CrashType::Inconsistent, "compare_digest disagrees with equality");
        }

        match verify_mac(&self.mac, input) {
            // only reachable by recomputing the tag under the secret key
            Ok(()) => crash(CrashType::ForgeryAccepted, "arbitrary input carried a valid MAC"),
            Err(e) => rejected(e),
        }
    }

    fn reset(&mut self) {}
}

// ── Round trips ─────────────────────────────────────────────

/// Arbitrary data through pad, CBC, OAEP and SHA-256 and back.
pub struct RoundTripFuzzer {
    enc: AesKeySchedule,
}

impl RoundTripFuzzer {
    pub fn new() -> kpio_hashlib::Result<Self> {
        Ok(Self { enc: fixed_keys()?.0 })
    }
}

const OAEP_BLOCK: usize = 128;

impl RoundTripFuzzer {
    fn padding(&self, input: &[u8]) -> Option<FuzzResult> {
        for scheme in [PaddingScheme::Pkcs7, PaddingScheme::IsoM2] {
            let mut padded = vec![0u8; input.len() + AES_BLOCK_SIZE];
            let n = match pad_message(input, &mut padded, scheme, None) {
                Ok(n) => n,
                Err(e) => return Some(rejected(e)),
            };
            let mut out = vec![0u8; n];
            match strip_padding(&padded[..n], &mut out, scheme) {
                Ok(m) if out[..m] == *input => {}
                _ => return Some(crash(CrashType::RoundTripMismatch, "padding round trip")),
            }
        }
        None
    }

    fn cbc(&self, input: &[u8]) -> Option<FuzzResult> {
        let len = input.len() - input.len() % AES_BLOCK_SIZE;
        if len == 0 {
            return None;
        }
        let iv = [0x33u8; 16];
        let mut ct = vec![0u8; len];
        let mut pt = vec![0u8; len];
        let ok = cbc_encrypt(&self.enc, &iv, &input[..len], &mut ct).is_ok()
            && cbc_decrypt(&self.enc, &iv, &ct, &mut pt).is_ok();
        if !ok || pt[..] != input[..len] {
            return Some(crash(CrashType::RoundTripMismatch, "CBC round trip"));
        }

        // shifted single-buffer form must match the two-buffer form
        let mut shifted = vec![0u8; len + AES_BLOCK_SIZE];
        shifted[AES_BLOCK_SIZE..].copy_from_slice(&input[..len]);
        if cbc_encrypt_within(&self.enc, &iv, &mut shifted, AES_BLOCK_SIZE, 0, len).is_err()
            || shifted[..len] != ct[..]
        {
            return Some(crash(CrashType::Inconsistent, "cbc_encrypt_within differs"));
        }
        None
    }

    fn oaep(&self, input: &[u8]) -> Option<FuzzResult> {
        let msg = &input[..input.len().min(oaep_max_message_len(OAEP_BLOCK))];
        let digest = sha256(input);
        let mut salt = [0u8; OAEP_SALT_LEN];
        salt.copy_from_slice(&digest[..OAEP_SALT_LEN]);

        let mut block = [0u8; OAEP_BLOCK];
        let mut out = [0u8; OAEP_BLOCK];
        match oaep_pad(msg, &mut block, OAEP_BLOCK, &salt).and_then(|_| oaep_strip(&block, &mut out)) {
            Ok(n) if out[..n] == *msg => None,
            _ => Some(crash(CrashType::RoundTripMismatch, "OAEP round trip")),
        }
    }

    fn sha(&self, input: &[u8]) -> Option<FuzzResult> {
        let split = input.first().map_or(0, |&b| b as usize % (input.len() + 1));
        let mut ctx = Sha256::new();
        ctx.update(&input[..split]);
        ctx.update(&input[split..]);
        if ctx.finalize() != sha256(input) {
            return Some(crash(CrashType::Inconsistent, "streamed SHA-256 differs"));
        }
        None
    }
}

impl FuzzTarget for RoundTripFuzzer {
    fn name(&self) -> &str {
        "round_trip"
    }

    fn fuzz(&mut self, input: &[u8]) -> FuzzResult {
        self.padding(input)
            .or_else(|| self.cbc(input))
            .or_else(|| self.oaep(input))
            .or_else(|| self.sha(input))
            .unwrap_or(FuzzResult::Ok)
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::quick_fuzz;

    #[test]
    fn test_oaep_target_accepts_valid_block() {
        let mut block = [0u8; 64];
        oaep_pad(b"ok", &mut block, 64, &[1; 16]).unwrap();
        assert_eq!(OaepStripFuzzer.fuzz(&block), FuzzResult::Ok);
        assert!(matches!(OaepStripFuzzer.fuzz(&[0x55; 64]), FuzzResult::Rejected(_)));
        assert!(matches!(OaepStripFuzzer.fuzz(&[1, 2, 3]), FuzzResult::Rejected(_)));
    }

    #[test]
    fn test_padding_target() {
        let mut input = vec![PaddingScheme::Pkcs7 as u8];
        input.extend_from_slice(&[4u8; 16]);
        assert_eq!(PaddingStripFuzzer.fuzz(&input), FuzzResult::Ok);
        input[14] = 9;
        assert!(matches!(PaddingStripFuzzer.fuzz(&input), FuzzResult::Rejected(_)));
        assert!(matches!(PaddingStripFuzzer.fuzz(&[]), FuzzResult::Rejected(_)));
    }

    #[test]
    fn test_auth_target_genuine_and_forged() {
        let mut target = AuthDecryptFuzzer::new().unwrap();
        assert_eq!(target.genuine().len(), 80);
        let genuine = target.genuine().to_vec();
        // as a tamper pattern it zeroes the ciphertext; on its own it decrypts
        assert_eq!(target.fuzz(&genuine), FuzzResult::Ok);
        let mut forged = genuine.clone();
        forged[20] ^= 1;
        assert!(matches!(target.fuzz(&forged), FuzzResult::Rejected(_)));
    }

    #[test]
    fn test_mac_target_rejects() {
        let mut target = MacVerifyFuzzer::new().unwrap();
        assert!(matches!(target.fuzz(&[0u8; 48]), FuzzResult::Rejected(_)));
        assert!(matches!(target.fuzz(&[]), FuzzResult::Rejected(_)));
    }

    #[test]
    fn test_round_trip_target() {
        let mut target = RoundTripFuzzer::new().unwrap();
        for len in [0usize, 1, 15, 16, 17, 100, 300] {
            let input: Vec<u8> = (0..len).map(|i| (i * 31) as u8).collect();
            assert_eq!(target.fuzz(&input), FuzzResult::Ok, "len {}", len);
        }
    }

    #[test]
    fn test_no_target_crashes() {
        assert!(!quick_fuzz(OaepStripFuzzer, vec![vec![0u8; 64]], 300));
        assert!(!quick_fuzz(PaddingStripFuzzer, vec![vec![1u8; 17]], 1000));
        assert!(!quick_fuzz(MacVerifyFuzzer::new().unwrap(), vec![vec![7u8; 32]], 500));
        assert!(!quick_fuzz(RoundTripFuzzer::new().unwrap(), vec![b"seed".to_vec()], 300));
        let auth = AuthDecryptFuzzer::new().unwrap();
        let seed = auth.genuine().to_vec();
        assert!(!quick_fuzz(auth, vec![seed, Vec::new()], 300));
    }
}
