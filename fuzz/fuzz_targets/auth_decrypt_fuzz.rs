//! Authenticated Decryption Fuzzing Target
//!
//! Run with: cargo fuzz run auth_decrypt_fuzz

#![no_main]

use kpio_fuzz::targets::AuthDecryptFuzzer;
use kpio_fuzz::{FuzzResult, FuzzTarget};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(mut target) = AuthDecryptFuzzer::new() else {
        return;
    };

    if let FuzzResult::Crash(info) = target.fuzz(data) {
        panic!("{:?}: {}", info.crash_type, info.detail);
    }
});
