//! OAEP Strip Fuzzing Target
//!
//! Run with: cargo fuzz run oaep_strip_fuzz

#![no_main]

use kpio_fuzz::targets::OaepStripFuzzer;
use kpio_fuzz::FuzzTarget;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Larger than any modulus the engine accepts
    if data.len() > 1024 {
        return;
    }

    let result = OaepStripFuzzer.fuzz(data);
    if let kpio_fuzz::FuzzResult::Crash(info) = result {
        panic!("{:?}: {}", info.crash_type, info.detail);
    }
});
