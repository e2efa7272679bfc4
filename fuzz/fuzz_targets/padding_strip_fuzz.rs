//! Padding Strip Fuzzing Target
//!
//! Run with: cargo fuzz run padding_strip_fuzz
//!
//! The first input byte selects the padding scheme.

#![no_main]

use kpio_fuzz::targets::PaddingStripFuzzer;
use kpio_fuzz::{FuzzResult, FuzzTarget};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let FuzzResult::Crash(info) = PaddingStripFuzzer.fuzz(data) {
        panic!("{:?}: {}", info.crash_type, info.detail);
    }
});
