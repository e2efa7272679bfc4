//! KPIO Hashlib Fuzzing Infrastructure
//!
//! Drives the engine's integrity-checking decoders (OAEP strip, padding
//! strip, MAC verification, authenticated decryption) with hostile input.
//! A target reports a crash when an engine invariant breaks: a forged
//! ciphertext accepted, plaintext released on failure, a non-canonical
//! padding accepted, or a round trip that does not come back.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
extern crate alloc;

pub mod harness;
pub mod targets;

use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};

/// Fuzzing target trait
pub trait FuzzTarget {
    /// Name of the fuzz target
    fn name(&self) -> &str;

    /// Run fuzzing iteration with input
    fn fuzz(&mut self, input: &[u8]) -> FuzzResult;

    /// Reset state between iterations
    fn reset(&mut self);
}

/// Result of a fuzz iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuzzResult {
    /// Input accepted and every invariant held
    Ok,
    /// Input rejected by the engine (expected for hostile input)
    Rejected(String),
    /// Engine invariant broken
    Crash(CrashInfo),
}

impl FuzzResult {
    /// Check if this is a crash
    pub fn is_crash(&self) -> bool {
        matches!(self, FuzzResult::Crash(_))
    }

    /// Short label used for outcome tracking
    pub fn label(&self) -> &str {
        match self {
            FuzzResult::Ok => "ok",
            FuzzResult::Rejected(reason) => reason,
            FuzzResult::Crash(_) => "crash",
        }
    }
}

/// Crash information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashInfo {
    /// Crash type
    pub crash_type: CrashType,
    /// What went wrong
    pub detail: String,
}

impl CrashInfo {
    pub fn new(crash_type: CrashType, detail: &str) -> Self {
        Self { crash_type, detail: String::from(detail) }
    }
}

/// Type of crash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrashType {
    /// Tampered or forged input passed an integrity check
    ForgeryAccepted,
    /// Output buffer written although the operation failed
    PlaintextReleased,
    /// Decode of an encode did not return the original
    RoundTripMismatch,
    /// Two forms of one operation disagree
    Inconsistent,
    /// Accepted output violates a size bound
    BoundsViolation,
}

/// Fuzzer configuration
#[derive(Debug, Clone)]
pub struct FuzzerConfig {
    /// Maximum input size
    pub max_input_size: usize,
    /// Maximum iterations
    pub max_iterations: u64,
    /// Mutator seed
    pub seed: u64,
    /// Maximum corpus entries
    pub max_corpus: usize,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        Self {
            max_input_size: 1024,
            max_iterations: 10_000,
            seed: 12345,
            max_corpus: 4096,
        }
    }
}

/// Fuzzing statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuzzStats {
    /// Total iterations
    pub iterations: u64,
    /// Inputs every target accepted
    pub accepted: u64,
    /// Inputs at least one target rejected
    pub rejected: u64,
    /// Crashes found
    pub crashes: u64,
    /// Unique crashes
    pub unique_crashes: u64,
    /// Corpus size
    pub corpus_size: usize,
    /// Distinct (target, outcome) pairs seen
    pub outcomes: usize,
}

/// Mutator for input generation
pub struct Mutator {
    /// Current seed
    seed: u64,
    /// Dictionary of interesting values
    dictionary: Vec<Vec<u8>>,
}

/// Block size the block-aware mutations align to
const BLOCK: usize = 16;

impl Mutator {
    /// Create a new mutator
    pub fn new(seed: u64) -> Self {
        Self { seed, dictionary: Vec::new() }
    }

    /// Add dictionary entry
    pub fn add_dictionary(&mut self, entry: Vec<u8>) {
        self.dictionary.push(entry);
    }

    /// Next pseudo-random value
    pub fn next_u64(&mut self) -> u64 {
        self.seed = self.seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.seed >> 16
    }

    /// Mutate input
    pub fn mutate(&mut self, input: &mut Vec<u8>) {
        match self.next_u64() % 11 {
            0 => self.bit_flip(input),
            1 => self.byte_flip(input),
            2 => self.byte_insert(input),
            3 => self.byte_delete(input),
            4 => self.byte_replace(input),
            5 => self.block_align(input),
            6 => self.interesting_value(input),
            7 => self.dictionary_insert(input),
            8 => self.havoc(input),
            9 => self.block_swap(input),
            _ => self.random_bytes(input),
        }
    }

    fn pick(&mut self, len: usize) -> usize {
        (self.next_u64() as usize) % len
    }

    fn bit_flip(&mut self, input: &mut Vec<u8>) {
        if input.is_empty() {
            return;
        }
        let pos = self.pick(input.len());
        let bit = (self.next_u64() % 8) as u8;
        input[pos] ^= 1 << bit;
    }

    fn byte_flip(&mut self, input: &mut Vec<u8>) {
        if input.is_empty() {
            return;
        }
        let pos = self.pick(input.len());
        input[pos] ^= 0xFF;
    }

    fn byte_insert(&mut self, input: &mut Vec<u8>) {
        let pos = if input.is_empty() { 0 } else { self.pick(input.len()) };
        let byte = (self.next_u64() & 0xFF) as u8;
        input.insert(pos, byte);
    }

    fn byte_delete(&mut self, input: &mut Vec<u8>) {
        if input.is_empty() {
            return;
        }
        let pos = self.pick(input.len());
        input.remove(pos);
    }

    fn byte_replace(&mut self, input: &mut Vec<u8>) {
        if input.is_empty() {
            return;
        }
        let pos = self.pick(input.len());
        input[pos] = (self.next_u64() & 0xFF) as u8;
    }

    /// Grow or shrink to a whole number of blocks.
    fn block_align(&mut self, input: &mut Vec<u8>) {
        let rem = input.len() % BLOCK;
        if rem == 0 {
            return;
        }
        if self.next_u64() & 1 == 0 {
            input.truncate(input.len() - rem);
        } else {
            input.resize(input.len() + BLOCK - rem, 0);
        }
    }

    /// Swap two whole blocks (CBC reordering).
    fn block_swap(&mut self, input: &mut Vec<u8>) {
        let blocks = input.len() / BLOCK;
        if blocks < 2 {
            return;
        }
        let a = self.pick(blocks);
        let b = self.pick(blocks);
        if a == b {
            return;
        }
        let (lo, hi) = (a.min(b), a.max(b));
        let (head, tail) = input.split_at_mut(hi * BLOCK);
        head[lo * BLOCK..lo * BLOCK + BLOCK].swap_with_slice(&mut tail[..BLOCK]);
    }

    fn interesting_value(&mut self, input: &mut Vec<u8>) {
        // pad counts, ISO marker, OAEP delimiter
        const INTERESTING: &[u8] = &[0x00, 0x01, 0x0F, 0x10, 0x11, 0x7F, 0x80, 0xFF];
        if input.is_empty() {
            return;
        }
        let pos = self.pick(input.len());
        let val_idx = self.pick(INTERESTING.len());
        input[pos] = INTERESTING[val_idx];
    }

    fn dictionary_insert(&mut self, input: &mut Vec<u8>) {
        if self.dictionary.is_empty() {
            return;
        }
        let dict_idx = self.pick(self.dictionary.len());
        let entry = self.dictionary[dict_idx].clone();
        let pos = if input.is_empty() { 0 } else { self.pick(input.len()) };
        for (i, &byte) in entry.iter().enumerate() {
            if pos + i < input.len() {
                input[pos + i] = byte;
            } else {
                input.push(byte);
            }
        }
    }

    fn havoc(&mut self, input: &mut Vec<u8>) {
        let iterations = (self.next_u64() % 16) + 1;
        for _ in 0..iterations {
            match self.next_u64() % 7 {
                0 => self.bit_flip(input),
                1 => self.byte_flip(input),
                2 => self.byte_insert(input),
                3 => self.byte_delete(input),
                4 => self.byte_replace(input),
                5 => self.interesting_value(input),
                _ => self.block_swap(input),
            }
        }
    }

    fn random_bytes(&mut self, input: &mut Vec<u8>) {
        let count = ((self.next_u64() % 32) + 1) as usize;
        for _ in 0..count {
            let byte = (self.next_u64() & 0xFF) as u8;
            input.push(byte);
        }
    }
}

/// Corpus manager
pub struct Corpus {
    /// Input entries
    entries: Vec<CorpusEntry>,
    /// Hashes of every input ever admitted
    seen: HashSet<u64>,
    /// Maximum size
    max_size: usize,
}

/// A corpus entry
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    /// Input data
    pub data: Vec<u8>,
    /// Execution count
    pub exec_count: u64,
}

/// FNV-1a, for input dedup only.
pub fn input_hash(data: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

impl Corpus {
    /// Create new corpus
    pub fn new(max_size: usize) -> Self {
        Self { entries: Vec::new(), seen: HashSet::new(), max_size }
    }

    /// Add entry unless already present or the corpus is full
    pub fn add(&mut self, data: Vec<u8>) -> bool {
        if self.entries.len() >= self.max_size {
            return false;
        }
        if !self.seen.insert(input_hash(&data)) {
            return false;
        }
        self.entries.push(CorpusEntry { data, exec_count: 0 });
        true
    }

    /// Get entry picked by `seed`
    pub fn random_entry(&mut self, seed: u64) -> Option<&Vec<u8>> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = (seed as usize) % self.entries.len();
        self.entries[idx].exec_count += 1;
        Some(&self.entries[idx].data)
    }

    /// Get corpus size
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Counts of each (target, outcome) pair.
///
/// Stands in for edge coverage: an input that produces an outcome a target
/// has not shown before is kept in the corpus.
#[derive(Default)]
pub struct OutcomeTracker {
    counts: HashMap<String, u64>,
}

impl OutcomeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome. Returns true the first time it is seen.
    pub fn record(&mut self, target: &str, result: &FuzzResult) -> bool {
        let mut key = String::from(target);
        key.push(':');
        key.push_str(result.label());
        let count = self.counts.entry(key).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Number of distinct outcomes
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Times `target` produced `label`
    pub fn count(&self, target: &str, label: &str) -> u64 {
        let mut key = String::from(target);
        key.push(':');
        key.push_str(label);
        self.counts.get(&key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_mutator_deterministic() {
        let mut a = Mutator::new(7);
        let mut b = Mutator::new(7);
        let mut x = vec![1u8; 40];
        let mut y = x.clone();
        for _ in 0..200 {
            a.mutate(&mut x);
            b.mutate(&mut y);
        }
        assert_eq!(x, y);
    }

    #[test]
    fn test_block_align() {
        let mut m = Mutator::new(1);
        let mut input = vec![0u8; 21];
        m.block_align(&mut input);
        assert_eq!(input.len() % BLOCK, 0);
    }

    #[test]
    fn test_block_swap() {
        let mut m = Mutator::new(3);
        let mut input: Vec<u8> = (0..64u8).collect();
        for _ in 0..8 {
            m.block_swap(&mut input);
        }
        let mut sorted = input.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..64u8).collect::<Vec<_>>());
        for block in input.chunks(BLOCK) {
            assert_eq!(block[0] % 16, 0);
        }
    }

    #[test]
    fn test_corpus_dedup_and_cap() {
        let mut corpus = Corpus::new(2);
        assert!(corpus.add(vec![1, 2, 3]));
        assert!(!corpus.add(vec![1, 2, 3]));
        assert!(corpus.add(vec![4]));
        assert!(!corpus.add(vec![5]));
        assert_eq!(corpus.len(), 2);
        assert!(corpus.random_entry(9).is_some());
    }

    #[test]
    fn test_outcome_tracker() {
        let mut tracker = OutcomeTracker::new();
        let rejected = FuzzResult::Rejected(String::from("malformed padding"));
        assert!(tracker.record("pad", &rejected));
        assert!(!tracker.record("pad", &rejected));
        assert!(tracker.record("pad", &FuzzResult::Ok));
        assert!(tracker.record("oaep", &FuzzResult::Ok));
        assert_eq!(tracker.distinct(), 3);
        assert_eq!(tracker.count("pad", "malformed padding"), 2);
    }
}
