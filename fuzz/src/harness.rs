//! Fuzzing Harness
//!
//! Main fuzzing harness and orchestration.

use crate::{
    input_hash, Corpus, CrashInfo, CrashType, FuzzResult, FuzzStats, FuzzTarget, FuzzerConfig,
    Mutator, OutcomeTracker,
};
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// Main fuzzer harness
pub struct FuzzHarness {
    /// Configuration
    config: FuzzerConfig,
    /// Fuzz targets
    targets: Vec<Box<dyn FuzzTarget>>,
    /// Mutator
    mutator: Mutator,
    /// Corpus
    corpus: Corpus,
    /// Outcome tracker
    outcomes: OutcomeTracker,
    /// Statistics
    stats: FuzzStats,
    /// Found crashes
    crashes: Vec<CrashEntry>,
}

/// A crash entry
#[derive(Debug, Clone)]
pub struct CrashEntry {
    /// Input that caused crash
    pub input: Vec<u8>,
    /// Smallest input found that breaks the same invariant
    pub minimized: Vec<u8>,
    /// Crash info
    pub info: CrashInfo,
    /// Target name
    pub target: String,
    /// Hash for deduplication
    pub hash: u64,
}

impl FuzzHarness {
    /// Create new harness
    pub fn new(config: FuzzerConfig) -> Self {
        Self {
            mutator: Mutator::new(config.seed),
            corpus: Corpus::new(config.max_corpus),
            config,
            targets: Vec::new(),
            outcomes: OutcomeTracker::new(),
            stats: FuzzStats::default(),
            crashes: Vec::new(),
        }
    }

    /// Add fuzz target
    pub fn add_target(&mut self, target: Box<dyn FuzzTarget>) {
        self.targets.push(target);
    }

    /// Add corpus entry
    pub fn add_corpus(&mut self, data: Vec<u8>) {
        self.corpus.add(data);
        self.stats.corpus_size = self.corpus.len();
    }

    /// Add dictionary entries
    pub fn add_dictionary(&mut self, entries: Vec<Vec<u8>>) {
        for entry in entries {
            self.mutator.add_dictionary(entry);
        }
    }

    /// Run fuzzing loop, capped by `max_iterations`
    pub fn run(&mut self, iterations: u64) -> FuzzReport {
        for _ in 0..iterations.min(self.config.max_iterations) {
            self.fuzz_iteration();
        }

        FuzzReport {
            stats: self.stats.clone(),
            crashes: self.crashes.clone(),
            corpus_size: self.corpus.len(),
        }
    }

    /// Run single fuzzing iteration
    fn fuzz_iteration(&mut self) {
        self.stats.iterations += 1;

        // Get base input from corpus or generate new
        let pick = self.mutator.next_u64();
        let mut input = self.corpus.random_entry(pick).cloned().unwrap_or_default();
        self.mutator.mutate(&mut input);
        input.truncate(self.config.max_input_size);

        let mut crash_info: Vec<(CrashInfo, usize)> = Vec::new();
        let mut any_rejected = false;
        let mut novel = false;

        for (idx, target) in self.targets.iter_mut().enumerate() {
            let result = target.fuzz(&input);
            novel |= self.outcomes.record(target.name(), &result);

            match result {
                FuzzResult::Crash(info) => crash_info.push((info, idx)),
                FuzzResult::Rejected(_) => any_rejected = true,
                FuzzResult::Ok => {}
            }

            target.reset();
        }

        for (info, idx) in crash_info {
            self.handle_crash(&input, info, idx);
        }
        if any_rejected {
            self.stats.rejected += 1;
        } else {
            self.stats.accepted += 1;
        }
        if novel && self.corpus.add(input) {
            self.stats.corpus_size = self.corpus.len();
        }
        self.stats.outcomes = self.outcomes.distinct();
    }

    fn handle_crash(&mut self, input: &[u8], info: CrashInfo, idx: usize) {
        let target = String::from(self.targets[idx].name());
        let hash = Self::hash_crash(&info, &target);
        let is_unique = !self.crashes.iter().any(|c| c.hash == hash);

        self.stats.crashes += 1;

        if is_unique {
            self.stats.unique_crashes += 1;
            let minimized =
                CrashMinimizer::new(self.targets[idx].as_mut()).minimize(input, info.crash_type);
            log::warn!(
                "[hashlib fuzz] {:?} in {}: {} byte input, {} after minimizing",
                info.crash_type,
                target,
                input.len(),
                minimized.len()
            );
            self.crashes.push(CrashEntry {
                input: input.to_vec(),
                minimized,
                info,
                target,
                hash,
            });
        }
    }

    /// Same target, type and detail count as one crash.
    fn hash_crash(info: &CrashInfo, target: &str) -> u64 {
        let mut key = Vec::with_capacity(target.len() + info.detail.len() + 1);
        key.extend_from_slice(target.as_bytes());
        key.push(info.crash_type as u8);
        key.extend_from_slice(info.detail.as_bytes());
        input_hash(&key)
    }

    /// Get current statistics
    pub fn stats(&self) -> &FuzzStats {
        &self.stats
    }

    /// Get found crashes
    pub fn crashes(&self) -> &[CrashEntry] {
        &self.crashes
    }

    /// Get outcome counts
    pub fn outcomes(&self) -> &OutcomeTracker {
        &self.outcomes
    }

    /// Get corpus size
    pub fn corpus_size(&self) -> usize {
        self.corpus.len()
    }
}

/// Fuzzing report
#[derive(Debug, Clone)]
pub struct FuzzReport {
    /// Statistics
    pub stats: FuzzStats,
    /// Crashes found
    pub crashes: Vec<CrashEntry>,
    /// Final corpus size
    pub corpus_size: usize,
}

impl FuzzReport {
    /// Format as text
    pub fn format(&self) -> String {
        let mut output = String::new();

        output.push_str("=== Fuzzing Report ===\n\n");

        output.push_str("Statistics:\n");
        output.push_str(&format!("  Iterations: {}\n", self.stats.iterations));
        output.push_str(&format!(
            "  Accepted: {}  Rejected: {}\n",
            self.stats.accepted, self.stats.rejected
        ));
        output.push_str(&format!(
            "  Crashes: {} ({} unique)\n",
            self.stats.crashes, self.stats.unique_crashes
        ));
        output.push_str(&format!("  Corpus: {}\n", self.corpus_size));
        output.push_str(&format!("  Outcomes: {}\n", self.stats.outcomes));

        if !self.crashes.is_empty() {
            output.push_str("\nCrashes:\n");
            for crash in &self.crashes {
                output.push_str(&format!(
                    "  - {:?} in {}: {} ({} byte input, minimized to {})\n",
                    crash.info.crash_type,
                    crash.target,
                    crash.info.detail,
                    crash.input.len(),
                    crash.minimized.len()
                ));
            }
        }

        output
    }
}

/// Block size the minimizer drops runs of first
const BLOCK: usize = 16;

/// Shrinks a crashing input while it keeps breaking the same invariant.
///
/// Whole blocks go first, since every decoder under test works in blocks,
/// then single bytes; surviving bytes are cleared to zero where possible.
pub struct CrashMinimizer<'a> {
    target: &'a mut dyn FuzzTarget,
    /// Target executions left
    budget: usize,
}

impl<'a> CrashMinimizer<'a> {
    pub fn new(target: &'a mut dyn FuzzTarget) -> Self {
        Self { target, budget: 4096 }
    }

    /// Cap the number of target executions.
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// Minimize `input`, which must crash the target with `crash_type`.
    pub fn minimize(&mut self, input: &[u8], crash_type: CrashType) -> Vec<u8> {
        let mut current = input.to_vec();
        loop {
            let mut shrunk = self.drop_runs(&mut current, BLOCK, crash_type);
            shrunk |= self.drop_runs(&mut current, 1, crash_type);
            shrunk |= self.clear_bytes(&mut current, crash_type);
            if !shrunk || self.budget == 0 {
                self.target.reset();
                return current;
            }
        }
    }

    /// Remove `width`-byte runs, walking back from the end.
    fn drop_runs(&mut self, current: &mut Vec<u8>, width: usize, crash_type: CrashType) -> bool {
        let mut changed = false;
        let mut end = current.len();
        while end > 0 && self.budget > 0 {
            let start = end.saturating_sub(width);
            let mut candidate = current.clone();
            candidate.drain(start..end);
            if self.reproduces(&candidate, crash_type) {
                *current = candidate;
                changed = true;
            }
            end = start;
        }
        changed
    }

    fn clear_bytes(&mut self, current: &mut [u8], crash_type: CrashType) -> bool {
        let mut changed = false;
        for i in 0..current.len() {
            let byte = current[i];
            if byte == 0 {
                continue;
            }
            current[i] = 0;
            if self.reproduces(current, crash_type) {
                changed = true;
            } else {
                current[i] = byte;
            }
        }
        changed
    }

    fn reproduces(&mut self, input: &[u8], crash_type: CrashType) -> bool {
        if self.budget == 0 {
            return false;
        }
        self.budget -= 1;
        self.target.reset();
        matches!(self.target.fuzz(input), FuzzResult::Crash(info) if info.crash_type == crash_type)
    }
}

/// Run a quick fuzz test; returns true if any input crashed the target
pub fn quick_fuzz<T: FuzzTarget>(mut target: T, corpus: Vec<Vec<u8>>, iterations: u64) -> bool {
    let mut mutator = Mutator::new(42);
    let mut current_corpus = corpus;

    for _ in 0..iterations {
        let mut input = if current_corpus.is_empty() {
            Vec::new()
        } else {
            let idx = mutator.next_u64() as usize % current_corpus.len();
            current_corpus[idx].clone()
        };

        mutator.mutate(&mut input);

        let result = target.fuzz(&input);
        target.reset();

        if result.is_crash() {
            log::warn!("[hashlib fuzz] {} crashed on {} byte input", target.name(), input.len());
            return true;
        }
        if result == FuzzResult::Ok && current_corpus.len() < 256 {
            current_corpus.push(input);
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::{
        AuthDecryptFuzzer, MacVerifyFuzzer, OaepStripFuzzer, PaddingStripFuzzer, RoundTripFuzzer,
    };
    use alloc::vec;

    /// Crashes whenever the input contains 0x42.
    struct Tripwire;

    impl FuzzTarget for Tripwire {
        fn name(&self) -> &str {
            "tripwire"
        }

        fn fuzz(&mut self, input: &[u8]) -> FuzzResult {
            if input.contains(&0x42) {
                FuzzResult::Crash(CrashInfo::new(CrashType::ForgeryAccepted, "0x42"))
            } else {
                FuzzResult::Rejected(String::from("no 0x42"))
            }
        }

        fn reset(&mut self) {}
    }

    fn full_harness() -> FuzzHarness {
        let mut harness = FuzzHarness::new(FuzzerConfig::default());
        harness.add_target(Box::new(OaepStripFuzzer));
        harness.add_target(Box::new(PaddingStripFuzzer));
        harness.add_target(Box::new(MacVerifyFuzzer::new().unwrap()));
        harness.add_target(Box::new(RoundTripFuzzer::new().unwrap()));
        let auth = AuthDecryptFuzzer::new().unwrap();
        harness.add_corpus(auth.genuine().to_vec());
        harness.add_target(Box::new(auth));
        harness.add_dictionary(vec![vec![0x80, 0, 0, 0], vec![0x10; 16], vec![0x01, 0x00]]);
        harness
    }

    #[test]
    fn test_harness_finds_no_crash() {
        let mut harness = full_harness();
        let report = harness.run(400);
        assert_eq!(report.stats.iterations, 400);
        assert_eq!(report.stats.crashes, 0, "{}", report.format());
        assert!(report.stats.outcomes > 5);
        assert_eq!(report.stats.accepted + report.stats.rejected, 400);
        assert!(harness.outcomes().count("verify_mac", "crash") == 0);
    }

    #[test]
    fn test_harness_records_and_dedups_crashes() {
        let mut harness = FuzzHarness::new(FuzzerConfig::default());
        harness.add_target(Box::new(Tripwire));
        harness.add_corpus(vec![0x42, 0x00]);
        let report = harness.run(50);
        assert!(report.stats.crashes > 0);
        assert_eq!(report.stats.unique_crashes, 1);
        assert_eq!(harness.crashes().len(), 1);
        assert_eq!(harness.crashes()[0].minimized, vec![0x42]);
        assert!(report.format().contains("tripwire"));
        assert!(report.format().contains("minimized to 1"));
    }

    #[test]
    fn test_iterations_capped_by_config() {
        let config = FuzzerConfig { max_iterations: 10, ..FuzzerConfig::default() };
        let mut harness = FuzzHarness::new(config);
        harness.add_target(Box::new(PaddingStripFuzzer));
        assert_eq!(harness.run(1000).stats.iterations, 10);
    }

    #[test]
    fn test_minimizer_shrinks_to_trigger() {
        let mut target = Tripwire;
        let input: Vec<u8> = [7u8; 40].into_iter().chain([0x42]).chain([9u8; 40]).collect();
        let minimized =
            CrashMinimizer::new(&mut target).minimize(&input, CrashType::ForgeryAccepted);
        assert_eq!(minimized, vec![0x42]);
    }

    #[test]
    fn test_minimizer_keeps_crash_type() {
        // wrong type never reproduces, so nothing is removed
        let mut target = Tripwire;
        let input = vec![1, 0x42, 2];
        let minimized =
            CrashMinimizer::new(&mut target).minimize(&input, CrashType::BoundsViolation);
        assert_eq!(minimized, input);
    }

    #[test]
    fn test_minimizer_respects_budget() {
        let mut target = Tripwire;
        let input = vec![0x42; 64];
        let minimized = CrashMinimizer::new(&mut target)
            .with_budget(1)
            .minimize(&input, CrashType::ForgeryAccepted);
        // one execution drops one block
        assert_eq!(minimized.len(), 48);
    }

    #[test]
    fn test_quick_fuzz_reports_crash() {
        assert!(quick_fuzz(Tripwire, vec![vec![0x41; 8]], 2000));
    }
}
