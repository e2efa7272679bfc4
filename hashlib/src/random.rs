//! SPRNG - entropy-pool CSPRNG seeded from a surveyed hardware noise bit
//!
//! Lifecycle, enforced by the type of the pool:
//!
//! ```text
//! EntropyPool<S, Uninitialized> --survey--> EntropyPool<S, Surveyed> --seed--> EntropyPool<S, Ready>
//! ```
//!
//! The survey reads every byte of a noisy region `samples_per_byte` times and
//! keeps the bit whose set-count sits closest to an even split. From then on
//! only that bit is sampled. Each output word first folds a fresh batch of
//! samples into the 119-byte pool, then hashes the pool with SHA-256; no two
//! outputs come from an unrefreshed pool.

use spin::Mutex;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::sha::sha256;
use crate::{Error, Result};

/// Entropy pool size in bytes.
pub const ENTROPY_POOL_SIZE: usize = 119;

// ── Noise sources ───────────────────────────────────────────

/// A byte-addressable region whose reads are perturbed by hardware noise.
pub trait NoiseSource {
    /// Number of addressable bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take one sample of the byte at `offset`. `offset < len()`.
    fn read(&mut self, offset: usize) -> u8;
}

/// Noise read straight from a memory-mapped region (floating bus, unused
/// RAM, a peripheral data latch).
pub struct MmioNoise {
    base: *const u8,
    len: usize,
}

impl MmioNoise {
    /// # Safety
    ///
    /// `base..base + len` must stay mapped and readable for the life of the
    /// value, and reading it must have no side effects on the device.
    pub const unsafe fn new(base: *const u8, len: usize) -> Self {
        Self { base, len }
    }
}

// SAFETY: the region is only read, and `new` requires it to outlive the value.
unsafe impl Send for MmioNoise {}

impl NoiseSource for MmioNoise {
    fn len(&self) -> usize {
        self.len
    }

    fn read(&mut self, offset: usize) -> u8 {
        if offset >= self.len {
            return 0;
        }
        // SAFETY: offset is in bounds and the region is readable per `new`.
        unsafe { core::ptr::read_volatile(self.base.add(offset)) }
    }
}

/// Timing jitter of a short busy loop, for hosted builds.
///
/// Each offset spins a different number of iterations, so offsets differ in
/// how much scheduler and cache noise they pick up.
#[cfg(feature = "std")]
pub struct JitterNoise {
    slots: usize,
}

#[cfg(feature = "std")]
impl JitterNoise {
    pub fn new(slots: usize) -> Self {
        Self { slots }
    }
}

#[cfg(feature = "std")]
impl NoiseSource for JitterNoise {
    fn len(&self) -> usize {
        self.slots
    }

    fn read(&mut self, offset: usize) -> u8 {
        let start = std::time::Instant::now();
        let mut x = offset as u64;
        for i in 0..(offset as u64 + 1) * 16 {
            x = core::hint::black_box(x.wrapping_mul(6364136223846793005).wrapping_add(i));
        }
        start.elapsed().as_nanos() as u8 ^ (x >> 56) as u8
    }
}

// ── Configuration ───────────────────────────────────────────

/// SPRNG tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SprngConfig {
    /// Reads per byte during the survey.
    pub samples_per_byte: u32,
    /// Largest accepted distance of a bit's set-count from `samples_per_byte / 2`.
    pub max_deviation: u32,
    /// Reads of the selected bit per refresh, packed eight to a pool byte.
    pub refresh_samples: u32,
}

impl Default for SprngConfig {
    fn default() -> Self {
        Self {
            samples_per_byte: 1024,
            max_deviation: 256,
            refresh_samples: 128,
        }
    }
}

impl SprngConfig {
    pub fn validate(&self) -> Result<()> {
        if self.samples_per_byte == 0 || self.refresh_samples == 0 {
            return Err(Error::InvalidParameter);
        }
        // a constant bit deviates by exactly half and must never pass
        if self.max_deviation >= self.samples_per_byte / 2 {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

/// The bit chosen by the survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseBit {
    /// Byte offset in the noise source.
    pub offset: usize,
    /// Bit index within that byte.
    pub bit: u8,
    /// Distance of the observed set-count from an even split.
    pub deviation: u32,
}

// ── Pool states ─────────────────────────────────────────────

/// No sampling bit selected yet.
pub struct Uninitialized;

/// Sampling bit selected, pool still empty.
pub struct Surveyed {
    selected: NoiseBit,
}

/// Seeded; output operations are available.
pub struct Ready {
    selected: NoiseBit,
    /// Pool byte the next refresh starts at.
    cursor: usize,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct PoolBytes([u8; ENTROPY_POOL_SIZE]);

/// Entropy pool over a noise source `S`, in lifecycle state `State`.
pub struct EntropyPool<S, State = Ready> {
    source: S,
    config: SprngConfig,
    pool: PoolBytes,
    state: State,
}

fn survey<S: NoiseSource + ?Sized>(source: &mut S, config: &SprngConfig) -> Option<NoiseBit> {
    let half = config.samples_per_byte / 2;
    let mut best: Option<NoiseBit> = None;
    for offset in 0..source.len() {
        let mut ones = [0u32; 8];
        for _ in 0..config.samples_per_byte {
            let sample = source.read(offset);
            for (bit, count) in ones.iter_mut().enumerate() {
                *count += u32::from((sample >> bit) & 1);
            }
        }
        for (bit, &count) in ones.iter().enumerate() {
            let deviation = count.abs_diff(half);
            if deviation > config.max_deviation {
                continue;
            }
            // strict: ties keep the lowest offset and bit
            if best.map_or(true, |b| deviation < b.deviation) {
                best = Some(NoiseBit { offset, bit: bit as u8, deviation });
            }
        }
    }
    best
}

impl<S: NoiseSource> EntropyPool<S, Uninitialized> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            config: SprngConfig::default(),
            pool: PoolBytes([0; ENTROPY_POOL_SIZE]),
            state: Uninitialized,
        }
    }

    pub fn with_config(source: S, config: SprngConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, ..Self::new(source) })
    }

    /// Select the most balanced bit of the noise source.
    ///
    /// On failure the pool comes back unchanged so the survey can be retried.
    pub fn survey(mut self) -> core::result::Result<EntropyPool<S, Surveyed>, Self> {
        match survey(&mut self.source, &self.config) {
            Some(selected) => {
                log::debug!(
                    "[hashlib SPRNG] selected offset {} bit {} (deviation {}/{})",
                    selected.offset,
                    selected.bit,
                    selected.deviation,
                    self.config.samples_per_byte
                );
                Ok(EntropyPool {
                    source: self.source,
                    config: self.config,
                    pool: self.pool,
                    state: Surveyed { selected },
                })
            }
            None => {
                log::warn!(
                    "[hashlib SPRNG] survey failed: no bit within {} of an even split over {} bytes",
                    self.config.max_deviation,
                    self.source.len()
                );
                Err(self)
            }
        }
    }

    /// Survey and seed in one step.
    pub fn init(self) -> core::result::Result<EntropyPool<S, Ready>, Self> {
        self.survey().map(|surveyed| surveyed.seed())
    }

    /// [`init`](Self::init), retried up to `attempts` times.
    pub fn init_with_retries(mut self, attempts: usize) -> core::result::Result<EntropyPool<S, Ready>, Self> {
        for _ in 0..attempts {
            match self.init() {
                Ok(ready) => return Ok(ready),
                Err(pool) => self = pool,
            }
        }
        Err(self)
    }

    /// [`init_with_retries`](Self::init_with_retries), dropping the source on failure.
    pub fn try_init(self, attempts: usize) -> Result<EntropyPool<S, Ready>> {
        self.init_with_retries(attempts).map_err(|_| Error::SurveyFailed)
    }

    /// Give back the noise source.
    pub fn into_source(self) -> S {
        self.source
    }
}

impl<S: NoiseSource> EntropyPool<S, Surveyed> {
    pub fn selected(&self) -> NoiseBit {
        self.state.selected
    }

    /// Fill the empty pool from the selected bit.
    pub fn seed(self) -> EntropyPool<S, Ready> {
        let mut ready = EntropyPool {
            source: self.source,
            config: self.config,
            pool: self.pool,
            state: Ready { selected: self.state.selected, cursor: 0 },
        };
        ready.fill_pool();
        ready
    }
}

impl<S: NoiseSource> EntropyPool<S, Ready> {
    pub fn selected(&self) -> NoiseBit {
        self.state.selected
    }

    /// Fold `refresh_samples` fresh reads of the selected bit into the pool.
    ///
    /// Bits are packed eight to a byte and XORed in at a position that
    /// advances with every refresh.
    pub fn add_entropy(&mut self) {
        let NoiseBit { offset, bit, .. } = self.state.selected;
        let mut acc = 0u8;
        for i in 0..self.config.refresh_samples {
            acc |= ((self.source.read(offset) >> bit) & 1) << (i % 8);
            if i % 8 == 7 {
                self.fold(acc);
                acc = 0;
            }
        }
        if self.config.refresh_samples % 8 != 0 {
            self.fold(acc);
        }
    }

    fn fold(&mut self, byte: u8) {
        let at = self.state.cursor;
        self.pool.0[at] ^= byte;
        self.state.cursor = (at + 1) % ENTROPY_POOL_SIZE;
    }

    /// Refresh until every pool byte has taken fresh bits.
    fn fill_pool(&mut self) {
        let per_refresh = (self.config.refresh_samples as usize).div_ceil(8);
        for _ in 0..ENTROPY_POOL_SIZE.div_ceil(per_refresh) {
            self.add_entropy();
        }
    }

    /// Refresh the pool, then derive a word from its SHA-256 digest.
    pub fn random_u32(&mut self) -> u32 {
        self.add_entropy();
        let digest = Zeroizing::new(sha256(&self.pool.0));
        let mut word = Zeroizing::new([0u8; 4]);
        word.copy_from_slice(&self.pool.0[..4]);
        for chunk in digest.chunks_exact(4) {
            for (w, d) in word.iter_mut().zip(chunk.iter()) {
                *w ^= d;
            }
        }
        u32::from_le_bytes(*word)
    }

    /// Fill `dest` with random bytes, one fresh word per 4 bytes.
    pub fn random_bytes(&mut self, dest: &mut [u8]) -> Result<()> {
        if dest.is_empty() {
            return Err(Error::EmptyBuffer);
        }
        for chunk in dest.chunks_mut(4) {
            let word = Zeroizing::new(self.random_u32().to_le_bytes());
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
        log::trace!("[hashlib SPRNG] {} random bytes", dest.len());
        Ok(())
    }

    /// Zero the pool and reseed it.
    ///
    /// Call after anything may have overwritten pool memory and before the
    /// next output is drawn.
    pub fn repair_state(&mut self) {
        self.pool.zeroize();
        self.state.cursor = 0;
        self.fill_pool();
        log::debug!("[hashlib SPRNG] pool repaired");
    }
}

// ── Consumers ───────────────────────────────────────────────

/// Anything that can fill a buffer with cryptographically strong bytes.
pub trait RandomSource {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<()>;
}

impl<S: NoiseSource> RandomSource for EntropyPool<S, Ready> {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<()> {
        self.random_bytes(dest)
    }
}

impl<T: RandomSource + ?Sized> RandomSource for &mut T {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<()> {
        (**self).fill_bytes(dest)
    }
}

/// A ready pool behind a spinlock, for use from more than one logical flow.
///
/// ```ignore
/// static SPRNG: SharedSprng<MmioNoise> = SharedSprng::new();
/// ```
pub struct SharedSprng<S> {
    pool: Mutex<Option<EntropyPool<S, Ready>>>,
}

impl<S: NoiseSource> Default for SharedSprng<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: NoiseSource> SharedSprng<S> {
    pub const fn new() -> Self {
        Self { pool: Mutex::new(None) }
    }

    /// Install a seeded pool, returning the one it replaces.
    pub fn install(&self, pool: EntropyPool<S, Ready>) -> Option<EntropyPool<S, Ready>> {
        self.pool.lock().replace(pool)
    }

    /// Survey `source`, seed a pool from it and install it.
    ///
    /// The survey runs before the lock is taken.
    pub fn init(&self, source: S, attempts: usize) -> Result<()> {
        let pool = EntropyPool::new(source).try_init(attempts)?;
        self.install(pool);
        Ok(())
    }

    /// Remove the pool.
    pub fn take(&self) -> Option<EntropyPool<S, Ready>> {
        self.pool.lock().take()
    }

    pub fn is_ready(&self) -> bool {
        self.pool.lock().is_some()
    }

    pub fn random_u32(&self) -> Result<u32> {
        let mut guard = self.pool.lock();
        let pool = guard.as_mut().ok_or(Error::EntropyUnavailable)?;
        Ok(pool.random_u32())
    }

    pub fn random_bytes(&self, dest: &mut [u8]) -> Result<()> {
        let mut guard = self.pool.lock();
        guard.as_mut().ok_or(Error::EntropyUnavailable)?.random_bytes(dest)
    }

    pub fn add_entropy(&self) -> Result<()> {
        let mut guard = self.pool.lock();
        guard.as_mut().ok_or(Error::EntropyUnavailable)?.add_entropy();
        Ok(())
    }

    pub fn repair_state(&self) -> Result<()> {
        let mut guard = self.pool.lock();
        guard.as_mut().ok_or(Error::EntropyUnavailable)?.repair_state();
        Ok(())
    }
}

impl<S: NoiseSource> RandomSource for SharedSprng<S> {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<()> {
        self.random_bytes(dest)
    }
}

impl<S: NoiseSource> RandomSource for &SharedSprng<S> {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<()> {
        (**self).random_bytes(dest)
    }
}
