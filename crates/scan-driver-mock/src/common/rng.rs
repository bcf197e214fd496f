//! Reproducible randomness for simulated devices.
//!
//! One generator per device drives fault decisions and sensor noise, so a
//! fixed seed replays the same run.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// ChaCha8 generator behind a lock, shareable across the device's tasks.
pub struct MockRng {
    inner: Mutex<ChaCha8Rng>,
    seeded: bool,
}

impl MockRng {
    /// Seeded generator, or OS entropy for `None`.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            inner: Mutex::new(seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64)),
            seeded: seed.is_some(),
        }
    }

    /// Whether the sequence is reproducible.
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Bernoulli trial with probability `p`; out-of-range values saturate.
    pub fn chance(&self, p: f64) -> bool {
        if p.is_nan() || p <= 0.0 {
            false
        } else if p >= 1.0 {
            true
        } else {
            self.inner.lock().gen_bool(p)
        }
    }

    /// Relative noise factor in `[-amplitude, amplitude]`; zero for a non-positive amplitude.
    pub fn jitter(&self, amplitude: f64) -> f64 {
        if amplitude.is_nan() || amplitude <= 0.0 {
            return 0.0;
        }
        self.inner.lock().gen_range(-amplitude..=amplitude)
    }
}

impl std::fmt::Debug for MockRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRng")
            .field("seeded", &self.seeded)
            .finish_non_exhaustive()
    }
}
