// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Bounded random scalars used to keep repeated keystrokes from sounding identical.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Maximum relative pitch deviation per trigger (±5%).
pub const PITCH_VARIATION_RANGE: f32 = 0.05;

/// Supplies independent random draws. Implementations hold no state beyond their range
/// (and, for seeded generators, the generator itself).
pub trait Randomizer: Send + Sync {
    /// A playback-rate ratio drawn uniformly from `[1 - range, 1 + range]`.
    fn pitch_variation(&self) -> f32;

    /// An index drawn uniformly from `[0, count)`, or 0 when `count` is 0.
    fn sample_index(&self, count: usize) -> usize;
}

/// Draws from the thread-local generator.
#[derive(Debug, Clone, Copy)]
pub struct ThreadRandomizer {
    range: f32,
}

impl ThreadRandomizer {
    pub fn new(range: f32) -> ThreadRandomizer {
        ThreadRandomizer { range: range.abs() }
    }
}

impl Default for ThreadRandomizer {
    fn default() -> Self {
        ThreadRandomizer::new(PITCH_VARIATION_RANGE)
    }
}

impl Randomizer for ThreadRandomizer {
    fn pitch_variation(&self) -> f32 {
        1.0 + rand::thread_rng().gen_range(-self.range..=self.range)
    }

    fn sample_index(&self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..count)
    }
}

/// A reproducible generator for tests and offline rendering.
pub struct SeededRandomizer {
    range: f32,
    rng: Mutex<StdRng>,
}

impl SeededRandomizer {
    pub fn new(seed: u64) -> SeededRandomizer {
        SeededRandomizer {
            range: PITCH_VARIATION_RANGE,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Randomizer for SeededRandomizer {
    fn pitch_variation(&self) -> f32 {
        1.0 + self.rng.lock().gen_range(-self.range..=self.range)
    }

    fn sample_index(&self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        self.rng.lock().gen_range(0..count)
    }
}

/// Converts a playback-rate ratio to cents.
///
/// This is the linear approximation used for the pitch control: a ±5% ratio maps to ±60
/// cents.
pub fn ratio_to_cents(ratio: f32) -> f32 {
    (ratio - 1.0) * 1200.0
}

/// Converts cents back to a playback-rate factor.
pub fn cents_to_rate(cents: f32) -> f64 {
    2f64.powf(f64::from(cents) / 1200.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_pitch_distribution(randomizer: &dyn Randomizer) {
        let draws = 10_000;
        let mut sum = 0.0f64;
        for _ in 0..draws {
            let ratio = randomizer.pitch_variation();
            assert!((0.95..=1.05).contains(&ratio), "ratio {} out of range", ratio);
            sum += f64::from(ratio);
        }
        let mean = sum / draws as f64;
        assert!((mean - 1.0).abs() < 0.005, "mean {} too far from 1.0", mean);
    }

    #[test]
    fn test_pitch_variation_thread() {
        check_pitch_distribution(&ThreadRandomizer::default());
    }

    #[test]
    fn test_pitch_variation_seeded() {
        check_pitch_distribution(&SeededRandomizer::new(7));
    }

    #[test]
    fn test_sample_index() {
        let randomizer = ThreadRandomizer::default();
        assert_eq!(randomizer.sample_index(0), 0);
        assert_eq!(randomizer.sample_index(1), 0);

        let mut seen = [false; 4];
        for _ in 0..1000 {
            let index = randomizer.sample_index(4);
            assert!(index < 4);
            seen[index] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let a = SeededRandomizer::new(42);
        let b = SeededRandomizer::new(42);
        for _ in 0..100 {
            assert_eq!(a.pitch_variation(), b.pitch_variation());
        }
    }

    #[test]
    fn test_cents_conversion() {
        assert_eq!(ratio_to_cents(1.0), 0.0);
        assert!((ratio_to_cents(1.05) - 60.0).abs() < 1e-3);
        assert!((ratio_to_cents(0.95) + 60.0).abs() < 1e-3);
        assert_eq!(cents_to_rate(0.0), 1.0);
        assert!((cents_to_rate(1200.0) - 2.0).abs() < 1e-12);
    }
}
