use std::time::Duration;

use rand::Rng;

use crate::params::{BenchmarkDelay, SimulationParameters};

/// Source of uniform random draws used by the simulator.
///
/// Production uses [`ThreadDice`]; tests substitute a scripted source to hit
/// exact boundary draws.
pub trait Dice: Send + Sync {
    /// Uniform float in [0, 1)
    fn unit(&self) -> f64;

    /// Uniform integer in [0, bound). `bound` is always > 0.
    fn below(&self, bound: u64) -> u64;

    /// Uniform percentage in [0, 100)
    fn percent(&self) -> f64 {
        self.unit() * 100.0
    }
}

/// Process-wide, unseeded randomness backed by the thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDice;

impl Dice for ThreadDice {
    fn unit(&self) -> f64 {
        rand::thread_rng().gen()
    }

    fn below(&self, bound: u64) -> u64 {
        rand::thread_rng().gen_range(0..bound)
    }
}

/// Result of one randomized trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimulationOutcome {
    /// Set for availability and error-rate trials. For error-rate trials
    /// `false` means the simulated error fired.
    pub succeeded: Option<bool>,
    /// Set for performance and benchmark trials
    pub induced_delay: Option<Duration>,
}

/// Draw one outcome for `params`. Exactly one draw per call, no retries.
pub fn simulate(params: &SimulationParameters, dice: &dyn Dice) -> SimulationOutcome {
    match *params {
        SimulationParameters::Availability { success_rate } => SimulationOutcome {
            succeeded: Some(dice.percent() < success_rate),
            induced_delay: None,
        },
        SimulationParameters::ErrorRate { error_rate } => SimulationOutcome {
            succeeded: Some(dice.percent() >= error_rate),
            induced_delay: None,
        },
        SimulationParameters::Performance { max_delay_ms } => SimulationOutcome {
            succeeded: None,
            induced_delay: Some(Duration::from_millis(dice.below(max_delay_ms))),
        },
        SimulationParameters::Benchmark(delay) => {
            let ms = match delay {
                BenchmarkDelay::Fixed(ms) => ms,
                BenchmarkDelay::Bounded(bound) | BenchmarkDelay::DefaultBound(bound) => dice.below(bound),
            };
            SimulationOutcome {
                succeeded: None,
                induced_delay: Some(Duration::from_millis(ms)),
            }
        }
    }
}

/// Dice that always roll the same values
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedDice {
    /// Percentage draw in [0, 100)
    pub percent: f64,
    /// Integer draw; `None` rolls the maximum `bound - 1`
    pub int: Option<u64>,
}

#[cfg(test)]
impl FixedDice {
    pub fn draw(p: f64) -> Self {
        Self { percent: p, int: Some(0) }
    }

    pub fn int(value: u64) -> Self {
        Self { percent: 0.0, int: Some(value) }
    }

    /// The highest draw both ranges allow
    pub fn max() -> Self {
        Self { percent: 100.0 - 1e-9, int: None }
    }
}

#[cfg(test)]
impl Dice for FixedDice {
    fn unit(&self) -> f64 {
        self.percent / 100.0
    }

    fn below(&self, bound: u64) -> u64 {
        self.int.map_or(bound - 1, |v| v.min(bound - 1))
    }

    // Exact, so boundary tests are free of float rounding
    fn percent(&self) -> f64 {
        self.percent
    }
}
