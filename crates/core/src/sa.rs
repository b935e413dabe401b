//! Simulated Annealing framework for incremental, cost-minimizing searches.
//!
//! Problems expose a mutable state and a move type. A move is proposed from the
//! current state, applied tentatively (returning the cost delta), and either kept
//! or reverted. The runner owns no random source of its own: callers pass a
//! seeded RNG so that the sequence of accept/reject decisions is reproducible.

use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cooling schedule types for Simulated Annealing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CoolingSchedule {
    /// Geometric cooling: T_new = T * alpha (alpha typically 0.95-0.99).
    #[default]
    Geometric,
    /// Linear cooling: T_new = T - delta, reaching `final_temp` at the iteration budget.
    Linear,
    /// Adaptive cooling: adjusts based on acceptance rate.
    Adaptive,
    /// Lundy-Mees: T_new = T / (1 + beta * T).
    LundyMees,
}

/// Configuration for Simulated Annealing.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SaConfig {
    /// Initial temperature.
    pub initial_temp: f64,
    /// Final (minimum) temperature.
    pub final_temp: f64,
    /// Cooling rate (alpha for Geometric, beta for LundyMees).
    pub cooling_rate: f64,
    /// Number of proposals at each temperature level (one outer iteration).
    pub iterations_per_temp: usize,
    /// Maximum total proposals.
    pub max_iterations: u64,
    /// Cooling schedule type.
    pub cooling_schedule: CoolingSchedule,
    /// Maximum wall-clock time (None = unlimited).
    pub time_limit: Option<Duration>,
    /// Stop as soon as the current cost is at or below this value.
    pub target_cost: Option<f64>,
    /// Enable reheating when stagnation detected.
    pub enable_reheating: bool,
    /// Consecutive non-improving proposals before reheating.
    pub reheat_threshold: u64,
    /// Reheat factor (multiplier for current temperature).
    pub reheat_factor: f64,
}

impl Default for SaConfig {
    fn default() -> Self {
        Self {
            initial_temp: 4.0,
            final_temp: 0.01,
            cooling_rate: 0.95,
            iterations_per_temp: 200,
            max_iterations: 200_000,
            cooling_schedule: CoolingSchedule::Geometric,
            time_limit: None,
            target_cost: None,
            enable_reheating: false,
            reheat_threshold: 5_000,
            reheat_factor: 2.0,
        }
    }
}

impl SaConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial temperature.
    pub fn with_initial_temp(mut self, temp: f64) -> Self {
        self.initial_temp = temp.max(0.001);
        self
    }

    /// Sets the final temperature.
    pub fn with_final_temp(mut self, temp: f64) -> Self {
        self.final_temp = temp.max(0.0001);
        self
    }

    /// Sets the cooling rate.
    pub fn with_cooling_rate(mut self, rate: f64) -> Self {
        self.cooling_rate = rate.clamp(0.001, 0.9999);
        self
    }

    /// Sets the proposals per temperature level.
    pub fn with_iterations_per_temp(mut self, iterations: usize) -> Self {
        self.iterations_per_temp = iterations.max(1);
        self
    }

    /// Sets the total proposal budget.
    pub fn with_max_iterations(mut self, iterations: u64) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Sets the cooling schedule.
    pub fn with_cooling_schedule(mut self, schedule: CoolingSchedule) -> Self {
        self.cooling_schedule = schedule;
        self
    }

    /// Sets the time limit.
    pub fn with_time_limit(mut self, duration: Duration) -> Self {
        self.time_limit = Some(duration);
        self
    }

    /// Sets the convergence threshold on the absolute cost.
    pub fn with_target_cost(mut self, cost: f64) -> Self {
        self.target_cost = Some(cost);
        self
    }

    /// Enables reheating.
    pub fn with_reheating(mut self, threshold: u64, factor: f64) -> Self {
        self.enable_reheating = true;
        self.reheat_threshold = threshold.max(1);
        self.reheat_factor = factor.max(1.1);
        self
    }

    /// Validates the schedule parameters.
    pub fn validate(&self) -> crate::Result<()> {
        if !(self.initial_temp.is_finite() && self.initial_temp > 0.0) {
            return Err(crate::Error::ConfigError(
                "initial temperature must be positive".into(),
            ));
        }
        if !(self.final_temp > 0.0 && self.final_temp <= self.initial_temp) {
            return Err(crate::Error::ConfigError(format!(
                "final temperature {} must be in (0, {}]",
                self.final_temp, self.initial_temp
            )));
        }
        if self.iterations_per_temp == 0 {
            return Err(crate::Error::ConfigError(
                "iterations per temperature must be at least 1".into(),
            ));
        }
        match self.cooling_schedule {
            CoolingSchedule::Geometric | CoolingSchedule::Adaptive
                if !(self.cooling_rate > 0.0 && self.cooling_rate < 1.0) =>
            {
                Err(crate::Error::ConfigError(format!(
                    "cooling rate {} must be in (0, 1)",
                    self.cooling_rate
                )))
            }
            CoolingSchedule::LundyMees if self.cooling_rate <= 0.0 => Err(
                crate::Error::ConfigError("Lundy-Mees beta must be positive".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// Problem-specific operations for an incremental annealing search.
pub trait SaProblem {
    /// Mutable search state.
    type State;
    /// A proposed change to the state. `apply` may stash undo data in it.
    type Move;

    /// Full cost of a state. Lower is better; must be non-negative.
    fn cost(&self, state: &Self::State) -> f64;

    /// Proposes a move from the current state, or `None` if the drawn proposal
    /// violates a hard constraint (counted as a rejection).
    fn propose<R: Rng>(&self, state: &Self::State, rng: &mut R) -> Option<Self::Move>;

    /// Applies a move and returns the resulting cost delta.
    fn apply(&self, state: &mut Self::State, mv: &mut Self::Move) -> f64;

    /// Undoes a move previously applied with [`SaProblem::apply`].
    fn revert(&self, state: &mut Self::State, mv: &mut Self::Move);

    /// Called after each temperature level (for progress reporting).
    fn on_temperature_change(&self, _temperature: f64, _iteration: u64, _cost: f64) {}
}

/// Result of an annealing run.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SaResult {
    /// Cost of the state the run started from.
    pub initial_cost: f64,
    /// Cost of the state the run finished with.
    pub final_cost: f64,
    /// Lowest cost visited.
    pub best_cost: f64,
    /// Final temperature reached.
    pub final_temperature: f64,
    /// Total proposals drawn.
    pub iterations: u64,
    /// Proposals accepted.
    pub accepted: u64,
    /// Proposals rejected (including infeasible ones).
    pub rejected: u64,
    /// Total elapsed time.
    pub elapsed: Duration,
    /// Whether the cost dropped to the target.
    pub converged: bool,
    /// Whether the run stopped on the cancel handle.
    pub cancelled: bool,
    /// Whether the run stopped on the time limit.
    pub timed_out: bool,
    /// Number of reheats performed.
    pub reheat_count: u32,
    /// Current cost sampled at every temperature change.
    pub history: Vec<f64>,
}

impl SaResult {
    /// Fraction of proposals that were accepted.
    pub fn acceptance_rate(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            self.accepted as f64 / self.iterations as f64
        }
    }
}

/// Simulated Annealing runner.
pub struct SaRunner<P: SaProblem> {
    config: SaConfig,
    problem: P,
    cancelled: Arc<AtomicBool>,
}

impl<P: SaProblem> SaRunner<P> {
    /// Creates a new SA runner.
    pub fn new(config: SaConfig, problem: P) -> Self {
        Self {
            config,
            problem,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares an external cancellation flag with the runner.
    pub fn with_cancel_handle(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Returns a handle to cancel the run.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Returns the problem definition.
    pub fn problem(&self) -> &P {
        &self.problem
    }

    /// Consumes the runner, returning the problem definition.
    pub fn into_problem(self) -> P {
        self.problem
    }

    /// Anneals `state` in place.
    ///
    /// Stop conditions are checked once per temperature level: cancel flag, time
    /// limit, iteration budget, target cost and the final temperature. The state
    /// is valid whenever the run returns; an early stop only leaves it less
    /// optimized.
    pub fn run<R: Rng>(&self, state: &mut P::State, rng: &mut R) -> SaResult {
        let start = Instant::now();
        let config = &self.config;

        let initial_cost = self.problem.cost(state);
        let mut current_cost = initial_cost;
        let mut best_cost = initial_cost;

        let mut result = SaResult {
            initial_cost,
            ..SaResult::default()
        };

        let mut temperature = config.initial_temp;
        let mut stagnation = 0u64;

        let levels = (config.max_iterations as f64 / config.iterations_per_temp as f64).max(1.0);
        let linear_delta = (config.initial_temp - config.final_temp) / levels;

        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                result.cancelled = true;
                break;
            }
            if let Some(limit) = config.time_limit {
                if start.elapsed() > limit {
                    result.timed_out = true;
                    break;
                }
            }
            if let Some(target) = config.target_cost {
                if current_cost <= target {
                    result.converged = true;
                    break;
                }
            }
            if result.iterations >= config.max_iterations || temperature < config.final_temp {
                break;
            }

            let mut level_accepted = 0usize;
            let mut level_total = 0usize;

            for _ in 0..config.iterations_per_temp {
                if result.iterations >= config.max_iterations {
                    break;
                }
                result.iterations += 1;
                level_total += 1;

                let Some(mut mv) = self.problem.propose(state, rng) else {
                    result.rejected += 1;
                    stagnation += 1;
                    continue;
                };

                let delta = self.problem.apply(state, &mut mv);
                let accept = if delta <= 0.0 {
                    true
                } else {
                    rng.gen::<f64>() < (-delta / temperature).exp()
                };

                if accept {
                    result.accepted += 1;
                    level_accepted += 1;
                    current_cost += delta;
                    if current_cost < best_cost {
                        best_cost = current_cost;
                        stagnation = 0;
                    } else {
                        stagnation += 1;
                    }
                } else {
                    self.problem.revert(state, &mut mv);
                    result.rejected += 1;
                    stagnation += 1;
                }
            }

            result.history.push(current_cost);
            self.problem
                .on_temperature_change(temperature, result.iterations, current_cost);

            if config.enable_reheating && stagnation >= config.reheat_threshold {
                temperature = (temperature * config.reheat_factor).min(config.initial_temp);
                stagnation = 0;
                result.reheat_count += 1;
            }

            temperature = self.cool_down(temperature, linear_delta, level_accepted, level_total);
        }

        result.final_cost = current_cost;
        result.best_cost = best_cost;
        result.final_temperature = temperature;
        result.elapsed = start.elapsed();
        result
    }

    /// Apply cooling schedule.
    fn cool_down(&self, current_temp: f64, linear_delta: f64, accepted: usize, total: usize) -> f64 {
        match self.config.cooling_schedule {
            CoolingSchedule::Geometric => current_temp * self.config.cooling_rate,
            // Stepping below final_temp ends the run on the next level check.
            CoolingSchedule::Linear => current_temp - linear_delta,
            CoolingSchedule::Adaptive => {
                let acceptance_rate = if total > 0 {
                    accepted as f64 / total as f64
                } else {
                    0.5
                };

                let adjusted_rate = if acceptance_rate > 0.5 {
                    self.config.cooling_rate * 0.95
                } else if acceptance_rate < 0.1 {
                    self.config.cooling_rate.powf(0.5)
                } else {
                    self.config.cooling_rate
                };

                current_temp * adjusted_rate
            }
            CoolingSchedule::LundyMees => {
                current_temp / (1.0 + self.config.cooling_rate * current_temp)
            }
        }
    }
}
