//! Monte Carlo estimation of a policy's utility.
//!
//! Each trial rolls the policy out from a start state until it reaches a
//! terminal state, accumulating `gamma^t * reward`. The mean over independent
//! trials estimates the expected utility and is used to cross-check the
//! analytic solvers; it is never a solver of record.
//!
//! Trials are independent and may run on the rayon thread pool. Every trial
//! draws from its own `ChaCha20Rng` seeded from the base seed and the trial
//! index, so a seeded estimate is identical whether it runs sequentially or
//! in parallel.

use log::{debug, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;

use crate::error::{MdpError, Result};
use crate::mdp::{check_distribution, Mdp, Policy};
use crate::solvers::{policy_action, validate_discount};

/// What to do with a trial that exceeds `max_steps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepLimitPolicy {
    /// Drop the trial and keep estimating from the others
    Discard,
    /// Fail the whole estimation
    Fail,
}

/// Configuration for Monte Carlo estimation.
#[derive(Debug, Clone)]
pub struct MonteCarloConfig {
    /// Number of independent rollouts
    pub trials: usize,
    /// Step bound after which a rollout is considered non-terminating
    pub max_steps: usize,
    /// Optional RNG seed for reproducible estimates
    pub seed: Option<u64>,
    pub on_step_limit: StepLimitPolicy,
    /// Run trials on the rayon thread pool
    pub parallel: bool,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            trials: 10_000,
            max_steps: 10_000,
            seed: None,
            on_step_limit: StepLimitPolicy::Discard,
            parallel: false,
        }
    }
}

/// Empirical utility estimate.
#[derive(Debug, Clone)]
pub struct MonteCarloEstimate {
    /// Mean discounted return over the kept trials
    pub mean: f64,
    /// Discounted return of every kept trial, in trial order
    pub samples: Vec<f64>,
    /// Trials dropped for exceeding the step bound
    pub discarded: usize,
}

impl MonteCarloEstimate {
    /// Standard error of the mean.
    pub fn standard_error(&self) -> f64 {
        let n = self.samples.len();
        if n < 2 {
            return 0.0;
        }
        let variance = self
            .samples
            .iter()
            .map(|x| (x - self.mean).powi(2))
            .sum::<f64>()
            / (n - 1) as f64;
        (variance / n as f64).sqrt()
    }
}

/// Estimates the expected discounted return of `policy` from `start`.
///
/// # Errors
/// - `InvalidConfiguration` if `trials` or `max_steps` is zero, the discount is
///   outside `[0, 1)`, or `policy` misses a visited state
/// - `InvalidAction` if `policy` prescribes an illegal action
/// - `MalformedModel` from the transition model
/// - `MaxStepsExceeded` if a trial hits the step bound under
///   [`StepLimitPolicy::Fail`], or every trial does under [`StepLimitPolicy::Discard`]
pub fn estimate<M>(
    model: &M,
    policy: &Policy<M::State, M::Action>,
    start: M::State,
    config: &MonteCarloConfig,
) -> Result<MonteCarloEstimate>
where
    M: Mdp + Sync,
    M::State: Send + Sync,
    M::Action: Send + Sync,
{
    if config.trials == 0 {
        return Err(MdpError::invalid_configuration(
            "Monte Carlo estimation needs at least one trial",
        ));
    }
    if config.max_steps == 0 {
        return Err(MdpError::invalid_configuration(
            "max_steps must be positive",
        ));
    }
    validate_discount(model)?;

    let base_seed = match config.seed {
        Some(s) => s,
        None => rand::thread_rng().gen(),
    };
    let run_trial = |trial: usize| {
        let mut rng = ChaCha20Rng::seed_from_u64(base_seed.wrapping_add(trial as u64));
        rollout(model, policy, start, config.max_steps, &mut rng)
    };

    let outcomes: Vec<Result<f64>> = if config.parallel {
        (0..config.trials).into_par_iter().map(run_trial).collect()
    } else {
        (0..config.trials).map(run_trial).collect()
    };

    let mut samples = Vec::with_capacity(config.trials);
    let mut discarded = 0;
    for outcome in outcomes {
        match outcome {
            Ok(total) => samples.push(total),
            Err(MdpError::MaxStepsExceeded { .. })
                if config.on_step_limit == StepLimitPolicy::Discard =>
            {
                discarded += 1;
            }
            Err(e) => return Err(e),
        }
    }

    if discarded > 0 {
        warn!(
            "discarded {} of {} rollouts from {:?} that exceeded {} steps",
            discarded, config.trials, start, config.max_steps
        );
    }
    if samples.is_empty() {
        return Err(MdpError::max_steps_exceeded(&start, config.max_steps));
    }

    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    debug!(
        "Monte Carlo estimate from {:?}: {} over {} trials",
        start,
        mean,
        samples.len()
    );
    Ok(MonteCarloEstimate {
        mean,
        samples,
        discarded,
    })
}

/// Mean discounted return of `policy` from `state` over `trials` rollouts,
/// using the default step bound and an unseeded RNG.
///
/// # Examples
///
/// ```
/// use bellman::mdp::{Policy, TabularMdp, NO_OP};
/// use bellman::solvers::estimate_utility;
///
/// // Deterministic: reward 1 for stepping from state 0 into the terminal state 1.
/// let mdp = TabularMdp::new(0.9, 0, vec![vec![vec![(1, 1.0, 1.0)]], vec![]], &[1]).unwrap();
/// let policy: Policy<usize, usize> = vec![(0, 0), (1, NO_OP)].into_iter().collect();
///
/// let mean = estimate_utility(&mdp, &policy, 0, 100).unwrap();
/// assert_eq!(mean, 1.0);
/// ```
pub fn estimate_utility<M>(
    model: &M,
    policy: &Policy<M::State, M::Action>,
    state: M::State,
    trials: usize,
) -> Result<f64>
where
    M: Mdp + Sync,
    M::State: Send + Sync,
    M::Action: Send + Sync,
{
    let config = MonteCarloConfig {
        trials,
        ..MonteCarloConfig::default()
    };
    estimate(model, policy, state, &config).map(|e| e.mean)
}

/// One rollout from `start`; fails with `MaxStepsExceeded` after `max_steps` moves.
fn rollout<M: Mdp, R: Rng>(
    model: &M,
    policy: &Policy<M::State, M::Action>,
    start: M::State,
    max_steps: usize,
    rng: &mut R,
) -> Result<f64> {
    let gamma = model.discount();
    let mut state = start;
    let mut total = 0.0;
    let mut weight = 1.0;

    for _ in 0..max_steps {
        if model.is_terminal(&state) {
            return Ok(total);
        }
        let action = policy_action(model, policy, &state)?;
        let successors = model.transition(&state, &action);
        check_distribution(&state, &action, &successors)?;
        let dist = WeightedIndex::new(successors.iter().map(|(_, p)| *p)).map_err(|e| {
            MdpError::malformed_model(format!(
                "cannot sample transition({:?}, {:?}): {}",
                state, action, e
            ))
        })?;
        let (next, _) = successors[dist.sample(rng)];

        let r = model.reward(&state, &action, &next);
        if !r.is_finite() {
            return Err(MdpError::malformed_model(format!(
                "reward({:?}, {:?}, {:?}) is {}",
                state, action, next, r
            )));
        }
        total += weight * r;
        weight *= gamma;
        state = next;
    }

    if model.is_terminal(&state) {
        Ok(total)
    } else {
        Err(MdpError::max_steps_exceeded(&start, max_steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdp::{TabularMdp, NO_OP};
    use approx::assert_abs_diff_eq;

    // 0 -> 1 -> 2 (terminal), deterministic, reward 1 per step.
    fn line() -> TabularMdp {
        TabularMdp::new(
            0.5,
            0,
            vec![vec![vec![(1, 1.0, 1.0)]], vec![vec![(2, 1.0, 1.0)]], vec![]],
            &[2],
        )
        .unwrap()
    }

    fn line_policy() -> Policy<usize, usize> {
        vec![(0, 0), (1, 0), (2, NO_OP)].into_iter().collect()
    }

    // A state that loops forever.
    fn trap() -> TabularMdp {
        TabularMdp::new(0.9, 0, vec![vec![vec![(0, 1.0, 1.0)]]], &[]).unwrap()
    }

    #[test]
    fn test_deterministic_rollout() {
        let config = MonteCarloConfig {
            trials: 10,
            seed: Some(7),
            ..MonteCarloConfig::default()
        };
        let est = estimate(&line(), &line_policy(), 0, &config).unwrap();
        assert_abs_diff_eq!(est.mean, 1.5);
        assert_eq!(est.samples.len(), 10);
        assert_eq!(est.discarded, 0);
        assert_abs_diff_eq!(est.standard_error(), 0.0);
    }

    #[test]
    fn test_start_in_terminal_state() {
        let est = estimate_utility(&line(), &line_policy(), 2, 5).unwrap();
        assert_eq!(est, 0.0);
    }

    #[test]
    fn test_step_limit_discard_and_fail() {
        let policy: Policy<usize, usize> = vec![(0, 0)].into_iter().collect();
        let discard = MonteCarloConfig {
            trials: 4,
            max_steps: 50,
            seed: Some(1),
            on_step_limit: StepLimitPolicy::Discard,
            parallel: false,
        };
        // Every trial is discarded, so nothing is left to average.
        assert!(matches!(
            estimate(&trap(), &policy, 0, &discard),
            Err(MdpError::MaxStepsExceeded { max_steps: 50, .. })
        ));

        let fail = MonteCarloConfig {
            on_step_limit: StepLimitPolicy::Fail,
            ..discard
        };
        assert!(matches!(
            estimate(&trap(), &policy, 0, &fail),
            Err(MdpError::MaxStepsExceeded { .. })
        ));
    }

    #[test]
    fn test_discard_keeps_terminating_trials() {
        // From 0: 50% straight into the terminal state, 50% into a trap.
        let mdp = TabularMdp::new(
            0.9,
            0,
            vec![
                vec![vec![(1, 0.5, 1.0), (2, 0.5, 0.0)]],
                vec![],
                vec![vec![(2, 1.0, 0.0)]],
            ],
            &[1],
        )
        .unwrap();
        let policy: Policy<usize, usize> = vec![(0, 0), (1, NO_OP), (2, 0)].into_iter().collect();
        let config = MonteCarloConfig {
            trials: 200,
            max_steps: 20,
            seed: Some(3),
            ..MonteCarloConfig::default()
        };
        let est = estimate(&mdp, &policy, 0, &config).unwrap();
        assert!(est.discarded > 0);
        assert_eq!(est.samples.len() + est.discarded, 200);
        assert_abs_diff_eq!(est.mean, 1.0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mdp = TabularMdp::new(
            0.9,
            0,
            vec![
                vec![vec![(1, 0.9, -0.1), (0, 0.1, -0.1)]],
                vec![vec![(2, 0.8, 1.0), (0, 0.2, -0.1)]],
                vec![],
            ],
            &[2],
        )
        .unwrap();
        let policy: Policy<usize, usize> = vec![(0, 0), (1, 0), (2, NO_OP)].into_iter().collect();
        let sequential = MonteCarloConfig {
            trials: 500,
            seed: Some(42),
            ..MonteCarloConfig::default()
        };
        let parallel = MonteCarloConfig {
            parallel: true,
            ..sequential.clone()
        };
        let a = estimate(&mdp, &policy, 0, &sequential).unwrap();
        let b = estimate(&mdp, &policy, 0, &parallel).unwrap();
        assert_eq!(a.samples, b.samples);
        assert_eq!(a.mean, b.mean);
    }

    #[test]
    fn test_invalid_configuration() {
        let config = MonteCarloConfig {
            trials: 0,
            ..MonteCarloConfig::default()
        };
        assert!(matches!(
            estimate(&line(), &line_policy(), 0, &config),
            Err(MdpError::InvalidConfiguration(_))
        ));
        let config = MonteCarloConfig {
            max_steps: 0,
            ..MonteCarloConfig::default()
        };
        assert!(matches!(
            estimate(&line(), &line_policy(), 0, &config),
            Err(MdpError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_discount_out_of_range() {
        for gamma in [1.0, 1.5, -0.1, f64::NAN] {
            let mdp = TabularMdp::new(
                gamma,
                0,
                vec![vec![vec![(1, 1.0, 1.0)]], vec![vec![(2, 1.0, 1.0)]], vec![]],
                &[2],
            )
            .unwrap();
            assert!(matches!(
                estimate_utility(&mdp, &line_policy(), 0, 10),
                Err(MdpError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_malformed_rollout() {
        // State 1's row only sums to 0.5.
        let short_row = TabularMdp::new(
            0.5,
            0,
            vec![vec![vec![(1, 1.0, 1.0)]], vec![vec![(2, 0.5, 1.0)]], vec![]],
            &[2],
        )
        .unwrap();
        assert!(matches!(
            estimate_utility(&short_row, &line_policy(), 0, 10),
            Err(MdpError::MalformedModel(_))
        ));

        let nan_reward = TabularMdp::new(
            0.5,
            0,
            vec![vec![vec![(1, 1.0, f64::NAN)]], vec![vec![(2, 1.0, 1.0)]], vec![]],
            &[2],
        )
        .unwrap();
        let config = MonteCarloConfig {
            trials: 10,
            seed: Some(5),
            parallel: true,
            ..MonteCarloConfig::default()
        };
        assert!(matches!(
            estimate(&nan_reward, &line_policy(), 0, &config),
            Err(MdpError::MalformedModel(_))
        ));
    }

    #[test]
    fn test_illegal_policy_action() {
        let policy: Policy<usize, usize> = vec![(0, 3), (1, 0), (2, NO_OP)].into_iter().collect();
        assert!(matches!(
            estimate_utility(&line(), &policy, 0, 10),
            Err(MdpError::InvalidAction { .. })
        ));
    }
}
