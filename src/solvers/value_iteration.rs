use log::{debug, trace};

use crate::error::{MdpError, Result};
use crate::mdp::{Mdp, Policy, UtilityVector};
use crate::solvers::bellman::{bellman_backup, greedy_policy};
use crate::solvers::validate_discount;

/// Configuration for value iteration.
#[derive(Debug, Clone)]
pub struct ValueIterationConfig {
    /// Maximum allowed max-norm error of the returned utility
    pub epsilon: f64,
}

impl Default for ValueIterationConfig {
    fn default() -> Self {
        Self { epsilon: 0.001 }
    }
}

/// Output of value iteration.
#[derive(Debug, Clone)]
pub struct ValueIterationResult<S: Ord, A> {
    /// Utility within `epsilon` of the optimal utility in max-norm
    pub utility: UtilityVector<S>,
    /// Greedy policy with respect to `utility`
    pub policy: Policy<S, A>,
    /// Number of Bellman sweeps performed
    pub iterations: usize,
    /// Max-norm change of the last sweep
    pub delta: f64,
}

/// Value iteration solver.
#[derive(Debug, Clone, Default)]
pub struct ValueIteration {
    config: ValueIterationConfig,
}

impl ValueIteration {
    pub fn new(config: ValueIterationConfig) -> Self {
        Self { config }
    }

    /// Runs value iteration on `model`.
    ///
    /// Starting from all zeros, applies synchronous Bellman sweeps until the
    /// largest per-state change is at most `epsilon * (1 - gamma) / gamma`.
    /// Because the Bellman operator is a gamma-contraction, the returned utility is
    /// then within `epsilon` of the optimum. With `gamma == 0` a single sweep is exact.
    ///
    /// # Errors
    /// - `InvalidConfiguration` if `epsilon <= 0` or the discount is outside `[0, 1)`
    /// - `InvalidAction` / `MalformedModel` propagated from the Bellman evaluator
    pub fn solve<M: Mdp>(
        &self,
        model: &M,
    ) -> Result<ValueIterationResult<M::State, M::Action>> {
        let epsilon = self.config.epsilon;
        if epsilon.is_nan() || epsilon <= 0.0 {
            return Err(MdpError::invalid_configuration(format!(
                "epsilon must be positive, got {}",
                epsilon
            )));
        }
        let gamma = validate_discount(model)?;
        let threshold = stopping_threshold(epsilon, gamma);

        debug!(
            "value iteration: {} states, gamma {}, epsilon {}, threshold {}",
            model.states().len(),
            gamma,
            epsilon,
            threshold
        );

        let mut utility = UtilityVector::zeros(model.states());
        let mut iterations = 0;
        let delta = loop {
            let next = bellman_backup(model, &utility)?;
            let delta = next.max_norm_distance(&utility);
            utility = next;
            iterations += 1;
            trace!("value iteration sweep {}: delta {}", iterations, delta);
            if !delta.is_finite() {
                return Err(MdpError::malformed_model(format!(
                    "value iteration sweep {} produced a non-finite change ({})",
                    iterations, delta
                )));
            }
            if delta <= threshold {
                break delta;
            }
        };

        let policy = greedy_policy(model, &utility)?;
        debug!(
            "value iteration converged after {} iterations (delta {})",
            iterations, delta
        );

        Ok(ValueIterationResult {
            utility,
            policy,
            iterations,
            delta,
        })
    }
}

/// Largest sweep delta that still guarantees an `epsilon`-optimal utility.
fn stopping_threshold(epsilon: f64, gamma: f64) -> f64 {
    if gamma == 0.0 {
        f64::INFINITY
    } else {
        epsilon * (1.0 - gamma) / gamma
    }
}

/// Performs value iteration on the given MDP, returning:
/// 1. The near-optimal utility (within `epsilon` in max-norm).
/// 2. The greedy policy for that utility (ties go to the first declared action).
/// 3. The number of iterations performed.
///
/// # Examples
///
/// ```
/// use bellman::mdp::{TabularMdp, NO_OP};
/// use bellman::solvers::value_iteration;
///
/// // State 2 is absorbing. From state 0, action 0 walks to 1 at a small cost;
/// // action 1 is a coin flip between the goal and a penalty that stays put.
/// let mdp = TabularMdp::new(
///     0.9,
///     0,
///     vec![
///         vec![vec![(1, 1.0, -0.1)], vec![(2, 0.5, 1.0), (0, 0.5, -1.0)]],
///         vec![vec![(2, 1.0, 1.0)]],
///         vec![],
///     ],
///     &[2],
/// )
/// .unwrap();
///
/// let (values, policy, _) = value_iteration(&mdp, 0.01).unwrap();
/// assert!((values.get(&0).unwrap() - 0.8).abs() < 0.01);
/// assert_eq!(policy.get(&0), Some(0));
/// assert_eq!(policy.get(&2), Some(NO_OP));
/// ```
pub fn value_iteration<M: Mdp>(
    model: &M,
    epsilon: f64,
) -> Result<(UtilityVector<M::State>, Policy<M::State, M::Action>, usize)> {
    let result = ValueIteration::new(ValueIterationConfig { epsilon }).solve(model)?;
    Ok((result.utility, result.policy, result.iterations))
}
