use log::{debug, trace};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::{MdpError, Result};
use crate::mdp::{Mdp, Policy, UtilityVector};
use crate::solvers::bellman::{best_action, expected_value};
use crate::solvers::policy_evaluation::{evaluate_policy, DEFAULT_SWEEPS};
use crate::solvers::{legal_actions, policy_action, validate_discount};

/// Minimum Q-value gain for the improvement step to switch a state's action.
///
/// Guards the termination argument against floating-point noise between
/// actions whose Q-values are equal in exact arithmetic.
pub const IMPROVEMENT_TOLERANCE: f64 = 1e-10;

/// Configuration for modified policy iteration.
#[derive(Debug, Clone)]
pub struct PolicyIterationConfig {
    /// Evaluation sweeps per round
    pub sweeps_per_eval: usize,
    /// Optional RNG seed for the random initial policy
    pub seed: Option<u64>,
}

impl Default for PolicyIterationConfig {
    fn default() -> Self {
        Self {
            sweeps_per_eval: DEFAULT_SWEEPS,
            seed: None,
        }
    }
}

/// Output of policy iteration.
#[derive(Debug, Clone)]
pub struct PolicyIterationResult<S: Ord, A> {
    /// The final policy; no state admits a strictly better action under `utility`
    pub policy: Policy<S, A>,
    /// Approximate utility of `policy` from the last evaluation
    pub utility: UtilityVector<S>,
    /// Number of evaluate/improve rounds, including the final unchanged one
    pub rounds: usize,
}

/// Modified policy iteration solver.
#[derive(Debug, Clone, Default)]
pub struct PolicyIteration {
    config: PolicyIterationConfig,
}

impl PolicyIteration {
    pub fn new(config: PolicyIterationConfig) -> Self {
        Self { config }
    }

    /// Runs modified policy iteration on `model`.
    ///
    /// Starts from a uniformly random legal action per state, then alternates
    /// `sweeps_per_eval` sweeps of approximate evaluation (warm-started from the
    /// previous round) with greedy improvement until a round changes nothing.
    ///
    /// There is no round cap. Termination relies on the finite number of policies
    /// and on each accepted switch strictly improving the evaluated utility.
    ///
    /// # Errors
    /// - `InvalidConfiguration` if `sweeps_per_eval == 0` or the discount is outside `[0, 1)`
    /// - `MalformedModel` from the transition model
    pub fn solve<M: Mdp>(
        &self,
        model: &M,
    ) -> Result<PolicyIterationResult<M::State, M::Action>> {
        let sweeps = self.config.sweeps_per_eval;
        if sweeps == 0 {
            return Err(MdpError::invalid_configuration(
                "sweeps_per_eval must be positive",
            ));
        }
        validate_discount(model)?;

        let mut rng = match self.config.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let mut policy = Policy::new();
        for s in model.states() {
            let actions = legal_actions(model, s)?;
            policy.insert(*s, actions[rng.gen_range(0..actions.len())]);
        }

        debug!(
            "policy iteration: {} states, {} sweeps per evaluation",
            model.states().len(),
            sweeps
        );

        let mut utility = UtilityVector::zeros(model.states());
        let mut rounds = 0;
        loop {
            utility = evaluate_policy(model, &policy, Some(&utility), sweeps)?;
            rounds += 1;
            let changed = improve_policy(model, &mut policy, &utility)?;
            trace!("policy iteration round {}: changed {}", rounds, changed);
            if !changed {
                break;
            }
        }

        debug!("policy iteration stable after {} rounds", rounds);
        Ok(PolicyIterationResult {
            policy,
            utility,
            rounds,
        })
    }
}

/// One greedy improvement step.
///
/// For every state, switches to the greedy action when its Q-value beats the
/// current action's by more than [`IMPROVEMENT_TOLERANCE`]. Returns whether any
/// state changed.
pub fn improve_policy<M: Mdp>(
    model: &M,
    policy: &mut Policy<M::State, M::Action>,
    utility: &UtilityVector<M::State>,
) -> Result<bool> {
    let mut changed = false;
    for s in model.states() {
        let current = policy_action(model, policy, s)?;
        let (best, best_q) = best_action(model, s, utility)?;
        let current_q = expected_value(model, s, &current, utility)?;
        if best_q > current_q + IMPROVEMENT_TOLERANCE {
            policy.insert(*s, best);
            changed = true;
        }
    }
    Ok(changed)
}

/// Solves `model` by modified policy iteration with `sweeps_per_eval` evaluation
/// sweeps per round and a freshly randomised initial policy.
///
/// # Examples
///
/// ```
/// use bellman::mdp::TabularMdp;
/// use bellman::solvers::policy_iteration;
///
/// // State 0: action 0 stays for 1, action 1 moves to state 1 for 0.
/// // State 1: action 0 returns for 0, action 1 stays for 2.
/// let mdp = TabularMdp::new(
///     0.9,
///     0,
///     vec![
///         vec![vec![(0, 1.0, 1.0)], vec![(1, 1.0, 0.0)]],
///         vec![vec![(0, 1.0, 0.0)], vec![(1, 1.0, 2.0)]],
///     ],
///     &[],
/// )
/// .unwrap();
///
/// let policy = policy_iteration(&mdp, 50).unwrap();
/// assert_eq!(policy.get(&0), Some(1));
/// assert_eq!(policy.get(&1), Some(1));
/// ```
pub fn policy_iteration<M: Mdp>(
    model: &M,
    sweeps_per_eval: usize,
) -> Result<Policy<M::State, M::Action>> {
    PolicyIteration::new(PolicyIterationConfig {
        sweeps_per_eval,
        seed: None,
    })
    .solve(model)
    .map(|result| result.policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdp::{TabularMdp, NO_OP};

    fn two_state() -> TabularMdp {
        TabularMdp::new(
            0.9,
            0,
            vec![
                vec![vec![(0, 1.0, 1.0)], vec![(1, 1.0, 0.0)]],
                vec![vec![(0, 1.0, 0.0)], vec![(1, 1.0, 2.0)]],
            ],
            &[],
        )
        .unwrap()
    }

    #[test]
    fn test_result_independent_of_seed() {
        let mdp = two_state();
        for seed in 0..8 {
            let result = PolicyIteration::new(PolicyIterationConfig {
                sweeps_per_eval: 50,
                seed: Some(seed),
            })
            .solve(&mdp)
            .unwrap();
            assert_eq!(result.policy.get(&0), Some(1));
            assert_eq!(result.policy.get(&1), Some(1));
            assert!(result.rounds >= 1);
        }
    }

    #[test]
    fn test_terminal_states_map_to_no_op() {
        let mdp = TabularMdp::new(
            0.9,
            0,
            vec![vec![vec![(1, 1.0, 1.0)], vec![(0, 1.0, 0.0)]], vec![]],
            &[1],
        )
        .unwrap();
        let policy = policy_iteration(&mdp, DEFAULT_SWEEPS).unwrap();
        assert_eq!(policy.get(&1), Some(NO_OP));
        assert_eq!(policy.get(&0), Some(0));
    }

    #[test]
    fn test_improve_policy_requires_strict_gain() {
        // Both actions of state 0 are equally good: no switch.
        let mdp = TabularMdp::new(
            0.9,
            0,
            vec![vec![vec![(1, 1.0, 1.0)], vec![(1, 1.0, 1.0)]], vec![]],
            &[1],
        )
        .unwrap();
        let mut policy: Policy<usize, usize> = vec![(0, 1), (1, NO_OP)].into_iter().collect();
        let utility = UtilityVector::zeros(mdp.states());
        assert!(!improve_policy(&mdp, &mut policy, &utility).unwrap());
        assert_eq!(policy.get(&0), Some(1));
    }

    #[test]
    fn test_improve_policy_switches_to_greedy_action() {
        let mdp = two_state();
        let mut policy: Policy<usize, usize> = vec![(0, 0), (1, 0)].into_iter().collect();
        let utility: UtilityVector<usize> = vec![(0, 10.0), (1, 20.0)].into_iter().collect();
        assert!(improve_policy(&mdp, &mut policy, &utility).unwrap());
        assert_eq!(policy.get(&0), Some(1));
        assert_eq!(policy.get(&1), Some(1));
    }

    #[test]
    fn test_invalid_configuration() {
        let mdp = two_state();
        assert!(matches!(
            policy_iteration(&mdp, 0),
            Err(MdpError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_discount_out_of_range() {
        for gamma in [1.0, 1.01, -0.2, f64::NAN] {
            let mdp = TabularMdp::new(
                gamma,
                0,
                vec![vec![vec![(0, 1.0, 1.0)], vec![(1, 1.0, 0.0)]], vec![vec![(1, 1.0, 2.0)]]],
                &[],
            )
            .unwrap();
            assert!(matches!(
                policy_iteration(&mdp, DEFAULT_SWEEPS),
                Err(MdpError::InvalidConfiguration(_))
            ));
        }
    }
}
