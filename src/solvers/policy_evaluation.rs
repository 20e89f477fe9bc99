use log::{debug, trace};

use crate::error::{MdpError, Result};
use crate::mdp::{Mdp, Policy, UtilityVector};
use crate::solvers::bellman::expected_value;
use crate::solvers::{policy_action, validate_discount};

/// Default number of sweeps for approximate policy evaluation.
pub const DEFAULT_SWEEPS: usize = 20;

/// Approximates the utility of following `policy` with exactly `sweeps` synchronous passes of
///
/// `U(s) = sum_{s'} P(s' | s, pi(s)) * (R(s, pi(s), s') + gamma * U(s'))`
///
/// starting from `initial` (missing states and `None` start at zero). There is
/// no convergence test: the error shrinks by a factor of `gamma` per sweep.
///
/// # Errors
/// - `InvalidConfiguration` if `sweeps == 0`, the discount is outside `[0, 1)`,
///   or `policy` has no action for some state
/// - `InvalidAction` if `policy` prescribes an illegal action
/// - `MalformedModel` from the transition model
pub fn evaluate_policy<M: Mdp>(
    model: &M,
    policy: &Policy<M::State, M::Action>,
    initial: Option<&UtilityVector<M::State>>,
    sweeps: usize,
) -> Result<UtilityVector<M::State>> {
    if sweeps == 0 {
        return Err(MdpError::invalid_configuration(
            "policy evaluation needs at least one sweep",
        ));
    }
    validate_discount(model)?;

    let plan = model
        .states()
        .iter()
        .map(|s| policy_action(model, policy, s).map(|a| (*s, a)))
        .collect::<Result<Vec<_>>>()?;

    let mut utility: UtilityVector<M::State> = model
        .states()
        .iter()
        .map(|s| (*s, initial.and_then(|u| u.get(s)).unwrap_or(0.0)))
        .collect();

    for sweep in 0..sweeps {
        let next = plan
            .iter()
            .map(|(s, a)| expected_value(model, s, a, &utility).map(|v| (*s, v)))
            .collect::<Result<UtilityVector<M::State>>>()?;
        trace!(
            "policy evaluation sweep {}: delta {}",
            sweep + 1,
            next.max_norm_distance(&utility)
        );
        utility = next;
    }

    debug!(
        "evaluated policy over {} states with {} sweeps",
        plan.len(),
        sweeps
    );
    Ok(utility)
}

/// Evaluates `policy` from an all-zero start. See [`evaluate_policy`].
///
/// # Examples
///
/// ```
/// use bellman::mdp::{Policy, TabularMdp, NO_OP};
/// use bellman::solvers::{policy_evaluation, DEFAULT_SWEEPS};
///
/// // Reward 1 for moving from state 0 into the terminal state 1.
/// let mdp = TabularMdp::new(0.9, 0, vec![vec![vec![(1, 1.0, 1.0)]], vec![]], &[1]).unwrap();
/// let policy: Policy<usize, usize> = vec![(0, 0), (1, NO_OP)].into_iter().collect();
///
/// let utility = policy_evaluation(&mdp, &policy, DEFAULT_SWEEPS).unwrap();
/// assert_eq!(utility.get(&0), Some(1.0));
/// assert_eq!(utility.get(&1), Some(0.0));
/// ```
pub fn policy_evaluation<M: Mdp>(
    model: &M,
    policy: &Policy<M::State, M::Action>,
    sweeps: usize,
) -> Result<UtilityVector<M::State>> {
    evaluate_policy(model, policy, None, sweeps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdp::{TabularMdp, NO_OP};
    use approx::assert_abs_diff_eq;

    // A single self-looping state paying 1 per step: U = 1 / (1 - gamma).
    fn self_loop(gamma: f64) -> TabularMdp {
        TabularMdp::new(gamma, 0, vec![vec![vec![(0, 1.0, 1.0)]]], &[]).unwrap()
    }

    #[test]
    fn test_exact_sweep_count() {
        let mdp = self_loop(0.5);
        let policy: Policy<usize, usize> = vec![(0, 0)].into_iter().collect();

        // After k sweeps from zero: sum_{t<k} 0.5^t.
        let u1 = policy_evaluation(&mdp, &policy, 1).unwrap();
        assert_abs_diff_eq!(u1.get(&0).unwrap(), 1.0);
        let u3 = policy_evaluation(&mdp, &policy, 3).unwrap();
        assert_abs_diff_eq!(u3.get(&0).unwrap(), 1.75);
        let u_many = policy_evaluation(&mdp, &policy, 200).unwrap();
        assert_abs_diff_eq!(u_many.get(&0).unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_warm_start() {
        let mdp = self_loop(0.5);
        let policy: Policy<usize, usize> = vec![(0, 0)].into_iter().collect();
        let init: UtilityVector<usize> = vec![(0, 2.0)].into_iter().collect();
        // The fixed point is preserved.
        let u = evaluate_policy(&mdp, &policy, Some(&init), 5).unwrap();
        assert_abs_diff_eq!(u.get(&0).unwrap(), 2.0);
    }

    #[test]
    fn test_zero_sweeps_rejected() {
        let mdp = self_loop(0.5);
        let policy: Policy<usize, usize> = vec![(0, 0)].into_iter().collect();
        assert!(matches!(
            policy_evaluation(&mdp, &policy, 0),
            Err(MdpError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_discount_out_of_range() {
        let policy: Policy<usize, usize> = vec![(0, 0)].into_iter().collect();
        for gamma in [1.0, 2.0, -0.5, f64::NAN] {
            assert!(matches!(
                policy_evaluation(&self_loop(gamma), &policy, 5),
                Err(MdpError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_policy_errors() {
        let mdp = TabularMdp::new(0.9, 0, vec![vec![vec![(1, 1.0, 1.0)]], vec![]], &[1]).unwrap();

        let missing: Policy<usize, usize> = vec![(0, 0)].into_iter().collect();
        assert!(matches!(
            policy_evaluation(&mdp, &missing, 5),
            Err(MdpError::InvalidConfiguration(_))
        ));

        let illegal: Policy<usize, usize> = vec![(0, 0), (1, 0)].into_iter().collect();
        assert!(matches!(
            policy_evaluation(&mdp, &illegal, 5),
            Err(MdpError::InvalidAction { .. })
        ));

        let ok: Policy<usize, usize> = vec![(0, 0), (1, NO_OP)].into_iter().collect();
        assert!(policy_evaluation(&mdp, &ok, 5).is_ok());
    }
}
