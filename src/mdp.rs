//! Finite Markov Decision Process models.
//!
//! The solvers in [`crate::solvers`] only ever talk to a model through the
//! [`Mdp`] trait. States and actions are opaque identifiers; any meaning
//! (grid coordinates, inventory levels, ...) stays inside the model.
//!
//! Two models are bundled:
//! - [`TabularMdp`]: explicit `(next_state, probability, reward)` tables.
//! - [`GridWorld`]: the classic 4x3 stochastic grid world and variants.

use approx::abs_diff_eq;
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::error::{MdpError, Result};

pub mod grid_world;
pub mod tabular;

pub use grid_world::{GridAction, GridWorld, GridWorldConfig};
pub use tabular::{TabularMdp, NO_OP};

/// Tolerance used when checking that a transition distribution sums to one.
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// A finite, fully observable Markov Decision Process.
///
/// Invariants the implementor must uphold:
/// - `actions(s)` is non-empty and its order is stable for the lifetime of the model.
/// - For every legal `a`, `transition(s, a)` lists successor states with
///   non-negative probabilities summing to one. Unlisted states have probability zero.
/// - Terminal states have `actions(s) == [no_op()]`, a self-loop transition and zero reward.
///
/// Violations are reported as [`MdpError::MalformedModel`] when a solver first touches
/// the offending state.
pub trait Mdp {
    type State: Copy + Ord + Debug;
    type Action: Copy + Eq + Debug;

    /// All states, in the order solvers sweep them.
    fn states(&self) -> &[Self::State];

    /// Default start state for simulation.
    fn initial_state(&self) -> Self::State;

    /// Legal actions in `state`, in declared order. Ties between equally good actions
    /// are broken in favour of the earlier action.
    fn actions(&self, state: &Self::State) -> &[Self::Action];

    /// Successor distribution as `(next_state, probability)` pairs.
    fn transition(&self, state: &Self::State, action: &Self::Action) -> Vec<(Self::State, f64)>;

    /// Reward for taking `action` in `state` and landing in `next`.
    fn reward(&self, state: &Self::State, action: &Self::Action, next: &Self::State) -> f64;

    /// Discount factor, expected in `[0, 1)`.
    fn discount(&self) -> f64;

    /// The distinguished action of absorbing states.
    fn no_op(&self) -> Self::Action;

    /// Whether `state` is absorbing. By default a state is terminal when its only
    /// legal action is the no-op.
    fn is_terminal(&self, state: &Self::State) -> bool {
        let no_op = self.no_op();
        matches!(self.actions(state), [only] if *only == no_op)
    }
}

/// Checks that `successors` is a proper probability distribution.
pub fn check_distribution<S: Debug, A: Debug>(
    state: &S,
    action: &A,
    successors: &[(S, f64)],
) -> Result<()> {
    let mut total = 0.0;
    for (next, p) in successors {
        if !p.is_finite() || *p < 0.0 {
            return Err(MdpError::malformed_model(format!(
                "transition({:?}, {:?}) assigns invalid probability {} to {:?}",
                state, action, p, next
            )));
        }
        total += p;
    }
    if !abs_diff_eq!(total, 1.0, epsilon = PROBABILITY_TOLERANCE) {
        return Err(MdpError::malformed_model(format!(
            "transition({:?}, {:?}) sums to {}, expected 1",
            state, action, total
        )));
    }
    Ok(())
}

/// Expected discounted future reward for every state.
#[derive(Debug, Clone, PartialEq)]
pub struct UtilityVector<S: Ord> {
    values: BTreeMap<S, f64>,
}

impl<S: Ord + Copy> UtilityVector<S> {
    /// A vector assigning zero to each of `states`.
    pub fn zeros(states: &[S]) -> Self {
        states.iter().map(|&s| (s, 0.0)).collect()
    }

    pub fn get(&self, state: &S) -> Option<f64> {
        self.values.get(state).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates `(state, utility)` pairs in ascending state order.
    pub fn iter(&self) -> impl Iterator<Item = (S, f64)> + '_ {
        self.values.iter().map(|(&s, &v)| (s, v))
    }

    /// Max-norm distance `max_s |self(s) - other(s)|`.
    ///
    /// A state present in `self` but missing from `other` makes the distance infinite.
    /// Any NaN difference makes the distance NaN.
    pub fn max_norm_distance(&self, other: &Self) -> f64 {
        let mut worst = 0.0_f64;
        for (s, v) in &self.values {
            let diff = match other.values.get(s) {
                Some(w) => (v - w).abs(),
                None => f64::INFINITY,
            };
            if diff.is_nan() {
                return f64::NAN;
            }
            worst = worst.max(diff);
        }
        worst
    }
}

impl<S: Ord> FromIterator<(S, f64)> for UtilityVector<S> {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// A deterministic policy: one action per state.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy<S: Ord, A> {
    actions: BTreeMap<S, A>,
}

impl<S: Ord + Copy, A: Copy> Policy<S, A> {
    pub fn new() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }

    pub fn get(&self, state: &S) -> Option<A> {
        self.actions.get(state).copied()
    }

    /// Sets the action for `state`, returning the previous one.
    pub fn insert(&mut self, state: S, action: A) -> Option<A> {
        self.actions.insert(state, action)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (S, A)> + '_ {
        self.actions.iter().map(|(&s, &a)| (s, a))
    }
}

impl<S: Ord + Copy, A: Copy> Default for Policy<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Ord, A> FromIterator<(S, A)> for Policy<S, A> {
    fn from_iter<I: IntoIterator<Item = (S, A)>>(iter: I) -> Self {
        Self {
            actions: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_distribution() {
        assert!(check_distribution(&0, &0, &[(0, 0.8), (1, 0.1), (2, 0.1)]).is_ok());
        assert!(matches!(
            check_distribution(&0, &0, &[(0, 0.5)]),
            Err(MdpError::MalformedModel(_))
        ));
        assert!(matches!(
            check_distribution(&0, &0, &[(0, 1.5), (1, -0.5)]),
            Err(MdpError::MalformedModel(_))
        ));
        assert!(matches!(
            check_distribution(&0, &0, &[(0, f64::NAN)]),
            Err(MdpError::MalformedModel(_))
        ));
    }

    #[test]
    fn test_max_norm_distance() {
        let a: UtilityVector<usize> = vec![(0, 1.0), (1, -2.0)].into_iter().collect();
        let b: UtilityVector<usize> = vec![(0, 1.5), (1, -1.0)].into_iter().collect();
        assert_eq!(a.max_norm_distance(&b), 1.0);
        assert_eq!(a.max_norm_distance(&a), 0.0);

        let short: UtilityVector<usize> = vec![(0, 1.0)].into_iter().collect();
        assert!(a.max_norm_distance(&short).is_infinite());
    }

    #[test]
    fn test_max_norm_distance_propagates_nan() {
        let a: UtilityVector<usize> = vec![(0, 1.0), (1, f64::NAN)].into_iter().collect();
        let b: UtilityVector<usize> = vec![(0, 5.0), (1, 0.0)].into_iter().collect();
        assert!(a.max_norm_distance(&b).is_nan());
        assert!(b.max_norm_distance(&a).is_nan());

        let inf: UtilityVector<usize> = vec![(0, f64::INFINITY), (1, 0.0)].into_iter().collect();
        assert!(inf.max_norm_distance(&b).is_infinite());
        assert!(inf.max_norm_distance(&inf).is_nan());
    }

    #[test]
    fn test_policy_insert_replaces() {
        let mut policy: Policy<usize, usize> = Policy::new();
        assert_eq!(policy.insert(3, 1), None);
        assert_eq!(policy.insert(3, 2), Some(1));
        assert_eq!(policy.get(&3), Some(2));
        assert_eq!(policy.len(), 1);
    }
}
