//! The Bellman evaluator.
//!
//! `Q(s, a, U) = sum_{s'} P(s' | s, a) * (R(s, a, s') + gamma * U(s'))`
//!
//! and the derived state value `U(s) = max_a Q(s, a, U)`. Ties in the max go to
//! the first action in `actions(s)` order.

use log::trace;

use crate::error::{MdpError, Result};
use crate::mdp::{check_distribution, Mdp, Policy, UtilityVector};
use crate::solvers::legal_actions;

/// Computes `Q(state, action, utility)` without checking that `action` is legal.
///
/// The transition distribution is validated on every call, so a malformed row
/// surfaces the first time a solver touches it.
pub(crate) fn expected_value<M: Mdp>(
    model: &M,
    state: &M::State,
    action: &M::Action,
    utility: &UtilityVector<M::State>,
) -> Result<f64> {
    let gamma = model.discount();
    let successors = model.transition(state, action);
    check_distribution(state, action, &successors)?;

    let mut q = 0.0;
    for (next, prob) in successors {
        if prob == 0.0 {
            continue;
        }
        let u = utility.get(&next).ok_or_else(|| {
            MdpError::malformed_model(format!(
                "transition({:?}, {:?}) leads to {:?}, which is not a state of the model",
                state, action, next
            ))
        })?;
        let r = model.reward(state, action, &next);
        if !r.is_finite() {
            return Err(MdpError::malformed_model(format!(
                "reward({:?}, {:?}, {:?}) is {}",
                state, action, next, r
            )));
        }
        q += prob * (r + gamma * u);
    }
    Ok(q)
}

/// Compute Q(s, a) = sum_{s'} P(s'|s,a) [ R(s,a,s') + gamma * U(s') ].
///
/// # Errors
/// - `InvalidAction` if `action` is not in `model.actions(state)`
/// - `MalformedModel` if the transition distribution is not stochastic
pub fn q_value<M: Mdp>(
    model: &M,
    state: &M::State,
    action: &M::Action,
    utility: &UtilityVector<M::State>,
) -> Result<f64> {
    if !legal_actions(model, state)?.contains(action) {
        return Err(MdpError::invalid_action(state, action));
    }
    expected_value(model, state, action, utility)
}

/// The greedy action in `state` and its Q-value.
///
/// Only a strictly larger Q-value replaces the current best, so the earliest
/// action wins ties.
pub fn best_action<M: Mdp>(
    model: &M,
    state: &M::State,
    utility: &UtilityVector<M::State>,
) -> Result<(M::Action, f64)> {
    let actions = legal_actions(model, state)?;
    let mut best_a = actions[0];
    let mut best_val = expected_value(model, state, &best_a, utility)?;
    for a in &actions[1..] {
        let q_sa = expected_value(model, state, a, utility)?;
        if q_sa > best_val {
            best_val = q_sa;
            best_a = *a;
        }
    }
    Ok((best_a, best_val))
}

/// `U(s) = max_a Q(s, a, U)`.
pub fn state_value<M: Mdp>(
    model: &M,
    state: &M::State,
    utility: &UtilityVector<M::State>,
) -> Result<f64> {
    best_action(model, state, utility).map(|(_, v)| v)
}

/// One synchronous Bellman sweep: every state's new value reads only `utility`.
pub fn bellman_backup<M: Mdp>(
    model: &M,
    utility: &UtilityVector<M::State>,
) -> Result<UtilityVector<M::State>> {
    let next = model
        .states()
        .iter()
        .map(|s| state_value(model, s, utility).map(|v| (*s, v)))
        .collect::<Result<UtilityVector<M::State>>>()?;
    trace!("bellman backup over {} states", next.len());
    Ok(next)
}

/// Extracts the greedy policy `pi(s) = argmax_a Q(s, a, U)`.
pub fn greedy_policy<M: Mdp>(
    model: &M,
    utility: &UtilityVector<M::State>,
) -> Result<Policy<M::State, M::Action>> {
    model
        .states()
        .iter()
        .map(|s| best_action(model, s, utility).map(|(a, _)| (*s, a)))
        .collect()
}
