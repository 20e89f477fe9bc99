//! Solvers for finite Markov Decision Processes.
//!
//! This module provides:
//! - The Bellman evaluator (Q-values, greedy actions, one synchronous backup)
//! - Value iteration
//! - Iterative policy evaluation
//! - Modified policy iteration
//! - Monte Carlo utility estimation, used to cross-check the analytic solvers
//!
//! All analytic solvers sweep the states in [`Mdp::states`] order and update
//! synchronously: every state in sweep `k` reads only the values of sweep `k - 1`.
//!
//! # Examples
//!
//! ```
//! use bellman::mdp::{GridAction, GridWorld, Mdp};
//! use bellman::solvers::{policy_iteration, value_iteration};
//!
//! let world = GridWorld::textbook();
//! let (utility, policy, iterations) = value_iteration(&world, 0.001).unwrap();
//! assert!(iterations < 100);
//! assert_eq!(policy.get(&world.initial_state()), Some(GridAction::Up));
//! assert!(utility.get(&world.initial_state()).unwrap() > 0.0);
//!
//! let pi_policy = policy_iteration(&world, 20).unwrap();
//! assert_eq!(pi_policy, policy);
//! ```

pub mod bellman;
pub mod monte_carlo;
pub mod policy_evaluation;
pub mod policy_iteration;
pub mod value_iteration;


pub use bellman::{bellman_backup, best_action, greedy_policy, q_value, state_value};
pub use monte_carlo::{
    estimate, estimate_utility, MonteCarloConfig, MonteCarloEstimate, StepLimitPolicy,
};
pub use policy_evaluation::{evaluate_policy, policy_evaluation, DEFAULT_SWEEPS};
pub use policy_iteration::{
    improve_policy, policy_iteration, PolicyIteration, PolicyIterationConfig,
    PolicyIterationResult,
};
pub use value_iteration::{
    value_iteration, ValueIteration, ValueIterationConfig, ValueIterationResult,
};

use crate::error::{MdpError, Result};
use crate::mdp::{Mdp, Policy};

/// Checks that the model's discount factor lies in `[0, 1)`.
pub(crate) fn validate_discount<M: Mdp>(model: &M) -> Result<f64> {
    let gamma = model.discount();
    if !(0.0..1.0).contains(&gamma) {
        return Err(MdpError::invalid_configuration(format!(
            "discount factor must be in [0, 1), got {}",
            gamma
        )));
    }
    Ok(gamma)
}

/// Legal actions of `state`, rejecting an empty action set.
pub(crate) fn legal_actions<'m, M: Mdp>(model: &'m M, state: &M::State) -> Result<&'m [M::Action]> {
    let actions = model.actions(state);
    if actions.is_empty() {
        return Err(MdpError::malformed_model(format!(
            "state {:?} has no legal actions",
            state
        )));
    }
    Ok(actions)
}

/// The action `policy` prescribes in `state`, checked for legality.
pub(crate) fn policy_action<M: Mdp>(
    model: &M,
    policy: &Policy<M::State, M::Action>,
    state: &M::State,
) -> Result<M::Action> {
    let action = policy.get(state).ok_or_else(|| {
        MdpError::invalid_configuration(format!("policy has no action for state {:?}", state))
    })?;
    if !legal_actions(model, state)?.contains(&action) {
        return Err(MdpError::invalid_action(state, &action));
    }
    Ok(action)
}
