//! Solvers for finite, fully observable Markov Decision Processes.
//!
//! A model implements [`mdp::Mdp`]; the [`solvers`] compute optimal utilities
//! and policies for it:
//! - [`value_iteration`]: Bellman fixed-point iteration with an epsilon-optimality bound
//! - [`policy_iteration`]: modified policy iteration with approximate evaluation
//! - [`policy_evaluation`]: iterative evaluation of a fixed policy
//! - [`estimate_utility`]: Monte Carlo rollouts to cross-check the analytic results

pub mod error;
pub mod mdp;
pub mod solvers;

pub use error::{MdpError, Result};
pub use mdp::{GridAction, GridWorld, Mdp, Policy, TabularMdp, UtilityVector};
pub use solvers::{estimate_utility, policy_evaluation, policy_iteration, value_iteration};
