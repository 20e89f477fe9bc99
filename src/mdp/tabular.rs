//! A Markov Decision Process given by explicit transition tables.

use crate::error::{MdpError, Result};
use crate::mdp::{check_distribution, Mdp};

/// The no-op action id of a [`TabularMdp`]; the only legal action in terminal states.
pub const NO_OP: usize = usize::MAX;

/// A finite MDP over integer ids.
///
/// States are `0..num_states`. The actions of a non-terminal state `s` are
/// `0..transitions[s].len()`; terminal states only allow [`NO_OP`], which
/// loops back to the same state with zero reward.
#[derive(Debug, Clone)]
pub struct TabularMdp {
    gamma: f64,
    initial_state: usize,
    /// `transitions[s][a]` holds the `(next, probability, reward)` outcomes of
    /// action `a` in state `s`. Empty for terminal states.
    transitions: Vec<Vec<Vec<(usize, f64, f64)>>>,
    terminal: Vec<bool>,
    states: Vec<usize>,
    actions: Vec<Vec<usize>>,
}

impl TabularMdp {
    /// Builds a model from per-state action tables.
    ///
    /// States listed in `terminal_states` become absorbing and must have an
    /// empty action table. Probabilities are not checked here; call
    /// [`TabularMdp::validate`] or let the solvers detect bad rows on first use.
    ///
    /// # Errors
    /// `MalformedModel` if a successor or terminal index is out of range, a
    /// row lists the same successor twice, or a terminal state has actions.
    pub fn new(
        gamma: f64,
        initial_state: usize,
        transitions: Vec<Vec<Vec<(usize, f64, f64)>>>,
        terminal_states: &[usize],
    ) -> Result<Self> {
        let num_states = transitions.len();
        if initial_state >= num_states {
            return Err(MdpError::malformed_model(format!(
                "initial state {} out of range for {} states",
                initial_state, num_states
            )));
        }

        let mut terminal = vec![false; num_states];
        for &t in terminal_states {
            if t >= num_states {
                return Err(MdpError::malformed_model(format!(
                    "terminal state {} out of range for {} states",
                    t, num_states
                )));
            }
            if !transitions[t].is_empty() {
                return Err(MdpError::malformed_model(format!(
                    "terminal state {} must not declare actions",
                    t
                )));
            }
            terminal[t] = true;
        }

        for (s, sa) in transitions.iter().enumerate() {
            for (a, row) in sa.iter().enumerate() {
                for (i, &(next, _, _)) in row.iter().enumerate() {
                    if next >= num_states {
                        return Err(MdpError::malformed_model(format!(
                            "state {}, action {} leads to unknown state {}",
                            s, a, next
                        )));
                    }
                    if row[..i].iter().any(|&(other, _, _)| other == next) {
                        return Err(MdpError::malformed_model(format!(
                            "state {}, action {} lists successor {} twice",
                            s, a, next
                        )));
                    }
                }
            }
        }

        let actions = transitions
            .iter()
            .enumerate()
            .map(|(s, sa)| {
                if terminal[s] {
                    vec![NO_OP]
                } else {
                    (0..sa.len()).collect()
                }
            })
            .collect();

        Ok(Self {
            gamma,
            initial_state,
            transitions,
            terminal,
            states: (0..num_states).collect(),
            actions,
        })
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Eagerly checks every state: non-empty action sets and proper distributions.
    pub fn validate(&self) -> Result<()> {
        for s in 0..self.num_states() {
            if self.actions[s].is_empty() {
                return Err(MdpError::malformed_model(format!(
                    "state {} has no legal actions",
                    s
                )));
            }
            for a in &self.actions[s] {
                check_distribution(&s, a, &self.transition(&s, a))?;
            }
        }
        Ok(())
    }
}

impl Mdp for TabularMdp {
    type State = usize;
    type Action = usize;

    fn states(&self) -> &[usize] {
        &self.states
    }

    fn initial_state(&self) -> usize {
        self.initial_state
    }

    fn actions(&self, state: &usize) -> &[usize] {
        self.actions.get(*state).map(Vec::as_slice).unwrap_or(&[])
    }

    fn transition(&self, state: &usize, action: &usize) -> Vec<(usize, f64)> {
        if self.terminal.get(*state).copied().unwrap_or(false) {
            return if *action == NO_OP {
                vec![(*state, 1.0)]
            } else {
                Vec::new()
            };
        }
        self.transitions
            .get(*state)
            .and_then(|sa| sa.get(*action))
            .map(|row| row.iter().map(|&(next, p, _)| (next, p)).collect())
            .unwrap_or_default()
    }

    fn reward(&self, state: &usize, action: &usize, next: &usize) -> f64 {
        self.transitions
            .get(*state)
            .and_then(|sa| sa.get(*action))
            .and_then(|row| row.iter().find(|&&(s, _, _)| s == *next))
            .map_or(0.0, |&(_, _, r)| r)
    }

    fn discount(&self) -> f64 {
        self.gamma
    }

    fn no_op(&self) -> usize {
        NO_OP
    }

    fn is_terminal(&self, state: &usize) -> bool {
        self.terminal.get(*state).copied().unwrap_or(false)
    }
}
