use thiserror::Error;

/// Errors raised by the MDP models and solvers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MdpError {
    /// An action outside `actions(state)` was passed to the Bellman evaluator
    /// or appears in a policy.
    #[error("action {action} is not legal in state {state}")]
    InvalidAction { state: String, action: String },

    /// A solver tunable or the discount factor is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The model violates its contract (empty action set, bad distribution, ...).
    #[error("malformed model: {0}")]
    MalformedModel(String),

    /// A Monte Carlo rollout did not reach a terminal state in time.
    #[error("rollout from state {start} did not terminate within {max_steps} steps")]
    MaxStepsExceeded { start: String, max_steps: usize },
}

impl MdpError {
    pub fn invalid_action<S: std::fmt::Debug, A: std::fmt::Debug>(state: &S, action: &A) -> Self {
        MdpError::InvalidAction {
            state: format!("{:?}", state),
            action: format!("{:?}", action),
        }
    }

    pub fn invalid_configuration<M: Into<String>>(msg: M) -> Self {
        MdpError::InvalidConfiguration(msg.into())
    }

    pub fn malformed_model<M: Into<String>>(msg: M) -> Self {
        MdpError::MalformedModel(msg.into())
    }

    pub fn max_steps_exceeded<S: std::fmt::Debug>(start: &S, max_steps: usize) -> Self {
        MdpError::MaxStepsExceeded {
            start: format!("{:?}", start),
            max_steps,
        }
    }
}

/// Result type for MDP operations.
pub type Result<T> = std::result::Result<T, MdpError>;
