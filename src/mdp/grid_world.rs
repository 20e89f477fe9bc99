//! Stochastic grid world.
//!
//! The agent moves on a `width x height` grid. Each move goes in the intended
//! direction with probability `intended_probability` and slips to either
//! perpendicular direction with half the remaining probability. Bumping into a
//! wall or the grid edge leaves the agent in place. Entering a terminal cell
//! pays that cell's reward; every other move pays `step_reward`.
//!
//! Cells are addressed as `(x, y)` with `(0, 0)` the bottom-left corner. The
//! solvers never see coordinates: each open cell is a `usize` state id, assigned
//! row by row from the bottom.

use std::collections::HashMap;

use crate::error::{MdpError, Result};
use crate::mdp::{Mdp, Policy, UtilityVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridAction {
    Up,
    Right,
    Down,
    Left,
    NoOp,
}

impl GridAction {
    /// The four moves, in the order used for tie-breaking.
    pub const MOVES: [GridAction; 4] = [
        GridAction::Up,
        GridAction::Right,
        GridAction::Down,
        GridAction::Left,
    ];

    fn delta(self) -> (isize, isize) {
        match self {
            GridAction::Up => (0, 1),
            GridAction::Right => (1, 0),
            GridAction::Down => (0, -1),
            GridAction::Left => (-1, 0),
            GridAction::NoOp => (0, 0),
        }
    }

    /// The two directions a move can slip into.
    fn perpendicular(self) -> [GridAction; 2] {
        match self {
            GridAction::Up | GridAction::Down => [GridAction::Left, GridAction::Right],
            GridAction::Right | GridAction::Left => [GridAction::Up, GridAction::Down],
            GridAction::NoOp => [GridAction::NoOp, GridAction::NoOp],
        }
    }

    fn arrow(self) -> char {
        match self {
            GridAction::Up => '^',
            GridAction::Right => '>',
            GridAction::Down => 'v',
            GridAction::Left => '<',
            GridAction::NoOp => '.',
        }
    }
}

const TERMINAL_ACTIONS: [GridAction; 1] = [GridAction::NoOp];

/// Layout and dynamics of a grid world.
#[derive(Debug, Clone)]
pub struct GridWorldConfig {
    pub width: usize,
    pub height: usize,
    /// Impassable cells
    pub walls: Vec<(usize, usize)>,
    /// Terminal cells and the reward for entering them
    pub terminals: Vec<((usize, usize), f64)>,
    pub start: (usize, usize),
    /// Reward for every move that does not enter a terminal cell
    pub step_reward: f64,
    /// Probability of moving in the intended direction
    pub intended_probability: f64,
    pub discount: f64,
}

impl Default for GridWorldConfig {
    /// The 4x3 textbook layout: wall at (1, 1), +1 at (3, 2), -1 at (3, 1).
    fn default() -> Self {
        Self {
            width: 4,
            height: 3,
            walls: vec![(1, 1)],
            terminals: vec![((3, 2), 1.0), ((3, 1), -1.0)],
            start: (0, 0),
            step_reward: -0.04,
            intended_probability: 0.8,
            discount: 0.9,
        }
    }
}

/// A grid world MDP with `usize` states and [`GridAction`] actions.
#[derive(Debug, Clone)]
pub struct GridWorld {
    config: GridWorldConfig,
    cells: Vec<(usize, usize)>,
    index: HashMap<(usize, usize), usize>,
    terminal_rewards: HashMap<usize, f64>,
    states: Vec<usize>,
}

impl GridWorld {
    /// Builds a grid world from `config`.
    ///
    /// # Errors
    /// `InvalidConfiguration` if the grid is empty, a cell lies outside it, the
    /// start or a terminal cell is a wall, or `intended_probability` is not in `[0, 1]`.
    pub fn new(config: GridWorldConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(MdpError::invalid_configuration(
                "grid world needs at least one row and one column",
            ));
        }
        if !(0.0..=1.0).contains(&config.intended_probability) {
            return Err(MdpError::invalid_configuration(format!(
                "intended_probability must be in [0, 1], got {}",
                config.intended_probability
            )));
        }
        let in_bounds = |(x, y): (usize, usize)| x < config.width && y < config.height;
        for &cell in config
            .walls
            .iter()
            .chain(config.terminals.iter().map(|(c, _)| c))
            .chain(std::iter::once(&config.start))
        {
            if !in_bounds(cell) {
                return Err(MdpError::invalid_configuration(format!(
                    "cell {:?} is outside the {}x{} grid",
                    cell, config.width, config.height
                )));
            }
        }
        if config.walls.contains(&config.start) {
            return Err(MdpError::invalid_configuration("start cell is a wall"));
        }
        if let Some((cell, _)) = config.terminals.iter().find(|(c, _)| config.walls.contains(c)) {
            return Err(MdpError::invalid_configuration(format!(
                "terminal cell {:?} is a wall",
                cell
            )));
        }
        Ok(Self::build(config))
    }

    /// The 4x3 textbook grid world with discount 0.9.
    pub fn textbook() -> Self {
        Self::build(GridWorldConfig::default())
    }

    fn build(config: GridWorldConfig) -> Self {
        let mut cells = Vec::new();
        for y in 0..config.height {
            for x in 0..config.width {
                if !config.walls.contains(&(x, y)) {
                    cells.push((x, y));
                }
            }
        }
        let index: HashMap<(usize, usize), usize> =
            cells.iter().enumerate().map(|(id, &c)| (c, id)).collect();
        let terminal_rewards = config
            .terminals
            .iter()
            .filter_map(|(c, r)| index.get(c).map(|&id| (id, *r)))
            .collect();
        let states = (0..cells.len()).collect();
        Self {
            config,
            cells,
            index,
            terminal_rewards,
            states,
        }
    }

    /// State id of an open cell.
    pub fn state_at(&self, x: usize, y: usize) -> Option<usize> {
        self.index.get(&(x, y)).copied()
    }

    /// Coordinates of a state id.
    pub fn cell_of(&self, state: usize) -> Option<(usize, usize)> {
        self.cells.get(state).copied()
    }

    /// Where a deterministic move from `state` in `direction` lands.
    fn target(&self, state: usize, direction: GridAction) -> usize {
        let Some((x, y)) = self.cell_of(state) else {
            return state;
        };
        let (dx, dy) = direction.delta();
        let nx = x.checked_add_signed(dx);
        let ny = y.checked_add_signed(dy);
        match (nx, ny) {
            (Some(nx), Some(ny)) => self.state_at(nx, ny).unwrap_or(state),
            _ => state,
        }
    }

    /// Renders utilities as rows, top row first. Walls print as `####`.
    pub fn render_utilities(&self, utility: &UtilityVector<usize>) -> String {
        self.render(|s| match utility.get(&s) {
            Some(u) => format!("{:>7.3}", u),
            None => format!("{:>7}", "?"),
        })
    }

    /// Renders a policy as arrows, top row first. Terminal cells print their reward.
    pub fn render_policy(&self, policy: &Policy<usize, GridAction>) -> String {
        self.render(|s| {
            if let Some(r) = self.terminal_rewards.get(&s) {
                format!("{:>+7.0}", r)
            } else {
                let arrow = policy.get(&s).map_or('?', GridAction::arrow);
                format!("{:>7}", arrow)
            }
        })
    }

    fn render<F: Fn(usize) -> String>(&self, cell: F) -> String {
        let mut out = String::new();
        for y in (0..self.config.height).rev() {
            for x in 0..self.config.width {
                match self.state_at(x, y) {
                    Some(s) => out.push_str(&cell(s)),
                    None => out.push_str(&format!("{:>7}", "####")),
                }
            }
            out.push('\n');
        }
        out
    }
}

impl Mdp for GridWorld {
    type State = usize;
    type Action = GridAction;

    fn states(&self) -> &[usize] {
        &self.states
    }

    fn initial_state(&self) -> usize {
        self.state_at(self.config.start.0, self.config.start.1)
            .unwrap_or(0)
    }

    fn actions(&self, state: &usize) -> &[GridAction] {
        if self.is_terminal(state) {
            &TERMINAL_ACTIONS
        } else {
            &GridAction::MOVES
        }
    }

    fn transition(&self, state: &usize, action: &GridAction) -> Vec<(usize, f64)> {
        if *action == GridAction::NoOp {
            return vec![(*state, 1.0)];
        }
        let slip = (1.0 - self.config.intended_probability) / 2.0;
        let [left, right] = action.perpendicular();
        let mut successors: Vec<(usize, f64)> = Vec::with_capacity(3);
        for (direction, p) in [
            (*action, self.config.intended_probability),
            (left, slip),
            (right, slip),
        ] {
            if p == 0.0 {
                continue;
            }
            let next = self.target(*state, direction);
            match successors.iter_mut().find(|(s, _)| *s == next) {
                Some((_, total)) => *total += p,
                None => successors.push((next, p)),
            }
        }
        successors
    }

    fn reward(&self, state: &usize, _action: &GridAction, next: &usize) -> f64 {
        if self.is_terminal(state) {
            return 0.0;
        }
        self.terminal_rewards
            .get(next)
            .copied()
            .unwrap_or(self.config.step_reward)
    }

    fn discount(&self) -> f64 {
        self.config.discount
    }

    fn no_op(&self) -> GridAction {
        GridAction::NoOp
    }

    fn is_terminal(&self, state: &usize) -> bool {
        self.terminal_rewards.contains_key(state)
    }
}
