use std::convert::TryFrom;

use rand::Rng;

use super::q_table::{QTable, StateError, StateKey};
use super::{Action, State};
use crate::solver::soft_greedy_action;
use crate::solver::td::backward_sweep;

// Below this total the player always hits.
const ALWAYS_HIT_BELOW: u32 = 9;
// From ALWAYS_HIT_BELOW up to this total the player always doubles.
const ALWAYS_DOUBLE_BELOW: u32 = 12;
// Learned values are kept to this many decimals.
const VALUE_PLACES: i32 = 3;

/// The learning player: an ε-greedy policy over a Q-value table.
#[derive(Clone, Debug)]
pub struct Agent {
    pub q_table: QTable,
    pub learning_rate: f64,
    pub exploration_rate: f64,
}

impl Agent {
    pub fn new(q_table: QTable, learning_rate: f64, exploration_rate: f64) -> Agent {
        Agent {
            q_table,
            learning_rate,
            exploration_rate,
        }
    }

    // Low totals are played by fixed rules; from 12 up the table decides.
    pub fn choose_action<R: Rng + ?Sized>(
        &self,
        state: &State,
        rng: &mut R,
    ) -> Result<Action, StateError> {
        let value = state.player.value();
        if value < ALWAYS_HIT_BELOW {
            return Ok(Action::Hit);
        }
        if value < ALWAYS_DOUBLE_BELOW {
            return Ok(Action::Double);
        }

        let key = StateKey::try_from(state)?;
        Ok(soft_greedy_action(
            &self.q_table,
            &key,
            &Action::ALL,
            self.exploration_rate,
            rng,
        ))
    }

    // Credit assignment for a finished hand, latest decision first.
    pub fn learn(&mut self, trace: &[(StateKey, Action)], reward: i32) {
        backward_sweep(
            &mut self.q_table,
            trace,
            reward as f64,
            self.learning_rate,
            VALUE_PLACES,
        );
    }
}
