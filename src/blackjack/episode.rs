use std::convert::TryFrom;

use rand::Rng;

use super::agent::Agent;
use super::q_table::{StateError, StateKey};
use super::shoe::Shoe;
use super::{deal_two_cards, dealer_step, player_step, settle, Action, State, BLACKJACK};

// Decisions below this total are not recorded for credit assignment.
const TRACE_FROM: u32 = 12;

/// How a single hand ended.
#[derive(Clone, Debug, PartialEq)]
pub enum HandOutcome {
    // Player or dealer holds 21 with the first two cards; nothing is played.
    Natural {
        player: u32,
        dealer: u32,
    },
    Played {
        player: u32,
        dealer: u32,
        // The action that ended the player's turn.
        action: Action,
        reward: i32,
        // Decisions taken from a total of 12 up, oldest first.
        trace: Vec<(StateKey, Action)>,
    },
}

/// Everything one run mutates: the shoe, the agent with its table and the random source.
pub struct Simulation<R: Rng> {
    pub shoe: Shoe,
    pub agent: Agent,
    pub rng: R,
}

impl<R: Rng> Simulation<R> {
    pub fn new(shoe: Shoe, agent: Agent, rng: R) -> Simulation<R> {
        Simulation { shoe, agent, rng }
    }

    // Plays one hand to the end without learning from it.
    pub fn play_hand(&mut self) -> Result<HandOutcome, StateError> {
        let (dealer_hand, up_card) = deal_two_cards(&mut self.shoe, &mut self.rng);
        let (player_hand, _) = deal_two_cards(&mut self.shoe, &mut self.rng);

        if player_hand.value() == BLACKJACK || dealer_hand.value() == BLACKJACK {
            return Ok(HandOutcome::Natural {
                player: player_hand.value(),
                dealer: dealer_hand.value(),
            });
        }

        // Player's turn.
        let mut state = State {
            dealer: up_card,
            player: player_hand,
        };
        let mut trace = Vec::new();
        let action = loop {
            let action = self.agent.choose_action(&state, &mut self.rng)?;
            if state.player.value() >= TRACE_FROM {
                trace.push((StateKey::try_from(&state)?, action));
            }
            let (next_state, done) = player_step(&state, action, &mut self.shoe, &mut self.rng);
            state = next_state;
            if done {
                break action;
            }
        };

        // Dealer's turn.
        let mut dealer = dealer_hand;
        loop {
            let (next_hand, done) = dealer_step(dealer, &mut self.shoe, &mut self.rng);
            dealer = next_hand;
            if done {
                break;
            }
        }

        Ok(HandOutcome::Played {
            player: state.player.value(),
            dealer: dealer.value(),
            action,
            reward: settle(state.player.value(), action, dealer.value()),
            trace,
        })
    }

    // Plays one hand and assigns its reward back over the recorded decisions.
    pub fn play_and_learn(&mut self) -> Result<HandOutcome, StateError> {
        let outcome = self.play_hand()?;
        if let HandOutcome::Played { reward, trace, .. } = &outcome {
            self.agent.learn(trace, *reward);
        }
        Ok(outcome)
    }
}
