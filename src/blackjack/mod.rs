use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use prettytable::{Cell, Row, Table};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;

pub mod agent;
pub mod episode;
pub mod evaluate;
pub mod q_table;
pub mod shoe;
pub mod train;

use agent::Agent;
use episode::Simulation;
use evaluate::EvaluationSettings;
use q_table::{QTable, StateKey};
use shoe::Shoe;
use train::TrainingSchedule;

const BLACKJACK: u32 = 21;
const DEALER_STANDS_ON: u32 = 17;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Card {
    Ace,
    // 2 to 10; all face cards count as 10.
    Value(u32),
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Stand,
    Hit,
    Double,
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Hand {
    // Value counts usable ace as 11.
    value: u32,
    usable_ace: bool,
}

// What the player sees: their own hand and the dealer's up-card.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct State {
    pub dealer: Card,
    pub player: Hand,
}

impl Card {
    // Panics unless `rank` is 1 (ace) to 10.
    pub fn from_rank(rank: u32) -> Card {
        match rank {
            1 => Card::Ace,
            2..=10 => Card::Value(rank),
            _ => panic!("invalid card rank {}", rank),
        }
    }

    // 1 for an ace, face value otherwise.
    pub fn rank(&self) -> u32 {
        match self {
            Card::Ace => 1,
            Card::Value(v) => *v,
        }
    }

    pub fn is_ace(&self) -> bool {
        match self {
            Card::Ace => true,
            _ => false,
        }
    }
}

impl Action {
    // Enumeration order; greedy ties are resolved in favour of the earlier action.
    pub const ALL: [Action; 3] = [Action::Stand, Action::Hit, Action::Double];

    pub fn index(&self) -> usize {
        match self {
            Action::Stand => 0,
            Action::Hit => 1,
            Action::Double => 2,
        }
    }

    // Units of the base bet at risk once this action ends the hand.
    pub fn stake(&self) -> i32 {
        match self {
            Action::Double => 2,
            _ => 1,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Action::Stand => "S",
            Action::Hit => "H",
            Action::Double => "D",
        }
    }
}

impl Hand {
    pub fn new(value: u32, usable_ace: bool) -> Hand {
        Hand { value, usable_ace }
    }

    // Two-card hand: an ace among them is counted as 11.
    pub fn from_pair(first: Card, second: Card) -> Hand {
        let value = first.rank() + second.rank();
        if first.is_ace() || second.is_ace() {
            Hand::new(value + 10, true)
        } else {
            Hand::new(value, false)
        }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn usable_ace(&self) -> bool {
        self.usable_ace
    }

    pub fn is_bust(&self) -> bool {
        self.value > BLACKJACK
    }

    // Adds a card without resolving a bust. An ace is 11 while the hand is at most 10.
    fn add_card(&self, card: Card) -> Hand {
        let mut hand = *self;
        match card {
            Card::Ace => {
                if hand.value <= 10 {
                    hand.usable_ace = true;
                    hand.value += 11;
                } else {
                    hand.value += 1;
                }
            }
            Card::Value(v) => hand.value += v,
        }
        hand
    }

    // Counts the usable ace as 1 instead of 11, if there is one.
    fn soften(&self) -> Option<Hand> {
        if self.usable_ace {
            Some(Hand::new(self.value - 10, false))
        } else {
            None
        }
    }
}

// Deals two cards from the shoe. Returns the hand and the first card dealt (the dealer's
// up-card when dealing to the dealer).
pub fn deal_two_cards<R: Rng + ?Sized>(shoe: &mut Shoe, rng: &mut R) -> (Hand, Card) {
    let first = shoe.draw(rng);
    let second = shoe.draw(rng);
    (Hand::from_pair(first, second), first)
}

// One step of the fixed dealer policy. Returns the new dealer hand and whether the dealer is done.
// * A bust hand with a usable ace is softened and play continues; otherwise the dealer is bust.
// * The dealer stands on 17 or more.
// * Below 17 the dealer takes exactly one card.
pub fn dealer_step<R: Rng + ?Sized>(hand: Hand, shoe: &mut Shoe, rng: &mut R) -> (Hand, bool) {
    let mut hand = hand;
    if hand.is_bust() {
        match hand.soften() {
            Some(softened) => hand = softened,
            None => return (hand, true),
        }
    }

    if hand.value >= DEALER_STANDS_ON {
        return (hand, true);
    }
    (hand.add_card(shoe.draw(rng)), false)
}

// Creates the next state from the current state and the player's action.
// Returns the new state and whether the player's turn is over:
// * Stand ends the turn with the state unchanged.
// * Hit takes a card; a bust is resolved by softening a usable ace, otherwise it ends the turn.
// * Double takes exactly one card and always ends the turn, bust or not.
pub fn player_step<R: Rng + ?Sized>(
    state: &State,
    action: Action,
    shoe: &mut Shoe,
    rng: &mut R,
) -> (State, bool) {
    if action == Action::Stand {
        return (*state, true);
    }

    let mut player = state.player.add_card(shoe.draw(rng));
    if action == Action::Double {
        return (
            State {
                dealer: state.dealer,
                player,
            },
            true,
        );
    }

    let mut done = false;
    if player.is_bust() {
        match player.soften() {
            Some(softened) => player = softened,
            None => done = true,
        }
    }
    (
        State {
            dealer: state.dealer,
            player,
        },
        done,
    )
}

// Reward for the hand, in base bets. Double stakes twice the bet. Two bust hands push.
pub fn settle(player_value: u32, action: Action, dealer_value: u32) -> i32 {
    let stake = action.stake();
    match (player_value > BLACKJACK, dealer_value > BLACKJACK) {
        (true, true) => 0,
        (true, false) => -stake,
        (false, true) => stake,
        (false, false) => {
            if player_value > dealer_value {
                stake
            } else if player_value < dealer_value {
                -stake
            } else {
                0
            }
        }
    }
}

pub fn print_policy(q_table: &QTable) {
    let all_cards: Vec<Card> = std::iter::once(Card::Ace)
        .chain((2..=10).map(Card::Value))
        .collect();

    let mut table = Table::new();

    // Print header.
    let mut header = Vec::new();
    header.push(Cell::new(""));
    header.push(Cell::new("Ace?"));
    for dealer_card in all_cards.iter() {
        header.push(match dealer_card {
            Card::Ace => Cell::new("A"),
            Card::Value(v) => Cell::new(&format!("{}", v)),
        });
    }
    table.add_row(Row::new(header));

    for usable_ace in &[false, true] {
        for player_sum in 12..=BLACKJACK {
            let mut cells = Vec::new();
            cells.push(Cell::new(&format!("{}", player_sum)));
            cells.push(Cell::new(match usable_ace {
                true => "Y",
                false => "N",
            }));
            for dealer_card in all_cards.iter() {
                match StateKey::new(player_sum, dealer_card.rank(), *usable_ace) {
                    Ok(key) => cells.push(Cell::new(q_table.best_action(&key).symbol())),
                    Err(_) => cells.push(Cell::new("")),
                }
            }
            table.add_row(Row::new(cells));
        }
    }
    table.printstd();
}

// Which stages of a run to perform.
#[derive(Clone, Debug, Default)]
pub struct RunPlan {
    pub skip_training: bool,
    pub skip_evaluation: bool,
    pub print_policy: bool,
}

pub fn run(config: &Config, plan: &RunPlan) -> anyhow::Result<()> {
    let rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let policy_path = PathBuf::from(&config.policy_path);

    let q_table = QTable::load_or_default(&policy_path)?;
    let agent = Agent::new(
        q_table,
        config.training.learning_rate,
        config.training.initial_exploration,
    );
    let shoe = Shoe::new(config.shoe.decks, config.shoe.reshuffle_fraction);
    let mut simulation = Simulation::new(shoe, agent, rng);

    if !plan.skip_training {
        let started = Instant::now();
        let summary = train::train(
            &mut simulation,
            &TrainingSchedule::from_config(&config.training),
        )
        .context("training failed")?;
        info!(
            rounds = summary.rounds,
            updates = summary.hands_learned,
            naturals = summary.naturals,
            elapsed_hours = started.elapsed().as_secs_f64() / 3600.0,
            "training finished"
        );
        simulation
            .agent
            .q_table
            .save(&policy_path)
            .with_context(|| format!("saving policy to {}", policy_path.display()))?;
        info!(path = %policy_path.display(), "policy saved");
    }

    if plan.print_policy {
        print_policy(&simulation.agent.q_table);
    }

    if !plan.skip_evaluation {
        simulation.agent.q_table = QTable::load_or_default(&policy_path)?;
        simulation.shoe = Shoe::new(config.shoe.decks, config.shoe.reshuffle_fraction);

        let settings = EvaluationSettings::from_config(config);
        let summary = evaluate::evaluate(&mut simulation, &settings).context("evaluation failed")?;
        evaluate::print_summary(&summary, config.training.rounds);
        evaluate::print_profit_curve(&summary);
    }

    Ok(())
}
