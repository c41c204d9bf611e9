use plotlib::{
    page::Page,
    repr::Plot,
    style::{PointMarker, PointStyle},
    view::ContinuousView,
};
use prettytable::{Cell, Row, Table};
use rand::Rng;
use tracing::{info, warn};

use super::episode::{HandOutcome, Simulation};
use super::q_table::StateError;
use super::Card;
use crate::config::Config;

// Payout for a winning natural, in bets.
const NATURAL_PAYOUT: f64 = 1.5;
// Number of points kept for the profit plot.
const CURVE_POINTS: u64 = 200;

#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationSettings {
    pub rounds: u64,
    // The running count is divided by this after every hand.
    pub count_divisor: f64,
    // The running count restarts from 0 when fewer cards than this are left in the shoe.
    pub count_reset_below: usize,
    // Print the win/draw/loss tally every this many hands.
    pub report_interval: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluationSummary {
    pub hands: u64,
    pub wins: u64,
    pub draws: u64,
    pub losses: u64,
    pub profit: f64,
    pub wagered: f64,
    // (hand, cumulative profit) samples.
    pub profit_curve: Vec<(f64, f64)>,
}

impl EvaluationSettings {
    pub fn from_config(config: &Config) -> EvaluationSettings {
        EvaluationSettings {
            rounds: config.evaluation_rounds(),
            count_divisor: config.shoe.decks as f64,
            count_reset_below: config.evaluation.count_reset_threshold,
            report_interval: config.evaluation.report_interval,
        }
    }
}

impl EvaluationSummary {
    fn record(&mut self, reward: f64, bet: f64, wagered: f64) {
        if reward > 0.0 {
            self.wins += 1;
        } else if reward < 0.0 {
            self.losses += 1;
        } else {
            self.draws += 1;
        }
        self.profit += reward * bet;
        self.wagered += wagered;
    }
}

// Hi-lo count of the cards still in the shoe: tens and aces +1, two to six -1.
pub fn count_cards(cards: &[Card]) -> i32 {
    cards
        .iter()
        .map(|card| match card.rank() {
            1 | 10 => 1,
            2..=6 => -1,
            _ => 0,
        })
        .sum()
}

// Bet for the normalized running count.
pub fn bet_size(count: f64) -> u32 {
    if count < 1.0 {
        10
    } else if count < 2.0 {
        30
    } else if count < 3.0 {
        800
    } else {
        1000
    }
}

// Plays `settings.rounds` hands greedily, sizing each bet by the running count.
pub fn evaluate<R: Rng>(
    simulation: &mut Simulation<R>,
    settings: &EvaluationSettings,
) -> Result<EvaluationSummary, StateError> {
    info!(rounds = settings.rounds, "evaluation started");
    simulation.agent.exploration_rate = 0.0;

    let sample_every = (settings.rounds / CURVE_POINTS).max(1);
    let mut summary = EvaluationSummary::default();
    let mut running_count = 0.0;
    for hand in 0..settings.rounds {
        if simulation.shoe.remaining() < settings.count_reset_below {
            running_count = 0.0;
        }
        running_count = (running_count + count_cards(simulation.shoe.cards()) as f64)
            / settings.count_divisor;
        let bet = bet_size(running_count) as f64;

        match simulation.play_hand()? {
            HandOutcome::Natural { player, dealer } => {
                let reward = if player == dealer {
                    0.0
                } else if player > dealer {
                    NATURAL_PAYOUT
                } else {
                    -1.0
                };
                summary.record(reward, bet, bet);
            }
            HandOutcome::Played { action, reward, .. } => {
                summary.record(reward as f64, bet, action.stake() as f64 * bet);
            }
        }
        summary.hands += 1;

        if settings.report_interval > 0 && hand % settings.report_interval == 0 {
            println!("[{}, {}, {}]", summary.wins, summary.draws, summary.losses);
        }
        if hand % sample_every == 0 || hand + 1 == settings.rounds {
            summary
                .profit_curve
                .push(((hand + 1) as f64, summary.profit));
        }
    }

    info!(
        wins = summary.wins,
        draws = summary.draws,
        losses = summary.losses,
        profit = summary.profit,
        "evaluation finished"
    );
    Ok(summary)
}

pub fn print_summary(summary: &EvaluationSummary, training_rounds: u64) {
    let mut table = Table::new();
    let rows = vec![
        ("Hands", format!("{}", summary.hands)),
        ("Wins", format!("{}", summary.wins)),
        ("Draws", format!("{}", summary.draws)),
        ("Losses", format!("{}", summary.losses)),
        (
            "Win - loss",
            format!("{}", summary.wins as i64 - summary.losses as i64),
        ),
        ("Wagered", format!("{:.1}", summary.wagered)),
        ("Profit", format!("{:.1}", summary.profit)),
        (
            "Profit per training round",
            format!("{:.6}", summary.profit / training_rounds.max(1) as f64),
        ),
    ];
    for (name, value) in rows {
        table.add_row(Row::new(vec![Cell::new(name), Cell::new(&value)]));
    }
    table.printstd();
}

pub fn print_profit_curve(summary: &EvaluationSummary) {
    if summary.profit_curve.len() < 2 {
        return;
    }

    let s1 = Plot::new(summary.profit_curve.clone())
        .point_style(PointStyle::new().marker(PointMarker::Circle));
    let v = ContinuousView::new()
        .add(s1)
        .x_range(0.0, summary.hands as f64)
        .x_label("Hand")
        .y_label("Profit");
    match Page::single(&v).dimensions(100, 30).to_text() {
        Ok(text) => println!("{}", text),
        Err(_) => warn!("could not render the profit curve"),
    }
}
