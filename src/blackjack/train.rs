use rand::Rng;
use tracing::{debug, info};

use super::episode::{HandOutcome, Simulation};
use super::q_table::StateError;
use crate::config::TrainingConfig;
use crate::solver::td::decayed_exploration;

#[derive(Clone, Debug, PartialEq)]
pub struct TrainingSchedule {
    pub rounds: u64,
    pub initial_exploration: f64,
    pub exploration_decay: f64,
    // Emit a progress log every this many rounds.
    pub log_interval: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingSummary {
    pub rounds: u64,
    pub hands_learned: u64,
    pub naturals: u64,
}

impl TrainingSchedule {
    pub fn from_config(config: &TrainingConfig) -> TrainingSchedule {
        TrainingSchedule {
            rounds: config.rounds,
            initial_exploration: config.initial_exploration,
            exploration_decay: config.exploration_decay,
            log_interval: config.log_interval,
        }
    }
}

// Runs `schedule.rounds` learning hands with exploration decaying from hand to hand.
pub fn train<R: Rng>(
    simulation: &mut Simulation<R>,
    schedule: &TrainingSchedule,
) -> Result<TrainingSummary, StateError> {
    info!(
        rounds = schedule.rounds,
        learning_rate = simulation.agent.learning_rate,
        "training started"
    );

    let mut summary = TrainingSummary::default();
    for round in 0..schedule.rounds {
        simulation.agent.exploration_rate = decayed_exploration(
            schedule.initial_exploration,
            schedule.exploration_decay,
            round,
            schedule.rounds,
        );

        match simulation.play_and_learn()? {
            HandOutcome::Natural { .. } => summary.naturals += 1,
            HandOutcome::Played { .. } => summary.hands_learned += 1,
        }
        summary.rounds += 1;

        if schedule.log_interval > 0 && (round + 1) % schedule.log_interval == 0 {
            debug!(
                round = round + 1,
                exploration_rate = simulation.agent.exploration_rate,
                shoe_remaining = simulation.shoe.remaining(),
                "training progress"
            );
        }
    }
    Ok(summary)
}
