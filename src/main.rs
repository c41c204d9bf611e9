mod blackjack;
mod config;
mod logging;
mod solver;

use clap::Parser;

use blackjack::RunPlan;
use config::Config;
use logging::init_logging;

/// Trains a blackjack player with tabular reinforcement learning and measures it with a
/// card-counting bet ladder.
#[derive(Debug, Parser)]
#[command(name = "blackjack_rl", author, version, about)]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<std::path::PathBuf>,

    /// Override the number of training rounds.
    #[arg(long, value_name = "ROUNDS")]
    rounds: Option<u64>,

    /// Override the number of evaluation hands.
    #[arg(long, value_name = "HANDS")]
    eval_rounds: Option<u64>,

    /// Override the RNG seed.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Override where the policy is loaded from and saved to.
    #[arg(long, value_name = "PATH")]
    policy: Option<String>,

    /// Evaluate the saved policy without training it further.
    #[arg(long)]
    skip_training: bool,

    /// Train and save without evaluating.
    #[arg(long)]
    skip_evaluation: bool,

    /// Print the greedy action for every state after training.
    #[arg(long)]
    print_policy: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };

    if let Some(rounds) = cli.rounds {
        config.training.rounds = rounds;
    }

    if let Some(rounds) = cli.eval_rounds {
        config.evaluation.rounds = Some(rounds);
    }

    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }

    if let Some(policy) = cli.policy {
        config.policy_path = policy;
    }

    config.validate()?;
    init_logging(&config.logging);

    let plan = RunPlan {
        skip_training: cli.skip_training,
        skip_evaluation: cli.skip_evaluation,
        print_policy: cli.print_policy,
    };
    blackjack::run(&config, &plan)
}
