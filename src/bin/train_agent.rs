//! Train a DQN agent on a pixel or classic-control game.
//!
//! Spawned by the web panel for background runs, or invoked manually:
//!     train_agent <environment> [--learning-rate 0.001 ...]
//! The list of available environments lives in the registry tables.

use std::process;

use clap::Parser;

use gym_trainer::config;
use gym_trainer::trainer::env::EnvError;
use gym_trainer::trainer::hyperparams::Hyperparameters;
use gym_trainer::trainer::{self, TrainerError};

#[derive(Parser)]
#[command(name = "train_agent", about = "Train a DQN agent on a game environment")]
struct Args {
    /// Environment name, e.g. cartpole or pacman
    environment: Option<String>,

    #[arg(long)]
    learning_rate: Option<f64>,
    #[arg(long)]
    gamma: Option<f64>,
    #[arg(long)]
    exploration_fraction: Option<f64>,
    #[arg(long)]
    exploration_final_eps: Option<f64>,
    #[arg(long)]
    learning_starts: Option<usize>,
    #[arg(long)]
    buffer_size: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    target_update_interval: Option<usize>,
    #[arg(long)]
    total_timesteps: Option<usize>,
    #[arg(long)]
    eval_freq: Option<usize>,
}

fn main() {
    let args = Args::parse();

    let Some(environment) = args.environment else {
        eprintln!("Error: No environment selected");
        process::exit(1);
    };

    if config::lookup_env(&environment).is_none() {
        eprintln!("Error: The environment '{environment}' doesn't exist.");
        eprintln!("Available environments: {}", config::env_list().join(", "));
        process::exit(2);
    }

    let mut params = Hyperparameters::default();
    if let Some(v) = args.learning_rate {
        params.learning_rate = v;
    }
    if let Some(v) = args.gamma {
        params.gamma = v;
    }
    if let Some(v) = args.exploration_fraction {
        params.exploration_fraction = v;
    }
    if let Some(v) = args.exploration_final_eps {
        params.exploration_final_eps = v;
    }
    if let Some(v) = args.learning_starts {
        params.learning_starts = v;
    }
    if let Some(v) = args.buffer_size {
        params.buffer_size = v;
    }
    if let Some(v) = args.batch_size {
        params.batch_size = v;
    }
    if let Some(v) = args.target_update_interval {
        params.target_update_interval = v;
    }
    if let Some(v) = args.total_timesteps {
        params.total_timesteps = v;
    }
    if let Some(v) = args.eval_freq {
        params.eval_freq = v;
    }

    match trainer::train_agent(&environment, params, true) {
        Ok(()) => {}
        Err(TrainerError::Env(EnvError::RomMissing(path))) => {
            eprintln!("Error: The ROM file `{}` doesn't exist.", path.display());
            process::exit(4);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
