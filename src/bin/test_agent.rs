//! Evaluate a trained agent: run greedy episodes and print the rewards.
//!
//! Usage: test_agent <environment> [--episodes N]

use std::process;

use clap::Parser;

use gym_trainer::config;
use gym_trainer::trainer::dqn::{DqnError, Policy};
use gym_trainer::trainer::env::{self, EnvError};
use gym_trainer::trainer::run_policy_episodes;

#[derive(Parser)]
#[command(name = "test_agent", about = "Evaluate a trained DQN agent")]
struct Args {
    /// Environment name, e.g. cartpole or pacman
    environment: Option<String>,

    /// Number of greedy episodes to run
    #[arg(long, default_value_t = 10)]
    episodes: usize,
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

    let mut env = match env::build_environment(&environment) {
        Ok(env) => env,
        Err(EnvError::RomMissing(path)) => {
            eprintln!("Error: The ROM file `{}` doesn't exist.", path.display());
            process::exit(4);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let model_path = config::best_model_path(&environment);
    let policy = match Policy::load(env.obs_kind(), env.n_actions(), &model_path) {
        Ok(policy) => policy,
        Err(DqnError::CheckpointMissing(path)) => {
            eprintln!("Error: The file `{}` doesn't exist.", path.display());
            process::exit(3);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    match run_policy_episodes(&policy, env.as_mut(), args.episodes) {
        Ok(rewards) => {
            for (i, reward) in rewards.iter().enumerate() {
                println!("Episode {:>3}: reward {reward:.1}", i + 1);
            }
            let mean = rewards.iter().sum::<f32>() / rewards.len().max(1) as f32;
            println!("Mean reward over {} episodes: {mean:.1}", rewards.len());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
