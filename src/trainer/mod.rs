//! Training, evaluation and playback for the DQN agents.

pub mod dqn;
pub mod env;
pub mod hyperparams;
pub mod recorder;

use candle_core::Device;
use tensorboard_rs::summary_writer::SummaryWriter;
use thiserror::Error;

use crate::config;

use dqn::{DqnAgent, Policy, Transition};
use env::{EnvError, GymEnvironment};
use hyperparams::Hyperparameters;

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error(transparent)]
    Dqn(#[from] dqn::DqnError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Train a DQN agent on `environment` and write checkpoints under
/// `models/<environment>/`.
///
/// The environment dispatch (pixel pipeline vs. raw vectors) happens in
/// `env::build_environment`; the network architecture follows from the
/// observation shape.
pub fn train_agent(
    environment: &str,
    params: Hyperparameters,
    verbose: bool,
) -> Result<(), TrainerError> {
    let mut env = env::build_environment(environment)?;
    let obs_kind = env.obs_kind();
    let n_actions = env.n_actions();

    let logs_dir = config::tensorboard_dir(environment);
    std::fs::create_dir_all(&logs_dir)?;
    let logdir = logs_dir.to_string_lossy().into_owned();
    let mut writer = SummaryWriter::new(&logdir);

    if verbose {
        println!("Starting DQN agent training on {environment} with the following parameters:");
        println!("{params:#?}");
        println!("{}", "-".repeat(50));
    }

    let mut agent = DqnAgent::new(obs_kind, n_actions, params.clone(), Device::Cpu)?;

    let mut obs = env.reset()?;
    let mut episode = 0u32;
    let mut episode_reward = 0.0f32;
    let mut best_eval = f32::NEG_INFINITY;

    for step in 0..params.total_timesteps {
        let action = agent.select_action(&obs)?;
        let result = env.step(action)?;

        agent.observe(Transition {
            state: obs,
            action: action as u32,
            reward: result.reward,
            next_state: result.observation.clone(),
            done: result.done,
        });
        if let Some(loss) = agent.learn_step()? {
            writer.add_scalar("train/loss", loss, agent.env_steps());
        }

        obs = result.observation;
        episode_reward += result.reward;

        if result.done || result.truncated {
            episode += 1;
            writer.add_scalar("rollout/episode_reward", episode_reward, agent.env_steps());
            writer.add_scalar("rollout/epsilon", agent.epsilon() as f32, agent.env_steps());
            if verbose && episode % 10 == 0 {
                println!(
                    "[TRAIN] episode {episode} | steps {} | reward {episode_reward:.1} | eps {:.3}",
                    agent.env_steps(),
                    agent.epsilon()
                );
            }
            episode_reward = 0.0;
            obs = env.reset()?;
        }

        // Periodic evaluation; keep the best-scoring checkpoint
        if (step + 1) % params.eval_freq == 0 {
            let mean_reward = evaluate_agent(&agent, environment, params.n_eval_episodes)?;
            writer.add_scalar("eval/mean_reward", mean_reward, agent.env_steps());
            if mean_reward > best_eval {
                best_eval = mean_reward;
                agent.save(&config::best_model_path(environment))?;
                if verbose {
                    println!("[EVAL] new best mean reward {mean_reward:.1}, checkpoint saved");
                }
            } else if verbose {
                println!("[EVAL] mean reward {mean_reward:.1} (best {best_eval:.1})");
            }
        }
    }

    let final_path = config::final_model_path(environment);
    agent.save(&final_path)?;
    writer.flush();

    if verbose {
        println!("Model saved to: {}", final_path.display());
        println!("TensorBoard logs saved to: {}", logs_dir.display());
    }
    Ok(())
}

/// Mean greedy-episode reward over a fresh environment instance.
fn evaluate_agent(
    agent: &DqnAgent,
    environment: &str,
    episodes: usize,
) -> Result<f32, TrainerError> {
    let mut env = env::build_environment(environment)?;
    let mut total = 0.0f32;
    for _ in 0..episodes.max(1) {
        let mut obs = env.reset()?;
        loop {
            let action = agent.greedy(&obs)?;
            let result = env.step(action)?;
            total += result.reward;
            obs = result.observation;
            if result.done || result.truncated {
                break;
            }
        }
    }
    Ok(total / episodes.max(1) as f32)
}

/// Run greedy episodes with a saved policy, returning per-episode rewards.
pub fn run_policy_episodes(
    policy: &Policy,
    env: &mut dyn GymEnvironment,
    episodes: usize,
) -> Result<Vec<f32>, TrainerError> {
    let mut rewards = Vec::with_capacity(episodes);
    for _ in 0..episodes {
        let mut obs = env.reset()?;
        let mut episode_reward = 0.0f32;
        loop {
            let action = policy.act(&obs)?;
            let result = env.step(action)?;
            episode_reward += result.reward;
            obs = result.observation;
            if result.done || result.truncated {
                break;
            }
        }
        rewards.push(episode_reward);
    }
    Ok(rewards)
}
