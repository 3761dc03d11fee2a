//! Record a gameplay video of a trained agent.
//!
//! Writes `static/videos/<environment>_gameplay_<timestamp>.gif` (30
//! seconds at 30 fps by default), which then shows up in the web panel's
//! video gallery.
//!
//! Usage: record_agent <environment> [--seconds N]

use std::path::PathBuf;
use std::process;

use clap::Parser;

use gym_trainer::config;
use gym_trainer::trainer::dqn::{DqnError, Policy};
use gym_trainer::trainer::env::{self, EnvError};
use gym_trainer::trainer::recorder::VideoRecorder;

const VIDEO_FPS: u32 = 30;

#[derive(Parser)]
#[command(name = "record_agent", about = "Record gameplay of a trained DQN agent")]
struct Args {
    /// Environment name, e.g. cartpole or pacman
    environment: Option<String>,

    /// Video length in seconds
    #[arg(long, default_value_t = 30)]
    seconds: u32,
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

    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let video_path =
        PathBuf::from(config::VIDEOS_DIR).join(format!("{environment}_gameplay_{timestamp}.gif"));
    let mut recorder = match VideoRecorder::create(&video_path, VIDEO_FPS) {
        Ok(recorder) => recorder,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let total_frames = VIDEO_FPS * args.seconds;
    println!("Recording {} second video of {environment}...", args.seconds);

    if let Err(e) = record(env.as_mut(), &policy, &mut recorder, total_frames) {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    println!(
        "Video saved to {} ({} frames)",
        video_path.display(),
        recorder.frames_written()
    );
}

fn record(
    env: &mut dyn env::GymEnvironment,
    policy: &Policy,
    recorder: &mut VideoRecorder,
    total_frames: u32,
) -> anyhow::Result<()> {
    let mut obs = env.reset()?;
    for _ in 0..total_frames {
        let action = policy.act(&obs)?;
        let result = env.step(action)?;
        obs = result.observation;

        if let Some(frame) = env.render_frame() {
            recorder.add_frame(&frame)?;
        }

        if result.done || result.truncated {
            obs = env.reset()?;
        }
    }
    Ok(())
}
