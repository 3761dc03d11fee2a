//! Classic-control backends from gym-rs (vector observations).

use gym_rs::core::Env;
use gym_rs::envs::classical_control::cartpole::CartPoleEnv;
use gym_rs::envs::classical_control::mountain_car::MountainCarEnv;
use gym_rs::utils::renderer::RenderMode;

use crate::config::RegularEnvSpec;
use crate::trainer::recorder;

use super::{EnvError, EnvStep, GymEnvironment, ObsKind, RgbFrame};

// Episode step limits from the gymnasium registry entries
const CARTPOLE_MAX_STEPS: u32 = 500;
const MOUNTAIN_CAR_MAX_STEPS: u32 = 200;

pub fn build(spec: &'static RegularEnvSpec) -> Result<Box<dyn GymEnvironment>, EnvError> {
    match spec.env_id {
        "CartPole-v1" => Ok(Box::new(CartPole::new())),
        "MountainCar-v0" => Ok(Box::new(MountainCar::new())),
        other => Err(EnvError::UnknownEnvironment(other.to_string())),
    }
}

pub struct CartPole {
    env: CartPoleEnv,
    steps: u32,
    last_obs: Vec<f32>,
}

impl CartPole {
    pub fn new() -> Self {
        Self {
            env: CartPoleEnv::new(RenderMode::None),
            steps: 0,
            last_obs: vec![0.0; 4],
        }
    }
}

impl Default for CartPole {
    fn default() -> Self {
        Self::new()
    }
}

impl GymEnvironment for CartPole {
    fn obs_kind(&self) -> ObsKind {
        ObsKind::Vector(4)
    }

    fn n_actions(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        let (obs, _info) = self.env.reset(None, false, None);
        self.steps = 0;
        self.last_obs = to_f32(obs.into());
        Ok(self.last_obs.clone())
    }

    fn step(&mut self, action: usize) -> Result<EnvStep, EnvError> {
        let result = self.env.step(action);
        self.steps += 1;
        self.last_obs = to_f32(result.observation.into());
        Ok(EnvStep {
            observation: self.last_obs.clone(),
            reward: result.reward.into_inner() as f32,
            done: result.done,
            truncated: self.steps >= CARTPOLE_MAX_STEPS,
        })
    }

    fn render_frame(&self) -> Option<RgbFrame> {
        Some(recorder::draw_cartpole(&self.last_obs))
    }
}

pub struct MountainCar {
    env: MountainCarEnv,
    steps: u32,
    last_obs: Vec<f32>,
}

impl MountainCar {
    pub fn new() -> Self {
        Self {
            env: MountainCarEnv::new(RenderMode::None),
            steps: 0,
            last_obs: vec![0.0; 2],
        }
    }
}

impl Default for MountainCar {
    fn default() -> Self {
        Self::new()
    }
}

impl GymEnvironment for MountainCar {
    fn obs_kind(&self) -> ObsKind {
        ObsKind::Vector(2)
    }

    fn n_actions(&self) -> usize {
        3
    }

    fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        let (obs, _info) = self.env.reset(None, false, None);
        self.steps = 0;
        self.last_obs = to_f32(obs.into());
        Ok(self.last_obs.clone())
    }

    fn step(&mut self, action: usize) -> Result<EnvStep, EnvError> {
        let result = self.env.step(action);
        self.steps += 1;
        self.last_obs = to_f32(result.observation.into());
        Ok(EnvStep {
            observation: self.last_obs.clone(),
            reward: result.reward.into_inner() as f32,
            done: result.done,
            truncated: self.steps >= MOUNTAIN_CAR_MAX_STEPS,
        })
    }

    fn render_frame(&self) -> Option<RgbFrame> {
        Some(recorder::draw_mountain_car(&self.last_obs))
    }
}

fn to_f32(obs: Vec<f64>) -> Vec<f32> {
    obs.into_iter().map(|v| v as f32).collect()
}
