//! DQN glue over candle: policy networks, replay buffer, exploration
//! schedule and the agent update step. Tensors, autograd, layers and the
//! AdamW optimizer all come from candle.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{
    conv2d, linear, AdamW, Conv2d, Conv2dConfig, Linear, Module, Optimizer, ParamsAdamW,
    VarBuilder, VarMap,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use super::env::ObsKind;
use super::hyperparams::Hyperparameters;

#[derive(Debug, Error)]
pub enum DqnError {
    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),
    #[error("model file not found: {0}")]
    CheckpointMissing(PathBuf),
}

/// Q-network with the architecture picked by observation shape:
/// stacked frames get the standard 3-conv network, vectors get a 2x256 MLP.
pub enum QNetwork {
    Mlp {
        fc1: Linear,
        fc2: Linear,
        out: Linear,
    },
    Cnn {
        conv1: Conv2d,
        conv2: Conv2d,
        conv3: Conv2d,
        fc: Linear,
        out: Linear,
        frames: usize,
        height: usize,
        width: usize,
    },
}

impl QNetwork {
    pub fn new(vb: VarBuilder, obs: ObsKind, n_actions: usize) -> candle_core::Result<Self> {
        match obs {
            ObsKind::Vector(dim) => {
                let fc1 = linear(dim, 256, vb.pp("fc1"))?;
                let fc2 = linear(256, 256, vb.pp("fc2"))?;
                let out = linear(256, n_actions, vb.pp("out"))?;
                Ok(QNetwork::Mlp { fc1, fc2, out })
            }
            ObsKind::Pixel {
                frames,
                height,
                width,
            } => {
                let stride = |s| Conv2dConfig {
                    stride: s,
                    ..Default::default()
                };
                let conv1 = conv2d(frames, 32, 8, stride(4), vb.pp("conv1"))?;
                let conv2 = conv2d(32, 64, 4, stride(2), vb.pp("conv2"))?;
                let conv3 = conv2d(64, 64, 3, stride(1), vb.pp("conv3"))?;
                let flat = conv_stack_output_len(height, width);
                let fc = linear(flat, 512, vb.pp("fc"))?;
                let out = linear(512, n_actions, vb.pp("out"))?;
                Ok(QNetwork::Cnn {
                    conv1,
                    conv2,
                    conv3,
                    fc,
                    out,
                    frames,
                    height,
                    width,
                })
            }
        }
    }

    /// Q-values for a `[batch, obs_len]` input: `[batch, n_actions]`.
    pub fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            QNetwork::Mlp { fc1, fc2, out } => {
                x.apply(fc1)?.relu()?.apply(fc2)?.relu()?.apply(out)
            }
            QNetwork::Cnn {
                conv1,
                conv2,
                conv3,
                fc,
                out,
                frames,
                height,
                width,
            } => {
                let (batch, _len) = x.dims2()?;
                let x = x.reshape((batch, *frames, *height, *width))?;
                let x = x.apply(conv1)?.relu()?;
                let x = x.apply(conv2)?.relu()?;
                let x = x.apply(conv3)?.relu()?;
                let x = x.flatten_from(1)?;
                x.apply(fc)?.relu()?.apply(out)
            }
        }
    }
}

/// Flattened size after the three conv layers (kernels 8/4/3, strides 4/2/1).
fn conv_stack_output_len(height: usize, width: usize) -> usize {
    let reduce = |n: usize| {
        let n = (n - 8) / 4 + 1;
        let n = (n - 4) / 2 + 1;
        (n - 3) + 1
    };
    64 * reduce(height) * reduce(width)
}

/// One stored environment transition.
#[derive(Clone)]
pub struct Transition {
    pub state: Vec<f32>,
    pub action: u32,
    pub reward: f32,
    pub next_state: Vec<f32>,
    pub done: bool,
}

/// Ring replay buffer; oldest transitions are evicted at capacity.
pub struct ReplayBuffer {
    buffer: VecDeque<Transition>,
    capacity: usize,
}

struct Batch {
    states: Tensor,
    actions: Tensor,
    rewards: Tensor,
    next_states: Tensor,
    not_done: Tensor,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity.min(1 << 20)),
            capacity,
        }
    }

    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn sample(
        &self,
        batch_size: usize,
        obs_len: usize,
        device: &Device,
        rng: &mut SmallRng,
    ) -> candle_core::Result<Batch> {
        let len = self.buffer.len();
        let mut states = Vec::with_capacity(batch_size * obs_len);
        let mut actions = Vec::with_capacity(batch_size);
        let mut rewards = Vec::with_capacity(batch_size);
        let mut next_states = Vec::with_capacity(batch_size * obs_len);
        let mut not_done = Vec::with_capacity(batch_size);

        for _ in 0..batch_size {
            let t = &self.buffer[rng.gen_range(0..len)];
            states.extend_from_slice(&t.state);
            actions.push(t.action);
            rewards.push(t.reward);
            next_states.extend_from_slice(&t.next_state);
            not_done.push(if t.done { 0.0f32 } else { 1.0f32 });
        }

        Ok(Batch {
            states: Tensor::from_vec(states, (batch_size, obs_len), device)?,
            actions: Tensor::from_vec(actions, (batch_size, 1), device)?,
            rewards: Tensor::from_vec(rewards, batch_size, device)?,
            next_states: Tensor::from_vec(next_states, (batch_size, obs_len), device)?,
            not_done: Tensor::from_vec(not_done, batch_size, device)?,
        })
    }
}

/// Linear epsilon decay over `exploration_fraction` of the run, flat at
/// `exploration_final_eps` afterwards.
#[derive(Debug, Clone, Copy)]
pub struct ExplorationSchedule {
    pub fraction: f64,
    pub final_eps: f64,
    pub total_timesteps: usize,
}

impl ExplorationSchedule {
    pub fn value(&self, step: usize) -> f64 {
        let horizon = (self.fraction * self.total_timesteps as f64).max(1.0);
        if step as f64 >= horizon {
            self.final_eps
        } else {
            1.0 + (self.final_eps - 1.0) * (step as f64 / horizon)
        }
    }
}

pub struct DqnAgent {
    online_varmap: VarMap,
    target_varmap: VarMap,
    online: QNetwork,
    target: QNetwork,
    optimizer: AdamW,
    device: Device,
    obs_len: usize,
    n_actions: usize,
    params: Hyperparameters,
    replay: ReplayBuffer,
    schedule: ExplorationSchedule,
    env_steps: usize,
    rng: SmallRng,
}

impl DqnAgent {
    pub fn new(
        obs_kind: ObsKind,
        n_actions: usize,
        params: Hyperparameters,
        device: Device,
    ) -> Result<Self, DqnError> {
        let online_varmap = VarMap::new();
        let target_varmap = VarMap::new();
        let online_vb = VarBuilder::from_varmap(&online_varmap, DType::F32, &device);
        let target_vb = VarBuilder::from_varmap(&target_varmap, DType::F32, &device);
        let online = QNetwork::new(online_vb, obs_kind, n_actions)?;
        let target = QNetwork::new(target_vb, obs_kind, n_actions)?;

        let optimizer = AdamW::new(
            online_varmap.all_vars(),
            ParamsAdamW {
                lr: params.learning_rate,
                ..Default::default()
            },
        )?;

        let schedule = ExplorationSchedule {
            fraction: params.exploration_fraction,
            final_eps: params.exploration_final_eps,
            total_timesteps: params.total_timesteps,
        };

        let mut agent = Self {
            online_varmap,
            target_varmap,
            online,
            target,
            optimizer,
            device,
            obs_len: obs_kind.len(),
            n_actions,
            replay: ReplayBuffer::new(params.buffer_size),
            schedule,
            params,
            env_steps: 0,
            rng: SmallRng::from_entropy(),
        };
        agent.sync_target()?;
        Ok(agent)
    }

    /// Current exploration epsilon.
    pub fn epsilon(&self) -> f64 {
        self.schedule.value(self.env_steps)
    }

    /// Epsilon-greedy action for the current observation.
    pub fn select_action(&mut self, obs: &[f32]) -> Result<usize, DqnError> {
        if self.rng.gen::<f64>() < self.epsilon() {
            Ok(self.rng.gen_range(0..self.n_actions))
        } else {
            Ok(greedy_action(&self.online, obs, &self.device)?)
        }
    }

    /// Record a transition and advance the environment step counter.
    pub fn observe(&mut self, transition: Transition) {
        self.replay.push(transition);
        self.env_steps += 1;
    }

    /// Run gradient updates when due. Returns the last loss when an update
    /// happened.
    pub fn learn_step(&mut self) -> Result<Option<f32>, DqnError> {
        if self.env_steps < self.params.learning_starts
            || self.env_steps % self.params.train_freq != 0
            || self.replay.len() < self.params.batch_size
        {
            // Target sync runs on the env-step clock even between updates
            self.maybe_sync_target()?;
            return Ok(None);
        }

        let mut last_loss = 0.0;
        for _ in 0..self.params.gradient_steps {
            let batch = self.replay.sample(
                self.params.batch_size,
                self.obs_len,
                &self.device,
                &mut self.rng,
            )?;

            let q_all = self.online.forward(&batch.states)?;
            let q_values = q_all.gather(&batch.actions, 1)?.squeeze(1)?;

            let next_q = self.target.forward(&batch.next_states)?.max(D::Minus1)?;
            let discounted = (next_q * self.params.gamma)?;
            let target = (batch.rewards + discounted.mul(&batch.not_done)?)?.detach();

            let loss = huber_loss(&q_values, &target)?;
            self.optimizer.backward_step(&loss)?;
            last_loss = loss.to_scalar::<f32>()?;
        }

        self.maybe_sync_target()?;
        Ok(Some(last_loss))
    }

    fn maybe_sync_target(&mut self) -> Result<(), DqnError> {
        if self.env_steps > 0 && self.env_steps % self.params.target_update_interval == 0 {
            self.sync_target()?;
        }
        Ok(())
    }

    /// Hard-copy the online weights into the target network.
    pub fn sync_target(&mut self) -> Result<(), DqnError> {
        let online = self
            .online_varmap
            .data()
            .lock()
            .expect("online varmap lock");
        let mut target = self
            .target_varmap
            .data()
            .lock()
            .expect("target varmap lock");
        for (name, target_var) in target.iter_mut() {
            if let Some(online_var) = online.get(name) {
                target_var.set(&online_var.as_tensor().detach())?;
            }
        }
        Ok(())
    }

    /// Greedy action from the online network (used by evaluation).
    pub fn greedy(&self, obs: &[f32]) -> Result<usize, DqnError> {
        Ok(greedy_action(&self.online, obs, &self.device)?)
    }

    pub fn env_steps(&self) -> usize {
        self.env_steps
    }

    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    pub fn save(&self, path: &Path) -> Result<(), DqnError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        self.online_varmap.save(path)?;
        Ok(())
    }

    pub fn load(&mut self, path: &Path) -> Result<(), DqnError> {
        if !path.exists() {
            return Err(DqnError::CheckpointMissing(path.to_path_buf()));
        }
        self.online_varmap.load(path)?;
        self.sync_target()
    }
}

/// Inference-only wrapper used by the playback binaries.
pub struct Policy {
    _varmap: VarMap,
    net: QNetwork,
    device: Device,
}

impl Policy {
    pub fn load(obs_kind: ObsKind, n_actions: usize, path: &Path) -> Result<Self, DqnError> {
        if !path.exists() {
            return Err(DqnError::CheckpointMissing(path.to_path_buf()));
        }
        let device = Device::Cpu;
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let net = QNetwork::new(vb, obs_kind, n_actions)?;
        varmap.load(path)?;
        Ok(Self {
            _varmap: varmap,
            net,
            device,
        })
    }

    pub fn act(&self, obs: &[f32]) -> Result<usize, DqnError> {
        Ok(greedy_action(&self.net, obs, &self.device)?)
    }
}

fn greedy_action(net: &QNetwork, obs: &[f32], device: &Device) -> candle_core::Result<usize> {
    let input = Tensor::from_slice(obs, (1, obs.len()), device)?;
    let q = net.forward(&input)?;
    let action = q.argmax(D::Minus1)?.squeeze(0)?.to_scalar::<u32>()?;
    Ok(action as usize)
}

/// Huber loss with unit delta.
fn huber_loss(prediction: &Tensor, target: &Tensor) -> candle_core::Result<Tensor> {
    let diff = (prediction - target)?;
    let abs = diff.abs()?;
    let quadratic = (diff.sqr()? * 0.5)?;
    let linear = abs.affine(1.0, -0.5)?;
    abs.lt(1.0)?.where_cond(&quadratic, &linear)?.mean_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> Hyperparameters {
        Hyperparameters {
            buffer_size: 32,
            batch_size: 4,
            learning_starts: 8,
            train_freq: 1,
            gradient_steps: 1,
            target_update_interval: 16,
            total_timesteps: 1000,
            ..Hyperparameters::default()
        }
    }

    fn transition(value: f32) -> Transition {
        Transition {
            state: vec![value; 4],
            action: 0,
            reward: 1.0,
            next_state: vec![value + 1.0; 4],
            done: false,
        }
    }

    #[test]
    fn test_replay_buffer_evicts_oldest() {
        let mut buffer = ReplayBuffer::new(3);
        for i in 0..5 {
            buffer.push(transition(i as f32));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.buffer[0].state[0], 2.0);
    }

    #[test]
    fn test_replay_buffer_sample_size() {
        let mut buffer = ReplayBuffer::new(16);
        for i in 0..8 {
            buffer.push(transition(i as f32));
        }
        let mut rng = SmallRng::seed_from_u64(7);
        let batch = buffer.sample(4, 4, &Device::Cpu, &mut rng).unwrap();
        assert_eq!(batch.states.dims(), &[4, 4]);
        assert_eq!(batch.actions.dims(), &[4, 1]);
        assert_eq!(batch.rewards.dims(), &[4]);
    }

    #[test]
    fn test_exploration_schedule_boundaries() {
        let schedule = ExplorationSchedule {
            fraction: 0.1,
            final_eps: 0.01,
            total_timesteps: 1000,
        };
        assert!((schedule.value(0) - 1.0).abs() < 1e-9);
        assert!((schedule.value(100) - 0.01).abs() < 1e-9);
        assert!((schedule.value(1000) - 0.01).abs() < 1e-9);
        // Halfway through the decay horizon
        let mid = schedule.value(50);
        assert!(mid > 0.4 && mid < 0.6, "unexpected mid epsilon {mid}");
    }

    #[test]
    fn test_mlp_forward_shape() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let net = QNetwork::new(vb, ObsKind::Vector(4), 2).unwrap();
        let input = Tensor::zeros((3, 4), DType::F32, &Device::Cpu).unwrap();
        let q = net.forward(&input).unwrap();
        assert_eq!(q.dims(), &[3, 2]);
    }

    #[test]
    fn test_cnn_forward_shape() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let obs = ObsKind::Pixel {
            frames: 4,
            height: 84,
            width: 84,
        };
        let net = QNetwork::new(vb, obs, 9).unwrap();
        let input = Tensor::zeros((2, obs.len()), DType::F32, &Device::Cpu).unwrap();
        let q = net.forward(&input).unwrap();
        assert_eq!(q.dims(), &[2, 9]);
    }

    #[test]
    fn test_conv_stack_output_len_for_84() {
        // 84 -> 20 -> 9 -> 7 per side
        assert_eq!(conv_stack_output_len(84, 84), 64 * 7 * 7);
    }

    #[test]
    fn test_agent_selects_valid_actions_and_learns() {
        let mut agent =
            DqnAgent::new(ObsKind::Vector(4), 2, small_params(), Device::Cpu).unwrap();

        let mut learned = false;
        for i in 0..16 {
            let obs = vec![i as f32; 4];
            let action = agent.select_action(&obs).unwrap();
            assert!(action < 2);
            agent.observe(Transition {
                state: obs.clone(),
                action: action as u32,
                reward: 1.0,
                next_state: vec![i as f32 + 1.0; 4],
                done: false,
            });
            if agent.learn_step().unwrap().is_some() {
                learned = true;
            }
        }
        assert!(learned, "agent never ran a gradient update");
        assert_eq!(agent.env_steps(), 16);
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = std::env::temp_dir().join("gym_trainer_dqn_test");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("checkpoint.safetensors");

        let agent = DqnAgent::new(ObsKind::Vector(4), 2, small_params(), Device::Cpu).unwrap();
        agent.save(&path).unwrap();

        let policy = Policy::load(ObsKind::Vector(4), 2, &path).unwrap();
        let action = policy.act(&[0.0, 0.1, -0.1, 0.0]).unwrap();
        assert!(action < 2);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_checkpoint_is_a_distinct_error() {
        let missing = Path::new("models/nowhere/best_model.safetensors");
        match Policy::load(ObsKind::Vector(4), 2, missing) {
            Err(DqnError::CheckpointMissing(_)) => {}
            Err(e) => panic!("expected CheckpointMissing, got {e}"),
            Ok(_) => panic!("expected CheckpointMissing, got a policy"),
        }
    }
}
