//! Environment abstraction and the pixel-vs-vector dispatch.
//!
//! Pixel environments (NES titles) are wrapped in the frame-preprocessing
//! pipeline; regular environments expose their observation vector directly.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::{self, EnvKind};

pub mod classic;
pub mod frame_stack;
pub mod nes;

pub use frame_stack::{FrameStack, FRAME_SIZE, FRAME_STACK};

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),
    #[error("ROM file not found: {0}")]
    RomMissing(PathBuf),
    #[error("emulator error: {0}")]
    Emulator(String),
}

/// Shape of the observation space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObsKind {
    /// Low-dimensional state vector.
    Vector(usize),
    /// Stacked grayscale frames, `frames * height * width` values.
    Pixel {
        frames: usize,
        height: usize,
        width: usize,
    },
}

impl ObsKind {
    /// Flattened observation length.
    pub fn len(&self) -> usize {
        match *self {
            ObsKind::Vector(n) => n,
            ObsKind::Pixel {
                frames,
                height,
                width,
            } => frames * height * width,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of one environment step.
#[derive(Debug, Clone)]
pub struct EnvStep {
    pub observation: Vec<f32>,
    pub reward: f32,
    /// Episode ended inside the simulation (failure/goal/out of lives).
    pub done: bool,
    /// Episode ended on the step limit.
    pub truncated: bool,
}

/// An RGB frame for gameplay recording.
#[derive(Debug, Clone)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Common interface over the classic-control and NES backends.
pub trait GymEnvironment {
    fn obs_kind(&self) -> ObsKind;
    fn n_actions(&self) -> usize;
    fn reset(&mut self) -> Result<Vec<f32>, EnvError>;
    fn step(&mut self, action: usize) -> Result<EnvStep, EnvError>;
    /// Current frame for the recorder, if the backend can render one.
    fn render_frame(&self) -> Option<RgbFrame>;
}

/// Build the environment for `name`, dispatching on the registry tables.
pub fn build_environment(name: &str) -> Result<Box<dyn GymEnvironment>, EnvError> {
    match config::lookup_env(name) {
        None => Err(EnvError::UnknownEnvironment(name.to_string())),
        Some(EnvKind::Pixel(spec)) => {
            let inner = nes::NesEnvironment::new(spec)?;
            Ok(Box::new(FrameStack::new(Box::new(inner), FRAME_STACK)))
        }
        Some(EnvKind::Regular(spec)) => classic::build(spec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_environment_is_rejected() {
        assert!(matches!(
            build_environment("doom"),
            Err(EnvError::UnknownEnvironment(_))
        ));
    }

    #[test]
    fn test_obs_kind_lengths() {
        assert_eq!(ObsKind::Vector(4).len(), 4);
        assert_eq!(
            ObsKind::Pixel {
                frames: 4,
                height: 84,
                width: 84
            }
            .len(),
            4 * 84 * 84
        );
    }
}
