//! Frame preprocessing for pixel environments: grayscale conversion,
//! 84x84 downscale and a rolling 4-frame stack.

use std::collections::VecDeque;

use super::{EnvError, EnvStep, GymEnvironment, ObsKind, RgbFrame};

/// Side length of a preprocessed frame.
pub const FRAME_SIZE: usize = 84;

/// Number of stacked frames fed to the policy network.
pub const FRAME_STACK: usize = 4;

/// Convert an RGBA frame buffer to a normalized grayscale `FRAME_SIZE`²
/// frame using box averaging.
pub fn preprocess_frame(rgba: &[u8], src_w: usize, src_h: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(FRAME_SIZE * FRAME_SIZE);
    for ty in 0..FRAME_SIZE {
        let y0 = ty * src_h / FRAME_SIZE;
        let y1 = (((ty + 1) * src_h) / FRAME_SIZE).max(y0 + 1).min(src_h);
        for tx in 0..FRAME_SIZE {
            let x0 = tx * src_w / FRAME_SIZE;
            let x1 = (((tx + 1) * src_w) / FRAME_SIZE).max(x0 + 1).min(src_w);

            let mut sum = 0.0f32;
            let mut count = 0.0f32;
            for y in y0..y1 {
                for x in x0..x1 {
                    let idx = (y * src_w + x) * 4;
                    if idx + 2 >= rgba.len() {
                        continue;
                    }
                    // ITU-R BT.601 luma
                    let luma = 0.299 * f32::from(rgba[idx])
                        + 0.587 * f32::from(rgba[idx + 1])
                        + 0.114 * f32::from(rgba[idx + 2]);
                    sum += luma;
                    count += 1.0;
                }
            }
            out.push(if count > 0.0 { sum / count / 255.0 } else { 0.0 });
        }
    }
    out
}

/// Rolling stack of the last `n_stack` frames, oldest first.
///
/// Reset fills every slot with the initial frame so the stacked observation
/// always has a fixed length.
pub struct FrameStack {
    inner: Box<dyn GymEnvironment>,
    frames: VecDeque<Vec<f32>>,
    n_stack: usize,
}

impl FrameStack {
    pub fn new(inner: Box<dyn GymEnvironment>, n_stack: usize) -> Self {
        Self {
            inner,
            frames: VecDeque::with_capacity(n_stack),
            n_stack,
        }
    }

    fn push(&mut self, frame: Vec<f32>) {
        if self.frames.len() == self.n_stack {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    fn stacked(&self) -> Vec<f32> {
        self.frames.iter().flat_map(|f| f.iter().copied()).collect()
    }
}

impl GymEnvironment for FrameStack {
    fn obs_kind(&self) -> ObsKind {
        match self.inner.obs_kind() {
            ObsKind::Pixel { height, width, .. } => ObsKind::Pixel {
                frames: self.n_stack,
                height,
                width,
            },
            ObsKind::Vector(n) => ObsKind::Vector(n * self.n_stack),
        }
    }

    fn n_actions(&self) -> usize {
        self.inner.n_actions()
    }

    fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        let first = self.inner.reset()?;
        self.frames.clear();
        for _ in 0..self.n_stack {
            self.frames.push_back(first.clone());
        }
        Ok(self.stacked())
    }

    fn step(&mut self, action: usize) -> Result<EnvStep, EnvError> {
        let step = self.inner.step(action)?;
        self.push(step.observation);
        Ok(EnvStep {
            observation: self.stacked(),
            reward: step.reward,
            done: step.done,
            truncated: step.truncated,
        })
    }

    fn render_frame(&self) -> Option<RgbFrame> {
        self.inner.render_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Emits constant frames [n, n, ...] counting up each step.
    struct CountingEnv {
        counter: f32,
        frame_len: usize,
    }

    impl CountingEnv {
        fn new(frame_len: usize) -> Self {
            Self {
                counter: 0.0,
                frame_len,
            }
        }
    }

    impl GymEnvironment for CountingEnv {
        fn obs_kind(&self) -> ObsKind {
            ObsKind::Pixel {
                frames: 1,
                height: 1,
                width: self.frame_len,
            }
        }

        fn n_actions(&self) -> usize {
            2
        }

        fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
            self.counter = 0.0;
            Ok(vec![0.0; self.frame_len])
        }

        fn step(&mut self, _action: usize) -> Result<EnvStep, EnvError> {
            self.counter += 1.0;
            Ok(EnvStep {
                observation: vec![self.counter; self.frame_len],
                reward: 0.0,
                done: false,
                truncated: false,
            })
        }

        fn render_frame(&self) -> Option<RgbFrame> {
            None
        }
    }

    #[test]
    fn test_reset_replicates_first_frame() {
        let mut stack = FrameStack::new(Box::new(CountingEnv::new(3)), 4);
        let obs = stack.reset().unwrap();
        assert_eq!(obs.len(), 12);
        assert!(obs.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_newest_frame_is_last() {
        let mut stack = FrameStack::new(Box::new(CountingEnv::new(2)), 4);
        stack.reset().unwrap();
        stack.step(0).unwrap();
        let obs = stack.step(0).unwrap().observation;
        // Stack should hold frames [0, 0, 1, 2]
        assert_eq!(obs, vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_stack_evicts_oldest() {
        let mut stack = FrameStack::new(Box::new(CountingEnv::new(1)), 4);
        stack.reset().unwrap();
        for _ in 0..6 {
            stack.step(0).unwrap();
        }
        let obs = stack.stacked();
        assert_eq!(obs, vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_obs_kind_reports_stack_depth() {
        let stack = FrameStack::new(Box::new(CountingEnv::new(5)), 4);
        assert_eq!(
            stack.obs_kind(),
            ObsKind::Pixel {
                frames: 4,
                height: 1,
                width: 5
            }
        );
    }

    #[test]
    fn test_preprocess_frame_shape_and_range() {
        // Solid white 256x240 RGBA frame
        let rgba = vec![255u8; 256 * 240 * 4];
        let frame = preprocess_frame(&rgba, 256, 240);
        assert_eq!(frame.len(), FRAME_SIZE * FRAME_SIZE);
        for &v in &frame {
            assert!((v - 1.0).abs() < 1e-3, "expected ~1.0, got {v}");
        }
    }

    #[test]
    fn test_preprocess_frame_black_is_zero() {
        let mut rgba = vec![0u8; 64 * 64 * 4];
        // Alpha channel should not affect luma
        for px in rgba.chunks_exact_mut(4) {
            px[3] = 255;
        }
        let frame = preprocess_frame(&rgba, 64, 64);
        assert!(frame.iter().all(|&v| v == 0.0));
    }
}
