//! Gameplay recording: encodes RGB frames into an animated GIF under the
//! videos directory, plus small diagram rasterizers for the vector
//! environments (the NES backend supplies real frames).

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};
use thiserror::Error;

use super::env::RgbFrame;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] image::ImageError),
    #[error("frame buffer has wrong size")]
    BadFrame,
}

pub struct VideoRecorder {
    encoder: GifEncoder<BufWriter<File>>,
    delay: Delay,
    frames_written: u32,
}

impl VideoRecorder {
    pub fn create(path: &Path, fps: u32) -> Result<Self, RecorderError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        let mut encoder = GifEncoder::new(writer);
        encoder.set_repeat(Repeat::Infinite)?;
        Ok(Self {
            encoder,
            delay: Delay::from_numer_denom_ms(1000 / fps.max(1), 1),
            frames_written: 0,
        })
    }

    pub fn add_frame(&mut self, frame: &RgbFrame) -> Result<(), RecorderError> {
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.pixels.len() != expected {
            return Err(RecorderError::BadFrame);
        }

        let mut rgba = Vec::with_capacity(expected / 3 * 4);
        for px in frame.pixels.chunks_exact(3) {
            rgba.extend_from_slice(px);
            rgba.push(255);
        }
        let buffer = RgbaImage::from_raw(frame.width, frame.height, rgba)
            .ok_or(RecorderError::BadFrame)?;
        self.encoder
            .encode_frame(Frame::from_parts(buffer, 0, 0, self.delay))?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u32 {
        self.frames_written
    }
}

const CANVAS_W: usize = 320;
const CANVAS_H: usize = 240;

struct Canvas {
    pixels: Vec<u8>,
}

impl Canvas {
    fn new() -> Self {
        Self {
            pixels: vec![245u8; CANVAS_W * CANVAS_H * 3],
        }
    }

    fn set(&mut self, x: i32, y: i32, color: [u8; 3]) {
        if x < 0 || y < 0 || x >= CANVAS_W as i32 || y >= CANVAS_H as i32 {
            return;
        }
        let idx = (y as usize * CANVAS_W + x as usize) * 3;
        self.pixels[idx..idx + 3].copy_from_slice(&color);
    }

    fn fill_rect(&mut self, x0: i32, y0: i32, w: i32, h: i32, color: [u8; 3]) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                self.set(x, y, color);
            }
        }
    }

    fn line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, color: [u8; 3]) {
        let steps = ((x1 - x0).abs().max((y1 - y0).abs()) as i32).max(1);
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let x = x0 + (x1 - x0) * t;
            let y = y0 + (y1 - y0) * t;
            // Thicken to 2px for visibility
            self.set(x as i32, y as i32, color);
            self.set(x as i32 + 1, y as i32, color);
        }
    }

    fn into_frame(self) -> RgbFrame {
        RgbFrame {
            width: CANVAS_W as u32,
            height: CANVAS_H as u32,
            pixels: self.pixels,
        }
    }
}

const CART_COLOR: [u8; 3] = [40, 40, 40];
const POLE_COLOR: [u8; 3] = [180, 90, 30];
const TRACK_COLOR: [u8; 3] = [120, 120, 120];
const GOAL_COLOR: [u8; 3] = [40, 160, 60];

/// Diagram of a cart-pole state `[x, x_dot, theta, theta_dot]`.
pub fn draw_cartpole(obs: &[f32]) -> RgbFrame {
    let x = obs.first().copied().unwrap_or(0.0);
    let theta = obs.get(2).copied().unwrap_or(0.0);

    let mut canvas = Canvas::new();
    let track_y = 180;
    canvas.fill_rect(0, track_y, CANVAS_W as i32, 2, TRACK_COLOR);

    // World x in [-2.4, 2.4] mapped across the canvas
    let cart_x = ((x + 2.4) / 4.8 * CANVAS_W as f32) as i32;
    canvas.fill_rect(cart_x - 16, track_y - 12, 32, 12, CART_COLOR);

    let pole_len = 70.0;
    let tip_x = cart_x as f32 + pole_len * theta.sin();
    let tip_y = (track_y - 12) as f32 - pole_len * theta.cos();
    canvas.line(cart_x as f32, (track_y - 12) as f32, tip_x, tip_y, POLE_COLOR);

    canvas.into_frame()
}

/// Diagram of a mountain-car state `[position, velocity]`.
pub fn draw_mountain_car(obs: &[f32]) -> RgbFrame {
    let position = obs.first().copied().unwrap_or(-0.5);

    let mut canvas = Canvas::new();

    // Terrain: y = sin(3x) over x in [-1.2, 0.6]
    let terrain = |x: f32| -> f32 {
        let height = (3.0 * x).sin();
        CANVAS_H as f32 - 60.0 - height * 70.0
    };
    let to_px = |x: f32| (x + 1.2) / 1.8 * CANVAS_W as f32;

    let mut prev: Option<(f32, f32)> = None;
    for i in 0..=CANVAS_W {
        let x = -1.2 + 1.8 * i as f32 / CANVAS_W as f32;
        let point = (to_px(x), terrain(x));
        if let Some(p) = prev {
            canvas.line(p.0, p.1, point.0, point.1, TRACK_COLOR);
        }
        prev = Some(point);
    }

    // Goal flag on the right peak
    let goal_x = to_px(0.5);
    canvas.line(goal_x, terrain(0.5), goal_x, terrain(0.5) - 30.0, GOAL_COLOR);

    // The car
    let car_x = to_px(position);
    let car_y = terrain(position);
    canvas.fill_rect(car_x as i32 - 6, car_y as i32 - 10, 12, 8, CART_COLOR);

    canvas.into_frame()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagram_frames_have_canvas_size() {
        let frame = draw_cartpole(&[0.0, 0.0, 0.1, 0.0]);
        assert_eq!(frame.width as usize, CANVAS_W);
        assert_eq!(frame.height as usize, CANVAS_H);
        assert_eq!(frame.pixels.len(), CANVAS_W * CANVAS_H * 3);

        let frame = draw_mountain_car(&[-0.5, 0.0]);
        assert_eq!(frame.pixels.len(), CANVAS_W * CANVAS_H * 3);
    }

    #[test]
    fn test_cartpole_diagram_draws_the_cart() {
        let frame = draw_cartpole(&[0.0, 0.0, 0.0, 0.0]);
        // Some pixels must differ from the background
        assert!(frame.pixels.chunks_exact(3).any(|px| px == CART_COLOR));
    }

    #[test]
    fn test_recorder_writes_frames() {
        let dir = std::env::temp_dir().join("gym_trainer_recorder_test");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("test.gif");

        let mut recorder = VideoRecorder::create(&path, 30).unwrap();
        for _ in 0..3 {
            recorder.add_frame(&draw_cartpole(&[0.0, 0.0, 0.0, 0.0])).unwrap();
        }
        assert_eq!(recorder.frames_written(), 3);
        drop(recorder);
        assert!(path.exists());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_recorder_rejects_mismatched_frames() {
        let dir = std::env::temp_dir().join("gym_trainer_recorder_test");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("bad.gif");

        let mut recorder = VideoRecorder::create(&path, 30).unwrap();
        let bad = RgbFrame {
            width: 10,
            height: 10,
            pixels: vec![0; 5],
        };
        assert!(matches!(
            recorder.add_frame(&bad),
            Err(RecorderError::BadFrame)
        ));

        let _ = std::fs::remove_file(&path);
    }
}
