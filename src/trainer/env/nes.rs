//! NES backend for the pixel environments, emulated by tetanes.
//!
//! Observations are single preprocessed frames; stacking happens in the
//! `FrameStack` wrapper. The reward signal is the BCD score delta read from
//! the title's RAM map, and an episode ends when the lives counter (when
//! the title has one) reaches zero.

use tetanes_core::control_deck::HeadlessMode;
use tetanes_core::input::JoypadBtnState;
use tetanes_core::mem::Read;
use tetanes_core::prelude::*;

use crate::config::{self, PixelEnvSpec};

use super::frame_stack::{preprocess_frame, FRAME_SIZE};
use super::{EnvError, EnvStep, GymEnvironment, ObsKind, RgbFrame};

const NES_WIDTH: usize = 256;
const NES_HEIGHT: usize = 240;

/// Emulator frames advanced per agent step, with reward accumulated across
/// the skipped frames.
const FRAME_SKIP: u32 = 4;

/// Step limit per episode (roughly five minutes of emulated play).
const MAX_EPISODE_STEPS: u64 = 4500;

/// Frames to run after reset before the title screen accepts input.
const BOOT_FRAMES: u32 = 60;
/// Frames to hold START when leaving the title screen.
const START_PRESS_FRAMES: u32 = 12;

/// Score deltas above this are treated as BCD glitches during transitions.
const MAX_PLAUSIBLE_SCORE_DELTA: i64 = 50_000;

const ALL_BUTTONS: [JoypadBtnState; 8] = [
    JoypadBtnState::LEFT,
    JoypadBtnState::RIGHT,
    JoypadBtnState::UP,
    JoypadBtnState::DOWN,
    JoypadBtnState::A,
    JoypadBtnState::B,
    JoypadBtnState::START,
    JoypadBtnState::SELECT,
];

/// Discrete action set shared by all titles.
static ACTION_SET: &[&[JoypadBtnState]] = &[
    &[],                                          // noop
    &[JoypadBtnState::LEFT],
    &[JoypadBtnState::RIGHT],
    &[JoypadBtnState::UP],
    &[JoypadBtnState::DOWN],
    &[JoypadBtnState::A],
    &[JoypadBtnState::B],
    &[JoypadBtnState::LEFT, JoypadBtnState::A],
    &[JoypadBtnState::RIGHT, JoypadBtnState::A],
];

pub struct NesEnvironment {
    deck: ControlDeck,
    spec: &'static PixelEnvSpec,
    steps: u64,
    prev_score: u32,
    had_lives: bool,
}

impl NesEnvironment {
    pub fn new(spec: &'static PixelEnvSpec) -> Result<Self, EnvError> {
        let rom = config::rom_path(spec);
        if !rom.exists() {
            return Err(EnvError::RomMissing(rom));
        }

        let mut deck = ControlDeck::new();
        deck.set_headless_mode(HeadlessMode::NO_AUDIO);
        deck.load_rom_path(&rom)
            .map_err(|e| EnvError::Emulator(format!("failed to load {}: {e}", rom.display())))?;

        Ok(Self {
            deck,
            spec,
            steps: 0,
            prev_score: 0,
            had_lives: false,
        })
    }

    fn clock_frame(&mut self) -> Result<(), EnvError> {
        self.deck
            .clock_frame()
            .map_err(|e| EnvError::Emulator(e.to_string()))?;
        Ok(())
    }

    fn peek(&self, addr: u16) -> u8 {
        self.deck.bus().peek(addr)
    }

    /// Score from the BCD digit addresses, most significant first.
    fn score(&self) -> u32 {
        let mut score: u32 = 0;
        for &addr in self.spec.ram.score_digits {
            score = score * 10 + u32::from(self.peek(addr) & 0x0F);
        }
        score
    }

    fn lives(&self) -> Option<u8> {
        self.spec.ram.lives.map(|addr| self.peek(addr))
    }

    fn set_buttons(&mut self, pressed: &[JoypadBtnState]) {
        let joypad = self.deck.joypad_mut(Player::One);
        for button in ALL_BUTTONS {
            joypad.set_button(button, pressed.contains(&button));
        }
    }

    fn press_start(&mut self, frames: u32) -> Result<(), EnvError> {
        self.set_buttons(&[JoypadBtnState::START]);
        for _ in 0..frames {
            self.clock_frame()?;
        }
        self.set_buttons(&[]);
        Ok(())
    }

    fn observe(&mut self) -> Vec<f32> {
        preprocess_frame(self.deck.frame_buffer(), NES_WIDTH, NES_HEIGHT)
    }
}

impl GymEnvironment for NesEnvironment {
    fn obs_kind(&self) -> ObsKind {
        ObsKind::Pixel {
            frames: 1,
            height: FRAME_SIZE,
            width: FRAME_SIZE,
        }
    }

    fn n_actions(&self) -> usize {
        ACTION_SET.len()
    }

    fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        self.deck.reset(ResetKind::Soft);
        self.set_buttons(&[]);
        for _ in 0..BOOT_FRAMES {
            self.clock_frame()?;
        }
        self.press_start(START_PRESS_FRAMES)?;
        for _ in 0..BOOT_FRAMES {
            self.clock_frame()?;
        }

        self.steps = 0;
        self.prev_score = self.score();
        self.had_lives = self.lives().map(|l| l > 0).unwrap_or(false);
        Ok(self.observe())
    }

    fn step(&mut self, action: usize) -> Result<EnvStep, EnvError> {
        let buttons = ACTION_SET.get(action).copied().unwrap_or(&[]);
        self.set_buttons(buttons);
        for _ in 0..FRAME_SKIP {
            self.clock_frame()?;
        }
        self.steps += 1;

        let score = self.score();
        let delta = i64::from(score) - i64::from(self.prev_score);
        let reward = if delta > 0 && delta < MAX_PLAUSIBLE_SCORE_DELTA {
            delta as f32 * 0.01
        } else {
            0.0
        };
        self.prev_score = score;

        // Out of lives ends the episode on titles that track them
        let done = self.had_lives && self.lives().map(|l| l == 0).unwrap_or(false);

        Ok(EnvStep {
            observation: self.observe(),
            reward,
            done,
            truncated: self.steps >= MAX_EPISODE_STEPS,
        })
    }

    fn render_frame(&self) -> Option<RgbFrame> {
        let expected = NES_WIDTH * NES_HEIGHT * 4;
        let mut rgba = vec![0u8; expected];
        self.deck.frame_buffer_into(&mut rgba);
        let mut pixels = Vec::with_capacity(NES_WIDTH * NES_HEIGHT * 3);
        for px in rgba[..expected].chunks_exact(4) {
            pixels.extend_from_slice(&px[..3]);
        }
        Some(RgbFrame {
            width: NES_WIDTH as u32,
            height: NES_HEIGHT as u32,
            pixels,
        })
    }
}
