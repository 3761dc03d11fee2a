//! Static configuration: environment tables, hyperparameter metadata and
//! the on-disk layout for models, logs and recordings.

use std::path::PathBuf;

/// Root directory for per-environment checkpoints and training logs.
pub const MODELS_DIR: &str = "models";

/// Directory scanned by the `/videos` endpoint and written by `record_agent`.
pub const VIDEOS_DIR: &str = "static/videos";

/// Directory holding NES ROM files for the pixel environments.
pub const ROMS_DIR: &str = "roms";

/// RAM locations used to derive a reward signal from a NES title.
///
/// `score_digits` are BCD digit addresses, most significant first (one digit
/// per byte, low nibble). `lives` is the player-lives counter when the title
/// exposes one; episodes for titles without it end on the step limit alone.
pub struct NesRamMap {
    pub score_digits: &'static [u16],
    pub lives: Option<u16>,
}

/// A pixel environment: a NES title emulated by tetanes.
pub struct PixelEnvSpec {
    pub name: &'static str,
    pub rom_file: &'static str,
    pub ram: NesRamMap,
}

/// A regular environment: a classic-control simulator with a vector
/// observation space.
pub struct RegularEnvSpec {
    pub name: &'static str,
    pub env_id: &'static str,
}

/// Game names mapped to NES ROM descriptors.
pub static PIXEL_ENVIRONMENTS: &[PixelEnvSpec] = &[
    PixelEnvSpec {
        name: "pacman",
        rom_file: "pacman.nes",
        ram: NesRamMap {
            score_digits: &[0x0070, 0x0071, 0x0072, 0x0073, 0x0074, 0x0075],
            lives: Some(0x0067),
        },
    },
    PixelEnvSpec {
        name: "donkeykong",
        rom_file: "donkey_kong.nes",
        ram: NesRamMap {
            score_digits: &[0x0025, 0x0026, 0x0027],
            lives: Some(0x0055),
        },
    },
    PixelEnvSpec {
        name: "kungfu",
        rom_file: "kung_fu.nes",
        ram: NesRamMap {
            score_digits: &[0x0531, 0x0532, 0x0533, 0x0534, 0x0535, 0x0536],
            lives: Some(0x005C),
        },
    },
];

/// Game names mapped to classic-control simulator ids.
pub static REGULAR_ENVIRONMENTS: &[RegularEnvSpec] = &[
    RegularEnvSpec {
        name: "cartpole",
        env_id: "CartPole-v1",
    },
    RegularEnvSpec {
        name: "mountaincar",
        env_id: "MountainCar-v0",
    },
];

/// Which table an environment name resolved to.
pub enum EnvKind {
    Pixel(&'static PixelEnvSpec),
    Regular(&'static RegularEnvSpec),
}

/// Resolve an environment name against both tables.
pub fn lookup_env(name: &str) -> Option<EnvKind> {
    if let Some(spec) = PIXEL_ENVIRONMENTS.iter().find(|e| e.name == name) {
        return Some(EnvKind::Pixel(spec));
    }
    REGULAR_ENVIRONMENTS
        .iter()
        .find(|e| e.name == name)
        .map(EnvKind::Regular)
}

/// All valid environment names, pixel table first.
pub fn env_list() -> Vec<&'static str> {
    PIXEL_ENVIRONMENTS
        .iter()
        .map(|e| e.name)
        .chain(REGULAR_ENVIRONMENTS.iter().map(|e| e.name))
        .collect()
}

/// Metadata for one tunable hyperparameter, used to render the form and to
/// coerce submitted strings to numbers.
pub struct ParamDetail {
    pub name: &'static str,
    pub is_float: bool,
    pub default: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// Hyperparameters exposed in the web form.
#[rustfmt::skip]
pub static PARAM_DETAILS: &[ParamDetail] = &[
    ParamDetail { name: "learning_rate",          is_float: true,  default: 0.001,    min: 0.0001, max: 0.1,       step: 0.0001 },
    ParamDetail { name: "gamma",                  is_float: true,  default: 0.99,     min: 0.8,    max: 1.0,       step: 0.01 },
    ParamDetail { name: "exploration_fraction",   is_float: true,  default: 0.1,      min: 0.01,   max: 1.0,       step: 0.01 },
    ParamDetail { name: "exploration_final_eps",  is_float: true,  default: 0.01,     min: 0.001,  max: 0.1,       step: 0.001 },
    ParamDetail { name: "learning_starts",        is_float: false, default: 1000.0,   min: 100.0,  max: 10_000.0,  step: 100.0 },
    ParamDetail { name: "buffer_size",            is_float: false, default: 50_000.0, min: 1000.0, max: 100_000.0, step: 1000.0 },
    ParamDetail { name: "batch_size",             is_float: false, default: 32.0,     min: 16.0,   max: 256.0,     step: 16.0 },
    ParamDetail { name: "target_update_interval", is_float: false, default: 1000.0,   min: 100.0,  max: 10_000.0,  step: 100.0 },
];

/// Per-environment checkpoint directory, e.g. `models/cartpole`.
pub fn model_dir(environment: &str) -> PathBuf {
    PathBuf::from(MODELS_DIR).join(environment)
}

/// Checkpoint written whenever evaluation finds a new best policy.
pub fn best_model_path(environment: &str) -> PathBuf {
    model_dir(environment).join("best_model.safetensors")
}

/// Final checkpoint written when training completes.
pub fn final_model_path(environment: &str) -> PathBuf {
    model_dir(environment).join(format!("{environment}_dqn.safetensors"))
}

/// TensorBoard event directory for an environment.
pub fn tensorboard_dir(environment: &str) -> PathBuf {
    model_dir(environment).join("logs")
}

/// ROM path for a pixel environment.
pub fn rom_path(spec: &PixelEnvSpec) -> PathBuf {
    PathBuf::from(ROMS_DIR).join(spec.rom_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_names_are_unique() {
        let names = env_list();
        for (i, a) in names.iter().enumerate() {
            for b in names.iter().skip(i + 1) {
                assert_ne!(a, b, "duplicate environment name: {a}");
            }
        }
    }

    #[test]
    fn test_lookup_dispatches_to_the_right_table() {
        assert!(matches!(lookup_env("cartpole"), Some(EnvKind::Regular(_))));
        assert!(matches!(lookup_env("pacman"), Some(EnvKind::Pixel(_))));
        assert!(lookup_env("doom").is_none());
        assert!(lookup_env("").is_none());
    }

    #[test]
    fn test_param_defaults_within_bounds() {
        for detail in PARAM_DETAILS {
            assert!(
                detail.min <= detail.default && detail.default <= detail.max,
                "{} default out of range",
                detail.name
            );
            assert!(detail.step > 0.0, "{} step must be positive", detail.name);
        }
    }

    #[test]
    fn test_integer_params_have_integer_metadata() {
        for detail in PARAM_DETAILS.iter().filter(|d| !d.is_float) {
            assert_eq!(detail.default.fract(), 0.0, "{}", detail.name);
            assert_eq!(detail.min.fract(), 0.0, "{}", detail.name);
            assert_eq!(detail.max.fract(), 0.0, "{}", detail.name);
        }
    }

    #[test]
    fn test_model_paths_are_keyed_by_environment() {
        assert_eq!(
            final_model_path("cartpole"),
            PathBuf::from("models/cartpole/cartpole_dqn.safetensors")
        );
        assert_eq!(
            best_model_path("pacman"),
            PathBuf::from("models/pacman/best_model.safetensors")
        );
    }
}
