// Global configuration and constants

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GardenError, Result};

/// Hard cap on leaves drawn along a single branch.
pub const MAX_LEAVES_PER_BRANCH: usize = 10;
/// Turns a branch survives without water or nutrients before it dies.
pub const MAX_TURNS_WITHOUT_SUSTENANCE: u32 = 5;

pub const DEFAULT_CONFIG_PATHS: [&str; 3] = ["timetree.yaml", "timetree.yml", "timetree.json"];

// Configuration struct for game parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    // Growth
    /// Length grows `growth_ratio / age` times faster than width.
    pub growth_ratio: f32,
    /// Scales the shared food pool into per-branch area increase.
    pub growth_scale: f32,
    /// Total branch area divided by this gives the water/nutrient capacity.
    pub capacity_divisor: f32,
    pub water_cost_per_branch: f32,
    pub nutrient_cost_per_branch: f32,

    // Lifecycle
    pub max_turns_without_sustenance: u32,
    pub max_leaves_per_branch: usize,

    // Sprouting
    pub sprout_requirement: f32,
    pub sprout_area_limit: f32,
    pub sprout_probability: f32,
    /// New branches lean up to this many degrees either side of vertical.
    pub sprout_angle_range: f32,
    pub sprout_length: f32,
    pub sprout_width: f32,

    // Fruit
    pub fruit_probability: f32,
    pub fruit_radius: f32,
    /// Relative weights for red, blue and gold fruit.
    pub fruit_weights: [u32; 3],

    // Turn reward granted to the player after every growing turn
    pub turn_reward_water: f32,
    pub turn_reward_fertiliser: f32,

    // Initialization
    pub initial_water_supply: f32,
    pub initial_fertiliser_supply: f32,
    pub initial_water_level: f32,
    pub initial_nutrient_level: f32,
    pub trunk_length: f32,
    pub trunk_width: f32,
    pub trunk_angle: f32,
    pub trunk_base: (f32, f32),

    /// Fixed seed for reproducible games; entropy is used when absent.
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            growth_ratio: 20.0,
            growth_scale: 50.0,
            capacity_divisor: 50.0,
            water_cost_per_branch: 0.5,
            nutrient_cost_per_branch: 0.5,
            max_turns_without_sustenance: MAX_TURNS_WITHOUT_SUSTENANCE,
            max_leaves_per_branch: MAX_LEAVES_PER_BRANCH,
            sprout_requirement: 3.0,
            sprout_area_limit: 5000.0,
            sprout_probability: 0.4,
            sprout_angle_range: 70.0,
            sprout_length: 50.0,
            sprout_width: 10.0,
            fruit_probability: 0.05,
            fruit_radius: 6.0,
            fruit_weights: [70, 25, 5],
            turn_reward_water: 3.0,
            turn_reward_fertiliser: 3.0,
            initial_water_supply: 10.0,
            initial_fertiliser_supply: 5.0,
            initial_water_level: 10.0,
            initial_nutrient_level: 10.0,
            trunk_length: 50.0,
            trunk_width: 10.0,
            trunk_angle: 1.0,
            trunk_base: (400.0, 500.0),
            seed: None,
        }
    }
}

impl GameConfig {
    /// Load a config file, picking the format from its extension.
    /// Anything that is not `.json` is read as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config: GameConfig = if is_json {
            serde_json::from_str(&text)?
        } else {
            serde_yaml::from_str(&text)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Search the working directory for a config file, falling back to defaults.
    pub fn from_default_paths() -> Self {
        for candidate in DEFAULT_CONFIG_PATHS {
            if !Path::new(candidate).exists() {
                continue;
            }
            match Self::from_file(candidate) {
                Ok(config) => {
                    tracing::info!(path = candidate, "loaded config");
                    return config;
                }
                Err(e) => {
                    tracing::warn!(path = candidate, error = %e, "ignoring unreadable config");
                }
            }
        }
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("growth_ratio", self.growth_ratio),
            ("capacity_divisor", self.capacity_divisor),
            ("sprout_length", self.sprout_length),
            ("sprout_width", self.sprout_width),
            ("trunk_length", self.trunk_length),
            ("trunk_width", self.trunk_width),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(GardenError::Config(format!("{name} must be positive, got {value}")));
            }
        }

        let non_negative = [
            ("growth_scale", self.growth_scale),
            ("water_cost_per_branch", self.water_cost_per_branch),
            ("nutrient_cost_per_branch", self.nutrient_cost_per_branch),
            ("fruit_radius", self.fruit_radius),
            ("initial_water_supply", self.initial_water_supply),
            ("initial_fertiliser_supply", self.initial_fertiliser_supply),
            ("initial_water_level", self.initial_water_level),
            ("initial_nutrient_level", self.initial_nutrient_level),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(GardenError::Config(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }

        for (name, p) in [
            ("sprout_probability", self.sprout_probability),
            ("fruit_probability", self.fruit_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(GardenError::Config(format!("{name} must be within [0, 1], got {p}")));
            }
        }

        if self.fruit_weights.iter().all(|w| *w == 0) {
            return Err(GardenError::Config("fruit_weights must not all be zero".into()));
        }
        Ok(())
    }
}
